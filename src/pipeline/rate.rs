use std::time::Duration;

/// Samples needed before the detector trusts its estimate
const WARMUP_SAMPLES: u32 = 30;
/// EMA smoothing factor for inter-arrival intervals
const EMA_ALPHA: f64 = 0.2;
/// Headroom above the target before rate limiting engages, in fps
const RATE_LIMIT_MARGIN: f64 = 2.0;

/// Detects whether the camera delivers frames faster than the target rate.
///
/// Inter-arrival intervals are smoothed with an EMA; once ~30 samples are in,
/// `rate_limit_required` reports whether the loop must pace itself. When the
/// camera itself runs at or below target the loop never sleeps between
/// captures.
pub struct SourceRateDetector {
    target_fps: u32,
    ema_interval_us: Option<f64>,
    last_arrival_us: Option<u64>,
    samples: u32,
    rate_limit_required: bool,
}

impl SourceRateDetector {
    pub fn new(target_fps: u32) -> Self {
        Self {
            target_fps: target_fps.max(1),
            ema_interval_us: None,
            last_arrival_us: None,
            samples: 0,
            rate_limit_required: false,
        }
    }

    /// Record a raw frame arrival at `now_us`
    pub fn record_arrival(&mut self, now_us: u64) {
        if let Some(last) = self.last_arrival_us {
            let interval = now_us.saturating_sub(last) as f64;
            if interval > 0.0 {
                self.ema_interval_us = Some(match self.ema_interval_us {
                    Some(ema) => ema + EMA_ALPHA * (interval - ema),
                    None => interval,
                });
                self.samples += 1;
            }
        }
        self.last_arrival_us = Some(now_us);

        if self.samples >= WARMUP_SAMPLES {
            let measured = self.measured_fps().unwrap_or(0.0);
            self.rate_limit_required = measured > self.target_fps as f64 + RATE_LIMIT_MARGIN;
        }
    }

    /// Estimated source frame rate, `None` before the first interval
    pub fn measured_fps(&self) -> Option<f64> {
        self.ema_interval_us.map(|us| 1_000_000.0 / us)
    }

    /// Whether pre-capture pacing is needed; always `false` during warmup
    pub fn rate_limit_required(&self) -> bool {
        self.rate_limit_required
    }
}

/// Fixed-interval pacer with bounded catch-up.
///
/// The schedule advances by whole intervals so a late iteration is absorbed
/// by shortening the next sleep; once more than two intervals have been
/// missed the schedule snaps back to now.
pub struct Pacer {
    interval_us: u64,
    last_published_us: Option<u64>,
}

impl Pacer {
    pub fn new(target_fps: u32) -> Self {
        Self {
            interval_us: 1_000_000 / target_fps.max(1) as u64,
            last_published_us: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }

    /// How long to sleep before the next capture, updating the schedule.
    /// The caller is expected to sleep the returned duration.
    pub fn delay_before_capture(&mut self, now_us: u64) -> Duration {
        let last = match self.last_published_us {
            Some(last) => last,
            None => {
                self.last_published_us = Some(now_us);
                return Duration::ZERO;
            }
        };

        let target = last + self.interval_us;
        if now_us < target {
            self.last_published_us = Some(target);
            return Duration::from_micros(target - now_us);
        }

        let missed = (now_us - target) / self.interval_us;
        if missed > 2 {
            self.last_published_us = Some(now_us);
        } else {
            self.last_published_us = Some(target);
        }
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_steady(detector: &mut SourceRateDetector, interval_us: u64, count: u32) {
        let mut now = 1_000_000u64;
        for _ in 0..count {
            detector.record_arrival(now);
            now += interval_us;
        }
    }

    #[test]
    fn test_no_rate_limit_during_warmup() {
        let mut detector = SourceRateDetector::new(15);
        // 100 fps source but only a handful of samples
        feed_steady(&mut detector, 10_000, 10);
        assert!(!detector.rate_limit_required());
    }

    #[test]
    fn test_fast_source_triggers_rate_limit() {
        let mut detector = SourceRateDetector::new(15);
        // 30 fps source against a 15 fps target
        feed_steady(&mut detector, 33_333, 40);
        assert!(detector.rate_limit_required());
        let fps = detector.measured_fps().unwrap();
        assert!((fps - 30.0).abs() < 2.0, "measured {fps}");
    }

    #[test]
    fn test_matching_source_never_paces() {
        let mut detector = SourceRateDetector::new(15);
        // Camera paced at 15 fps; within the +2 margin
        feed_steady(&mut detector, 66_666, 60);
        assert!(!detector.rate_limit_required());
    }

    #[test]
    fn test_slightly_fast_source_within_margin() {
        let mut detector = SourceRateDetector::new(15);
        // 16 fps measured, target+2 = 17 -> no limiting
        feed_steady(&mut detector, 62_500, 60);
        assert!(!detector.rate_limit_required());
    }

    #[test]
    fn test_pacer_first_call_is_immediate() {
        let mut pacer = Pacer::new(10);
        assert_eq!(pacer.delay_before_capture(1_000_000), Duration::ZERO);
    }

    #[test]
    fn test_pacer_schedules_fixed_interval() {
        let mut pacer = Pacer::new(10); // 100 ms interval
        pacer.delay_before_capture(1_000_000);
        let delay = pacer.delay_before_capture(1_020_000);
        assert_eq!(delay, Duration::from_micros(80_000));
    }

    #[test]
    fn test_pacer_catches_up_after_overshoot() {
        let mut pacer = Pacer::new(10);
        pacer.delay_before_capture(1_000_000);
        // 30 ms late: no sleep, schedule advances by one interval only
        assert_eq!(pacer.delay_before_capture(1_130_000), Duration::ZERO);
        // Next target is 1_200_000, so the following sleep is shortened
        let delay = pacer.delay_before_capture(1_150_000);
        assert_eq!(delay, Duration::from_micros(50_000));
    }

    #[test]
    fn test_pacer_resets_after_long_stall() {
        let mut pacer = Pacer::new(10);
        pacer.delay_before_capture(1_000_000);
        // More than two missed intervals: schedule snaps to now
        assert_eq!(pacer.delay_before_capture(1_450_000), Duration::ZERO);
        let delay = pacer.delay_before_capture(1_500_000);
        assert_eq!(delay, Duration::from_micros(50_000));
    }
}
