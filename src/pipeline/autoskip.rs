use crate::core::dials::Dials;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Rolling CPU readings retained for the smoothed decrease path
const HISTORY_LEN: usize = 8;
/// Minimum readings before the average is trusted
const MIN_AVG_SAMPLES: usize = 3;
/// Instantaneous overage steps: +8/+15/+25/+40 over target map to skip
/// increases of +1/+2/+3/+4
const FAST_THRESHOLDS: [f32; 4] = [8.0, 15.0, 25.0, 40.0];
/// Smoothed headroom below target required to count a stable-low tick
const SLOW_MARGIN: f32 = 20.0;
/// Consecutive stable-low ticks required before a decrease
const STABLE_LOW_REQUIRED: u32 = 6;
/// Cooldown after any increase before a decrease is allowed
const DECREASE_COOLDOWN_US: u64 = 3_000_000;

/// CPU-feedback skip controller: fast to raise the skip ratio on load
/// spikes, slow and hysteretic to lower it again. Whole-system protection
/// wins over smooth recovery; the SoC also runs the motion-control stack.
pub struct AutoSkipController {
    history: VecDeque<f32>,
    stable_low_count: u32,
    last_increase_us: u64,
}

/// Outcome of one controller tick, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipAdjustment {
    Unchanged,
    Increased { from: u32, to: u32 },
    Decreased { from: u32, to: u32 },
}

impl AutoSkipController {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
            stable_low_count: 0,
            last_increase_us: 0,
        }
    }

    /// Run one tick with an instantaneous CPU reading. Reads the target and
    /// current ratio from the dials and writes any adjustment back.
    pub fn tick(&mut self, cpu_percent: f32, now_us: u64, dials: &Dials) -> SkipAdjustment {
        self.history.push_back(cpu_percent);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        let target = dials.target_cpu() as f32;
        let current = dials.skip_ratio();

        // Fast path: react to the instantaneous reading
        let overage = cpu_percent - target;
        if overage > FAST_THRESHOLDS[0] {
            let step = FAST_THRESHOLDS.iter().filter(|&&t| overage > t).count() as u32;
            let to = (current + step).min(dials.max_skip());
            self.last_increase_us = now_us;
            self.stable_low_count = 0;
            if to != current {
                dials.set_skip_ratio(to);
                info!(
                    cpu = cpu_percent,
                    target, from = current, to, "auto-skip raised skip ratio"
                );
                return SkipAdjustment::Increased { from: current, to };
            }
            return SkipAdjustment::Unchanged;
        }

        // Slow path: react to the smoothed history
        if self.history.len() >= MIN_AVG_SAMPLES {
            let avg: f32 = self.history.iter().sum::<f32>() / self.history.len() as f32;
            if avg < target - SLOW_MARGIN {
                self.stable_low_count += 1;
            } else {
                self.stable_low_count = 0;
            }

            let cooled_down = now_us.saturating_sub(self.last_increase_us) >= DECREASE_COOLDOWN_US;
            if cooled_down
                && self.stable_low_count >= STABLE_LOW_REQUIRED
                && current > dials.min_skip()
            {
                let to = current - 1;
                dials.set_skip_ratio(to);
                self.stable_low_count = 0;
                debug!(avg, target, from = current, to, "auto-skip lowered skip ratio");
                return SkipAdjustment::Decreased { from: current, to };
            }
        }

        SkipAdjustment::Unchanged
    }
}

impl Default for AutoSkipController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000;

    fn dials() -> std::sync::Arc<Dials> {
        let d = Dials::new(1, 16);
        d.set_target_cpu(60);
        d.set_skip_ratio(1);
        d
    }

    #[test]
    fn test_fast_path_step_sizes() {
        // (cpu, expected step) around the +8/+15/+25/+40 thresholds
        for (cpu, step) in [(69.0, 1), (76.0, 2), (86.0, 3), (101.0, 4)] {
            let d = dials();
            let mut ctl = AutoSkipController::new();
            let adj = ctl.tick(cpu, SEC, &d);
            assert_eq!(
                adj,
                SkipAdjustment::Increased {
                    from: 1,
                    to: 1 + step
                },
                "cpu {cpu}"
            );
        }
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let d = dials();
        let mut ctl = AutoSkipController::new();
        // Exactly target+8 does not trigger the fast path
        assert_eq!(ctl.tick(68.0, SEC, &d), SkipAdjustment::Unchanged);
        assert_eq!(d.skip_ratio(), 1);
    }

    #[test]
    fn test_increase_clamps_at_max() {
        let d = dials();
        d.set_skip_ratio(15);
        let mut ctl = AutoSkipController::new();
        ctl.tick(120.0, SEC, &d);
        assert_eq!(d.skip_ratio(), 16);
        // Already pinned at max: no further change reported
        assert_eq!(ctl.tick(120.0, 2 * SEC, &d), SkipAdjustment::Unchanged);
    }

    #[test]
    fn test_ramp_raises_within_one_tick_per_step() {
        let d = dials();
        let mut ctl = AutoSkipController::new();
        let mut now = SEC;
        for cpu in [70.0, 75.0, 80.0, 85.0, 90.0] {
            let before = d.skip_ratio();
            ctl.tick(cpu, now, &d);
            assert!(d.skip_ratio() > before, "no raise at cpu {cpu}");
            now += SEC / 2;
        }
    }

    #[test]
    fn test_no_decrease_during_cooldown() {
        let d = dials();
        let mut ctl = AutoSkipController::new();
        ctl.tick(90.0, SEC, &d);
        let raised = d.skip_ratio();
        assert!(raised > 1);

        // 30% CPU readings every 500 ms, still inside the 3 s cooldown
        let mut now = SEC + 500_000;
        while now < SEC + DECREASE_COOLDOWN_US {
            ctl.tick(30.0, now, &d);
            assert_eq!(d.skip_ratio(), raised, "decreased during cooldown");
            now += 500_000;
        }
    }

    #[test]
    fn test_decrease_requires_six_stable_low_readings() {
        let d = dials();
        d.set_skip_ratio(8);
        let mut ctl = AutoSkipController::new();

        // Cooldown long expired (last_increase_us = 0), history must still
        // accumulate six consecutive sub-threshold readings
        let mut now = 10 * SEC;
        for i in 1..STABLE_LOW_REQUIRED {
            ctl.tick(30.0, now, &d);
            assert_eq!(d.skip_ratio(), 8, "decreased after only {i} readings");
            now += 500_000;
        }
        let adj = ctl.tick(30.0, now, &d);
        assert_eq!(adj, SkipAdjustment::Decreased { from: 8, to: 7 });
    }

    #[test]
    fn test_high_reading_resets_stable_low() {
        let d = dials();
        d.set_skip_ratio(8);
        let mut ctl = AutoSkipController::new();

        let mut now = 10 * SEC;
        for _ in 0..5 {
            ctl.tick(30.0, now, &d);
            now += 500_000;
        }
        // One reading above target-20 resets the counter (55 > 40)
        ctl.tick(55.0, now, &d);
        now += 500_000;
        for _ in 0..5 {
            ctl.tick(30.0, now, &d);
            now += 500_000;
            assert_eq!(d.skip_ratio(), 8);
        }
        ctl.tick(30.0, now, &d);
        assert_eq!(d.skip_ratio(), 7);
    }

    #[test]
    fn test_decrease_stops_at_min_skip() {
        let d = dials();
        d.set_skip_ratio(1);
        let mut ctl = AutoSkipController::new();
        let mut now = 10 * SEC;
        for _ in 0..20 {
            ctl.tick(20.0, now, &d);
            now += 500_000;
        }
        assert_eq!(d.skip_ratio(), 1);
    }

    #[test]
    fn test_average_needs_three_samples() {
        let d = dials();
        d.set_skip_ratio(4);
        let mut ctl = AutoSkipController::new();
        // Two readings are never enough for the slow path to count
        assert_eq!(ctl.tick(10.0, 10 * SEC, &d), SkipAdjustment::Unchanged);
        assert_eq!(ctl.tick(10.0, 11 * SEC, &d), SkipAdjustment::Unchanged);
        assert_eq!(d.skip_ratio(), 4);
    }
}
