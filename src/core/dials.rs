use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Bounds accepted by the control surface
pub const TARGET_CPU_MIN: u32 = 20;
pub const TARGET_CPU_MAX: u32 = 90;
pub const DISPLAY_FPS_MIN: u32 = 1;
pub const DISPLAY_FPS_MAX: u32 = 10;

/// Process-wide runtime dials, written by the control surface and the
/// auto-skip controller, read by the pipeline and display capture. All
/// fields are atomics; no lock is ever taken on this path.
pub struct Dials {
    h264_enabled: AtomicBool,
    skip_ratio: AtomicU32,
    auto_skip: AtomicBool,
    target_cpu: AtomicU32,
    display_enabled: AtomicBool,
    display_fps: AtomicU32,
    min_skip: u32,
    max_skip: u32,

    // Observed values written back to the control surface every second
    mjpeg_fps_x10: AtomicU32,
    h264_fps_x10: AtomicU32,
}

/// Point-in-time view of the dials, used for logging and write-back
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DialsSnapshot {
    pub h264_enabled: bool,
    pub skip_ratio: u32,
    pub auto_skip: bool,
    pub target_cpu: u32,
    pub display_enabled: bool,
    pub display_fps: u32,
    pub mjpeg_fps: f32,
    pub h264_fps: f32,
}

impl Dials {
    pub fn new(min_skip: u32, max_skip: u32) -> Arc<Self> {
        let min_skip = min_skip.max(1);
        let max_skip = max_skip.max(min_skip);
        Arc::new(Self {
            h264_enabled: AtomicBool::new(true),
            skip_ratio: AtomicU32::new(min_skip),
            auto_skip: AtomicBool::new(true),
            target_cpu: AtomicU32::new(60),
            display_enabled: AtomicBool::new(false),
            display_fps: AtomicU32::new(2),
            min_skip,
            max_skip,
            mjpeg_fps_x10: AtomicU32::new(0),
            h264_fps_x10: AtomicU32::new(0),
        })
    }

    pub fn h264_enabled(&self) -> bool {
        self.h264_enabled.load(Ordering::Relaxed)
    }

    pub fn set_h264_enabled(&self, enabled: bool) {
        self.h264_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn skip_ratio(&self) -> u32 {
        self.skip_ratio.load(Ordering::Relaxed)
    }

    /// Clamped into `[min_skip, max_skip]`
    pub fn set_skip_ratio(&self, ratio: u32) {
        let clamped = ratio.clamp(self.min_skip, self.max_skip);
        self.skip_ratio.store(clamped, Ordering::Relaxed);
    }

    pub fn min_skip(&self) -> u32 {
        self.min_skip
    }

    pub fn max_skip(&self) -> u32 {
        self.max_skip
    }

    pub fn auto_skip(&self) -> bool {
        self.auto_skip.load(Ordering::Relaxed)
    }

    pub fn set_auto_skip(&self, enabled: bool) {
        self.auto_skip.store(enabled, Ordering::Relaxed);
    }

    pub fn target_cpu(&self) -> u32 {
        self.target_cpu.load(Ordering::Relaxed)
    }

    /// Clamped into `[20, 90]` percent
    pub fn set_target_cpu(&self, percent: u32) {
        let clamped = percent.clamp(TARGET_CPU_MIN, TARGET_CPU_MAX);
        self.target_cpu.store(clamped, Ordering::Relaxed);
    }

    pub fn display_enabled(&self) -> bool {
        self.display_enabled.load(Ordering::Relaxed)
    }

    pub fn set_display_enabled(&self, enabled: bool) {
        self.display_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn display_fps(&self) -> u32 {
        self.display_fps.load(Ordering::Relaxed)
    }

    /// Clamped into `[1, 10]` fps
    pub fn set_display_fps(&self, fps: u32) {
        let clamped = fps.clamp(DISPLAY_FPS_MIN, DISPLAY_FPS_MAX);
        self.display_fps.store(clamped, Ordering::Relaxed);
    }

    pub fn record_mjpeg_fps(&self, fps: f32) {
        self.mjpeg_fps_x10
            .store((fps * 10.0).round() as u32, Ordering::Relaxed);
    }

    pub fn record_h264_fps(&self, fps: f32) {
        self.h264_fps_x10
            .store((fps * 10.0).round() as u32, Ordering::Relaxed);
    }

    pub fn mjpeg_fps(&self) -> f32 {
        self.mjpeg_fps_x10.load(Ordering::Relaxed) as f32 / 10.0
    }

    pub fn h264_fps(&self) -> f32 {
        self.h264_fps_x10.load(Ordering::Relaxed) as f32 / 10.0
    }

    pub fn snapshot(&self) -> DialsSnapshot {
        DialsSnapshot {
            h264_enabled: self.h264_enabled(),
            skip_ratio: self.skip_ratio(),
            auto_skip: self.auto_skip(),
            target_cpu: self.target_cpu(),
            display_enabled: self.display_enabled(),
            display_fps: self.display_fps(),
            mjpeg_fps: self.mjpeg_fps(),
            h264_fps: self.h264_fps(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_ratio_clamping() {
        let dials = Dials::new(1, 8);
        dials.set_skip_ratio(0);
        assert_eq!(dials.skip_ratio(), 1);
        dials.set_skip_ratio(5);
        assert_eq!(dials.skip_ratio(), 5);
        dials.set_skip_ratio(100);
        assert_eq!(dials.skip_ratio(), 8);
    }

    #[test]
    fn test_target_cpu_clamping() {
        let dials = Dials::new(1, 8);
        dials.set_target_cpu(5);
        assert_eq!(dials.target_cpu(), TARGET_CPU_MIN);
        dials.set_target_cpu(99);
        assert_eq!(dials.target_cpu(), TARGET_CPU_MAX);
        dials.set_target_cpu(55);
        assert_eq!(dials.target_cpu(), 55);
    }

    #[test]
    fn test_display_fps_clamping() {
        let dials = Dials::new(1, 8);
        dials.set_display_fps(0);
        assert_eq!(dials.display_fps(), DISPLAY_FPS_MIN);
        dials.set_display_fps(30);
        assert_eq!(dials.display_fps(), DISPLAY_FPS_MAX);
    }

    #[test]
    fn test_degenerate_skip_bounds() {
        let dials = Dials::new(0, 0);
        assert_eq!(dials.min_skip(), 1);
        assert_eq!(dials.max_skip(), 1);
        dials.set_skip_ratio(10);
        assert_eq!(dials.skip_ratio(), 1);
    }

    #[test]
    fn test_fps_roundtrip() {
        let dials = Dials::new(1, 8);
        dials.record_mjpeg_fps(14.96);
        dials.record_h264_fps(7.5);
        assert!((dials.mjpeg_fps() - 15.0).abs() < 0.01);
        assert!((dials.h264_fps() - 7.5).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let dials = Dials::new(1, 16);
        dials.set_h264_enabled(false);
        dials.set_skip_ratio(4);
        dials.set_auto_skip(false);
        dials.set_display_enabled(true);

        let snap = dials.snapshot();
        assert!(!snap.h264_enabled);
        assert_eq!(snap.skip_ratio, 4);
        assert!(!snap.auto_skip);
        assert!(snap.display_enabled);
    }
}
