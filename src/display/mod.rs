pub mod convert;
pub mod rotation;

use crate::core::config::DisplayConfig;
use crate::core::dials::Dials;
use crate::core::error::Result;
use crate::core::frame::Topic;
use crate::core::slot::Topics;
use crate::hw::{FramebufferSource, JpegEncoder, Rotator};
use rotation::Rotation;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poll interval while the capture is gated off
const IDLE_POLL: Duration = Duration::from_millis(200);

/// Watcher refcount for on-demand display capture.
///
/// The gate is owned by the display subsystem; the HTTP servers hold an
/// `Arc` handle and raise the count for the lifetime of each `/display`
/// request, so no strong ownership cycle exists between server and capture.
pub struct DisplayGate {
    watchers: AtomicUsize,
}

impl DisplayGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            watchers: AtomicUsize::new(0),
        })
    }

    /// Raise the watcher count until the returned guard is dropped
    pub fn watch(self: &Arc<Self>) -> DisplayWatchGuard {
        self.watchers.fetch_add(1, Ordering::SeqCst);
        DisplayWatchGuard {
            gate: Arc::clone(self),
        }
    }

    pub fn count(&self) -> usize {
        self.watchers.load(Ordering::SeqCst)
    }
}

/// RAII registration of one display watcher
pub struct DisplayWatchGuard {
    gate: Arc<DisplayGate>,
}

impl Drop for DisplayWatchGuard {
    fn drop(&mut self) {
        self.gate.watchers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Framebuffer capture task: grab, rotate per printer model, convert,
/// hardware-JPEG-encode, publish on the display topic. Runs only while the
/// feature is enabled and at least one watcher is registered; otherwise it
/// sleeps.
pub struct DisplayCapture {
    topics: Topics,
    dials: Arc<Dials>,
    gate: Arc<DisplayGate>,
    framebuffer: Box<dyn FramebufferSource>,
    encoder: Box<dyn JpegEncoder>,
    rotator: Box<dyn Rotator>,
    rotation: Rotation,
    cancel: CancellationToken,
}

impl DisplayCapture {
    pub fn new(
        config: &DisplayConfig,
        topics: Topics,
        dials: Arc<Dials>,
        gate: Arc<DisplayGate>,
        framebuffer: Box<dyn FramebufferSource>,
        encoder: Box<dyn JpegEncoder>,
        rotator: Box<dyn Rotator>,
        cancel: CancellationToken,
    ) -> Self {
        dials.set_display_enabled(config.enabled);
        dials.set_display_fps(config.fps);

        let rotation = rotation::load_model_id(&config.model_info_path)
            .map(Rotation::for_model)
            .unwrap_or(Rotation::None);
        let (fb_w, fb_h) = framebuffer.dimensions();
        info!(
            "Display capture ready: {}x{} source, rotation {} degrees",
            fb_w,
            fb_h,
            rotation.degrees()
        );

        Self {
            topics,
            dials,
            gate,
            framebuffer,
            encoder,
            rotator,
            rotation,
            cancel,
        }
    }

    pub async fn run(mut self) {
        let mut jpeg_buf: Vec<u8> = Vec::with_capacity(Topic::DisplayJpeg.max_payload());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let active = self.dials.display_enabled() && self.gate.count() > 0;
            if !active {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
                continue;
            }

            let interval = Duration::from_micros(1_000_000 / u64::from(self.dials.display_fps()));
            let started = Instant::now();

            match self.capture_once(&mut jpeg_buf) {
                Ok(len) => {
                    self.topics
                        .slot(Topic::DisplayJpeg)
                        .publish(&jpeg_buf[..len], None, false);
                    debug!("Display frame published ({} bytes)", len);
                }
                Err(e) => {
                    warn!("Display capture failed, frame skipped: {}", e);
                }
            }

            let elapsed = started.elapsed();
            if elapsed < interval {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval - elapsed) => {}
                }
            }
        }

        info!("Display capture stopped");
    }

    fn capture_once(&mut self, jpeg_buf: &mut Vec<u8>) -> Result<usize> {
        let surface = self.framebuffer.read_frame()?;
        let rotated = self.rotator.rotate(&surface, self.rotation)?;
        let nv12 = convert::bgrx_to_nv12(&rotated);
        let len = self.encoder.encode(&nv12, jpeg_buf)?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::mock::{MockFramebuffer, MockJpegEncoder};
    use rotation::CpuRotator;

    fn capture_with(enabled: bool) -> (DisplayCapture, Topics, Arc<Dials>, Arc<DisplayGate>, CancellationToken) {
        let topics = Topics::new();
        let dials = Dials::new(1, 16);
        let gate = DisplayGate::new();
        let cancel = CancellationToken::new();
        let config = DisplayConfig {
            enabled,
            fps: 10,
            model_info_path: "/nonexistent/model.json".to_string(),
            ..DisplayConfig::default()
        };
        let capture = DisplayCapture::new(
            &config,
            topics.clone(),
            Arc::clone(&dials),
            Arc::clone(&gate),
            Box::new(MockFramebuffer::new(160, 96)),
            Box::new(MockJpegEncoder::new()),
            Box::new(CpuRotator),
            cancel.clone(),
        );
        (capture, topics, dials, gate, cancel)
    }

    #[test]
    fn test_gate_counts_watchers() {
        let gate = DisplayGate::new();
        assert_eq!(gate.count(), 0);
        let g1 = gate.watch();
        let g2 = gate.watch();
        assert_eq!(gate.count(), 2);
        drop(g1);
        assert_eq!(gate.count(), 1);
        drop(g2);
        assert_eq!(gate.count(), 0);
    }

    #[tokio::test]
    async fn test_no_capture_without_watchers() {
        let (capture, topics, _dials, _gate, cancel) = capture_with(true);
        let task = tokio::spawn(capture.run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(topics.slot(Topic::DisplayJpeg).current_sequence(), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_capture_while_disabled() {
        let (capture, topics, _dials, gate, cancel) = capture_with(false);
        let _watch = gate.watch();
        let task = tokio::spawn(capture.run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(topics.slot(Topic::DisplayJpeg).current_sequence(), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_watched_capture_publishes_at_pace() {
        let (capture, topics, _dials, gate, cancel) = capture_with(true);
        let _watch = gate.watch();
        let task = tokio::spawn(capture.run());

        tokio::time::sleep(Duration::from_millis(650)).await;
        let seq = topics.slot(Topic::DisplayJpeg).current_sequence();
        // 10 fps pacing: roughly six frames in 650 ms
        assert!((3..=9).contains(&seq), "unexpected frame count {seq}");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_stops_when_watcher_leaves() {
        let (capture, topics, _dials, gate, cancel) = capture_with(true);
        let watch = gate.watch();
        let task = tokio::spawn(capture.run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(topics.slot(Topic::DisplayJpeg).current_sequence() > 0);

        drop(watch);
        tokio::time::sleep(Duration::from_millis(250)).await;
        let settled = topics.slot(Topic::DisplayJpeg).current_sequence();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            topics.slot(Topic::DisplayJpeg).current_sequence(),
            settled,
            "capture kept running without watchers"
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_runtime_enable_starts_capture() {
        let (capture, topics, dials, gate, cancel) = capture_with(false);
        let _watch = gate.watch();
        let task = tokio::spawn(capture.run());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(topics.slot(Topic::DisplayJpeg).current_sequence(), 0);

        // Control surface flips the dial at runtime
        dials.set_display_enabled(true);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(topics.slot(Topic::DisplayJpeg).current_sequence() > 0);

        cancel.cancel();
        task.await.unwrap();
    }
}
