pub mod autoskip;
pub mod convert;
pub mod rate;

use crate::control::ControlSurface;
use crate::core::config::{CameraConfig, ControlConfig, PipelineConfig};
use crate::core::dials::Dials;
use crate::core::frame::{jpeg_looks_valid, monotonic_us, Surface, Topic};
use crate::core::slot::Topics;
use crate::flv::nal;
use crate::hw::{CameraSource, CapturedFrame, CpuSampler, H264Encoder, JpegDecoder, JpegEncoder};
use autoskip::AutoSkipController;
use rate::{Pacer, SourceRateDetector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Auto-skip controller cadence
const AUTOSKIP_TICK_US: u64 = 500_000;
/// Stats/write-back cadence
const STATS_TICK_US: u64 = 1_000_000;
/// Nap taken when no client is connected
const IDLE_SLEEP: Duration = Duration::from_millis(500);
/// Camera dequeue timeout per iteration
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(1);
/// Client-activity ramp length
const RAMP_DURATION_US: u64 = 3_000_000;

/// Input mode selected at startup from the negotiated camera format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Camera delivers compressed JPEG; pass through, decode for H.264
    JpegPassthrough,
    /// Camera delivers packed YUV; encode JPEG and H.264 from the surface
    RawSurface,
}

impl PipelineMode {
    pub fn from_format(format: &str) -> Self {
        match format {
            "YUYV" => PipelineMode::RawSurface,
            _ => PipelineMode::JpegPassthrough,
        }
    }
}

/// Cheap cloneable handle onto the running pipeline: the topics, the dials,
/// the snapshot request flag and the running flag. Both HTTP servers receive
/// one at construction; no global state exists.
#[derive(Clone)]
pub struct PipelineHandle {
    topics: Topics,
    dials: Arc<Dials>,
    snapshot_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl PipelineHandle {
    pub fn new(topics: Topics, dials: Arc<Dials>) -> Self {
        Self {
            topics,
            dials,
            snapshot_requested: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn dials(&self) -> &Arc<Dials> {
        &self.dials
    }

    /// One-shot flag checked by the idle loop; the next successful capture
    /// fulfils it
    pub fn request_snapshot(&self) {
        self.snapshot_requested.store(true, Ordering::SeqCst);
    }

    pub fn snapshot_pending(&self) -> bool {
        self.snapshot_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_snapshot(&self) {
        self.snapshot_requested.store(false, Ordering::SeqCst);
    }

    /// Ask for a fresh camera JPEG and wait until the topic's sequence
    /// advances past the point of request. Returns `false` on timeout.
    pub async fn fresh_snapshot(&self, timeout: Duration) -> bool {
        let slot = self.topics.slot(Topic::CameraJpeg);
        let observed = slot.current_sequence();
        self.request_snapshot();
        slot.wait_for_new(observed, timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the pipeline after its current iteration and wake all slot
    /// waiters so servers can observe the shutdown
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.topics.broadcast_wakeup_all();
    }
}

/// Client-activity warmup: after the first client connects, process 1/4,
/// 1/2 then 3/4 of frames over three one-second phases before resuming full
/// rate.
struct ActivityRamp {
    started_us: Option<u64>,
    candidate: u64,
}

impl ActivityRamp {
    fn new() -> Self {
        Self {
            started_us: None,
            candidate: 0,
        }
    }

    fn observe(&mut self, consumers: usize, now_us: u64) {
        if consumers == 0 {
            self.started_us = None;
        } else if self.started_us.is_none() {
            self.started_us = Some(now_us);
            self.candidate = 0;
            info!("Client activity resumed; ramping capture over 3 s");
        }
    }

    fn permits(&mut self, now_us: u64) -> bool {
        let Some(started) = self.started_us else {
            return true;
        };
        let elapsed = now_us.saturating_sub(started);
        if elapsed >= RAMP_DURATION_US {
            return true;
        }
        self.candidate += 1;
        match elapsed / 1_000_000 {
            0 => self.candidate % 4 == 0,
            1 => self.candidate % 2 == 0,
            _ => self.candidate % 4 != 3,
        }
    }
}

/// The capture/transcode/publish loop. Runs on one dedicated thread; all
/// hardware channels are owned here and never shared.
pub struct Pipeline {
    mode: PipelineMode,
    target_fps: u32,
    server_mode: bool,
    emit_unconditionally: bool,
    poll_iterations: u64,
    auto_skip_configured: bool,

    camera: Box<dyn CameraSource>,
    jpeg_encoder: Option<Box<dyn JpegEncoder>>,
    jpeg_decoder: Option<Box<dyn JpegDecoder>>,
    h264_encoder: Option<Box<dyn H264Encoder>>,
    cpu: Box<dyn CpuSampler>,

    control: ControlSurface,
    handle: PipelineHandle,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera_config: &CameraConfig,
        pipeline_config: &PipelineConfig,
        control_config: &ControlConfig,
        camera: Box<dyn CameraSource>,
        jpeg_encoder: Option<Box<dyn JpegEncoder>>,
        jpeg_decoder: Option<Box<dyn JpegDecoder>>,
        h264_encoder: Option<Box<dyn H264Encoder>>,
        cpu: Box<dyn CpuSampler>,
        handle: PipelineHandle,
    ) -> Self {
        let dials = handle.dials();
        dials.set_h264_enabled(pipeline_config.h264_enabled);
        dials.set_auto_skip(pipeline_config.auto_skip);
        dials.set_target_cpu(pipeline_config.target_cpu);
        dials.set_skip_ratio(pipeline_config.skip_ratio);

        Self {
            mode: PipelineMode::from_format(&camera_config.format),
            target_fps: camera_config.fps,
            server_mode: pipeline_config.server_mode,
            emit_unconditionally: pipeline_config.emit_unconditionally,
            poll_iterations: control_config.poll_iterations.max(1) as u64,
            auto_skip_configured: pipeline_config.auto_skip,
            camera,
            jpeg_encoder,
            jpeg_decoder,
            h264_encoder,
            cpu,
            control: ControlSurface::new(control_config.path.clone()),
            handle,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Run until the handle is shut down. Blocking; intended for a
    /// dedicated thread.
    pub fn run(mut self) {
        info!(
            mode = ?self.mode,
            fps = self.target_fps,
            "Pipeline started"
        );

        let topics = self.handle.topics().clone();
        let dials = Arc::clone(self.handle.dials());

        let mut detector = SourceRateDetector::new(self.target_fps);
        let mut pacer = Pacer::new(self.target_fps);
        let mut autoskip = AutoSkipController::new();
        let mut ramp = ActivityRamp::new();

        let mut iterations: u64 = 0;
        let mut processed: u64 = 0;
        let mut jpeg_frames_interval: u32 = 0;
        let mut h264_frames_interval: u32 = 0;
        let mut last_autoskip_us = monotonic_us();
        let mut last_stats_us = monotonic_us();

        let mut jpeg_buf: Vec<u8> = Vec::with_capacity(Topic::CameraJpeg.max_payload());
        let mut h264_buf: Vec<u8> = Vec::with_capacity(Topic::CameraH264.max_payload());

        // Initial control-surface read so operator settings apply at startup
        self.control.poll(&dials);

        while self.handle.is_running() {
            iterations += 1;
            if iterations % self.poll_iterations == 0 {
                self.control.poll(&dials);
            }

            if detector.rate_limit_required() {
                let delay = pacer.delay_before_capture(monotonic_us());
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }

            let captured = match self.camera.dequeue(CAPTURE_TIMEOUT) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Capture failed, skipping frame: {}", e);
                    std::thread::sleep(Duration::from_millis(50));
                    continue;
                }
            };
            let now = monotonic_us();
            detector.record_arrival(now);

            let snapshot_pending = self.handle.snapshot_pending();

            if self.server_mode {
                let consumers = topics.camera_consumer_count();
                ramp.observe(consumers, now);

                if consumers == 0 && !snapshot_pending {
                    let _ = self.camera.requeue();
                    self.idle_nap();
                    continue;
                }

                if !ramp.permits(now) && !snapshot_pending {
                    let _ = self.camera.requeue();
                    continue;
                }
            }
            processed += 1;

            // Produce the JPEG and, in raw mode, the planar surface
            let mut raw_surface: Option<Surface> = None;
            match captured {
                CapturedFrame::Jpeg(jpeg) => {
                    if !jpeg_looks_valid(&jpeg) {
                        debug!("Malformed JPEG dropped ({} bytes)", jpeg.len());
                        let _ = self.camera.requeue();
                        continue;
                    }
                    jpeg_buf.clear();
                    jpeg_buf.extend_from_slice(&jpeg);
                }
                CapturedFrame::Raw(surface) => {
                    let nv12 = convert::yuyv_to_nv12(&surface);
                    let encoder = self
                        .jpeg_encoder
                        .as_mut()
                        .expect("raw-in mode requires a JPEG encoder");
                    if let Err(e) = encoder.encode(&nv12, &mut jpeg_buf) {
                        warn!("JPEG encode failed, skipping frame: {}", e);
                        let _ = self.camera.requeue();
                        continue;
                    }
                    raw_surface = Some(nv12);
                }
            }

            // Publish JPEG only when someone is listening (or forced)
            let jpeg_wanted = !self.server_mode
                || self.emit_unconditionally
                || snapshot_pending
                || topics.consumer_count(Topic::CameraJpeg) > 0;
            if jpeg_wanted {
                topics
                    .slot(Topic::CameraJpeg)
                    .publish(&jpeg_buf, Some(now), false);
                jpeg_frames_interval += 1;
                if snapshot_pending {
                    self.handle.clear_snapshot();
                }
            }

            // H.264 decision: enabled, someone listening, skip ratio due
            let skip = dials.skip_ratio() as u64;
            let h264_due = skip <= 1 || processed % skip == 1;
            let h264_wanted = dials.h264_enabled()
                && (!self.server_mode || topics.consumer_count(Topic::CameraH264) > 0)
                && h264_due;

            if h264_wanted {
                if let Some(encoder) = self.h264_encoder.as_mut() {
                    let surface = match raw_surface.take() {
                        Some(s) => Some(s),
                        None => match self.jpeg_decoder.as_mut() {
                            Some(decoder) => match decoder.decode(&jpeg_buf) {
                                Ok(s) => Some(s),
                                Err(e) => {
                                    warn!("JPEG decode failed, skipping H.264 frame: {}", e);
                                    None
                                }
                            },
                            None => None,
                        },
                    };

                    if let Some(surface) = surface {
                        match encoder.encode(&surface, &mut h264_buf) {
                            Ok(len) => {
                                let keyframe = nal::contains_idr(&h264_buf[..len]);
                                topics.slot(Topic::CameraH264).publish(
                                    &h264_buf[..len],
                                    Some(now),
                                    keyframe,
                                );
                                h264_frames_interval += 1;
                            }
                            Err(e) => {
                                // The channel survives; the watchdog is the
                                // surrounding process manager
                                warn!("H.264 encode failed, frame skipped: {}", e);
                            }
                        }
                    }
                }
            }

            let _ = self.camera.requeue();

            // Periodic tasks
            let now = monotonic_us();
            if now.saturating_sub(last_autoskip_us) >= AUTOSKIP_TICK_US {
                last_autoskip_us = now;
                if dials.auto_skip() {
                    if let Some(cpu) = self.cpu.sample() {
                        autoskip.tick(cpu, now, &dials);
                    }
                }
            }
            if now.saturating_sub(last_stats_us) >= STATS_TICK_US {
                let elapsed_s = now.saturating_sub(last_stats_us) as f32 / 1_000_000.0;
                last_stats_us = now;
                dials.record_mjpeg_fps(jpeg_frames_interval as f32 / elapsed_s);
                dials.record_h264_fps(h264_frames_interval as f32 / elapsed_s);
                jpeg_frames_interval = 0;
                h264_frames_interval = 0;

                self.control.poll(&dials);
                if let Err(e) = self.control.write_back(
                    &dials,
                    topics.consumer_count(Topic::CameraJpeg),
                    topics.consumer_count(Topic::CameraH264),
                ) {
                    debug!("Control write-back failed: {}", e);
                }
            }
        }

        self.camera.shutdown();
        info!(
            iterations,
            processed,
            auto_skip = self.auto_skip_configured,
            "Pipeline stopped"
        );
    }

    /// Idle nap in short slices so snapshot requests and shutdown stay
    /// responsive
    fn idle_nap(&self) {
        let slices = 5;
        for _ in 0..slices {
            if !self.handle.is_running() || self.handle.snapshot_pending() {
                return;
            }
            std::thread::sleep(IDLE_SLEEP / slices);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CameraConfig, ControlConfig, PipelineConfig};
    use crate::core::error::CameraError;
    use crate::hw::mock::{MockCamera, MockH264Encoder, MockJpegDecoder, ScriptedCpuSampler};
    use std::sync::atomic::AtomicU64;

    fn test_configs(server_mode: bool, skip: u32, auto_skip: bool) -> (CameraConfig, PipelineConfig, ControlConfig) {
        let dir = std::env::temp_dir().join(format!(
            "printcam-test-ctrl-{}-{}",
            std::process::id(),
            monotonic_us()
        ));
        let camera = CameraConfig {
            fps: 1000, // effectively unpaced in tests
            ..CameraConfig::default()
        };
        let pipeline = PipelineConfig {
            server_mode,
            skip_ratio: skip,
            auto_skip,
            ..PipelineConfig::default()
        };
        let control = ControlConfig {
            path: dir.to_string_lossy().to_string(),
            poll_iterations: 1_000_000, // keep the control file out of the way
        };
        (camera, pipeline, control)
    }

    fn spawn_pipeline(pipeline: Pipeline) -> (PipelineHandle, std::thread::JoinHandle<()>) {
        let handle = pipeline.handle();
        let join = std::thread::spawn(move || pipeline.run());
        (handle, join)
    }

    fn build_pipeline(
        server_mode: bool,
        skip: u32,
        camera: MockCamera,
    ) -> (Pipeline, PipelineHandle) {
        let (camera_cfg, pipeline_cfg, control_cfg) = test_configs(server_mode, skip, false);
        let topics = Topics::new();
        let dials = Dials::new(1, 16);
        let handle = PipelineHandle::new(topics, dials);
        let pipeline = Pipeline::new(
            &camera_cfg,
            &pipeline_cfg,
            &control_cfg,
            Box::new(camera),
            None,
            Some(Box::new(MockJpegDecoder)),
            Some(Box::new(MockH264Encoder::new(10))),
            Box::new(ScriptedCpuSampler::new([])),
            handle.clone(),
        );
        (pipeline, handle)
    }

    #[test]
    fn test_idle_pipeline_does_not_capture() {
        let camera = MockCamera::jpeg(320, 240);
        let dequeues = camera.dequeue_counter();
        let (pipeline, handle) = build_pipeline(true, 1, camera);
        let (_, join) = spawn_pipeline(pipeline);

        // No consumers: one dequeue per 500 ms idle nap at most
        std::thread::sleep(Duration::from_millis(700));
        let count = dequeues.load(Ordering::SeqCst);
        assert!(count <= 3, "pipeline kept capturing while idle: {count}");
        assert_eq!(handle.topics().slot(Topic::CameraJpeg).current_sequence(), 0);

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_consumers_wake_capture_and_publish() {
        let (pipeline, handle) = build_pipeline(true, 1, MockCamera::jpeg(320, 240));
        let topics = handle.topics().clone();
        let _guard = topics.subscribe(Topic::CameraJpeg);
        let (_, join) = spawn_pipeline(pipeline);

        // Ramp phases keep early rates down but frames must flow
        std::thread::sleep(Duration::from_millis(400));
        assert!(topics.slot(Topic::CameraJpeg).current_sequence() > 0);

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_skip_ratio_divides_h264_rate() {
        let skip = 4u64;
        let (pipeline, handle) = build_pipeline(false, skip as u32, MockCamera::jpeg(320, 240));
        handle.dials().set_auto_skip(false);
        handle.dials().set_skip_ratio(skip as u32);
        let topics = handle.topics().clone();
        let (_, join) = spawn_pipeline(pipeline);

        std::thread::sleep(Duration::from_millis(500));
        handle.shutdown();
        join.join().unwrap();

        let jpeg_seq = topics.slot(Topic::CameraJpeg).current_sequence();
        let h264_seq = topics.slot(Topic::CameraH264).current_sequence();
        assert!(jpeg_seq > 100, "too few frames processed: {jpeg_seq}");
        let expected = jpeg_seq / skip;
        let tolerance = expected / 10 + 2;
        assert!(
            h264_seq.abs_diff(expected) <= tolerance,
            "jpeg {jpeg_seq}, h264 {h264_seq}, expected ~{expected}"
        );
    }

    #[test]
    fn test_skip_ratio_one_encodes_every_frame() {
        let (pipeline, handle) = build_pipeline(false, 1, MockCamera::jpeg(320, 240));
        handle.dials().set_auto_skip(false);
        let topics = handle.topics().clone();
        let (_, join) = spawn_pipeline(pipeline);

        std::thread::sleep(Duration::from_millis(300));
        handle.shutdown();
        join.join().unwrap();

        let jpeg_seq = topics.slot(Topic::CameraJpeg).current_sequence();
        let h264_seq = topics.slot(Topic::CameraH264).current_sequence();
        assert!(jpeg_seq > 0);
        assert!(h264_seq.abs_diff(jpeg_seq) <= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snapshot_fulfilled_from_idle() {
        let (pipeline, handle) = build_pipeline(true, 1, MockCamera::jpeg(320, 240));
        let pipeline_handle = pipeline.handle();
        let join = std::thread::spawn(move || pipeline.run());

        // Give the loop time to reach its idle nap
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            handle.topics().slot(Topic::CameraJpeg).current_sequence(),
            0
        );

        let got = handle.fresh_snapshot(Duration::from_secs(3)).await;
        assert!(got, "snapshot not fulfilled within 3 s");
        assert!(handle.topics().slot(Topic::CameraJpeg).current_sequence() > 0);

        pipeline_handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_h264_encoder_failures_do_not_stop_pipeline() {
        let encoder = MockH264Encoder::new(10);
        let failures = encoder.failure_handle();
        failures.store(2, Ordering::SeqCst);

        let (camera_cfg, pipeline_cfg, control_cfg) = test_configs(false, 1, false);
        let topics = Topics::new();
        let handle = PipelineHandle::new(topics.clone(), Dials::new(1, 16));
        let pipeline = Pipeline::new(
            &camera_cfg,
            &pipeline_cfg,
            &control_cfg,
            Box::new(MockCamera::jpeg(320, 240)),
            None,
            Some(Box::new(MockJpegDecoder)),
            Some(Box::new(encoder)),
            Box::new(ScriptedCpuSampler::new([])),
            handle.clone(),
        );
        let (_, join) = spawn_pipeline(pipeline);

        std::thread::sleep(Duration::from_millis(300));
        handle.shutdown();
        join.join().unwrap();

        // Two scripted timeouts were absorbed; later frames still published
        assert!(topics.slot(Topic::CameraH264).current_sequence() > 0);
    }

    #[test]
    fn test_malformed_jpeg_frames_are_dropped() {
        struct BadJpegCamera {
            dequeues: Arc<AtomicU64>,
        }
        impl CameraSource for BadJpegCamera {
            fn dequeue(&mut self, _t: Duration) -> Result<CapturedFrame, CameraError> {
                self.dequeues.fetch_add(1, Ordering::SeqCst);
                Ok(CapturedFrame::Jpeg(vec![0xDE, 0xAD, 0xBE, 0xEF]))
            }
            fn requeue(&mut self) -> Result<(), CameraError> {
                Ok(())
            }
            fn dimensions(&self) -> (u32, u32) {
                (320, 240)
            }
            fn shutdown(&mut self) {}
        }

        let dequeues = Arc::new(AtomicU64::new(0));
        let (camera_cfg, pipeline_cfg, control_cfg) = test_configs(false, 1, false);
        let handle = PipelineHandle::new(Topics::new(), Dials::new(1, 16));
        let pipeline = Pipeline::new(
            &camera_cfg,
            &pipeline_cfg,
            &control_cfg,
            Box::new(BadJpegCamera {
                dequeues: Arc::clone(&dequeues),
            }),
            None,
            Some(Box::new(MockJpegDecoder)),
            Some(Box::new(MockH264Encoder::new(10))),
            Box::new(ScriptedCpuSampler::new([])),
            handle.clone(),
        );
        let topics = handle.topics().clone();
        let (_, join) = spawn_pipeline(pipeline);

        std::thread::sleep(Duration::from_millis(200));
        handle.shutdown();
        join.join().unwrap();

        assert!(dequeues.load(Ordering::SeqCst) > 0, "camera never polled");
        assert_eq!(topics.slot(Topic::CameraJpeg).current_sequence(), 0);
        assert_eq!(topics.slot(Topic::CameraH264).current_sequence(), 0);
    }

    #[test]
    fn test_raw_mode_publishes_both_topics() {
        let (camera_cfg, pipeline_cfg, control_cfg) = test_configs(false, 1, false);
        let camera_cfg = CameraConfig {
            format: "YUYV".to_string(),
            ..camera_cfg
        };
        let handle = PipelineHandle::new(Topics::new(), Dials::new(1, 16));
        let pipeline = Pipeline::new(
            &camera_cfg,
            &pipeline_cfg,
            &control_cfg,
            Box::new(MockCamera::yuyv(320, 240)),
            Some(Box::new(crate::hw::mock::MockJpegEncoder::new())),
            None,
            Some(Box::new(MockH264Encoder::new(10))),
            Box::new(ScriptedCpuSampler::new([])),
            handle.clone(),
        );
        let topics = handle.topics().clone();
        let (_, join) = spawn_pipeline(pipeline);

        std::thread::sleep(Duration::from_millis(300));
        handle.shutdown();
        join.join().unwrap();

        assert!(topics.slot(Topic::CameraJpeg).current_sequence() > 0);
        assert!(topics.slot(Topic::CameraH264).current_sequence() > 0);
    }

    #[test]
    fn test_h264_disabled_publishes_jpeg_only() {
        let (pipeline, handle) = build_pipeline(false, 1, MockCamera::jpeg(320, 240));
        handle.dials().set_h264_enabled(false);
        let topics = handle.topics().clone();
        let (_, join) = spawn_pipeline(pipeline);

        std::thread::sleep(Duration::from_millis(200));
        handle.shutdown();
        join.join().unwrap();

        assert!(topics.slot(Topic::CameraJpeg).current_sequence() > 0);
        assert_eq!(topics.slot(Topic::CameraH264).current_sequence(), 0);
    }

    #[test]
    fn test_activity_ramp_fractions() {
        let mut ramp = ActivityRamp::new();
        ramp.observe(1, 0);

        // Phase 0 (first second): one in four candidates permitted
        let permitted = (0..100).filter(|_| ramp.permits(500_000)).count();
        assert_eq!(permitted, 25);

        // Phase 1: half
        ramp.candidate = 0;
        let permitted = (0..100).filter(|_| ramp.permits(1_500_000)).count();
        assert_eq!(permitted, 50);

        // Phase 2: three in four
        ramp.candidate = 0;
        let permitted = (0..100).filter(|_| ramp.permits(2_500_000)).count();
        assert_eq!(permitted, 75);

        // After 3 s: everything
        let permitted = (0..100).filter(|_| ramp.permits(3_100_000)).count();
        assert_eq!(permitted, 100);

        // Dropping to zero consumers resets the ramp
        ramp.observe(0, 4_000_000);
        ramp.observe(2, 4_100_000);
        let permitted = (0..100).filter(|_| ramp.permits(4_200_000)).count();
        assert_eq!(permitted, 25);
    }

    #[test]
    fn test_mode_selection_from_format() {
        assert_eq!(
            PipelineMode::from_format("MJPG"),
            PipelineMode::JpegPassthrough
        );
        assert_eq!(PipelineMode::from_format("YUYV"), PipelineMode::RawSurface);
    }
}
