use super::shutdown::{wait_for_shutdown, ShutdownReason};
use crate::core::config::PrintcamConfig;
use crate::core::dials::Dials;
use crate::core::error::Result;
use crate::core::slot::Topics;
use crate::display::{DisplayCapture, DisplayGate};
use crate::hw::CapabilitySet;
use crate::pipeline::{Pipeline, PipelineHandle};
use crate::streaming::{FlvHttpServer, JpegHttpServer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wires configuration and capabilities into the running system: one
/// pipeline thread, two streaming servers, one display capture task.
/// Teardown happens in reverse initialisation order.
pub struct PrintcamOrchestrator {
    handle: PipelineHandle,
    cancel: CancellationToken,
    pipeline: Option<Pipeline>,
    display: Option<DisplayCapture>,
    jpeg_server: Option<JpegHttpServer>,
    flv_server: Option<FlvHttpServer>,
}

impl std::fmt::Debug for PrintcamOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintcamOrchestrator").finish_non_exhaustive()
    }
}

impl PrintcamOrchestrator {
    /// Initialise every component. Any failure here is fatal; the process
    /// exits with code 1.
    pub async fn new(config: PrintcamConfig, caps: CapabilitySet) -> Result<Self> {
        let topics = Topics::new();
        let dials = Dials::new(config.pipeline.min_skip, config.pipeline.max_skip);
        let handle = PipelineHandle::new(topics.clone(), Arc::clone(&dials));
        let gate = DisplayGate::new();
        let cancel = CancellationToken::new();

        let pipeline = Pipeline::new(
            &config.camera,
            &config.pipeline,
            &config.control,
            caps.camera,
            caps.camera_jpeg_encoder,
            caps.jpeg_decoder,
            caps.h264_encoder,
            caps.cpu,
            handle.clone(),
        );

        let display = DisplayCapture::new(
            &config.display,
            topics,
            dials,
            Arc::clone(&gate),
            caps.framebuffer,
            caps.display_jpeg_encoder,
            caps.rotator,
            cancel.clone(),
        );

        // Bind both listening sockets up front so a port conflict aborts
        // startup instead of surfacing mid-run
        let jpeg_server = JpegHttpServer::bind(
            &config.stream,
            handle.clone(),
            Arc::clone(&gate),
            cancel.clone(),
        )
        .await?;
        let flv_server = FlvHttpServer::bind(
            &config.flv,
            &config.stream,
            &config.camera,
            &config.pipeline,
            handle.clone(),
            cancel.clone(),
        )
        .await?;

        info!(
            "Initialised: stream port {}, FLV port {}",
            config.stream.port, config.flv.port
        );

        Ok(Self {
            handle,
            cancel,
            pipeline: Some(pipeline),
            display: Some(display),
            jpeg_server: Some(jpeg_server),
            flv_server: Some(flv_server),
        })
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until a shutdown signal arrives; returns the process exit code
    pub async fn run(mut self) -> Result<i32> {
        let pipeline = self.pipeline.take().expect("pipeline already taken");
        let display = self.display.take().expect("display already taken");
        let jpeg_server = self.jpeg_server.take().expect("jpeg server already taken");
        let flv_server = self.flv_server.take().expect("flv server already taken");

        let pipeline_thread = tokio::task::spawn_blocking(move || pipeline.run());
        let display_task = tokio::spawn(display.run());
        let jpeg_task = tokio::spawn(jpeg_server.serve());
        let flv_task = tokio::spawn(flv_server.serve());

        let reason = wait_for_shutdown(&self.cancel).await;
        info!("Shutdown initiated ({:?})", reason);

        // Reverse order: stop the producer first (this also wakes every
        // slot waiter), then the consumers, then the capture task
        self.handle.shutdown();
        self.cancel.cancel();

        if let Err(e) = pipeline_thread.await {
            warn!("Pipeline thread panicked: {:?}", e);
        }
        for (name, task) in [
            ("jpeg server", jpeg_task),
            ("flv server", flv_task),
            ("display capture", display_task),
        ] {
            if let Err(e) = task.await {
                warn!("{} task panicked: {:?}", name, e);
            }
        }

        info!("Shutdown complete");
        Ok(match reason {
            ShutdownReason::Signal | ShutdownReason::Internal => 0,
        })
    }
}
