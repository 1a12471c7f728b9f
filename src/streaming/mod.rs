pub mod clients;
pub mod flv;
pub mod jpeg;
pub mod listener;


use crate::core::config::{CameraConfig, FlvConfig, PipelineConfig, StreamConfig};
use crate::core::error::Result;
use crate::display::DisplayGate;
use crate::pipeline::PipelineHandle;
use clients::ClientRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Fan-out HTTP server for multipart JPEG streams and snapshots from the
/// camera and display topics
pub struct JpegHttpServer {
    listener: TcpListener,
    registry: ClientRegistry,
    state: jpeg::JpegServerState,
    idle_timeout: Duration,
    send_timeout: Duration,
    cancel: CancellationToken,
}

impl JpegHttpServer {
    /// Bind the listening socket; binding failure is fatal at startup
    pub async fn bind(
        config: &StreamConfig,
        handle: PipelineHandle,
        gate: Arc<DisplayGate>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = listener::bind(&config.ip, config.port).await?;
        let registry = ClientRegistry::new(config.max_clients);
        let state = jpeg::JpegServerState {
            handle,
            gate,
            registry: registry.clone(),
        };
        Ok(Self {
            listener,
            registry,
            state,
            idle_timeout: Duration::from_secs(config.idle_timeout_seconds),
            send_timeout: Duration::from_secs(config.send_timeout_seconds),
            cancel,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> ClientRegistry {
        self.registry.clone()
    }

    /// Serve until cancelled
    pub async fn serve(self) {
        listener::serve(
            self.listener,
            jpeg::router(self.state),
            self.registry,
            self.idle_timeout,
            self.send_timeout,
            self.cancel,
            "JPEG server",
        )
        .await;
    }
}

/// Fan-out HTTP server for FLV H.264 streams with per-client muxer state
pub struct FlvHttpServer {
    listener: TcpListener,
    registry: ClientRegistry,
    state: flv::FlvServerState,
    idle_timeout: Duration,
    send_timeout: Duration,
    cancel: CancellationToken,
}

impl FlvHttpServer {
    pub async fn bind(
        config: &FlvConfig,
        stream_config: &StreamConfig,
        camera_config: &CameraConfig,
        pipeline_config: &PipelineConfig,
        handle: PipelineHandle,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = listener::bind(&stream_config.ip, config.port).await?;
        let registry = ClientRegistry::new(config.max_clients);
        let state = flv::FlvServerState {
            handle,
            width: camera_config.width,
            height: camera_config.height,
            fps: camera_config.fps,
            bitrate_kbps: pipeline_config.h264_bitrate_kbps,
        };
        Ok(Self {
            listener,
            registry,
            state,
            idle_timeout: Duration::from_secs(stream_config.idle_timeout_seconds),
            send_timeout: Duration::from_secs(stream_config.send_timeout_seconds),
            cancel,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> ClientRegistry {
        self.registry.clone()
    }

    pub async fn serve(self) {
        listener::serve(
            self.listener,
            flv::router(self.state),
            self.registry,
            self.idle_timeout,
            self.send_timeout,
            self.cancel,
            "FLV server",
        )
        .await;
    }
}
