// Hardware capability seams. The pipeline and display capture only ever see
// these traits; production implementations wrap the SoC SDK and device
// nodes, mock implementations drive the tests.

pub mod cpu;
pub mod fbdev;
pub mod mock;

use crate::core::error::{CameraError, DisplayError, HwError};
use crate::core::frame::Surface;
use std::time::Duration;

/// A captured camera buffer: either a compressed JPEG or a raw surface,
/// depending on the negotiated format.
#[derive(Debug, Clone)]
pub enum CapturedFrame {
    Jpeg(Vec<u8>),
    Raw(Surface),
}

/// Camera capture source. One dequeue/requeue cycle per pipeline iteration;
/// the implementation owns buffer negotiation and streaming state.
pub trait CameraSource: Send {
    /// Pull the next buffer, blocking up to `timeout`
    fn dequeue(&mut self, timeout: Duration) -> Result<CapturedFrame, CameraError>;

    /// Hand the buffer back to the driver
    fn requeue(&mut self) -> Result<(), CameraError>;

    /// Negotiated capture dimensions
    fn dimensions(&self) -> (u32, u32);

    /// Stop streaming and release buffers
    fn shutdown(&mut self);
}

/// Framebuffer capture source (32-bit BGRX)
pub trait FramebufferSource: Send {
    /// Blit the current framebuffer contents into a surface
    fn read_frame(&mut self) -> Result<Surface, DisplayError>;

    /// Framebuffer dimensions as reported by the device
    fn dimensions(&self) -> (u32, u32);
}

/// Hardware JPEG encoder channel
pub trait JpegEncoder: Send {
    /// Encode a planar surface into `dst`, returning the JPEG size
    fn encode(&mut self, surface: &Surface, dst: &mut Vec<u8>) -> Result<usize, HwError>;
}

/// Hardware JPEG decoder channel (JPEG-in pipeline mode)
pub trait JpegDecoder: Send {
    /// Decode a JPEG into a planar surface
    fn decode(&mut self, jpeg: &[u8]) -> Result<Surface, HwError>;
}

/// Hardware H.264 encoder channel. Output is an Annex-B access unit.
pub trait H264Encoder: Send {
    /// Submit a planar surface and collect the encoded access unit into
    /// `dst`, returning the byte count. A send or get timeout surfaces as
    /// `HwError::SendTimeout` / `HwError::GetTimeout`; the caller skips the
    /// frame and continues.
    fn encode(&mut self, surface: &Surface, dst: &mut Vec<u8>) -> Result<usize, HwError>;
}

/// Surface rotation capability (hardware accelerator or CPU fallback)
pub trait Rotator: Send {
    fn rotate(
        &mut self,
        src: &Surface,
        rotation: crate::display::rotation::Rotation,
    ) -> Result<Surface, DisplayError>;
}

/// Whole-system CPU utilisation sampler
pub trait CpuSampler: Send {
    /// Instantaneous utilisation percentage since the previous sample
    fn sample(&mut self) -> Option<f32>;
}

/// The full set of capabilities the orchestrator wires into the pipeline
/// and display capture. Encoder channels are separate instances on purpose:
/// the camera H.264 channel and the display JPEG channel run on different
/// threads.
pub struct CapabilitySet {
    pub camera: Box<dyn CameraSource>,
    /// JPEG encoder for the camera path (raw-in mode only)
    pub camera_jpeg_encoder: Option<Box<dyn JpegEncoder>>,
    /// JPEG decoder for the camera path (JPEG-in mode, feeds H.264)
    pub jpeg_decoder: Option<Box<dyn JpegDecoder>>,
    pub h264_encoder: Option<Box<dyn H264Encoder>>,
    pub framebuffer: Box<dyn FramebufferSource>,
    /// JPEG encoder channel owned by the display thread
    pub display_jpeg_encoder: Box<dyn JpegEncoder>,
    pub rotator: Box<dyn Rotator>,
    pub cpu: Box<dyn CpuSampler>,
}

impl CapabilitySet {
    /// Production capabilities. The framebuffer and CPU sampler are real;
    /// camera and encoder channels come from the SoC codec SDK, which this
    /// build does not link - init fails per the fatal-at-startup policy.
    pub fn probe(config: &crate::core::config::PrintcamConfig) -> Result<Self, HwError> {
        let _ = crate::hw::fbdev::FbdevSource::open(&config.display.framebuffer_device).map_err(
            |e| HwError::InitFailed {
                details: format!("framebuffer unavailable: {}", e),
            },
        )?;
        Err(HwError::InitFailed {
            details: "hardware codec SDK not linked in this build; run with --synthetic"
                .to_string(),
        })
    }

    /// Synthetic capabilities for bench and debug runs: mock camera and
    /// codec channels, real pacing everywhere else.
    pub fn synthetic(config: &crate::core::config::PrintcamConfig) -> Self {
        use crate::display::rotation::CpuRotator;
        use mock::{MockCamera, MockFramebuffer, MockH264Encoder, MockJpegDecoder, MockJpegEncoder};

        let camera = match config.camera.format.as_str() {
            "YUYV" => MockCamera::yuyv(config.camera.width, config.camera.height),
            _ => MockCamera::jpeg(config.camera.width, config.camera.height),
        }
        .with_source_fps(config.camera.fps.max(1) * 2);

        Self {
            camera: Box::new(camera),
            camera_jpeg_encoder: Some(Box::new(MockJpegEncoder::new())),
            jpeg_decoder: Some(Box::new(MockJpegDecoder)),
            h264_encoder: Some(Box::new(MockH264Encoder::new(u64::from(
                config.camera.fps.max(1),
            )))),
            framebuffer: Box::new(MockFramebuffer::new(800, 480)),
            display_jpeg_encoder: Box::new(MockJpegEncoder::new()),
            rotator: Box::new(CpuRotator),
            cpu: Box::new(cpu::ProcStatSampler::new()),
        }
    }
}
