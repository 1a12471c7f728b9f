// Core building blocks
pub mod core;

// Feature modules
pub mod control;
pub mod display;
pub mod flv;
pub mod hw;
pub mod pipeline;
pub mod streaming;

// Application coordination
pub mod app;

// Re-export common types at the crate root
pub use app::{PrintcamOrchestrator, ShutdownReason};
pub use control::ControlSurface;
pub use core::config::PrintcamConfig;
pub use core::dials::{Dials, DialsSnapshot};
pub use core::error::{PrintcamError, Result};
pub use core::frame::{monotonic_us, FrameInfo, Surface, SurfaceFormat, Topic};
pub use core::slot::{ConsumerGuard, FrameSlot, Topics};
pub use display::{DisplayCapture, DisplayGate};
pub use flv::FlvMuxer;
pub use hw::CapabilitySet;
pub use pipeline::{Pipeline, PipelineHandle, PipelineMode};
pub use streaming::{FlvHttpServer, JpegHttpServer};
