// Application coordination: component wiring and lifecycle

pub mod orchestrator;
pub mod shutdown;

pub use orchestrator::PrintcamOrchestrator;
pub use shutdown::ShutdownReason;
