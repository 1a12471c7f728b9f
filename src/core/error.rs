use std::time::Duration;
use thiserror::Error;

/// Main error type for the printcam system
#[derive(Error, Debug)]
pub enum PrintcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Stream server error: {0}")]
    Stream(#[from] StreamError),

    #[error("FLV muxing error: {0}")]
    Flv(#[from] FlvError),

    #[error("Display capture error: {0}")]
    Display(#[from] DisplayError),

    #[error("Control surface error: {0}")]
    Control(#[from] ControlError),

    #[error("Hardware capability error: {0}")]
    Hw(#[from] HwError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Graceful shutdown requested")]
    Shutdown,
}

/// Camera source error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera device {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Unsupported capture format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to configure camera: {details}")]
    Configuration { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },

    #[error("Camera disconnected")]
    Disconnected,

    #[error("Frame timeout after {timeout:?}")]
    FrameTimeout { timeout: Duration },
}

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Malformed JPEG frame: {details}")]
    MalformedJpeg { details: String },

    #[error("Encoder rejected frame: {details}")]
    EncodeRejected { details: String },

    #[error("Snapshot request timed out after {timeout:?}")]
    SnapshotTimeout { timeout: Duration },
}

/// Stream server error types
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Client connection error: {details}")]
    ClientConnection { details: String },

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),
}

/// FLV muxer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlvError {
    #[error("Annex-B stream contains no start code")]
    NoStartCode,

    #[error("NAL unit truncated at offset {offset}")]
    TruncatedNal { offset: usize },

    #[error("Sequence header requested before SPS/PPS were seen")]
    MissingParameterSets,
}

/// Display capture error types
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Failed to open framebuffer device {device}: {source}")]
    FramebufferOpen {
        device: String,
        source: std::io::Error,
    },

    #[error("Framebuffer error: {details}")]
    Framebuffer { details: String },

    #[error("Unsupported framebuffer format: {bits_per_pixel} bpp")]
    UnsupportedDepth { bits_per_pixel: u32 },

    #[error("Frame rotation failed: {details}")]
    Rotation { details: String },

    #[error("Display capture not available (disabled)")]
    NotAvailable,
}

/// Control surface error types
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to read control file {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write control file {path}: {source}")]
    WriteFailed {
        path: String,
        source: std::io::Error,
    },
}

/// Hardware capability error types
#[derive(Error, Debug)]
pub enum HwError {
    #[error("Capability initialization failed: {details}")]
    InitFailed { details: String },

    #[error("Encoder send timed out after {timeout:?}")]
    SendTimeout { timeout: Duration },

    #[error("Encoder get timed out after {timeout:?}")]
    GetTimeout { timeout: Duration },

    #[error("Encode failed: {details}")]
    EncodeFailed { details: String },

    #[error("Decode failed: {details}")]
    DecodeFailed { details: String },
}

impl PrintcamError {
    /// Create a system error with a message
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Errors that abort process startup (exit code 1). Everything else is
    /// contained to one client or one frame.
    pub fn is_fatal(&self) -> bool {
        match self {
            PrintcamError::Config(_) => true,
            PrintcamError::Stream(StreamError::BindFailed { .. }) => true,
            PrintcamError::Stream(StreamError::StartupFailed { .. }) => true,
            PrintcamError::Display(DisplayError::FramebufferOpen { .. }) => true,
            PrintcamError::Hw(HwError::InitFailed { .. }) => true,
            PrintcamError::Camera(CameraError::DeviceOpen { .. }) => true,
            PrintcamError::Pipeline(PipelineError::StartupFailed { .. }) => true,
            _ => false,
        }
    }

    /// Get the component name associated with this error
    pub fn component_name(&self) -> &'static str {
        match self {
            PrintcamError::Config(_) => "config",
            PrintcamError::Io(_) => "io",
            PrintcamError::Camera(_) => "camera",
            PrintcamError::Pipeline(_) => "pipeline",
            PrintcamError::Stream(_) => "stream",
            PrintcamError::Flv(_) => "flv",
            PrintcamError::Display(_) => "display",
            PrintcamError::Control(_) => "control",
            PrintcamError::Hw(_) => "hw",
            PrintcamError::System { .. } => "system",
            PrintcamError::Shutdown => "system",
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, PrintcamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let camera_error = PrintcamError::Camera(CameraError::DeviceOpen {
            device: "/dev/video0".to_string(),
            details: "busy".to_string(),
        });
        assert_eq!(
            camera_error.to_string(),
            "Camera error: Failed to open camera device /dev/video0: busy"
        );

        let system_error = PrintcamError::system("test system error");
        assert_eq!(system_error.to_string(), "System error: test system error");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PrintcamError::Stream(StreamError::BindFailed {
            address: "0.0.0.0:8080".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        })
        .is_fatal());
        assert!(PrintcamError::Hw(HwError::InitFailed {
            details: "no encoder".to_string()
        })
        .is_fatal());

        // Per-frame and per-client seams never abort the process
        assert!(!PrintcamError::Hw(HwError::SendTimeout {
            timeout: Duration::from_millis(100)
        })
        .is_fatal());
        assert!(!PrintcamError::Pipeline(PipelineError::MalformedJpeg {
            details: "missing SOI".to_string()
        })
        .is_fatal());
        assert!(!PrintcamError::Stream(StreamError::ClientConnection {
            details: "EPIPE".to_string()
        })
        .is_fatal());
    }

    #[test]
    fn test_component_name() {
        assert_eq!(
            PrintcamError::Camera(CameraError::Disconnected).component_name(),
            "camera"
        );
        assert_eq!(
            PrintcamError::Flv(FlvError::NoStartCode).component_name(),
            "flv"
        );
        assert_eq!(PrintcamError::system("x").component_name(), "system");
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let err = PrintcamError::Display(DisplayError::FramebufferOpen {
            device: "/dev/fb0".to_string(),
            source: io_error,
        });
        assert!(err.source().is_some());
    }
}
