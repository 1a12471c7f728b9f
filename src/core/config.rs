use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::core::dials::{DISPLAY_FPS_MAX, DISPLAY_FPS_MIN, TARGET_CPU_MAX, TARGET_CPU_MIN};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrintcamConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub flv: FlvConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device path
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Capture width in pixels
    #[serde(default = "default_camera_width")]
    pub width: u32,

    /// Capture height in pixels
    #[serde(default = "default_camera_height")]
    pub height: u32,

    /// Target frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Capture format (MJPG or YUYV)
    #[serde(default = "default_camera_format")]
    pub format: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Initial H.264 encode enable bit
    #[serde(default = "default_true")]
    pub h264_enabled: bool,

    /// Enable the CPU-feedback skip controller
    #[serde(default = "default_true")]
    pub auto_skip: bool,

    /// CPU percent target for the skip controller (20-90)
    #[serde(default = "default_target_cpu")]
    pub target_cpu: u32,

    /// Initial/manual skip ratio
    #[serde(default = "default_min_skip")]
    pub skip_ratio: u32,

    /// Lower bound for the skip ratio
    #[serde(default = "default_min_skip")]
    pub min_skip: u32,

    /// Upper bound for the skip ratio
    #[serde(default = "default_max_skip")]
    pub max_skip: u32,

    /// Gate capture and publish on connected clients
    #[serde(default = "default_true")]
    pub server_mode: bool,

    /// Publish JPEG frames even with zero consumers
    #[serde(default)]
    pub emit_unconditionally: bool,

    /// Estimated H.264 bitrate in kbps, reported in FLV metadata
    #[serde(default = "default_h264_bitrate")]
    pub h264_bitrate_kbps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// IP address to bind to
    #[serde(default = "default_bind_ip")]
    pub ip: String,

    /// JPEG streaming port
    #[serde(default = "default_stream_port")]
    pub port: u16,

    /// Maximum concurrent client connections
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Seconds before a request-less connection is evicted
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Seconds a streaming write may stall before the client is dropped
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FlvConfig {
    /// FLV streaming port
    #[serde(default = "default_flv_port")]
    pub port: u16,

    /// Maximum concurrent client connections
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    /// Initial display capture enable bit
    #[serde(default)]
    pub enabled: bool,

    /// Framebuffer device path
    #[serde(default = "default_framebuffer_device")]
    pub framebuffer_device: String,

    /// Display capture pacing (1-10 fps)
    #[serde(default = "default_display_fps")]
    pub fps: u32,

    /// Printer model description file; its model identifier selects the
    /// framebuffer rotation
    #[serde(default = "default_model_info_path")]
    pub model_info_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControlConfig {
    /// Plain-text key=value control surface path
    #[serde(default = "default_control_path")]
    pub path: String,

    /// Capture iterations between control-file polls
    #[serde(default = "default_poll_iterations")]
    pub poll_iterations: u32,
}

impl PrintcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("printcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Configuration file is optional; every value has a default
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables with PRINTCAM_ prefix
            .add_source(Environment::with_prefix("PRINTCAM").separator("_"))
            .build()?;

        let config: PrintcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        match self.camera.format.as_str() {
            "MJPG" | "YUYV" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "Unsupported camera format '{}' (expected MJPG or YUYV)",
                    other
                )));
            }
        }

        if self.pipeline.min_skip == 0 {
            return Err(ConfigError::Message(
                "Pipeline min_skip must be at least 1".to_string(),
            ));
        }

        if self.pipeline.max_skip < self.pipeline.min_skip {
            return Err(ConfigError::Message(
                "Pipeline max_skip must be >= min_skip".to_string(),
            ));
        }

        if !(TARGET_CPU_MIN..=TARGET_CPU_MAX).contains(&self.pipeline.target_cpu) {
            return Err(ConfigError::Message(format!(
                "Pipeline target_cpu must be within {}-{}",
                TARGET_CPU_MIN, TARGET_CPU_MAX
            )));
        }

        if self.stream.max_clients == 0 || self.flv.max_clients == 0 {
            return Err(ConfigError::Message(
                "max_clients must be at least 1".to_string(),
            ));
        }

        if self.stream.send_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Stream send_timeout_seconds must be at least 1".to_string(),
            ));
        }

        if self.stream.port == self.flv.port {
            return Err(ConfigError::Message(
                "Stream and FLV ports must differ".to_string(),
            ));
        }

        if !(DISPLAY_FPS_MIN..=DISPLAY_FPS_MAX).contains(&self.display.fps) {
            return Err(ConfigError::Message(format!(
                "Display fps must be within {}-{}",
                DISPLAY_FPS_MIN, DISPLAY_FPS_MAX
            )));
        }

        if self.control.poll_iterations == 0 {
            return Err(ConfigError::Message(
                "Control poll_iterations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PrintcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            pipeline: PipelineConfig::default(),
            stream: StreamConfig::default(),
            flv: FlvConfig::default(),
            display: DisplayConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
            format: default_camera_format(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            h264_enabled: true,
            auto_skip: true,
            target_cpu: default_target_cpu(),
            skip_ratio: default_min_skip(),
            min_skip: default_min_skip(),
            max_skip: default_max_skip(),
            server_mode: true,
            emit_unconditionally: false,
            h264_bitrate_kbps: default_h264_bitrate(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ip: default_bind_ip(),
            port: default_stream_port(),
            max_clients: default_max_clients(),
            idle_timeout_seconds: default_idle_timeout(),
            send_timeout_seconds: default_send_timeout(),
        }
    }
}

impl Default for FlvConfig {
    fn default() -> Self {
        Self {
            port: default_flv_port(),
            max_clients: default_max_clients(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            framebuffer_device: default_framebuffer_device(),
            fps: default_display_fps(),
            model_info_path: default_model_info_path(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            path: default_control_path(),
            poll_iterations: default_poll_iterations(),
        }
    }
}

// Default value functions
fn default_camera_device() -> String {
    "/dev/video0".to_string()
}
fn default_camera_width() -> u32 {
    1280
}
fn default_camera_height() -> u32 {
    720
}
fn default_camera_fps() -> u32 {
    15
}
fn default_camera_format() -> String {
    "MJPG".to_string()
}

fn default_true() -> bool {
    true
}
fn default_target_cpu() -> u32 {
    60
}
fn default_min_skip() -> u32 {
    1
}
fn default_max_skip() -> u32 {
    16
}
fn default_h264_bitrate() -> u32 {
    1500
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_stream_port() -> u16 {
    8080
}
fn default_flv_port() -> u16 {
    18088
}
fn default_max_clients() -> usize {
    24
}
fn default_idle_timeout() -> u64 {
    10
}
fn default_send_timeout() -> u64 {
    2
}

fn default_framebuffer_device() -> String {
    "/dev/fb0".to_string()
}
fn default_display_fps() -> u32 {
    2
}
fn default_model_info_path() -> String {
    "/etc/printcam/model.json".to_string()
}

fn default_control_path() -> String {
    "/tmp/h264_ctrl".to_string()
}
fn default_poll_iterations() -> u32 {
    30
}
