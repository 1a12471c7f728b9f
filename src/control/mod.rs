use crate::core::dials::Dials;
use crate::core::error::ControlError;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, trace, warn};

/// Plain-text `key=value` control surface.
///
/// Operators (and the printer's supervisor process) drive the runtime dials
/// by rewriting this file; the pipeline polls it every ~30 capture
/// iterations and writes observed stats back once a second. Malformed lines
/// are ignored and the prior value kept.
pub struct ControlSurface {
    path: PathBuf,
}

#[derive(Debug, Default, Clone, Copy)]
struct ParsedKeys {
    h264: Option<bool>,
    skip: Option<u32>,
    auto_skip: Option<bool>,
    target_cpu: Option<u32>,
    display_enabled: Option<bool>,
    display_fps: Option<u32>,
}

impl ControlSurface {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Re-read the control file and apply recognised keys to the dials.
    /// A missing file is not an error; the dials keep their values.
    pub fn poll(&self, dials: &Dials) {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Control file {} unreadable: {}", self.path.display(), e);
                return;
            }
        };

        let parsed = parse_keys(&contents);

        if let Some(enabled) = parsed.h264 {
            dials.set_h264_enabled(enabled);
        }
        if let Some(enabled) = parsed.auto_skip {
            dials.set_auto_skip(enabled);
        }
        // Manual skip is honoured only while the controller is off
        if let Some(skip) = parsed.skip {
            if !dials.auto_skip() {
                dials.set_skip_ratio(skip);
            } else {
                trace!("skip key ignored while auto_skip=1");
            }
        }
        if let Some(target) = parsed.target_cpu {
            dials.set_target_cpu(target);
        }
        if let Some(enabled) = parsed.display_enabled {
            dials.set_display_enabled(enabled);
        }
        if let Some(fps) = parsed.display_fps {
            dials.set_display_fps(fps);
        }
    }

    /// Serialise the dials plus observed stats back to the file. With
    /// auto-skip on the controller owns `skip`; with it off the value
    /// written is whatever the operator last set, so their setting is
    /// preserved verbatim across rewrites.
    pub fn write_back(
        &self,
        dials: &Dials,
        jpeg_clients: usize,
        h264_clients: usize,
    ) -> Result<(), ControlError> {
        let snap = dials.snapshot();
        let contents = format!(
            "h264={}\n\
             skip={}\n\
             auto_skip={}\n\
             target_cpu={}\n\
             display_enabled={}\n\
             display_fps={}\n\
             mjpeg_fps={:.1}\n\
             h264_fps={:.1}\n\
             jpeg_clients={}\n\
             h264_clients={}\n",
            snap.h264_enabled as u8,
            snap.skip_ratio,
            snap.auto_skip as u8,
            snap.target_cpu,
            snap.display_enabled as u8,
            snap.display_fps,
            snap.mjpeg_fps,
            snap.h264_fps,
            jpeg_clients,
            h264_clients,
        );

        fs::write(&self.path, contents).map_err(|e| ControlError::WriteFailed {
            path: self.path.display().to_string(),
            source: e,
        })?;
        debug!("Control surface written back to {}", self.path.display());
        Ok(())
    }
}

fn parse_keys(contents: &str) -> ParsedKeys {
    let mut parsed = ParsedKeys::default();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            trace!("Ignoring malformed control line: {}", line);
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "h264" => parsed.h264 = parse_bool(value).or(parsed.h264),
            "skip" => {
                parsed.skip = value
                    .parse::<u32>()
                    .ok()
                    .filter(|&v| v >= 1)
                    .or(parsed.skip)
            }
            "auto_skip" => parsed.auto_skip = parse_bool(value).or(parsed.auto_skip),
            "target_cpu" => parsed.target_cpu = value.parse().ok().or(parsed.target_cpu),
            "display_enabled" => {
                parsed.display_enabled = parse_bool(value).or(parsed.display_enabled)
            }
            "display_fps" => parsed.display_fps = value.parse().ok().or(parsed.display_fps),
            // Stats we wrote back ourselves; ignore on the way in
            _ => {}
        }
    }
    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}
