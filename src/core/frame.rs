use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;

/// The three frame topics the system publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Compressed JPEG frames from the camera
    CameraJpeg,
    /// H.264 Annex-B access units from the camera
    CameraH264,
    /// Compressed JPEG frames from the framebuffer
    DisplayJpeg,
}

impl Topic {
    /// Maximum payload the topic's slot reserves at construction
    pub fn max_payload(&self) -> usize {
        match self {
            Topic::CameraJpeg => 512 * 1024,
            Topic::CameraH264 => 256 * 1024,
            Topic::DisplayJpeg => 256 * 1024,
        }
    }

    /// Topic name for logging and stats
    pub fn name(&self) -> &'static str {
        match self {
            Topic::CameraJpeg => "camera_jpeg",
            Topic::CameraH264 => "camera_h264",
            Topic::DisplayJpeg => "display_jpeg",
        }
    }
}

/// Metadata returned by a slot copy-out, paired with the copied payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Bytes copied into the destination (0 if nothing was ever published)
    pub len: usize,
    /// Per-slot sequence number, starting at 1
    pub sequence: u64,
    /// Monotonic microseconds at publish time
    pub timestamp_us: u64,
    /// Keyframe flag (meaningful for H.264 only)
    pub keyframe: bool,
}

impl FrameInfo {
    /// The empty info returned before the first publish
    pub fn empty() -> Self {
        Self {
            len: 0,
            sequence: 0,
            timestamp_us: 0,
            keyframe: false,
        }
    }

    /// Age of the frame relative to `now_us`, saturating at zero
    pub fn age_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.timestamp_us)
    }
}

/// Pixel layout of a raw capture surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceFormat {
    /// Packed YUV 4:2:2 as delivered by USB cameras
    Yuyv,
    /// Planar luma + interleaved half-resolution chroma
    Nv12,
    /// 32-bit BGRX as read from the framebuffer
    Bgrx,
}

impl SurfaceFormat {
    /// Bytes required for a `width` x `height` surface
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            SurfaceFormat::Yuyv => pixels * 2,
            SurfaceFormat::Nv12 => pixels * 3 / 2,
            SurfaceFormat::Bgrx => pixels * 4,
        }
    }
}

/// A raw capture surface handed between the camera, converters and encoders.
#[derive(Debug, Clone)]
pub struct Surface {
    pub format: SurfaceFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Surface {
    pub fn new(format: SurfaceFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            data: vec![0u8; format.frame_size(width, height)],
        }
    }

    /// Surface dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

static CLOCK_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic microseconds since process start. All media timestamps use this
/// clock; wall-clock jumps never affect pacing or staleness checks.
pub fn monotonic_us() -> u64 {
    let epoch = CLOCK_EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}

/// Minimal JPEG sanity check applied before a frame is decoded or published:
/// SOI marker, at least one SOF segment, EOI trailer.
pub fn jpeg_looks_valid(data: &[u8]) -> bool {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return false;
    }
    if data[data.len() - 2] != 0xFF || data[data.len() - 1] != 0xD9 {
        return false;
    }
    // Scan markers for a start-of-frame (0xC0..=0xCF excluding DHT/DAC/RST)
    let mut i = 2usize;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        match marker {
            0xC4 | 0xC8 | 0xCC => {}
            0xC0..=0xCF => return true,
            0xD9 => return false,
            _ => {}
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            i += 2;
            continue;
        }
        let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if seg_len < 2 {
            return false;
        }
        i += 2 + seg_len;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_capacities() {
        assert_eq!(Topic::CameraJpeg.max_payload(), 524_288);
        assert_eq!(Topic::CameraH264.max_payload(), 262_144);
        assert_eq!(Topic::DisplayJpeg.max_payload(), 262_144);
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let a = monotonic_us();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = monotonic_us();
        assert!(b > a);
    }

    #[test]
    fn test_surface_sizes() {
        assert_eq!(SurfaceFormat::Yuyv.frame_size(640, 480), 640 * 480 * 2);
        assert_eq!(SurfaceFormat::Nv12.frame_size(640, 480), 640 * 480 * 3 / 2);
        assert_eq!(SurfaceFormat::Bgrx.frame_size(800, 480), 800 * 480 * 4);
    }

    fn minimal_jpeg() -> Vec<u8> {
        // SOI, APP0 (2-byte empty), SOF0 with a 5x5 grayscale header, EOI
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x02]);
        v.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x05, 0x00, 0x05, 0x01, 0x01, 0x11, 0x00,
        ]);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    #[test]
    fn test_jpeg_sanity_accepts_wellformed() {
        assert!(jpeg_looks_valid(&minimal_jpeg()));
    }

    #[test]
    fn test_jpeg_sanity_rejects_missing_markers() {
        assert!(!jpeg_looks_valid(&[]));
        assert!(!jpeg_looks_valid(&[0xFF, 0xD8, 0xFF, 0xD9])); // no SOF
        let mut truncated = minimal_jpeg();
        truncated.pop();
        assert!(!jpeg_looks_valid(&truncated)); // lost EOI

        let mut not_jpeg = minimal_jpeg();
        not_jpeg[0] = 0x00;
        assert!(!jpeg_looks_valid(&not_jpeg));
    }

    #[test]
    fn test_frame_info_age() {
        let info = FrameInfo {
            len: 10,
            sequence: 3,
            timestamp_us: 1_000,
            keyframe: false,
        };
        assert_eq!(info.age_us(3_000), 2_000);
        assert_eq!(info.age_us(500), 0);
    }
}
