//! Deterministic capability fakes, used by the tests and by `--synthetic`
//! runs on machines without the printer's codec hardware.

use super::{
    CameraSource, CapturedFrame, CpuSampler, FramebufferSource, H264Encoder, JpegDecoder,
    JpegEncoder,
};
use crate::core::error::{CameraError, DisplayError, HwError};
use crate::core::frame::{Surface, SurfaceFormat};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Build a structurally valid JPEG (SOI, APP0, SOF0, scan filler, EOI) whose
/// scan bytes are derived from `seed` so frames are distinguishable.
pub fn synthetic_jpeg(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut v = vec![0xFF, 0xD8];
    v.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x02]);
    v.extend_from_slice(&[
        0xFF,
        0xC0,
        0x00,
        0x0B,
        0x08,
        (height >> 8) as u8,
        height as u8,
        (width >> 8) as u8,
        width as u8,
        0x01,
        0x01,
        0x11,
        0x00,
    ]);
    let fill = (seed % 251) as u8;
    // The filler avoids 0xFF so no marker sequences appear inside the scan
    let filler_len = 64 + (seed % 512) as usize;
    v.extend(std::iter::repeat(fill.min(0xFE)).take(filler_len));
    v.extend_from_slice(&[0xFF, 0xD9]);
    v
}

/// Annex-B SPS unit (4-byte start code)
pub fn annexb_sps() -> Vec<u8> {
    vec![
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1F, 0x96, 0x54, 0x05, 0x01, 0x6C, 0x80,
    ]
}

/// Annex-B PPS unit (4-byte start code)
pub fn annexb_pps() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]
}

/// Annex-B IDR slice (nal_type 5) with seed-derived payload
pub fn annexb_idr(seed: u64) -> Vec<u8> {
    let mut v = vec![0x00, 0x00, 0x00, 0x01, 0x65];
    v.extend(
        (0..32u64)
            .map(|i| (seed.wrapping_add(i) % 250) as u8)
            .filter(|&b| b != 0),
    );
    v
}

/// Annex-B non-IDR slice (nal_type 1) with seed-derived payload
pub fn annexb_slice(seed: u64) -> Vec<u8> {
    let mut v = vec![0x00, 0x00, 0x00, 0x01, 0x41];
    v.extend(
        (0..24u64)
            .map(|i| (seed.wrapping_add(i) % 250) as u8)
            .filter(|&b| b != 0),
    );
    v
}

/// A full synthetic access unit: keyframes carry SPS+PPS+IDR, the rest a
/// single non-IDR slice.
pub fn annexb_access_unit(frame_index: u64, gop: u64) -> Vec<u8> {
    if frame_index % gop == 0 {
        let mut v = annexb_sps();
        v.extend(annexb_pps());
        v.extend(annexb_idr(frame_index));
        v
    } else {
        annexb_slice(frame_index)
    }
}

/// Camera fake producing synthetic JPEG or YUYV frames. Dequeue counts are
/// observable so tests can assert the pipeline went idle.
pub struct MockCamera {
    width: u32,
    height: u32,
    jpeg_mode: bool,
    /// Simulated source frame interval; zero means free-running
    frame_interval: Duration,
    frame_index: u64,
    dequeues: Arc<AtomicU64>,
}

impl MockCamera {
    pub fn jpeg(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            jpeg_mode: true,
            frame_interval: Duration::ZERO,
            frame_index: 0,
            dequeues: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn yuyv(width: u32, height: u32) -> Self {
        Self {
            jpeg_mode: false,
            ..Self::jpeg(width, height)
        }
    }

    /// Pace the fake source at a fixed fps
    pub fn with_source_fps(mut self, fps: u32) -> Self {
        self.frame_interval = Duration::from_micros(1_000_000 / fps.max(1) as u64);
        self
    }

    /// Shared dequeue counter for idle-gating assertions
    pub fn dequeue_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dequeues)
    }
}

impl CameraSource for MockCamera {
    fn dequeue(&mut self, _timeout: Duration) -> Result<CapturedFrame, CameraError> {
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }
        self.dequeues.fetch_add(1, Ordering::SeqCst);
        self.frame_index += 1;

        if self.jpeg_mode {
            Ok(CapturedFrame::Jpeg(synthetic_jpeg(
                self.width,
                self.height,
                self.frame_index,
            )))
        } else {
            let mut surface = Surface::new(SurfaceFormat::Yuyv, self.width, self.height);
            let fill = (self.frame_index % 251) as u8;
            surface.data.fill(fill);
            Ok(CapturedFrame::Raw(surface))
        }
    }

    fn requeue(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn shutdown(&mut self) {}
}

/// Framebuffer fake returning a BGRX gradient
pub struct MockFramebuffer {
    width: u32,
    height: u32,
    frame_index: u64,
}

impl MockFramebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
        }
    }
}

impl FramebufferSource for MockFramebuffer {
    fn read_frame(&mut self) -> Result<Surface, DisplayError> {
        self.frame_index += 1;
        let mut surface = Surface::new(SurfaceFormat::Bgrx, self.width, self.height);
        for (i, px) in surface.data.chunks_exact_mut(4).enumerate() {
            px[0] = (i % 256) as u8;
            px[1] = ((i / 256) % 256) as u8;
            px[2] = (self.frame_index % 256) as u8;
            px[3] = 0;
        }
        Ok(surface)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// JPEG encoder fake wrapping the surface into a synthetic JPEG
pub struct MockJpegEncoder {
    encodes: u64,
}

impl MockJpegEncoder {
    pub fn new() -> Self {
        Self { encodes: 0 }
    }
}

impl Default for MockJpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegEncoder for MockJpegEncoder {
    fn encode(&mut self, surface: &Surface, dst: &mut Vec<u8>) -> Result<usize, HwError> {
        self.encodes += 1;
        let jpeg = synthetic_jpeg(surface.width, surface.height, self.encodes);
        dst.clear();
        dst.extend_from_slice(&jpeg);
        Ok(dst.len())
    }
}

/// JPEG decoder fake producing an NV12 surface of the advertised size
pub struct MockJpegDecoder;

impl JpegDecoder for MockJpegDecoder {
    fn decode(&mut self, jpeg: &[u8]) -> Result<Surface, HwError> {
        if jpeg.len() < 4 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
            return Err(HwError::DecodeFailed {
                details: "not a JPEG".to_string(),
            });
        }
        // Dimensions from the SOF0 written by synthetic_jpeg
        let (mut width, mut height) = (0u32, 0u32);
        for i in 0..jpeg.len().saturating_sub(9) {
            if jpeg[i] == 0xFF && jpeg[i + 1] == 0xC0 {
                height = u32::from(jpeg[i + 5]) << 8 | u32::from(jpeg[i + 6]);
                width = u32::from(jpeg[i + 7]) << 8 | u32::from(jpeg[i + 8]);
                break;
            }
        }
        if width == 0 || height == 0 {
            return Err(HwError::DecodeFailed {
                details: "missing SOF".to_string(),
            });
        }
        Ok(Surface::new(SurfaceFormat::Nv12, width, height))
    }
}

/// H.264 encoder fake emitting synthetic Annex-B access units with a fixed
/// GOP; optionally fails a scripted set of submissions.
pub struct MockH264Encoder {
    gop: u64,
    submissions: u64,
    fail_next: Arc<AtomicU64>,
}

impl MockH264Encoder {
    pub fn new(gop: u64) -> Self {
        Self {
            gop: gop.max(1),
            submissions: 0,
            fail_next: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle that makes the next `n` submissions time out
    pub fn failure_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.fail_next)
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }
}

impl H264Encoder for MockH264Encoder {
    fn encode(&mut self, _surface: &Surface, dst: &mut Vec<u8>) -> Result<usize, HwError> {
        let pending_failures = self.fail_next.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_next.store(pending_failures - 1, Ordering::SeqCst);
            return Err(HwError::GetTimeout {
                timeout: Duration::from_millis(100),
            });
        }

        let unit = annexb_access_unit(self.submissions, self.gop);
        self.submissions += 1;
        dst.clear();
        dst.extend_from_slice(&unit);
        Ok(dst.len())
    }
}

/// CPU sampler fake replaying a scripted sequence. The last value repeats
/// once the script is exhausted; the script can be extended concurrently.
#[derive(Clone)]
pub struct ScriptedCpuSampler {
    values: Arc<Mutex<VecDeque<f32>>>,
    last: Arc<Mutex<Option<f32>>>,
}

impl ScriptedCpuSampler {
    pub fn new<I: IntoIterator<Item = f32>>(values: I) -> Self {
        Self {
            values: Arc::new(Mutex::new(values.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn push(&self, value: f32) {
        self.values.lock().push_back(value);
    }
}

impl CpuSampler for ScriptedCpuSampler {
    fn sample(&mut self) -> Option<f32> {
        let mut values = self.values.lock();
        match values.pop_front() {
            Some(v) => {
                *self.last.lock() = Some(v);
                Some(v)
            }
            None => *self.last.lock(),
        }
    }
}
