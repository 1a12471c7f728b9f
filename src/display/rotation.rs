use crate::core::frame::{Surface, SurfaceFormat};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Framebuffer rotation applied before encoding, selected per printer model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    /// 90 degrees clockwise
    Rotate90,
    Rotate180,
    /// 270 degrees clockwise
    Rotate270,
}

impl Rotation {
    /// Rotation for a numeric printer model identifier. Unknown identifiers
    /// keep identity rotation for forward compatibility with unreleased
    /// models.
    pub fn for_model(model_id: u32) -> Self {
        match model_id {
            20025 | 20029 => Rotation::Rotate180,
            20026 => Rotation::Rotate270,
            20021 | 20024 | 20027 => Rotation::Rotate90,
            _ => Rotation::None,
        }
    }

    /// Whether output dimensions are swapped
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }
}

/// Read the numeric model identifier from the printer's model description
/// file. The file is JSON-ish; only the `model_id` key is consulted and any
/// parse failure falls back to no rotation.
pub fn load_model_id<P: AsRef<Path>>(path: P) -> Option<u32> {
    let contents = match fs::read_to_string(path.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                "Model file {} unreadable ({}); using identity rotation",
                path.as_ref().display(),
                e
            );
            return None;
        }
    };

    let key_pos = contents.find("\"model_id\"")?;
    let rest = &contents[key_pos + "\"model_id\"".len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let id = digits.parse().ok()?;
    info!("Printer model identifier: {}", id);
    Some(id)
}

/// Rotate a BGRX surface on the CPU. Used when no rotation accelerator is
/// available; the framebuffer is small enough that this stays cheap.
pub fn rotate_bgrx(src: &Surface, rotation: Rotation) -> Surface {
    debug_assert_eq!(src.format, SurfaceFormat::Bgrx);
    match rotation {
        Rotation::None => src.clone(),
        Rotation::Rotate180 => rotate_180(src),
        Rotation::Rotate90 => rotate_90(src),
        Rotation::Rotate270 => rotate_270(src),
    }
}

fn rotate_180(src: &Surface) -> Surface {
    let mut dst = Surface::new(SurfaceFormat::Bgrx, src.width, src.height);
    for (dst_px, src_px) in dst
        .data
        .chunks_exact_mut(4)
        .zip(src.data.chunks_exact(4).rev())
    {
        dst_px.copy_from_slice(src_px);
    }
    dst
}

fn rotate_90(src: &Surface) -> Surface {
    let (w, h) = (src.width as usize, src.height as usize);
    let mut dst = Surface::new(SurfaceFormat::Bgrx, src.height, src.width);
    for y in 0..h {
        for x in 0..w {
            let src_off = (y * w + x) * 4;
            let dst_off = (x * h + (h - 1 - y)) * 4;
            dst.data[dst_off..dst_off + 4].copy_from_slice(&src.data[src_off..src_off + 4]);
        }
    }
    dst
}

fn rotate_270(src: &Surface) -> Surface {
    let (w, h) = (src.width as usize, src.height as usize);
    let mut dst = Surface::new(SurfaceFormat::Bgrx, src.height, src.width);
    for y in 0..h {
        for x in 0..w {
            let src_off = (y * w + x) * 4;
            let dst_off = ((w - 1 - x) * h + y) * 4;
            dst.data[dst_off..dst_off + 4].copy_from_slice(&src.data[src_off..src_off + 4]);
        }
    }
    dst
}

/// CPU fallback implementation of the rotation capability
pub struct CpuRotator;

impl crate::hw::Rotator for CpuRotator {
    fn rotate(
        &mut self,
        src: &Surface,
        rotation: Rotation,
    ) -> Result<Surface, crate::core::error::DisplayError> {
        Ok(rotate_bgrx(src, rotation))
    }
}
