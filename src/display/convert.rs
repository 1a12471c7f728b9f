use crate::core::frame::{Surface, SurfaceFormat};

/// Convert a BGRX surface to planar NV12 using BT.601 integer math.
///
/// CPU fallback for the colour-space accelerator; chroma is sampled from
/// the top-left pixel of each 2x2 block.
pub fn bgrx_to_nv12(src: &Surface) -> Surface {
    debug_assert_eq!(src.format, SurfaceFormat::Bgrx);
    let width = src.width as usize;
    let height = src.height as usize;
    let mut dst = Surface::new(SurfaceFormat::Nv12, src.width, src.height);

    let (y_plane, uv_plane) = dst.data.split_at_mut(width * height);

    for y in 0..height {
        for x in 0..width {
            let off = (y * width + x) * 4;
            let b = src.data[off] as i32;
            let g = src.data[off + 1] as i32;
            let r = src.data[off + 2] as i32;

            let luma = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * width + x] = luma.clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 {
                let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                let uv_off = (y / 2) * width + x;
                uv_plane[uv_off] = u.clamp(0, 255) as u8;
                uv_plane[uv_off + 1] = v.clamp(0, 255) as u8;
            }
        }
    }

    dst
}
