use crate::core::frame::{Surface, SurfaceFormat};

/// Convert a packed YUYV surface to planar NV12.
///
/// Luma is copied through; chroma is taken from even rows, which is the
/// cheap 4:2:2 to 4:2:0 reduction the hardware path performs.
pub fn yuyv_to_nv12(src: &Surface) -> Surface {
    debug_assert_eq!(src.format, SurfaceFormat::Yuyv);
    let width = src.width as usize;
    let height = src.height as usize;
    let mut dst = Surface::new(SurfaceFormat::Nv12, src.width, src.height);

    let (y_plane, uv_plane) = dst.data.split_at_mut(width * height);

    for row in 0..height {
        let src_row = &src.data[row * width * 2..(row + 1) * width * 2];
        let dst_row = &mut y_plane[row * width..(row + 1) * width];
        for col in 0..width {
            dst_row[col] = src_row[col * 2];
        }

        if row % 2 == 0 {
            let uv_row = &mut uv_plane[(row / 2) * width..(row / 2 + 1) * width];
            for pair in 0..width / 2 {
                uv_row[pair * 2] = src_row[pair * 4 + 1]; // U
                uv_row[pair * 2 + 1] = src_row[pair * 4 + 3]; // V
            }
        }
    }

    dst
}
