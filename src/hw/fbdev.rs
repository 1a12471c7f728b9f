use super::FramebufferSource;
use crate::core::error::DisplayError;
use crate::core::frame::{Surface, SurfaceFormat};
use std::fs::File;
use tracing::info;

/// Framebuffer source reading `/dev/fb0`-style devices.
///
/// The device is opened read-only and queried for its dimensions through
/// the variable-screen-info ioctl; only 32 bpp BGRX layouts are accepted.
#[derive(Debug)]
pub struct FbdevSource {
    device: String,
    file: File,
    width: u32,
    height: u32,
}

#[cfg(target_os = "linux")]
const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;

#[cfg(target_os = "linux")]
#[repr(C)]
#[derive(Default, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[cfg(target_os = "linux")]
#[repr(C)]
#[derive(Default, Clone, Copy)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

impl FbdevSource {
    #[cfg(target_os = "linux")]
    pub fn open(device: &str) -> Result<Self, DisplayError> {
        use std::os::unix::io::AsRawFd;

        let file = File::open(device).map_err(|e| DisplayError::FramebufferOpen {
            device: device.to_string(),
            source: e,
        })?;

        let mut info = FbVarScreeninfo::default();
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), FBIOGET_VSCREENINFO, &mut info) };
        if rc != 0 {
            return Err(DisplayError::Framebuffer {
                details: format!(
                    "FBIOGET_VSCREENINFO failed on {}: {}",
                    device,
                    std::io::Error::last_os_error()
                ),
            });
        }

        if info.bits_per_pixel != 32 {
            return Err(DisplayError::UnsupportedDepth {
                bits_per_pixel: info.bits_per_pixel,
            });
        }

        info!(
            "Framebuffer {} opened: {}x{} @ {} bpp",
            device, info.xres, info.yres, info.bits_per_pixel
        );

        Ok(Self {
            device: device.to_string(),
            file,
            width: info.xres,
            height: info.yres,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(device: &str) -> Result<Self, DisplayError> {
        let _ = device;
        Err(DisplayError::NotAvailable)
    }
}

impl FbdevSource {
    #[cfg(target_os = "linux")]
    fn blit(&mut self) -> Result<Surface, DisplayError> {
        use std::os::unix::fs::FileExt;

        let mut surface = Surface::new(SurfaceFormat::Bgrx, self.width, self.height);
        self.file
            .read_exact_at(&mut surface.data, 0)
            .map_err(|e| DisplayError::Framebuffer {
                details: format!("read from {} failed: {}", self.device, e),
            })?;
        Ok(surface)
    }

    #[cfg(not(target_os = "linux"))]
    fn blit(&mut self) -> Result<Surface, DisplayError> {
        Err(DisplayError::NotAvailable)
    }
}

impl FramebufferSource for FbdevSource {
    fn read_frame(&mut self) -> Result<Surface, DisplayError> {
        self.blit()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        let err = FbdevSource::open("/nonexistent/fb9").unwrap_err();
        match err {
            DisplayError::FramebufferOpen { device, .. } => {
                assert_eq!(device, "/nonexistent/fb9");
            }
            DisplayError::NotAvailable => {} // non-linux build
            other => panic!("unexpected error: {other}"),
        }
    }
}
