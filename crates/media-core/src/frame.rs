//! Raw (decoded) frame types consumed by the encoder path.

use bytes::Bytes;

/// Pixel layout of a raw video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuv420p,
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats; planar formats report the
    /// luma-plane stride unit.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Yuv420p | PixelFormat::Gray8 => 1,
        }
    }
}

/// One decoded frame handed to an encoder.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub format: PixelFormat,
    pub width: i32,
    pub height: i32,
    /// Bytes per row, >= width * bytes_per_pixel.
    pub stride: usize,
    pub data: Bytes,
    /// Presentation timestamp in the destination stream's time base; assigned
    /// by the encoder from its running frame counter.
    pub pts: Option<i64>,
}

impl RawFrame {
    pub fn packed(format: PixelFormat, width: i32, height: i32, data: Bytes) -> Self {
        let stride = width.max(0) as usize * format.bytes_per_pixel();
        Self {
            format,
            width,
            height,
            stride,
            data,
            pts: None,
        }
    }
}
