//! The raster capability consumed by the encoder path.

use bytes::Bytes;
use media_core::{PixelFormat, RawFrame, Result};

/// Raw pixel data pulled out of a raster handle.
#[derive(Debug, Clone)]
pub struct RasterDetails {
    pub format: PixelFormat,
    pub data: Bytes,
    pub width: i32,
    pub height: i32,
    /// Bytes per row, including any padding.
    pub stride: usize,
}

/// Anything the encoder can pull raw pixels from.
///
/// The encoder never learns the concrete buffer representation; image-buffer
/// wrappers implement this and hand over format, dimensions, stride, and a
/// view of the pixel data.
pub trait RasterSource {
    /// `rgb_hint` states whether the caller's three-channel data should be
    /// read as RGB (`true`) or BGR (`false`) when the source itself cannot
    /// tell.
    fn extract_details(&self, rgb_hint: bool) -> Result<RasterDetails>;
}

impl RasterSource for RawFrame {
    fn extract_details(&self, _rgb_hint: bool) -> Result<RasterDetails> {
        Ok(RasterDetails {
            format: self.format,
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_frame_exposes_its_own_details() {
        let frame = RawFrame::packed(PixelFormat::Bgr24, 4, 2, Bytes::from(vec![0u8; 24]));
        let details = frame.extract_details(false).unwrap();
        assert_eq!(details.width, 4);
        assert_eq!(details.height, 2);
        assert_eq!(details.stride, 12);
        assert_eq!(details.format, PixelFormat::Bgr24);
    }
}
