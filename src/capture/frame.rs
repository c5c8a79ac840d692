use anyhow::Result;
use image::RgbaImage;

use crate::error::ScanError;

const RGBA_BYTES: usize = 4;

/// A frame as the platform mirror hands it over: one RGBA_8888 plane whose
/// rows may be padded past `width * pixel_stride`.
#[derive(Debug, Clone)]
pub struct PlaneBuffer {
    pub width: u32,
    pub height: u32,
    pub pixel_stride: usize,
    pub row_stride: usize,
    pub data: Vec<u8>,
}

impl PlaneBuffer {
    /// Tightly packed RGBA rows, as produced by decoders.
    pub fn packed(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixel_stride: RGBA_BYTES,
            row_stride: width as usize * RGBA_BYTES,
            data,
        }
    }
}

/// Decoded pixels for one analysis pass. Dropped as soon as the sampled pixel
/// has been read.
#[derive(Debug)]
pub struct CaptureFrame {
    image: RgbaImage,
}

impl CaptureFrame {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Strips row padding and pixel gaps into a contiguous RGBA image.
    pub fn from_plane(plane: &PlaneBuffer) -> Result<CaptureFrame> {
        let PlaneBuffer {
            width,
            height,
            pixel_stride,
            row_stride,
            ref data,
        } = *plane;

        if width == 0 || height == 0 {
            return Err(ScanError::Decode(format!("empty frame {width}x{height}")).into());
        }
        if pixel_stride < RGBA_BYTES {
            return Err(ScanError::Decode(format!("pixel stride {pixel_stride} < 4")).into());
        }
        let row_bytes = (width as usize)
            .checked_mul(pixel_stride)
            .ok_or_else(|| overflow(plane))?;
        if row_stride < row_bytes {
            return Err(ScanError::Decode(format!(
                "row stride {row_stride} shorter than {width} pixels"
            ))
            .into());
        }
        let required = row_stride
            .checked_mul(height as usize - 1)
            .and_then(|bytes| bytes.checked_add(row_bytes))
            .ok_or_else(|| overflow(plane))?;
        if data.len() < required {
            return Err(ScanError::Decode(format!(
                "buffer holds {} bytes, {required} needed for {width}x{height}",
                data.len()
            ))
            .into());
        }

        let mut pixels = Vec::with_capacity(width as usize * height as usize * RGBA_BYTES);
        for row in data.chunks(row_stride).take(height as usize) {
            for px in row[..row_bytes].chunks_exact(pixel_stride) {
                pixels.extend_from_slice(&px[..RGBA_BYTES]);
            }
        }

        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            ScanError::Decode(format!("pixel count mismatch for {width}x{height}"))
        })?;
        Ok(CaptureFrame { image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

fn overflow(plane: &PlaneBuffer) -> ScanError {
    ScanError::Decode(format!(
        "strides {}/{} overflow for {}x{}",
        plane.pixel_stride, plane.row_stride, plane.width, plane.height
    ))
}
