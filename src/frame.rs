//! Still frames pulled from the active source.
//!
//! - `Frame`: RGB still of the current video frame at source resolution.
//! - Full frames are JPEG-encoded for the inference link.
//! - Thumbnails are downscaled to 160x90 and stored on events as data URLs.

use anyhow::{anyhow, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

pub const THUMBNAIL_WIDTH: u32 = 160;
pub const THUMBNAIL_HEIGHT: u32 = 90;

/// JPEG quality for both outbound frames and thumbnails.
pub const JPEG_QUALITY: u8 = 80;

pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!(
                "pixel buffer does not match {}x{} RGB frame dimensions",
                width,
                height
            )
        })?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Full-resolution JPEG for transmission to the inference link.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        encode_jpeg(&self.image)
    }

    /// Downscaled JPEG thumbnail.
    pub fn thumbnail_jpeg(&self) -> Result<Vec<u8>> {
        let small = image::imageops::resize(
            &self.image,
            THUMBNAIL_WIDTH,
            THUMBNAIL_HEIGHT,
            FilterType::Triangle,
        );
        encode_jpeg(&small)
    }

    /// Thumbnail as a `data:image/jpeg;base64,` URL.
    pub fn thumbnail_data_url(&self) -> Result<String> {
        Ok(jpeg_data_url(&self.thumbnail_jpeg()?))
    }
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| anyhow!("jpeg encode failed: {}", e))?;
    Ok(out)
}

pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(jpeg)
    )
}

/// Decode a JPEG data URL back into bytes.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let payload = url
        .strip_prefix("data:image/jpeg;base64,")
        .ok_or_else(|| anyhow!("not a jpeg data URL"))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| anyhow!("invalid base64 payload: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        Frame::from_rgb(width, height, pixels).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::from_rgb(4, 4, vec![0; 10]).is_err());
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let jpeg = gradient(64, 36).encode_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn thumbnail_is_downscaled() {
        let frame = gradient(320, 180);
        let url = frame.thumbnail_data_url().unwrap();
        let bytes = decode_data_url(&url).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg)
            .unwrap();
        assert_eq!(decoded.width(), THUMBNAIL_WIDTH);
        assert_eq!(decoded.height(), THUMBNAIL_HEIGHT);
    }
}
