//! Edge map: greyscale + invert, one byte per pixel.
//!
//! Page backgrounds are near-white, so after inversion blank dividers sit
//! close to 0 while text and photographs light up. The scorer only needs that
//! contrast; no convolution kernel is applied.

use crate::error::LayoutError;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// Single-channel inverted intensity buffer with the source image's size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl EdgeMap {
    /// Build from a decoded image.
    pub fn from_image(img: &DynamicImage) -> Self {
        let mut luma = img.to_luma8();
        image::imageops::invert(&mut luma);
        let (width, height) = luma.dimensions();
        Self {
            width,
            height,
            data: luma.into_raw(),
        }
    }

    /// Decode encoded image bytes and build the edge map.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LayoutError> {
        let img = image::load_from_memory(bytes).map_err(|e| LayoutError::ImageDecode {
            path: Default::default(),
            detail: e.to_string(),
        })?;
        Ok(Self::from_image(&img))
    }

    /// Wrap a raw row-major buffer. Fails when the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Intensity at `(x, y)`, `None` outside the map.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Load a page image from disk and build its edge map off the async runtime.
///
/// Decoding a full-page PNG is CPU-bound, so it runs in `spawn_blocking`.
pub async fn load_edge_map(path: &Path) -> Result<EdgeMap, LayoutError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let img = image::open(&path).map_err(|e| LayoutError::ImageDecode {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        let edges = EdgeMap::from_image(&img);
        debug!(
            "Edge map for {}: {}x{}",
            path.display(),
            edges.width(),
            edges.height()
        );
        Ok(edges)
    })
    .await
    .map_err(|e| LayoutError::Internal(format!("Edge map task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn inverts_greyscale() {
        let mut img = RgbImage::from_pixel(4, 3, Rgb([255, 255, 255]));
        img.put_pixel(1, 2, Rgb([0, 0, 0]));
        let edges = EdgeMap::from_image(&DynamicImage::ImageRgb8(img));

        assert_eq!(edges.width(), 4);
        assert_eq!(edges.height(), 3);
        assert_eq!(edges.as_raw().len(), 12);
        assert_eq!(edges.get(0, 0), Some(0));
        assert_eq!(edges.get(1, 2), Some(255));
        assert_eq!(edges.get(4, 0), None);
    }

    #[test]
    fn from_bytes_decodes_png() {
        let img = image::GrayImage::from_pixel(5, 5, Luma([200]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let edges = EdgeMap::from_bytes(&buf).expect("decodes");
        assert_eq!(edges.get(2, 2), Some(55));
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let err = EdgeMap::from_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, LayoutError::ImageDecode { .. }));
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(EdgeMap::from_raw(2, 2, vec![0; 4]).is_some());
        assert!(EdgeMap::from_raw(2, 2, vec![0; 3]).is_none());
    }

    #[test]
    fn load_missing_file_is_decode_error() {
        let err = tokio_test::block_on(load_edge_map(Path::new("/definitely/missing.png")));
        assert!(matches!(err, Err(LayoutError::ImageDecode { .. })));
    }
}
