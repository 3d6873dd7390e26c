//! Interleaved 8-bit RGB frame buffers.

use panostitch_common::error::{PanoError, PanoResult};

/// Bytes per pixel (interleaved RGB).
pub const CHANNELS: usize = 3;

/// A fixed-shape, interleaved RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl RgbFrame {
    /// A black frame.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    /// A frame filled with a single color.
    pub fn filled(width: usize, height: usize, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(Self::byte_len(width, height))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap raw bytes, checking the length against the shape.
    pub fn from_bytes(width: usize, height: usize, data: Vec<u8>) -> PanoResult<Self> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(PanoError::shape_mismatch(format!(
                "{width}x{height} RGB frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Byte size of a `width × height` RGB frame.
    pub fn byte_len(width: usize, height: usize) -> usize {
        width * height * CHANNELS
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// One row of interleaved pixels.
    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.width * CHANNELS;
        &self.data[y * stride..(y + 1) * stride]
    }

    /// The RGB triple at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let i = (y * self.width + x) * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&rgb);
    }
}

/// A padded equirectangular projection of one lens.
///
/// `blend` extra columns on each side overlap the neighbouring lens and
/// are consumed by the blender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpedFrame {
    frame: RgbFrame,
    blend: usize,
}

impl WarpedFrame {
    pub fn new(frame: RgbFrame, blend: usize) -> Self {
        Self { frame, blend }
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn blend(&self) -> usize {
        self.blend
    }

    pub fn frame(&self) -> &RgbFrame {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_frame_pixels() {
        let frame = RgbFrame::filled(4, 3, [10, 20, 30]);
        assert_eq!(frame.as_bytes().len(), 36);
        assert_eq!(frame.pixel(3, 2), [10, 20, 30]);
        assert_eq!(frame.row(1).len(), 12);
    }

    #[test]
    fn test_from_bytes_checks_length() {
        assert!(RgbFrame::from_bytes(2, 2, vec![0; 12]).is_ok());
        let err = RgbFrame::from_bytes(2, 2, vec![0; 11]).unwrap_err();
        assert!(matches!(err, PanoError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_set_pixel() {
        let mut frame = RgbFrame::new(3, 3);
        frame.set_pixel(1, 2, [1, 2, 3]);
        assert_eq!(frame.pixel(1, 2), [1, 2, 3]);
        assert_eq!(frame.pixel(2, 1), [0, 0, 0]);
    }
}
