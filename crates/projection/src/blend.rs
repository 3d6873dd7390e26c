//! Seam blending of two padded projections into one panorama.
//!
//! The two lenses overlap in two places around the sphere, so each
//! projection carries `b` columns of margin on both sides. With `W = H + 2b`
//! the panorama is assembled left to right as:
//!
//! | output columns | source |
//! |----------------|--------|
//! | `b`            | `left[b..2b]` faded in over `right[W-b..W]` |
//! | `W - 4b`       | `left[2b..W-2b]` |
//! | `2b`           | `left[W-2b..W]` faded out over `right[0..2b]` |
//! | `W - 4b`       | `right[2b..W-2b]` |
//! | `b`            | `right[W-2b..W-b]` faded out over `left[0..b]` |
//!
//! for a total of `2(W - 2b) = 2H` columns.

use panostitch_common::error::{PanoError, PanoResult};
use rayon::prelude::*;

use crate::frame::{RgbFrame, WarpedFrame, CHANNELS};

/// Linear crossfade ramps across a `2b`-column seam.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendWeights {
    rising: Vec<f32>,
    falling: Vec<f32>,
}

impl BlendWeights {
    /// Ramps for blend width `b`: `rising` goes `0 → 1` over `2b` columns,
    /// `falling` is its complement.
    pub fn new(blend: usize) -> Self {
        let n = 2 * blend;
        let rising: Vec<f32> = match n {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => (0..n).map(|i| i as f32 / (n - 1) as f32).collect(),
        };
        let falling = rising.iter().map(|w| 1.0 - w).collect();
        Self { rising, falling }
    }

    /// Number of seam columns (`2b`).
    pub fn len(&self) -> usize {
        self.rising.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rising.is_empty()
    }

    pub fn rising(&self) -> &[f32] {
        &self.rising
    }

    pub fn falling(&self) -> &[f32] {
        &self.falling
    }
}

/// Combines left/right projections into a full equirectangular frame.
#[derive(Debug, Clone)]
pub struct StereoBlender {
    blend: usize,
    weights: BlendWeights,
}

impl StereoBlender {
    pub fn new(blend: usize) -> Self {
        Self {
            blend,
            weights: BlendWeights::new(blend),
        }
    }

    pub fn blend_width(&self) -> usize {
        self.blend
    }

    pub fn weights(&self) -> &BlendWeights {
        &self.weights
    }

    /// Width of the blended output for projections of width `warped_width`.
    fn output_width(&self, warped_width: usize) -> usize {
        2 * warped_width.saturating_sub(2 * self.blend)
    }

    /// Stitch the two projections. Both must share height, width and the
    /// blend margin this blender was built for.
    pub fn blend(&self, left: &WarpedFrame, right: &WarpedFrame) -> PanoResult<RgbFrame> {
        let b = self.blend;
        if left.height() != right.height() || left.width() != right.width() {
            return Err(PanoError::shape_mismatch(format!(
                "Cannot blend {}x{} with {}x{}",
                left.width(),
                left.height(),
                right.width(),
                right.height()
            )));
        }
        if left.blend() != b || right.blend() != b {
            return Err(PanoError::shape_mismatch(format!(
                "Blend margins {} / {} do not match blender width {b}",
                left.blend(),
                right.blend()
            )));
        }
        let w = left.width();
        if w < 4 * b {
            return Err(PanoError::shape_mismatch(format!(
                "Projection width {w} is too narrow for blend width {b}"
            )));
        }

        let out_width = self.output_width(w);
        let mut out = RgbFrame::new(out_width, left.height());
        let (rising, falling) = (self.weights.rising(), self.weights.falling());

        out.as_bytes_mut()
            .par_chunks_mut(out_width * CHANNELS)
            .enumerate()
            .for_each(|(y, dst)| {
                let l = left.frame().row(y);
                let r = right.frame().row(y);
                let mut cursor = 0;

                // Seam behind the panorama's left edge.
                for k in 0..b {
                    let at = px(dst, &mut cursor);
                    mix(at, l, b + k, rising[b + k], r, w - b + k, falling[b + k]);
                }

                copy_cols(dst, &mut cursor, l, 2 * b, w - 2 * b);

                // Center seam.
                for k in 0..2 * b {
                    let at = px(dst, &mut cursor);
                    mix(at, l, w - 2 * b + k, falling[k], r, k, rising[k]);
                }

                copy_cols(dst, &mut cursor, r, 2 * b, w - 2 * b);

                // Seam wrapping around to the panorama's right edge.
                for k in 0..b {
                    let at = px(dst, &mut cursor);
                    mix(at, r, w - 2 * b + k, falling[k], l, k, rising[k]);
                }

                debug_assert_eq!(cursor, out_width);
            });

        Ok(out)
    }
}

/// Place two frames of equal height next to each other, left first.
pub fn side_by_side(left: &RgbFrame, right: &RgbFrame) -> PanoResult<RgbFrame> {
    if left.height() != right.height() {
        return Err(PanoError::shape_mismatch(format!(
            "Cannot place {}x{} next to {}x{}",
            left.width(),
            left.height(),
            right.width(),
            right.height()
        )));
    }
    let split = left.width() * CHANNELS;
    let width = left.width() + right.width();
    let mut out = RgbFrame::new(width, left.height());

    out.as_bytes_mut()
        .par_chunks_mut(width * CHANNELS)
        .enumerate()
        .for_each(|(y, dst)| {
            let (l, r) = dst.split_at_mut(split);
            l.copy_from_slice(left.row(y));
            r.copy_from_slice(right.row(y));
        });
    Ok(out)
}

fn px<'a>(dst: &'a mut [u8], cursor: &mut usize) -> &'a mut [u8] {
    let start = *cursor * CHANNELS;
    *cursor += 1;
    &mut dst[start..start + CHANNELS]
}

fn copy_cols(dst: &mut [u8], cursor: &mut usize, src: &[u8], from: usize, to: usize) {
    let n = to - from;
    let start = *cursor * CHANNELS;
    dst[start..start + n * CHANNELS].copy_from_slice(&src[from * CHANNELS..to * CHANNELS]);
    *cursor += n;
}

fn mix(out: &mut [u8], a: &[u8], a_col: usize, a_w: f32, b: &[u8], b_col: usize, b_w: f32) {
    for c in 0..CHANNELS {
        let va = a[a_col * CHANNELS + c] as f32;
        let vb = b[b_col * CHANNELS + c] as f32;
        out[c] = (va * a_w + vb * b_w).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A projection whose red channel encodes the column index and whose
    /// green channel tags the lens.
    fn tagged(width: usize, height: usize, blend: usize, tag: u8) -> WarpedFrame {
        let mut frame = RgbFrame::new(width, height);
        for y in 0..height {
            for x in 0..width {
                frame.set_pixel(x, y, [x as u8, tag, 0]);
            }
        }
        WarpedFrame::new(frame, blend)
    }

    #[test]
    fn test_weights_sum_to_one() {
        let weights = BlendWeights::new(16);
        assert_eq!(weights.len(), 32);
        assert_eq!(weights.rising()[0], 0.0);
        assert_eq!(weights.rising()[31], 1.0);
        for (r, f) in weights.rising().iter().zip(weights.falling()) {
            assert!((r + f - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_blend_concatenates() {
        let blender = StereoBlender::new(0);
        let left = tagged(6, 2, 0, 100);
        let right = tagged(6, 2, 0, 200);
        let out = blender.blend(&left, &right).unwrap();
        assert_eq!(out.width(), 12);
        assert_eq!(out.pixel(0, 1), [0, 100, 0]);
        assert_eq!(out.pixel(5, 1), [5, 100, 0]);
        assert_eq!(out.pixel(6, 0), [0, 200, 0]);
        assert_eq!(out.pixel(11, 0), [5, 200, 0]);
    }

    #[test]
    fn test_output_layout() {
        // H = 8, b = 2, W = 12: output is 16 columns.
        let blender = StereoBlender::new(2);
        let left = tagged(12, 3, 2, 0);
        let right = tagged(12, 3, 2, 100);
        let out = blender.blend(&left, &right).unwrap();
        assert_eq!(out.width(), 16);
        assert_eq!(out.height(), 3);

        // Left body starts after the first b seam columns.
        assert_eq!(out.pixel(2, 0), [4, 0, 0]);
        assert_eq!(out.pixel(5, 0), [7, 0, 0]);
        // Right body follows the 2b-column center seam.
        assert_eq!(out.pixel(10, 0), [4, 100, 0]);
        assert_eq!(out.pixel(13, 0), [7, 100, 0]);

        // Center seam starts fully left and ends fully right.
        assert_eq!(out.pixel(6, 0), [8, 0, 0]);
        assert_eq!(out.pixel(9, 0), [3, 100, 0]);

        // Edge seams meet the wrap-around partner with complementary weights.
        // Column 0: left[2] at 2/3 and right[10] at 1/3.
        assert_eq!(out.pixel(0, 0), [5, 33, 0]);
        // Last column: right[9] at 2/3 and left[1] at 1/3.
        assert_eq!(out.pixel(15, 0), [6, 67, 0]);
    }

    #[test]
    fn test_output_width_saturates_on_narrow_input() {
        let blender = StereoBlender::new(4);
        assert_eq!(blender.output_width(24), 32);
        assert_eq!(blender.output_width(6), 0);
        assert_eq!(blender.output_width(0), 0);
    }

    #[test]
    fn test_narrow_projection_is_rejected() {
        let blender = StereoBlender::new(2);
        let err = blender
            .blend(&tagged(6, 2, 2, 0), &tagged(6, 2, 2, 0))
            .unwrap_err();
        assert!(matches!(err, PanoError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_side_by_side_keeps_both_halves() {
        let left = RgbFrame::filled(3, 2, [10, 20, 30]);
        let mut right = RgbFrame::filled(3, 2, [200, 100, 50]);
        right.set_pixel(0, 1, [1, 2, 3]);

        let out = side_by_side(&left, &right).unwrap();
        assert_eq!((out.width(), out.height()), (6, 2));
        assert_eq!(out.pixel(2, 0), [10, 20, 30]);
        assert_eq!(out.pixel(3, 0), [200, 100, 50]);
        assert_eq!(out.pixel(3, 1), [1, 2, 3]);
        assert_eq!(out.pixel(5, 1), [200, 100, 50]);

        let err = side_by_side(&left, &RgbFrame::new(3, 3)).unwrap_err();
        assert!(matches!(err, PanoError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_rejects_mismatched_frames() {
        let blender = StereoBlender::new(2);
        let err = blender
            .blend(&tagged(12, 3, 2, 0), &tagged(12, 4, 2, 0))
            .unwrap_err();
        assert!(matches!(err, PanoError::ShapeMismatch { .. }));

        let err = blender
            .blend(&tagged(12, 3, 2, 0), &tagged(12, 3, 3, 0))
            .unwrap_err();
        assert!(matches!(err, PanoError::ShapeMismatch { .. }));
    }
}
