//! Applying a projection map to a fisheye frame.

use panostitch_common::error::{PanoError, PanoResult};
use rayon::prelude::*;

use crate::config::{BorderMode, Interpolation, StitchConfig};
use crate::frame::{RgbFrame, WarpedFrame, CHANNELS};
use crate::map::ProjectionMap;

/// Remaps raw fisheye frames into padded equirectangular projections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameWarper {
    interpolation: Interpolation,
    border: BorderMode,
}

impl FrameWarper {
    pub fn new(interpolation: Interpolation, border: BorderMode) -> Self {
        Self {
            interpolation,
            border,
        }
    }

    pub fn from_config(config: &StitchConfig) -> Self {
        Self::new(config.interpolation, config.border)
    }

    /// Sample `frame` at every lookup coordinate of `map`.
    ///
    /// The frame must be `source_side × source_side`, the shape the map was
    /// built for.
    pub fn warp(&self, frame: &RgbFrame, map: &ProjectionMap) -> PanoResult<WarpedFrame> {
        let side = map.source_side();
        if frame.width() != side || frame.height() != side {
            return Err(PanoError::shape_mismatch(format!(
                "Frame is {}x{} but the projection map expects {side}x{side}",
                frame.width(),
                frame.height()
            )));
        }

        let width = map.width();
        let mut out = RgbFrame::new(width, map.height());
        let (map_x, map_y) = (map.map_x(), map.map_y());

        out.as_bytes_mut()
            .par_chunks_mut(width * CHANNELS)
            .enumerate()
            .for_each(|(row, dst)| {
                let base = row * width;
                for (col, px) in dst.chunks_exact_mut(CHANNELS).enumerate() {
                    let rgb = self.sample(frame, map_x[base + col], map_y[base + col]);
                    px.copy_from_slice(&rgb);
                }
            });

        Ok(WarpedFrame::new(out, map.blend()))
    }

    fn sample(&self, src: &RgbFrame, x: f32, y: f32) -> [u8; 3] {
        match self.interpolation {
            Interpolation::Nearest => {
                let texel = fetch(src, x.round() as isize, y.round() as isize, self.border);
                texel.map(quantize)
            }
            Interpolation::Linear => bilinear(src, x, y, self.border),
        }
    }
}

fn bilinear(src: &RgbFrame, x: f32, y: f32, border: BorderMode) -> [u8; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as isize, y0 as isize);

    let v00 = fetch(src, x0, y0, border);
    let v10 = fetch(src, x0 + 1, y0, border);
    let v01 = fetch(src, x0, y0 + 1, border);
    let v11 = fetch(src, x0 + 1, y0 + 1, border);

    let mut out = [0u8; 3];
    for c in 0..CHANNELS {
        let top = v00[c] * (1.0 - fx) + v10[c] * fx;
        let bottom = v01[c] * (1.0 - fx) + v11[c] * fx;
        out[c] = quantize(top * (1.0 - fy) + bottom * fy);
    }
    out
}

/// Read one texel, resolving out-of-range coordinates through `border`.
fn fetch(src: &RgbFrame, x: isize, y: isize, border: BorderMode) -> [f32; 3] {
    match (
        map_coord(x, src.width(), border),
        map_coord(y, src.height(), border),
    ) {
        (Some(ix), Some(iy)) => src.pixel(ix, iy).map(f32::from),
        _ => match border {
            BorderMode::Constant(rgb) => rgb.map(f32::from),
            _ => [0.0; 3],
        },
    }
}

fn map_coord(coord: isize, len: usize, mode: BorderMode) -> Option<usize> {
    let n = len as isize;
    if n <= 0 {
        return None;
    }

    match mode {
        BorderMode::Constant(_) => {
            if coord < 0 || coord >= n {
                None
            } else {
                Some(coord as usize)
            }
        }
        BorderMode::Replicate => Some(coord.clamp(0, n - 1) as usize),
        BorderMode::Reflect => {
            let period = 2 * n;
            let mut c = coord.rem_euclid(period);
            if c >= n {
                c = period - c - 1;
            }
            Some(c as usize)
        }
    }
}

fn quantize(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
