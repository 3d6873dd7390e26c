//! Equirectangular → fisheye lookup tables.
//!
//! Every destination pixel of a padded equirectangular projection is mapped
//! to a source-pixel coordinate in a square fisheye frame. The table is
//! computed once per configuration and never mutated afterwards.
//!
//! Geometry, per destination cell:
//! 1. normalized grid `x ∈ [-b/H, 1 + b/H]` (`H + 2b` columns), `y ∈ [-1, 1]`
//!    (`H` rows);
//! 2. `longitude = x·π`, `latitude = y·π/2`, giving a unit vector `P`;
//! 3. equidistant fisheye: `r = 2·atan2(√(Px² + Pz²), Py) / (aperture·π)`,
//!    `θ = atan2(Pz, Px) + π`;
//! 4. `(r cos θ, r sin θ)` clamped to `[-1, 1]`, then rescaled to
//!    `[0, side]` with the horizontal axis mirrored.

use std::f64::consts::PI;

use panostitch_common::error::{PanoError, PanoResult};
use rayon::prelude::*;

use crate::config::{validate_geometry, StitchConfig};

/// Per-pixel source coordinates for one padded projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMap {
    width: usize,
    height: usize,
    blend: usize,
    source_side: usize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl ProjectionMap {
    /// Build the lookup table for a `source_side × source_side` fisheye.
    ///
    /// The result is `output_height` rows by `output_height + 2·blend`
    /// columns. Identical inputs always produce identical tables.
    pub fn build(
        output_height: usize,
        source_side: usize,
        blend: usize,
        aperture: f64,
    ) -> PanoResult<Self> {
        validate_geometry(output_height, blend, aperture)?;
        if source_side == 0 {
            return Err(PanoError::invalid_config("Source side must be at least 1"));
        }

        let height = output_height;
        let width = output_height + 2 * blend;
        let margin = blend as f64 / output_height as f64;
        let xs = linspace(-margin, 1.0 + margin, width);
        let ys = linspace(-1.0, 1.0, height);

        let half_side = source_side as f64 / 2.0;
        let lens_span = aperture * PI;

        let mut map_x = vec![0.0f32; width * height];
        let mut map_y = vec![0.0f32; width * height];

        map_x
            .par_chunks_mut(width)
            .zip(map_y.par_chunks_mut(width))
            .enumerate()
            .for_each(|(row, (row_x, row_y))| {
                let latitude = ys[row] * PI / 2.0;
                let (sin_lat, cos_lat) = latitude.sin_cos();
                for (col, x) in xs.iter().enumerate() {
                    let (sin_lon, cos_lon) = (x * PI).sin_cos();
                    let px = cos_lat * cos_lon;
                    let py = cos_lat * sin_lon;
                    let pz = sin_lat;

                    let r = 2.0 * (px * px + pz * pz).sqrt().atan2(py) / lens_span;
                    let theta = pz.atan2(px) + PI;

                    let fx = (r * theta.cos()).clamp(-1.0, 1.0);
                    let fy = (r * theta.sin()).clamp(-1.0, 1.0);

                    row_x[col] = ((1.0 - fx) * half_side) as f32;
                    row_y[col] = ((1.0 + fy) * half_side) as f32;
                }
            });

        tracing::debug!(
            width,
            height,
            blend,
            source_side,
            aperture,
            "Built projection map"
        );

        Ok(Self {
            width,
            height,
            blend,
            source_side,
            map_x,
            map_y,
        })
    }

    /// Build the table for a validated run configuration.
    pub fn for_config(config: &StitchConfig, source_side: usize) -> PanoResult<Self> {
        Self::build(
            config.output_height,
            source_side,
            config.blend,
            config.aperture,
        )
    }

    /// Columns, including both blend margins.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn blend(&self) -> usize {
        self.blend
    }

    /// Side of the square source frame the table was built for.
    pub fn source_side(&self) -> usize {
        self.source_side
    }

    /// Source x-coordinates, row-major.
    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    /// Source y-coordinates, row-major.
    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }

    /// Source coordinate for destination `(col, row)`.
    pub fn lookup(&self, col: usize, row: usize) -> (f32, f32) {
        let i = row * self.width + col;
        (self.map_x[i], self.map_y[i])
    }
}

/// `n` evenly spaced samples over `[start, end]`, both ends included.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
