//! Immutable per-run stitching configuration.

use std::fmt;
use std::str::FromStr;

use panostitch_common::error::{PanoError, PanoResult};
use serde::{Deserialize, Serialize};

/// How a source pixel is sampled at a fractional lookup coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Round to the closest source pixel.
    Nearest,
    /// Weighted average of the four surrounding pixels.
    #[default]
    Linear,
}

/// How lookups that fall outside the source image are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderMode {
    /// Mirror the image at its edge, repeating the edge pixel (`fedcba|abcdef`).
    #[default]
    Reflect,
    /// Clamp to the nearest edge pixel.
    Replicate,
    /// Fill with a fixed RGB color.
    Constant([u8; 3]),
}

impl FromStr for Interpolation {
    type Err = PanoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" | "bilinear" => Ok(Self::Linear),
            other => Err(PanoError::invalid_config(format!(
                "Unknown interpolation: {other}. Use: linear, nearest"
            ))),
        }
    }
}

impl FromStr for BorderMode {
    type Err = PanoError;

    /// Parses `reflect`, `replicate` (alias `clamp`), `constant` (black) or
    /// `constant:R,G,B`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "reflect" => return Ok(Self::Reflect),
            "replicate" | "clamp" => return Ok(Self::Replicate),
            "constant" => return Ok(Self::Constant([0, 0, 0])),
            _ => {}
        }

        if let Some(rgb) = lower.strip_prefix("constant:") {
            let parts = rgb
                .split(',')
                .map(|p| p.trim().parse::<u8>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PanoError::invalid_config(format!("Bad border color {rgb}: {e}")))?;
            if let [r, g, b] = parts[..] {
                return Ok(Self::Constant([r, g, b]));
            }
            return Err(PanoError::invalid_config(format!(
                "Border color needs three components, got {rgb}"
            )));
        }

        Err(PanoError::invalid_config(format!(
            "Unknown border mode: {s}. Use: reflect, replicate, constant[:R,G,B]"
        )))
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

impl fmt::Display for BorderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reflect => write!(f, "reflect"),
            Self::Replicate => write!(f, "replicate"),
            Self::Constant([r, g, b]) => write!(f, "constant:{r},{g},{b}"),
        }
    }
}

/// Stitching parameters shared read-only by every frame of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StitchConfig {
    /// Output panorama height `H`; the panorama is `2H` wide.
    pub output_height: usize,

    /// Columns crossfaded on each side of a seam (`b`).
    pub blend: usize,

    /// Lens field of view relative to the image size (1.0 = hemisphere).
    pub aperture: f64,

    /// Sampling mode used by the warper.
    pub interpolation: Interpolation,

    /// Out-of-bounds policy used by the warper.
    pub border: BorderMode,
}

impl StitchConfig {
    /// Create a validated configuration with linear sampling and
    /// reflected borders.
    pub fn new(output_height: usize, blend: usize, aperture: f64) -> PanoResult<Self> {
        let config = Self {
            output_height,
            blend,
            aperture,
            interpolation: Interpolation::default(),
            border: BorderMode::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_border(mut self, border: BorderMode) -> Self {
        self.border = border;
        self
    }

    /// Check the geometric constraints.
    pub fn validate(&self) -> PanoResult<()> {
        validate_geometry(self.output_height, self.blend, self.aperture)
    }

    /// Width of one warped (padded) projection: `H + 2b`.
    pub fn warped_width(&self) -> usize {
        self.output_height + 2 * self.blend
    }

    /// Width of the composed panorama: `2H`.
    pub fn output_width(&self) -> usize {
        2 * self.output_height
    }

    /// Byte size of one composed RGB frame.
    pub fn output_frame_bytes(&self) -> usize {
        crate::frame::RgbFrame::byte_len(self.output_width(), self.output_height)
    }
}

pub(crate) fn validate_geometry(output_height: usize, blend: usize, aperture: f64) -> PanoResult<()> {
    if output_height < 2 {
        return Err(PanoError::invalid_config(format!(
            "Output height must be at least 2, got {output_height}"
        )));
    }
    if 2 * blend >= output_height {
        return Err(PanoError::invalid_config(format!(
            "Blend width {blend} must be less than half the output height {output_height}"
        )));
    }
    if !aperture.is_finite() || aperture <= 0.0 {
        return Err(PanoError::invalid_config(format!(
            "Aperture must be a positive number, got {aperture}"
        )));
    }
    Ok(())
}
