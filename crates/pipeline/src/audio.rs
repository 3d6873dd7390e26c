//! Audio trim offsets for the downstream remux.

use std::path::PathBuf;

use panostitch_common::error::{PanoError, PanoResult};

/// Converts per-channel video skip counts into audio trim offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioAligner {
    frame_rate: f64,
}

/// Seconds of leading audio to drop from each channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioAlignment {
    pub skip_left_secs: f64,
    pub skip_right_secs: f64,
}

/// Everything the remux step needs from a stitching run.
#[derive(Debug, Clone, PartialEq)]
pub struct RemuxHandoff {
    pub skip_left_secs: f64,
    pub skip_right_secs: f64,
    pub video_path: PathBuf,
}

impl AudioAligner {
    pub fn new(frame_rate: f64) -> PanoResult<Self> {
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(PanoError::invalid_config(format!(
                "Frame rate must be positive, got {frame_rate}"
            )));
        }
        Ok(Self { frame_rate })
    }

    /// `skip_frames / frame_rate`.
    pub fn skip_seconds(&self, skip_frames: u64) -> f64 {
        skip_frames as f64 / self.frame_rate
    }

    pub fn align(&self, skip_left: u64, skip_right: u64) -> AudioAlignment {
        AudioAlignment {
            skip_left_secs: self.skip_seconds(skip_left),
            skip_right_secs: self.skip_seconds(skip_right),
        }
    }
}

impl AudioAlignment {
    pub fn handoff(self, video_path: impl Into<PathBuf>) -> RemuxHandoff {
        RemuxHandoff {
            skip_left_secs: self.skip_left_secs,
            skip_right_secs: self.skip_right_secs,
            video_path: video_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_seconds() {
        let aligner = AudioAligner::new(24.0).unwrap();
        assert_eq!(aligner.skip_seconds(48), 2.0);
        assert_eq!(aligner.skip_seconds(0), 0.0);
    }

    #[test]
    fn test_align_and_handoff() {
        let aligner = AudioAligner::new(25.0).unwrap();
        let handoff = aligner.align(10, 4).handoff("video.mp4");
        assert!((handoff.skip_left_secs - 0.4).abs() < 1e-12);
        assert!((handoff.skip_right_secs - 0.16).abs() < 1e-12);
        assert_eq!(handoff.video_path, PathBuf::from("video.mp4"));
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(AudioAligner::new(0.0).is_err());
        assert!(AudioAligner::new(f64::INFINITY).is_err());
    }
}
