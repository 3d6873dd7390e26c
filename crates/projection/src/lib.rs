//! PanoStitch Projection: the geometric core.
//!
//! Turns a pair of fisheye frames into one equirectangular panorama:
//!
//! ```text
//! left fisheye ──► warp (ProjectionMap) ──┐
//!                                         ├── StereoBlender ──► 2H × H panorama
//! right fisheye ─► warp (ProjectionMap) ──┘
//! ```
//!
//! The map is computed once per configuration and shared read-only by
//! every frame of a run.
//!
//! This crate is pure computation with no I/O and no processes.

pub mod blend;
pub mod config;
pub mod frame;
pub mod map;
pub mod warp;

pub use blend::{side_by_side, BlendWeights, StereoBlender};
pub use config::{BorderMode, Interpolation, StitchConfig};
pub use frame::{RgbFrame, WarpedFrame, CHANNELS};
pub use map::ProjectionMap;
pub use warp::FrameWarper;
