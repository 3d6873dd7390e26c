//! PanoStitch Pipeline
//!
//! Drives the projection core over two recordings:
//!
//! ```text
//! left.mp4  ── ffmpeg decode ──┐
//!                              ├── DualStreamPipeline (warp + blend) ── ffmpeg encode ── tmp video
//! right.mp4 ── ffmpeg decode ──┘                                                            │
//!                                                                                           ▼
//!                                          AudioAligner offsets ──► remux ──► output.mp4
//! ```

pub mod audio;
pub mod ffmpeg;
pub mod matching;
pub mod pipeline;
pub mod preview;
pub mod probe;
pub mod remux;
pub mod session;
pub mod source;

pub use audio::{AudioAligner, AudioAlignment, RemuxHandoff};
pub use pipeline::*;
pub use preview::PreviewSink;
pub use session::{stitch_videos, StitchJob};
pub use source::{FrameSink, FrameSource, ReadOutcome, ReaderSource, WriterSink};
