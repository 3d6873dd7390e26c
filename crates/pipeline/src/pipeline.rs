//! Lockstep dual-stream stitching loop.
//!
//! ```text
//!            ┌──────────┐   ┌───────────┐   ┌──────┐
//! left  ───► │ Aligning │──►│ Streaming │──►│ Done │
//! right ───► └──────────┘   └───────────┘   └──────┘
//!             skip frames    warp + blend     limit reached,
//!             per side       + emit           source exhausted
//! ```
//!
//! The loop is single-threaded and synchronous; blocking reads on the
//! decode pipes and blocking writes on the encode pipe are the only
//! flow control. Frame `i` of the left source is always paired with frame
//! `i` of the right source.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use panostitch_common::error::{PanoError, PanoResult};
use panostitch_projection::{
    side_by_side, FrameWarper, ProjectionMap, RgbFrame, StereoBlender, StitchConfig,
};

use crate::source::{FrameSink, FrameSource, ReadOutcome};

/// Which lens a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Shared flag used to abort a run between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How many composed frames to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLimit {
    Exactly(u64),
    UntilExhausted,
}

impl FrameLimit {
    fn reached(&self, emitted: u64) -> bool {
        match self {
            FrameLimit::Exactly(n) => emitted >= *n,
            FrameLimit::UntilExhausted => false,
        }
    }

    fn requested(&self) -> Option<u64> {
        match self {
            FrameLimit::Exactly(n) => Some(*n),
            FrameLimit::UntilExhausted => None,
        }
    }
}

/// Per-run inputs of [`DualStreamPipeline::run`].
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Leading left frames to discard before stitching.
    pub skip_left: u64,
    /// Leading right frames to discard before stitching.
    pub skip_right: u64,
    /// Composed frames to produce.
    pub limit: FrameLimit,
    /// Checked between frames.
    pub cancel: CancelToken,
}

impl RunRequest {
    pub fn new(skip_left: u64, skip_right: u64, limit: FrameLimit) -> Self {
        Self {
            skip_left,
            skip_right,
            limit,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Stage of the pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Aligning,
    Streaming,
    Done,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of frames was emitted.
    Completed,
    /// The left source ended first.
    LeftExhausted,
    /// The right source ended first.
    RightExhausted,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub frames_requested: Option<u64>,
    pub frames_emitted: u64,
    pub skipped_left: u64,
    pub skipped_right: u64,
    pub stop_reason: StopReason,
}

impl RunReport {
    /// A frame count was requested and not reached.
    pub fn is_short(&self) -> bool {
        self.frames_requested
            .is_some_and(|requested| self.frames_emitted < requested)
    }
}

/// Progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchProgress {
    pub stage: PipelineStage,
    pub frames_emitted: u64,
    pub frames_requested: Option<u64>,
}

/// Progress callback for pipeline runs.
pub type ProgressCallback = Box<dyn Fn(StitchProgress) + Send + Sync>;

/// Mutable per-run counters, owned by a single `run` call.
#[derive(Debug)]
struct PipelineState {
    stage: PipelineStage,
    frames_emitted: u64,
    skip_remaining: [u64; 2],
    skipped: [u64; 2],
    exhausted: [bool; 2],
}

impl PipelineState {
    fn new(request: &RunRequest) -> Self {
        Self {
            stage: PipelineStage::Aligning,
            frames_emitted: 0,
            skip_remaining: [request.skip_left, request.skip_right],
            skipped: [0, 0],
            exhausted: [false, false],
        }
    }

    fn stop_reason(&self) -> StopReason {
        if self.exhausted[0] {
            StopReason::LeftExhausted
        } else if self.exhausted[1] {
            StopReason::RightExhausted
        } else {
            StopReason::Completed
        }
    }
}

fn slot(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

/// How each frame pair is turned into one output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Warp both lenses and blend them into one equirectangular panorama.
    #[default]
    Equirectangular,
    /// Place the raw `H × H` fisheye frames next to each other.
    Fisheye,
}

enum Composer {
    Unwarp {
        map: Arc<ProjectionMap>,
        warper: FrameWarper,
        blender: StereoBlender,
    },
    SideBySide,
}

/// Drives warp + blend over two lockstep frame sources.
///
/// The projection map is built once and shared read-only by every frame.
pub struct DualStreamPipeline {
    config: StitchConfig,
    source_side: usize,
    composer: Composer,
    progress: Option<ProgressCallback>,
}

impl DualStreamPipeline {
    /// Validate `config` and precompute the map for square
    /// `source_side × source_side` input frames.
    pub fn new(config: StitchConfig, source_side: usize) -> PanoResult<Self> {
        config.validate()?;
        let map = ProjectionMap::for_config(&config, source_side)?;
        Self::with_map(config, Arc::new(map))
    }

    /// Reuse a previously built map. It must match `config`.
    pub fn with_map(config: StitchConfig, map: Arc<ProjectionMap>) -> PanoResult<Self> {
        config.validate()?;
        if map.height() != config.output_height || map.blend() != config.blend {
            return Err(PanoError::shape_mismatch(format!(
                "Projection map {}x{} (blend {}) does not match output height {} / blend {}",
                map.width(),
                map.height(),
                map.blend(),
                config.output_height,
                config.blend
            )));
        }
        Ok(Self {
            config,
            source_side: map.source_side(),
            composer: Composer::Unwarp {
                warper: FrameWarper::from_config(&config),
                blender: StereoBlender::new(config.blend),
                map,
            },
            progress: None,
        })
    }

    /// Emit the two lenses unprojected, side by side. Inputs must already
    /// be `H × H`.
    pub fn fisheye(config: StitchConfig) -> PanoResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source_side: config.output_height,
            composer: Composer::SideBySide,
            progress: None,
        })
    }

    /// Build the pipeline for `mode`. `source_side` is ignored in
    /// [`OutputMode::Fisheye`], where inputs are scaled to the output height.
    pub fn for_mode(mode: OutputMode, config: StitchConfig, source_side: usize) -> PanoResult<Self> {
        match mode {
            OutputMode::Equirectangular => Self::new(config, source_side),
            OutputMode::Fisheye => Self::fisheye(config),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Side of the square input frames.
    pub fn source_side(&self) -> usize {
        self.source_side
    }

    /// Bytes of one composed output frame.
    pub fn output_frame_bytes(&self) -> usize {
        self.config.output_frame_bytes()
    }

    /// Align, stitch and emit frames until the limit is reached or either
    /// source runs dry.
    ///
    /// The sink and both sources are closed on every exit path, including
    /// errors and cancellation. A source running dry is reported through
    /// [`RunReport::stop_reason`], never as an error.
    pub fn run(
        &self,
        left: &mut dyn FrameSource,
        right: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        request: &RunRequest,
    ) -> PanoResult<RunReport> {
        let mut state = PipelineState::new(request);
        let outcome = self.drive(&mut state, left, right, sink, request);
        let cleanup = close_all(left, right, sink);

        match (outcome, cleanup) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(error = %close_err, "Cleanup failed after pipeline error");
                Err(err)
            }
        }
    }

    fn drive(
        &self,
        state: &mut PipelineState,
        left: &mut dyn FrameSource,
        right: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        request: &RunRequest,
    ) -> PanoResult<RunReport> {
        let side = self.source_side();
        let mut left_raw = RgbFrame::new(side, side);
        let mut right_raw = RgbFrame::new(side, side);

        self.enter(state, PipelineStage::Aligning, request);
        let aligned = self.align(state, Side::Left, left, left_raw.as_bytes_mut(), request)?
            && self.align(state, Side::Right, right, right_raw.as_bytes_mut(), request)?;

        if aligned {
            self.enter(state, PipelineStage::Streaming, request);
            while !request.limit.reached(state.frames_emitted) {
                if request.cancel.is_cancelled() {
                    return Err(PanoError::Cancelled);
                }

                let left_read = left.read_frame(left_raw.as_bytes_mut())?;
                let right_read = right.read_frame(right_raw.as_bytes_mut())?;
                if let Some(side) = exhausted_side(left_read, right_read) {
                    tracing::debug!(
                        %side,
                        frame = state.frames_emitted,
                        "Source ended during streaming"
                    );
                    state.exhausted[slot(side)] = true;
                    break;
                }

                let composed = self.compose(&left_raw, &right_raw)?;
                sink.write_frame(composed.as_bytes())?;

                state.frames_emitted += 1;
                self.notify(state, request);
            }
        }

        self.enter(state, PipelineStage::Done, request);
        let report = RunReport {
            frames_requested: request.limit.requested(),
            frames_emitted: state.frames_emitted,
            skipped_left: state.skipped[0],
            skipped_right: state.skipped[1],
            stop_reason: state.stop_reason(),
        };

        if report.is_short() {
            tracing::warn!(
                emitted = report.frames_emitted,
                requested = ?report.frames_requested,
                reason = ?report.stop_reason,
                "Short run: a source ended before the requested frame count"
            );
        } else {
            tracing::info!(
                emitted = report.frames_emitted,
                reason = ?report.stop_reason,
                "Pipeline finished"
            );
        }
        Ok(report)
    }

    fn compose(&self, left: &RgbFrame, right: &RgbFrame) -> PanoResult<RgbFrame> {
        match &self.composer {
            Composer::Unwarp {
                map,
                warper,
                blender,
            } => {
                let left = warper.warp(left, map)?;
                let right = warper.warp(right, map)?;
                blender.blend(&left, &right)
            }
            Composer::SideBySide => side_by_side(left, right),
        }
    }

    /// Discard the leading frames of one side. Returns `false` if the
    /// source ran dry before alignment completed.
    fn align(
        &self,
        state: &mut PipelineState,
        side: Side,
        source: &mut dyn FrameSource,
        scratch: &mut [u8],
        request: &RunRequest,
    ) -> PanoResult<bool> {
        let i = slot(side);
        if state.skip_remaining[i] > 0 {
            tracing::debug!(%side, frames = state.skip_remaining[i], "Skipping frames");
        }
        while state.skip_remaining[i] > 0 {
            if request.cancel.is_cancelled() {
                return Err(PanoError::Cancelled);
            }
            if let ReadOutcome::Exhausted { bytes_read } = source.read_frame(scratch)? {
                tracing::warn!(
                    %side,
                    skipped = state.skipped[i],
                    remaining = state.skip_remaining[i],
                    bytes_read,
                    "Source ended while aligning"
                );
                state.exhausted[i] = true;
                return Ok(false);
            }
            state.skip_remaining[i] -= 1;
            state.skipped[i] += 1;
        }
        Ok(true)
    }

    fn enter(&self, state: &mut PipelineState, stage: PipelineStage, request: &RunRequest) {
        tracing::debug!(from = ?state.stage, to = ?stage, "Pipeline stage");
        state.stage = stage;
        self.notify(state, request);
    }

    fn notify(&self, state: &PipelineState, request: &RunRequest) {
        if let Some(cb) = &self.progress {
            cb(StitchProgress {
                stage: state.stage,
                frames_emitted: state.frames_emitted,
                frames_requested: request.limit.requested(),
            });
        }
    }
}

fn exhausted_side(left: ReadOutcome, right: ReadOutcome) -> Option<Side> {
    match (left, right) {
        (ReadOutcome::Exhausted { .. }, _) => Some(Side::Left),
        (_, ReadOutcome::Exhausted { .. }) => Some(Side::Right),
        _ => None,
    }
}

/// Close both sources and the sink; the first failure wins.
fn close_all(
    left: &mut dyn FrameSource,
    right: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
) -> PanoResult<()> {
    let results = [
        (left.name().to_string(), left.close()),
        (right.name().to_string(), right.close()),
        (sink.name().to_string(), sink.close()),
    ];

    let mut first_err = None;
    for (name, result) in results {
        if let Err(err) = result {
            tracing::warn!(stream = %name, error = %err, "Failed to close stream");
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}
