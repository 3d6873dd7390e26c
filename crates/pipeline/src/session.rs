//! End-to-end stitching of two recordings.
//!
//! Probes both inputs, starts two decoders and one encoder, runs the
//! [`DualStreamPipeline`] on a blocking thread, then remuxes the audio.
//! Ctrl-C cancels the run between frames; the pipeline still closes and
//! awaits every process before returning.

use std::path::{Path, PathBuf};

use panostitch_common::error::{PanoError, PanoResult};
use panostitch_projection::StitchConfig;

use crate::audio::AudioAligner;
use crate::ffmpeg::{DecodeRequest, EncodeRequest, FfmpegDecoder, FfmpegEncoder};
use crate::pipeline::{
    CancelToken, DualStreamPipeline, FrameLimit, OutputMode, ProgressCallback, RunReport,
    RunRequest,
};
use crate::preview::{preview_path, PreviewSink};
use crate::probe::{probe_media, MediaInfo};
use crate::source::FrameSink;
use crate::remux::RemuxPlan;

/// Encoder settings for the composed video.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub vcodec: String,
    pub preset: String,
    pub pix_fmt: String,
}

/// A complete stitching request.
#[derive(Debug, Clone)]
pub struct StitchJob {
    pub left: PathBuf,
    pub right: PathBuf,
    pub output: PathBuf,
    pub skip_left: u64,
    pub skip_right: u64,
    /// Seconds to stitch; the whole usable overlap when `None`.
    pub duration_secs: Option<f64>,
    pub frame_rate: u32,
    pub stitch: StitchConfig,
    /// Unwarp into a panorama, or keep the raw fisheye pair.
    pub mode: OutputMode,
    /// Save the first composed frame as `<output>.png`.
    pub preview: bool,
    pub encode: EncodeSettings,
    pub tmp_dir: PathBuf,
    /// Leave intermediate files in `tmp_dir`.
    pub keep_tmp: bool,
}

/// What a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub run: RunReport,
    pub output: PathBuf,
    pub audio_channels: usize,
}

/// Frames to stitch given both recordings and their skips.
///
/// The usable length is the shorter of the two recordings after skipping;
/// a requested duration is clamped to it.
pub fn plan_frame_count(
    left: &MediaInfo,
    right: &MediaInfo,
    skip_left: u64,
    skip_right: u64,
    frame_rate: u32,
    requested_secs: Option<f64>,
) -> u64 {
    let fps = frame_rate as f64;
    let left_secs = left.duration_secs - skip_left as f64 / fps;
    let right_secs = right.duration_secs - skip_right as f64 / fps;
    let usable = left_secs.min(right_secs).max(0.0);

    let duration = match requested_secs {
        Some(requested) if requested <= usable => requested.max(0.0),
        Some(requested) => {
            tracing::info!(
                requested,
                usable,
                "Requested duration is too long, using maximum duration"
            );
            usable
        }
        None => {
            tracing::info!(usable, "No duration specified, using maximum duration");
            usable
        }
    };
    (fps * duration).floor() as u64
}

/// Stitch `job.left` and `job.right` into `job.output`.
pub async fn stitch_videos(
    job: StitchJob,
    progress: Option<ProgressCallback>,
) -> PanoResult<SessionReport> {
    job.stitch.validate()?;
    let aligner = AudioAligner::new(job.frame_rate as f64)?;
    let cancel = CancelToken::new();

    let worker_cancel = cancel.clone();
    let mut worker =
        tokio::task::spawn_blocking(move || run_session(&job, aligner, progress, &worker_cancel));

    // A failed handler install disables the interrupt branch.
    let joined = tokio::select! {
        joined = &mut worker => joined,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received, stopping after the current frame");
            cancel.cancel();
            worker.await
        }
    };

    joined.map_err(|e| PanoError::Other(anyhow::anyhow!("Stitch worker panicked: {e}")))?
}

fn run_session(
    job: &StitchJob,
    aligner: AudioAligner,
    progress: Option<ProgressCallback>,
    cancel: &CancelToken,
) -> PanoResult<SessionReport> {
    let left = probe_media(&job.left)?;
    let right = probe_media(&job.right)?;

    let frames = plan_frame_count(
        &left,
        &right,
        job.skip_left,
        job.skip_right,
        job.frame_rate,
        job.duration_secs,
    );

    // Both decoders are scaled to one square size; the projection expects
    // square fisheye frames.
    let side = left
        .width
        .max(left.height)
        .max(right.width)
        .max(right.height);
    if job.mode == OutputMode::Equirectangular
        && (left.width != left.height || right.width != right.height)
    {
        tracing::warn!(
            left = %format!("{}x{}", left.width, left.height),
            right = %format!("{}x{}", right.width, right.height),
            side,
            "Inputs are not square, scaling both to {side}x{side}"
        );
    }

    // Maps are built before any process starts so configuration errors
    // surface first.
    let mut pipeline = DualStreamPipeline::for_mode(job.mode, job.stitch, side as usize)?;
    if let Some(cb) = progress {
        pipeline = pipeline.with_progress(cb);
    }

    std::fs::create_dir_all(&job.tmp_dir)?;
    let tmp_video = tmp_video_path(&job.tmp_dir, &job.output);

    let result = encode_and_remux(
        job, &pipeline, aligner, &left, &right, frames, &tmp_video, cancel,
    );

    if !job.keep_tmp {
        if let Err(err) = std::fs::remove_dir_all(&job.tmp_dir) {
            tracing::warn!(error = %err, path = %job.tmp_dir.display(), "Failed to remove tmp folder");
        } else {
            tracing::debug!(path = %job.tmp_dir.display(), "Removed tmp folder");
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn encode_and_remux(
    job: &StitchJob,
    pipeline: &DualStreamPipeline,
    aligner: AudioAligner,
    left: &MediaInfo,
    right: &MediaInfo,
    frames: u64,
    tmp_video: &Path,
    cancel: &CancelToken,
) -> PanoResult<SessionReport> {
    let side = pipeline.source_side() as u32;
    let decode = |info: &MediaInfo, skip: u64| DecodeRequest {
        input: info.path.clone(),
        convert_rate_to: info
            .needs_rate_conversion(job.frame_rate)
            .then_some(job.frame_rate),
        scale_to: (info.width != side || info.height != side).then_some((side, side)),
        max_frames: Some(skip + frames),
    };

    let mut left_source = FfmpegDecoder::spawn("left", &decode(left, job.skip_left))?;
    let mut right_source = FfmpegDecoder::spawn("right", &decode(right, job.skip_right))?;
    let (width, height) = (pipeline.config().output_width(), pipeline.config().output_height);
    let encoder = FfmpegEncoder::spawn(&EncodeRequest {
        output: tmp_video.to_path_buf(),
        width,
        height,
        frame_rate: job.frame_rate,
        vcodec: job.encode.vcodec.clone(),
        preset: job.encode.preset.clone(),
        pix_fmt: job.encode.pix_fmt.clone(),
    })?;
    let mut sink: Box<dyn FrameSink> = if job.preview {
        Box::new(PreviewSink::new(encoder, preview_path(&job.output), width, height))
    } else {
        Box::new(encoder)
    };

    tracing::info!(
        frames,
        mode = ?job.mode,
        skip_left = job.skip_left,
        skip_right = job.skip_right,
        side,
        "Warping frames"
    );
    let request = RunRequest::new(job.skip_left, job.skip_right, FrameLimit::Exactly(frames))
        .with_cancel(cancel.clone());
    let run = pipeline.run(&mut left_source, &mut right_source, sink.as_mut(), &request)?;

    let handoff = aligner
        .align(job.skip_left, job.skip_right)
        .handoff(tmp_video);
    let plan = RemuxPlan::new(
        &handoff,
        [
            (left.path.as_path(), left.has_audio),
            (right.path.as_path(), right.has_audio),
        ],
        &job.tmp_dir,
        &job.output,
    );
    plan.execute()?;

    tracing::info!(output = %job.output.display(), "Finished encoding");
    Ok(SessionReport {
        run,
        output: job.output.clone(),
        audio_channels: plan.tracks.len(),
    })
}

fn tmp_video_path(tmp_dir: &Path, output: &Path) -> PathBuf {
    let basename = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stitched.mp4".to_string());
    tmp_dir.join(basename)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(duration_secs: f64) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("ch.mp4"),
            width: 3072,
            height: 3072,
            frame_rate: 25.0,
            frame_rate_raw: "25/1".to_string(),
            duration_secs,
            start_time_secs: 0.0,
            has_audio: true,
        }
    }

    #[test]
    fn test_frame_count_uses_shorter_overlap() {
        // Left: 60s - 48/24 = 58s, right: 50s - 24/24 = 49s.
        let n = plan_frame_count(&info(60.0), &info(50.0), 48, 24, 24, None);
        assert_eq!(n, 49 * 24);
    }

    #[test]
    fn test_frame_count_clamps_requested_duration() {
        assert_eq!(
            plan_frame_count(&info(60.0), &info(60.0), 0, 0, 24, Some(10.0)),
            240
        );
        assert_eq!(
            plan_frame_count(&info(5.0), &info(60.0), 0, 0, 24, Some(10.0)),
            120
        );
    }

    #[test]
    fn test_frame_count_never_negative() {
        assert_eq!(
            plan_frame_count(&info(1.0), &info(1.0), 240, 0, 24, None),
            0
        );
    }

    fn job(frame_rate: u32) -> StitchJob {
        StitchJob {
            left: PathBuf::from("/nonexistent/ch01_20190626151000.mp4"),
            right: PathBuf::from("/nonexistent/ch02_20190626151005.mp4"),
            output: PathBuf::from("/nonexistent/out.mp4"),
            skip_left: 0,
            skip_right: 0,
            duration_secs: None,
            frame_rate,
            stitch: StitchConfig::new(64, 4, 1.0).unwrap(),
            mode: OutputMode::Equirectangular,
            preview: false,
            encode: EncodeSettings {
                vcodec: "libx264".to_string(),
                preset: "ultrafast".to_string(),
                pix_fmt: "yuv420p".to_string(),
            },
            tmp_dir: std::env::temp_dir().join("panostitch-unused-tmp"),
            keep_tmp: true,
        }
    }

    #[tokio::test]
    async fn test_zero_frame_rate_rejected_before_probing() {
        let err = stitch_videos(job(0), None).await.unwrap_err();
        assert!(matches!(err, PanoError::InvalidConfig { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_invalid_stitch_config_rejected_before_probing() {
        let mut job = job(24);
        job.stitch.blend = 40;
        let err = stitch_videos(job, None).await.unwrap_err();
        assert!(matches!(err, PanoError::InvalidConfig { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_missing_input_reported_after_validation() {
        let err = stitch_videos(job(24), None).await.unwrap_err();
        assert!(matches!(err, PanoError::FileNotFound { .. }), "got {err:?}");
    }

    #[test]
    fn test_tmp_video_path_uses_output_name() {
        assert_eq!(
            tmp_video_path(Path::new(".tmp"), Path::new("unwarp/ch12_out.mp4")),
            PathBuf::from(".tmp/ch12_out.mp4")
        );
    }
}
