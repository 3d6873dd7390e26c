//! Unwarp and stitch a fisheye pair.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use panostitch_common::config::AppConfig;
use panostitch_pipeline::pipeline::{PipelineStage, StitchProgress};
use panostitch_pipeline::preview::preview_path;
use panostitch_pipeline::session::{stitch_videos, EncodeSettings, StitchJob};
use panostitch_pipeline::{OutputMode, StopReason};
use panostitch_projection::{BorderMode, Interpolation, StitchConfig};

#[derive(Args, Debug)]
pub struct UnwarpArgs {
    /// Left video filename
    #[arg(short, long)]
    left_video: PathBuf,

    /// Left video frames to skip
    #[arg(long, default_value = "0")]
    skip_left: u64,

    /// Right video filename
    #[arg(short, long)]
    right_video: PathBuf,

    /// Right video frames to skip
    #[arg(long, default_value = "0")]
    skip_right: u64,

    /// Output video filename
    #[arg(short, long)]
    output: PathBuf,

    /// Output video height
    #[arg(long)]
    height: Option<u32>,

    /// Output video frame rate
    #[arg(long)]
    frame_rate: Option<u32>,

    /// Blending area in pixels
    #[arg(long)]
    blending: Option<u32>,

    /// Ratio of the camera FOV to image size
    #[arg(long)]
    aperture: Option<f64>,

    /// Sampling mode: linear or nearest
    #[arg(long)]
    interpolation: Option<String>,

    /// Border mode: reflect, replicate, constant[:R,G,B]
    #[arg(long)]
    border: Option<String>,

    /// ffmpeg output video codec preset
    #[arg(long)]
    preset: Option<String>,

    /// ffmpeg output video codec
    #[arg(long)]
    vcodec: Option<String>,

    /// Duration in seconds, uses the entire overlap if omitted
    #[arg(short, long)]
    duration: Option<f64>,

    /// Location of the temp folder
    #[arg(long)]
    tmp_folder: Option<PathBuf>,

    /// Keep the temp folder after finishing
    #[arg(long)]
    keep_tmp: bool,

    /// Output the raw fisheye pair side by side, do not unwarp
    #[arg(long)]
    fisheye: bool,

    /// Save a .png of the first frame for reference
    #[arg(long)]
    preview: bool,
}

impl UnwarpArgs {
    fn into_job(self, config: &AppConfig) -> anyhow::Result<StitchJob> {
        let defaults = &config.stitch;
        let interpolation: Interpolation = self
            .interpolation
            .as_deref()
            .unwrap_or(&defaults.interpolation)
            .parse()?;
        let border: BorderMode = self
            .border
            .as_deref()
            .unwrap_or(&defaults.border)
            .parse()?;

        let stitch = StitchConfig::new(
            self.height.unwrap_or(defaults.output_height) as usize,
            self.blending.unwrap_or(defaults.blend_width) as usize,
            self.aperture.unwrap_or(defaults.aperture),
        )?
        .with_interpolation(interpolation)
        .with_border(border);

        Ok(StitchJob {
            left: self.left_video,
            right: self.right_video,
            output: self.output,
            skip_left: self.skip_left,
            skip_right: self.skip_right,
            duration_secs: self.duration,
            frame_rate: self.frame_rate.unwrap_or(defaults.frame_rate),
            stitch,
            mode: if self.fisheye {
                OutputMode::Fisheye
            } else {
                OutputMode::Equirectangular
            },
            preview: self.preview,
            encode: EncodeSettings {
                vcodec: self.vcodec.unwrap_or_else(|| config.encode.vcodec.clone()),
                preset: self.preset.unwrap_or_else(|| config.encode.preset.clone()),
                pix_fmt: config.encode.pix_fmt.clone(),
            },
            tmp_dir: self.tmp_folder.unwrap_or_else(|| config.tmp_dir.0.clone()),
            keep_tmp: self.keep_tmp,
        })
    }
}

pub async fn run(args: UnwarpArgs, config: &AppConfig) -> anyhow::Result<()> {
    let job = args.into_job(config)?;
    let preview = job.preview.then(|| preview_path(&job.output));

    println!(
        "Stitching {} + {} -> {}",
        job.left.display(),
        job.right.display(),
        job.output.display()
    );
    match job.mode {
        OutputMode::Equirectangular => println!(
            "  Panorama: {}x{} @ {}fps (blend {}, aperture {})",
            job.stitch.output_width(),
            job.stitch.output_height,
            job.frame_rate,
            job.stitch.blend,
            job.stitch.aperture
        ),
        OutputMode::Fisheye => println!(
            "  Fisheye pair: {}x{} @ {}fps",
            job.stitch.output_width(),
            job.stitch.output_height,
            job.frame_rate
        ),
    }

    let progress_cb: Box<dyn Fn(StitchProgress) + Send + Sync> = Box::new(|p| {
        if p.stage == PipelineStage::Aligning {
            println!("  Aligning streams...");
            return;
        }
        match p.frames_requested {
            Some(total) if total > 0 => print!(
                "\r  Progress: {:.1}% ({}/{} frames)  ",
                p.frames_emitted as f64 / total as f64 * 100.0,
                p.frames_emitted,
                total
            ),
            _ => print!("\r  Progress: {} frames  ", p.frames_emitted),
        }
        std::io::stdout().flush().ok();
    });

    let report = stitch_videos(job, Some(progress_cb)).await?;
    println!();

    let run = &report.run;
    match run.stop_reason {
        StopReason::Completed => {}
        StopReason::LeftExhausted => println!("  Reached end of left video"),
        StopReason::RightExhausted => println!("  Reached end of right video"),
    }
    if run.is_short() {
        println!(
            "  Short run: {} of {} frames",
            run.frames_emitted,
            run.frames_requested.unwrap_or_default()
        );
    }
    println!(
        "Stitch complete: {} ({} frames, {} audio channel(s))",
        report.output.display(),
        run.frames_emitted,
        report.audio_channels
    );
    if let Some(path) = preview {
        println!("  Preview: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: UnwarpArgs,
    }

    fn job(extra: &[&str]) -> StitchJob {
        let mut argv = vec!["unwarp", "-l", "ch01.mp4", "-r", "ch02.mp4", "-o", "pano.mp4"];
        argv.extend_from_slice(extra);
        Harness::parse_from(argv)
            .args
            .into_job(&AppConfig::default())
            .unwrap()
    }

    #[test]
    fn test_defaults_come_from_config() {
        let job = job(&[]);
        assert_eq!(job.mode, OutputMode::Equirectangular);
        assert!(!job.preview);
        assert_eq!(job.stitch.output_height, 2048);
        assert_eq!(job.stitch.blend, 16);
        assert_eq!(job.frame_rate, 24);
        assert_eq!(job.encode.vcodec, "libx264");
    }

    #[test]
    fn test_fisheye_and_preview_flags() {
        let job = job(&["--fisheye", "--preview", "--height", "512", "--skip-left", "48"]);
        assert_eq!(job.mode, OutputMode::Fisheye);
        assert!(job.preview);
        assert_eq!(job.stitch.output_height, 512);
        assert_eq!(job.skip_left, 48);
    }

    #[test]
    fn test_bad_border_is_rejected() {
        let args = Harness::parse_from([
            "unwarp", "-l", "a.mp4", "-r", "b.mp4", "-o", "c.mp4", "--border", "wobbly",
        ])
        .args;
        assert!(args.into_job(&AppConfig::default()).is_err());
    }
}
