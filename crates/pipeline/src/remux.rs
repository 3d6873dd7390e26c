//! Muxing the composed video with the trimmed audio of both lenses.

use std::path::{Path, PathBuf};

use panostitch_common::error::PanoResult;

use crate::audio::RemuxHandoff;
use crate::ffmpeg::run_ffmpeg;

/// One lens's audio, extracted to a temporary WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub source: PathBuf,
    pub wav: PathBuf,
    pub skip_secs: f64,
}

/// The ffmpeg steps that finish a stitched recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RemuxPlan {
    pub video: PathBuf,
    pub output: PathBuf,
    pub tracks: Vec<AudioTrack>,
}

impl RemuxPlan {
    /// Plan the remux. `sources` lists the left and right recordings with
    /// whether each carries an audio stream; silent ones are left out.
    pub fn new(
        handoff: &RemuxHandoff,
        sources: [(&Path, bool); 2],
        tmp_dir: &Path,
        output: &Path,
    ) -> Self {
        let skips = [handoff.skip_left_secs, handoff.skip_right_secs];
        let tracks = sources
            .iter()
            .zip(skips)
            .filter(|((_, has_audio), _)| *has_audio)
            .map(|((source, _), skip_secs)| AudioTrack {
                source: source.to_path_buf(),
                wav: tmp_audio_path(tmp_dir, source),
                skip_secs,
            })
            .collect();

        Self {
            video: handoff.video_path.clone(),
            output: output.to_path_buf(),
            tracks,
        }
    }

    /// One ffmpeg invocation per track, re-encoding its audio to WAV.
    pub fn extraction_args(&self) -> Vec<Vec<String>> {
        self.tracks
            .iter()
            .map(|track| {
                vec![
                    "-y".to_string(),
                    "-hide_banner".to_string(),
                    "-loglevel".to_string(),
                    "error".to_string(),
                    "-i".to_string(),
                    track.source.display().to_string(),
                    "-vn".to_string(),
                    track.wav.display().to_string(),
                ]
            })
            .collect()
    }

    /// The final mux invocation, or `None` when there is no audio and the
    /// video is copied as is.
    pub fn mux_args(&self) -> Option<Vec<String>> {
        if self.tracks.is_empty() {
            return None;
        }

        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            self.video.display().to_string(),
        ];
        for track in &self.tracks {
            args.push("-i".to_string());
            args.push(track.wav.display().to_string());
        }

        let mut graph: Vec<String> = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                format!(
                    "[{}:a]atrim=start={},asetpts=PTS-STARTPTS[a{i}]",
                    i + 1,
                    track.skip_secs
                )
            })
            .collect();
        let audio_label = if self.tracks.len() == 2 {
            graph.push("[a0][a1]join=inputs=2:channel_layout=stereo[aout]".to_string());
            "[aout]".to_string()
        } else {
            "[a0]".to_string()
        };

        args.extend([
            "-filter_complex".to_string(),
            graph.join(";"),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            audio_label,
            "-c:v".to_string(),
            "copy".to_string(),
            "-shortest".to_string(),
            self.output.display().to_string(),
        ]);
        Some(args)
    }

    /// Run extraction and muxing.
    pub fn execute(&self) -> PanoResult<()> {
        for (track, args) in self.tracks.iter().zip(self.extraction_args()) {
            if let Some(parent) = track.wav.parent() {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!(
                source = %track.source.display(),
                wav = %track.wav.display(),
                "Re-encoding audio"
            );
            run_ffmpeg(&args)?;
        }

        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match self.mux_args() {
            Some(args) => {
                tracing::info!(
                    channels = self.tracks.len(),
                    output = %self.output.display(),
                    "Merging video and audio"
                );
                run_ffmpeg(&args)
            }
            None => {
                tracing::info!(output = %self.output.display(), "No audio channels, using video directly");
                std::fs::copy(&self.video, &self.output)?;
                Ok(())
            }
        }
    }
}

fn tmp_audio_path(tmp_dir: &Path, source: &Path) -> PathBuf {
    let basename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    tmp_dir.join(format!("{basename}.wav"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handoff() -> RemuxHandoff {
        RemuxHandoff {
            skip_left_secs: 2.0,
            skip_right_secs: 0.5,
            video_path: PathBuf::from(".tmp/pano.mp4"),
        }
    }

    #[test]
    fn test_no_audio_copies_video() {
        let plan = RemuxPlan::new(
            &handoff(),
            [(Path::new("a/ch01.mp4"), false), (Path::new("a/ch02.mp4"), false)],
            Path::new(".tmp"),
            Path::new("pano.mp4"),
        );
        assert!(plan.tracks.is_empty());
        assert!(plan.extraction_args().is_empty());
        assert_eq!(plan.mux_args(), None);
    }

    #[test]
    fn test_single_channel_keeps_its_own_offset() {
        let plan = RemuxPlan::new(
            &handoff(),
            [(Path::new("a/ch01.mp4"), false), (Path::new("a/ch02.mp4"), true)],
            Path::new(".tmp"),
            Path::new("pano.mp4"),
        );
        assert_eq!(plan.tracks.len(), 1);
        assert_eq!(plan.tracks[0].wav, PathBuf::from(".tmp/ch02.mp4.wav"));

        let args = plan.mux_args().unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("[1:a]atrim=start=0.5,asetpts=PTS-STARTPTS[a0]"));
        assert!(joined.contains("-map [a0]"));
        assert!(!joined.contains("join="));
    }

    #[test]
    fn test_two_channels_join_to_stereo() {
        let plan = RemuxPlan::new(
            &handoff(),
            [(Path::new("a/ch01.mp4"), true), (Path::new("a/ch02.mp4"), true)],
            Path::new(".tmp"),
            Path::new("out/pano.mp4"),
        );
        assert_eq!(plan.extraction_args().len(), 2);

        let args = plan.mux_args().unwrap();
        let graph_at = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(
            args[graph_at + 1],
            "[1:a]atrim=start=2,asetpts=PTS-STARTPTS[a0];\
             [2:a]atrim=start=0.5,asetpts=PTS-STARTPTS[a1];\
             [a0][a1]join=inputs=2:channel_layout=stereo[aout]"
        );
        assert_eq!(args.last().unwrap(), "out/pano.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "copy"));
    }
}
