//! Media metadata via `ffprobe`.

use std::path::{Path, PathBuf};
use std::process::Command;

use panostitch_common::error::{PanoError, PanoResult};
use serde::Deserialize;

/// The facts about an input recording the stitcher needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Average frame rate in frames per second.
    pub frame_rate: f64,
    /// Average frame rate as reported (e.g. `"30000/1001"`).
    pub frame_rate_raw: String,
    pub duration_secs: f64,
    pub start_time_secs: f64,
    pub has_audio: bool,
}

impl MediaInfo {
    /// Whether the recording needs an `fps` filter to reach `target_fps`.
    pub fn needs_rate_conversion(&self, target_fps: u32) -> bool {
        (self.frame_rate - target_fps as f64).abs() > 1e-3
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe a media file with `ffprobe`.
pub fn probe_media(path: &Path) -> PanoResult<MediaInfo> {
    if !path.exists() {
        return Err(PanoError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| PanoError::process(format!("Failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(PanoError::probe(format!(
            "ffprobe failed on {} (status {}): {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let info = parse_probe_json(path, &raw)?;
    tracing::debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.frame_rate,
        duration = info.duration_secs,
        audio = info.has_audio,
        "Probed media"
    );
    Ok(info)
}

/// Parse `ffprobe -print_format json -show_streams -show_format` output.
pub fn parse_probe_json(path: &Path, json: &str) -> PanoResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PanoError::probe(format!("No video stream in {}", path.display())))?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(PanoError::probe(format!(
                "Video stream in {} has no dimensions",
                path.display()
            )))
        }
    };

    let frame_rate_raw = video
        .avg_frame_rate
        .clone()
        .unwrap_or_else(|| "0/0".to_string());
    let frame_rate = parse_frame_rate(&frame_rate_raw).ok_or_else(|| {
        PanoError::probe(format!(
            "Unusable frame rate {frame_rate_raw} in {}",
            path.display()
        ))
    })?;

    let duration_secs = video
        .duration
        .as_deref()
        .or_else(|| probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| PanoError::probe(format!("No duration for {}", path.display())))?;

    let start_time_secs = video
        .start_time
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        path: path.to_path_buf(),
        width,
        height,
        frame_rate,
        frame_rate_raw,
        duration_secs,
        start_time_secs,
        has_audio,
    })
}

/// Parse an ffprobe rational (`"24/1"`, `"30000/1001"`) or decimal rate.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Whether `binary` can be found in `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "width": 3072, "height": 3072,
             "avg_frame_rate": "25/1", "duration": "600.040000", "start_time": "0.000000"},
            {"index": 1, "codec_type": "audio", "sample_rate": "8000"}
        ],
        "format": {"duration": "600.100000"}
    }"#;

    #[test]
    fn test_parse_probe_json() {
        let info = parse_probe_json(Path::new("ch01.mp4"), SAMPLE).unwrap();
        assert_eq!((info.width, info.height), (3072, 3072));
        assert!((info.frame_rate - 25.0).abs() < 1e-9);
        assert!((info.duration_secs - 600.04).abs() < 1e-9);
        assert!(info.has_audio);
        assert!(info.needs_rate_conversion(24));
        assert!(!info.needs_rate_conversion(25));
    }

    #[test]
    fn test_parse_probe_falls_back_to_container_duration() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 8, "height": 8,
            "avg_frame_rate": "24/1"}], "format": {"duration": "3.5"}}"#;
        let info = parse_probe_json(Path::new("a.mkv"), json).unwrap();
        assert!((info.duration_secs - 3.5).abs() < 1e-9);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_parse_probe_without_video_fails() {
        let json = r#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_json(Path::new("a.wav"), json),
            Err(PanoError::Probe { .. })
        ));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("24/1"), Some(24.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 1e-2);
        assert_eq!(parse_frame_rate("12.5"), Some(12.5));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }
}
