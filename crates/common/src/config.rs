//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default stitching parameters.
    pub stitch: StitchDefaults,

    /// Default encoder parameters for the composed video.
    pub encode: EncodeDefaults,

    /// Working folder for intermediate video and audio files.
    pub tmp_dir: TmpDir,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default projection and blending parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchDefaults {
    /// Output panorama height in pixels (width is twice this).
    pub output_height: u32,

    /// Columns crossfaded on each side of a seam.
    pub blend_width: u32,

    /// Ratio of the lens field of view to the image size.
    pub aperture: f64,

    /// Output frame rate.
    pub frame_rate: u32,

    /// Sampling mode: "linear" or "nearest".
    pub interpolation: String,

    /// Out-of-bounds policy: "reflect", "replicate" or "constant".
    pub border: String,
}

/// Default parameters for the encode process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeDefaults {
    /// ffmpeg video codec.
    pub vcodec: String,

    /// ffmpeg codec preset.
    pub preset: String,

    /// Output pixel format.
    pub pix_fmt: String,
}

/// Location of the intermediate working folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TmpDir(pub PathBuf);

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "panostitch=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for StitchDefaults {
    fn default() -> Self {
        Self {
            output_height: 2048,
            blend_width: 16,
            aperture: 1.0,
            frame_rate: 24,
            interpolation: "linear".to_string(),
            border: "reflect".to_string(),
        }
    }
}

impl Default for EncodeDefaults {
    fn default() -> Self {
        Self {
            vcodec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            pix_fmt: "yuv420p".to_string(),
        }
    }
}

impl Default for TmpDir {
    fn default() -> Self {
        Self(PathBuf::from(".tmp"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("panostitch").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"stitch": {"blend_width": 8}, "tmp_dir": "/var/tmp/pano"}"#)
                .unwrap();
        assert_eq!(config.stitch.blend_width, 8);
        assert_eq!(config.stitch.output_height, 2048);
        assert_eq!(config.encode.vcodec, "libx264");
        assert_eq!(config.tmp_dir, TmpDir(PathBuf::from("/var/tmp/pano")));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("panostitch-config-{}", std::process::id()));
        let path = dir.join("config.json");

        let mut config = AppConfig::default();
        config.stitch.aperture = 1.1;
        config.logging.json = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert!((loaded.stitch.aperture - 1.1).abs() < 1e-12);
        assert!(loaded.logging.json);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unparsable_config_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("panostitch-badcfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.stitch.frame_rate, 24);

        std::fs::remove_dir_all(&dir).ok();
    }
}
