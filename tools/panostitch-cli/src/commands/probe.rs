//! Print stream information for media files.

use std::path::PathBuf;

use panostitch_pipeline::probe::{probe_media, MediaInfo};

pub fn run(paths: Vec<PathBuf>) -> anyhow::Result<()> {
    for path in &paths {
        let info = probe_media(path)?;
        println!("{}", info.path.display());
        println!("  Resolution: {}x{}", info.width, info.height);
        println!(
            "  Frame rate: {:.3} ({})",
            info.frame_rate, info.frame_rate_raw
        );
        println!("  Duration:   {:.2}s", info.duration_secs);
        println!("  Start time: {:.3}s", info.start_time_secs);
        println!(
            "  Audio:      {}",
            if info.has_audio { "yes" } else { "no" }
        );
        if let Some(warning) = shape_warning(&info) {
            println!("  Warning: {warning}");
        }
    }
    Ok(())
}

/// Note for inputs that `unwarp` will have to rescale.
fn shape_warning(info: &MediaInfo) -> Option<String> {
    (info.width != info.height).then(|| {
        let side = info.width.max(info.height);
        format!(
            "frame is not square, unwarp scales it to at least {side}x{side} \
             (the largest dimension of both inputs)"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("ch01.mp4"),
            width,
            height,
            frame_rate: 24.0,
            frame_rate_raw: "24/1".to_string(),
            duration_secs: 10.0,
            start_time_secs: 0.0,
            has_audio: false,
        }
    }

    #[test]
    fn test_square_input_has_no_warning() {
        assert_eq!(shape_warning(&info(3072, 3072)), None);
    }

    #[test]
    fn test_warning_names_the_largest_dimension() {
        let warning = shape_warning(&info(1920, 1080)).unwrap();
        assert!(warning.contains("1920x1920"), "{warning}");
        assert!(!warning.contains("shorter"));
    }
}
