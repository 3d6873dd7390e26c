//! PNG snapshot of the first composed frame.

use std::path::{Path, PathBuf};

use image::RgbImage;
use panostitch_common::error::{PanoError, PanoResult};

use crate::source::FrameSink;

/// `<output>.png`, e.g. `pano.mp4` → `pano.mp4.png`.
pub fn preview_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".png");
    PathBuf::from(name)
}

/// Write one raw RGB24 frame as a PNG.
pub fn save_png(path: &Path, width: usize, height: usize, rgb: &[u8]) -> PanoResult<()> {
    let image = RgbImage::from_raw(width as u32, height as u32, rgb.to_vec()).ok_or_else(|| {
        PanoError::shape_mismatch(format!(
            "{} bytes do not hold a {width}x{height} RGB frame",
            rgb.len()
        ))
    })?;
    image.save(path).map_err(|e| {
        PanoError::Other(anyhow::Error::new(e).context(format!(
            "Failed to save preview {}",
            path.display()
        )))
    })
}

/// Forwards frames to `inner` and saves the first one as a PNG.
///
/// A failed snapshot is logged and does not stop the run.
pub struct PreviewSink<S> {
    inner: S,
    path: PathBuf,
    width: usize,
    height: usize,
    saved: bool,
}

impl<S: FrameSink> PreviewSink<S> {
    pub fn new(inner: S, path: impl Into<PathBuf>, width: usize, height: usize) -> Self {
        Self {
            inner,
            path: path.into(),
            width,
            height,
            saved: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: FrameSink> FrameSink for PreviewSink<S> {
    fn write_frame(&mut self, frame: &[u8]) -> PanoResult<()> {
        self.inner.write_frame(frame)?;
        if !self.saved {
            self.saved = true;
            match save_png(&self.path, self.width, self.height, frame) {
                Ok(()) => tracing::info!(path = %self.path.display(), "Saved preview frame"),
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "Preview not saved")
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> PanoResult<()> {
        self.inner.close()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
