//! Frame source and sink seams.
//!
//! Sources and sinks are byte streams carrying fixed-size raw RGB frames.
//! A read that ends before one full frame is the end-of-stream signal.

use std::io::{ErrorKind, Read, Write};

use panostitch_common::error::{PanoError, PanoResult};

/// Result of pulling one frame from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The buffer now holds one complete frame.
    Frame,
    /// The stream ended; `bytes_read` (< frame size) trailing bytes were dropped.
    Exhausted { bytes_read: usize },
}

/// A producer of raw, fixed-size frames (typically a decode process).
pub trait FrameSource: Send {
    /// Fill `buf` with exactly one frame.
    fn read_frame(&mut self, buf: &mut [u8]) -> PanoResult<ReadOutcome>;

    /// Release the stream and wait for its producer to exit.
    fn close(&mut self) -> PanoResult<()>;

    /// Human-readable label for logs.
    fn name(&self) -> &str;
}

/// A consumer of raw, fixed-size frames (typically an encode process).
pub trait FrameSink: Send {
    /// Write one complete frame.
    fn write_frame(&mut self, frame: &[u8]) -> PanoResult<()>;

    /// Flush, release the stream and wait for the consumer to finish.
    fn close(&mut self) -> PanoResult<()>;

    /// Human-readable label for logs.
    fn name(&self) -> &str;
}

/// Read until `buf` is full or the stream ends. Returns the bytes read.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Turn a raw read into a frame outcome.
pub(crate) fn read_outcome<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    name: &str,
) -> PanoResult<ReadOutcome> {
    let bytes_read = read_full(reader, buf)
        .map_err(|e| PanoError::decode(format!("Failed reading frame from {name}: {e}")))?;
    if bytes_read == buf.len() {
        Ok(ReadOutcome::Frame)
    } else {
        Ok(ReadOutcome::Exhausted { bytes_read })
    }
}

/// A frame source over any byte reader (files, pipes, in-memory buffers).
#[derive(Debug)]
pub struct ReaderSource<R> {
    name: String,
    reader: R,
    frames_read: u64,
    closed: bool,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
            frames_read: 0,
            closed: false,
        }
    }

    /// Complete frames handed out so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

impl<R: Read + Send> FrameSource for ReaderSource<R> {
    fn read_frame(&mut self, buf: &mut [u8]) -> PanoResult<ReadOutcome> {
        if self.closed {
            return Ok(ReadOutcome::Exhausted { bytes_read: 0 });
        }
        let outcome = read_outcome(&mut self.reader, buf, &self.name)?;
        if outcome == ReadOutcome::Frame {
            self.frames_read += 1;
        }
        Ok(outcome)
    }

    fn close(&mut self) -> PanoResult<()> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A frame sink over any byte writer.
#[derive(Debug)]
pub struct WriterSink<W> {
    name: String,
    writer: W,
    frames_written: u64,
    closed: bool,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
            frames_written: 0,
            closed: false,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> FrameSink for WriterSink<W> {
    fn write_frame(&mut self, frame: &[u8]) -> PanoResult<()> {
        if self.closed {
            return Err(PanoError::sink_write(format!("{} is closed", self.name)));
        }
        self.writer
            .write_all(frame)
            .map_err(|e| PanoError::sink_write(format!("{}: {e}", self.name)))?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> PanoResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer
            .flush()
            .map_err(|e| PanoError::sink_write(format!("Failed flushing {}: {e}", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
