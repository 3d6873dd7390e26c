//! ffmpeg decode/encode processes behind the frame source/sink seams.
//!
//! Every child is wrapped in a [`ChildProcess`] that drains stderr on a
//! background thread and, if it was never awaited, kills and reaps the
//! process on drop so no run leaves an orphaned ffmpeg behind.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use panostitch_common::error::{PanoError, PanoResult};

use crate::source::{read_outcome, FrameSink, FrameSource, ReadOutcome};

const QUIET_ARGS: [&str; 4] = ["-hide_banner", "-nostats", "-loglevel", "error"];

/// A spawned child with its stderr being collected.
struct ChildProcess {
    label: String,
    child: Child,
    stderr_task: Option<JoinHandle<String>>,
    reaped: bool,
}

impl ChildProcess {
    fn spawn(label: impl Into<String>, mut cmd: Command) -> PanoResult<Self> {
        let label = label.into();
        // Own process group: a terminal Ctrl-C reaches only us, and the
        // children are stopped through their pipes after cancellation.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PanoError::process(format!("Failed to start {label}: {e}")))?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || -> String {
                let mut reader = BufReader::new(stderr);
                let mut output = String::new();
                match reader.read_to_string(&mut output) {
                    Ok(_) => output,
                    Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
                }
            })
        });

        tracing::info!(pid = child.id(), process = %label, "ffmpeg process started");
        Ok(Self {
            label,
            child,
            stderr_task,
            reaped: false,
        })
    }

    /// Wait for exit and collect everything written to stderr.
    fn wait(&mut self) -> PanoResult<(ExitStatus, String)> {
        let status = self
            .child
            .wait()
            .map_err(|e| PanoError::process(format!("Failed to wait on {}: {e}", self.label)))?;
        self.reaped = true;

        let stderr_output = self
            .stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default();

        tracing::debug!(process = %self.label, %status, "ffmpeg process exited");
        Ok((status, stderr_output))
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        tracing::warn!(process = %self.label, "Killing ffmpeg process that was never closed");
        if let Err(err) = self.child.kill() {
            tracing::debug!(process = %self.label, error = %err, "Kill failed");
        }
        let _ = self.child.wait();
        if let Some(task) = self.stderr_task.take() {
            let _ = task.join();
        }
    }
}

/// Parameters of one decode process.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub input: PathBuf,
    /// Insert an `fps` filter to reach this rate.
    pub convert_rate_to: Option<u32>,
    /// Insert a `scale` filter to reach this size.
    pub scale_to: Option<(u32, u32)>,
    /// Stop after this many frames (alignment skip included).
    pub max_frames: Option<u64>,
}

impl DecodeRequest {
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = QUIET_ARGS.iter().map(|s| s.to_string()).collect();
        args.push("-i".to_string());
        args.push(self.input.display().to_string());

        let mut filters = Vec::new();
        if let Some(fps) = self.convert_rate_to {
            filters.push(format!("fps=fps={fps}"));
        }
        if let Some((w, h)) = self.scale_to {
            filters.push(format!("scale={w}:{h}"));
        }
        if !filters.is_empty() {
            args.push("-vf".to_string());
            args.push(filters.join(","));
        }
        if let Some(frames) = self.max_frames {
            args.push("-vframes".to_string());
            args.push(frames.to_string());
        }

        args.extend(
            ["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }
}

/// Raw RGB frames decoded by an ffmpeg child.
pub struct FfmpegDecoder {
    name: String,
    stdout: Option<BufReader<ChildStdout>>,
    process: ChildProcess,
    /// The child closed its stdout on its own.
    reached_eof: bool,
}

impl FfmpegDecoder {
    pub fn spawn(name: impl Into<String>, request: &DecodeRequest) -> PanoResult<Self> {
        let name = name.into();
        let args = request.ffmpeg_args();
        tracing::debug!(decoder = %name, args = ?args, "Spawning decoder");

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args);
        Self::from_command(name, cmd)
    }

    /// Decode frames from whatever `cmd` writes to stdout.
    pub(crate) fn from_command(name: String, mut cmd: Command) -> PanoResult<Self> {
        cmd.stdin(Stdio::null()).stdout(Stdio::piped());
        let mut process = ChildProcess::spawn(format!("decoder {name}"), cmd)?;
        let stdout = process
            .child
            .stdout
            .take()
            .ok_or_else(|| PanoError::process("Failed to capture ffmpeg stdout"))?;

        Ok(Self {
            name,
            stdout: Some(BufReader::new(stdout)),
            process,
            reached_eof: false,
        })
    }
}

impl FrameSource for FfmpegDecoder {
    fn read_frame(&mut self, buf: &mut [u8]) -> PanoResult<ReadOutcome> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(ReadOutcome::Exhausted { bytes_read: 0 });
        };
        let outcome = read_outcome(stdout, buf, &self.name)?;
        if matches!(outcome, ReadOutcome::Exhausted { .. }) {
            self.reached_eof = true;
        }
        Ok(outcome)
    }

    fn close(&mut self) -> PanoResult<()> {
        if self.process.reaped {
            return Ok(());
        }
        // Closing our end first lets a decoder that still has frames to give
        // exit on a broken pipe instead of blocking forever.
        drop(self.stdout.take());
        let (status, stderr) = self.process.wait()?;
        if status.success() {
            return Ok(());
        }
        if self.reached_eof {
            // The stream ended because ffmpeg failed, not because we hung up.
            return Err(PanoError::decode(format!(
                "ffmpeg decode of {} failed (status {status}): {}",
                self.name,
                stderr.trim()
            )));
        }
        tracing::debug!(
            decoder = %self.name,
            %status,
            stderr = %stderr.trim(),
            "Decoder exited after its pipe was closed"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Parameters of the encode process.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    pub frame_rate: u32,
    pub vcodec: String,
    pub preset: String,
    pub pix_fmt: String,
}

impl EncodeRequest {
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string()];
        args.extend(QUIET_ARGS.iter().map(|s| s.to_string()));
        args.extend([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-framerate".to_string(),
            self.frame_rate.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-c:v".to_string(),
            self.vcodec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-pix_fmt".to_string(),
            self.pix_fmt.clone(),
            self.output.display().to_string(),
        ]);
        args
    }
}

/// Composed frames piped into an ffmpeg encoder.
pub struct FfmpegEncoder {
    name: String,
    stdin: Option<BufWriter<ChildStdin>>,
    process: ChildProcess,
}

impl FfmpegEncoder {
    pub fn spawn(request: &EncodeRequest) -> PanoResult<Self> {
        let name = format!("encoder {}", request.output.display());
        let args = request.ffmpeg_args();
        tracing::debug!(args = ?args, "Spawning encoder");

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args).stdin(Stdio::piped()).stdout(Stdio::null());
        let mut process = ChildProcess::spawn(name.clone(), cmd)?;
        let stdin = process
            .child
            .stdin
            .take()
            .ok_or_else(|| PanoError::process("Failed to capture ffmpeg stdin"))?;

        Ok(Self {
            name,
            stdin: Some(BufWriter::new(stdin)),
            process,
        })
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &[u8]) -> PanoResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PanoError::sink_write(format!("{} is closed", self.name)))?;
        stdin
            .write_all(frame)
            .map_err(|e| PanoError::sink_write(format!("{}: {e}", self.name)))
    }

    fn close(&mut self) -> PanoResult<()> {
        if self.process.reaped {
            return Ok(());
        }
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };
        let (status, stderr) = self.process.wait()?;

        if !status.success() {
            return Err(PanoError::process(format!(
                "ffmpeg encode failed (status {}): {}",
                status,
                stderr.trim()
            )));
        }
        flushed.map_err(|e| PanoError::sink_write(format!("Failed flushing {}: {e}", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Run an ffmpeg command to completion.
pub fn run_ffmpeg(args: &[String]) -> PanoResult<()> {
    tracing::debug!(args = ?args, "Running ffmpeg");
    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| PanoError::process(format!("Failed to start ffmpeg: {e}")))?;

    if !output.status.success() {
        return Err(PanoError::process(format!(
            "ffmpeg failed (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_args_with_filters() {
        let request = DecodeRequest {
            input: PathBuf::from("ch01.mp4"),
            convert_rate_to: Some(24),
            scale_to: Some((3072, 3072)),
            max_frames: Some(250),
        };
        let args = request.ffmpeg_args();
        let joined = args.join(" ");
        assert!(joined.contains("-i ch01.mp4"));
        assert!(joined.contains("-vf fps=fps=24,scale=3072:3072"));
        assert!(joined.contains("-vframes 250"));
        assert!(joined.ends_with("-f rawvideo -pix_fmt rgb24 pipe:1"));
    }

    #[test]
    fn test_decode_args_without_filters() {
        let request = DecodeRequest {
            input: PathBuf::from("ch02.mp4"),
            convert_rate_to: None,
            scale_to: None,
            max_frames: None,
        };
        let args = request.ffmpeg_args();
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-vframes".to_string()));
    }

    #[test]
    fn test_encode_args() {
        let request = EncodeRequest {
            output: PathBuf::from(".tmp/out.mp4"),
            width: 4096,
            height: 2048,
            frame_rate: 24,
            vcodec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            pix_fmt: "yuv420p".to_string(),
        };
        let joined = request.ffmpeg_args().join(" ");
        assert!(joined.starts_with("-y "));
        assert!(joined.contains("-s 4096x2048 -framerate 24 -i pipe:0"));
        assert!(joined.contains("-c:v libx264 -preset ultrafast -pix_fmt yuv420p"));
        assert!(joined.ends_with(".tmp/out.mp4"));
    }

    #[cfg(unix)]
    fn shell_decoder(script: &str) -> FfmpegDecoder {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        FfmpegDecoder::from_command("left".to_string(), cmd).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_decoder_is_an_error() {
        let mut decoder =
            shell_decoder("echo 'Invalid data found when processing input' >&2; exit 1");
        let mut buf = [0u8; 6];
        assert_eq!(
            decoder.read_frame(&mut buf).unwrap(),
            ReadOutcome::Exhausted { bytes_read: 0 }
        );

        let err = decoder.close().unwrap_err();
        assert!(matches!(err, PanoError::Decode { .. }), "got {err:?}");
        assert!(err.to_string().contains("Invalid data"), "got {err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_end_of_stream_closes_ok() {
        let mut decoder = shell_decoder("printf abcdef");
        let mut buf = [0u8; 6];
        assert_eq!(decoder.read_frame(&mut buf).unwrap(), ReadOutcome::Frame);
        assert_eq!(&buf, b"abcdef");
        assert_eq!(
            decoder.read_frame(&mut buf).unwrap(),
            ReadOutcome::Exhausted { bytes_read: 0 }
        );
        decoder.close().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_ignored_when_closed_early() {
        // Frames are left unread, so the failure status belongs to a pipe
        // we hung up on.
        let mut decoder = shell_decoder("head -c 12 /dev/zero; exit 1");
        let mut buf = [0u8; 6];
        assert_eq!(decoder.read_frame(&mut buf).unwrap(), ReadOutcome::Frame);
        decoder.close().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_children_lead_their_own_process_group() {
        // Field 5 of /proc/<pid>/stat is the process group id.
        let mut decoder =
            shell_decoder(r#"set -- $(cat /proc/$$/stat); [ "$5" = "$$" ] && printf ok"#);
        let mut buf = [0u8; 2];
        assert_eq!(decoder.read_frame(&mut buf).unwrap(), ReadOutcome::Frame);
        assert_eq!(&buf, b"ok");
        decoder.close().unwrap();
    }
}
