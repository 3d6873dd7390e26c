//! Picking the recording and start offset per camera channel.
//!
//! Recorders name files `chNN_YYYYmmddHHMMSS.<ext>`: characters `2..4` of
//! the stem are the channel, everything after the underscore is the
//! recording start time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use panostitch_common::error::{PanoError, PanoResult};

const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const TARGET_FORMATS: [&str; 5] = [
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// The recording chosen for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMatch {
    pub channel: u32,
    pub path: PathBuf,
    pub started_at: NaiveDateTime,
    /// Seconds between the recording start and the target instant.
    pub offset_secs: i64,
    /// Frames to skip to reach the target instant.
    pub skip_frames: u64,
}

/// Parse `(channel, start time)` out of a recording file name.
pub fn parse_recording_name(path: &Path) -> Option<(u32, NaiveDateTime)> {
    let stem = path.file_stem()?.to_str()?;
    let channel = stem.get(2..4)?.parse::<u32>().ok()?;
    let started_at = NaiveDateTime::parse_from_str(stem.get(5..)?, NAME_TIMESTAMP_FORMAT).ok()?;
    Some((channel, started_at))
}

/// Parse a user-supplied target instant.
pub fn parse_target_timestamp(raw: &str) -> PanoResult<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }
    TARGET_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| PanoError::matching(format!("Unrecognized timestamp: {raw}")))
}

/// Recursively list files under `dir` ending in `extension`, sorted.
pub fn list_files(dir: &Path, extension: &str) -> PanoResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PanoError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.to_string_lossy().ends_with(extension) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// For every channel, the recording that started closest before `target`.
pub fn match_recordings(
    files: &[PathBuf],
    target: NaiveDateTime,
    channels: &[u32],
    fps: u32,
) -> PanoResult<Vec<ChannelMatch>> {
    let mut best: BTreeMap<u32, ChannelMatch> = BTreeMap::new();

    for path in files {
        let Some((channel, started_at)) = parse_recording_name(path) else {
            continue;
        };
        if !channels.contains(&channel) {
            continue;
        }
        let offset_secs = (target - started_at).num_seconds();
        if offset_secs < 0 {
            continue;
        }
        let closer = best
            .get(&channel)
            .map_or(true, |current| offset_secs < current.offset_secs);
        if closer {
            best.insert(
                channel,
                ChannelMatch {
                    channel,
                    path: path.clone(),
                    started_at,
                    offset_secs,
                    skip_frames: offset_secs as u64 * fps as u64,
                },
            );
        }
    }

    channels
        .iter()
        .map(|channel| {
            best.get(channel).cloned().ok_or_else(|| {
                PanoError::matching(format!(
                    "No recording for channel {channel:02} starting before {target}"
                ))
            })
        })
        .collect()
}

/// List `dir` and match every channel against `target`.
pub fn find_matches(
    dir: &Path,
    target: NaiveDateTime,
    channels: &[u32],
    fps: u32,
    extension: &str,
) -> PanoResult<Vec<ChannelMatch>> {
    let files = list_files(dir, extension)?;
    tracing::debug!(count = files.len(), extension, "Listed candidate recordings");
    match_recordings(&files, target, channels, fps)
}

/// Skip counts relative to the channel that started last, so that channel
/// begins at frame 0.
pub fn relative_skips(matches: &[ChannelMatch]) -> Vec<u64> {
    let smallest = matches.iter().map(|m| m.skip_frames).min().unwrap_or(0);
    matches.iter().map(|m| m.skip_frames - smallest).collect()
}

/// A ready-to-run `unwarp` invocation for a matched left/right pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwarpSuggestion {
    pub heading: String,
    pub left: PathBuf,
    pub skip_left: u64,
    pub right: PathBuf,
    pub skip_right: u64,
    pub output: PathBuf,
}

impl UnwarpSuggestion {
    pub fn command_line(&self, program: &str) -> String {
        format!(
            "{program} unwarp -l {} --skip-left {} -r {} --skip-right {} -o {}",
            self.left.display(),
            self.skip_left,
            self.right.display(),
            self.skip_right,
            self.output.display()
        )
    }
}

/// Two suggested runs for a pair: one starting near the beginning of both
/// files (relative skips), one starting at `target` itself (absolute skips).
///
/// Outputs go to `unwarp/chLLRR_<name>`; the first is named after the right
/// recording, the second after the target instant.
pub fn suggest_unwarps(
    left: &ChannelMatch,
    right: &ChannelMatch,
    target: NaiveDateTime,
    target_label: &str,
) -> [UnwarpSuggestion; 2] {
    let prefix = format!("ch{:02}{:02}_", left.channel, right.channel);
    let output = |name: String| PathBuf::from("unwarp").join(format!("{prefix}{name}"));
    let smallest = left.skip_frames.min(right.skip_frames);

    let right_name: String = right
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| *c != ':' && *c != ' ')
        .collect();

    [
        UnwarpSuggestion {
            heading: "Extract near beginning of files".to_string(),
            left: left.path.clone(),
            skip_left: left.skip_frames - smallest,
            right: right.path.clone(),
            skip_right: right.skip_frames - smallest,
            output: output(right_name),
        },
        UnwarpSuggestion {
            heading: format!("Extract from {target_label}"),
            left: left.path.clone(),
            skip_left: left.skip_frames,
            right: right.path.clone(),
            skip_right: right.skip_frames,
            output: output(format!("{}.mp4", target.format(NAME_TIMESTAMP_FORMAT))),
        },
    ]
}
