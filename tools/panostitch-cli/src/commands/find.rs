//! Locate the recordings covering a timestamp.

use std::path::PathBuf;

use panostitch_pipeline::matching::{find_matches, parse_target_timestamp, suggest_unwarps};

pub fn run(
    input_directory: PathBuf,
    timestamp: String,
    channels: Vec<u32>,
    fps: u32,
    extension: String,
) -> anyhow::Result<()> {
    let target = parse_target_timestamp(&timestamp)?;
    let matches = find_matches(&input_directory, target, &channels, fps, &extension)?;

    for m in &matches {
        println!("{} +{} seconds", m.path.display(), m.offset_secs);
    }

    if let [left, right] = matches.as_slice() {
        for suggestion in suggest_unwarps(left, right, target, &timestamp) {
            println!("{}:", suggestion.heading);
            println!("  {}", suggestion.command_line("panostitch"));
        }
    }

    Ok(())
}
