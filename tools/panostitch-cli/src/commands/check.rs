//! Check external tool availability.

use panostitch_common::config::config_file_path;
use panostitch_pipeline::probe::command_exists;

pub fn run() -> anyhow::Result<()> {
    println!("PanoStitch environment check");
    println!();

    let mut missing = Vec::new();
    for tool in ["ffmpeg", "ffprobe"] {
        let found = command_exists(tool);
        println!(
            "  {:<8} {}",
            tool,
            if found { "found" } else { "NOT FOUND" }
        );
        if !found {
            missing.push(tool);
        }
    }

    let config_path = config_file_path();
    println!();
    println!(
        "  Config:  {} ({})",
        config_path.display(),
        if config_path.exists() {
            "present"
        } else {
            "defaults"
        }
    );

    if !missing.is_empty() {
        anyhow::bail!("Missing required tools: {}", missing.join(", "));
    }
    println!();
    println!("All checks passed.");
    Ok(())
}
