use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

use audiofetch_core::config::Config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("audiofetch dependency check\n");

    let mut all_ok = true;

    // Required
    all_ok &= check(
        "yt-dlp:",
        config.paths.yt_dlp_path().ok(),
        &["--version"],
        |out| out.lines().next().unwrap_or("").trim().to_string(),
        "Install with: pipx install yt-dlp",
    );

    // Needed for --mp3
    all_ok &= check(
        "ffmpeg:",
        config.paths.ffmpeg_path(),
        &["-version"],
        // "ffmpeg version 6.1.1 Copyright ..." -> "6.1.1"
        |out| {
            out.lines()
                .next()
                .and_then(|l| l.split_whitespace().nth(2))
                .unwrap_or("unknown")
                .to_string()
        },
        "Install with: apt install ffmpeg (needed for --mp3)",
    );

    // Optional accelerators
    let aria2c_ok = check(
        "aria2c:",
        config.paths.aria2c_path(),
        &["--version"],
        |out| {
            out.lines()
                .next()
                .and_then(|l| l.split_whitespace().last())
                .unwrap_or("unknown")
                .to_string()
        },
        "Optional. Install with: apt install aria2 (multi-connection downloads)",
    );

    let speedtest_ok = check(
        "speedtest-cli:",
        config.paths.speedtest_path(),
        &["--version"],
        |out| {
            out.lines()
                .next()
                .and_then(|l| l.split_whitespace().nth(1))
                .unwrap_or("unknown")
                .to_string()
        },
        "Optional. Install with: pipx install speedtest-cli (connection tuning)",
    );

    println!();
    if all_ok {
        println!("All required dependencies OK!");
        if !aria2c_ok || !speedtest_ok {
            println!("Optional tools are missing; downloads use a single connection.");
        }
    } else {
        println!("Some dependencies are missing. See above for installation instructions.");
    }

    Ok(())
}

fn check(
    label: &str,
    path: Option<PathBuf>,
    version_args: &[&str],
    parse_version: impl Fn(&str) -> String,
    install_hint: &str,
) -> bool {
    print!("{:<15}", label);
    let Some(path) = path else {
        println!("NOT FOUND");
        println!("               {}", install_hint);
        return false;
    };

    match Command::new(&path).args(version_args).output() {
        Ok(out) if out.status.success() => {
            let version = parse_version(&String::from_utf8_lossy(&out.stdout));
            println!("OK ({}, {})", version, path.display());
            true
        }
        _ => {
            println!("FOUND but failed to get version ({})", path.display());
            false
        }
    }
}
