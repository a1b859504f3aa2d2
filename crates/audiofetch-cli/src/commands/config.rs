use anyhow::Result;
use std::path::Path;
use audiofetch_core::config::Config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("audiofetch configuration\n");
    print!("{}", toml::to_string_pretty(&config)?);

    println!("\n[resolved tools]");
    let resolved = [
        ("yt_dlp", config.paths.yt_dlp_path().ok()),
        ("ffmpeg", config.paths.ffmpeg_path()),
        ("aria2c", config.paths.aria2c_path()),
        ("speedtest", config.paths.speedtest_path()),
    ];
    for (name, path) in resolved {
        match path {
            Some(p) => println!("  {} = {:?}", name, p),
            None => println!("  {} = (not found)", name),
        }
    }

    // Show config file locations
    println!("\nConfig file locations (in priority order):");
    println!("  1. Environment variables (AUDIOFETCH_*, nested with __)");
    if let Some(p) = config_path {
        println!("  2. {} (specified)", p.display());
    }
    if let Some(p) = Config::default_file() {
        println!("  3. {}", p.display());
    }

    Ok(())
}
