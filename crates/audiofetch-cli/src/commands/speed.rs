use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use audiofetch_core::{
    config::Config,
    speed::{human_readable_speed, SpeedTester},
    PlanSource,
};

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    let speedtest = config.paths.speedtest_path();
    if speedtest.is_none() {
        println!("speedtest-cli not found; reporting the fallback speed");
    }

    let tester = SpeedTester::new(
        speedtest,
        config.speed.fallback_mbps,
        Duration::from_secs(config.speed.timeout_secs),
    );
    let plan = tester.plan().await;

    match plan.source {
        PlanSource::Measured => {
            println!("Speed:       {}", human_readable_speed(plan.measured_mbps))
        }
        _ => println!(
            "Speed:       not measured (assuming {})",
            human_readable_speed(plan.measured_mbps)
        ),
    }
    println!("Connections: {}", plan.connection_count);

    let transfer = match config.paths.aria2c_path() {
        Some(_) if plan.connection_count > 1 => "aria2c (split download)",
        Some(_) => "yt-dlp native (single connection)",
        None => "yt-dlp native (aria2c not found)",
    };
    println!("Transfer:    {}", transfer);

    Ok(())
}
