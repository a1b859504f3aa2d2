use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "audiofetch")]
#[command(author, version, about = "Download audio with speed-aware multi-connection transfer")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Video URL to process (shorthand for `extract <URL>`)
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    #[command(flatten)]
    pub options: ExtractOptions,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the audio of a single URL
    Extract {
        /// Video URL
        url: String,

        #[command(flatten)]
        options: ExtractOptions,
    },

    /// Download several URLs, sharing one speed measurement
    Batch {
        /// File containing URLs, one per line
        #[arg(short, long)]
        input: PathBuf,

        /// Maximum parallel downloads (defaults to batch.max_parallel)
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        parallel: Option<u16>,

        #[command(flatten)]
        options: ExtractOptions,
    },

    /// Measure download speed and show the connection plan
    Speed,

    /// Check external tools
    Doctor,

    /// Show configuration
    Config,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct ExtractOptions {
    /// Convert the download to 320 kbps MP3
    #[arg(long)]
    pub mp3: bool,

    /// Delete the original file after MP3 conversion
    #[arg(long, requires = "mp3")]
    pub delete_original: bool,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Use this many connections instead of measuring speed
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=64))]
    pub connections: Option<u32>,

    /// Skip the speed test and assume speed.fallback_mbps
    #[arg(long, conflicts_with = "connections")]
    pub no_speed_test: bool,

    /// Print the result summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_shorthand_url_with_options() {
        let cli = Cli::parse_from(["audiofetch", "https://youtu.be/abc", "--mp3", "-o", "music"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.url.as_deref(), Some("https://youtu.be/abc"));
        assert!(cli.options.mp3);
        assert_eq!(cli.options.output, Some(PathBuf::from("music")));
    }

    #[test]
    fn test_delete_original_requires_mp3() {
        let result = Cli::try_parse_from([
            "audiofetch",
            "extract",
            "https://youtu.be/abc",
            "--delete-original",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_connections_range() {
        assert!(Cli::try_parse_from(["audiofetch", "extract", "u", "-c", "0"]).is_err());
        let cli = Cli::try_parse_from(["audiofetch", "extract", "u", "-c", "8"]).unwrap();
        match cli.command {
            Some(Commands::Extract { options, .. }) => assert_eq!(options.connections, Some(8)),
            _ => panic!("expected extract"),
        }
    }
}
