//! CLI argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Image relay gateway: validates images and forwards them to third-party hosts.
#[derive(Parser, Debug)]
#[command(name = "imgrelay", version, about)]
pub struct Cli {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose (debug) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP gateway until Ctrl-C.
    Serve {
        /// Listen address (overrides `server.bind`).
        #[arg(long)]
        bind: Option<String>,
    },
    /// Upload a local image and print its URL.
    Upload {
        /// Image file to upload.
        file: PathBuf,
        /// Channel name; unknown names fall back to the default.
        #[arg(short, long)]
        channel: Option<String>,
    },
    /// Download an image from a URL, upload it and print the new URL.
    Fetch {
        /// Source image URL.
        url: String,
        /// Channel name; unknown names fall back to the default.
        #[arg(short, long)]
        channel: Option<String>,
    },
    /// List registered channels.
    Channels,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_with_channel() {
        let cli = Cli::parse_from(["imgrelay", "upload", "cat.png", "-c", "jd"]);
        assert_eq!(
            cli.command,
            Command::Upload { file: PathBuf::from("cat.png"), channel: Some("jd".into()) }
        );
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["imgrelay", "channels", "-v", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.command, Command::Channels);
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("/tmp/c.toml"));
    }

    #[test]
    fn serve_defaults_to_configured_bind() {
        let cli = Cli::parse_from(["imgrelay", "serve"]);
        assert_eq!(cli.command, Command::Serve { bind: None });
        let cli = Cli::parse_from(["imgrelay", "serve", "--bind", "127.0.0.1:9000"]);
        assert_eq!(cli.command, Command::Serve { bind: Some("127.0.0.1:9000".into()) });
    }

    #[test]
    fn fetch_takes_url() {
        let cli = Cli::parse_from(["imgrelay", "fetch", "https://example.com/a.png"]);
        assert_eq!(
            cli.command,
            Command::Fetch { url: "https://example.com/a.png".into(), channel: None }
        );
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["imgrelay"]).is_err());
        assert!(Cli::try_parse_from(["imgrelay", "upload"]).is_err());
    }
}
