//! anistream - torrent and debrid streaming for an anime library
//!
//! # Usage
//!
//! ```bash
//! anistream search "frieren" --episode 3
//! anistream stream --media-id 154587 --episode 3 --auto
//! anistream link http://127.0.0.1:43211/stream/abc --template "vlc://{url}"
//! ```

use clap::Parser;
use tracing_subscriber::EnvFilter;

use anistream::cli::{Cli, Command, ExitCode, Output};
use anistream::commands;
use anistream::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    run_cli(cli).await.into()
}

/// Log to stderr so stdout stays parseable
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    let config = match &cli.config {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => return output.error(format!("{:#}", e), ExitCode::InvalidArgs),
        },
        None => Config::load(),
    };

    match cli.command {
        Command::Search(cmd) => commands::search_cmd(cmd, &config, &output).await,
        Command::Stream(cmd) => commands::stream_cmd(cmd, &config, &output).await,
        Command::Link(cmd) => commands::link_cmd(cmd, &config, &output).await,
    }
}
