//! CLI - Command Line Interface for anistream
//!
//! Drives the streaming core against a running backend. Every command can
//! print JSON for scripting.
//!
//! # Examples
//!
//! ```bash
//! # Search torrents for an episode
//! anistream search "frieren" --episode 3 --sort seeders
//!
//! # Stream an episode, letting the engine pick the torrent
//! anistream stream --media-id 154587 --episode 3 --auto
//!
//! # Build an external player link for a stream URL
//! anistream link http://127.0.0.1:43211/stream/abc --template "vlc://{url}"
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::error::ErrorClass;
use crate::models::{DeviceKind, PlaybackType};
use crate::stream::catalog::{SortDirection, SortField, SortState};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments or unsupported combination
    InvalidArgs = 2,
    /// Backend unreachable
    NetworkError = 3,
    /// No sources found
    NoSources = 4,
    /// Streaming engine failed
    StreamFailed = 5,
    /// A file has to be picked manually
    SelectionRequired = 6,
    /// Interrupted by the user
    Cancelled = 130,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

impl From<ErrorClass> for ExitCode {
    fn from(class: ErrorClass) -> ExitCode {
        match class {
            ErrorClass::CatalogUnavailable => ExitCode::NetworkError,
            ErrorClass::UnsupportedSearch
            | ErrorClass::ConflictingSelection
            | ErrorClass::SourceRequired
            | ErrorClass::Configuration => ExitCode::InvalidArgs,
            ErrorClass::BatchMappingRequired
            | ErrorClass::EpisodeNotInBatch
            | ErrorClass::FileSelectionRequired => ExitCode::SelectionRequired,
            ErrorClass::EngineFailure => ExitCode::StreamFailed,
            ErrorClass::InvalidState | ErrorClass::NoActiveSession => ExitCode::Error,
        }
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// anistream - torrent and debrid streaming for your anime library
#[derive(Parser, Debug)]
#[command(
    name = "anistream",
    version,
    about = "Torrent and debrid streaming for your anime library",
    long_about = "Searches torrents, starts streams on the backend's torrent or \
                  debrid engine and tells you how to play them.",
    after_help = "EXAMPLES:\n\
                  anistream search frieren -e 3            Search torrents\n\
                  anistream stream -m 154587 -e 3 --auto   Stream an episode\n\
                  anistream link <url> -t 'vlc://{url}'    Build a player link"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }

    /// Default log filter when RUST_LOG is not set
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "anistream=warn",
            1 => "anistream=debug",
            _ => "anistream=trace",
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search torrents for an anime
    #[command(visible_alias = "s")]
    Search(SearchCmd),

    /// Start streaming an episode and wait until it is ready
    #[command(visible_alias = "st")]
    Stream(StreamCmd),

    /// Build the playback link for a stream URL
    Link(LinkCmd),
}

// =============================================================================
// Search Command
// =============================================================================

/// Search torrents by query, or smart search by media
#[derive(Args, Debug)]
pub struct SearchCmd {
    /// Search query (anime title, release name)
    #[arg(required = true)]
    pub query: String,

    /// Episode number
    #[arg(long, short = 'e')]
    pub episode: Option<u32>,

    /// Only batches
    #[arg(long, short = 'b')]
    pub batch: bool,

    /// Resolution (1080p, 720p, ...)
    #[arg(long, short = 'r')]
    pub resolution: Option<String>,

    /// Rank by media title and episode instead of the raw query
    #[arg(long)]
    pub smart: bool,

    /// Media id for smart search
    #[arg(long, short = 'm')]
    pub media_id: Option<u32>,

    /// Only the best match (requires --smart)
    #[arg(long)]
    pub best: bool,

    /// Search the adult catalog
    #[arg(long)]
    pub adult: bool,

    /// Sort by criterion (server order when omitted)
    #[arg(long, value_enum)]
    pub sort: Option<SortChoice>,

    /// Ascending instead of descending
    #[arg(long, requires = "sort")]
    pub asc: bool,

    /// Maximum number of results
    #[arg(long, short = 'l', default_value = "20")]
    pub limit: usize,
}

impl SearchCmd {
    pub fn sort_state(&self) -> SortState {
        match self.sort {
            Some(choice) => SortState::by(
                choice.into(),
                if self.asc {
                    SortDirection::Asc
                } else {
                    SortDirection::Desc
                },
            ),
            None => SortState::default(),
        }
    }
}

/// Sort criterion for search results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortChoice {
    #[value(alias = "seeds")]
    Seeders,
    Size,
    Date,
    #[value(alias = "quality")]
    Resolution,
}

impl From<SortChoice> for SortField {
    fn from(choice: SortChoice) -> SortField {
        match choice {
            SortChoice::Seeders => SortField::Seeders,
            SortChoice::Size => SortField::Size,
            SortChoice::Date => SortField::Date,
            SortChoice::Resolution => SortField::Resolution,
        }
    }
}

// =============================================================================
// Stream Command
// =============================================================================

/// Start a stream on the backend's engine
#[derive(Args, Debug)]
pub struct StreamCmd {
    /// Media id
    #[arg(long, short = 'm', required = true)]
    pub media_id: u32,

    /// Episode number
    #[arg(long, short = 'e', required = true)]
    pub episode: u32,

    /// AniDB episode identifier (defaults to the episode number)
    #[arg(long)]
    pub anidb_episode: Option<String>,

    /// Media title, used for the window title
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// Let the engine search and pick the torrent
    #[arg(long)]
    pub auto: bool,

    /// Magnet link of the torrent to stream
    #[arg(long, conflicts_with = "pick")]
    pub magnet: Option<String>,

    /// Search by title and stream the N-th result (1-based)
    #[arg(long)]
    pub pick: Option<usize>,

    /// File index inside the torrent
    #[arg(long, short = 'i')]
    pub file_index: Option<u32>,

    /// Playback preference (overrides config)
    #[arg(long, short = 'p', value_enum)]
    pub playback: Option<PlaybackChoice>,

    /// Client id to stream as
    #[arg(long, default_value = "cli")]
    pub client_id: String,

    /// Hostname the player reaches the server through
    #[arg(long)]
    pub hostname: Option<String>,
}

/// Playback preference
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackChoice {
    /// Embedded player
    Default,
    /// Native desktop player
    Native,
    /// External player link
    External,
    /// Only prepare the stream
    None,
}

impl From<PlaybackChoice> for PlaybackType {
    fn from(choice: PlaybackChoice) -> PlaybackType {
        match choice {
            PlaybackChoice::Default => PlaybackType::Default,
            PlaybackChoice::Native => PlaybackType::NativePlayer,
            PlaybackChoice::External => PlaybackType::ExternalPlayerLink,
            PlaybackChoice::None => PlaybackType::NoneAndAwait,
        }
    }
}

// =============================================================================
// Link Command
// =============================================================================

/// Negotiate playback for a stream URL without contacting the backend
#[derive(Args, Debug)]
pub struct LinkCmd {
    /// Stream URL as reported by the engine
    #[arg(required = true)]
    pub url: String,

    /// External player link template (overrides config)
    #[arg(long, short = 't')]
    pub template: Option<String>,

    /// Media title
    #[arg(long, default_value = "")]
    pub title: String,

    /// Episode number
    #[arg(long, short = 'e', default_value = "1")]
    pub episode: u32,

    /// Hostname to replace loopback addresses with (defaults to the LAN IP)
    #[arg(long)]
    pub hostname: Option<String>,

    /// Client device kind
    #[arg(long, value_enum)]
    pub device: Option<DeviceChoice>,

    /// Playback preference (defaults to external)
    #[arg(long, short = 'p', value_enum, default_value = "external")]
    pub playback: PlaybackChoice,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    Desktop,
    Web,
    Mobile,
}

impl From<DeviceChoice> for DeviceKind {
    fn from(choice: DeviceChoice) -> DeviceKind {
        match choice {
            DeviceChoice::Desktop => DeviceKind::Desktop,
            DeviceChoice::Web => DeviceKind::Web,
            DeviceChoice::Mobile => DeviceKind::Mobile,
        }
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            error_class: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, class: Option<ErrorClass>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            error_class: class,
            exit_code: code.into(),
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print a plain line (non-JSON mode only)
    pub fn line(&self, msg: impl std::fmt::Display) {
        if !self.json {
            println!("{}", msg);
        }
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        self.emit_error(msg.into(), None, code)
    }

    /// Print a streaming error with its class and return the matching exit code
    pub fn stream_error(&self, err: &crate::error::StreamError) -> ExitCode {
        let class = err.class();
        let msg = format!("{} ({})", err, class.user_message());
        self.emit_error(msg, Some(class), class.into())
    }

    fn emit_error(&self, msg: String, class: Option<ErrorClass>, code: ExitCode) -> ExitCode {
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, class, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
