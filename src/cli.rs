//! Command-line interface for Takebook
//!
//! Handles argument parsing and logging configuration.

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::io::BufRead;
use std::path::PathBuf;
use takebook::{AssetId, TakeStatus};
use tokio::sync::oneshot;

/// Takebook - Record and organize takes under named groups
#[derive(Parser, Debug)]
#[command(name = "takebook")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = all deps
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Keep the library and takes here instead of the default location
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Record a new take from the microphone
    Record {
        /// Group id or title
        #[arg(short, long)]
        group: String,

        #[arg(short, long)]
        title: Option<String>,

        /// Stop after this many seconds instead of waiting for Enter
        #[arg(short, long)]
        seconds: Option<f64>,
    },

    /// Import an audio file as a new take
    Import {
        /// Group id or title
        #[arg(short, long)]
        group: String,

        path: PathBuf,

        #[arg(short, long)]
        title: Option<String>,
    },

    /// Play a take until it ends or Ctrl-C
    Play { id: AssetId },

    /// Manage takes
    #[command(subcommand)]
    Take(TakeCommand),

    /// Show where a take's audio currently lives
    Locate { id: AssetId },

    /// Change persistent settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group
    Add { title: String },

    /// List groups, newest first
    List {
        /// Only titles containing this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Delete a group with all of its takes
    Rm { group: String },
}

#[derive(Subcommand, Debug)]
pub enum TakeCommand {
    /// List the takes in a group, newest first
    List {
        /// Group id or title
        group: String,
    },

    Rename { id: AssetId, title: String },

    /// Set draft, favorite or final
    Status { id: AssetId, status: TakeStatus },

    /// Keep a copy of the take's audio inside the library file
    Embed { id: AssetId },

    /// Delete a take and its audio file
    Rm { id: AssetId },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective settings
    Show,

    /// Embed the audio of new takes into the library file
    EmbedAudio { value: Toggle },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    // Set takebook modules to requested verbosity level
    builder.filter_module("takebook", args.log_level());

    // Decoder and audio server internals only at -vvvv
    if args.verbose >= 4 {
        builder.filter_module("symphonia", args.log_level());
        builder.filter_module("pipewire", args.log_level());
    }

    builder.format_timestamp_millis().init();
}

/// Resolves once a line (or EOF) arrives on `input`
///
/// Reads on its own thread: a pending read never holds up runtime shutdown.
pub fn wait_for_line<R: BufRead + Send + 'static>(mut input: R) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if let Err(e) = input.read_line(&mut line) {
            log::debug!("Stopped reading input: {}", e);
        }
        let _ = tx.send(());
    });
    rx
}
