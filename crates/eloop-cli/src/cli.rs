use clap::{Args, Parser, Subcommand};
use eloop::core::io::checkpoint::Encoding;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "K M Masum Habib",
    version,
    about = "eloop CLI - Runs parallel energy sweeps over a pool of workers and appends the merged result series to checkpoint files.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used by the parallel merge sort.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a sweep described by a TOML configuration file.
    Run(RunArgs),
    /// List every block stored in a checkpoint file.
    Inspect(InspectArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the sweep configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the checkpoint file the merged series are appended to.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Override the checkpoint encoding (text or binary).
    #[arg(short, long, value_name = "ENCODING")]
    pub encoding: Option<Encoding>,

    /// Override the number of worker ranks.
    #[arg(short, long, value_name = "INT")]
    pub workers: Option<usize>,

    /// Override the rank that gathers, merges, and writes results.
    #[arg(long, value_name = "RANK")]
    pub coordinator: Option<usize>,

    /// Override the label shown with progress output.
    #[arg(long, value_name = "TEXT")]
    pub label: Option<String>,

    /// Enable a configured series. Can be used multiple times.
    #[arg(long, value_name = "TAG")]
    pub enable: Vec<String>,

    /// Disable a configured series. Can be used multiple times.
    #[arg(long, value_name = "TAG")]
    pub disable: Vec<String>,

    /// Do not copy the configuration file next to the checkpoint.
    #[arg(long)]
    pub no_archive_config: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S domain.count=201
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to the checkpoint file.
    #[arg(required = true, value_name = "PATH")]
    pub path: PathBuf,

    /// Encoding the checkpoint was written with.
    #[arg(short, long, value_name = "ENCODING", default_value_t = Encoding::Text)]
    pub encoding: Encoding,

    /// Only list blocks carrying this tag.
    #[arg(short, long, value_name = "TAG")]
    pub tag: Option<String>,
}
