use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sidecar",
    about = "Track large files by content, archived in object storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log progress and diagnostics to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run as if started in DIR
    #[arg(short = 'C', long, global = true, value_name = "DIR", default_value = ".")]
    pub directory: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create sidecar.json and the local store
    Init(InitArgs),
    /// List tracked paths
    Ls,
    /// Move files into the store and replace them with links
    Add(AddArgs),
    /// Show whether each tracked file is in the archive
    Status(SyncArgs),
    /// Upload tracked content missing from the archive
    Push(SyncArgs),
    /// Download missing content and restore links
    Pull(SyncArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Archive location, e.g. s3://bucket/prefix
    pub url: String,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Use this archive instead of the one in sidecar.json
    #[arg(long)]
    pub url: Option<String>,
    /// Number of files to process concurrently
    #[arg(short, long, default_value = "10")]
    pub jobs: NonZeroUsize,
}
