//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// packwalk - restores project dependencies into a lock file
#[derive(Parser)]
#[command(name = "packwalk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Restore dependencies and write project.lock.json
    Restore(RestoreArgs),

    /// Display the dependency tree recorded in the lock file
    Tree(TreeArgs),
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Project directory, or a directory to search for projects
    pub path: Option<PathBuf>,

    /// Package feed (directory or URL); replaces configured feeds
    #[arg(short, long = "feed", value_name = "FEED")]
    pub feeds: Vec<String>,

    /// Directory to install packages into
    #[arg(long, value_name = "DIR")]
    pub packages: Option<PathBuf>,

    /// Runtime identifier to restore (e.g. win7-x64)
    #[arg(short, long = "runtime", value_name = "RID")]
    pub runtimes: Vec<String>,

    /// Write the lock file even if some frameworks fail to resolve
    #[arg(long)]
    pub allow_partial: bool,

    /// Mark the lock file as locked
    #[arg(long, conflicts_with = "unlock")]
    pub lock: bool,

    /// Ignore a locked lock file and write an unlocked one
    #[arg(long)]
    pub unlock: bool,

    /// Skip HTTP feeds
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Project directory (defaults to the nearest project)
    pub path: Option<PathBuf>,

    /// Only show this framework (e.g. dnx451)
    #[arg(long)]
    pub framework: Option<String>,

    /// Show the runtime-specific target
    #[arg(short, long)]
    pub runtime: Option<String>,

    /// Maximum depth to display
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Show duplicate dependencies
    #[arg(long)]
    pub duplicates: bool,
}
