pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "grendel")]
#[command(about = "Manage Grendel key sets and encrypt documents to them")]
#[command(version)]
pub struct Args {
    /// Path to the grendel config directory (defaults to ~/.grendel)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
