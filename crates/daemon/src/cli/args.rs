pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "statetree")]
#[command(about = "Serve a typed state tree to sync clients")]
pub struct Args {
    /// Path to the config file (defaults are used if not set)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
