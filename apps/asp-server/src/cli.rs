use asp_core::DEFAULT_PORT;

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "asp-server")]
#[command(author, version, about = "Authenticated document conversion server")]
pub struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding config.json
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write asp-server.log into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Enable trace logging
    #[arg(short, long)]
    pub verbose: bool,
}
