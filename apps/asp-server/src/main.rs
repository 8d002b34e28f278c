use asp_server::cli::Cli;
use asp_server::run::run;

use std::process::ExitCode;

use clap::Parser;
use log::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("asp-server: {e}");
            ExitCode::FAILURE
        }
    }
}
