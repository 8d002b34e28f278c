//! Server process lifecycle: settings, socket, announcement, shutdown.

use crate::cli::Cli;
use crate::error::AspServerError;
use crate::logger::initialize as LoggerInitialize;

use asp_core::config::AspConfig;
use asp_core::engine::AsciidoctorEngine;
use asp_core::secret_key_announcement;
use asp_core::server::start_server;

use common::SecretKey;

use std::io::{Write, stdout};
use std::sync::Arc;

use log::{info, warn};
use tokio::signal::ctrl_c;

/// Run the server until a Stop request or Ctrl-C.
///
/// Once the socket is bound, prints the announcement line carrying the
/// secret key to stdout. Nothing else is ever written to stdout.
///
/// # Errors
///
/// Returns [`AspServerError`] if logging, config loading or binding fails.
pub async fn run(cli: Cli) -> Result<(), AspServerError> {
    LoggerInitialize(cli.log_dir.as_deref(), cli.verbose)?;

    let config = match &cli.config {
        Some(dir) => AspConfig::load(dir)?,
        None => AspConfig::default(),
    };

    let engine = Arc::new(AsciidoctorEngine::new(config.engine.clone()));
    let secret_key = SecretKey::generate();
    let mut handle = start_server(&config.server, cli.port, secret_key.clone(), engine).await?;

    announce(&secret_key_announcement(
        &config.server.host,
        handle.port(),
        &secret_key,
    ));
    drop(secret_key);

    let interrupted = tokio::select! {
        _ = handle.wait() => false,
        signal = ctrl_c() => match signal {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {e}");
                false
            }
        },
    };

    if interrupted {
        info!("Interrupted, shutting down");
        handle.shutdown().await;
    } else {
        handle.wait().await;
    }

    info!("ASP server on port {} stopped", handle.port());
    Ok(())
}

fn announce(line: &str) {
    let mut out = stdout().lock();
    if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
        warn!("Failed to write announcement to stdout: {e}");
    }
}
