//! Server launchers.
//!
//! Two strategies share one lifecycle contract ([`ServerLauncher`]):
//!
//! - [`EmbeddedServerLauncher`] runs the Server Core as tasks inside the
//!   caller's runtime.
//! - [`ExternalProcessServerLauncher`] spawns the server executable as a child
//!   process and learns the secret key from its output.
//!
//! Both move through `NotStarted → Starting → Listening → Stopped` and hand the
//! generated key back only through the return value of `launch`.

mod embedded;
mod external;

pub use embedded::EmbeddedServerLauncher;
pub use external::{ExternalProcessServerLauncher, LogOutputHandler, OutputHandler};

#[cfg(test)]
pub(crate) use external::{build_launch_command, get_announcement_regex};

use crate::client::AspClient;
use crate::error::launch::LaunchError;

use common::SecretKey;

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::future::Future;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, info, trace};
use tokio::time::sleep as TokioSleep;

/// Lifecycle contract shared by every launcher strategy.
pub trait ServerLauncher: Send {
    /// Start a server on `port` using the configured startup timeout.
    fn launch(&mut self, port: u16) -> impl Future<Output = Result<SecretKey, LaunchError>> + Send;

    /// Start a server on `port`, failing if it is not confirmed listening
    /// within `timeout_secs` whole seconds.
    fn launch_with_timeout(
        &mut self,
        port: u16,
        timeout_secs: u64,
    ) -> impl Future<Output = Result<SecretKey, LaunchError>> + Send;

    /// Stop the server if one is running. Idempotent.
    fn stop_server(&mut self) -> impl Future<Output = ()> + Send;

    fn state(&self) -> LauncherState;

    /// Port the running server listens on, if any.
    fn port(&self) -> Option<u16>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LauncherState {
    #[default]
    NotStarted,
    Starting,
    Listening,
    Stopped,
}

impl LauncherState {
    /// Launching is allowed before the first launch and after a stop or failure.
    pub fn can_launch(self) -> bool {
        matches!(self, LauncherState::NotStarted | LauncherState::Stopped)
    }
}

impl Display for LauncherState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            LauncherState::NotStarted => "not started",
            LauncherState::Starting => "starting",
            LauncherState::Listening => "listening",
            LauncherState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Ping `client` with exponential backoff until it answers or `max_elapsed` passes.
pub(crate) async fn wait_until_alive(client: &AspClient, max_elapsed: Duration) -> bool {
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(25),
        max_interval: Duration::from_millis(500),
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    debug!("Waiting for server on port {} to answer pings", client.port());

    loop {
        if client.is_server_alive(None).await {
            info!("Server on port {} is alive", client.port());
            return true;
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Server not ready, retrying after {duration:?}");
                TokioSleep(duration).await;
            }
            None => return false,
        }
    }
}
