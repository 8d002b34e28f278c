//! Handle to a running Server Core.

use crate::server::listener::ServerContext;

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, warn};
use tokio::task::JoinHandle;

/// Handle returned by [`start_server`](crate::server::start_server).
///
/// Owns the accept-loop task. Dropping the handle requests shutdown; call
/// [`shutdown`](Self::shutdown) to also wait for the socket to be released.
pub struct ServerHandle {
    local_addr: SocketAddr,
    context: Arc<ServerContext>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        context: Arc<ServerContext>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            local_addr,
            context,
            task: Some(task),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Number of conversions currently in flight.
    pub async fn active_jobs(&self) -> usize {
        self.context.jobs.active_count().await
    }

    /// True once shutdown was requested locally or by a Stop request.
    pub fn is_stopping(&self) -> bool {
        *self.context.shutdown.borrow()
    }

    /// Ask the accept loop to stop without waiting for it.
    pub fn request_shutdown(&self) {
        self.context.shutdown.send_replace(true);
    }

    /// Stop accepting, cancel active jobs and wait until the socket is closed.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.request_shutdown();
        self.wait().await;
    }

    /// Wait until the accept loop exits (after `shutdown` or a Stop request).
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let joined = task.await;
            self.task = None;
            match joined {
                Ok(()) => debug!("Accept loop on {} joined", self.local_addr),
                Err(e) => warn!("Accept loop on {} ended abnormally: {e}", self.local_addr),
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.request_shutdown();
    }
}
