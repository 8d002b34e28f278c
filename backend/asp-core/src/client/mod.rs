//! Client side of the protocol.
//!
//! Every call opens a fresh connection, sends one request carrying the secret
//! key and waits for one response. Nothing here returns a transport error to
//! the caller: liveness folds failures into `false`, everything else into a
//! failed [`Response`].

mod monitor;
mod response;

pub use monitor::{DefaultProgressMonitor, ProgressMonitor};
pub use response::Response;

use crate::codec::{receive_message, send_message};
use crate::config::ClientSettings;
use crate::error::protocol::ProtocolError;
use crate::proto::asp_request::Payload;
use crate::proto::{
    AspCancelRequest, AspConvertRequest, AspPingRequest, AspRequest, AspResponse, AspStopRequest,
    asp_response,
};
use crate::{ASP_WEBSOCKET_SCHEME, CANCELED_MARKER, DEFAULT_PORT};

use common::{ErrorLocation, SecretKey};

use std::collections::HashMap;
use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_tungstenite::connect_async;
use uuid::Uuid;

/// Authenticated client for one server instance.
#[derive(Debug, Clone)]
pub struct AspClient {
    secret_key: SecretKey,
    port: u16,
    settings: ClientSettings,
}

impl AspClient {
    /// Client for `127.0.0.1:4447` using `secret_key`.
    pub fn new(secret_key: SecretKey) -> Self {
        Self {
            secret_key,
            port: DEFAULT_PORT,
            settings: ClientSettings::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    pub fn with_settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.settings.host
    }

    /// Tell whether a correctly keyed server answers right now.
    ///
    /// Connection failures, timeouts and key mismatches all yield `false`.
    /// An already canceled monitor short-circuits to `false`.
    pub async fn is_server_alive(&self, monitor: Option<&dyn ProgressMonitor>) -> bool {
        if monitor.is_some_and(|m| m.is_canceled()) {
            return false;
        }

        let request = AspRequest::new(&self.secret_key, Payload::Ping(AspPingRequest {}));

        match timeout(self.settings.ping_timeout(), self.call(&request)).await {
            Ok(Ok(AspResponse {
                payload: Some(asp_response::Payload::Alive(ping)),
            })) => ping.alive,
            Ok(Ok(_)) => {
                debug!("Ping to port {} got a non-ping response", self.port);
                false
            }
            Ok(Err(e)) => {
                debug!("Ping to port {} failed: {e}", self.port);
                false
            }
            Err(_) => {
                debug!(
                    "Ping to port {} timed out after {:?}",
                    self.port,
                    self.settings.ping_timeout()
                );
                false
            }
        }
    }

    /// Convert `source` on the server.
    ///
    /// With a monitor, a watcher polls it while the call is outstanding. Once
    /// it reports cancellation the watcher sends a Cancel for this job and
    /// the call returns a failed, canceled response without waiting for the
    /// server to finish.
    pub async fn convert_file(
        &self,
        source: &Path,
        options: &HashMap<String, String>,
        monitor: Option<&dyn ProgressMonitor>,
    ) -> Response {
        let job_id = Uuid::new_v4().to_string();
        let request = AspRequest::new(
            &self.secret_key,
            Payload::Convert(AspConvertRequest {
                job_id: job_id.clone(),
                source_path: source.to_string_lossy().into_owned(),
                options: options.clone(),
            }),
        );

        let Some(monitor) = monitor else {
            return self.job_call(&request).await;
        };

        if monitor.is_canceled() {
            return canceled_response(&job_id);
        }
        monitor.set_progress(0);

        tokio::select! {
            response = self.job_call(&request) => {
                if !response.failed() {
                    monitor.set_progress(100);
                }
                response
            }
            _ = wait_for_cancellation(monitor, self.settings.monitor_poll_interval()) => {
                info!("Job {job_id}: canceled by caller, notifying server");
                match timeout(self.settings.cancel_ack_timeout(), self.cancel_job(&job_id)).await {
                    Ok(ack) if ack.failed() => warn!(
                        "Job {job_id}: server rejected cancel: {}",
                        ack.error_message().unwrap_or_default()
                    ),
                    Ok(_) => debug!("Job {job_id}: cancel acknowledged"),
                    Err(_) => warn!("Job {job_id}: cancel not acknowledged in time"),
                }
                canceled_response(&job_id)
            }
        }
    }

    /// Ask the server to cancel `job_id`. Unknown jobs are acknowledged as a no-op.
    pub async fn cancel_job(&self, job_id: &str) -> Response {
        let request = AspRequest::new(
            &self.secret_key,
            Payload::Cancel(AspCancelRequest {
                job_id: job_id.to_string(),
            }),
        );
        self.job_call(&request).await
    }

    /// Ask the server to stop listening.
    pub async fn stop_server(&self) -> Response {
        let request = AspRequest::new(&self.secret_key, Payload::Stop(AspStopRequest {}));
        self.job_call(&request).await
    }

    async fn job_call(&self, request: &AspRequest) -> Response {
        match self.call(request).await {
            Ok(AspResponse {
                payload: Some(asp_response::Payload::Job(job)),
            }) => Response::from(job),
            Ok(_) => Response::failure("Protocol error: server answered with an unexpected message"),
            Err(e) => {
                debug!("{} request to port {} failed: {e}", request.kind(), self.port);
                Response::failure(format!("Transport failure: {e}"))
            }
        }
    }

    async fn call(&self, request: &AspRequest) -> Result<AspResponse, ProtocolError> {
        let url = self.url();

        let (mut ws, _) = timeout(self.settings.connect_timeout(), connect_async(url.as_str()))
            .await
            .map_err(|_| ProtocolError::Timeout {
                message: format!(
                    "Connecting to {url} took longer than {:?}",
                    self.settings.connect_timeout()
                ),
                location: ErrorLocation::from(Location::caller()),
            })?
            .map_err(|e| ProtocolError::Connect {
                message: format!("Failed to connect to {url}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        send_message(&mut ws, request).await?;
        let response = receive_message(&mut ws).await?;
        let _ = ws.close(None).await;

        Ok(response)
    }

    fn url(&self) -> String {
        let host = &self.settings.host;
        if host.contains(':') {
            format!("{ASP_WEBSOCKET_SCHEME}[{host}]:{}", self.port)
        } else {
            format!("{ASP_WEBSOCKET_SCHEME}{host}:{}", self.port)
        }
    }
}

async fn wait_for_cancellation(monitor: &dyn ProgressMonitor, poll_interval: Duration) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if monitor.is_canceled() {
            return;
        }
    }
}

fn canceled_response(job_id: &str) -> Response {
    Response::failure(format!("Conversion {CANCELED_MARKER} by user")).with_job_id(job_id)
}
