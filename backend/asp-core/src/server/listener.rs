//! Accept loop, connection handling and request dispatch.

use crate::codec::{receive_message, send_message};
use crate::config::ServerSettings;
use crate::engine::{ConversionEngine, ConversionRequest};
use crate::error::engine::EngineError;
use crate::error::launch::LaunchError;
use crate::error::protocol::ProtocolError;
use crate::proto::asp_request::Payload;
use crate::proto::{AspCancelRequest, AspConvertRequest, AspJobResponse, AspRequest, AspResponse};
use crate::server::AUTHENTICATION_FAILED_MESSAGE;
use crate::server::handle::ServerHandle;
use crate::server::jobs::JobRegistry;
use crate::CANCELED_MARKER;

use common::{ErrorLocation, SecretKey};

use std::io::{Error as IoError, ErrorKind};
use std::net::{IpAddr, SocketAddr};
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::watch;
use tokio::task::{JoinError, spawn_blocking};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;

/// State shared by the accept loop and every connection handler.
pub(crate) struct ServerContext {
    pub(crate) secret_key: SecretKey,
    pub(crate) engine: Arc<dyn ConversionEngine>,
    pub(crate) jobs: JobRegistry,
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) cancel_grace_period: Duration,
    pub(crate) request_read_timeout: Duration,
}

/// Bind the listening socket and start serving requests in the background.
///
/// Returns only once the socket is bound, so bind failures surface here and
/// never as a half-started server.
///
/// # Errors
///
/// - [`LaunchError::PortInUse`] if another socket owns `host:port`
/// - [`LaunchError::Bind`] for any other bind failure (bad host, permissions)
///
/// # Security
///
/// - Binds to `settings.host` (`127.0.0.1` unless configured otherwise)
/// - Drops connections from non-loopback peers without answering
/// - Authenticates every request against `secret_key`
pub async fn start_server(
    settings: &ServerSettings,
    port: u16,
    secret_key: SecretKey,
    engine: Arc<dyn ConversionEngine>,
) -> Result<ServerHandle, LaunchError> {
    let ip: IpAddr = settings.host.parse().map_err(|e| {
        LaunchError::from_bind(
            settings.host.clone(),
            port,
            IoError::new(ErrorKind::InvalidInput, format!("invalid host: {e}")),
        )
    })?;
    let address = SocketAddr::new(ip, port);

    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| LaunchError::from_bind(address.to_string(), port, e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| LaunchError::from_bind(address.to_string(), port, e))?;

    info!("ASP server listening on {local_addr}");

    let (shutdown, _) = watch::channel(false);
    let context = Arc::new(ServerContext {
        secret_key,
        engine,
        jobs: JobRegistry::default(),
        shutdown,
        cancel_grace_period: settings.cancel_grace_period(),
        request_read_timeout: settings.request_read_timeout(),
    });

    let task = TokioSpawn(accept_loop(listener, Arc::clone(&context)));

    Ok(ServerHandle::new(local_addr, context, task))
}

async fn accept_loop(listener: TcpListener, context: Arc<ServerContext>) {
    let mut shutdown = context.shutdown.subscribe();
    let local_addr = listener.local_addr().ok();

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("Client connecting from {addr}");
                    let context = Arc::clone(&context);
                    TokioSpawn(async move {
                        if let Err(e) = handle_connection(stream, addr, context).await {
                            debug!("Connection from {addr} ended with error: {e}");
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {e}"),
            }
        }
    }

    drop(listener);
    let canceled = context.jobs.cancel_all().await;
    info!("ASP server on {local_addr:?} stopped ({canceled} active jobs canceled)");
}

/// Handles a single connection: one request in, one response out.
///
/// Undecodable requests get a failed response; transport failures are
/// returned to the accept loop, which only logs them.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    context: Arc<ServerContext>,
) -> Result<(), ProtocolError> {
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback connection from {addr}");
        return Ok(());
    }

    let deadline = context.request_read_timeout;

    let mut ws = timeout(deadline, accept_async(stream))
        .await
        .map_err(|_| ProtocolError::Timeout {
            message: format!("No WebSocket handshake from {addr} within {deadline:?}"),
            location: ErrorLocation::from(Location::caller()),
        })?
        .map_err(|e| ProtocolError::Handshake {
            message: format!("WebSocket handshake failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let received = timeout(deadline, receive_message::<_, AspRequest>(&mut ws))
        .await
        .map_err(|_| ProtocolError::Timeout {
            message: format!("No request from {addr} within {deadline:?}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let response = match received {
        Ok(request) => dispatch(request, &context).await,
        Err(ProtocolError::ProtobufDecode { message, .. }) => {
            warn!("Client {addr} sent an undecodable request: {message}");
            AspResponse::job(AspJobResponse::failure(
                String::new(),
                format!("Invalid request: {message}"),
            ))
        }
        Err(e) => return Err(e),
    };

    send_message(&mut ws, &response).await?;
    let _ = ws.close(None).await;
    Ok(())
}

/// Authenticate, then route by request kind.
///
/// Authentication failures never reach the engine: Ping answers `false`,
/// everything else a failed job response.
async fn dispatch(request: AspRequest, context: &ServerContext) -> AspResponse {
    let kind = request.kind();

    if !context.secret_key.matches(&request.secret_key) {
        warn!("Rejected {kind} request: invalid secret key");
        return match request.payload {
            Some(Payload::Ping(_)) => AspResponse::alive(false),
            Some(Payload::Convert(convert)) => AspResponse::job(AspJobResponse::failure(
                convert.job_id,
                AUTHENTICATION_FAILED_MESSAGE,
            )),
            _ => AspResponse::job(AspJobResponse::failure(
                String::new(),
                AUTHENTICATION_FAILED_MESSAGE,
            )),
        };
    }

    match request.payload {
        Some(Payload::Ping(_)) => AspResponse::alive(true),
        Some(Payload::Convert(convert)) => AspResponse::job(handle_convert(convert, context).await),
        Some(Payload::Cancel(cancel)) => AspResponse::job(handle_cancel(cancel, context).await),
        Some(Payload::Stop(_)) => {
            info!("Stop requested by client");
            context.shutdown.send_replace(true);
            AspResponse::job(AspJobResponse::acknowledged(String::new()))
        }
        None => {
            warn!("Received request with no payload");
            AspResponse::job(AspJobResponse::failure(
                String::new(),
                "Invalid request: no payload",
            ))
        }
    }
}

/// Run one conversion on a blocking worker and race it against cancellation.
///
/// Once the job's flag is set the worker gets `cancel_grace_period` to notice;
/// after that it is abandoned and the canceled response goes out anyway.
async fn handle_convert(convert: AspConvertRequest, context: &ServerContext) -> AspJobResponse {
    let job = context.jobs.register(&convert.job_id).await;
    let job_id = job.id().to_string();
    let request = ConversionRequest::new(&job_id, convert.source_path, convert.options);

    info!(
        "Job {job_id}: converting {} ({})",
        request.source.display(),
        request.backend()
    );

    let engine = Arc::clone(&context.engine);
    let cancellation = job.cancellation().clone();
    let mut worker = spawn_blocking(move || engine.convert(&request, &cancellation));

    let outcome = tokio::select! {
        joined = &mut worker => flatten(joined),
        _ = job.cancellation().cancelled() => {
            match timeout(context.cancel_grace_period, &mut worker).await {
                Ok(joined) => {
                    if let Err(e) = flatten(joined)
                        && !e.is_canceled()
                    {
                        debug!("Job {job_id}: engine failed while canceling: {e}");
                    }
                }
                Err(_) => warn!(
                    "Job {job_id}: engine ignored cancellation for {:?}, abandoning worker",
                    context.cancel_grace_period
                ),
            }
            Err(EngineError::canceled(&job_id))
        }
    };

    context.jobs.remove(&job).await;

    match outcome {
        Ok(path) => {
            info!("Job {job_id}: finished in {:?}", job.elapsed());
            AspJobResponse::succeeded(&job_id, path.to_string_lossy())
        }
        Err(e) if e.is_canceled() => {
            info!("Job {job_id}: {CANCELED_MARKER}");
            AspJobResponse::failure(&job_id, canceled_message(&job_id))
        }
        Err(e) => {
            error!("Job {job_id}: {e}");
            AspJobResponse::failure(&job_id, e.to_string())
        }
    }
}

async fn handle_cancel(cancel: AspCancelRequest, context: &ServerContext) -> AspJobResponse {
    let target = Some(cancel.job_id.as_str()).filter(|id| !id.is_empty());

    match context.jobs.cancel(target).await {
        Some(job_id) => {
            info!("Job {job_id}: cancellation requested");
            AspJobResponse::acknowledged(job_id)
        }
        None => {
            debug!("Cancel for unknown job '{}' ignored", cancel.job_id);
            AspJobResponse::acknowledged(cancel.job_id)
        }
    }
}

#[track_caller]
fn flatten(joined: Result<Result<PathBuf, EngineError>, JoinError>) -> Result<PathBuf, EngineError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => Err(EngineError::Panicked {
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

pub(crate) fn canceled_message(job_id: &str) -> String {
    format!("Conversion {CANCELED_MARKER}: job {job_id} was {CANCELED_MARKER}")
}
