use crate::client::AspClient;
use crate::config::AspConfig;
use crate::error::launch::LaunchError;
use crate::launcher::{LauncherState, ServerLauncher, wait_until_alive};
use crate::{ASP_SERVER_BINARY, SECRET_KEY_ANNOUNCEMENT_PATTERN};

use common::{ErrorLocation, SecretKey};

use std::net::{IpAddr, SocketAddr};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::net::TcpListener;
use tokio::process::{Child as TokioChild, ChildStdout, Command as TokioCommand};
use tokio::spawn as TokioSpawn;
use tokio::time::timeout;

const PORT_FLAG: &str = "--port";
const SPAWN_MAX_OUTPUT_LINES: usize = 100;
const ANNOUNCEMENT_PATTERN: &str = const_format::concatcp!(
    r"listening on \S+:(?P<port>\d+) ",
    SECRET_KEY_ANNOUNCEMENT_PATTERN
);
const CAPTURE_PORT: &str = "port";
const CAPTURE_KEY: &str = "key";
const REDACTED: &str = "[REDACTED]";

static ANNOUNCEMENT_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn get_announcement_regex() -> &'static Regex {
    ANNOUNCEMENT_REGEX
        .get_or_init(|| Regex::new(ANNOUNCEMENT_PATTERN).expect("valid regex pattern"))
}

pub(crate) fn build_launch_command(server_binary: &Path, port: u16, args: &[String]) -> TokioCommand {
    let mut cmd = TokioCommand::new(server_binary);
    cmd.arg(PORT_FLAG)
        .arg(port.to_string())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Sink for the child server's stdout/stderr lines.
///
/// The announcement line arrives with its key replaced by `[REDACTED]`.
pub trait OutputHandler: Send + Sync {
    fn output(&self, line: &str);
}

impl<F> OutputHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn output(&self, line: &str) {
        self(line)
    }
}

/// Default handler: forwards every line to `log::debug!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOutputHandler;

impl OutputHandler for LogOutputHandler {
    fn output(&self, line: &str) {
        debug!("Server output: {line}");
    }
}

struct RunningServer {
    child: TokioChild,
    port: u16,
    secret_key: SecretKey,
}

/// Runs the server executable as a child process.
///
/// The child is started as `<server-binary> --port <port> [args..]`. The key
/// is read from the announcement line the child prints once it is listening,
/// then confirmed with an authenticated ping. The child is killed if the
/// launcher is dropped while it runs.
pub struct ExternalProcessServerLauncher {
    server_binary: PathBuf,
    args: Vec<String>,
    config: AspConfig,
    output_handler: Arc<dyn OutputHandler>,
    state: LauncherState,
    running: Option<RunningServer>,
}

impl Default for ExternalProcessServerLauncher {
    /// Launcher for `asp-server` resolved through `PATH`.
    fn default() -> Self {
        Self::new(ASP_SERVER_BINARY)
    }
}

impl ExternalProcessServerLauncher {
    pub fn new(server_binary: impl Into<PathBuf>) -> Self {
        Self {
            server_binary: server_binary.into(),
            args: Vec::new(),
            config: AspConfig::default(),
            output_handler: Arc::new(LogOutputHandler),
            state: LauncherState::NotStarted,
            running: None,
        }
    }

    pub fn with_output_handler(mut self, handler: Arc<dyn OutputHandler>) -> Self {
        self.output_handler = handler;
        self
    }

    pub fn with_config(mut self, config: AspConfig) -> Self {
        self.config = config;
        self
    }

    /// Extra arguments appended after `--port <port>`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// OS process id of the running child.
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|running| running.child.id())
    }

    async fn start(&mut self, port: u16, timeout_secs: u64) -> Result<SecretKey, LaunchError> {
        if !self.state.can_launch() {
            return Err(LaunchError::already_launched(self.state.to_string()));
        }
        self.state = LauncherState::Starting;

        match self.try_start(port, timeout_secs).await {
            Ok(running) => {
                let secret_key = running.secret_key.clone();
                info!(
                    "External server listening on port {} (PID: {:?})",
                    running.port,
                    running.child.id()
                );
                self.running = Some(running);
                self.state = LauncherState::Listening;
                Ok(secret_key)
            }
            Err(e) => {
                warn!("External launch on port {port} failed: {e}");
                self.state = LauncherState::Stopped;
                Err(e)
            }
        }
    }

    async fn try_start(&self, port: u16, timeout_secs: u64) -> Result<RunningServer, LaunchError> {
        let budget = Duration::from_secs(timeout_secs);
        let started = Instant::now();

        self.probe_port(port).await?;

        let mut child = build_launch_command(&self.server_binary, port, &self.args)
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                message: format!("Failed to spawn {}: {e}", self.server_binary.display()),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            })?;
        info!(
            "Spawned {} on port {port} (PID: {:?})",
            self.server_binary.display(),
            child.id()
        );

        let announced = match timeout(budget, self.read_announcement(&mut child)).await {
            Ok(Ok(announced)) => announced,
            Ok(Err(e)) => {
                kill_child(&mut child).await;
                return Err(e);
            }
            Err(_) => {
                kill_child(&mut child).await;
                return Err(LaunchError::timeout(timeout_secs));
            }
        };
        let (announced_port, secret_key) = announced;

        let client = AspClient::new(secret_key.clone())
            .with_settings(self.config.client.clone())
            .with_port(announced_port);
        let remaining = budget.saturating_sub(started.elapsed());

        if !wait_until_alive(&client, remaining).await {
            kill_child(&mut child).await;
            return Err(LaunchError::timeout(timeout_secs));
        }

        Ok(RunningServer {
            child,
            port: announced_port,
            secret_key,
        })
    }

    /// Fail fast with `PortInUse` instead of spawning a child that cannot bind.
    async fn probe_port(&self, port: u16) -> Result<(), LaunchError> {
        if port == 0 {
            return Ok(());
        }

        let host = &self.config.server.host;
        let ip = IpAddr::from_str(host).map_err(|e| LaunchError::Parse {
            message: format!("Invalid server host '{host}': {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
        let address = SocketAddr::new(ip, port);

        let probe = TcpListener::bind(address)
            .await
            .map_err(|e| LaunchError::from_bind(address.to_string(), port, e))?;
        drop(probe);
        trace!("Port {port} is free");
        Ok(())
    }

    /// Read stdout until the announcement line, forwarding stderr throughout.
    ///
    /// After the key is found both streams keep draining into the output
    /// handler for the child's lifetime.
    async fn read_announcement(&self, child: &mut TokioChild) -> Result<(u16, SecretKey), LaunchError> {
        let stdout = child.stdout.take().ok_or_else(|| LaunchError::Parse {
            message: "Child process has no stdout".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if let Some(stderr) = child.stderr.take() {
            forward_lines(BufReader::new(stderr).lines(), Arc::clone(&self.output_handler));
        }

        let mut lines = BufReader::new(stdout).lines();
        let announced = self.scan_for_key(&mut lines).await;

        if announced.is_err() {
            let status = child.try_wait().ok().flatten();
            if let Some(status) = status {
                return Err(LaunchError::ChildExited {
                    message: format!(
                        "{} exited with {status} before announcing its key",
                        self.server_binary.display()
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        forward_lines(lines, Arc::clone(&self.output_handler));
        announced
    }

    async fn scan_for_key(
        &self,
        lines: &mut Lines<BufReader<ChildStdout>>,
    ) -> Result<(u16, SecretKey), LaunchError> {
        let re = get_announcement_regex();

        for _ in 0..SPAWN_MAX_OUTPUT_LINES {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(cap) = re.captures(&line) else {
                        self.output_handler.output(&line);
                        continue;
                    };

                    let key = cap
                        .name(CAPTURE_KEY)
                        .ok_or_else(|| LaunchError::Parse {
                            message: format!(
                                "Regex matched but missing '{CAPTURE_KEY}' capture group"
                            ),
                            location: ErrorLocation::from(Location::caller()),
                        })?
                        .as_str();
                    self.output_handler.output(&line.replace(key, REDACTED));

                    let port = cap
                        .name(CAPTURE_PORT)
                        .and_then(|m| m.as_str().parse::<u16>().ok())
                        .ok_or_else(|| LaunchError::Parse {
                            message: "Announcement carries no valid port".to_string(),
                            location: ErrorLocation::from(Location::caller()),
                        })?;

                    let secret_key = SecretKey::from_str(key).map_err(|e| LaunchError::Parse {
                        message: format!("Announced secret key is malformed: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    })?;

                    debug!("Parsed secret key announcement for port {port}");
                    return Ok((port, secret_key));
                }
                Ok(None) => {
                    return Err(LaunchError::ChildExited {
                        message: format!(
                            "{} closed stdout before announcing its key",
                            self.server_binary.display()
                        ),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
                Err(e) => {
                    return Err(LaunchError::Parse {
                        message: format!("Failed to read server output: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            }
        }

        Err(LaunchError::Parse {
            message: format!("No secret key found in first {SPAWN_MAX_OUTPUT_LINES} lines of output"),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

impl ServerLauncher for ExternalProcessServerLauncher {
    async fn launch(&mut self, port: u16) -> Result<SecretKey, LaunchError> {
        let timeout_secs = self.config.launcher.startup_timeout_secs;
        self.start(port, timeout_secs).await
    }

    async fn launch_with_timeout(
        &mut self,
        port: u16,
        timeout_secs: u64,
    ) -> Result<SecretKey, LaunchError> {
        self.start(port, timeout_secs).await
    }

    /// Send an authenticated Stop, then kill the child if it outlives the grace period.
    async fn stop_server(&mut self) {
        if let Some(mut running) = self.running.take() {
            let client = AspClient::new(running.secret_key.clone())
                .with_settings(self.config.client.clone())
                .with_port(running.port);

            let ack = client.stop_server().await;
            if ack.failed() {
                warn!(
                    "Stop request to port {} failed: {}",
                    running.port,
                    ack.error_message().unwrap_or_default()
                );
            }

            let grace = self.config.launcher.stop_grace_period();
            match timeout(grace, running.child.wait()).await {
                Ok(Ok(status)) => info!("Server on port {} exited with {status}", running.port),
                Ok(Err(e)) => {
                    warn!("Failed to wait for server on port {}: {e}", running.port);
                    kill_child(&mut running.child).await;
                }
                Err(_) => {
                    warn!(
                        "Server on port {} still running after {grace:?}, killing it",
                        running.port
                    );
                    kill_child(&mut running.child).await;
                }
            }
        }

        if self.state != LauncherState::NotStarted {
            self.state = LauncherState::Stopped;
        }
    }

    fn state(&self) -> LauncherState {
        self.state
    }

    fn port(&self) -> Option<u16> {
        self.running.as_ref().map(|running| running.port)
    }
}

fn forward_lines<R>(mut lines: Lines<BufReader<R>>, handler: Arc<dyn OutputHandler>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    TokioSpawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            handler.output(&line);
        }
    });
}

async fn kill_child(child: &mut TokioChild) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill server process (PID: {:?}): {e}", child.id());
    }
}
