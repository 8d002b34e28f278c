use crate::client::AspClient;
use crate::config::AspConfig;
use crate::engine::{AsciidoctorEngine, ConversionEngine};
use crate::error::launch::LaunchError;
use crate::launcher::{LauncherState, ServerLauncher, wait_until_alive};
use crate::server::{ServerHandle, start_server};

use common::SecretKey;

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

/// Runs the Server Core inside the caller's process.
///
/// `launch` returns once the socket is bound and a ping with the new key has
/// been answered, so bind conflicts surface synchronously as
/// [`LaunchError::PortInUse`].
pub struct EmbeddedServerLauncher {
    config: AspConfig,
    engine: Arc<dyn ConversionEngine>,
    state: LauncherState,
    handle: Option<ServerHandle>,
}

impl Default for EmbeddedServerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedServerLauncher {
    /// Launcher backed by the asciidoctor command-line engine.
    pub fn new() -> Self {
        let config = AspConfig::default();
        let engine = Arc::new(AsciidoctorEngine::new(config.engine.clone()));
        Self {
            config,
            engine,
            state: LauncherState::NotStarted,
            handle: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn ConversionEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Replace the settings. The engine is left as is.
    pub fn with_config(mut self, config: AspConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle of the running server, for job inspection.
    pub fn handle(&self) -> Option<&ServerHandle> {
        self.handle.as_ref()
    }

    async fn start(&mut self, port: u16, timeout_secs: u64) -> Result<SecretKey, LaunchError> {
        if !self.state.can_launch() {
            return Err(LaunchError::already_launched(self.state.to_string()));
        }
        self.state = LauncherState::Starting;

        match self.try_start(port, timeout_secs).await {
            Ok((secret_key, handle)) => {
                info!("Embedded server listening on {}", handle.local_addr());
                self.handle = Some(handle);
                self.state = LauncherState::Listening;
                Ok(secret_key)
            }
            Err(e) => {
                warn!("Embedded launch on port {port} failed: {e}");
                self.state = LauncherState::Stopped;
                Err(e)
            }
        }
    }

    async fn try_start(
        &self,
        port: u16,
        timeout_secs: u64,
    ) -> Result<(SecretKey, ServerHandle), LaunchError> {
        let secret_key = SecretKey::generate();
        let mut handle = start_server(
            &self.config.server,
            port,
            secret_key.clone(),
            Arc::clone(&self.engine),
        )
        .await?;

        let client = AspClient::new(secret_key.clone())
            .with_settings(self.config.client.clone())
            .with_port(handle.port());

        if !wait_until_alive(&client, Duration::from_secs(timeout_secs)).await {
            handle.shutdown().await;
            return Err(LaunchError::timeout(timeout_secs));
        }

        Ok((secret_key, handle))
    }
}

impl ServerLauncher for EmbeddedServerLauncher {
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

    async fn stop_server(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            info!("Stopping embedded server on {}", handle.local_addr());
            handle.shutdown().await;
        }
        if self.state != LauncherState::NotStarted {
            self.state = LauncherState::Stopped;
        }
    }

    fn state(&self) -> LauncherState {
        self.state
    }

    fn port(&self) -> Option<u16> {
        self.handle.as_ref().map(ServerHandle::port)
    }
}
