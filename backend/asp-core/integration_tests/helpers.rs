//! Test helpers for Server Core integration tests.
//!
//! This module provides:
//! - Engines with predictable behavior (instant, slow, failing, ignoring cancellation)
//! - Source file fixtures
//! - A launch helper returning a running embedded server and its client

use asp_core::client::AspClient;
use asp_core::config::AspConfig;
use asp_core::engine::{CancellationFlag, ConversionEngine, ConversionRequest};
use asp_core::error::engine::EngineError;
use asp_core::launcher::{EmbeddedServerLauncher, ServerLauncher};

use common::SecretKey;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Engine that writes a small artifact immediately and counts its invocations.
#[derive(Debug, Default)]
pub struct FakeEngine {
    calls: AtomicUsize,
}

impl FakeEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConversionEngine for FakeEngine {
    fn convert(
        &self,
        request: &ConversionRequest,
        _cancellation: &CancellationFlag,
    ) -> Result<PathBuf, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        write_artifact(request)
    }
}

/// Engine that takes `duration` unless canceled, polling the flag every 10ms.
#[derive(Debug)]
pub struct SlowEngine {
    pub duration: Duration,
}

impl ConversionEngine for SlowEngine {
    fn convert(
        &self,
        request: &ConversionRequest,
        cancellation: &CancellationFlag,
    ) -> Result<PathBuf, EngineError> {
        let started = Instant::now();
        while started.elapsed() < self.duration {
            if cancellation.is_cancelled() {
                return Err(EngineError::canceled(&request.job_id));
            }
            thread::sleep(Duration::from_millis(10));
        }
        write_artifact(request)
    }
}

/// Engine that never looks at its cancellation flag.
#[derive(Debug)]
pub struct StubbornEngine {
    pub duration: Duration,
}

impl ConversionEngine for StubbornEngine {
    fn convert(
        &self,
        request: &ConversionRequest,
        _cancellation: &CancellationFlag,
    ) -> Result<PathBuf, EngineError> {
        thread::sleep(self.duration);
        write_artifact(request)
    }
}

/// Engine that always fails with `message`.
#[derive(Debug)]
pub struct FailingEngine {
    pub message: &'static str,
}

impl ConversionEngine for FailingEngine {
    fn convert(
        &self,
        _request: &ConversionRequest,
        _cancellation: &CancellationFlag,
    ) -> Result<PathBuf, EngineError> {
        Err(EngineError::failed(self.message))
    }
}

fn write_artifact(request: &ConversionRequest) -> Result<PathBuf, EngineError> {
    let output = request.output_path(None);
    fs::write(&output, format!("converted {}", request.source.display()))
        .map_err(|e| EngineError::failed(format!("fake engine could not write: {e}")))?;
    Ok(output)
}

/// Write a minimal AsciiDoc document into `dir`.
pub fn create_simple_adoc_file(dir: &Path) -> PathBuf {
    let path = dir.join("simple.adoc");
    fs::write(&path, "= Simple Document\n\nHello, *world*.\n").expect("Failed to write source");
    path
}

/// Launch an embedded server on `port` backed by `engine`.
pub async fn launch_embedded(
    port: u16,
    engine: Arc<dyn ConversionEngine>,
) -> (EmbeddedServerLauncher, SecretKey, AspClient) {
    launch_embedded_with_config(port, engine, AspConfig::default()).await
}

pub async fn launch_embedded_with_config(
    port: u16,
    engine: Arc<dyn ConversionEngine>,
    config: AspConfig,
) -> (EmbeddedServerLauncher, SecretKey, AspClient) {
    let mut launcher = EmbeddedServerLauncher::new()
        .with_config(config.clone())
        .with_engine(engine);
    let key = launcher
        .launch(port)
        .await
        .expect("Failed to launch embedded server");
    let client = AspClient::new(key.clone())
        .with_settings(config.client)
        .with_port(port);
    (launcher, key, client)
}
