use crate::config::EngineSettings;
use crate::engine::{Backend, CancellationFlag, ConversionEngine, ConversionRequest};
use crate::error::engine::EngineError;

use common::ErrorLocation;

use std::io::Read;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
#[cfg(unix)]
use std::os::unix::process::CommandExt;

use log::{debug, info, trace, warn};

const BACKEND_FLAG: &str = "-b";
const OUTPUT_FLAG: &str = "-o";
const ATTRIBUTE_FLAG: &str = "-a";
const STDERR_TAIL_BYTES: usize = 2_048;

/// Engine that shells out to the asciidoctor command-line tools.
///
/// `backend=pdf` runs the PDF converter (`asciidoctor-pdf` by default), every
/// other backend runs the main converter with `-b <backend>`. Options other than
/// `backend` become `-a key=value` document attributes.
#[derive(Debug, Clone, Default)]
pub struct AsciidoctorEngine {
    settings: EngineSettings,
}

impl AsciidoctorEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub(crate) fn build_command(&self, request: &ConversionRequest, output: &Path) -> Command {
        let backend = request.backend();

        let mut cmd = match backend {
            Backend::Pdf => Command::new(&self.settings.pdf_command),
            _ => {
                let mut cmd = Command::new(&self.settings.html_command);
                cmd.arg(BACKEND_FLAG).arg(backend.name());
                cmd
            }
        };

        for (key, value) in request.passthrough_options() {
            cmd.arg(ATTRIBUTE_FLAG).arg(format!("{key}={value}"));
        }

        cmd.arg(OUTPUT_FLAG)
            .arg(output)
            .arg(&request.source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // Own process group, so cancel reaches wrapper scripts and their children.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    fn kill_converter(child: &mut Child, job_id: &str) {
        #[cfg(unix)]
        {
            let group = Pid::from_raw(child.id() as i32);
            match killpg(group, Signal::SIGKILL) {
                Ok(()) => trace!("Sent SIGKILL to process group {group} for job {job_id}"),
                Err(nix::errno::Errno::ESRCH) => {
                    trace!("Process group {group} for job {job_id} already gone")
                }
                Err(e) => warn!("Failed to kill process group {group} for job {job_id}: {e}"),
            }
        }

        if let Err(e) = child.kill() {
            debug!("Failed to kill converter for job {job_id}: {e}");
        }
        let _ = child.wait();
    }

    fn wait_or_cancel(
        &self,
        child: &mut Child,
        request: &ConversionRequest,
        cancellation: &CancellationFlag,
    ) -> Result<ExitStatus, EngineError> {
        loop {
            if cancellation.is_cancelled() {
                info!("Job {} canceled, killing converter (PID: {})", request.job_id, child.id());
                Self::kill_converter(child, &request.job_id);
                return Err(EngineError::canceled(&request.job_id));
            }

            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    trace!("Converter for job {} still running", request.job_id);
                    thread::sleep(self.settings.poll_interval());
                }
                Err(e) => {
                    return Err(EngineError::failed(format!(
                        "Failed to wait for converter: {e}"
                    )));
                }
            }
        }
    }
}

impl ConversionEngine for AsciidoctorEngine {
    fn convert(
        &self,
        request: &ConversionRequest,
        cancellation: &CancellationFlag,
    ) -> Result<PathBuf, EngineError> {
        if !request.source.is_file() {
            return Err(EngineError::SourceMissing {
                path: request.source.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let output = request.output_path(self.settings.output_dir.as_deref());
        let mut cmd = self.build_command(request, &output);
        let program = cmd.get_program().to_string_lossy().to_string();

        debug!(
            "Job {}: converting {} with {program} ({})",
            request.job_id,
            request.source.display(),
            request.backend()
        );

        let mut child = cmd.spawn().map_err(|e| EngineError::Spawn {
            program: program.clone(),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })?;

        // Drain stderr on its own thread so a chatty converter can't fill the pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut captured = String::new();
                let _ = stderr.read_to_string(&mut captured);
                captured
            })
        });

        // On cancel the reader thread is left detached: a straggler that escaped
        // the group kill may still hold the pipe open.
        let status = self.wait_or_cancel(&mut child, request, cancellation)?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail = stderr.get(start..).unwrap_or(&stderr).trim();
            return Err(EngineError::failed(format!(
                "{program} exited with {status}: {tail}"
            )));
        }

        if !output.exists() {
            return Err(EngineError::failed(format!(
                "{program} succeeded but produced no file at {}",
                output.display()
            )));
        }

        info!("Job {}: wrote {}", request.job_id, output.display());
        Ok(output)
    }
}
