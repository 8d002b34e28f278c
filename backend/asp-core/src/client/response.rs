use crate::CANCELED_MARKER;
use crate::proto::AspJobResponse;

use std::path::{Path, PathBuf};

const MISSING_ERROR_MESSAGE: &str = "Server reported a failure without a message";

/// Outcome of a Convert, Cancel or Stop call.
///
/// `failed()` is true iff authentication failed, the engine reported an
/// error, the transport broke, or the job was canceled. A failed response
/// always has an error message and never a result path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    failed: bool,
    result_file_path: Option<PathBuf>,
    error_message: Option<String>,
    job_id: Option<String>,
}

impl Response {
    pub fn success(result_file_path: impl Into<PathBuf>) -> Self {
        Self {
            failed: false,
            result_file_path: Some(result_file_path.into()),
            error_message: None,
            job_id: None,
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            failed: true,
            result_file_path: None,
            error_message: Some(error_message.into()),
            job_id: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        self.job_id = (!job_id.is_empty()).then_some(job_id);
        self
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn result_file_path(&self) -> Option<&Path> {
        self.result_file_path.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// True for failures caused by cancellation rather than an error.
    pub fn is_canceled(&self) -> bool {
        self.failed
            && self
                .error_message
                .as_deref()
                .is_some_and(|message| message.contains(CANCELED_MARKER))
    }
}

impl From<AspJobResponse> for Response {
    fn from(job: AspJobResponse) -> Self {
        let response = if job.failed {
            Response::failure(
                job.error_message
                    .unwrap_or_else(|| MISSING_ERROR_MESSAGE.to_string()),
            )
        } else {
            Response {
                failed: false,
                result_file_path: job.result_file_path.map(PathBuf::from),
                error_message: None,
                job_id: None,
            }
        };

        response.with_job_id(job.job_id)
    }
}
