use common::ErrorLocation;

use std::error::Error as StdError;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error as ThisError;

/// Outcome of a conversion that did not produce an artifact.
///
/// `Canceled` is kept apart from every other variant so the dispatcher can
/// tell "you stopped this" from "this broke".
#[derive(Debug, ThisError)]
pub enum EngineError {
    #[error("Source Missing Error: {} does not exist {location}", path.display())]
    SourceMissing {
        path: PathBuf,
        location: ErrorLocation,
    },

    #[error("Engine Spawn Error: failed to run {program}: {source} {location}")]
    Spawn {
        program: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Conversion Error: {message} {location}")]
    Failed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Conversion canceled: job {job_id} was canceled {location}")]
    Canceled {
        job_id: String,
        location: ErrorLocation,
    },

    #[error("Engine Panic Error: {message} {location}")]
    Panicked {
        message: String,
        location: ErrorLocation,
    },
}

impl EngineError {
    #[track_caller]
    pub fn failed(message: impl Into<String>) -> Self {
        EngineError::Failed {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn canceled(job_id: impl Into<String>) -> Self {
        EngineError::Canceled {
            job_id: job_id.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, EngineError::Canceled { .. })
    }
}
