use asp_core::error::config::ConfigError;
use asp_core::error::launch::LaunchError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

/// Errors that end the server process.
#[derive(Debug, ThisError)]
pub enum AspServerError {
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}
