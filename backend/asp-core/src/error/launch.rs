//! Errors surfaced by `launch` on either launcher strategy.
//!
//! A `LaunchError` is confined to the launch call itself: the launcher has
//! already reverted to `Stopped` (and killed any half-started child) by the
//! time the caller sees it.

use common::ErrorLocation;

use std::error::Error as StdError;
use std::io::Error as IoError;
use std::io::ErrorKind;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum LaunchError {
    #[error("Port In Use Error: port {port} is already bound {location}")]
    PortInUse {
        port: u16,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Bind Error: failed to bind {address}: {source} {location}")]
    Bind {
        address: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Already Launched Error: launcher is {state} {location}")]
    AlreadyLaunched {
        state: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: server not listening within {timeout_secs}s {location}")]
    Timeout {
        timeout_secs: u64,
        location: ErrorLocation,
    },

    #[error("Spawn Error: {message} {location}")]
    Spawn {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Parse Error: {message} {location}")]
    Parse {
        message: String,
        location: ErrorLocation,
    },

    #[error("Child Exited Error: {message} {location}")]
    ChildExited {
        message: String,
        location: ErrorLocation,
    },
}

impl LaunchError {
    /// Classify a bind failure, separating port conflicts from everything else.
    #[track_caller]
    pub fn from_bind(address: impl Into<String>, port: u16, error: IoError) -> Self {
        if error.kind() == ErrorKind::AddrInUse {
            LaunchError::PortInUse {
                port,
                location: ErrorLocation::from(Location::caller()),
                source: error,
            }
        } else {
            LaunchError::Bind {
                address: address.into(),
                location: ErrorLocation::from(Location::caller()),
                source: error,
            }
        }
    }

    #[track_caller]
    pub fn already_launched(state: impl Into<String>) -> Self {
        LaunchError::AlreadyLaunched {
            state: state.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn timeout(timeout_secs: u64) -> Self {
        LaunchError::Timeout {
            timeout_secs,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// True when the launch failed because another socket owns the port.
    pub fn is_port_conflict(&self) -> bool {
        matches!(self, LaunchError::PortInUse { .. })
    }
}
