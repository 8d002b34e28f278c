//! Server Core: the authenticated, one-request-per-connection listener.
//!
//! - Binds `127.0.0.1:<port>` by default and drops non-loopback peers
//! - Reads one protobuf [`AspRequest`](crate::proto::AspRequest) per WebSocket connection
//! - Compares the presented key against the instance's [`SecretKey`](common::SecretKey)
//!   before anything else happens
//! - Runs each conversion on a blocking worker so Ping and Cancel stay
//!   responsive while a job is in flight

mod handle;
pub(crate) mod jobs;
mod listener;

pub use handle::ServerHandle;
pub use listener::start_server;

/// Error message for any request carrying the wrong key.
pub const AUTHENTICATION_FAILED_MESSAGE: &str = "Authentication failed: invalid secret key";
