//! Shared building blocks for the ASP workspace.
//!
//! This crate holds the pieces both the library (`asp-core`) and the server
//! executable (`asp-server`) need without pulling in networking:
//!
//! - [`ErrorLocation`]: call-site capture used by every error enum
//! - [`SecretKey`]: the per-instance authentication secret

pub mod error;
pub mod secret_key;

#[cfg(test)]
mod tests;

pub use error::error_location::ErrorLocation;
pub use error::secret_key::SecretKeyError;
pub use secret_key::SecretKey;
