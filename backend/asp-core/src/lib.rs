pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod proto;
pub mod server;

mod codec;
#[cfg(test)]
mod tests;

pub const ASP_SERVER_BINARY: &str = "asp-server";
pub const ASP_SERVER_HOSTNAME: &str = "127.0.0.1";
pub const ASP_WEBSOCKET_SCHEME: &str = "ws://";
pub const DEFAULT_PORT: u16 = 4447;

/// Prefix of the stdout line a server executable prints once it is listening.
pub const SECRET_KEY_ANNOUNCEMENT_MARKER: &str = "secret-key: ";
pub const SECRET_KEY_ANNOUNCEMENT_PATTERN: &str =
    const_format::concatcp!(SECRET_KEY_ANNOUNCEMENT_MARKER, r"(?P<key>[A-Za-z0-9_\-]+)");

/// Every canceled conversion carries this word in its error message.
pub const CANCELED_MARKER: &str = "canceled";

/// Format the line a server executable prints to announce its key.
pub fn secret_key_announcement(host: &str, port: u16, key: &common::SecretKey) -> String {
    format!(
        "ASP server listening on {host}:{port} {SECRET_KEY_ANNOUNCEMENT_MARKER}{}",
        key.as_str()
    )
}
