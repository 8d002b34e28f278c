pub mod config;
pub mod engine;
pub mod launch;
pub mod protocol;

pub use config::ConfigError;
pub use engine::EngineError;
pub use launch::LaunchError;
pub use protocol::ProtocolError;
