use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Transport and framing failures between client and server.
///
/// These never cross the public client API: `is_server_alive` folds them into
/// `false` and `convert_file` into a failed `Response`.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
    #[error("Connect Error: {message} {location}")]
    Connect {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handshake Error: {message} {location}")]
    Handshake {
        message: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },

    #[error("Read Error: {message} {location}")]
    Read {
        message: String,
        location: ErrorLocation,
    },

    #[error("Connection Closed Error: {message} {location}")]
    Closed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Unexpected Message Error: {message} {location}")]
    UnexpectedMessage {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Decode Error: {message} {location}")]
    ProtobufDecode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Encode Error: {message} {location}")]
    ProtobufEncode {
        message: String,
        location: ErrorLocation,
    },
}

impl From<prost::DecodeError> for ProtocolError {
    #[track_caller]
    fn from(error: prost::DecodeError) -> Self {
        ProtocolError::ProtobufDecode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<prost::EncodeError> for ProtocolError {
    #[track_caller]
    fn from(error: prost::EncodeError) -> Self {
        ProtocolError::ProtobufEncode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
