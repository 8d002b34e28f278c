//! Wire messages exchanged between client and server.
//!
//! Each connection carries exactly one [`AspRequest`] (client → server) and one
//! [`AspResponse`] (server → client), both as binary WebSocket frames. The
//! messages are plain prost structs so the schema lives next to the code that
//! uses it:
//!
//! ```text
//! message AspRequest {
//!   string secret_key = 1;
//!   oneof payload {
//!     AspPingRequest    ping    = 2;
//!     AspConvertRequest convert = 3;
//!     AspCancelRequest  cancel  = 4;
//!     AspStopRequest    stop    = 5;
//!   }
//! }
//! message AspResponse {
//!   oneof payload {
//!     AspPingResponse alive = 1;
//!     AspJobResponse  job   = 2;
//!   }
//! }
//! ```

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspRequest {
    #[prost(string, tag = "1")]
    pub secret_key: String,
    #[prost(oneof = "asp_request::Payload", tags = "2, 3, 4, 5")]
    pub payload: Option<asp_request::Payload>,
}

pub mod asp_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        Ping(super::AspPingRequest),
        #[prost(message, tag = "3")]
        Convert(super::AspConvertRequest),
        #[prost(message, tag = "4")]
        Cancel(super::AspCancelRequest),
        #[prost(message, tag = "5")]
        Stop(super::AspStopRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspPingRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspConvertRequest {
    /// Client-assigned so a Cancel on another connection can reference it.
    #[prost(string, tag = "1")]
    pub job_id: String,
    #[prost(string, tag = "2")]
    pub source_path: String,
    #[prost(map = "string, string", tag = "3")]
    pub options: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspCancelRequest {
    /// Empty targets the most recently started job.
    #[prost(string, tag = "1")]
    pub job_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspStopRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspResponse {
    #[prost(oneof = "asp_response::Payload", tags = "1, 2")]
    pub payload: Option<asp_response::Payload>,
}

pub mod asp_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Alive(super::AspPingResponse),
        #[prost(message, tag = "2")]
        Job(super::AspJobResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspPingResponse {
    #[prost(bool, tag = "1")]
    pub alive: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AspJobResponse {
    #[prost(bool, tag = "1")]
    pub failed: bool,
    #[prost(string, optional, tag = "2")]
    pub result_file_path: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub error_message: Option<String>,
    #[prost(string, tag = "4")]
    pub job_id: String,
}

impl AspRequest {
    pub fn new(secret_key: &common::SecretKey, payload: asp_request::Payload) -> Self {
        Self {
            secret_key: secret_key.as_str().to_string(),
            payload: Some(payload),
        }
    }

    /// Short name of the payload kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            Some(asp_request::Payload::Ping(_)) => "ping",
            Some(asp_request::Payload::Convert(_)) => "convert",
            Some(asp_request::Payload::Cancel(_)) => "cancel",
            Some(asp_request::Payload::Stop(_)) => "stop",
            None => "empty",
        }
    }
}

impl AspResponse {
    pub fn alive(alive: bool) -> Self {
        Self {
            payload: Some(asp_response::Payload::Alive(AspPingResponse { alive })),
        }
    }

    pub fn job(job: AspJobResponse) -> Self {
        Self {
            payload: Some(asp_response::Payload::Job(job)),
        }
    }
}

impl AspJobResponse {
    pub fn succeeded(job_id: impl Into<String>, result_file_path: impl Into<String>) -> Self {
        Self {
            failed: false,
            result_file_path: Some(result_file_path.into()),
            error_message: None,
            job_id: job_id.into(),
        }
    }

    pub fn failure(job_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            failed: true,
            result_file_path: None,
            error_message: Some(error_message.into()),
            job_id: job_id.into(),
        }
    }

    /// Positive acknowledgement carrying neither a path nor a message.
    pub fn acknowledged(job_id: impl Into<String>) -> Self {
        Self {
            failed: false,
            result_file_path: None,
            error_message: None,
            job_id: job_id.into(),
        }
    }
}
