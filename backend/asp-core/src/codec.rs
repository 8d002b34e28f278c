//! Binary protobuf frames over a WebSocket stream.
//!
//! Shared by the server connection handler and the client, so both sides agree
//! on framing: one prost message per binary frame, pings/pongs skipped, text
//! frames rejected.

use crate::error::protocol::ProtocolError;

use common::ErrorLocation;

use std::panic::Location;

use futures_util::{SinkExt, StreamExt};
use log::trace;
use prost::Message as ProstMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

pub(crate) async fn send_message<S, M>(
    ws: &mut WebSocketStream<S>,
    message: &M,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: ProstMessage,
{
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;

    ws.send(Message::Binary(buf.into()))
        .await
        .map_err(|e| ProtocolError::Send {
            message: format!("Failed to send frame: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

pub(crate) async fn receive_message<S, M>(ws: &mut WebSocketStream<S>) -> Result<M, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: ProstMessage + Default,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => return Ok(M::decode(&data[..])?),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                trace!("Skipping control frame");
            }
            Some(Ok(Message::Text(_))) => {
                return Err(ProtocolError::UnexpectedMessage {
                    message: "Received text frame, expected binary protobuf".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            Some(Ok(Message::Close(frame))) => {
                return Err(ProtocolError::Closed {
                    message: format!("Peer closed connection: {frame:?}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            Some(Err(e)) => {
                return Err(ProtocolError::Read {
                    message: format!("Failed to read frame: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            None => {
                return Err(ProtocolError::Closed {
                    message: "Connection closed before a frame arrived".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
}
