//! Frame codec for the host wire protocol.
//!
//! Frame format:
//! ```text
//! ┌──────────┬──────────┬────────────────────────┐
//! │ len (4B) │ type(1B) │   JSON payload         │
//! │ u32 BE   │ u8       │                        │
//! └──────────┴──────────┴────────────────────────┘
//! ```
//! Length = sizeof(type byte) + sizeof(payload), NOT including the 4-byte prefix.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::messages::{
    Event, EventResult, ExtensionMessage, HostMessage, IntentReply, IntentRequest, LogMessage,
    ProtocolError,
};
use crate::types::{Error, Result};

/// Message type: event (host → extension).
pub const MSG_EVENT: u8 = 0x01;
/// Message type: intent request (extension → host).
pub const MSG_INTENT_REQUEST: u8 = 0x02;
/// Message type: intent reply (host → extension).
pub const MSG_INTENT_REPLY: u8 = 0x03;
/// Message type: result of an event carrying an id (extension → host).
pub const MSG_EVENT_RESULT: u8 = 0x04;
/// Message type: log line (extension → host).
pub const MSG_LOG: u8 = 0x05;
/// Message type: notification (extension → host).
pub const MSG_NOTIFICATION: u8 = 0x06;
/// Message type: protocol error (extension → host).
pub const MSG_ERROR: u8 = 0xFF;

/// Read one frame from the stream.
///
/// Returns `(msg_type, payload_bytes)`. Returns `None` on clean EOF.
/// `max_frame_bytes` caps the maximum accepted payload size.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let frame_len = u32::from_be_bytes(len_buf);
    if frame_len > max_frame_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Frame too large: {} bytes", frame_len),
        ));
    }
    if frame_len < 1 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Frame too short: missing type byte",
        ));
    }

    let mut frame_data = vec![0u8; frame_len as usize];
    reader.read_exact(&mut frame_data).await?;

    let msg_type = frame_data[0];
    let payload = frame_data.split_off(1);

    Ok(Some((msg_type, payload)))
}

/// Write one frame to the stream.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    let frame_len = u32::try_from(payload.len() + 1).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload exceeds u32 frame length")
    })?;
    writer.write_all(&frame_len.to_be_bytes()).await?;
    writer.write_all(&[msg_type]).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Decode a frame received from the host.
pub fn decode_host_message(msg_type: u8, payload: &[u8]) -> Result<HostMessage> {
    match msg_type {
        MSG_EVENT => Ok(HostMessage::Event(serde_json::from_slice::<Event>(payload)?)),
        MSG_INTENT_REPLY => Ok(HostMessage::IntentReply(serde_json::from_slice::<IntentReply>(
            payload,
        )?)),
        other => Err(Error::protocol(format!(
            "Unexpected message type from host: 0x{:02X}",
            other
        ))),
    }
}

/// Encode a message for the host.
pub fn encode_extension_message(message: &ExtensionMessage) -> Result<(u8, Vec<u8>)> {
    let encoded = match message {
        ExtensionMessage::IntentRequest(request) => (MSG_INTENT_REQUEST, serde_json::to_vec(request)?),
        ExtensionMessage::EventResult(result) => (MSG_EVENT_RESULT, serde_json::to_vec(result)?),
        ExtensionMessage::Log(log) => (MSG_LOG, serde_json::to_vec(log)?),
        ExtensionMessage::Notification(value) => (MSG_NOTIFICATION, serde_json::to_vec(value)?),
        ExtensionMessage::ProtocolError(error) => (MSG_ERROR, serde_json::to_vec(error)?),
    };
    Ok(encoded)
}

/// Encode a host message. Used by host-side harnesses and tests.
pub fn encode_host_message(message: &HostMessage) -> Result<(u8, Vec<u8>)> {
    let encoded = match message {
        HostMessage::Event(event) => (MSG_EVENT, serde_json::to_vec(event)?),
        HostMessage::IntentReply(reply) => (MSG_INTENT_REPLY, serde_json::to_vec(reply)?),
    };
    Ok(encoded)
}

/// Decode a frame sent by an extension. Used by host-side harnesses and tests.
pub fn decode_extension_message(msg_type: u8, payload: &[u8]) -> Result<ExtensionMessage> {
    match msg_type {
        MSG_INTENT_REQUEST => Ok(ExtensionMessage::IntentRequest(serde_json::from_slice::<
            IntentRequest,
        >(payload)?)),
        MSG_EVENT_RESULT => Ok(ExtensionMessage::EventResult(serde_json::from_slice::<
            EventResult,
        >(payload)?)),
        MSG_LOG => Ok(ExtensionMessage::Log(serde_json::from_slice::<LogMessage>(payload)?)),
        MSG_NOTIFICATION => Ok(ExtensionMessage::Notification(serde_json::from_slice(payload)?)),
        MSG_ERROR => Ok(ExtensionMessage::ProtocolError(serde_json::from_slice::<
            ProtocolError,
        >(payload)?)),
        other => Err(Error::protocol(format!(
            "Unexpected message type from extension: 0x{:02X}",
            other
        ))),
    }
}
