//! Byte-stream transport: reader and writer tasks around the frame codec.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Outbound, Transport};
use crate::protocol::codec::{
    decode_host_message, encode_extension_message, read_frame, write_frame,
};
use crate::protocol::{ExtensionMessage, HostMessage, ProtocolError};
use crate::types::{Error, TransportConfig};

/// Background tasks pumping frames for a [`framed`] transport.
#[derive(Debug)]
pub struct TransportTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl TransportTasks {
    /// Stop reading and give the writer `flush_timeout` to drain queued messages.
    ///
    /// The writer only finishes once every [`Outbound`] clone is dropped, so
    /// call this after the dispatcher returned.
    pub async fn shutdown(mut self, flush_timeout: Duration) {
        self.reader.abort();
        if tokio::time::timeout(flush_timeout, &mut self.writer).await.is_err() {
            tracing::warn!(
                "Transport writer did not drain within {}ms, aborting",
                flush_timeout.as_millis()
            );
            self.writer.abort();
        }
    }
}

/// Run the wire protocol over a reader/writer pair.
///
/// Undecodable frames are answered with an error frame and skipped; EOF or a
/// read error closes the inbound side. A write error stops the writer, which
/// closes the [`Outbound`] side for every clone.
pub fn framed<R, W>(reader: R, writer: W, config: &TransportConfig) -> (Transport, TransportTasks)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(config.channel_capacity);

    // Weak so the reader never keeps the writer alive on its own.
    let error_tx = outbound_tx.downgrade();
    let reader = tokio::spawn(reader_loop(
        reader,
        inbound_tx,
        error_tx,
        config.max_frame_bytes,
    ));
    let writer = tokio::spawn(writer_loop(writer, outbound_rx));

    (
        Transport::new(Outbound::new(outbound_tx), inbound_rx),
        TransportTasks { reader, writer },
    )
}

/// Framed transport on the process's stdin/stdout.
pub fn stdio(config: &TransportConfig) -> (Transport, TransportTasks) {
    framed(tokio::io::stdin(), tokio::io::stdout(), config)
}

async fn reader_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    inbound: mpsc::Sender<HostMessage>,
    errors: mpsc::WeakSender<ExtensionMessage>,
    max_frame_bytes: u32,
) {
    loop {
        let (msg_type, payload) = match read_frame(&mut reader, max_frame_bytes).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!("Host closed the transport stream");
                break;
            }
            Err(e) => {
                tracing::warn!("Transport read failed: {}", e);
                break;
            }
        };

        match decode_host_message(msg_type, &payload) {
            Ok(message) => {
                if inbound.send(message).await.is_err() {
                    tracing::debug!("Inbound receiver dropped, stopping reader");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Dropping undecodable frame 0x{:02X}: {}", msg_type, e);
                report_protocol_error(&errors, &e).await;
            }
        }
    }
}

async fn writer_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<ExtensionMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let (msg_type, payload) = match encode_extension_message(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Encoding outbound message failed: {}", e);
                continue;
            }
        };
        if let Err(e) = write_frame(&mut writer, msg_type, &payload).await {
            tracing::warn!("Transport write failed, closing outbound side: {}", e);
            break;
        }
    }
    // Wakes `Outbound::closed` waiters.
    outbound.close();
}

async fn report_protocol_error(errors: &mpsc::WeakSender<ExtensionMessage>, error: &Error) {
    let Some(tx) = errors.upgrade() else {
        return;
    };
    let frame = ExtensionMessage::ProtocolError(ProtocolError {
        code: error.to_wire_code().to_string(),
        message: error.to_string(),
    });
    let _ = tx.send(frame).await;
}
