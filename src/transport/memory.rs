//! In-process transport.
//!
//! The extension side gets a regular [`Transport`]; the caller keeps the
//! [`HostEndpoint`] and plays the host. Dropping or closing the endpoint
//! closes the channel.

use tokio::sync::mpsc;

use super::{Outbound, Transport};
use crate::protocol::{Event, ExtensionMessage, HostMessage, IntentReply, IntentRequest};
use crate::types::{Error, Result};

/// Host side of an in-process transport.
#[derive(Debug)]
pub struct HostEndpoint {
    tx: Option<mpsc::Sender<HostMessage>>,
    rx: mpsc::Receiver<ExtensionMessage>,
}

/// Create a connected transport / host endpoint pair.
pub fn in_memory(capacity: usize) -> (Transport, HostEndpoint) {
    let (host_tx, inbound_rx) = mpsc::channel(capacity);
    let (outbound_tx, host_rx) = mpsc::channel(capacity);
    let transport = Transport::new(Outbound::new(outbound_tx), inbound_rx);
    let endpoint = HostEndpoint {
        tx: Some(host_tx),
        rx: host_rx,
    };
    (transport, endpoint)
}

impl HostEndpoint {
    pub async fn send(&self, message: HostMessage) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ChannelClosed)?;
        tx.send(message).await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn send_event(&self, event: Event) -> Result<()> {
        self.send(HostMessage::Event(event)).await
    }

    pub async fn reply(&self, reply: IntentReply) -> Result<()> {
        self.send(HostMessage::IntentReply(reply)).await
    }

    /// Next message from the extension, `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ExtensionMessage> {
        self.rx.recv().await
    }

    /// Next intent request, discarding logs, notifications and results in between.
    pub async fn next_intent(&mut self) -> Option<IntentRequest> {
        while let Some(message) = self.rx.recv().await {
            if let ExtensionMessage::IntentRequest(request) = message {
                return Some(request);
            }
        }
        None
    }

    /// Close the host → extension direction. Extension messages can still be read.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EventKind, LogLevel, LogMessage};
    use serde_json::json;

    #[tokio::test]
    async fn test_events_flow_to_extension() {
        let (transport, host) = in_memory(8);
        let (_outbound, mut inbound) = transport.into_parts();

        host.send_event(Event::new(EventKind::Ready, json!({}))).await.unwrap();
        match inbound.recv().await.unwrap() {
            HostMessage::Event(event) => assert_eq!(event.kind, EventKind::Ready),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_ends_inbound_stream() {
        let (transport, mut host) = in_memory(8);
        let (outbound, mut inbound) = transport.into_parts();

        host.close();
        assert!(inbound.recv().await.is_none());
        // Extension → host still works after the host stops sending
        outbound
            .send(ExtensionMessage::Log(LogMessage::new(LogLevel::Info, "bye")))
            .await
            .unwrap();
        assert!(host.recv().await.is_some());
        assert!(host.send_event(Event::new(EventKind::Ready, json!({}))).await.is_err());
    }

    #[tokio::test]
    async fn test_outbound_fails_after_host_dropped() {
        let (transport, host) = in_memory(8);
        let (outbound, _inbound) = transport.into_parts();
        drop(host);

        let err = outbound
            .send(ExtensionMessage::Notification(json!({"key": "value"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        assert!(outbound.is_closed());
    }
}
