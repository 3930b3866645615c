//! Transport channel to the host.
//!
//! A [`Transport`] is a pair of queues: inbound [`HostMessage`]s and an
//! [`Outbound`] sender for [`ExtensionMessage`]s. Where the bytes go is up to
//! the adapter:
//! - [`framed`]: length-prefixed frames over any `AsyncRead`/`AsyncWrite`
//!   (stdio, sockets, pipes)
//! - [`in_memory`]: an in-process queue pair with a [`HostEndpoint`]
//!
//! The inbound receiver yielding `None` means the channel is closed.

mod framed;
mod memory;

pub use framed::{framed, stdio, TransportTasks};
pub use memory::{in_memory, HostEndpoint};

use tokio::sync::mpsc;

use crate::protocol::{ExtensionMessage, HostMessage};
use crate::types::{Error, Result};

/// Cloneable sending half towards the host.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<ExtensionMessage>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<ExtensionMessage>) -> Self {
        Self { tx }
    }

    /// Queue a message for the host. Fails with `ChannelClosed` once the
    /// writing side is gone.
    pub async fn send(&self, message: ExtensionMessage) -> Result<()> {
        self.tx.send(message).await.map_err(|_| Error::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes once the writing side is gone: the host endpoint was
    /// dropped or the framed writer hit an I/O error.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Both directions of a host connection.
#[derive(Debug)]
pub struct Transport {
    outbound: Outbound,
    inbound: mpsc::Receiver<HostMessage>,
}

impl Transport {
    pub fn new(outbound: Outbound, inbound: mpsc::Receiver<HostMessage>) -> Self {
        Self { outbound, inbound }
    }

    pub fn into_parts(self) -> (Outbound, mpsc::Receiver<HostMessage>) {
        (self.outbound, self.inbound)
    }
}
