//! Host wire protocol: message types and length-prefixed JSON framing.

pub mod codec;
pub mod messages;

pub use messages::{
    Event, EventKind, EventOutcome, EventResult, ExtensionMessage, HostMessage, IntentKind,
    IntentOutcome, IntentReply, IntentRequest, LogLevel, LogMessage, ProtocolError,
};
