//! Message types exchanged with the host.
//!
//! Host → extension: [`HostMessage`] (events and intent replies).
//! Extension → host: [`ExtensionMessage`] (intent requests, event results,
//! logs, notifications, protocol errors).

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{CorrelationId, Error, EventId, Result};

/// Defines an open, string-tagged enumeration.
///
/// Known wire names map to variants; anything else lands in `Unknown` so a
/// newer host never breaks an older extension.
macro_rules! wire_kind {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A kind this runtime does not know about.
            Unknown(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Unknown(other) => other,
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $($wire => Self::$variant,)+
                    other => Self::Unknown(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from(s.as_str())
            }
        }

        impl From<$name> for String {
            fn from(kind: $name) -> String {
                match kind {
                    $name::Unknown(other) => other,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_kind! {
    /// Kind of a host-originated event.
    EventKind {
        Ready => "extension.ready",
        Settings => "extension.settings",
        Terminate => "extension.terminate",
        ImageCreated => "image.created",
        ImageUpdated => "image.updated",
        ImageDeleted => "image.deleted",
        ImageComputeFeatures => "image.computeFeatures",
        ImageComputeEmbeddings => "image.computeEmbeddings",
        ImageComputeTags => "image.computeTags",
        ImageRunCommand => "image.runCommand",
        ProcessRunCommand => "process.runCommand",
        TextComputeEmbeddings => "text.computeEmbeddings",
    }
}

impl EventKind {
    /// Lifecycle kinds drive the runtime itself; the rest are domain events.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Ready | Self::Settings | Self::Terminate)
    }
}

wire_kind! {
    /// Kind of an extension-originated intent.
    IntentKind {
        Parameters => "parameters",
        Ui => "ui",
        Dialog => "dialog",
        Images => "images",
        Show => "show",
    }
}

/// Host-originated notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Present when the host expects an [`EventResult`] back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    pub kind: EventKind,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            id: None,
            kind,
            payload,
        }
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Deserialize the payload into a typed structure.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(|e| {
            Error::validation(format!("invalid payload for event {}: {}", self.kind, e))
        })
    }
}

/// Intent sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub correlation_id: CorrelationId,
    pub kind: IntentKind,
    #[serde(default)]
    pub payload: Value,
}

/// Host outcome for one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum IntentOutcome {
    Success(Value),
    Failure(String),
}

/// Host reply to an [`IntentRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentReply {
    pub correlation_id: CorrelationId,
    pub outcome: IntentOutcome,
}

impl IntentReply {
    pub fn success(correlation_id: CorrelationId, value: Value) -> Self {
        Self {
            correlation_id,
            outcome: IntentOutcome::Success(value),
        }
    }

    pub fn failure(correlation_id: CorrelationId, reason: impl Into<String>) -> Self {
        Self {
            correlation_id,
            outcome: IntentOutcome::Failure(reason.into()),
        }
    }
}

/// Outcome of handling an event that carried an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum EventOutcome {
    Success(Value),
    Failure { code: String, message: String },
}

/// Answer to a host request delivered as an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    pub event_id: EventId,
    pub outcome: EventOutcome,
}

impl EventResult {
    pub fn from_result(event_id: EventId, result: &Result<Option<Value>>) -> Self {
        let outcome = match result {
            Ok(value) => EventOutcome::Success(value.clone().unwrap_or(Value::Null)),
            Err(err) => EventOutcome::Failure {
                code: err.to_wire_code().to_string(),
                message: err.to_string(),
            },
        };
        Self { event_id, outcome }
    }
}

/// Severity of a log line forwarded to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Diagnostic line shown by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
    pub timestamp_ms: i64,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Error reported to the host about a frame it sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: String,
    pub message: String,
}

/// Host → extension.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    Event(Event),
    IntentReply(IntentReply),
}

/// Extension → host.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionMessage {
    IntentRequest(IntentRequest),
    EventResult(EventResult),
    Log(LogMessage),
    /// Free-form value pushed to the host UI.
    Notification(Value),
    ProtocolError(ProtocolError),
}
