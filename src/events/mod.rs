//! Typed payloads of host events.
//!
//! Use with [`Event::decode`](crate::protocol::Event::decode):
//! `let cmd: ProcessCommand = event.decode()?;`

mod payloads;

pub use payloads::{ImageCommand, ImageEvent, ProcessCommand, TextEmbeddingsRequest};
