//! # Picteus Extension - Runtime for host-loaded extensions
//!
//! Rust implementation of the Picteus extension runtime providing:
//! - Event dispatch from the host to registered handlers, in arrival order
//! - Host intents (dialogs, forms, UI pages) with correlated replies
//! - Lazily-constructed shared resources guarded against duplicate loads
//! - A bounded worker pool for blocking and GPU-bound inference
//! - A length-prefixed JSON wire protocol over stdio or any byte stream
//!
//! ## Architecture
//!
//! The dispatcher is the single control path; handlers overlap on it and
//! suspend on intents or offloaded work:
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!   host frames → │ Transport ─→ Dispatcher ─→ handlers(ctx)  │
//!                 │                  │             │  │  │    │
//!                 │   replies ─→ IntentCorrelator ←┘  │  │    │
//!                 │              ResourceGuard ←──────┘  │    │
//!                 │              OffloadPool ←───────────┘    │
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use picteus_extension::{
//!     handler_fn, in_memory, Config, Dispatcher, EventKind, ExtensionId, HandlerRegistry,
//!     LogLevel,
//! };
//!
//! # async fn demo() -> picteus_extension::Result<()> {
//! let (transport, _host) = in_memory(64);
//! let id = ExtensionId::from_string("example".to_string()).map_err(picteus_extension::Error::validation)?;
//! let dispatcher = Dispatcher::new(id, &Config::default(), transport);
//! let registry = HandlerRegistry::new().on(
//!     EventKind::Ready,
//!     handler_fn(|ctx, _event| async move {
//!         ctx.log(LogLevel::Info, "ready").await?;
//!         Ok(None)
//!     }),
//! );
//! let summary = dispatcher.dispatch(registry).await;
//! # let _ = summary;
//! # Ok(())
//! # }
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod dispatcher;
pub mod events;
pub mod intent;
pub mod offload;
pub mod protocol;
pub mod resource;
pub mod transport;
pub mod types;

// Internal utilities
pub mod observability;
pub mod recovery;

pub use dispatcher::{
    handler_fn, Context, DispatchSummary, Dispatcher, DispatcherState, EventHandler,
    HandlerRegistry, ShutdownHandle, ShutdownReason,
};
pub use intent::{Intent, IntentCorrelator};
pub use offload::{OffloadPool, OffloadTask};
pub use protocol::{Event, EventKind, IntentKind, LogLevel};
pub use resource::ResourceGuard;
pub use transport::{framed, in_memory, stdio, HostEndpoint, Transport, TransportTasks};
pub use types::{Config, Error, ExtensionId, Result};
