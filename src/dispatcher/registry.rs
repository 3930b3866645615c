//! Event kind → handler routing table.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::Context;
use crate::protocol::{Event, EventKind};
use crate::types::Result;

/// Extension logic for one event kind.
///
/// The returned value becomes the successful event result when the event
/// carried an id; it is ignored otherwise.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: Context, event: Event) -> Result<Option<Value>>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a handler: `handler_fn(|ctx, event| async move { .. })`.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context, Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Context, Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    async fn handle(&self, ctx: Context, event: Event) -> Result<Option<Value>> {
        (self.f)(ctx, event).await
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

/// Handlers keyed by event kind. The key set is the extension's declared
/// event set; anything else is ignored by the dispatcher.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    pub fn on<H>(mut self, kind: EventKind, handler: H) -> Self
    where
        H: EventHandler + 'static,
    {
        self.register(kind, handler);
        self
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register<H>(&mut self, kind: EventKind, handler: H)
    where
        H: EventHandler + 'static,
    {
        if self.handlers.insert(kind.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(kind = %kind, "replacing previously registered handler");
        }
    }

    pub fn get(&self, kind: &EventKind) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn handles(&self, kind: &EventKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Declared kinds, sorted by wire name.
    pub fn declared_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.handlers.keys().cloned().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.declared_kinds())
            .finish()
    }
}
