//! Event dispatcher: the extension's single control path.
//!
//! The dispatcher reads host messages, routes intent replies to the
//! correlator and events to their handlers. Handlers overlap: each accepted
//! event becomes a future polled on the dispatcher's own task, and the
//! channel keeps being read while handlers are suspended on intents or
//! offloaded work. Handlers are first polled in arrival order.
//!
//! ```text
//!   Idle ⇄ Dispatching ──terminate / close / shutdown()──▶ ShuttingDown ──drained / grace──▶ Terminated
//! ```

mod context;
mod registry;
mod state;

pub use context::Context;
pub use registry::{handler_fn, EventHandler, FnHandler, HandlerRegistry};
pub use state::{DispatchSummary, DispatcherState, ShutdownHandle, ShutdownReason};

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::intent::IntentCorrelator;
use crate::offload::OffloadPool;
use crate::protocol::{
    Event, EventKind, EventResult, ExtensionMessage, HostMessage, IntentReply, LogLevel,
    LogMessage,
};
use crate::recovery::catch_panic;
use crate::transport::{Outbound, Transport};
use crate::types::{Config, EventId, ExtensionId, Result};

/// Outcome of one handler invocation.
struct Completed {
    id: Option<EventId>,
    kind: EventKind,
    result: Result<Option<Value>>,
}

type HandlerFuture = BoxFuture<'static, Completed>;

/// Drives one extension instance until shutdown.
#[derive(Debug)]
pub struct Dispatcher {
    context: Context,
    outbound: Outbound,
    inbound: mpsc::Receiver<HostMessage>,
    max_in_flight: usize,
    shutdown_grace: Duration,
    shutdown: CancellationToken,
    state_tx: watch::Sender<DispatcherState>,
}

impl Dispatcher {
    pub fn new(extension_id: ExtensionId, config: &Config, transport: Transport) -> Self {
        let (outbound, inbound) = transport.into_parts();
        let intents = IntentCorrelator::new(outbound.clone(), config.intent.default_timeout);
        let offload = OffloadPool::new(config.offload.max_concurrency);
        let context = Context::new(
            extension_id,
            outbound.clone(),
            intents,
            offload,
            config.cache_dir.clone(),
        );
        let (state_tx, _) = watch::channel(DispatcherState::Idle);

        Self {
            context,
            outbound,
            inbound,
            max_in_flight: config.dispatcher.max_in_flight.max(1),
            shutdown_grace: config.dispatcher.shutdown_grace,
            shutdown: CancellationToken::new(),
            state_tx,
        }
    }

    /// Context shared with every handler. Usable before `dispatch` (e.g. to
    /// pre-warm resources).
    pub fn context(&self) -> Context {
        self.context.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.shutdown.clone())
    }

    /// Watch the dispatcher's state. The last value stays readable after
    /// `dispatch` returns.
    pub fn state(&self) -> watch::Receiver<DispatcherState> {
        self.state_tx.subscribe()
    }

    /// Dispatch events until terminate, channel closure, or a shutdown request,
    /// then drain in-flight handlers within the grace period.
    pub async fn dispatch(mut self, registry: HandlerRegistry) -> DispatchSummary {
        tracing::info!(
            extension_id = %self.context.extension_id(),
            instance_id = %self.context.instance_id(),
            handlers = ?registry.declared_kinds(),
            "dispatcher started"
        );

        let mut lp = DispatchLoop {
            context: self.context.clone(),
            outbound: self.outbound.clone(),
            registry,
            max_in_flight: self.max_in_flight,
            in_flight: FuturesUnordered::new(),
            backlog: VecDeque::new(),
            summary: DispatchSummary::default(),
            state_tx: &self.state_tx,
        };

        let reason = loop {
            tokio::select! {
                biased;
                Some(done) = lp.in_flight.next(), if !lp.in_flight.is_empty() => {
                    lp.complete(done).await;
                }
                _ = self.shutdown.cancelled() => break ShutdownReason::Requested,
                _ = self.outbound.closed() => {
                    tracing::warn!("host stopped accepting messages");
                    break ShutdownReason::ChannelClosed;
                }
                message = self.inbound.recv() => match message {
                    None => break ShutdownReason::ChannelClosed,
                    Some(HostMessage::IntentReply(reply)) => lp.route_reply(reply).await,
                    Some(HostMessage::Event(event)) => {
                        let terminate = event.kind == EventKind::Terminate;
                        lp.accept(event).await;
                        if terminate {
                            break ShutdownReason::Terminate;
                        }
                    }
                },
            }
        };

        lp.summary.shutdown_reason = Some(reason);
        lp.set_state(DispatcherState::ShuttingDown);
        tracing::info!(
            reason = ?reason,
            in_flight = lp.in_flight.len(),
            backlog = lp.backlog.len(),
            "dispatcher shutting down"
        );

        let mut inbound_open = reason != ShutdownReason::ChannelClosed;
        let mut outbound_open = inbound_open;
        if !inbound_open {
            // Nobody can answer pending intents any more.
            lp.context.intents().close().await;
        }

        let grace = tokio::time::sleep(self.shutdown_grace);
        tokio::pin!(grace);
        while !lp.in_flight.is_empty() || !lp.backlog.is_empty() {
            tokio::select! {
                biased;
                Some(done) = lp.in_flight.next(), if !lp.in_flight.is_empty() => {
                    lp.complete(done).await;
                }
                _ = &mut grace => {
                    let abandoned = (lp.in_flight.len() + lp.backlog.len()) as u64;
                    tracing::warn!(
                        abandoned,
                        "shutdown grace of {}ms expired, abandoning handlers",
                        self.shutdown_grace.as_millis()
                    );
                    lp.summary.grace_expired = true;
                    lp.summary.abandoned = abandoned;
                    break;
                }
                _ = self.outbound.closed(), if outbound_open => {
                    outbound_open = false;
                    lp.context.intents().close().await;
                }
                message = self.inbound.recv(), if inbound_open => match message {
                    None => {
                        inbound_open = false;
                        lp.context.intents().close().await;
                    }
                    Some(HostMessage::IntentReply(reply)) => lp.route_reply(reply).await,
                    Some(HostMessage::Event(event)) => {
                        lp.summary.events_received += 1;
                        lp.summary.dropped_during_shutdown += 1;
                        tracing::debug!(kind = %event.kind, "dropping event received during shutdown");
                    }
                },
            }
        }

        lp.in_flight.clear();
        lp.backlog.clear();
        lp.context.intents().close().await;
        lp.set_state(DispatcherState::Terminated);

        let summary = lp.summary;
        tracing::info!(
            events_received = summary.events_received,
            dispatched = summary.dispatched,
            failed = summary.failed,
            "dispatcher terminated"
        );
        summary
    }
}

/// Mutable state of one `dispatch` call.
struct DispatchLoop<'a> {
    context: Context,
    outbound: Outbound,
    registry: HandlerRegistry,
    max_in_flight: usize,
    in_flight: FuturesUnordered<HandlerFuture>,
    backlog: VecDeque<(Event, Arc<dyn EventHandler>)>,
    summary: DispatchSummary,
    state_tx: &'a watch::Sender<DispatcherState>,
}

impl DispatchLoop<'_> {
    async fn route_reply(&mut self, reply: IntentReply) {
        self.summary.intent_replies += 1;
        self.context.intents().resolve(reply).await;
    }

    async fn accept(&mut self, event: Event) {
        self.summary.events_received += 1;

        if event.kind == EventKind::Settings {
            self.context.store_settings(event.payload.clone()).await;
        }

        let Some(handler) = self.registry.get(&event.kind) else {
            self.summary.ignored += 1;
            tracing::debug!(kind = %event.kind, "no handler registered, ignoring event");
            if let Some(id) = event.id {
                send(
                    &self.outbound,
                    ExtensionMessage::EventResult(EventResult::from_result(id, &Ok(None))),
                )
                .await;
            }
            return;
        };

        if !self.backlog.is_empty() || self.in_flight.len() >= self.max_in_flight {
            tracing::debug!(
                kind = %event.kind,
                backlog = self.backlog.len() + 1,
                "handler limit reached, queueing event"
            );
            self.backlog.push_back((event, handler));
        } else {
            self.start(event, handler);
        }
    }

    fn start(&mut self, event: Event, handler: Arc<dyn EventHandler>) {
        self.summary.dispatched += 1;
        self.set_state(DispatcherState::Dispatching);
        tracing::debug!(kind = %event.kind, id = ?event.id, "dispatching event");

        let ctx = self.context.clone();
        let future = async move {
            let id = event.id.clone();
            let kind = event.kind.clone();
            let operation = format!("handler for {}", kind);
            let result = catch_panic(handler.handle(ctx, event), &operation).await;
            Completed { id, kind, result }
        };
        self.in_flight.push(future.boxed());
    }

    async fn complete(&mut self, done: Completed) {
        match &done.result {
            Ok(_) => {
                self.summary.succeeded += 1;
                tracing::debug!(kind = %done.kind, "handler completed");
            }
            Err(err) => {
                self.summary.failed += 1;
                tracing::error!(kind = %done.kind, code = err.to_wire_code(), "handler failed: {}", err);
                send(
                    &self.outbound,
                    ExtensionMessage::Log(LogMessage::new(
                        LogLevel::Error,
                        format!("handler for {} failed: {}", done.kind, err),
                    )),
                )
                .await;
            }
        }

        if let Some(id) = done.id {
            send(
                &self.outbound,
                ExtensionMessage::EventResult(EventResult::from_result(id, &done.result)),
            )
            .await;
        }

        while self.in_flight.len() < self.max_in_flight {
            let Some((event, handler)) = self.backlog.pop_front() else {
                break;
            };
            self.start(event, handler);
        }

        if self.in_flight.is_empty() && *self.state_tx.borrow() == DispatcherState::Dispatching {
            self.set_state(DispatcherState::Idle);
        }
    }

    fn set_state(&self, next: DispatcherState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next || !current.can_transition_to(next) {
                return false;
            }
            tracing::debug!(from = %current, to = %next, "dispatcher state changed");
            *current = next;
            true
        });
    }
}

/// Best-effort send; a gone host is noticed through `Outbound::closed`.
async fn send(outbound: &Outbound, message: ExtensionMessage) {
    if let Err(e) = outbound.send(message).await {
        tracing::debug!("could not reach host: {}", e);
    }
}
