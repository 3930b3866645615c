//! Intent correlation: one pending entry per in-flight intent, resolved
//! exactly once by the matching reply, a timeout, or channel closure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

use crate::protocol::{ExtensionMessage, IntentKind, IntentOutcome, IntentReply, IntentRequest};
use crate::transport::Outbound;
use crate::types::{CorrelationId, Error, Result};

/// Counters about correlator usage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentStats {
    pub sent: u64,
    pub succeeded: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub closed: u64,
    pub unmatched_replies: u64,
}

#[derive(Debug)]
struct PendingIntent {
    kind: IntentKind,
    tx: oneshot::Sender<Result<Value>>,
}

#[derive(Debug, Default)]
struct CorrelatorState {
    pending: HashMap<CorrelationId, PendingIntent>,
    closed: bool,
    stats: IntentStats,
}

#[derive(Debug)]
struct Inner {
    outbound: Outbound,
    next_seq: AtomicU64,
    default_timeout: Option<Duration>,
    state: Mutex<CorrelatorState>,
}

/// Tracks intents sent to the host and routes replies back to their callers.
///
/// Cheap to clone; clones share the same pending table.
#[derive(Debug, Clone)]
pub struct IntentCorrelator {
    inner: Arc<Inner>,
}

impl IntentCorrelator {
    pub fn new(outbound: Outbound, default_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                outbound,
                next_seq: AtomicU64::new(1),
                default_timeout,
                state: Mutex::new(CorrelatorState::default()),
            }),
        }
    }

    /// Send an intent and wait for its outcome, using the configured default timeout.
    pub async fn send(&self, kind: IntentKind, payload: Value) -> Result<Value> {
        self.send_inner(kind, payload, self.inner.default_timeout).await
    }

    /// Send an intent and wait at most `timeout` for its outcome.
    ///
    /// On expiry the pending entry is removed, so a late reply is treated as
    /// unmatched and dropped.
    pub async fn send_with_timeout(
        &self,
        kind: IntentKind,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value> {
        self.send_inner(kind, payload, Some(timeout)).await
    }

    async fn send_inner(
        &self,
        kind: IntentKind,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let correlation_id =
            CorrelationId::from_sequence(self.inner.next_seq.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = oneshot::channel();

        // Register before transmitting: the reply may beat us back otherwise.
        {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            state.pending.insert(
                correlation_id.clone(),
                PendingIntent {
                    kind: kind.clone(),
                    tx,
                },
            );
            state.stats.sent += 1;
        }

        tracing::debug!(correlation_id = %correlation_id, kind = %kind, "sending intent");
        let request = IntentRequest {
            correlation_id: correlation_id.clone(),
            kind: kind.clone(),
            payload,
        };
        if let Err(e) = self.inner.outbound.send(ExtensionMessage::IntentRequest(request)).await {
            self.deregister(&correlation_id).await;
            return Err(e);
        }

        let outcome = match timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    if !self.deregister(&correlation_id).await {
                        // Resolved or closed while the timer fired; the verdict is on its way.
                        return rx.await.unwrap_or(Err(Error::ChannelClosed));
                    }
                    self.inner.state.lock().await.stats.timed_out += 1;
                    return Err(Error::timeout(format!(
                        "intent {} ({}) got no reply within {}ms",
                        correlation_id,
                        kind,
                        limit.as_millis()
                    )));
                }
            },
        };

        // A dropped sender means the table was torn down without a verdict.
        outcome.unwrap_or(Err(Error::ChannelClosed))
    }

    /// Route a host reply to its waiting caller.
    ///
    /// Returns `false` for replies with no pending intent; those are logged
    /// and discarded.
    pub async fn resolve(&self, reply: IntentReply) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(pending) = state.pending.remove(&reply.correlation_id) else {
            state.stats.unmatched_replies += 1;
            tracing::warn!(
                correlation_id = %reply.correlation_id,
                "unmatched intent reply discarded"
            );
            return false;
        };

        let result = match reply.outcome {
            IntentOutcome::Success(value) => {
                state.stats.succeeded += 1;
                Ok(value)
            }
            IntentOutcome::Failure(reason) => {
                state.stats.rejected += 1;
                Err(Error::IntentRejected(reason))
            }
        };
        drop(state);

        tracing::debug!(
            correlation_id = %reply.correlation_id,
            kind = %pending.kind,
            ok = result.is_ok(),
            "intent resolved"
        );
        // The caller may have given up already; nothing to do then.
        let _ = pending.tx.send(result);
        true
    }

    /// Fail every pending intent with `ChannelClosed` and refuse new ones.
    ///
    /// Returns how many intents were failed.
    pub async fn close(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        let drained: Vec<_> = state.pending.drain().collect();
        state.stats.closed += drained.len() as u64;
        drop(state);

        if !drained.is_empty() {
            tracing::info!("Failing {} pending intents: channel closed", drained.len());
        }
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.tx.send(Err(Error::ChannelClosed));
        }
        count
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    pub async fn stats(&self) -> IntentStats {
        self.inner.state.lock().await.stats.clone()
    }

    async fn deregister(&self, correlation_id: &CorrelationId) -> bool {
        self.inner
            .state
            .lock()
            .await
            .pending
            .remove(correlation_id)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{in_memory, HostEndpoint};
    use serde_json::json;
    use tracing_test::traced_test;

    fn correlator() -> (IntentCorrelator, HostEndpoint) {
        let (transport, host) = in_memory(32);
        let (outbound, _inbound) = transport.into_parts();
        (IntentCorrelator::new(outbound, None), host)
    }

    #[tokio::test]
    async fn test_success_reply_resolves_caller() {
        let (correlator, mut host) = correlator();

        let c = correlator.clone();
        let caller = tokio::spawn(async move { c.send(IntentKind::Dialog, json!({"title": "Hi"})).await });

        let request = host.next_intent().await.unwrap();
        assert_eq!(request.kind, IntentKind::Dialog);
        assert!(correlator
            .resolve(IntentReply::success(request.correlation_id, json!(true)))
            .await);

        assert_eq!(caller.await.unwrap().unwrap(), json!(true));
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_intent_pending_until_reply() {
        let (correlator, mut host) = correlator();

        let mut send = tokio_test::task::spawn(correlator.send(IntentKind::Ui, json!({})));
        tokio_test::assert_pending!(send.poll());
        assert_eq!(correlator.pending_count().await, 1);

        let request = host.next_intent().await.unwrap();
        correlator
            .resolve(IntentReply::success(request.correlation_id, json!("ok")))
            .await;
        assert!(send.is_woken());
        assert_eq!(tokio_test::assert_ready!(send.poll()).unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn test_failure_reply_is_intent_rejected() {
        let (correlator, mut host) = correlator();

        let c = correlator.clone();
        let caller = tokio::spawn(async move { c.send(IntentKind::Parameters, json!({})).await });

        let request = host.next_intent().await.unwrap();
        correlator
            .resolve(IntentReply::failure(request.correlation_id, "user cancelled"))
            .await;

        match caller.await.unwrap() {
            Err(Error::IntentRejected(reason)) => assert_eq!(reason, "user cancelled"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(correlator.stats().await.rejected, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_reply_for_other_id_does_not_resolve() {
        let (correlator, mut host) = correlator();

        let c = correlator.clone();
        let caller = tokio::spawn(async move { c.send(IntentKind::Show, json!({})).await });
        let request = host.next_intent().await.unwrap();

        let stray = CorrelationId::from_string(format!("{}3", request.correlation_id)).unwrap();
        assert!(!correlator.resolve(IntentReply::success(stray, json!("wrong"))).await);
        assert!(!caller.is_finished());
        assert_eq!(correlator.pending_count().await, 1);
        assert!(logs_contain("unmatched intent reply discarded"));

        correlator
            .resolve(IntentReply::success(request.correlation_id, json!("right")))
            .await;
        assert_eq!(caller.await.unwrap().unwrap(), json!("right"));
    }

    #[tokio::test]
    async fn test_timeout_deregisters_pending_intent() {
        let (correlator, mut host) = correlator();

        let c = correlator.clone();
        let caller = tokio::spawn(async move {
            c.send_with_timeout(IntentKind::Ui, json!({}), Duration::from_millis(20))
                .await
        });
        let request = host.next_intent().await.unwrap();

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(correlator.pending_count().await, 0);

        // Late reply is drained safely
        assert!(!correlator
            .resolve(IntentReply::success(request.correlation_id, json!(null)))
            .await);
        let stats = correlator.stats().await;
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.unmatched_replies, 1);
    }

    #[tokio::test]
    async fn test_reply_racing_timeout_is_not_lost() {
        let (correlator, mut host) = correlator();

        let mut send = tokio_test::task::spawn(correlator.send_with_timeout(
            IntentKind::Dialog,
            json!({}),
            Duration::from_millis(10),
        ));
        tokio_test::assert_pending!(send.poll());
        let request = host.next_intent().await.unwrap();

        // Timer fires while the reply holds the table.
        let mut state = correlator.inner.state.lock().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio_test::assert_pending!(send.poll());

        let pending = state.pending.remove(&request.correlation_id).unwrap();
        state.stats.succeeded += 1;
        pending.tx.send(Ok(json!("kept"))).unwrap();
        drop(state);

        assert_eq!(tokio_test::assert_ready!(send.poll()).unwrap(), json!("kept"));
        let stats = correlator.stats().await;
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.timed_out, 0);
    }

    #[tokio::test]
    async fn test_close_fails_all_pending() {
        let (correlator, mut host) = correlator();

        let mut callers = Vec::new();
        for _ in 0..3 {
            let c = correlator.clone();
            callers.push(tokio::spawn(async move { c.send(IntentKind::Images, json!({})).await }));
        }
        for _ in 0..3 {
            host.next_intent().await.unwrap();
        }

        assert_eq!(correlator.close().await, 3);
        for caller in callers {
            assert!(matches!(caller.await.unwrap(), Err(Error::ChannelClosed)));
        }
        assert_eq!(correlator.pending_count().await, 0);

        // Closed correlator refuses new intents immediately
        let err = correlator.send(IntentKind::Images, json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
    }

    #[tokio::test]
    async fn test_send_on_dead_transport_leaves_nothing_pending() {
        let (correlator, host) = correlator();
        drop(host);

        let err = correlator.send(IntentKind::Dialog, json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_correlation_ids_are_unique() {
        let (correlator, mut host) = correlator();
        for _ in 0..5 {
            let c = correlator.clone();
            tokio::spawn(async move { c.send(IntentKind::Ui, json!({})).await });
        }
        let mut seen = std::collections::HashSet::new();
        for _ in 0..5 {
            let request = host.next_intent().await.unwrap();
            assert!(seen.insert(request.correlation_id));
        }
    }
}
