//! Property tests for intent correlation.

use picteus_extension::protocol::{IntentKind, IntentReply, IntentRequest};
use picteus_extension::{in_memory, Error, HostEndpoint, IntentCorrelator, Result};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use serde_json::{json, Value};
use std::collections::HashSet;
use tokio::task::JoinHandle;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Helper: `n` callers, each sending one intent tagged with its index.
async fn launch(
    n: usize,
) -> (
    IntentCorrelator,
    HostEndpoint,
    Vec<JoinHandle<Result<Value>>>,
    Vec<IntentRequest>,
) {
    let (transport, mut host) = in_memory(64);
    let (outbound, _inbound) = transport.into_parts();
    let correlator = IntentCorrelator::new(outbound, None);

    let callers = (0..n)
        .map(|i| {
            let c = correlator.clone();
            tokio::spawn(async move { c.send(IntentKind::Parameters, json!({ "caller": i })).await })
        })
        .collect();

    let mut requests = Vec::with_capacity(n);
    for _ in 0..n {
        requests.push(host.next_intent().await.unwrap());
    }
    (correlator, host, callers, requests)
}

fn reply_plan() -> impl Strategy<Value = (Vec<usize>, Vec<bool>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            proptest::collection::vec(any::<bool>(), n),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replies_reach_exactly_their_caller((order, accept) in reply_plan()) {
        let n = order.len();
        runtime().block_on(async {
            let (correlator, _host, callers, requests) = launch(n).await;

            let ids: HashSet<_> = requests.iter().map(|r| r.correlation_id.clone()).collect();
            prop_assert_eq!(ids.len(), n);

            for &idx in &order {
                let request = requests
                    .iter()
                    .find(|r| r.payload["caller"] == json!(idx))
                    .unwrap();
                let reply = if accept[idx] {
                    IntentReply::success(request.correlation_id.clone(), json!(idx))
                } else {
                    IntentReply::failure(request.correlation_id.clone(), format!("declined {}", idx))
                };
                prop_assert!(correlator.resolve(reply).await);
            }

            for (i, caller) in callers.into_iter().enumerate() {
                match caller.await.unwrap() {
                    Ok(value) => {
                        prop_assert!(accept[i]);
                        prop_assert_eq!(value, json!(i));
                    }
                    Err(Error::IntentRejected(reason)) => {
                        prop_assert!(!accept[i]);
                        prop_assert_eq!(reason, format!("declined {}", i));
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
                }
            }
            prop_assert_eq!(correlator.pending_count().await, 0);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn close_fails_every_pending_intent(n in 1usize..16, answered in 0usize..16) {
        let answered = answered.min(n);
        runtime().block_on(async {
            let (correlator, _host, callers, requests) = launch(n).await;

            for request in &requests[..answered] {
                correlator
                    .resolve(IntentReply::success(request.correlation_id.clone(), Value::Null))
                    .await;
            }
            prop_assert_eq!(correlator.close().await, n - answered);
            prop_assert_eq!(correlator.pending_count().await, 0);

            let mut closed = 0;
            for caller in callers {
                if matches!(caller.await.unwrap(), Err(Error::ChannelClosed)) {
                    closed += 1;
                }
            }
            prop_assert_eq!(closed, n - answered);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
