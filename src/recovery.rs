//! Panic recovery for extension handlers and offloaded work.
//!
//! A panicking handler must not take the dispatch loop down with it; the
//! panic is caught, logged, and turned into an error for the one event.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::types::{Error, Result};

/// Poll `future` to completion, converting a panic into [`Error::Internal`].
pub async fn catch_panic<F, T>(future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let panic_msg = extract_panic_message(payload.as_ref());
            tracing::error!(
                "panic_recovered: operation={}, panic={}",
                operation_name,
                panic_msg
            );
            Err(Error::internal(format!(
                "Panic in {}: {}",
                operation_name, panic_msg
            )))
        }
    }
}

/// Extract the message from a panic payload.
pub(crate) fn extract_panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}
