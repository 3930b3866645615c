//! Lazily-constructed shared resources (loaded models and the like).
//!
//! Per key the state is Uninitialized (absent), Initializing (a watch channel
//! the waiters subscribe to) or Ready (the handle). Only one constructor runs
//! per key at a time and no lock is held while it runs.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

use crate::types::{Error, Result};

type Handle = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
enum InitState {
    Pending,
    Ready(Handle),
    Failed(String),
}

enum Slot {
    Initializing(watch::Receiver<InitState>),
    Ready(Handle),
}

enum Action {
    Use(Handle),
    Wait(watch::Receiver<InitState>),
    Construct(watch::Sender<InitState>),
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Keyed, duplicate-suppressing initializer for expensive shared handles.
///
/// Different keys may hold different types; handles come back as `Arc<T>`.
#[derive(Clone, Default)]
pub struct ResourceGuard {
    slots: Slots,
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = lock(&self.slots);
        let mut keys: Vec<_> = slots.keys().cloned().collect();
        keys.sort();
        f.debug_struct("ResourceGuard").field("keys", &keys).finish()
    }
}

impl ResourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the resource under `key`, constructing it if needed.
    ///
    /// Concurrent callers for the same key wait for the running constructor
    /// and get the same `Arc`. A failed construction is reported to all of
    /// them and the key goes back to uninitialized, so the next call retries.
    pub async fn get_or_init<T, F, Fut>(&self, key: &str, constructor: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut constructor = Some(constructor);
        loop {
            let action = {
                let mut slots = lock(&self.slots);
                match slots.get(key) {
                    Some(Slot::Ready(handle)) => Action::Use(handle.clone()),
                    Some(Slot::Initializing(rx)) => Action::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(InitState::Pending);
                        slots.insert(key.to_string(), Slot::Initializing(rx));
                        Action::Construct(tx)
                    }
                }
            };

            match action {
                Action::Use(handle) => return downcast(key, handle),
                Action::Construct(tx) => {
                    let Some(constructor) = constructor.take() else {
                        return Err(Error::internal(format!(
                            "resource '{}' constructor already consumed",
                            key
                        )));
                    };
                    return self.construct(key, tx, constructor).await;
                }
                Action::Wait(mut rx) => {
                    tracing::debug!(resource = key, "waiting for resource construction");
                    let state = rx
                        .wait_for(|state| !matches!(state, InitState::Pending))
                        .await
                        .map(|state| state.clone());
                    match state {
                        Ok(InitState::Ready(handle)) => return downcast(key, handle),
                        Ok(InitState::Failed(reason)) => {
                            return Err(Error::construction_failed(key, reason))
                        }
                        // Constructor abandoned (caller cancelled or panicked); try again.
                        Ok(InitState::Pending) | Err(_) => continue,
                    }
                }
            }
        }
    }

    async fn construct<T, F, Fut>(
        &self,
        key: &str,
        tx: watch::Sender<InitState>,
        constructor: F,
    ) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut reset = ResetOnDrop {
            slots: self.slots.clone(),
            key: key.to_string(),
            armed: true,
        };
        tracing::info!(resource = key, "constructing shared resource");
        let started = Instant::now();

        match constructor().await {
            Ok(value) => {
                let typed = Arc::new(value);
                let handle: Handle = typed.clone();
                lock(&self.slots).insert(key.to_string(), Slot::Ready(handle.clone()));
                reset.armed = false;
                tx.send_replace(InitState::Ready(handle));
                tracing::info!(
                    resource = key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "shared resource ready"
                );
                Ok(typed)
            }
            Err(err) => {
                let reason = match err {
                    Error::ResourceConstructionFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                lock(&self.slots).remove(key);
                reset.armed = false;
                tx.send_replace(InitState::Failed(reason.clone()));
                tracing::warn!(resource = key, "shared resource construction failed: {}", reason);
                Err(Error::construction_failed(key, reason))
            }
        }
    }

    /// Return the resource if it is already constructed.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        match lock(&self.slots).get(key) {
            Some(Slot::Ready(handle)) => handle.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn is_ready(&self, key: &str) -> bool {
        matches!(lock(&self.slots).get(key), Some(Slot::Ready(_)))
    }

    /// Number of keys that are initializing or ready.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Puts the key back to uninitialized if construction never reached a verdict.
struct ResetOnDrop {
    slots: Slots,
    key: String,
    armed: bool,
}

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(resource = %self.key, "resource construction abandoned");
            let mut slots = lock(&self.slots);
            if matches!(slots.get(&self.key), Some(Slot::Initializing(_))) {
                slots.remove(&self.key);
            }
        }
    }
}

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

fn downcast<T: Send + Sync + 'static>(key: &str, handle: Handle) -> Result<Arc<T>> {
    handle.downcast::<T>().map_err(|_| {
        Error::internal(format!(
            "resource '{}' holds a different type than {}",
            key,
            std::any::type_name::<T>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Model {
        name: String,
    }

    #[tokio::test]
    async fn test_concurrent_first_use_constructs_once() {
        let guard = ResourceGuard::new();
        let constructions = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            let constructions = constructions.clone();
            tasks.push(tokio::spawn(async move {
                guard
                    .get_or_init("model-x", || async move {
                        constructions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(Model {
                            name: "model-x".to_string(),
                        })
                    })
                    .await
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle));
        }
        assert_eq!(handles[0].name, "model-x");
        assert!(guard.is_ready("model-x"));
    }

    #[tokio::test]
    async fn test_failure_reaches_waiters_and_allows_retry() {
        let guard = ResourceGuard::new();

        let g = guard.clone();
        let first = tokio::spawn(async move {
            g.get_or_init::<Model, _, _>("clip", || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(Error::internal("no device"))
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waiter = guard
            .get_or_init::<Model, _, _>("clip", || async {
                Ok(Model {
                    name: "never".to_string(),
                })
            })
            .await;

        for result in [first.await.unwrap(), waiter] {
            match result {
                Err(Error::ResourceConstructionFailed { key, reason }) => {
                    assert_eq!(key, "clip");
                    assert!(reason.contains("no device"));
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
        assert!(guard.is_empty());

        let retried = guard
            .get_or_init("clip", || async {
                Ok(Model {
                    name: "clip".to_string(),
                })
            })
            .await
            .unwrap();
        assert_eq!(retried.name, "clip");
    }

    #[tokio::test]
    async fn test_cancelled_constructor_hands_over_to_waiter() {
        let guard = ResourceGuard::new();

        let g = guard.clone();
        let abandoned = tokio::spawn(async move {
            g.get_or_init::<Model, _, _>("upscaler", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Model {
                    name: "slow".to_string(),
                })
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let g = guard.clone();
        let waiter = tokio::spawn(async move {
            g.get_or_init("upscaler", || async {
                Ok(Model {
                    name: "fast".to_string(),
                })
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();

        let model = waiter.await.unwrap().unwrap();
        assert_eq!(model.name, "fast");
    }

    #[tokio::test]
    async fn test_type_mismatch_is_internal_error() {
        let guard = ResourceGuard::new();
        guard.get_or_init("n", || async { Ok(7u32) }).await.unwrap();

        let err = guard
            .get_or_init::<String, _, _>("n", || async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(*guard.get::<u32>("n").unwrap(), 7);
        assert!(guard.get::<u32>("missing").is_none());
    }
}
