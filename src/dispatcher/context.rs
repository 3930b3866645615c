//! Handle given to extension logic.

use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::intent::{Intent, IntentCorrelator};
use crate::offload::{OffloadPool, OffloadTask};
use crate::protocol::{ExtensionMessage, LogLevel, LogMessage};
use crate::resource::ResourceGuard;
use crate::transport::Outbound;
use crate::types::{ExtensionId, InstanceId, Result};

#[derive(Debug)]
struct ContextInner {
    extension_id: ExtensionId,
    instance_id: InstanceId,
    outbound: Outbound,
    intents: IntentCorrelator,
    resources: ResourceGuard,
    offload: OffloadPool,
    settings: RwLock<Value>,
    cache_dir: Option<PathBuf>,
}

/// Everything a handler may do: launch intents, use shared resources,
/// offload blocking work, and talk to the host.
///
/// Cheap to clone; every handler gets its own clone.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(
        extension_id: ExtensionId,
        outbound: Outbound,
        intents: IntentCorrelator,
        offload: OffloadPool,
        cache_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                extension_id,
                instance_id: InstanceId::new(),
                outbound,
                intents,
                resources: ResourceGuard::new(),
                offload,
                settings: RwLock::new(Value::Null),
                cache_dir,
            }),
        }
    }

    /// Launch an intent and wait for the host's answer.
    pub async fn send_intent<I: Intent>(&self, intent: I) -> Result<Value> {
        let kind = intent.kind();
        let payload = intent.into_payload()?;
        self.inner.intents.send(kind, payload).await
    }

    /// Launch an intent, giving up after `timeout`.
    pub async fn send_intent_with_timeout<I: Intent>(
        &self,
        intent: I,
        timeout: Duration,
    ) -> Result<Value> {
        let kind = intent.kind();
        let payload = intent.into_payload()?;
        self.inner
            .intents
            .send_with_timeout(kind, payload, timeout)
            .await
    }

    /// Get or lazily construct the shared resource under `key`.
    pub async fn get_resource<T, F, Fut>(&self, key: &str, constructor: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.inner.resources.get_or_init(key, constructor).await
    }

    /// Run `work` on the offload pool.
    pub fn offload<T, F>(&self, work: F) -> OffloadTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.inner.offload.submit(work)
    }

    /// Send a log line to the host (and to the local subscriber).
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(target: "extension", "{}", message),
            LogLevel::Info => tracing::info!(target: "extension", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "extension", "{}", message),
            LogLevel::Error => tracing::error!(target: "extension", "{}", message),
        }
        self.inner
            .outbound
            .send(ExtensionMessage::Log(LogMessage::new(level, message)))
            .await
    }

    /// Push a free-form notification to the host UI.
    pub async fn notify(&self, value: Value) -> Result<()> {
        self.inner
            .outbound
            .send(ExtensionMessage::Notification(value))
            .await
    }

    /// Latest `extension.settings` payload, `Null` until one arrived.
    pub async fn settings(&self) -> Value {
        self.inner.settings.read().await.clone()
    }

    pub(crate) async fn store_settings(&self, settings: Value) {
        *self.inner.settings.write().await = settings;
    }

    pub fn extension_id(&self) -> &ExtensionId {
        &self.inner.extension_id
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.inner.instance_id
    }

    /// Directory for model files, if configured.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.inner.cache_dir.as_deref()
    }

    pub fn intents(&self) -> &IntentCorrelator {
        &self.inner.intents
    }

    pub fn resources(&self) -> &ResourceGuard {
        &self.inner.resources
    }

    pub fn offload_pool(&self) -> &OffloadPool {
        &self.inner.offload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::DialogIntent;
    use crate::protocol::IntentReply;
    use crate::transport::in_memory;
    use serde_json::json;

    fn context() -> (Context, crate::transport::HostEndpoint) {
        let (transport, host) = in_memory(16);
        let (outbound, _inbound) = transport.into_parts();
        let intents = IntentCorrelator::new(outbound.clone(), None);
        let ctx = Context::new(
            ExtensionId::from_string("ext".to_string()).unwrap(),
            outbound,
            intents,
            OffloadPool::new(1),
            Some(PathBuf::from("/tmp/models")),
        );
        (ctx, host)
    }

    #[tokio::test]
    async fn test_send_intent_uses_typed_payload() {
        let (ctx, mut host) = context();

        let c = ctx.clone();
        let caller = tokio::spawn(async move {
            c.send_intent(DialogIntent::question("Dialog", "Proceed?", "Yes", "No"))
                .await
        });

        let request = host.next_intent().await.unwrap();
        assert_eq!(request.payload["type"], json!("question"));
        ctx.intents()
            .resolve(IntentReply::success(request.correlation_id, json!(true)))
            .await;
        assert_eq!(caller.await.unwrap().unwrap(), json!(true));
    }

    #[tokio::test]
    async fn test_log_and_notify_reach_host() {
        let (ctx, mut host) = context();

        ctx.log(LogLevel::Warn, "low memory").await.unwrap();
        ctx.notify(json!({"key": "value"})).await.unwrap();

        match host.recv().await.unwrap() {
            ExtensionMessage::Log(log) => {
                assert_eq!(log.level, LogLevel::Warn);
                assert_eq!(log.message, "low memory");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(
            host.recv().await.unwrap(),
            ExtensionMessage::Notification(json!({"key": "value"}))
        );
    }

    #[tokio::test]
    async fn test_settings_and_cache_dir() {
        let (ctx, _host) = context();
        assert_eq!(ctx.settings().await, Value::Null);
        ctx.store_settings(json!({"threshold": 0.4})).await;
        assert_eq!(ctx.settings().await["threshold"], json!(0.4));
        assert_eq!(ctx.cache_dir(), Some(Path::new("/tmp/models")));
        assert_eq!(ctx.extension_id().as_str(), "ext");
    }
}
