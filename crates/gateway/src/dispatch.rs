//! Out-of-band classification jobs spawned for every chat message.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    async_trait::async_trait,
    tokio::{sync::Semaphore, task::JoinHandle},
    tracing::{debug, info, warn},
};

use supportbot_protocol::{AiResponseFrame, UserId};

use crate::registry::SessionRegistry;

/// One accepted chat message, handed off for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatJob {
    pub user_id: UserId,
    pub message_id: String,
    pub content: String,
}

/// Hands a chat message to whatever classifies and routes it.
#[async_trait]
pub trait ChatDispatcher: Send + Sync {
    async fn dispatch(&self, job: &ChatJob) -> anyhow::Result<()>;
}

/// Calls the classification service over HTTP.
pub struct ClassifierDispatcher {
    client: reqwest::Client,
    classifier_url: String,
}

impl ClassifierDispatcher {
    pub fn new(classifier_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            classifier_url: classifier_url.into(),
        }
    }
}

#[async_trait]
impl ChatDispatcher for ClassifierDispatcher {
    async fn dispatch(&self, job: &ChatJob) -> anyhow::Result<()> {
        let url = format!("{}/api/classify", self.classifier_url.trim_end_matches('/'));
        let uid = job.user_id.to_string();
        debug!(user_id = job.user_id, %url, "calling classifier");
        self.client
            .get(&url)
            .query(&[("question", job.content.as_str()), ("uid", uid.as_str())])
            .send()
            .await
            .context("classifier request failed")?
            .error_for_status()
            .context("classifier returned an error")?;
        info!(user_id = job.user_id, message_id = %job.message_id, "classifier accepted message");
        Ok(())
    }
}

/// Runs dispatch jobs with a bound on concurrency and on lifetime.
///
/// A job that fails or times out pushes an apology to the user, so no
/// internal failure is silent.
pub struct DispatchPool {
    dispatcher: Arc<dyn ChatDispatcher>,
    registry: Arc<SessionRegistry>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    failure_message: String,
    assistant_name: String,
}

impl DispatchPool {
    pub fn new(
        dispatcher: Arc<dyn ChatDispatcher>,
        registry: Arc<SessionRegistry>,
        max_inflight: usize,
        timeout: Duration,
    ) -> Self {
        let defaults = supportbot_config::GatewayConfig::default();
        Self {
            dispatcher,
            registry,
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
            timeout,
            failure_message: defaults.dispatch_failure_message,
            assistant_name: defaults.assistant_name,
        }
    }

    pub fn from_config(
        dispatcher: Arc<dyn ChatDispatcher>,
        registry: Arc<SessionRegistry>,
        cfg: &supportbot_config::GatewayConfig,
    ) -> Self {
        Self::new(
            dispatcher,
            registry,
            cfg.max_inflight_dispatches,
            cfg.dispatch_timeout(),
        )
        .with_failure_message(cfg.dispatch_failure_message.clone(), cfg.assistant_name.clone())
    }

    pub fn with_failure_message(mut self, message: String, sender_name: String) -> Self {
        self.failure_message = message;
        self.assistant_name = sender_name;
        self
    }

    /// Jobs currently allowed to start before the pool is saturated.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn a job. Returns immediately; the caller need not join it.
    pub fn submit(&self, job: ChatJob) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);
        let timeout = self.timeout;
        let failure = AiResponseFrame::new(self.failure_message.clone(), self.assistant_name.clone());

        tokio::spawn(async move {
            // The timeout covers queueing for a permit as well as the call.
            let run = async {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .context("dispatch pool closed")?;
                dispatcher.dispatch(&job).await
            };
            let error = match tokio::time::timeout(timeout, run).await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}s", timeout.as_secs()),
            };
            warn!(
                user_id = job.user_id,
                message_id = %job.message_id,
                error = %error,
                "chat dispatch failed"
            );
            if let Err(e) = registry.send_json(job.user_id, &failure).await {
                warn!(user_id = job.user_id, error = %e, "could not deliver dispatch failure notice");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::session::TransportHandle,
        std::sync::Mutex,
        supportbot_protocol::{OutboundMessage, decode_outbound},
    };

    struct Recording {
        jobs: Mutex<Vec<ChatJob>>,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl ChatDispatcher for Recording {
        async fn dispatch(&self, job: &ChatJob) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.jobs.lock().unwrap().push(job.clone());
            if self.fail {
                anyhow::bail!("classifier down");
            }
            Ok(())
        }
    }

    fn job(user_id: UserId) -> ChatJob {
        ChatJob {
            user_id,
            message_id: "m1".into(),
            content: "hello".into(),
        }
    }

    #[tokio::test]
    async fn successful_job_sends_nothing() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, mut rx) = TransportHandle::channel();
        registry.register(1, handle, "s1".into(), None).await;
        let dispatcher = Arc::new(Recording {
            jobs: Mutex::new(Vec::new()),
            fail: false,
            delay: Duration::ZERO,
        });
        let pool = DispatchPool::new(dispatcher.clone(), registry, 4, Duration::from_secs(5));

        pool.submit(job(1)).await.unwrap();
        assert_eq!(dispatcher.jobs.lock().unwrap().as_slice(), &[job(1)]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_pushes_apology() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, mut rx) = TransportHandle::channel();
        registry.register(1, handle, "s1".into(), None).await;
        let dispatcher = Arc::new(Recording {
            jobs: Mutex::new(Vec::new()),
            fail: true,
            delay: Duration::ZERO,
        });
        let pool = DispatchPool::new(dispatcher, registry, 4, Duration::from_secs(5))
            .with_failure_message("busy".into(), "Bot".into());

        pool.submit(job(1)).await.unwrap();
        let frame = rx.recv().await.unwrap();
        let OutboundMessage::AiResponse(ai) = decode_outbound(&frame).unwrap() else {
            panic!("expected AI_RESPONSE, got {frame}");
        };
        assert_eq!(ai.content, "busy");
        assert_eq!(ai.sender_name, "Bot");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_job_times_out() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, mut rx) = TransportHandle::channel();
        registry.register(1, handle, "s1".into(), None).await;
        let dispatcher = Arc::new(Recording {
            jobs: Mutex::new(Vec::new()),
            fail: false,
            delay: Duration::from_secs(120),
        });
        let pool = DispatchPool::new(dispatcher.clone(), registry, 4, Duration::from_secs(60));

        pool.submit(job(1)).await.unwrap();
        assert!(dispatcher.jobs.lock().unwrap().is_empty());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn classifier_dispatcher_calls_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/classify")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("question".into(), "where is my order".into()),
                mockito::Matcher::UrlEncoded("uid".into(), "42".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"category":"order.status","confidence":0.9,"description":""}"#)
            .create_async()
            .await;

        let dispatcher = ClassifierDispatcher::new(server.url());
        dispatcher
            .dispatch(&ChatJob {
                user_id: 42,
                message_id: "m1".into(),
                content: "where is my order".into(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn classifier_error_status_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/classify")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let dispatcher = ClassifierDispatcher::new(server.url());
        assert!(dispatcher.dispatch(&job(1)).await.is_err());
    }
}
