use std::sync::Arc;

use {tokio::time::Instant, tokio_util::sync::CancellationToken};

use supportbot_config::SupportbotConfig;

use crate::{
    dispatch::{ChatDispatcher, ClassifierDispatcher, DispatchPool},
    heartbeat::HeartbeatMonitor,
    registry::SessionRegistry,
    router::MessageRouter,
};

/// Everything the gateway's handlers share.
pub struct GatewayState {
    pub service_name: String,
    pub assistant_name: String,
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<MessageRouter>,
    pub heartbeat: HeartbeatMonitor,
    /// Cancelled on shutdown; stops the monitor and every connection task.
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl GatewayState {
    /// State wired to the classifier named in `config.services`.
    pub fn from_config(config: &SupportbotConfig) -> Arc<Self> {
        let dispatcher = Arc::new(ClassifierDispatcher::new(
            config.services.classifier.clone(),
        ));
        Self::with_dispatcher(config, dispatcher)
    }

    /// State with a caller-supplied dispatcher, for embedding and tests.
    pub fn with_dispatcher(
        config: &SupportbotConfig,
        dispatcher: Arc<dyn ChatDispatcher>,
    ) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let pool = Arc::new(DispatchPool::from_config(
            dispatcher,
            Arc::clone(&registry),
            &config.gateway,
        ));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            pool,
            config.gateway.ack_message.clone(),
        ));
        Arc::new(Self {
            service_name: format!("{}-gateway", config.server.name),
            assistant_name: config.gateway.assistant_name.clone(),
            registry,
            router,
            heartbeat: HeartbeatMonitor::from_config(&config.heartbeat),
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
