/// Config schema types (server, heartbeat, gateway, client, agent, llm,
/// services, categories).
use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportbotConfig {
    pub server: ServerConfig,
    pub heartbeat: HeartbeatConfig,
    pub gateway: GatewayConfig,
    pub client: ClientConfig,
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub services: ServicesConfig,
    /// Classification categories keyed by label.
    pub categories: CategoriesConfig,
}

impl SupportbotConfig {
    /// Worker endpoint a category routes to: the explicit `route` if set,
    /// otherwise the default endpoint of the category's worker.
    pub fn route_for(&self, label: &str) -> Option<String> {
        let category = self.categories.get(label)?;
        if let Some(route) = &category.route {
            return Some(route.clone());
        }
        let base = match category.worker {
            WorkerKind::Assistant => &self.services.assistant,
            WorkerKind::GeneralChat => &self.services.general_chat,
            WorkerKind::KnowledgeRag => &self.services.knowledge_rag,
        };
        Some(format!(
            "{}{}",
            base.trim_end_matches('/'),
            category.worker.path()
        ))
    }
}

/// Listening addresses and service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub gateway_port: u16,
    pub classifier_port: u16,
    pub assistant_port: u16,
    pub general_chat_port: u16,
    /// Reported by health probes.
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            gateway_port: 8080,
            classifier_port: 8081,
            assistant_port: 8082,
            general_chat_port: 8083,
            name: "supportbot".into(),
        }
    }
}

/// Heartbeat monitor timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Period of the liveness scan.
    pub interval_secs: u64,
    /// A session is late once this much time has passed since its last beat.
    pub timeout_secs: u64,
    /// Consecutive late scans before eviction.
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 60,
            max_missed: 3,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Gateway behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Text of the immediate acknowledgement for chat messages.
    pub ack_message: String,
    /// Upper bound on the lifetime of one classify/dispatch job.
    pub dispatch_timeout_secs: u64,
    /// Maximum number of dispatch jobs running at once.
    pub max_inflight_dispatches: usize,
    /// `senderName` on answers pushed to users.
    pub assistant_name: String,
    /// Pushed to the user when the classifier cannot be reached.
    pub dispatch_failure_message: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ack_message: "Message received, processing...".into(),
            dispatch_timeout_secs: 60,
            max_inflight_dispatches: 64,
            assistant_name: "AI Assistant".into(),
            dispatch_failure_message:
                "Sorry, the service is busy right now. Please try again later.".into(),
        }
    }
}

impl GatewayConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

/// Interactive WebSocket client behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long to wait for a correlated acknowledgement.
    pub response_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 30,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Bounded tool-calling agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of reasoning iterations per run.
    pub max_iterations: usize,
    /// Answer used when a run aborts.
    pub fallback_message: String,
    /// Replaces the built-in assistant system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            fallback_message: "Sorry, something went wrong while handling your request.".into(),
            system_prompt: None,
        }
    }
}

/// Reasoning provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name. Only "dashscope" is built in.
    pub provider: String,
    /// API key (the `DASHSCOPE_API_KEY` env var fills it when empty).
    pub api_key: Option<String>,
    pub model: String,
    /// Override the base URL.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "dashscope".into(),
            api_key: None,
            model: "qwen-plus".into(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 2000,
            request_timeout_secs: 60,
        }
    }
}

/// Base URLs of the cooperating services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub gateway: String,
    pub classifier: String,
    pub assistant: String,
    pub general_chat: String,
    pub knowledge_rag: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            gateway: "http://127.0.0.1:8080".into(),
            classifier: "http://127.0.0.1:8081".into(),
            assistant: "http://127.0.0.1:8082".into(),
            general_chat: "http://127.0.0.1:8083".into(),
            knowledge_rag: "http://127.0.0.1:8084".into(),
        }
    }
}

/// Which worker handles a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    Assistant,
    GeneralChat,
    KnowledgeRag,
}

impl WorkerKind {
    /// Request path of the worker's job endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Self::Assistant => "/api/process",
            Self::GeneralChat => "/api/chat",
            Self::KnowledgeRag => "/api/rag",
        }
    }
}

/// One classification category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Human-readable name.
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub worker: WorkerKind,
    /// Explicit worker endpoint, overriding the one derived from `services`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

/// Category table. Ordered by label so prompts and matching are stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoriesConfig(pub BTreeMap<String, CategoryConfig>);

/// Label used when nothing else matches.
pub const DEFAULT_CATEGORY: &str = "general-chat";

impl Default for CategoriesConfig {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        let mut add = |label: &str, name: &str, description: &str, keywords: &[&str], worker| {
            map.insert(label.to_string(), CategoryConfig {
                name: name.into(),
                description: description.into(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                worker,
                route: None,
            });
        };
        add(
            "product.inquiry",
            "Product inquiry",
            "Product information, stock, prices",
            &["product", "stock", "price", "detail"],
            WorkerKind::Assistant,
        );
        add(
            "order.status",
            "Order status",
            "Order status, shipping and delivery",
            &["order", "shipping", "delivery", "tracking"],
            WorkerKind::Assistant,
        );
        add(
            "knowledge.query",
            "Knowledge base",
            "Product manuals, how-to questions, FAQ",
            &["how to", "how do", "manual", "guide"],
            WorkerKind::KnowledgeRag,
        );
        add(
            DEFAULT_CATEGORY,
            "General chat",
            "Small talk, greetings and other general conversation",
            &["hello", "hi", "thanks"],
            WorkerKind::GeneralChat,
        );
        Self(map)
    }
}

impl CategoriesConfig {
    pub fn get(&self, label: &str) -> Option<&CategoryConfig> {
        self.0.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CategoryConfig)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let cfg = SupportbotConfig::default();
        assert_eq!(cfg.heartbeat.interval_secs, 30);
        assert_eq!(cfg.heartbeat.timeout_secs, 60);
        assert_eq!(cfg.heartbeat.max_missed, 3);
        assert_eq!(cfg.agent.max_iterations, 5);
        assert_eq!(cfg.client.response_timeout_secs, 30);
        assert_eq!(cfg.categories.0.len(), 4);
    }

    #[test]
    fn routes_follow_services() {
        let mut cfg = SupportbotConfig::default();
        cfg.services.assistant = "http://assistant:9000/".into();
        assert_eq!(
            cfg.route_for("order.status").as_deref(),
            Some("http://assistant:9000/api/process")
        );
        assert_eq!(
            cfg.route_for("general-chat").as_deref(),
            Some("http://127.0.0.1:8083/api/chat")
        );
        assert_eq!(cfg.route_for("missing"), None);
    }

    #[test]
    fn explicit_route_wins() {
        let mut cfg = SupportbotConfig::default();
        if let Some(c) = cfg.categories.0.get_mut("knowledge.query") {
            c.route = Some("http://rag/custom".into());
        }
        assert_eq!(
            cfg.route_for("knowledge.query").as_deref(),
            Some("http://rag/custom")
        );
    }
}
