use std::sync::Arc;

use {
    async_trait::async_trait,
    tracing::{info, warn},
};

use {
    supportbot_agents::{ChatMessage, LlmProvider, prompt::GENERAL_CHAT_PROMPT},
    supportbot_protocol::WorkerRequest,
};

use crate::worker::Worker;

/// Reply used when the reasoning call fails.
pub const GENERAL_CHAT_FALLBACK: &str = "Sorry, I'm a bit busy right now. Please try again later.";

/// Small-talk worker: one reasoning call, no tools.
pub struct GeneralChatWorker {
    provider: Arc<dyn LlmProvider>,
    fallback: String,
}

impl GeneralChatWorker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            fallback: GENERAL_CHAT_FALLBACK.into(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }
}

#[async_trait]
impl Worker for GeneralChatWorker {
    fn source(&self) -> &'static str {
        "general-chat"
    }

    async fn answer(&self, req: &WorkerRequest) -> String {
        let messages = [
            ChatMessage::system(GENERAL_CHAT_PROMPT),
            ChatMessage::user(req.question.as_str()),
        ];
        match self.provider.complete(&messages, &[]).await {
            Ok(resp) => match resp.text.filter(|t| !t.trim().is_empty()) {
                Some(text) => {
                    info!(user_id = req.user_id, "general chat answered");
                    text
                },
                None => {
                    warn!(user_id = req.user_id, "empty reply, using fallback");
                    self.fallback.clone()
                },
            },
            Err(e) => {
                warn!(user_id = req.user_id, error = %e, "reasoning call failed");
                self.fallback.clone()
            },
        }
    }
}
