use std::sync::Arc;

use {async_trait::async_trait, tracing::info};

use {
    supportbot_agents::{
        AgentRunResult, LlmProvider, LoopLimits, ToolRegistry, prompt::build_system_prompt,
        run_agent_loop,
    },
    supportbot_config::AgentConfig,
    supportbot_protocol::WorkerRequest,
};

use crate::worker::Worker;

/// Tool-using worker: runs the bounded agent loop over the built-in tools.
pub struct AssistantWorker {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    limits: LoopLimits,
}

impl AssistantWorker {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, cfg: &AgentConfig) -> Self {
        let system_prompt = build_system_prompt(&tools, cfg.system_prompt.as_deref());
        Self {
            provider,
            tools,
            system_prompt,
            limits: LoopLimits::from(cfg),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub async fn run(&self, question: &str) -> AgentRunResult {
        run_agent_loop(
            Arc::clone(&self.provider),
            &self.tools,
            &self.system_prompt,
            question,
            &self.limits,
            None,
        )
        .await
    }
}

#[async_trait]
impl Worker for AssistantWorker {
    fn source(&self) -> &'static str {
        "assistant"
    }

    async fn answer(&self, req: &WorkerRequest) -> String {
        let result = self.run(&req.question).await;
        info!(
            user_id = req.user_id,
            category = req.category.as_deref().unwrap_or("-"),
            iterations = result.iterations,
            tool_calls = result.tool_calls_made,
            outcome = ?result.outcome,
            "assistant run finished"
        );
        result.text
    }
}
