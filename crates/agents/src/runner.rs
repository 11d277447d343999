use std::sync::Arc;

use {
    futures::future::join_all,
    tracing::{debug, info, warn},
};

use crate::{
    model::{ChatMessage, LlmProvider, Usage},
    tool_registry::ToolRegistry,
};

/// Default number of reasoning iterations before giving up.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Default answer when a run aborts.
pub const DEFAULT_FALLBACK: &str = "Sorry, something went wrong while handling your request.";

/// Budget and fallback for one run.
#[derive(Debug, Clone)]
pub struct LoopLimits {
    pub max_iterations: usize,
    pub fallback_message: String,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            fallback_message: DEFAULT_FALLBACK.into(),
        }
    }
}

impl From<&supportbot_config::AgentConfig> for LoopLimits {
    fn from(cfg: &supportbot_config::AgentConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations.max(1),
            fallback_message: cfg.fallback_message.clone(),
        }
    }
}

/// Why a run ended without a final answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortReason {
    #[error("reasoning transport failure: {0}")]
    ReasoningTransportFailure(String),
    #[error("iteration budget exhausted")]
    IterationBudgetExhausted,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Done,
    Aborted(AbortReason),
}

/// Result of running the agent loop.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    /// Final answer, or the fallback message when aborted.
    pub text: String,
    pub outcome: LoopOutcome,
    /// Reasoning calls made.
    pub iterations: usize,
    pub tool_calls_made: usize,
    pub usage: Usage,
}

impl AgentRunResult {
    pub fn is_done(&self) -> bool {
        self.outcome == LoopOutcome::Done
    }
}

/// Callback for streaming events out of the runner.
pub type OnEvent = Box<dyn Fn(RunnerEvent) + Send + Sync>;

/// Events emitted during the agent run.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Iteration(usize),
    ToolCallStart {
        id: String,
        name: String,
    },
    ToolCallEnd {
        id: String,
        name: String,
        success: bool,
    },
    Finished(LoopOutcome),
}

/// Run the agent loop: send the buffer to the provider, execute requested
/// tools, repeat until a final answer or the budget runs out.
///
/// Never returns an error. Tool failures are fed back to the provider as
/// data; provider failures and budget exhaustion end the run with the
/// fallback text.
pub async fn run_agent_loop(
    provider: Arc<dyn LlmProvider>,
    tools: &ToolRegistry,
    system_prompt: &str,
    user_message: &str,
    limits: &LoopLimits,
    on_event: Option<&OnEvent>,
) -> AgentRunResult {
    let emit = |event: RunnerEvent| {
        if let Some(cb) = on_event {
            cb(event);
        }
    };
    let descriptors = tools.descriptors();

    let mut messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_message),
    ];

    let mut iterations = 0;
    let mut total_tool_calls = 0;
    let mut usage = Usage::default();

    let finish = |text: String, outcome: LoopOutcome, iterations, tool_calls_made, usage| {
        emit(RunnerEvent::Finished(outcome.clone()));
        AgentRunResult {
            text,
            outcome,
            iterations,
            tool_calls_made,
            usage,
        }
    };

    while iterations < limits.max_iterations {
        iterations += 1;
        emit(RunnerEvent::Iteration(iterations));
        debug!(iteration = iterations, messages = messages.len(), "calling LLM");

        let response = match provider.complete(&messages, &descriptors).await {
            Ok(r) => r,
            Err(e) => {
                warn!(iteration = iterations, provider = provider.name(), error = %e, "LLM call failed");
                return finish(
                    limits.fallback_message.clone(),
                    LoopOutcome::Aborted(AbortReason::ReasoningTransportFailure(e.to_string())),
                    iterations,
                    total_tool_calls,
                    usage,
                );
            },
        };
        usage += response.usage;

        // No tool calls: this is the final answer.
        if response.tool_calls.is_empty() {
            let text = response
                .text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| limits.fallback_message.clone());
            info!(iterations, tool_calls = total_tool_calls, "agent loop complete");
            return finish(text, LoopOutcome::Done, iterations, total_tool_calls, usage);
        }

        debug!(
            iteration = iterations,
            count = response.tool_calls.len(),
            "LLM requested tools"
        );
        let calls = response.tool_calls;
        messages.push(ChatMessage::Assistant {
            content: response.text,
            tool_calls: calls.clone(),
        });

        for tc in &calls {
            emit(RunnerEvent::ToolCallStart {
                id: tc.id.clone(),
                name: tc.name.clone(),
            });
        }
        let results = join_all(calls.iter().map(|tc| tools.execute(tc))).await;
        total_tool_calls += calls.len();

        // join_all preserves request order.
        for (tc, result) in calls.iter().zip(results) {
            emit(RunnerEvent::ToolCallEnd {
                id: tc.id.clone(),
                name: tc.name.clone(),
                success: result.is_ok(),
            });
            messages.push(ChatMessage::tool(result.call_id.clone(), result.content()));
        }
    }

    warn!(
        max_iterations = limits.max_iterations,
        tool_calls = total_tool_calls,
        "agent loop exceeded max iterations"
    );
    finish(
        limits.fallback_message.clone(),
        LoopOutcome::Aborted(AbortReason::IterationBudgetExhausted),
        iterations,
        total_tool_calls,
        usage,
    )
}
