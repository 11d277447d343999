//! Bounded tool-calling agent: reasoning providers, the tool registry and the
//! loop that connects them.

pub mod model;
pub mod prompt;
pub mod providers;
pub mod runner;
pub mod tool_registry;

pub use {
    model::{ChatMessage, CompletionResponse, LlmProvider, ToolCall, Usage},
    runner::{
        AbortReason, AgentRunResult, LoopLimits, LoopOutcome, OnEvent, RunnerEvent,
        run_agent_loop,
    },
    tool_registry::{AgentTool, RegistryError, ToolDescriptor, ToolError, ToolRegistry, ToolResult},
};
