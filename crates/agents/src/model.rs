use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::tool_registry::ToolDescriptor;

/// One entry of the conversation buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}

/// A tool invocation requested by a reasoning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Serialized JSON arguments, exactly as the provider produced them.
    pub arguments: String,
}

/// Reasoning provider (DashScope, or a fake in tests).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Model identifier (e.g. "qwen-plus").
    fn id(&self) -> &str;

    /// One reasoning call over the whole buffer. An error here is a transport
    /// failure; the agent loop does not retry it.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> anyhow::Result<CompletionResponse>;
}

/// Response from a reasoning call: a final answer or tool requests.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_role_tagged() {
        let v = serde_json::to_value(ChatMessage::tool("call_1", "{}")).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"role": "tool", "tool_call_id": "call_1", "content": "{}"})
        );
        let v = serde_json::to_value(ChatMessage::Assistant {
            content: None,
            tool_calls: vec![],
        })
        .unwrap();
        assert_eq!(v, serde_json::json!({"role": "assistant"}));
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage {
            input_tokens: 10,
            output_tokens: 5,
        };
        total += Usage {
            input_tokens: 1,
            output_tokens: 2,
        };
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 7);
    }
}
