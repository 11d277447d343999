use std::time::Duration;

use {
    anyhow::Context,
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::debug,
};

use supportbot_config::LlmConfig;

use crate::{
    model::{ChatMessage, CompletionResponse, LlmProvider, ToolCall, Usage},
    tool_registry::ToolDescriptor,
};

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";
const GENERATION_PATH: &str = "/api/v1/services/aigc/text-generation/generation";

/// Alibaba DashScope (Qwen) text-generation API.
pub struct DashScopeProvider {
    model: String,
    base_url: String,
    api_key: Secret<String>,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl DashScopeProvider {
    pub fn new(api_key: Secret<String>, model: String) -> Self {
        Self {
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            temperature: 0.7,
            max_tokens: 2000,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let key = cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("llm.api_key is not set (set it in the config file or DASHSCOPE_API_KEY)")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            model: cfg.model.clone(),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: Secret::new(key.to_string()),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tools: &'a [ToolDescriptor],
    ) -> GenerationRequest<'a> {
        GenerationRequest {
            model: &self.model,
            input: Input {
                messages: messages.iter().map(WireMessage::from).collect(),
            },
            parameters: Parameters {
                result_format: "message",
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tool_choice: (!tools.is_empty()).then_some("auto"),
                tools: tools.iter().map(WireTool::from).collect(),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for DashScopeProvider {
    fn name(&self) -> &str {
        "dashscope"
    }

    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> anyhow::Result<CompletionResponse> {
        let body = self.request_body(messages, tools);
        let url = format!("{}{GENERATION_PATH}", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "dashscope request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("dashscope request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("dashscope returned {status}: {text}");
        }

        let parsed: GenerationResponse = resp
            .json()
            .await
            .context("failed to decode dashscope response")?;
        Ok(parsed.into_completion())
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: Input<'a>,
    parameters: Parameters<'a>,
}

#[derive(Serialize)]
struct Input<'a> {
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct Parameters<'a> {
    result_format: &'static str,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        let role = msg.role();
        match msg {
            ChatMessage::System { content } | ChatMessage::User { content } => Self {
                role,
                content,
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => Self {
                role,
                content: content.as_deref().unwrap_or(""),
                tool_calls: tool_calls.iter().map(WireToolCall::from).collect(),
                tool_call_id: None,
            },
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => Self {
                role,
                content,
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id.as_str()),
            },
        }
    }
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef<'a>,
}

#[derive(Serialize)]
struct WireFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDescriptor> for WireTool<'a> {
    fn from(d: &'a ToolDescriptor) -> Self {
        Self {
            kind: "function",
            function: WireFunctionDef {
                name: &d.name,
                description: &d.description,
                parameters: &d.parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".into()
}

impl From<&ToolCall> for WireToolCall {
    fn from(tc: &ToolCall) -> Self {
        Self {
            id: tc.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            },
        }
    }
}

#[derive(Deserialize, Default)]
struct GenerationResponse {
    #[serde(default)]
    output: Output,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize, Default)]
struct Output {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl GenerationResponse {
    fn into_completion(self) -> CompletionResponse {
        let usage = Usage {
            input_tokens: self.usage.input_tokens,
            output_tokens: self.usage.output_tokens,
        };
        let (content, wire_calls) = match self.output.choices.into_iter().next() {
            Some(choice) => (choice.message.content, choice.message.tool_calls),
            None => (None, Vec::new()),
        };
        // `text` is set in the plain result format; `choices` in message format.
        let text = self
            .output
            .text
            .filter(|t| !t.is_empty())
            .or(content);
        let tool_calls = wire_calls
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCall {
                id: if tc.id.is_empty() {
                    format!("call_{i}")
                } else {
                    tc.id
                },
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();
        CompletionResponse {
            text,
            tool_calls,
            usage,
        }
    }
}
