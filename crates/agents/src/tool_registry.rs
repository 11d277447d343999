use std::{collections::BTreeMap, sync::Arc};

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Serialize,
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::model::ToolCall;

/// Agent-callable tool.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON-Schema-like object: `{"type":"object","properties":{..},"required":[..]}`.
    fn parameters_schema(&self) -> Value;
    /// Runs with arguments that already passed schema validation.
    async fn execute(&self, params: Value) -> Result<Value>;
}

/// What the reasoning provider is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub required: Vec<String>,
}

/// Why a tool call produced an error payload instead of a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("{tool} failed: {message}")]
    Execution { tool: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("tool name cannot be empty")]
    EmptyName,
    #[error("tool already registered: {0}")]
    Duplicate(String),
}

/// Outcome of one tool call, tagged with the call id it answers.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub outcome: Result<Value, ToolError>,
}

impl ToolResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Serialized form appended to the conversation as a tool-role entry.
    pub fn content(&self) -> String {
        match &self.outcome {
            Ok(value) => value.to_string(),
            Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
        }
    }
}

/// Registry of available tools for an agent run.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn AgentTool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        debug!(tool = %name, "tool registered");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn AgentTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors in name order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|t| {
                let parameters = t.parameters_schema();
                let required = required_keys(&parameters);
                ToolDescriptor {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters,
                    required,
                }
            })
            .collect()
    }

    /// Resolve, validate and run one requested call. Never fails: every
    /// problem becomes an error payload on the result.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let outcome = self.try_execute(call).await;
        if let Err(e) = &outcome {
            warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
        }
        ToolResult {
            call_id: call.id.clone(),
            outcome,
        }
    }

    async fn try_execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: call.name.clone(),
            reason,
        };
        let params = parse_arguments(&call.arguments).map_err(invalid)?;
        validate_arguments(&tool.parameters_schema(), &params).map_err(invalid)?;

        tool.execute(params)
            .await
            .map_err(|e| ToolError::Execution {
                tool: call.name.clone(),
                message: e.to_string(),
            })
    }
}

/// Parse serialized arguments. An empty string means `{}`.
pub fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("arguments are not valid JSON: {e}"))
}

/// Check arguments against a tool schema: object shape, required keys,
/// declared property types and enums. Undeclared keys are allowed.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let obj = args
        .as_object()
        .ok_or_else(|| "arguments must be a JSON object".to_string())?;

    for key in required_keys(schema) {
        if obj.get(&key).is_none_or(Value::is_null) {
            return Err(format!("missing required argument `{key}`"));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        let Some(prop) = properties.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(ty) = prop.get("type").and_then(Value::as_str)
            && !type_matches(ty, value)
        {
            return Err(format!("argument `{key}` must be of type {ty}"));
        }
        if let Some(allowed) = prop.get("enum").and_then(Value::as_array)
            && !allowed.contains(value)
        {
            let allowed = Value::Array(allowed.clone());
            return Err(format!("argument `{key}` must be one of {allowed}"));
        }
    }
    Ok(())
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn required_keys(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
