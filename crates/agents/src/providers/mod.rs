//! Reasoning providers.

pub mod dashscope;

use std::sync::Arc;

use supportbot_config::LlmConfig;

use crate::model::LlmProvider;

pub use dashscope::DashScopeProvider;

/// Build the configured provider. Fails when the provider is unknown or a
/// required credential is missing.
pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    match cfg.provider.as_str() {
        "dashscope" => Ok(Arc::new(DashScopeProvider::from_config(cfg)?)),
        other => anyhow::bail!("unsupported llm provider: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let cfg = LlmConfig {
            provider: "nope".into(),
            ..Default::default()
        };
        assert!(from_config(&cfg).is_err());
    }

    #[test]
    fn missing_key_is_rejected() {
        let cfg = LlmConfig::default();
        assert!(from_config(&cfg).is_err());
    }
}
