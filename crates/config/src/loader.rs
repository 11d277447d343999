use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::SupportbotConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "supportbot.toml",
    "supportbot.yaml",
    "supportbot.yml",
    "supportbot.json",
];

/// Env var that fills `llm.api_key` when the file leaves it empty.
const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<SupportbotConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load the config every service binary starts from.
///
/// An explicit path must load. Otherwise the standard locations are searched:
/// 1. `./supportbot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/supportbot/supportbot.{toml,yaml,yml,json}` (user-global)
///
/// A discovered file that fails to parse is logged and replaced by defaults.
/// Env overrides are applied last.
pub fn discover_and_load(explicit: Option<&Path>) -> anyhow::Result<SupportbotConfig> {
    let mut config = match explicit {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => match find_config_file() {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                load_config(&path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                    SupportbotConfig::default()
                })
            },
            None => {
                debug!("no config file found, using defaults");
                SupportbotConfig::default()
            },
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(p) = find_in(Path::new(".")) {
        return Some(p);
    }
    config_dir().and_then(|dir| find_in(&dir))
}

/// Returns `~/.config/supportbot/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("supportbot"))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn apply_env_overrides(config: &mut SupportbotConfig, lookup: impl Fn(&str) -> Option<String>) {
    let missing = config
        .llm
        .api_key
        .as_deref()
        .is_none_or(|k| k.trim().is_empty());
    if missing && let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
        config.llm.api_key = Some(key);
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<SupportbotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::schema::WorkerKind, std::io::Write};

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "supportbot.toml",
            "[heartbeat]\ninterval_secs = 5\n\n[agent]\nmax_iterations = 3\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.heartbeat.interval_secs, 5);
        assert_eq!(cfg.heartbeat.max_missed, 3);
        assert_eq!(cfg.agent.max_iterations, 3);
        assert_eq!(cfg.server.gateway_port, 8080);
    }

    #[test]
    fn loads_yaml_categories() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "supportbot.yaml",
            "categories:\n  refund:\n    name: Refunds\n    description: Refund requests\n    keywords: [refund]\n    worker: assistant\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.categories.0.len(), 1);
        let refund = cfg.categories.get("refund").unwrap();
        assert_eq!(refund.worker, WorkerKind::Assistant);
        assert_eq!(refund.keywords, vec!["refund".to_string()]);
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "supportbot.json",
            r#"{"llm": {"model": "qwen-max", "api_key": "sk-file"}}"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.llm.model, "qwen-max");
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "supportbot.ini", "x=1");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_and_load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn env_key_fills_empty_api_key() {
        let mut cfg = SupportbotConfig::default();
        apply_env_overrides(&mut cfg, |_| Some("sk-env".into()));
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut cfg = SupportbotConfig::default();
        cfg.llm.api_key = Some("sk-file".into());
        apply_env_overrides(&mut cfg, |_| Some("sk-env".into()));
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn finds_first_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "supportbot.json", "{}");
        write(dir.path(), "supportbot.toml", "");
        assert_eq!(
            find_in(dir.path()).unwrap(),
            dir.path().join("supportbot.toml")
        );
    }
}
