//! Configuration: schema, discovery and loading.
//!
//! Every service binary loads the same [`SupportbotConfig`]; each one reads
//! only the sections it needs.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        AgentConfig, CategoriesConfig, CategoryConfig, ClientConfig, DEFAULT_CATEGORY,
        GatewayConfig, HeartbeatConfig, LlmConfig, ServerConfig, ServicesConfig, SupportbotConfig,
        WorkerKind,
    },
};
