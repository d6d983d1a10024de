//! Configuration module
//!
//! Split into focused modules:
//! - types.rs: Core configuration types (Config, provider configs, AgentConfig)
//! - env.rs: Environment variable resolution and provider selection
//! - paths.rs: Cache and trace directory paths

mod env;
mod paths;
mod types;

pub use types::{
    AgentConfig, AnthropicConfig, Config, OpenAiConfig, OpenRouterConfig, ProviderKind,
};

pub use env::{load_from_env, provider_env_prefix};
pub use paths::{ai_analysis_cache_dir, config_dir, report_cache_dir, trace_root_dir};
