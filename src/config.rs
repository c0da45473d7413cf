//! Runtime configuration for chat-relay.
//!
//! Configuration is loaded from an optional JSON file and then overlaid with
//! secrets from the process environment. Everything is read once at startup.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Environment variable holding the provider API key.
pub const ENV_PROVIDER_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the provider base URL.
pub const ENV_PROVIDER_BASE: &str = "OPENAI_BASE_URL";
/// Environment variable holding the Supabase project URL.
pub const ENV_DATABASE_URL: &str = "SUPABASE_URL";
/// Environment variable holding the Supabase API key.
pub const ENV_DATABASE_KEY: &str = "SUPABASE_KEY";

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-relay", about = "Streaming chat relay and leaderboard gateway")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address. Overrides `server.listen` from the config file.
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// LLM provider configuration.
    pub provider: ProviderConfig,

    /// Leaderboard database configuration.
    pub leaderboard: LeaderboardConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8000").
    pub listen: String,

    /// Fragments buffered between the provider and the caller per chat stream.
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            stream_buffer: 16,
        }
    }
}

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Versioned base URL, as in `OPENAI_BASE_URL`; `/chat/completions` is appended.
    pub api_base: String,

    /// Bearer token. Usually supplied through `OPENAI_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Model used when a chat request does not name one.
    pub default_model: String,

    /// TCP connect timeout in seconds. Streams themselves have no deadline.
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            default_model: "gpt-4.1-mini".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// Supabase (PostgREST) leaderboard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: Option<String>,

    /// Service or anon key.
    #[serde(skip_serializing)]
    pub key: Option<String>,

    /// Table that receives submissions.
    pub table: String,

    /// Stored procedure returning the ranked window around a score.
    pub window_procedure: String,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            table: "leaderboard".to_string(),
            window_procedure: "get_leaderboard_window".to_string(),
        }
    }
}

impl LeaderboardConfig {
    /// URL and key, if both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().filter(|s| !s.is_empty())?;
        let key = self.key.as_deref().filter(|s| !s.is_empty())?;
        Some((url, key))
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Overlay secrets and endpoints from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_PROVIDER_KEY) {
            self.provider.api_key = Some(key);
        }
        if let Some(base) = get(ENV_PROVIDER_BASE) {
            self.provider.api_base = base;
        }
        if let Some(url) = get(ENV_DATABASE_URL) {
            self.leaderboard.url = Some(url);
        }
        if let Some(key) = get(ENV_DATABASE_KEY) {
            self.leaderboard.key = Some(key);
        }
    }
}
