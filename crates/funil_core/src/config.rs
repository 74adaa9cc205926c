use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FunilConfig {
    pub llm: LlmConfig,
    pub waha: WahaConfig,
    pub server: ServerConfig,
    pub engine: EngineTuning,
}

impl FunilConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: FunilConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file doesn't exist, return defaults
    /// with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("GEMINI_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("GEMINI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("WAHA_BASE_URL") {
            self.waha.base_url = v;
        }
        if let Ok(v) = std::env::var("WAHA_API_KEY") {
            self.waha.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("FUNIL_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("FUNIL_PORT") {
            if let Ok(n) = v.parse() {
                self.server.port = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// The literal key "mock" switches the client into offline mock mode.
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: "mock".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WahaConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for WahaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Hard cap on node executions within one pass; exceeding it is
    /// treated as a cycle in the graph.
    pub iteration_cap: u32,
    /// How long seen (session, message id) pairs are retained for
    /// deduplication. Sized to cover provider redelivery.
    pub dedup_retention_secs: u64,
    /// Transcript bound per conversation.
    pub history_limit: usize,
    /// Default qualification max-turns when a node omits it.
    pub default_max_turns: u32,
    /// Upper bound on a single LLM call.
    pub llm_timeout_secs: u64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            iteration_cap: 25,
            dedup_retention_secs: 1800,
            history_limit: 40,
            default_max_turns: 5,
            llm_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = FunilConfig::default();
        assert_eq!(cfg.engine.iteration_cap, 25);
        assert_eq!(cfg.engine.dedup_retention_secs, 1800);
        assert_eq!(cfg.llm.api_key, "mock");
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn test_partial_toml() {
        let cfg: FunilConfig = toml::from_str(
            r#"
            [waha]
            base_url = "http://waha:3000"

            [engine]
            iteration_cap = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.waha.base_url, "http://waha:3000");
        assert_eq!(cfg.engine.iteration_cap, 10);
        // Untouched sections keep defaults.
        assert_eq!(cfg.llm.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let cfg = FunilConfig::load_or_default("/nonexistent/funil.toml");
        assert_eq!(cfg.engine.history_limit, 40);
    }
}
