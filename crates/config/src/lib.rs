//! Configuration loading and per-request environment resolution for Arcanum.
//!
//! Two layers:
//! - [`Settings`] — the operator-facing TOML file (`arcanum.toml`) with
//!   defaults, environment-variable overrides, and validation at load time.
//! - [`Environment`] — the request-scoped key/value view every pipeline stage
//!   reads its flags from. Resolved per call from the request's own
//!   configuration object; never cached in shared mutable state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ── Recognized keys ───────────────────────────────────────────────────────

/// Slimming enable/disable switch (default off).
pub const KEY_SLIMMING: &str = "ARCANUM_SLIMMING";
/// Reference-passage retrieval enable switch.
pub const KEY_GRAPHRAG: &str = "ARCANUM_GRAPHRAG";
/// Semantic-scoring enable/disable override.
pub const KEY_SEMANTIC_SCORING: &str = "ARCANUM_SEMANTIC_SCORING";
/// Prompt/telemetry persistence enable switch (default off, for privacy).
pub const KEY_PERSIST_TELEMETRY: &str = "ARCANUM_PERSIST_TELEMETRY";
/// Prompt-logging enable switch. Forced off in production.
pub const KEY_PROMPT_LOGGING: &str = "ARCANUM_PROMPT_LOGGING";
/// Deployment environment name ("production" disables prompt logging).
pub const KEY_DEPLOY_ENV: &str = "ARCANUM_ENV";
/// Storage mode for persisted error detail ("minimal" | "redact" | "full").
pub const KEY_TELEMETRY_DETAIL: &str = "ARCANUM_TELEMETRY_DETAIL";

/// A request-scoped configuration view.
///
/// Boolean flags accept case-insensitive `"true"` / `"1"`. Anything else —
/// including an absent key — reads as false.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any key/value iterator.
    pub fn from_iter<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snapshot the process environment.
    pub fn from_os_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Case-insensitive "true"/"1" boolean flag.
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()),
            Some(v) if v == "true" || v == "1"
        )
    }

    pub fn slimming_enabled(&self) -> bool {
        self.flag(KEY_SLIMMING)
    }

    pub fn graphrag_enabled(&self) -> bool {
        self.flag(KEY_GRAPHRAG)
    }

    /// Tri-state semantic-scoring override: `None` means "no override".
    pub fn semantic_scoring_override(&self) -> Option<bool> {
        self.get(KEY_SEMANTIC_SCORING)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
    }

    /// Persistence of prompts/telemetry. Defaults to disabled.
    pub fn persistence_enabled(&self) -> bool {
        self.flag(KEY_PERSIST_TELEMETRY)
    }

    pub fn is_production(&self) -> bool {
        self.get(KEY_DEPLOY_ENV)
            .is_some_and(|v| v.eq_ignore_ascii_case("production"))
    }

    /// Prompt logging. Forced off in production regardless of the flag.
    pub fn prompt_logging_enabled(&self) -> bool {
        !self.is_production() && self.flag(KEY_PROMPT_LOGGING)
    }

    /// Per-backend token budget override (`ARCANUM_BUDGET_<ID>`).
    pub fn token_budget(&self, backend_id: &str) -> Option<usize> {
        let key = format!("ARCANUM_BUDGET_{}", backend_id.to_ascii_uppercase());
        self.get(&key).and_then(|v| v.trim().parse().ok())
    }

    /// Per-backend endpoint override (`ARCANUM_<ID>_URL`).
    pub fn backend_url(&self, backend_id: &str) -> Option<&str> {
        let key = format!("ARCANUM_{}_URL", backend_id.to_ascii_uppercase());
        self.vars.get(&key).map(String::as_str)
    }

    /// Per-backend model override (`ARCANUM_<ID>_MODEL`).
    pub fn backend_model(&self, backend_id: &str) -> Option<&str> {
        let key = format!("ARCANUM_{}_MODEL", backend_id.to_ascii_uppercase());
        self.vars.get(&key).map(String::as_str)
    }

    /// Non-empty credential value for a key, if present.
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.vars {
            if k.contains("API_KEY") || k.contains("TOKEN") || k.contains("SECRET") {
                map.entry(k, &"[REDACTED]");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

// ── Settings file ─────────────────────────────────────────────────────────

/// The root settings structure. Maps directly to `arcanum.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment environment name ("development", "production", ...).
    #[serde(default = "default_deploy_env")]
    pub deploy_env: String,

    /// Whether prompt slimming is enabled.
    #[serde(default)]
    pub slimming: bool,

    /// Whether reference-passage retrieval is enabled.
    #[serde(default)]
    pub graphrag: bool,

    /// Whether prompts/telemetry may be persisted (default: off).
    #[serde(default)]
    pub persist_telemetry: bool,

    /// Whether prompts may be logged (ignored in production).
    #[serde(default)]
    pub prompt_logging: bool,

    /// Per-backend settings keyed by backend id.
    #[serde(default)]
    pub backends: HashMap<String, BackendSettings>,
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct BackendSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Token budget target for this backend's prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<usize>,
}

fn default_deploy_env() -> String {
    "development".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("deploy_env", &self.deploy_env)
            .field("slimming", &self.slimming)
            .field("graphrag", &self.graphrag)
            .field("persist_telemetry", &self.persist_telemetry)
            .field("prompt_logging", &self.prompt_logging)
            .field("backends", &self.backends)
            .finish()
    }
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("token_budget", &self.token_budget)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deploy_env: default_deploy_env(),
            slimming: false,
            graphrag: false,
            persist_telemetry: false,
            prompt_logging: false,
            backends: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from the default path (`~/.arcanum/arcanum.toml`), with
    /// environment-variable overrides for credentials:
    /// `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_dir().join("arcanum.toml");
        let mut settings = Self::load_from(&path)?;

        for (backend, var) in [("anthropic", "ANTHROPIC_API_KEY"), ("openai", "OPENAI_API_KEY")] {
            if let Ok(key) = std::env::var(var) {
                let entry = settings.backends.entry(backend.to_string()).or_default();
                if entry.api_key.is_none() {
                    entry.api_key = Some(key);
                }
            }
        }

        if let Ok(env_name) = std::env::var(KEY_DEPLOY_ENV) {
            settings.deploy_env = env_name;
        }

        Ok(settings)
    }

    /// Load settings from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No settings file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".arcanum")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (id, backend) in &self.backends {
            if let Some(budget) = backend.token_budget {
                if budget == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "token_budget for backend '{id}' must be > 0"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Lower settings into a per-request [`Environment`].
    pub fn environment(&self) -> Environment {
        let mut env = Environment::new();
        env.set(KEY_DEPLOY_ENV, self.deploy_env.clone());
        if self.slimming {
            env.set(KEY_SLIMMING, "true");
        }
        if self.graphrag {
            env.set(KEY_GRAPHRAG, "true");
        }
        if self.persist_telemetry {
            env.set(KEY_PERSIST_TELEMETRY, "true");
        }
        if self.prompt_logging {
            env.set(KEY_PROMPT_LOGGING, "true");
        }
        for (id, backend) in &self.backends {
            let upper = id.to_ascii_uppercase();
            if let Some(key) = &backend.api_key {
                let var = match id.as_str() {
                    "anthropic" => "ANTHROPIC_API_KEY".to_string(),
                    "openai" => "OPENAI_API_KEY".to_string(),
                    _ => format!("ARCANUM_{upper}_API_KEY"),
                };
                env.set(var, key.clone());
            }
            if let Some(url) = &backend.api_url {
                env.set(format!("ARCANUM_{upper}_URL"), url.clone());
            }
            if let Some(model) = &backend.model {
                env.set(format!("ARCANUM_{upper}_MODEL"), model.clone());
            }
            if let Some(budget) = backend.token_budget {
                env.set(format!("ARCANUM_BUDGET_{upper}"), budget.to_string());
            }
        }
        env
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse settings file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Settings validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_true_and_one_case_insensitive() {
        let env = Environment::from_iter([
            ("A", "true"),
            ("B", "TRUE"),
            ("C", "1"),
            ("D", "yes"),
            ("E", "0"),
            ("F", " True "),
        ]);
        assert!(env.flag("A"));
        assert!(env.flag("B"));
        assert!(env.flag("C"));
        assert!(env.flag("F"));
        assert!(!env.flag("D"));
        assert!(!env.flag("E"));
        assert!(!env.flag("MISSING"));
    }

    #[test]
    fn slimming_defaults_off() {
        assert!(!Environment::new().slimming_enabled());
    }

    #[test]
    fn persistence_defaults_off() {
        assert!(!Environment::new().persistence_enabled());
    }

    #[test]
    fn prompt_logging_forced_off_in_production() {
        let env = Environment::from_iter([
            (KEY_PROMPT_LOGGING, "true"),
            (KEY_DEPLOY_ENV, "production"),
        ]);
        assert!(!env.prompt_logging_enabled());

        let dev = Environment::from_iter([
            (KEY_PROMPT_LOGGING, "true"),
            (KEY_DEPLOY_ENV, "development"),
        ]);
        assert!(dev.prompt_logging_enabled());
    }

    #[test]
    fn semantic_scoring_is_tri_state() {
        assert_eq!(Environment::new().semantic_scoring_override(), None);
        let on = Environment::from_iter([(KEY_SEMANTIC_SCORING, "1")]);
        assert_eq!(on.semantic_scoring_override(), Some(true));
        let off = Environment::from_iter([(KEY_SEMANTIC_SCORING, "false")]);
        assert_eq!(off.semantic_scoring_override(), Some(false));
    }

    #[test]
    fn token_budget_parses_per_backend() {
        let env = Environment::from_iter([("ARCANUM_BUDGET_ANTHROPIC", "900")]);
        assert_eq!(env.token_budget("anthropic"), Some(900));
        assert_eq!(env.token_budget("openai"), None);

        let bad = Environment::from_iter([("ARCANUM_BUDGET_OPENAI", "lots")]);
        assert_eq!(bad.token_budget("openai"), None);
    }

    #[test]
    fn credential_ignores_blank_values() {
        let env = Environment::from_iter([("ANTHROPIC_API_KEY", "  ")]);
        assert_eq!(env.credential("ANTHROPIC_API_KEY"), None);

        let env = Environment::from_iter([("ANTHROPIC_API_KEY", "sk-ant-x")]);
        assert_eq!(env.credential("ANTHROPIC_API_KEY"), Some("sk-ant-x"));
    }

    #[test]
    fn environment_debug_redacts_credentials() {
        let env = Environment::from_iter([
            ("ANTHROPIC_API_KEY", "sk-ant-secret"),
            ("ARCANUM_ENV", "development"),
        ]);
        let rendered = format!("{env:?}");
        assert!(!rendered.contains("sk-ant-secret"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("development"));
    }

    #[test]
    fn default_settings_are_private() {
        let settings = Settings::default();
        assert!(!settings.persist_telemetry);
        assert!(!settings.prompt_logging);
        assert!(!settings.slimming);
    }

    #[test]
    fn settings_roundtrip_toml() {
        let mut settings = Settings::default();
        settings.slimming = true;
        settings.backends.insert(
            "anthropic".into(),
            BackendSettings {
                api_key: Some("sk-ant-test".into()),
                api_url: None,
                model: Some("claude-sonnet-4-20250514".into()),
                token_budget: Some(1200),
            },
        );
        let toml_str = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml_str).unwrap();
        assert!(parsed.slimming);
        assert_eq!(
            parsed.backends["anthropic"].token_budget,
            Some(1200)
        );
    }

    #[test]
    fn settings_debug_redacts_api_keys() {
        let mut settings = Settings::default();
        settings.backends.insert(
            "openai".into(),
            BackendSettings {
                api_key: Some("sk-test-123".into()),
                ..Default::default()
            },
        );
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("sk-test-123"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn missing_settings_file_returns_defaults() {
        let result = Settings::load_from(Path::new("/nonexistent/arcanum.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().deploy_env, "development");
    }

    #[test]
    fn zero_token_budget_rejected() {
        let toml_str = r#"
[backends.anthropic]
token_budget = 0
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_lower_into_environment() {
        let mut settings = Settings::default();
        settings.slimming = true;
        settings.deploy_env = "production".into();
        settings.backends.insert(
            "anthropic".into(),
            BackendSettings {
                api_key: Some("sk-ant-x".into()),
                api_url: Some("https://proxy.internal/v1".into()),
                model: None,
                token_budget: Some(700),
            },
        );

        let env = settings.environment();
        assert!(env.slimming_enabled());
        assert!(env.is_production());
        assert_eq!(env.credential("ANTHROPIC_API_KEY"), Some("sk-ant-x"));
        assert_eq!(env.backend_url("anthropic"), Some("https://proxy.internal/v1"));
        assert_eq!(env.token_budget("anthropic"), Some(700));
    }
}
