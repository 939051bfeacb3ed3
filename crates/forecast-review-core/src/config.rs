use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = ".forecast-review/config.toml";

/// Configuration loaded from `.forecast-review/config.toml`.
///
/// Every key is optional; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReviewConfig {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub narrative: NarrativeConfig,
}

/// Rule limits handed to each analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A closed period is flagged when |variance| exceeds this percent.
    pub variance_pct: f64,
    /// Consumption at or above this percent raises a budget alert.
    pub budget_alert_pct: f64,
    /// A PO is large when its amount exceeds this multiple of the mean.
    pub large_po_multiple: f64,
    /// Fewer committed POs than this and the PO analysis is skipped.
    pub min_po_sample: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            variance_pct: 5.0,
            budget_alert_pct: 90.0,
            large_po_multiple: 2.0,
            min_po_sample: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeProvider {
    /// Ollama-compatible `/api/generate` endpoint.
    Ollama,
    /// No network call; always the templated explanation.
    Template,
}

/// Narrative service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// When false the template is used regardless of provider.
    pub enabled: bool,
    pub provider: NarrativeProvider,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub temperature: f64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: NarrativeProvider::Ollama,
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b".to_string(),
            timeout_secs: 60,
            health_timeout_secs: 5,
            temperature: 0.7,
        }
    }
}

impl NarrativeConfig {
    /// Whether the narrative service should be called at all.
    pub fn uses_network(&self) -> bool {
        self.enabled && self.provider == NarrativeProvider::Ollama
    }

    pub fn template() -> Self {
        Self {
            provider: NarrativeProvider::Template,
            ..Default::default()
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<ReviewConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
    let config: ReviewConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
    Ok(config)
}

/// Load the file when it exists, defaults otherwise, then apply environment overrides.
pub fn resolve_config(path: Option<&Path>) -> anyhow::Result<ReviewConfig> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.is_file() {
                load_config(default_path)?
            } else {
                ReviewConfig::default()
            }
        }
    };
    apply_env_overrides(&mut config.narrative, |key| std::env::var(key).ok());
    Ok(config)
}

/// Apply `OLLAMA_HOST`, `OLLAMA_MODEL`, `LLM_TIMEOUT`, `LLM_TEMPERATURE`.
///
/// Unparseable numeric values are ignored with a warning.
pub fn apply_env_overrides<F>(narrative: &mut NarrativeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("OLLAMA_HOST").filter(|v| !v.trim().is_empty()) {
        narrative.endpoint = host.trim().trim_end_matches('/').to_string();
    }
    if let Some(model) = lookup("OLLAMA_MODEL").filter(|v| !v.trim().is_empty()) {
        narrative.model = model.trim().to_string();
    }
    if let Some(raw) = lookup("LLM_TIMEOUT") {
        match raw.trim().parse::<u64>() {
            Ok(secs) => narrative.timeout_secs = secs,
            Err(_) => tracing::warn!(value = %raw, "ignoring unparseable LLM_TIMEOUT"),
        }
    }
    if let Some(raw) = lookup("LLM_TEMPERATURE") {
        match raw.trim().parse::<f64>() {
            Ok(t) => narrative.temperature = t,
            Err(_) => tracing::warn!(value = %raw, "ignoring unparseable LLM_TEMPERATURE"),
        }
    }
}
