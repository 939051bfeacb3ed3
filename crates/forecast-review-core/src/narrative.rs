//! Natural-language explanation of the findings.
//!
//! Calls an Ollama-compatible service and falls back to a deterministic
//! template whenever the service cannot produce usable text.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::analyzer::report::{format_money, Flag, ThresholdAlert};
use crate::config::NarrativeConfig;

/// Responses shorter than this are treated as unusable.
const MIN_RESPONSE_CHARS: usize = 20;

/// Structured summary handed to the narrative service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContext {
    pub project_name: String,
    pub budget: f64,
    pub approved_amount: f64,
    pub total_actuals: f64,
    pub consumption_pct: f64,
    pub consumption_defined: bool,
    pub net_order_value: f64,
    pub flags: Vec<Flag>,
    pub alerts: Vec<ThresholdAlert>,
    pub scenarios: Vec<ScenarioBrief>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBrief {
    pub name: String,
    pub rationale: String,
}

impl NarrativeContext {
    pub fn issue_count(&self) -> usize {
        self.flags.len() + self.alerts.len()
    }
}

/// Why the templated explanation was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    Disabled,
    Timeout,
    Unreachable(String),
    Status(u16),
    Unhealthy(String),
    EmptyResponse,
    Malformed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Disabled => write!(f, "narrative service disabled"),
            FallbackReason::Timeout => write!(f, "narrative service timed out"),
            FallbackReason::Unreachable(e) => write!(f, "narrative service unreachable: {}", e),
            FallbackReason::Status(code) => write!(f, "narrative service returned HTTP {}", code),
            FallbackReason::Unhealthy(e) => write!(f, "narrative service reported an error: {}", e),
            FallbackReason::EmptyResponse => write!(f, "narrative service returned no usable text"),
            FallbackReason::Malformed(e) => write!(f, "narrative service response malformed: {}", e),
        }
    }
}

/// Result of the narrative stage. Both branches carry text.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrativeOutcome {
    Generated { text: String, model: String },
    Fallback { text: String, reason: FallbackReason },
}

impl NarrativeOutcome {
    pub fn text(&self) -> &str {
        match self {
            NarrativeOutcome::Generated { text, .. } => text,
            NarrativeOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, NarrativeOutcome::Fallback { .. })
    }
}

/// Liveness of the narrative service, for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeHealth {
    /// Service answered and lists the configured model.
    pub reachable: bool,
    pub model: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for the narrative service.
pub struct Narrator {
    config: NarrativeConfig,
    client: Option<reqwest::Client>,
}

impl Narrator {
    pub fn new(config: NarrativeConfig) -> Result<Self> {
        let client = if config.uses_network() {
            Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()
                    .context("Failed to build HTTP client")?,
            )
        } else {
            None
        };
        Ok(Self { config, client })
    }

    /// Narrator that never touches the network.
    pub fn template() -> Self {
        Self {
            config: NarrativeConfig::template(),
            client: None,
        }
    }

    /// Explain the findings. Never fails; a service problem yields `Fallback`.
    pub async fn narrate(&self, context: &NarrativeContext) -> NarrativeOutcome {
        let Some(client) = &self.client else {
            return NarrativeOutcome::Fallback {
                text: fallback_explanation(context),
                reason: FallbackReason::Disabled,
            };
        };

        let prompt = build_prompt(context);
        let limit = Duration::from_secs(self.config.timeout_secs);
        let attempt = tokio::time::timeout(limit, self.generate(client, &prompt)).await;

        let result = match attempt {
            Ok(inner) => inner,
            Err(_) => Err(FallbackReason::Timeout),
        };

        match result {
            Ok(text) => {
                tracing::info!(model = %self.config.model, "narrative generated");
                NarrativeOutcome::Generated {
                    text,
                    model: self.config.model.clone(),
                }
            }
            Err(reason) => {
                tracing::warn!(%reason, "using fallback narrative");
                NarrativeOutcome::Fallback {
                    text: fallback_explanation(context),
                    reason,
                }
            }
        }
    }

    async fn generate(&self, client: &reqwest::Client, prompt: &str) -> Result<String, FallbackReason> {
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "temperature": self.config.temperature,
            "stream": false
        });

        let resp = client
            .post(format!("{}/api/generate", self.config.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FallbackReason::Status(status.as_u16()));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| FallbackReason::Malformed(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(FallbackReason::Unhealthy(err));
        }

        let text = parsed.response.unwrap_or_default().trim().to_string();
        if text.chars().count() < MIN_RESPONSE_CHARS {
            return Err(FallbackReason::EmptyResponse);
        }
        Ok(text)
    }

    /// Query liveness and whether the configured model is installed.
    pub async fn check_health(&self) -> NarrativeHealth {
        let mut health = NarrativeHealth {
            reachable: false,
            model: self.config.model.clone(),
            endpoint: self.config.endpoint.clone(),
            latency_ms: None,
            available_models: Vec::new(),
            error: None,
        };

        let Some(client) = &self.client else {
            health.error = Some(FallbackReason::Disabled.to_string());
            return health;
        };

        let started = Instant::now();
        let resp = client
            .get(format!("{}/api/tags", self.config.endpoint))
            .timeout(Duration::from_secs(self.config.health_timeout_secs))
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                health.error = Some(classify(e).to_string());
                return health;
            }
        };
        health.latency_ms = Some(started.elapsed().as_millis() as u64);

        if !resp.status().is_success() {
            health.error = Some(FallbackReason::Status(resp.status().as_u16()).to_string());
            return health;
        }

        match resp.json::<TagsResponse>().await {
            Ok(tags) => {
                health.available_models = tags.models.into_iter().map(|m| m.name).collect();
                health.reachable = health
                    .available_models
                    .iter()
                    .any(|name| model_matches(name, &self.config.model));
                if !health.reachable {
                    health.error = Some(format!("model '{}' not installed", self.config.model));
                }
            }
            Err(e) => health.error = Some(FallbackReason::Malformed(e.to_string()).to_string()),
        }

        tracing::debug!(reachable = health.reachable, "narrative health checked");
        health
    }
}

fn classify(err: reqwest::Error) -> FallbackReason {
    if err.is_timeout() {
        FallbackReason::Timeout
    } else if let Some(status) = err.status() {
        FallbackReason::Status(status.as_u16())
    } else {
        FallbackReason::Unreachable(err.to_string())
    }
}

fn model_matches(listed: &str, configured: &str) -> bool {
    listed == configured || listed.strip_suffix(":latest") == Some(configured)
}

fn format_flags(flags: &[Flag]) -> String {
    if flags.is_empty() {
        return "None".to_string();
    }
    flags
        .iter()
        .map(|f| format!("- {}", f.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_alerts(alerts: &[ThresholdAlert]) -> String {
    if alerts.is_empty() {
        return "None".to_string();
    }
    alerts
        .iter()
        .map(|a| format!("- {}", a.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_scenarios(scenarios: &[ScenarioBrief]) -> String {
    if scenarios.is_empty() {
        return "None".to_string();
    }
    scenarios
        .iter()
        .map(|s| format!("- {}: {}", s.name, s.rationale))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(context: &NarrativeContext) -> String {
    format!(
        "You are a financial analyst explaining project forecast analysis to a project manager.\n\n\
         Project: {}\n\
         Budget: {}\n\
         Approved Amount: {}\n\
         Total Actuals to Date: {}\n\
         Budget Consumption: {:.1}%\n\
         Net Order Value (remaining obligations): {}\n\n\
         Issues Found:\n{}\n\n\
         Threshold Alerts:\n{}\n\n\
         Scenarios Generated:\n{}\n\n\
         Write a clear, concise explanation (3-4 sentences) that summarizes the current state \
         of the project, highlights the main issues, explains what the scenarios mean and gives \
         a recommendation. Keep it simple and actionable. Do not use technical jargon.",
        context.project_name,
        format_money(context.budget),
        format_money(context.approved_amount),
        format_money(context.total_actuals),
        context.consumption_pct,
        format_money(context.net_order_value),
        format_flags(&context.flags),
        format_alerts(&context.alerts),
        format_scenarios(&context.scenarios),
    )
}

/// Templated explanation built only from the structured findings.
pub fn fallback_explanation(context: &NarrativeContext) -> String {
    let opening = if context.consumption_defined {
        let pct = context.consumption_pct;
        let phase = if pct < 25.0 {
            "in its early stages"
        } else if pct < 50.0 {
            "on track"
        } else if pct < 75.0 {
            "mid-way through"
        } else if pct < 90.0 {
            "nearing completion"
        } else {
            "at a critical budget threshold"
        };
        format!("The project is {} with {:.1}% of budget consumed.", phase, pct)
    } else {
        format!(
            "The project has no budget set, so consumption cannot be measured; {} has been spent to date.",
            format_money(context.total_actuals)
        )
    };

    let status = match context.issue_count() {
        0 => "It is progressing with no significant issues.".to_string(),
        1 => "It has one issue requiring attention.".to_string(),
        n => format!("It has {} issues that need review.", n),
    };

    let obligations = if context.net_order_value > 0.0 {
        format!(
            " Open purchase orders still commit {} of future spend.",
            format_money(context.net_order_value)
        )
    } else {
        String::new()
    };

    format!(
        "{} {}{} Review the {} scenario(s) provided to determine the best path forward.",
        opening,
        status,
        obligations,
        context.scenarios.len()
    )
}

/// One-line summary of the analysis.
pub fn summary_line(context: &NarrativeContext) -> String {
    format!(
        "Budget analysis for {}: {:.1}% consumed, {} issues detected.",
        context.project_name,
        context.consumption_pct,
        context.issue_count()
    )
}
