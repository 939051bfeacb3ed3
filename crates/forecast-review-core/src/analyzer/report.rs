use serde::{Deserialize, Serialize};

use crate::analyzer::metrics::Metrics;
use crate::model::ReasonCode;
use crate::narrative::NarrativeOutcome;
use crate::pipeline::AnalysisState;
use crate::questions::Question;
use crate::scenarios::Scenario;

/// Severity attached to a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    /// Actual above plan.
    Over,
    /// Actual below plan.
    Under,
    High,
    Medium,
    /// Data could not be evaluated.
    Warning,
}

impl Severity {
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Critical => 6,
            Severity::High => 5,
            Severity::Over => 4,
            Severity::Medium => 3,
            Severity::Under => 2,
            Severity::Warning => 1,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Severity::Critical => "CRIT",
            Severity::Over => "OVER",
            Severity::Under => "UNDER",
            Severity::High => "HIGH",
            Severity::Medium => "MED",
            Severity::Warning => "WARN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagKind {
    Variance,
    IndeterminateVariance,
    LargePo,
    BudgetUndefined,
    ProjectLate,
    PoDeliveryExceedsForecast,
}

impl FlagKind {
    pub fn label(&self) -> &str {
        match self {
            FlagKind::Variance => "Forecast Variance",
            FlagKind::IndeterminateVariance => "Indeterminate Variance",
            FlagKind::LargePo => "Large Purchase Order",
            FlagKind::BudgetUndefined => "Budget Undefined",
            FlagKind::ProjectLate => "Project Past End Date",
            FlagKind::PoDeliveryExceedsForecast => "PO Delivery Exceeds Forecast",
        }
    }
}

/// An anomaly tied to one data point (a period, a PO, or the budget itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub kind: FlagKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,
    /// Signed variance percent, ratio-to-mean for large POs, days late, or
    /// delivery-to-forecast ratio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    NearBudgetLimit,
    InsufficientFutureForecast,
}

impl AlertKind {
    pub fn label(&self) -> &str {
        match self {
            AlertKind::NearBudgetLimit => "Near Budget Limit",
            AlertKind::InsufficientFutureForecast => "Insufficient Future Forecast",
        }
    }
}

/// A threshold violation not tied to a single data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAlert {
    pub kind: AlertKind,
    /// Consumption percent, or the NOV shortfall.
    pub value: f64,
    /// The limit that was crossed: configured percent, or NOV.
    pub threshold: f64,
    pub message: String,
}

/// Headline numbers of the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub summary: String,
    pub budget: f64,
    pub approved_amount: f64,
    pub total_base_forecast: f64,
    pub total_forecast_with_rollover: f64,
    pub total_actuals_to_date: f64,
    pub total_committed_po: f64,
    pub budget_consumption_percent: f64,
    pub net_order_value: f64,
    pub months_with_actuals: usize,
    pub months_remaining: usize,
}

/// Where the explanation came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ExplanationSource {
    Generated { model: String },
    Fallback { reason: String },
}

/// The complete advisory result returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReview {
    pub request_id: String,
    pub session_id: String,
    pub status: String,
    pub project_id: String,
    pub project_name: String,
    pub fiscal_year: i32,
    pub current_month: u8,
    pub analysis: AnalysisSummary,
    pub flags: Vec<Flag>,
    pub threshold_alerts: Vec<ThresholdAlert>,
    pub scenarios: Vec<Scenario>,
    pub questions: Vec<Question>,
    /// Reason codes offered to the reviewer, echoed from the request.
    pub reason_codes: Vec<ReasonCode>,
    pub explanation: String,
    pub explanation_source: ExplanationSource,
    pub timestamp: String,
}

impl ForecastReview {
    pub fn flags_of(&self, kind: FlagKind) -> impl Iterator<Item = &Flag> {
        self.flags.iter().filter(move |f| f.kind == kind)
    }

    pub fn has_alert(&self, kind: AlertKind) -> bool {
        self.threshold_alerts.iter().any(|a| a.kind == kind)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn used_fallback(&self) -> bool {
        matches!(self.explanation_source, ExplanationSource::Fallback { .. })
    }

    pub fn issue_count(&self) -> usize {
        self.flags.len() + self.threshold_alerts.len()
    }
}

/// Project the completed state into the caller-facing result.
///
/// Returns `None` if a stage section is still empty.
pub fn compile_response(state: &AnalysisState, timestamp: String) -> Option<ForecastReview> {
    let metrics: &Metrics = state.metrics.as_ref()?;
    let narrative = state.narrative.as_ref()?;
    let input = &state.input;

    let explanation_source = match &narrative.outcome {
        NarrativeOutcome::Generated { model, .. } => ExplanationSource::Generated {
            model: model.clone(),
        },
        NarrativeOutcome::Fallback { reason, .. } => ExplanationSource::Fallback {
            reason: reason.to_string(),
        },
    };

    Some(ForecastReview {
        request_id: input.request_id.clone(),
        session_id: state.session_id.clone(),
        status: "completed".to_string(),
        project_id: input.project.id.clone(),
        project_name: input.project.name.clone(),
        fiscal_year: input.fiscal_year,
        current_month: input.current_month,
        analysis: AnalysisSummary {
            summary: narrative.summary.clone(),
            budget: metrics.budget,
            approved_amount: metrics.approved_amount,
            total_base_forecast: metrics.total_base_forecast,
            total_forecast_with_rollover: metrics.total_forecast_with_rollover,
            total_actuals_to_date: metrics.total_actuals,
            total_committed_po: metrics.total_committed_po,
            budget_consumption_percent: metrics.consumption_pct,
            net_order_value: metrics.net_order_value,
            months_with_actuals: metrics.months_with_actuals,
            months_remaining: metrics.months_remaining,
        },
        flags: state.all_flags(),
        threshold_alerts: state.threshold_alerts.clone()?,
        scenarios: state.scenarios.clone()?,
        questions: state.questions.clone()?,
        reason_codes: input.reason_codes.clone(),
        explanation: narrative.outcome.text().to_string(),
        explanation_source,
        timestamp,
    })
}

/// Format an amount as whole currency units with thousands separators.
pub fn format_money(amount: f64) -> String {
    let rounded = amount.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if negative {
        format!("-${}", out)
    } else {
        format!("${}", out)
    }
}
