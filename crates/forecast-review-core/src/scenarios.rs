//! Alternative forward-forecast proposals.
//!
//! Every scenario re-derives the open periods only. Closed periods are copied
//! through as locked entries carrying their recorded actual.

use serde::{Deserialize, Serialize};

use crate::analyzer::metrics::Metrics;
use crate::analyzer::report::format_money;
use crate::analyzer::variance::VarianceAnalysis;
use crate::model::{ForecastPeriod, ReasonCode, ReviewInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    NoChange,
    SpreadRemainingPos,
    AdjustForVariance,
}

impl ScenarioKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::NoChange => "No Change",
            ScenarioKind::SpreadRemainingPos => "Spread Remaining POs",
            ScenarioKind::AdjustForVariance => "Adjust for Variance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPeriod {
    pub month: u8,
    pub amount: f64,
    /// Closed period; `amount` is the recorded actual.
    pub locked: bool,
}

/// A reason code proposed for a scenario, with its share of the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedReason {
    pub code: String,
    pub suggested_percent: u8,
}

/// Suggestions limited to the codes the caller offers, if it offers any.
/// A dropped share moves to the first surviving code so shares still total 100.
fn suggest(shares: &[(&str, u8)], available: &[ReasonCode]) -> Vec<SuggestedReason> {
    let offered = |code: &str| available.is_empty() || available.iter().any(|rc| rc.code == code);
    let mut suggested: Vec<SuggestedReason> = shares
        .iter()
        .filter(|(code, _)| offered(*code))
        .map(|(code, percent)| SuggestedReason {
            code: code.to_string(),
            suggested_percent: *percent,
        })
        .collect();
    let total: u8 = suggested.iter().map(|s| s.suggested_percent).sum();
    if let Some(first) = suggested.first_mut() {
        first.suggested_percent += 100 - total;
    }
    suggested
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub name: String,
    pub periods: Vec<ScenarioPeriod>,
    pub total_year_forecast: f64,
    pub variance_from_budget: f64,
    pub rationale: String,
    pub suggested_reason_codes: Vec<SuggestedReason>,
}

impl Scenario {
    fn build<F>(
        kind: ScenarioKind,
        input: &ReviewInput,
        rationale: String,
        suggested_reason_codes: Vec<SuggestedReason>,
        open_amount: F,
    ) -> Self
    where
        F: Fn(&ForecastPeriod) -> f64,
    {
        let periods: Vec<ScenarioPeriod> = input
            .periods
            .iter()
            .map(|p| match p.actual {
                Some(actual) => ScenarioPeriod {
                    month: p.month,
                    amount: actual,
                    locked: true,
                },
                None => ScenarioPeriod {
                    month: p.month,
                    amount: open_amount(p),
                    locked: false,
                },
            })
            .collect();
        let total_year_forecast: f64 = periods.iter().map(|p| p.amount).sum();

        Self {
            kind,
            name: kind.name().to_string(),
            periods,
            total_year_forecast,
            variance_from_budget: total_year_forecast - input.project.budget,
            rationale,
            suggested_reason_codes,
        }
    }

    /// Amounts proposed for open periods, in month order.
    pub fn open_amounts(&self) -> Vec<f64> {
        self.periods
            .iter()
            .filter(|p| !p.locked)
            .map(|p| p.amount)
            .collect()
    }
}

/// Produce the candidate scenarios. None is preferred or applied.
pub fn generate_scenarios(
    input: &ReviewInput,
    metrics: &Metrics,
    variance: &VarianceAnalysis,
) -> Vec<Scenario> {
    let open_count = input.open_periods().count();
    let mut scenarios = Vec::with_capacity(3);

    scenarios.push(Scenario::build(
        ScenarioKind::NoChange,
        input,
        "Keep the current forecasts for all remaining months.".to_string(),
        Vec::new(),
        |p| p.forecast_with_rollover,
    ));

    if open_count > 0 {
        let remaining = metrics.net_order_value.max(0.0);
        let per_period = remaining / open_count as f64;
        scenarios.push(Scenario::build(
            ScenarioKind::SpreadRemainingPos,
            input,
            format!(
                "Spread the remaining committed order value of {} evenly across {} open month(s) ({}/month).",
                format_money(remaining),
                open_count,
                format_money(per_period)
            ),
            suggest(&[("normal_variance", 100)], &input.reason_codes),
            |_| per_period,
        ));
    }

    let adjustment_pct = variance.latest_variance_pct().unwrap_or(0.0);
    let factor = 1.0 + adjustment_pct / 100.0;
    let rationale = if adjustment_pct == 0.0 {
        "No measurable variance in the latest closed month; base forecasts kept for remaining months."
            .to_string()
    } else {
        format!(
            "Scale remaining base forecasts by {:+.1}%, the variance observed in the latest closed month.",
            adjustment_pct
        )
    };
    let shares: &[(&str, u8)] = if adjustment_pct > 0.0 {
        &[("inflation", 60), ("normal_variance", 40)]
    } else {
        &[("normal_variance", 100)]
    };
    scenarios.push(Scenario::build(
        ScenarioKind::AdjustForVariance,
        input,
        rationale,
        suggest(shares, &input.reason_codes),
        |p| (p.base_forecast * factor).max(0.0),
    ));

    scenarios
}

/// Confirm no scenario re-targets a closed period.
///
/// Returns a description of the first violation found.
pub fn check_history_preserved(input: &ReviewInput, scenarios: &[Scenario]) -> Result<(), String> {
    for scenario in scenarios {
        if scenario.periods.len() != input.periods.len() {
            return Err(format!(
                "scenario '{}' covers {} periods, input has {}",
                scenario.name,
                scenario.periods.len(),
                input.periods.len()
            ));
        }
        for (proposed, original) in scenario.periods.iter().zip(&input.periods) {
            if proposed.month != original.month {
                return Err(format!(
                    "scenario '{}' reorders month {} as {}",
                    scenario.name, original.month, proposed.month
                ));
            }
            match original.actual {
                Some(actual) if !proposed.locked || proposed.amount != actual => {
                    return Err(format!(
                        "scenario '{}' re-targets closed month {}",
                        scenario.name, original.month
                    ));
                }
                None if proposed.locked => {
                    return Err(format!(
                        "scenario '{}' locks open month {}",
                        scenario.name, original.month
                    ));
                }
                _ => {}
            }
        }
    }
    Ok(())
}
