use serde::{Deserialize, Serialize};

use crate::analyzer::report::{format_money, Flag, FlagKind, Severity};
use crate::config::Thresholds;
use crate::model::ReviewInput;

/// Actual-vs-plan comparison for one closed period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodVariance {
    pub month: u8,
    pub base_forecast: f64,
    pub actual: f64,
    pub variance: f64,
    /// `None` when the base forecast is zero.
    pub variance_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceAnalysis {
    pub variances: Vec<PeriodVariance>,
    pub flags: Vec<Flag>,
}

impl VarianceAnalysis {
    /// Variance percent of the latest closed period, if it was computable.
    pub fn latest_variance_pct(&self) -> Option<f64> {
        self.variances
            .iter()
            .max_by_key(|v| v.month)
            .and_then(|v| v.variance_pct)
    }
}

/// Percent rounded to two decimals, the precision thresholds are compared at.
fn round_pct(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compare every closed period against its base forecast.
///
/// Open periods are never evaluated. A period is flagged when its rounded
/// variance percent is strictly above the limit.
pub fn detect_variances(input: &ReviewInput, thresholds: &Thresholds) -> VarianceAnalysis {
    let limit = thresholds.variance_pct;
    let mut analysis = VarianceAnalysis::default();

    for period in &input.periods {
        let Some(actual) = period.actual else {
            continue;
        };
        let base = period.base_forecast;
        let variance = actual - base;

        if base == 0.0 {
            analysis.variances.push(PeriodVariance {
                month: period.month,
                base_forecast: base,
                actual,
                variance,
                variance_pct: None,
            });
            analysis.flags.push(Flag {
                kind: FlagKind::IndeterminateVariance,
                severity: Severity::Warning,
                period: Some(period.month),
                po_number: None,
                magnitude: None,
                message: format!(
                    "Month {} has actuals of {} against a zero base forecast; variance cannot be computed",
                    period.month,
                    format_money(actual)
                ),
            });
            continue;
        }

        let pct = round_pct(variance * 100.0 / base);
        analysis.variances.push(PeriodVariance {
            month: period.month,
            base_forecast: base,
            actual,
            variance,
            variance_pct: Some(pct),
        });

        if pct.abs() > limit {
            let (severity, direction) = if pct > 0.0 {
                (Severity::Over, "exceeded")
            } else {
                (Severity::Under, "fell short of")
            };
            analysis.flags.push(Flag {
                kind: FlagKind::Variance,
                severity,
                period: Some(period.month),
                po_number: None,
                magnitude: Some(pct),
                message: format!(
                    "Month {} actuals ({}) {} forecast ({}) by {:.1}%",
                    period.month,
                    format_money(actual),
                    direction,
                    format_money(base),
                    pct.abs()
                ),
            });
        }
    }

    analysis
}
