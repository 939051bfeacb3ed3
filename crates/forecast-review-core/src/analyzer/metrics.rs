use serde::{Deserialize, Serialize};

use crate::analyzer::report::{format_money, Flag, FlagKind, Severity};
use crate::model::ReviewInput;

/// Aggregate figures derived from the input snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub budget: f64,
    pub approved_amount: f64,
    pub total_base_forecast: f64,
    pub total_forecast_with_rollover: f64,
    /// Sum of recorded actuals.
    pub total_actuals: f64,
    /// Sum of non-cancelled PO amounts.
    pub total_committed_po: f64,
    /// Committed PO value minus actuals. Negative means spend beyond orders.
    pub net_order_value: f64,
    /// Zero when the budget is zero; see `consumption_defined`.
    pub consumption_pct: f64,
    pub consumption_defined: bool,
    pub months_with_actuals: usize,
    pub months_remaining: usize,
    /// Sum of `forecast_with_rollover` over open periods.
    pub future_forecast_total: f64,
}

/// Compute the metrics section.
pub fn calculate_metrics(input: &ReviewInput) -> Metrics {
    let total_base_forecast: f64 = input.periods.iter().map(|p| p.base_forecast).sum();
    let total_forecast_with_rollover: f64 = input.periods.iter().map(|p| p.forecast_with_rollover).sum();
    let total_actuals: f64 = input.periods.iter().filter_map(|p| p.actual).sum();
    let total_committed_po: f64 = input.committed_orders().map(|po| po.amount).sum();
    let future_forecast_total: f64 = input.open_periods().map(|p| p.forecast_with_rollover).sum();

    let budget = input.project.budget;
    let (consumption_pct, consumption_defined) = if budget > 0.0 {
        (total_actuals * 100.0 / budget, true)
    } else {
        (0.0, false)
    };

    Metrics {
        budget,
        approved_amount: input.project.approved_amount,
        total_base_forecast,
        total_forecast_with_rollover,
        total_actuals,
        total_committed_po,
        net_order_value: total_committed_po - total_actuals,
        consumption_pct,
        consumption_defined,
        months_with_actuals: input.closed_periods().count(),
        months_remaining: input.open_periods().count(),
        future_forecast_total,
    }
}

/// Flags raised by the metrics stage itself.
pub fn metric_flags(metrics: &Metrics) -> Vec<Flag> {
    if metrics.consumption_defined {
        return Vec::new();
    }
    vec![Flag {
        kind: FlagKind::BudgetUndefined,
        severity: Severity::Warning,
        period: None,
        po_number: None,
        magnitude: None,
        message: format!(
            "Project budget is zero; consumption of {} in actuals cannot be expressed as a percent",
            format_money(metrics.total_actuals)
        ),
    }]
}
