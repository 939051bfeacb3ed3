use crate::analyzer::metrics::Metrics;
use crate::analyzer::report::{format_money, AlertKind, ThresholdAlert};
use crate::config::Thresholds;

/// Budget-consumption and NOV-floor checks. Alerts only; nothing is adjusted.
pub fn check_thresholds(metrics: &Metrics, thresholds: &Thresholds) -> Vec<ThresholdAlert> {
    let mut alerts = Vec::new();
    alerts.extend(check_budget_threshold(metrics, thresholds));
    alerts.extend(check_nov_constraint(metrics));
    alerts
}

fn check_budget_threshold(metrics: &Metrics, thresholds: &Thresholds) -> Option<ThresholdAlert> {
    if !metrics.consumption_defined || metrics.consumption_pct < thresholds.budget_alert_pct {
        return None;
    }
    Some(ThresholdAlert {
        kind: AlertKind::NearBudgetLimit,
        value: metrics.consumption_pct,
        threshold: thresholds.budget_alert_pct,
        message: format!(
            "Budget consumption at {:.1}% - at or above the {:.0}% threshold",
            metrics.consumption_pct, thresholds.budget_alert_pct
        ),
    })
}

/// Committed-but-unspent order value cannot be forecast away: open periods
/// must together cover NOV.
fn check_nov_constraint(metrics: &Metrics) -> Option<ThresholdAlert> {
    let nov = metrics.net_order_value;
    let future = metrics.future_forecast_total;
    if future >= nov {
        return None;
    }
    let shortfall = nov - future;
    Some(ThresholdAlert {
        kind: AlertKind::InsufficientFutureForecast,
        value: shortfall,
        threshold: nov,
        message: format!(
            "Future forecasts ({}) are below NOV ({}). Shortfall: {}",
            format_money(future),
            format_money(nov),
            format_money(shortfall)
        ),
    })
}
