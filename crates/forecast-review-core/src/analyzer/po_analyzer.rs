use crate::analyzer::report::{format_money, Flag, FlagKind, Severity};
use crate::config::Thresholds;
use crate::model::ReviewInput;

/// Mean of committed PO amounts, or `None` below the minimum sample size.
pub fn committed_mean(input: &ReviewInput, thresholds: &Thresholds) -> Option<f64> {
    let amounts: Vec<f64> = input.committed_orders().map(|po| po.amount).collect();
    if amounts.len() < thresholds.min_po_sample.max(2) {
        return None;
    }
    Some(amounts.iter().sum::<f64>() / amounts.len() as f64)
}

/// Flag committed POs whose amount is strictly greater than the configured
/// multiple of the mean.
pub fn analyze_pos(input: &ReviewInput, thresholds: &Thresholds) -> Vec<Flag> {
    let Some(mean) = committed_mean(input, thresholds) else {
        return Vec::new();
    };
    if mean <= 0.0 {
        return Vec::new();
    }
    let limit = mean * thresholds.large_po_multiple;

    input
        .committed_orders()
        .filter(|po| po.amount > limit)
        .map(|po| {
            let ratio = po.amount / mean;
            Flag {
                kind: FlagKind::LargePo,
                severity: Severity::High,
                period: None,
                po_number: Some(po.po_number.clone()),
                magnitude: Some(ratio),
                message: format!(
                    "PO {} ({}) is {:.1}x the average committed PO ({})",
                    po.po_number,
                    format_money(po.amount),
                    ratio,
                    format_money(mean)
                ),
            }
        })
        .collect()
}
