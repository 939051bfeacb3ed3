use chrono::{Datelike, NaiveDate};

use crate::analyzer::report::{format_money, Flag, FlagKind, Severity};
use crate::model::ReviewInput;

/// Deliveries are only worth a look above this multiple of the month's forecast.
const DELIVERY_RATIO_LIMIT: f64 = 1.5;
const DELIVERY_RATIO_HIGH: f64 = 3.0;

/// A schedule problem found on the project or one of its orders.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusFinding {
    ProjectLate {
        project_name: String,
        end_date: NaiveDate,
        days_late: i64,
    },
    DeliveryExceedsForecast {
        po_number: String,
        amount: f64,
        month: u8,
        delivery_date: NaiveDate,
        monthly_forecast: f64,
        ratio: f64,
    },
}

impl StatusFinding {
    pub fn severity(&self) -> Severity {
        match self {
            StatusFinding::ProjectLate { days_late, .. } => {
                if *days_late > 90 {
                    Severity::Critical
                } else if *days_late > 30 {
                    Severity::High
                } else {
                    Severity::Medium
                }
            }
            StatusFinding::DeliveryExceedsForecast { ratio, .. } => {
                if *ratio > DELIVERY_RATIO_HIGH {
                    Severity::High
                } else {
                    Severity::Medium
                }
            }
        }
    }

    pub fn to_flag(&self) -> Flag {
        match self {
            StatusFinding::ProjectLate {
                end_date, days_late, ..
            } => Flag {
                kind: FlagKind::ProjectLate,
                severity: self.severity(),
                period: None,
                po_number: None,
                magnitude: Some(*days_late as f64),
                message: format!(
                    "Project is {} days past anticipated end date ({}). Review for potential cost overruns.",
                    days_late, end_date
                ),
            },
            StatusFinding::DeliveryExceedsForecast {
                po_number,
                amount,
                month,
                monthly_forecast,
                ratio,
                ..
            } => Flag {
                kind: FlagKind::PoDeliveryExceedsForecast,
                severity: self.severity(),
                period: Some(*month),
                po_number: Some(po_number.clone()),
                magnitude: Some((ratio * 10.0).round() / 10.0),
                message: format!(
                    "PO {} delivery ({}) in month {} exceeds forecast ({}) by {:.1}x",
                    po_number,
                    format_money(*amount),
                    month,
                    format_money(*monthly_forecast),
                    ratio
                ),
            },
        }
    }
}

/// A project is late once the review date passes its anticipated end date,
/// unless it is already complete.
pub fn check_project_late(input: &ReviewInput) -> Option<StatusFinding> {
    let project = &input.project;
    let end_date = project.anticipated_end_date?;
    if project.is_complete() || input.review_date <= end_date {
        return None;
    }

    let days_late = (input.review_date - end_date).num_days();
    tracing::warn!(
        project_id = %project.id,
        days_late,
        "project is past its anticipated end date"
    );
    Some(StatusFinding::ProjectLate {
        project_name: project.name.clone(),
        end_date,
        days_late,
    })
}

/// Orders still awaiting delivery whose amount dwarfs the forecast of the
/// month they are expected in. Months before the current one are skipped.
pub fn check_deliveries(input: &ReviewInput) -> Vec<StatusFinding> {
    let mut findings = Vec::new();

    for po in input.purchase_orders.iter().filter(|po| po.status.awaiting_delivery()) {
        let Some(delivery_date) = po.estimated_delivery else {
            continue;
        };
        let month = delivery_date.month() as u8;
        if month < input.current_month {
            continue;
        }

        let monthly_forecast = input
            .period(month)
            .map(|p| p.forecast_with_rollover)
            .unwrap_or(0.0);
        if monthly_forecast <= 0.0 || po.amount <= monthly_forecast {
            continue;
        }

        let ratio = po.amount / monthly_forecast;
        if ratio <= DELIVERY_RATIO_LIMIT {
            continue;
        }

        tracing::info!(
            po_number = %po.po_number,
            amount = po.amount,
            monthly_forecast,
            "delivery exceeds monthly forecast"
        );
        findings.push(StatusFinding::DeliveryExceedsForecast {
            po_number: po.po_number.clone(),
            amount: po.amount,
            month,
            delivery_date,
            monthly_forecast,
            ratio,
        });
    }

    findings
}

/// Late-project check followed by the delivery checks.
pub fn check_project_status(input: &ReviewInput) -> Vec<StatusFinding> {
    let mut findings: Vec<StatusFinding> = check_project_late(input).into_iter().collect();
    findings.extend(check_deliveries(input));
    findings
}
