use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::error::ValidationReport;
use crate::model::{
    ForecastPeriod, OrderRecord, PeriodRecord, Project, ProjectRecord, PurchaseOrder, ReviewInput,
    ReviewRequest, DATE_FORMAT,
};

const FISCAL_YEARS: std::ops::RangeInclusive<i32> = 2000..=2100;
const MONTHS: std::ops::RangeInclusive<u8> = 1..=12;

fn check_amount(report: &mut ValidationReport, field: String, value: f64) -> Option<f64> {
    if !value.is_finite() {
        report.push(field, "must be a finite number");
        None
    } else if value < 0.0 {
        report.push(field, "must not be negative");
        None
    } else {
        Some(value)
    }
}

fn required_amount(report: &mut ValidationReport, field: String, value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) => check_amount(report, field, v),
        None => {
            report.push(field, "is required");
            None
        }
    }
}

fn required_text(report: &mut ValidationReport, field: &str, value: Option<String>) -> Option<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => {
            report.push(field, "is required");
            None
        }
    }
}

/// Blank counts as absent; anything else must be `YYYY-MM-DD`.
fn optional_date(report: &mut ValidationReport, field: String, value: Option<String>) -> Option<NaiveDate> {
    let raw = value.filter(|s| !s.trim().is_empty())?;
    match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            report.push(field, format!("must be a date (YYYY-MM-DD), got '{}'", raw));
            None
        }
    }
}

fn validate_project(report: &mut ValidationReport, record: ProjectRecord) -> Option<Project> {
    let id = required_text(report, "project.id", record.id);
    let name = required_text(report, "project.name", record.name);
    let budget = required_amount(report, "project.budget".into(), record.budget);
    let approved_amount = match record.approved_amount {
        Some(v) => check_amount(report, "project.approved_amount".into(), v),
        None => Some(0.0),
    };
    let anticipated_end_date = optional_date(
        report,
        "project.anticipated_end_date".into(),
        record.anticipated_end_date,
    );

    Some(Project {
        id: id?,
        code: record.code,
        name: name?,
        budget: budget?,
        approved_amount: approved_amount?,
        status: record.status,
        anticipated_end_date,
    })
}

fn validate_periods(report: &mut ValidationReport, records: Vec<PeriodRecord>) -> Vec<ForecastPeriod> {
    let mut seen = BTreeSet::new();
    let mut periods = Vec::with_capacity(records.len());

    for (i, record) in records.into_iter().enumerate() {
        let month = match record.month {
            None => {
                report.push(format!("forecasts[{}].month", i), "is required");
                None
            }
            Some(m) if !MONTHS.contains(&m) => {
                report.push(format!("forecasts[{}].month", i), "must be within 1..=12");
                None
            }
            Some(m) if !seen.insert(m) => {
                report.push(format!("forecasts[{}].month", i), format!("duplicate month {}", m));
                None
            }
            Some(m) => Some(m),
        };
        let base = required_amount(
            report,
            format!("forecasts[{}].base_forecast", i),
            record.base_forecast,
        );
        let rollover = match record.forecast_with_rollover {
            Some(v) => check_amount(report, format!("forecasts[{}].forecast_with_rollover", i), v),
            None => base,
        };
        let actual = match record.actual {
            Some(v) => check_amount(report, format!("forecasts[{}].actual", i), v).map(Some),
            None => Some(None),
        };

        if let (Some(month), Some(base_forecast), Some(forecast_with_rollover), Some(actual)) =
            (month, base, rollover, actual)
        {
            periods.push(ForecastPeriod {
                month,
                base_forecast,
                forecast_with_rollover,
                actual,
            });
        }
    }
    periods
}

fn validate_orders(report: &mut ValidationReport, records: Vec<OrderRecord>) -> Vec<PurchaseOrder> {
    let mut orders = Vec::with_capacity(records.len());

    for (i, record) in records.into_iter().enumerate() {
        let po_number = required_text(report, &format!("purchase_orders[{}].po_number", i), record.po_number);
        let amount = required_amount(report, format!("purchase_orders[{}].amount", i), record.amount);
        let issue_date = optional_date(
            report,
            format!("purchase_orders[{}].issue_date", i),
            record.issue_date,
        );
        let estimated_delivery = optional_date(
            report,
            format!("purchase_orders[{}].estimated_delivery", i),
            record.estimated_delivery,
        );

        if let (Some(po_number), Some(amount)) = (po_number, amount) {
            orders.push(PurchaseOrder {
                po_number,
                amount,
                status: record.status,
                issue_date,
                estimated_delivery,
            });
        }
    }
    orders
}

/// Validate a raw request into an ordered input snapshot.
///
/// Every problem is collected before rejecting. `today` is the review date
/// unless the request names one.
pub fn validate_request(request: ReviewRequest, today: NaiveDate) -> Result<ReviewInput, ValidationReport> {
    let mut report = ValidationReport::default();

    let request_id = required_text(&mut report, "request_id", request.request_id);

    let project = match request.project {
        Some(record) => validate_project(&mut report, record),
        None => {
            report.push("project", "is required");
            None
        }
    };

    let fiscal_year = match request.fiscal_year {
        Some(year) if !FISCAL_YEARS.contains(&year) => {
            report.push("fiscal_year", "must be within 2000..=2100");
            None
        }
        Some(year) => Some(year),
        None => {
            report.push("fiscal_year", "is required");
            None
        }
    };

    let current_month = match request.current_month {
        Some(month) if !MONTHS.contains(&month) => {
            report.push("current_month", "must be within 1..=12");
            None
        }
        Some(month) => Some(month),
        None => {
            report.push("current_month", "is required");
            None
        }
    };

    let mut periods = match request.forecasts {
        None => {
            report.push("forecasts", "is required");
            Vec::new()
        }
        Some(records) if records.is_empty() => {
            report.push("forecasts", "must contain at least one period");
            Vec::new()
        }
        Some(records) => validate_periods(&mut report, records),
    };

    let purchase_orders = validate_orders(&mut report, request.purchase_orders);

    let review_date = optional_date(&mut report, "review_date".into(), request.review_date)
        .unwrap_or(today);

    if !report.is_empty() {
        return Err(report);
    }

    // Every `None` above pushed an error.
    match (request_id, project, fiscal_year, current_month) {
        (Some(request_id), Some(project), Some(fiscal_year), Some(current_month)) => {
            periods.sort_by_key(|p| p.month);
            Ok(ReviewInput {
                request_id,
                project,
                fiscal_year,
                current_month,
                periods,
                purchase_orders,
                reason_codes: request.reason_codes,
                review_date,
            })
        }
        _ => {
            report.push("request", "incomplete request");
            Err(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PoStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 15).unwrap()
    }

    fn period(month: u8, base: f64, actual: Option<f64>) -> PeriodRecord {
        PeriodRecord {
            month: Some(month),
            base_forecast: Some(base),
            forecast_with_rollover: Some(base),
            actual,
        }
    }

    fn valid_request() -> ReviewRequest {
        ReviewRequest {
            request_id: Some("req-1".into()),
            project: Some(ProjectRecord {
                id: Some("PRJ-001".into()),
                name: Some("Substation upgrade".into()),
                budget: Some(120_000.0),
                approved_amount: Some(120_000.0),
                anticipated_end_date: Some("2024-12-31".into()),
                ..Default::default()
            }),
            fiscal_year: Some(2024),
            current_month: Some(4),
            forecasts: Some(vec![
                period(3, 10_000.0, Some(16_000.0)),
                period(1, 10_000.0, Some(9_500.0)),
                period(2, 10_000.0, Some(10_500.0)),
                period(4, 10_000.0, None),
            ]),
            purchase_orders: vec![OrderRecord {
                po_number: Some("PO-1".into()),
                amount: Some(5_000.0),
                status: PoStatus::Approved,
                issue_date: Some("2024-02-01".into()),
                estimated_delivery: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_is_sorted() {
        let input = validate_request(valid_request(), today()).unwrap();
        let months: Vec<u8> = input.periods.iter().map(|p| p.month).collect();
        assert_eq!(months, vec![1, 2, 3, 4]);
        assert_eq!(input.request_id, "req-1");
        assert_eq!(input.review_date, today());
        assert_eq!(
            input.project.anticipated_end_date,
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
        assert_eq!(
            input.purchase_orders[0].issue_date,
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let report = validate_request(ReviewRequest::default(), today()).unwrap_err();
        for field in ["request_id", "project", "fiscal_year", "current_month", "forecasts"] {
            assert!(report.has_field(field), "missing error for {}", field);
        }
    }

    #[test]
    fn test_missing_nested_fields_all_reported() {
        let mut req = valid_request();
        req.project = Some(ProjectRecord {
            name: Some("No budget yet".into()),
            ..Default::default()
        });
        req.forecasts = Some(vec![PeriodRecord {
            month: Some(1),
            ..Default::default()
        }]);
        req.purchase_orders = vec![OrderRecord::default()];

        let report = validate_request(req, today()).unwrap_err();
        for field in [
            "project.id",
            "project.budget",
            "forecasts[0].base_forecast",
            "purchase_orders[0].po_number",
            "purchase_orders[0].amount",
        ] {
            assert!(report.has_field(field), "missing error for {}", field);
        }
        assert!(!report.has_field("project.approved_amount"));
    }

    #[test]
    fn test_rollover_defaults_to_base() {
        let mut req = valid_request();
        req.forecasts = Some(vec![PeriodRecord {
            month: Some(5),
            base_forecast: Some(700.0),
            ..Default::default()
        }]);
        let input = validate_request(req, today()).unwrap();
        assert_eq!(input.periods[0].forecast_with_rollover, 700.0);
    }

    #[test]
    fn test_malformed_periods_rejected() {
        let mut req = valid_request();
        req.forecasts = Some(vec![
            period(1, 100.0, None),
            period(1, 100.0, None),
            period(13, 100.0, None),
            period(2, -5.0, Some(f64::NAN)),
        ]);
        let report = validate_request(req, today()).unwrap_err();
        assert!(report.has_field("forecasts[1].month"));
        assert!(report.has_field("forecasts[2].month"));
        assert!(report.has_field("forecasts[3].base_forecast"));
        assert!(report.has_field("forecasts[3].actual"));
    }

    #[test]
    fn test_malformed_po_rejected() {
        let mut req = valid_request();
        req.purchase_orders[0].po_number = Some("  ".into());
        req.purchase_orders[0].amount = Some(-1.0);
        req.purchase_orders[0].estimated_delivery = Some("31/05/2024".into());
        let report = validate_request(req, today()).unwrap_err();
        assert!(report.has_field("purchase_orders[0].po_number"));
        assert!(report.has_field("purchase_orders[0].amount"));
        assert!(report.has_field("purchase_orders[0].estimated_delivery"));
    }

    #[test]
    fn test_month_and_year_ranges() {
        let mut req = valid_request();
        req.current_month = Some(0);
        req.fiscal_year = Some(1999);
        let report = validate_request(req, today()).unwrap_err();
        assert!(report.has_field("current_month"));
        assert!(report.has_field("fiscal_year"));
    }

    #[test]
    fn test_zero_budget_is_valid() {
        let mut req = valid_request();
        if let Some(p) = req.project.as_mut() {
            p.budget = Some(0.0);
        }
        assert!(validate_request(req, today()).is_ok());
    }

    #[test]
    fn test_explicit_review_date_wins() {
        let mut req = valid_request();
        req.review_date = Some("2025-01-10".into());
        let input = validate_request(req, today()).unwrap();
        assert_eq!(input.review_date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());

        let mut req = valid_request();
        req.review_date = Some("tomorrow".into());
        assert!(validate_request(req, today())
            .unwrap_err()
            .has_field("review_date"));
    }
}
