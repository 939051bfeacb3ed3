use serde::{Deserialize, Serialize};

use crate::analyzer::project_status::StatusFinding;
use crate::analyzer::report::{format_money, AlertKind, Flag, FlagKind, Severity, ThresholdAlert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    BudgetUndefined,
    OverVariance,
    UnderVariance,
    IndeterminateVariance,
    NearBudgetLimit,
    InsufficientFutureForecast,
    ProjectLate,
    PoDelivery,
    LargePo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
}

/// A reviewer-facing question. Answers are collected by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub kind: QuestionKind,
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub requires_reason: bool,
}

fn options(pairs: &[(&str, &str)]) -> Vec<QuestionOption> {
    pairs
        .iter()
        .map(|(value, label)| QuestionOption {
            value: value.to_string(),
            label: label.to_string(),
        })
        .collect()
}

struct Draft {
    kind: QuestionKind,
    text: String,
    options: Vec<QuestionOption>,
    requires_reason: bool,
}

/// Question for a kind raised `count` times. Nothing when it was never raised.
fn counted(kind: QuestionKind, count: usize) -> Option<Draft> {
    if count == 0 {
        return None;
    }
    let (text, options, requires_reason) = template(kind, count)?;
    Some(Draft {
        kind,
        text,
        options,
        requires_reason,
    })
}

/// One question per schedule finding; each names its own project or order.
fn status_question(finding: &StatusFinding) -> Draft {
    match finding {
        StatusFinding::ProjectLate {
            project_name,
            end_date,
            ..
        } => Draft {
            kind: QuestionKind::ProjectLate,
            text: format!(
                "Project '{}' appears to be past its anticipated end date ({}). Is there a risk that the project will cost more than forecast?",
                project_name, end_date
            ),
            options: options(&[
                ("yes_increase", "Yes, likely to cost more"),
                ("yes_minor", "Yes, but minor increase expected"),
                ("no_on_track", "No, project is on track despite date"),
                ("pending_review", "Need more information to assess"),
            ]),
            requires_reason: true,
        },
        StatusFinding::DeliveryExceedsForecast {
            po_number,
            amount,
            month,
            monthly_forecast,
            ..
        } => Draft {
            kind: QuestionKind::PoDelivery,
            text: format!(
                "PO {} ({}) has estimated delivery in month {}, but the forecast for that month is only {}. How should this be handled?",
                po_number,
                format_money(*amount),
                month,
                format_money(*monthly_forecast)
            ),
            options: options(&[
                ("increase_forecast", "Increase forecast to match PO"),
                ("spread_months", "Spread delivery across months"),
                ("delay_expected", "Delivery will likely be delayed"),
                ("already_accounted", "Already accounted for in forecast"),
            ]),
            requires_reason: true,
        },
    }
}

/// Aggregate wording for a kind. Schedule kinds have none; they are asked per
/// finding.
fn template(kind: QuestionKind, count: usize) -> Option<(String, Vec<QuestionOption>, bool)> {
    let question = match kind {
        QuestionKind::BudgetUndefined => (
            "The project budget is zero, so consumption cannot be measured. Is the budget missing or not yet approved?"
                .to_string(),
            options(&[
                ("budget_pending", "Budget not yet approved"),
                ("data_error", "Budget missing from source data"),
                ("expected", "Zero budget is expected"),
            ]),
            false,
        ),
        QuestionKind::OverVariance => (
            format!(
                "Actuals exceeded forecasts in {} month(s). Would you like to adjust the forecast for remaining months?",
                count
            ),
            options(&[
                ("increase", "Yes, increase remaining months"),
                ("keep", "No, keep current forecast"),
                ("custom", "Specify custom adjustment"),
            ]),
            true,
        ),
        QuestionKind::UnderVariance => (
            format!(
                "Actuals came in below forecast in {} month(s). Is this spend delayed or no longer needed?",
                count
            ),
            options(&[
                ("delayed", "Spend is delayed to later months"),
                ("saving", "Permanent saving"),
                ("keep", "No change needed"),
            ]),
            true,
        ),
        QuestionKind::IndeterminateVariance => (
            format!(
                "{} month(s) recorded actuals against a zero base forecast. Were these costs planned elsewhere?",
                count
            ),
            options(&[
                ("unplanned", "Unplanned spend"),
                ("moved", "Planned in a different month"),
                ("data_error", "Forecast data is incomplete"),
            ]),
            true,
        ),
        QuestionKind::NearBudgetLimit => (
            "Budget consumption has reached the alert threshold. How would you like to proceed?"
                .to_string(),
            options(&[
                ("acknowledge", "Acknowledge and continue"),
                ("review", "Flag for management review"),
                ("request_increase", "Request budget increase"),
            ]),
            false,
        ),
        QuestionKind::InsufficientFutureForecast => (
            "Remaining forecasts do not cover committed purchase orders. Should future months be increased to meet the open order value?"
                .to_string(),
            options(&[
                ("increase", "Increase future forecasts"),
                ("cancel_pos", "Some orders will be cancelled or reduced"),
                ("review", "Review with procurement"),
            ]),
            true,
        ),
        QuestionKind::ProjectLate | QuestionKind::PoDelivery => return None,
        QuestionKind::LargePo => (
            format!(
                "{} purchase order(s) are much larger than the typical order. How should they be reflected in the forecast?",
                count
            ),
            options(&[
                ("spread", "Spread over multiple months"),
                ("increase", "Increase forecast to match"),
                ("no_action", "No action needed (already accounted for)"),
            ]),
            true,
        ),
    };
    Some(question)
}

/// Derive reviewer questions from flags, alerts and schedule findings.
///
/// Inputs are given in stage order (metrics, variance, thresholds, project
/// status, PO analyzer) and the questions keep that order. Identical text is
/// asked once.
pub fn build_questions(
    metric_flags: &[Flag],
    variance_flags: &[Flag],
    alerts: &[ThresholdAlert],
    status: &[StatusFinding],
    po_flags: &[Flag],
) -> Vec<Question> {
    let count_flags = |flags: &[Flag], kind: FlagKind| flags.iter().filter(|f| f.kind == kind).count();
    let count_variance = |severity: Severity| {
        variance_flags
            .iter()
            .filter(|f| f.kind == FlagKind::Variance && f.severity == severity)
            .count()
    };

    let mut drafts: Vec<Draft> = Vec::new();
    drafts.extend(counted(
        QuestionKind::BudgetUndefined,
        count_flags(metric_flags, FlagKind::BudgetUndefined),
    ));
    drafts.extend(counted(QuestionKind::OverVariance, count_variance(Severity::Over)));
    drafts.extend(counted(QuestionKind::UnderVariance, count_variance(Severity::Under)));
    drafts.extend(counted(
        QuestionKind::IndeterminateVariance,
        count_flags(variance_flags, FlagKind::IndeterminateVariance),
    ));
    for alert in alerts {
        let kind = match alert.kind {
            AlertKind::NearBudgetLimit => QuestionKind::NearBudgetLimit,
            AlertKind::InsufficientFutureForecast => QuestionKind::InsufficientFutureForecast,
        };
        drafts.extend(counted(kind, 1));
    }
    drafts.extend(status.iter().map(status_question));
    drafts.extend(counted(QuestionKind::LargePo, count_flags(po_flags, FlagKind::LargePo)));

    let mut questions: Vec<Question> = Vec::new();
    for draft in drafts {
        if questions.iter().any(|q| q.text == draft.text) {
            continue;
        }
        questions.push(Question {
            id: format!("q{}", questions.len() + 1),
            kind: draft.kind,
            text: draft.text,
            options: draft.options,
            requires_reason: draft.requires_reason,
        });
    }
    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn flag(kind: FlagKind, severity: Severity) -> Flag {
        Flag {
            kind,
            severity,
            period: Some(1),
            po_number: None,
            magnitude: None,
            message: String::new(),
        }
    }

    fn alert(kind: AlertKind) -> ThresholdAlert {
        ThresholdAlert {
            kind,
            value: 1.0,
            threshold: 1.0,
            message: String::new(),
        }
    }

    fn late() -> StatusFinding {
        StatusFinding::ProjectLate {
            project_name: "Feeder Rebuild".into(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            days_late: 75,
        }
    }

    fn delivery(po_number: &str) -> StatusFinding {
        StatusFinding::DeliveryExceedsForecast {
            po_number: po_number.into(),
            amount: 48_000.0,
            month: 6,
            delivery_date: NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
            monthly_forecast: 12_500.0,
            ratio: 3.84,
        }
    }

    #[test]
    fn test_no_findings_no_questions() {
        assert!(build_questions(&[], &[], &[], &[], &[]).is_empty());
    }

    #[test]
    fn test_one_question_per_severity() {
        let variance = vec![
            flag(FlagKind::Variance, Severity::Over),
            flag(FlagKind::Variance, Severity::Over),
            flag(FlagKind::Variance, Severity::Under),
        ];
        let questions = build_questions(&[], &variance, &[], &[], &[]);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].kind, QuestionKind::OverVariance);
        assert!(questions[0].text.contains("2 month(s)"));
        assert_eq!(questions[1].kind, QuestionKind::UnderVariance);
    }

    #[test]
    fn test_stage_order_and_ids() {
        let questions = build_questions(
            &[flag(FlagKind::BudgetUndefined, Severity::Warning)],
            &[flag(FlagKind::Variance, Severity::Over)],
            &[
                alert(AlertKind::NearBudgetLimit),
                alert(AlertKind::InsufficientFutureForecast),
            ],
            &[late(), delivery("PO-7")],
            &[flag(FlagKind::LargePo, Severity::High)],
        );
        let kinds: Vec<QuestionKind> = questions.iter().map(|q| q.kind).collect();
        assert_eq!(
            kinds,
            vec![
                QuestionKind::BudgetUndefined,
                QuestionKind::OverVariance,
                QuestionKind::NearBudgetLimit,
                QuestionKind::InsufficientFutureForecast,
                QuestionKind::ProjectLate,
                QuestionKind::PoDelivery,
                QuestionKind::LargePo,
            ]
        );
        let ids: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q3", "q4", "q5", "q6", "q7"]);
    }

    #[test]
    fn test_single_large_po_question_for_many_flags() {
        let po_flags = vec![
            flag(FlagKind::LargePo, Severity::High),
            flag(FlagKind::LargePo, Severity::High),
        ];
        let questions = build_questions(&[], &[], &[], &[], &po_flags);
        assert_eq!(questions.len(), 1);
        assert!(questions[0].text.starts_with("2 purchase order(s)"));
    }

    #[test]
    fn test_duplicate_alerts_deduplicated() {
        let alerts = vec![
            alert(AlertKind::NearBudgetLimit),
            alert(AlertKind::NearBudgetLimit),
        ];
        let questions = build_questions(&[], &[], &alerts, &[], &[]);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "q1");
    }

    #[test]
    fn test_schedule_questions_name_their_subject() {
        let questions = build_questions(&[], &[], &[], &[late(), delivery("PO-7"), delivery("PO-8")], &[]);
        assert_eq!(questions.len(), 3);

        assert_eq!(
            questions[0].text,
            "Project 'Feeder Rebuild' appears to be past its anticipated end date (2024-01-31). Is there a risk that the project will cost more than forecast?"
        );
        let values: Vec<&str> = questions[0].options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["yes_increase", "yes_minor", "no_on_track", "pending_review"]);
        assert!(questions[0].requires_reason);

        assert_eq!(
            questions[1].text,
            "PO PO-7 ($48,000) has estimated delivery in month 6, but the forecast for that month is only $12,500. How should this be handled?"
        );
        let values: Vec<&str> = questions[1].options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(
            values,
            vec!["increase_forecast", "spread_months", "delay_expected", "already_accounted"]
        );
        assert!(questions[2].text.starts_with("PO PO-8 "));
    }
}
