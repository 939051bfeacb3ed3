//! Ten-stage review pipeline over a single analysis state.
//!
//! Stages run strictly in order, each writing its own section of the state
//! exactly once. Validation failure rejects the request before any stage
//! runs; the narrative stage degrades instead of failing; anything else that
//! goes wrong is an invariant violation.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analyzer::metrics::{self, Metrics};
use crate::analyzer::po_analyzer;
use crate::analyzer::project_status::{check_project_status, StatusFinding};
use crate::analyzer::report::{compile_response, Flag, ForecastReview, ThresholdAlert};
use crate::analyzer::thresholds;
use crate::analyzer::variance::{self, VarianceAnalysis};
use crate::config::{ReviewConfig, Thresholds};
use crate::error::PipelineError;
use crate::model::{ReviewInput, ReviewRequest};
use crate::narrative::{summary_line, NarrativeContext, NarrativeOutcome, Narrator, ScenarioBrief};
use crate::questions::{build_questions, Question};
use crate::sanitize::sanitize_project_name;
use crate::scenarios::{check_history_preserved, generate_scenarios, Scenario};
use crate::validate::validate_request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Loaded,
    Metrics,
    Variance,
    Thresholds,
    ProjectStatus,
    PoAnalysis,
    Scenarios,
    Questions,
    Narrative,
    Compiled,
    Rejected,
}

impl Stage {
    /// The only stage that may follow this one.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Loaded => Some(Stage::Metrics),
            Stage::Metrics => Some(Stage::Variance),
            Stage::Variance => Some(Stage::Thresholds),
            Stage::Thresholds => Some(Stage::ProjectStatus),
            Stage::ProjectStatus => Some(Stage::PoAnalysis),
            Stage::PoAnalysis => Some(Stage::Scenarios),
            Stage::Scenarios => Some(Stage::Questions),
            Stage::Questions => Some(Stage::Narrative),
            Stage::Narrative => Some(Stage::Compiled),
            Stage::Compiled | Stage::Rejected => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Loaded => "loaded",
            Stage::Metrics => "metrics",
            Stage::Variance => "variance",
            Stage::Thresholds => "thresholds",
            Stage::ProjectStatus => "project-status",
            Stage::PoAnalysis => "po-analysis",
            Stage::Scenarios => "scenarios",
            Stage::Questions => "questions",
            Stage::Narrative => "narrative",
            Stage::Compiled => "compiled",
            Stage::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeSection {
    pub summary: String,
    pub outcome: NarrativeOutcome,
}

/// The record threaded through one pipeline run.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    stage: Stage,
    pub(crate) session_id: String,
    pub(crate) input: ReviewInput,
    pub(crate) metrics: Option<Metrics>,
    pub(crate) metric_flags: Vec<Flag>,
    pub(crate) variance: Option<VarianceAnalysis>,
    pub(crate) threshold_alerts: Option<Vec<ThresholdAlert>>,
    pub(crate) status_findings: Option<Vec<StatusFinding>>,
    pub(crate) po_flags: Option<Vec<Flag>>,
    pub(crate) scenarios: Option<Vec<Scenario>>,
    pub(crate) questions: Option<Vec<Question>>,
    pub(crate) narrative: Option<NarrativeSection>,
}

impl AnalysisState {
    pub fn load(input: ReviewInput) -> Self {
        Self {
            stage: Stage::Loaded,
            session_id: uuid::Uuid::new_v4().to_string(),
            input,
            metrics: None,
            metric_flags: Vec::new(),
            variance: None,
            threshold_alerts: None,
            status_findings: None,
            po_flags: None,
            scenarios: None,
            questions: None,
            narrative: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn input(&self) -> &ReviewInput {
        &self.input
    }

    /// Flags from every stage, in stage order.
    pub fn all_flags(&self) -> Vec<Flag> {
        let mut flags = self.metric_flags.clone();
        if let Some(variance) = &self.variance {
            flags.extend(variance.flags.iter().cloned());
        }
        if let Some(findings) = &self.status_findings {
            flags.extend(findings.iter().map(StatusFinding::to_flag));
        }
        if let Some(po_flags) = &self.po_flags {
            flags.extend(po_flags.iter().cloned());
        }
        flags
    }

    /// Move forward to `target`, which must be the immediate successor.
    fn enter(&mut self, target: Stage) -> Result<(), PipelineError> {
        if self.stage.next() != Some(target) {
            let detail = format!("cannot move from {} to {}", self.stage, target);
            tracing::warn!(request_id = %self.input.request_id, %detail, "stage order violated");
            return Err(PipelineError::invariant(target, detail));
        }
        tracing::debug!(request_id = %self.input.request_id, stage = %target, "entering stage");
        self.stage = target;
        Ok(())
    }

    fn require<'a, T>(section: &'a Option<T>, stage: Stage, name: &str) -> Result<&'a T, PipelineError> {
        section
            .as_ref()
            .ok_or_else(|| PipelineError::invariant(stage, format!("{} section missing", name)))
    }

    fn compute_metrics(&mut self) -> Result<(), PipelineError> {
        self.enter(Stage::Metrics)?;
        let computed = metrics::calculate_metrics(&self.input);
        self.metric_flags = metrics::metric_flags(&computed);
        self.metrics = Some(computed);
        Ok(())
    }

    fn detect_variances(&mut self, limits: &Thresholds) -> Result<(), PipelineError> {
        self.enter(Stage::Variance)?;
        self.variance = Some(variance::detect_variances(&self.input, limits));
        Ok(())
    }

    fn check_thresholds(&mut self, limits: &Thresholds) -> Result<(), PipelineError> {
        self.enter(Stage::Thresholds)?;
        let metrics = Self::require(&self.metrics, Stage::Thresholds, "metrics")?;
        self.threshold_alerts = Some(thresholds::check_thresholds(metrics, limits));
        Ok(())
    }

    fn check_project_status(&mut self) -> Result<(), PipelineError> {
        self.enter(Stage::ProjectStatus)?;
        self.status_findings = Some(check_project_status(&self.input));
        Ok(())
    }

    fn analyze_pos(&mut self, limits: &Thresholds) -> Result<(), PipelineError> {
        self.enter(Stage::PoAnalysis)?;
        self.po_flags = Some(po_analyzer::analyze_pos(&self.input, limits));
        Ok(())
    }

    fn generate_scenarios(&mut self) -> Result<(), PipelineError> {
        self.enter(Stage::Scenarios)?;
        let metrics = Self::require(&self.metrics, Stage::Scenarios, "metrics")?;
        let variance = Self::require(&self.variance, Stage::Scenarios, "variance")?;
        let scenarios = generate_scenarios(&self.input, metrics, variance);
        check_history_preserved(&self.input, &scenarios)
            .map_err(|detail| PipelineError::invariant(Stage::Scenarios, detail))?;
        self.scenarios = Some(scenarios);
        Ok(())
    }

    fn build_questions(&mut self) -> Result<(), PipelineError> {
        self.enter(Stage::Questions)?;
        let variance = Self::require(&self.variance, Stage::Questions, "variance")?;
        let alerts = Self::require(&self.threshold_alerts, Stage::Questions, "threshold")?;
        let status = Self::require(&self.status_findings, Stage::Questions, "project status")?;
        let po_flags = Self::require(&self.po_flags, Stage::Questions, "po")?;
        self.questions = Some(build_questions(
            &self.metric_flags,
            &variance.flags,
            alerts,
            status,
            po_flags,
        ));
        Ok(())
    }

    fn narrative_context(&self) -> Result<NarrativeContext, PipelineError> {
        let metrics = Self::require(&self.metrics, Stage::Narrative, "metrics")?;
        let alerts = Self::require(&self.threshold_alerts, Stage::Narrative, "threshold")?;
        let scenarios = Self::require(&self.scenarios, Stage::Narrative, "scenarios")?;
        Ok(NarrativeContext {
            project_name: sanitize_project_name(&self.input.project.name),
            budget: metrics.budget,
            approved_amount: metrics.approved_amount,
            total_actuals: metrics.total_actuals,
            consumption_pct: metrics.consumption_pct,
            consumption_defined: metrics.consumption_defined,
            net_order_value: metrics.net_order_value,
            flags: self.all_flags(),
            alerts: alerts.clone(),
            scenarios: scenarios
                .iter()
                .map(|s| ScenarioBrief {
                    name: s.name.clone(),
                    rationale: s.rationale.clone(),
                })
                .collect(),
        })
    }

    async fn explain(&mut self, narrator: &Narrator) -> Result<(), PipelineError> {
        self.enter(Stage::Narrative)?;
        let context = self.narrative_context()?;
        let outcome = narrator.narrate(&context).await;
        self.narrative = Some(NarrativeSection {
            summary: summary_line(&context),
            outcome,
        });
        Ok(())
    }

    fn compile(&mut self) -> Result<ForecastReview, PipelineError> {
        self.enter(Stage::Compiled)?;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        compile_response(self, timestamp)
            .ok_or_else(|| PipelineError::invariant(Stage::Compiled, "state incomplete at compile"))
    }
}

/// Runs review requests. Holds no per-request state, so one instance can
/// serve concurrent requests.
pub struct ReviewPipeline {
    thresholds: Thresholds,
    narrator: Narrator,
}

impl ReviewPipeline {
    pub fn new(config: ReviewConfig) -> anyhow::Result<Self> {
        let narrator = Narrator::new(config.narrative)?;
        Ok(Self::with_narrator(config.thresholds, narrator))
    }

    pub fn with_narrator(thresholds: Thresholds, narrator: Narrator) -> Self {
        Self {
            thresholds,
            narrator,
        }
    }

    /// Pipeline with default thresholds and no narrative service.
    pub fn offline() -> Self {
        Self::with_narrator(Thresholds::default(), Narrator::template())
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Run one request through every stage. Requests without a review date
    /// are evaluated as of today.
    pub async fn run(&self, request: ReviewRequest) -> Result<ForecastReview, PipelineError> {
        let input = validate_request(request, Utc::now().date_naive()).map_err(|report| {
            tracing::warn!(stage = %Stage::Rejected, errors = report.errors.len(), "request rejected");
            PipelineError::Rejected(report)
        })?;

        let mut state = AnalysisState::load(input);
        state.compute_metrics()?;
        state.detect_variances(&self.thresholds)?;
        state.check_thresholds(&self.thresholds)?;
        state.check_project_status()?;
        state.analyze_pos(&self.thresholds)?;
        state.generate_scenarios()?;
        state.build_questions()?;
        state.explain(&self.narrator).await?;
        let review = state.compile()?;

        tracing::info!(
            request_id = %review.request_id,
            flags = review.flags.len(),
            alerts = review.threshold_alerts.len(),
            fallback = review.used_fallback(),
            "review compiled"
        );
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::report::{AlertKind, ExplanationSource, FlagKind, Severity};
    use crate::analyzer::test_support::{input, po, period};
    use crate::model::{
        ForecastPeriod, OrderRecord, PeriodRecord, PoStatus, ProjectRecord, PurchaseOrder, ReasonCode,
    };
    use crate::questions::QuestionKind;
    use std::sync::Arc;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn request(
        budget: f64,
        periods: Vec<ForecastPeriod>,
        purchase_orders: Vec<PurchaseOrder>,
    ) -> ReviewRequest {
        ReviewRequest {
            request_id: Some("req-42".into()),
            project: Some(ProjectRecord {
                id: Some("PRJ-001".into()),
                code: Some("SUB-UPG".into()),
                name: Some("Substation Upgrade".into()),
                budget: Some(budget),
                approved_amount: Some(budget),
                status: Some("active".into()),
                anticipated_end_date: Some("2024-12-31".into()),
            }),
            fiscal_year: Some(2024),
            current_month: Some(4),
            forecasts: Some(
                periods
                    .into_iter()
                    .map(|p| PeriodRecord {
                        month: Some(p.month),
                        base_forecast: Some(p.base_forecast),
                        forecast_with_rollover: Some(p.forecast_with_rollover),
                        actual: p.actual,
                    })
                    .collect(),
            ),
            purchase_orders: purchase_orders
                .into_iter()
                .map(|po| OrderRecord {
                    po_number: Some(po.po_number),
                    amount: Some(po.amount),
                    status: po.status,
                    issue_date: None,
                    estimated_delivery: po.estimated_delivery.map(|d| d.to_string()),
                })
                .collect(),
            reason_codes: Vec::new(),
            review_date: Some("2024-04-15".into()),
        }
    }

    fn reference_request() -> ReviewRequest {
        request(
            120_000.0,
            vec![
                period(1, 10_000.0, Some(9_500.0)),
                period(2, 10_000.0, Some(10_500.0)),
                period(3, 10_000.0, Some(16_000.0)),
                period(4, 10_000.0, None),
                period(5, 10_000.0, None),
            ],
            vec![
                po("PO-1", 10_000.0, PoStatus::Approved),
                po("PO-2", 12_000.0, PoStatus::Delivered),
                po("PO-3", 30_000.0, PoStatus::Approved),
            ],
        )
    }

    #[test]
    fn test_stage_sequence_is_linear() {
        let mut stage = Stage::Loaded;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited.len(), 10);
        assert_eq!(stage, Stage::Compiled);
        assert!(Stage::Rejected.is_terminal());
    }

    #[test]
    fn test_reference_run() {
        let review = runtime()
            .block_on(ReviewPipeline::offline().run(reference_request()))
            .unwrap();

        assert_eq!(review.status, "completed");
        assert_eq!(review.analysis.total_actuals_to_date, 36_000.0);
        assert_eq!(review.analysis.budget_consumption_percent, 30.0);
        assert_eq!(review.analysis.net_order_value, 16_000.0);
        assert!(review.threshold_alerts.is_empty());
        assert_eq!(review.issue_count(), 1);

        let variance: Vec<_> = review.flags_of(FlagKind::Variance).collect();
        assert_eq!(variance.len(), 1);
        assert_eq!(variance[0].period, Some(3));
        assert_eq!(variance[0].severity, Severity::Over);

        assert_eq!(review.scenarios.len(), 3);
        assert_eq!(review.questions.len(), 1);
        assert_eq!(review.questions[0].kind, QuestionKind::OverVariance);
        assert!(!review.explanation.is_empty());
        assert_eq!(
            review.explanation_source,
            ExplanationSource::Fallback {
                reason: "narrative service disabled".into()
            }
        );
        assert_eq!(
            review.analysis.summary,
            "Budget analysis for Substation Upgrade: 30.0% consumed, 1 issues detected."
        );
    }

    #[test]
    fn test_rejection_runs_no_stage() {
        let mut req = reference_request();
        req.current_month = Some(13);
        req.project = None;
        let err = runtime()
            .block_on(ReviewPipeline::offline().run(req))
            .unwrap_err();
        let report = err.validation_report().unwrap();
        assert!(report.has_field("current_month"));
        assert!(report.has_field("project"));
    }

    #[test]
    fn test_questions_follow_stage_order() {
        // 92% consumed, month 2 over, NOV shortfall, one large PO
        let req = request(
            10_000.0,
            vec![
                period(1, 4_000.0, Some(4_000.0)),
                period(2, 4_000.0, Some(5_200.0)),
                period(3, 1_000.0, None),
            ],
            vec![
                po("PO-1", 1_000.0, PoStatus::Approved),
                po("PO-2", 1_000.0, PoStatus::Approved),
                po("PO-3", 1_000.0, PoStatus::Approved),
                po("PO-4", 9_000.0, PoStatus::Approved),
            ],
        );
        let review = runtime().block_on(ReviewPipeline::offline().run(req)).unwrap();
        assert!(review.has_alert(AlertKind::NearBudgetLimit));
        assert!(review.has_alert(AlertKind::InsufficientFutureForecast));
        let kinds: Vec<QuestionKind> = review.questions.iter().map(|q| q.kind).collect();
        assert_eq!(
            kinds,
            vec![
                QuestionKind::OverVariance,
                QuestionKind::NearBudgetLimit,
                QuestionKind::InsufficientFutureForecast,
                QuestionKind::LargePo,
            ]
        );
    }

    #[test]
    fn test_out_of_order_stage_is_invariant_violation() {
        let mut state = AnalysisState::load(input(1_000.0, vec![period(1, 100.0, None)], vec![]));
        let err = state.check_thresholds(&Thresholds::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvariantViolation { stage: Stage::Thresholds, .. }
        ));
        assert_eq!(state.stage(), Stage::Loaded);
    }

    #[test]
    fn test_stage_cannot_run_twice() {
        let mut state = AnalysisState::load(input(1_000.0, vec![period(1, 100.0, None)], vec![]));
        state.compute_metrics().unwrap();
        assert!(state.compute_metrics().is_err());
        assert_eq!(state.stage(), Stage::Metrics);
    }

    #[test]
    fn test_input_snapshot_untouched() {
        let input = input(
            50_000.0,
            vec![period(1, 100.0, Some(500.0)), period(2, 100.0, None)],
            vec![po("PO-1", 40_000.0, PoStatus::Approved)],
        );
        let before = input.clone();
        let mut state = AnalysisState::load(input);
        state.compute_metrics().unwrap();
        state.detect_variances(&Thresholds::default()).unwrap();
        state.check_thresholds(&Thresholds::default()).unwrap();
        state.check_project_status().unwrap();
        state.analyze_pos(&Thresholds::default()).unwrap();
        state.generate_scenarios().unwrap();
        assert_eq!(state.input(), &before);
    }

    #[test]
    fn test_concurrent_requests_are_independent() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let pipeline = Arc::new(ReviewPipeline::offline());

        let reviews = rt.block_on(async {
            let mut handles = Vec::new();
            for i in 0..8 {
                let pipeline = Arc::clone(&pipeline);
                handles.push(tokio::spawn(async move {
                    let mut req = reference_request();
                    req.request_id = Some(format!("req-{}", i));
                    pipeline.run(req).await
                }));
            }
            let mut out = Vec::new();
            for handle in handles {
                out.push(handle.await.unwrap().unwrap());
            }
            out
        });

        let mut sessions: Vec<&str> = reviews.iter().map(|r| r.session_id.as_str()).collect();
        sessions.sort();
        sessions.dedup();
        assert_eq!(sessions.len(), 8);
        for (i, review) in reviews.iter().enumerate() {
            assert_eq!(review.request_id, format!("req-{}", i));
            assert_eq!(review.flags.len(), reviews[0].flags.len());
        }
    }

    #[test]
    fn test_project_status_stage_sits_between_thresholds_and_pos() {
        assert_eq!(Stage::Thresholds.next(), Some(Stage::ProjectStatus));
        assert_eq!(Stage::ProjectStatus.next(), Some(Stage::PoAnalysis));
        assert_eq!(Stage::ProjectStatus.to_string(), "project-status");

        let mut state = AnalysisState::load(input(1_000.0, vec![period(1, 100.0, None)], vec![]));
        state.compute_metrics().unwrap();
        state.detect_variances(&Thresholds::default()).unwrap();
        assert!(state.analyze_pos(&Thresholds::default()).is_err());
        state.check_thresholds(&Thresholds::default()).unwrap();
        assert!(state.analyze_pos(&Thresholds::default()).is_err());
        state.check_project_status().unwrap();
        state.analyze_pos(&Thresholds::default()).unwrap();
    }

    #[test]
    fn test_late_project_and_heavy_delivery_reach_review() {
        let mut req = reference_request();
        if let Some(project) = req.project.as_mut() {
            project.anticipated_end_date = Some("2024-02-29".into());
        }
        // month 5 forecast is 10,000
        req.purchase_orders[2].estimated_delivery = Some("2024-05-10".into());
        req.purchase_orders[2].amount = Some(45_000.0);

        let review = runtime().block_on(ReviewPipeline::offline().run(req)).unwrap();

        let late: Vec<_> = review.flags_of(FlagKind::ProjectLate).collect();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].severity, Severity::High);
        assert_eq!(late[0].magnitude, Some(46.0));

        let delivery: Vec<_> = review.flags_of(FlagKind::PoDeliveryExceedsForecast).collect();
        assert_eq!(delivery.len(), 1);
        assert_eq!(delivery[0].po_number.as_deref(), Some("PO-3"));
        assert_eq!(delivery[0].severity, Severity::High);
        assert_eq!(delivery[0].magnitude, Some(4.5));

        // status flags follow variance flags and precede PO flags
        let kinds: Vec<FlagKind> = review.flags.iter().map(|f| f.kind).collect();
        let late_at = kinds.iter().position(|k| *k == FlagKind::ProjectLate).unwrap();
        let variance_at = kinds.iter().position(|k| *k == FlagKind::Variance).unwrap();
        assert!(variance_at < late_at);

        let question_kinds: Vec<QuestionKind> = review.questions.iter().map(|q| q.kind).collect();
        assert!(question_kinds.contains(&QuestionKind::ProjectLate));
        assert!(question_kinds.contains(&QuestionKind::PoDelivery));
        assert!(review.questions.iter().any(|q| q.text.starts_with("PO PO-3 ($45,000)")));
    }

    #[test]
    fn test_reason_codes_echoed() {
        let mut req = reference_request();
        req.reason_codes = vec![ReasonCode {
            code: "inflation".into(),
            description: "Price escalation".into(),
        }];
        let review = runtime().block_on(ReviewPipeline::offline().run(req)).unwrap();
        assert_eq!(review.reason_codes.len(), 1);
        assert_eq!(review.reason_codes[0].code, "inflation");
    }
}
