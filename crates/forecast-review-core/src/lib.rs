pub mod analyzer;
pub mod config;
pub mod error;
pub mod model;
pub mod narrative;
pub mod pipeline;
pub mod questions;
pub mod sanitize;
pub mod scenarios;
pub mod validate;

pub use analyzer::report::{AlertKind, Flag, FlagKind, ForecastReview, Severity, ThresholdAlert};
pub use config::{ReviewConfig, Thresholds};
pub use error::{PipelineError, ValidationReport};
pub use model::{
    ForecastPeriod, OrderRecord, PeriodRecord, PoStatus, Project, ProjectRecord, PurchaseOrder,
    ReasonCode, ReviewRequest,
};
pub use narrative::{NarrativeHealth, NarrativeOutcome, Narrator};
pub use pipeline::{ReviewPipeline, Stage};
pub use scenarios::{Scenario, ScenarioKind, SuggestedReason};
