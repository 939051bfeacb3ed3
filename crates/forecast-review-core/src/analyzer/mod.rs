pub mod metrics;
pub mod po_analyzer;
pub mod project_status;
pub mod report;
pub mod thresholds;
pub mod variance;
