use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format accepted for every calendar field of a request.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A reason the reviewer may attach to a forecast change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCode {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

// ─── Wire records ───
//
// Everything the validator checks is optional here, so a missing value is
// reported as a field error instead of stopping the decoder.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRecord {
    pub id: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub budget: Option<f64>,
    pub approved_amount: Option<f64>,
    pub status: Option<String>,
    pub anticipated_end_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodRecord {
    pub month: Option<u8>,
    pub base_forecast: Option<f64>,
    /// Falls back to `base_forecast` when absent.
    pub forecast_with_rollover: Option<f64>,
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRecord {
    pub po_number: Option<String>,
    pub amount: Option<f64>,
    pub status: PoStatus,
    pub issue_date: Option<String>,
    pub estimated_delivery: Option<String>,
}

/// Request record as received from the caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewRequest {
    pub request_id: Option<String>,
    pub project: Option<ProjectRecord>,
    pub fiscal_year: Option<i32>,
    pub current_month: Option<u8>,
    pub forecasts: Option<Vec<PeriodRecord>>,
    pub purchase_orders: Vec<OrderRecord>,
    /// Reason codes the reviewer can choose from.
    pub reason_codes: Vec<ReasonCode>,
    /// Date the review is evaluated at; today when absent.
    pub review_date: Option<String>,
}

// ─── Validated snapshot ───

/// Project header after validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub budget: f64,
    pub approved_amount: f64,
    pub status: Option<String>,
    pub anticipated_end_date: Option<NaiveDate>,
}

impl Project {
    /// Finished projects are never late.
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status.as_deref().map(|s| s.trim().to_ascii_lowercase()).as_deref(),
            Some("complete" | "completed" | "closed")
        )
    }
}

/// One fiscal month of the forecast series.
///
/// A period with an `actual` is closed; its values are history and no stage
/// may re-target it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPeriod {
    pub month: u8,
    pub base_forecast: f64,
    pub forecast_with_rollover: f64,
    pub actual: Option<f64>,
}

impl ForecastPeriod {
    pub fn is_closed(&self) -> bool {
        self.actual.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.actual.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoStatus {
    Approved,
    #[default]
    Pending,
    Delivered,
    Closed,
    #[serde(alias = "canceled")]
    Cancelled,
    #[serde(other)]
    Other,
}

impl PoStatus {
    /// Cancelled orders carry no commitment.
    pub fn is_committed(&self) -> bool {
        !matches!(self, PoStatus::Cancelled)
    }

    /// Goods still to arrive.
    pub fn awaiting_delivery(&self) -> bool {
        !matches!(
            self,
            PoStatus::Delivered | PoStatus::Closed | PoStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseOrder {
    pub po_number: String,
    pub amount: f64,
    pub status: PoStatus,
    pub issue_date: Option<NaiveDate>,
    pub estimated_delivery: Option<NaiveDate>,
}

/// Validated, immutable input snapshot. Periods are ordered by month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewInput {
    pub request_id: String,
    pub project: Project,
    pub fiscal_year: i32,
    pub current_month: u8,
    pub periods: Vec<ForecastPeriod>,
    pub purchase_orders: Vec<PurchaseOrder>,
    pub reason_codes: Vec<ReasonCode>,
    pub review_date: NaiveDate,
}

impl ReviewInput {
    pub fn closed_periods(&self) -> impl Iterator<Item = &ForecastPeriod> {
        self.periods.iter().filter(|p| p.is_closed())
    }

    pub fn open_periods(&self) -> impl Iterator<Item = &ForecastPeriod> {
        self.periods.iter().filter(|p| p.is_open())
    }

    pub fn committed_orders(&self) -> impl Iterator<Item = &PurchaseOrder> {
        self.purchase_orders.iter().filter(|po| po.status.is_committed())
    }

    pub fn period(&self, month: u8) -> Option<&ForecastPeriod> {
        self.periods.iter().find(|p| p.month == month)
    }
}
