//! Simulation request/result types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vbl_domain::{
    EvaluationRecord, GuardrailConfig, OrderPolicyConfig, Trade, TriggerConfig,
};
use vbl_engine::EngineError;

use crate::loader::LoadError;
use crate::metrics::SimulationMetrics;

/// Which bar price drives the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimPrice {
    Close,
    Open,
}

impl Default for SimPrice {
    fn default() -> Self {
        Self::Close
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub ticker: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_cash: Decimal,
    pub interval_minutes: u32,
    pub include_after_hours: bool,
    #[serde(default)]
    pub sim_price: SimPrice,
    pub trigger: TriggerConfig,
    pub guardrail: GuardrailConfig,
    pub order_policy: OrderPolicyConfig,
}

impl SimulationRequest {
    /// Default-config request over a date range.
    pub fn new(
        ticker: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        initial_cash: Decimal,
        interval_minutes: u32,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            start,
            end,
            initial_cash,
            interval_minutes,
            include_after_hours: false,
            sim_price: SimPrice::default(),
            trigger: TriggerConfig::default(),
            guardrail: GuardrailConfig::default(),
            order_policy: OrderPolicyConfig::default(),
        }
    }
}

/// The serializable outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub ticker: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_minutes: u32,
    pub include_after_hours: bool,
    pub sim_price: SimPrice,
    pub bar_count: usize,
    pub initial_cash: Decimal,
    pub final_qty: Decimal,
    pub final_cash: Decimal,
    pub final_anchor: Option<Decimal>,
    pub final_value: Decimal,
    pub metrics: SimulationMetrics,
    pub trades: Vec<Trade>,
}

/// Result plus the per-bar timeline (one record per bar).
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRun {
    pub result: SimulationResult,
    pub records: Vec<EvaluationRecord>,
}

#[derive(Debug)]
pub enum SimError {
    /// The requested range produced no bars.
    NoBars { ticker: String },
    /// Request validation failed.
    InvalidRequest { message: String },
    /// Bar data could not be loaded.
    Load(LoadError),
    /// A use case failed fatally mid-run.
    Engine(EngineError),
    /// Market-data port failure while fetching bars.
    Market(vbl_domain::DomainError),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBars { ticker } => write!(f, "no bars for {ticker} in requested range"),
            Self::InvalidRequest { message } => write!(f, "invalid simulation request: {message}"),
            Self::Load(e) => write!(f, "bar load error: {e}"),
            Self::Engine(e) => write!(f, "engine error: {e}"),
            Self::Market(e) => write!(f, "market data error: {e}"),
        }
    }
}

impl std::error::Error for SimError {}

impl From<LoadError> for SimError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<EngineError> for SimError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}
