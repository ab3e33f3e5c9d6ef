//! Collaborator interfaces around the forecasting core
//!
//! The core itself is pure and synchronous; everything it reads (raw
//! readings, holidays) and writes (reconstructed series, forecasts) goes
//! through these traits, passed in explicitly rather than held as ambient
//! globals.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::domain::{ForecastPoint, HolidayAnnotation, HourlySeries, Observation, TimeRange};

pub mod http;
pub mod memory;
#[cfg(feature = "db")]
pub mod pg;
#[cfg(feature = "sim")]
pub mod sim;

/// Source of raw meter readings. May return an empty set (fatal for
/// reconstruction) or a sparse, irregular one (expected).
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch_observations(&self, range: TimeRange) -> Result<Vec<Observation>>;
}

/// Externally curated holiday list; absence is an empty set, not an error.
#[async_trait]
pub trait HolidayProvider: Send + Sync {
    async fn fetch_holidays(&self) -> Result<Vec<HolidayAnnotation>>;
}

/// Persistence for the cleaned history and both forecast records.
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Latest hour already reconstructed, used to size the fetch window.
    async fn latest_reconstructed(&self) -> Result<Option<NaiveDateTime>>;

    /// Everything persisted so far, in timestamp order. Feeding these back
    /// through reconstruction is a no-op, so runs can mix stored history
    /// with freshly fetched readings.
    async fn reconstructed_history(&self) -> Result<Vec<Observation>>;

    /// Upsert by (date, hour); re-running over overlapping ranges is
    /// idempotent.
    async fn persist_reconstructed(&self, series: &HourlySeries) -> Result<()>;

    /// Full replace: the prior "latest" forecast for any covered date is
    /// superseded.
    async fn persist_forecast_latest(&self, points: &[ForecastPoint]) -> Result<()>;

    /// Append-only keyed by (date, hour); duplicate keys are ignored so the
    /// record of what was predicted is never rewritten.
    async fn persist_forecast_history(&self, points: &[ForecastPoint]) -> Result<()>;
}

/// Static holiday list handed in at startup (or none at all).
pub struct StaticHolidays {
    holidays: Vec<HolidayAnnotation>,
}

impl StaticHolidays {
    pub fn new(holidays: Vec<HolidayAnnotation>) -> Self {
        Self { holidays }
    }
}

#[async_trait]
impl HolidayProvider for StaticHolidays {
    async fn fetch_holidays(&self) -> Result<Vec<HolidayAnnotation>> {
        Ok(self.holidays.clone())
    }
}
