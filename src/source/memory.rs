//! In-memory persistence, used by tests and the simulated setup.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

use crate::domain::{ForecastPoint, HourlySeries, Observation, TimeRange};
use crate::source::{ForecastStore, ReadingSource};

#[derive(Default)]
struct Tables {
    consumption: BTreeMap<NaiveDateTime, f64>,
    latest_forecast: BTreeMap<(NaiveDate, u32), f64>,
    forecast_history: BTreeMap<(NaiveDate, u32), f64>,
}

/// Store with the same key semantics as the Postgres tables: consumption
/// upserts, latest forecast replaces, history keeps the first write.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consumption(&self) -> Vec<(NaiveDateTime, f64)> {
        let tables = self.tables.lock();
        tables.consumption.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn latest_forecast(&self) -> Vec<((NaiveDate, u32), f64)> {
        let tables = self.tables.lock();
        tables.latest_forecast.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn forecast_history(&self) -> Vec<((NaiveDate, u32), f64)> {
        let tables = self.tables.lock();
        tables.forecast_history.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

#[async_trait]
impl ForecastStore for InMemoryStore {
    async fn latest_reconstructed(&self) -> Result<Option<NaiveDateTime>> {
        let tables = self.tables.lock();
        Ok(tables.consumption.keys().next_back().copied())
    }

    async fn reconstructed_history(&self) -> Result<Vec<Observation>> {
        let tables = self.tables.lock();
        Ok(tables
            .consumption
            .iter()
            .map(|(t, v)| Observation { timestamp: *t, kvah: *v })
            .collect())
    }

    async fn persist_reconstructed(&self, series: &HourlySeries) -> Result<()> {
        let mut tables = self.tables.lock();
        for point in series.points() {
            tables.consumption.insert(point.timestamp, point.kvah);
        }
        Ok(())
    }

    async fn persist_forecast_latest(&self, points: &[ForecastPoint]) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.latest_forecast.clear();
        for p in points {
            tables.latest_forecast.insert((p.date, p.hour), p.predicted_kvah);
        }
        Ok(())
    }

    async fn persist_forecast_history(&self, points: &[ForecastPoint]) -> Result<()> {
        let mut tables = self.tables.lock();
        for p in points {
            tables
                .forecast_history
                .entry((p.date, p.hour))
                .or_insert(p.predicted_kvah);
        }
        Ok(())
    }
}

/// Fixed observation list, mostly for tests.
pub struct VecSource {
    observations: Vec<Observation>,
}

impl VecSource {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }
}

#[async_trait]
impl ReadingSource for VecSource {
    async fn fetch_observations(&self, range: TimeRange) -> Result<Vec<Observation>> {
        Ok(self
            .observations
            .iter()
            .filter(|o| o.timestamp >= range.start && o.timestamp < range.end)
            .copied()
            .collect())
    }
}
