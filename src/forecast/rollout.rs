//! Iterative 24-hour rollout
//!
//! Drives 24 sequential one-hour-ahead predictions for the day after the
//! last history date. Each step's final value is appended to the as-of
//! series so the next step can use it as its lag-1 feature; lag-24 comes
//! from history or from an earlier rollout step. A missing lag forces the
//! residual correction to zero for that hour instead of failing the run.

use chrono::{Datelike, Duration, Timelike};
use tracing::{debug, info};

use crate::domain::{ForecastPoint, HourlySeries};
use crate::forecast::baseline::FittedBaseline;
use crate::forecast::features::{residual_row, AsOfSeries, FeatureBuilder};
use crate::forecast::residual::FittedResidual;
use crate::pipeline::ForecastError;

pub const ROLLOUT_HOURS: u32 = 24;

pub struct RolloutEngine<'a> {
    features: &'a FeatureBuilder,
    baseline: &'a FittedBaseline,
    residual: &'a FittedResidual,
}

impl<'a> RolloutEngine<'a> {
    pub fn new(
        features: &'a FeatureBuilder,
        baseline: &'a FittedBaseline,
        residual: &'a FittedResidual,
    ) -> Self {
        Self {
            features,
            baseline,
            residual,
        }
    }

    /// Produce the full next-day forecast or fail as a whole; never a
    /// partial sequence.
    pub fn run(&self, history: &HourlySeries) -> Result<Vec<ForecastPoint>, ForecastError> {
        if history.is_empty() {
            return Err(ForecastError::EmptyInput);
        }

        let forecast_date = history.end().date() + Duration::days(1);
        let mut as_of = AsOfSeries::from_history(history);
        let mut points = Vec::with_capacity(ROLLOUT_HOURS as usize);

        for hour in 0..ROLLOUT_HOURS {
            let timestamp = forecast_date
                .and_hms_opt(hour, 0, 0)
                .expect("rollout hour in 0..24");
            let hour_features = self.features.build(timestamp);
            let lags = self.features.lags(&as_of, timestamp);

            let baseline_pred = self.baseline.predict(timestamp, &hour_features)?;
            // Fail-soft: without both lags the corrector was never trained on
            // a comparable row, so the hour stays baseline-only.
            let correction = match residual_row(&hour_features, &lags) {
                Some(row) => self.residual.predict(&row)?,
                None => 0.0,
            };

            let value = (baseline_pred + correction)
                .clamp(self.baseline.floor(), self.baseline.cap());
            let value = round2(value);

            debug!(
                %timestamp,
                baseline = baseline_pred,
                correction,
                value,
                "rollout step"
            );

            as_of.insert(timestamp, value);
            points.push(ForecastPoint {
                date: forecast_date,
                hour: timestamp.hour(),
                predicted_kvah: value,
            });
        }

        info!(
            date = %forecast_date,
            weekday = %forecast_date.weekday(),
            hours = points.len(),
            "next-day forecast complete"
        );
        Ok(points)
    }
}

/// Persistence precision: two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
