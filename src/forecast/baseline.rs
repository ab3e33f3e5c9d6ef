//! Seasonal/trend baseline model
//!
//! Additive harmonic regression fit on the reconstructed history: linear
//! trend + weekly seasonality + 24h and 12h sub-daily components (the 12h
//! component captures the day/night shift symmetry) + calendar regressors +
//! event offsets for holiday and weekly-off hours. The regression runs in a
//! logit transform of the target so every prediction saturates logistically
//! between the configured floor and cap.

use std::collections::HashMap;
use std::f64::consts::PI;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};
use tracing::debug;

use crate::domain::{EventAnnotation, EventKind, HourlySeries};
use crate::forecast::features::{bool_flag, FeatureBuilder, HourFeatures};
use crate::pipeline::ForecastError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub floor_kvah: f64,
    pub cap_kvah: f64,
    /// Harmonics for the 168h weekly component.
    pub weekly_order: usize,
    /// Harmonics for the 24h component; sharp shift-boundary transitions
    /// need a high order here.
    pub daily_order: usize,
    /// Harmonics for the 12h shift-cycle component.
    pub half_day_order: usize,
    pub ridge_alpha: f64,
}

impl BaselineConfig {
    /// Number of design-matrix columns: trend + Fourier pairs + hour-of-day +
    /// three pattern flags + two event flags. The fit needs at least this
    /// many rows.
    pub fn design_width(&self) -> usize {
        1 + 2 * (self.weekly_order + self.daily_order + self.half_day_order) + 6
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            floor_kvah: 0.0,
            cap_kvah: 650.0,
            weekly_order: 3,
            daily_order: 8,
            half_day_order: 6,
            ridge_alpha: 1.0,
        }
    }
}

pub struct BaselineForecaster {
    config: BaselineConfig,
}

impl BaselineForecaster {
    pub fn new(config: BaselineConfig) -> Self {
        Self { config }
    }

    /// Fit the baseline on history plus its event annotations.
    pub fn fit(
        &self,
        series: &HourlySeries,
        annotations: &[EventAnnotation],
        features: &FeatureBuilder,
    ) -> Result<FittedBaseline, ForecastError> {
        if series.is_empty() {
            return Err(ForecastError::EmptyInput);
        }

        let events: HashMap<NaiveDateTime, EventKind> = annotations
            .iter()
            .map(|a| (a.timestamp, a.kind))
            .collect();

        let t0 = series.start();
        let mut rows: Vec<f64> = Vec::with_capacity(series.len() * self.config.design_width());
        let mut targets: Vec<f64> = Vec::with_capacity(series.len());
        for point in series.points() {
            let hour_features = features.build(point.timestamp);
            let (holiday, weekly_off) = event_flags(events.get(&point.timestamp));
            rows.extend(design_row(
                &self.config,
                t0,
                point.timestamp,
                &hour_features,
                holiday,
                weekly_off,
            ));
            targets.push(squash(point.kvah, &self.config));
        }

        let n_cols = self.config.design_width();
        let x = DenseMatrix::new(series.len(), n_cols, rows, false);
        // Normalization must stay off: the event columns are constant zero
        // whenever the history contains no holiday, and smartcore refuses to
        // rescale a constant column.
        let params = RidgeRegressionParameters::default()
            .with_alpha(self.config.ridge_alpha)
            .with_normalize(false);
        let model = RidgeRegression::fit(&x, &targets, params)
            .map_err(|e| ForecastError::BaselineFit(format!("{e}")))?;

        debug!(
            samples = series.len(),
            columns = n_cols,
            "baseline model fitted"
        );

        Ok(FittedBaseline {
            model,
            config: self.config.clone(),
            t0,
            training_samples: series.len(),
            model_id: format!("baseline_{}", uuid::Uuid::new_v4()),
        })
    }
}

/// Immutable fitted baseline; prediction never leaves `(floor, cap)`.
#[derive(Debug)]
pub struct FittedBaseline {
    model: RidgeRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    config: BaselineConfig,
    t0: NaiveDateTime,
    pub training_samples: usize,
    pub model_id: String,
}

impl FittedBaseline {
    pub fn predict(
        &self,
        timestamp: NaiveDateTime,
        features: &HourFeatures,
    ) -> Result<f64, ForecastError> {
        let row = design_row(
            &self.config,
            self.t0,
            timestamp,
            features,
            bool_flag(features.is_holiday),
            bool_flag(features.is_off_day),
        );
        let x = DenseMatrix::new(1, self.config.design_width(), row, false);
        let z = self
            .model
            .predict(&x)
            .map_err(|e| ForecastError::BaselineFit(format!("{e}")))?[0];
        Ok(unsquash(z, &self.config))
    }

    pub fn floor(&self) -> f64 {
        self.config.floor_kvah
    }

    pub fn cap(&self) -> f64 {
        self.config.cap_kvah
    }
}

fn event_flags(kind: Option<&EventKind>) -> (f64, f64) {
    match kind {
        Some(EventKind::Holiday) => (1.0, 0.0),
        Some(EventKind::WeeklyOff) => (0.0, 1.0),
        None => (0.0, 0.0),
    }
}

fn design_row(
    config: &BaselineConfig,
    t0: NaiveDateTime,
    timestamp: NaiveDateTime,
    features: &HourFeatures,
    holiday_flag: f64,
    weekly_off_flag: f64,
) -> Vec<f64> {
    let hours_since_start = (timestamp - t0).num_hours() as f64;
    let hour_of_week = features.day_of_week as f64 * 24.0 + features.hour_of_day as f64;
    let hour = features.hour_of_day as f64;

    let mut row = Vec::with_capacity(config.design_width());
    row.push(hours_since_start / 168.0);
    push_fourier(&mut row, hour_of_week, 168.0, config.weekly_order);
    push_fourier(&mut row, hour, 24.0, config.daily_order);
    push_fourier(&mut row, hour, 12.0, config.half_day_order);
    row.push(hour);
    row.push(bool_flag(features.is_lunch_hour));
    row.push(bool_flag(features.is_morning_dip));
    row.push(bool_flag(features.is_shift_change));
    row.push(holiday_flag);
    row.push(weekly_off_flag);
    row
}

fn push_fourier(row: &mut Vec<f64>, value: f64, period: f64, order: usize) {
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * value / period;
        row.push(angle.sin());
        row.push(angle.cos());
    }
}

/// Map a bounded consumption value into unbounded logit space for fitting.
/// Values at the bounds are pulled just inside them first.
fn squash(kvah: f64, config: &BaselineConfig) -> f64 {
    let span = config.cap_kvah - config.floor_kvah;
    let pad = span * 1e-3;
    let clamped = kvah.clamp(config.floor_kvah + pad, config.cap_kvah - pad);
    ((clamped - config.floor_kvah) / (config.cap_kvah - clamped)).ln()
}

/// Inverse of `squash`: logistic saturation between floor and cap.
fn unsquash(z: f64, config: &BaselineConfig) -> f64 {
    let span = config.cap_kvah - config.floor_kvah;
    config.floor_kvah + span / (1.0 + (-z).exp())
}
