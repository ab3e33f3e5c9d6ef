//! End-to-end forecasting pipeline
//!
//! Strictly sequential: reconstruct -> annotate -> fit baseline -> compute
//! residual targets -> fit corrector -> 24h rollout. Fitted models are
//! immutable once built; the whole run either yields a complete 24-point
//! forecast or fails with the stage that broke.

use thiserror::Error;
use tracing::{info, instrument};

use crate::calendar::CalendarModel;
use crate::domain::{
    DayKind, EventAnnotation, EventKind, ForecastPoint, HourlySeries, Observation,
};
use crate::forecast::baseline::{BaselineConfig, BaselineForecaster, FittedBaseline};
use crate::forecast::features::{residual_row, AsOfSeries, FeatureBuilder};
use crate::forecast::metrics;
use crate::forecast::residual::{ResidualConfig, ResidualCorrector};
use crate::forecast::rollout::RolloutEngine;
use crate::timeline::TimelineReconstructor;

/// Pipeline failure taxonomy. Data-quality issues inside expected bounds
/// (gaps, missing lags) are handled locally and never surface here.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("no observations to reconstruct from")]
    EmptyInput,

    #[error("history too short to fit ({training_rows} usable training rows)")]
    InsufficientHistory { training_rows: usize },

    #[error("baseline model stage failed: {0}")]
    BaselineFit(String),

    #[error("residual model stage failed: {0}")]
    ResidualFit(String),
}

/// Everything one run produces: the cleaned history that was persisted and
/// the next-day forecast.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub reconstructed: HourlySeries,
    pub forecast: Vec<ForecastPoint>,
}

pub struct ForecastPipeline {
    reconstructor: TimelineReconstructor,
    features: FeatureBuilder,
    baseline_config: BaselineConfig,
    residual_config: ResidualConfig,
}

impl ForecastPipeline {
    pub fn new(
        calendar: CalendarModel,
        idle_load_kvah: f64,
        features: FeatureBuilder,
        baseline_config: BaselineConfig,
        residual_config: ResidualConfig,
    ) -> Self {
        Self {
            reconstructor: TimelineReconstructor::new(calendar, idle_load_kvah),
            features,
            baseline_config,
            residual_config,
        }
    }

    /// Run the full synchronous forecasting core over raw observations.
    #[instrument(skip_all, fields(observations = observations.len()))]
    pub fn run(&self, observations: &[Observation]) -> Result<PipelineOutput, ForecastError> {
        let reconstructed = self.reconstructor.reconstruct(observations)?;
        info!(
            start = %reconstructed.start(),
            end = %reconstructed.end(),
            hours = reconstructed.len(),
            "history reconstructed"
        );

        // The ridge solve needs at least as many rows as design columns, and
        // lag-24 features need more than a day of history. Either shortfall
        // is the same fatal class, caught here rather than as a fit error.
        let min_rows = self.baseline_config.design_width().max(25);
        if reconstructed.len() < min_rows {
            return Err(ForecastError::InsufficientHistory {
                training_rows: reconstructed.len(),
            });
        }

        let annotations = annotate_events(&reconstructed, self.features.calendar());
        let baseline = BaselineForecaster::new(self.baseline_config.clone()).fit(
            &reconstructed,
            &annotations,
            &self.features,
        )?;

        let (rows, residuals, history_fit) =
            self.residual_training_set(&reconstructed, &baseline)?;
        if rows.is_empty() {
            return Err(ForecastError::InsufficientHistory { training_rows: 0 });
        }
        if let Ok(m) = metrics::compute(&history_fit, &reconstructed.values()) {
            info!(mae = m.mae, rmse = m.rmse, mape = m.mape, r2 = m.r2, "baseline in-sample fit");
        }

        let residual =
            ResidualCorrector::new(self.residual_config.clone()).fit(&rows, &residuals)?;

        let forecast =
            RolloutEngine::new(&self.features, &baseline, &residual).run(&reconstructed)?;

        Ok(PipelineOutput {
            reconstructed,
            forecast,
        })
    }

    /// Residual targets over history: actual minus baseline prediction, with
    /// rows excluded when either lag is unavailable. Also returns the
    /// baseline's full in-sample prediction curve for fit logging.
    fn residual_training_set(
        &self,
        history: &HourlySeries,
        baseline: &FittedBaseline,
    ) -> Result<(Vec<Vec<f64>>, Vec<f64>, Vec<f64>), ForecastError> {
        let as_of = AsOfSeries::from_history(history);
        let mut rows = Vec::new();
        let mut residuals = Vec::new();
        let mut history_fit = Vec::with_capacity(history.len());

        for point in history.points() {
            let hour_features = self.features.build(point.timestamp);
            let prediction = baseline.predict(point.timestamp, &hour_features)?;
            history_fit.push(prediction);

            let lags = self.features.lags(&as_of, point.timestamp);
            if let Some(row) = residual_row(&hour_features, &lags) {
                rows.push(row);
                residuals.push(point.kvah - prediction);
            }
        }
        Ok((rows, residuals, history_fit))
    }
}

/// Derive the baseline's event annotation list from the calendar: one entry
/// per downtime hour, labelled holiday or weekly-off.
pub fn annotate_events(series: &HourlySeries, calendar: &CalendarModel) -> Vec<EventAnnotation> {
    series
        .points()
        .iter()
        .filter_map(|p| match calendar.classify(p.timestamp) {
            DayKind::Holiday => Some(EventAnnotation {
                timestamp: p.timestamp,
                kind: EventKind::Holiday,
            }),
            DayKind::OffPeriod => Some(EventAnnotation {
                timestamp: p.timestamp,
                kind: EventKind::WeeklyOff,
            }),
            DayKind::Operating => None,
        })
        .collect()
}
