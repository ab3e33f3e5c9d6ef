//! Residual correction model
//!
//! Learns the baseline model's systematic error (sharp shift-change
//! transients the smooth seasonal fit misses) as a function of calendar and
//! lag features. The regressor is a seeded random forest of shallow trees;
//! the contract is the row shape, not the algorithm family.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::debug;

use crate::forecast::features::RESIDUAL_FEATURE_NAMES;
use crate::pipeline::ForecastError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualConfig {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ResidualConfig {
    fn default() -> Self {
        Self {
            n_trees: 300,
            max_depth: 4,
            min_samples_split: 5,
            seed: 42,
        }
    }
}

pub struct ResidualCorrector {
    config: ResidualConfig,
}

impl ResidualCorrector {
    pub fn new(config: ResidualConfig) -> Self {
        Self { config }
    }

    /// Fit on (feature row -> baseline residual) pairs. Callers must already
    /// have dropped rows with unavailable lags.
    pub fn fit(
        &self,
        rows: &[Vec<f64>],
        residuals: &[f64],
    ) -> Result<FittedResidual, ForecastError> {
        if rows.is_empty() {
            return Err(ForecastError::InsufficientHistory { training_rows: 0 });
        }
        if rows.len() != residuals.len() {
            return Err(ForecastError::ResidualFit(format!(
                "row/target count mismatch: {} rows, {} targets",
                rows.len(),
                residuals.len()
            )));
        }

        let n_features = RESIDUAL_FEATURE_NAMES.len();
        let mut flat = Vec::with_capacity(rows.len() * n_features);
        for row in rows {
            if row.len() != n_features {
                return Err(ForecastError::ResidualFit(format!(
                    "expected {} features per row, got {}",
                    n_features,
                    row.len()
                )));
            }
            flat.extend_from_slice(row);
        }

        let x = DenseMatrix::new(rows.len(), n_features, flat, false);
        let y = residuals.to_vec();
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(self.config.n_trees)
            .with_max_depth(self.config.max_depth)
            .with_min_samples_split(self.config.min_samples_split)
            .with_keep_samples(false)
            .with_seed(self.config.seed);

        let model = RandomForestRegressor::fit(&x, &y, params)
            .map_err(|e| ForecastError::ResidualFit(format!("{e}")))?;

        debug!(samples = rows.len(), trees = self.config.n_trees, "residual model fitted");

        Ok(FittedResidual {
            model,
            model_id: format!("residual_{}", uuid::Uuid::new_v4()),
            training_samples: rows.len(),
        })
    }
}

/// Immutable fitted corrector mapping a feature row to a signed correction.
#[derive(Debug)]
pub struct FittedResidual {
    model: RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    pub model_id: String,
    pub training_samples: usize,
}

impl FittedResidual {
    pub fn predict(&self, row: &[f64]) -> Result<f64, ForecastError> {
        let x = DenseMatrix::new(1, row.len(), row.to_vec(), false);
        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| ForecastError::ResidualFit(format!("{e}")))?;
        Ok(predictions[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A feature row with only the lag columns varying.
    fn row(lag_1h: f64, lag_24h: f64) -> Vec<f64> {
        vec![12.0, 2.0, 1.0, 0.0, lag_1h, lag_24h, 0.0, -1.0, 0.0, 0.0, 0.0]
    }

    fn small_config() -> ResidualConfig {
        ResidualConfig { n_trees: 30, ..ResidualConfig::default() }
    }

    #[test]
    fn test_fit_learns_lag_dependent_correction() {
        // Residual is +10 when lag_1h is high, -10 when low.
        let mut rows = Vec::new();
        let mut residuals = Vec::new();
        for i in 0..40 {
            let high = i % 2 == 0;
            let lag = if high { 120.0 + i as f64 } else { 40.0 + i as f64 };
            rows.push(row(lag, 80.0));
            residuals.push(if high { 10.0 } else { -10.0 });
        }

        let fitted = ResidualCorrector::new(small_config())
            .fit(&rows, &residuals)
            .unwrap();

        let high_correction = fitted.predict(&row(150.0, 80.0)).unwrap();
        let low_correction = fitted.predict(&row(45.0, 80.0)).unwrap();
        assert!(high_correction > 0.0, "got {high_correction}");
        assert!(low_correction < 0.0, "got {low_correction}");
    }

    #[test]
    fn test_empty_training_set_is_insufficient_history() {
        let err = ResidualCorrector::new(small_config())
            .fit(&[], &[])
            .unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientHistory { training_rows: 0 }));
    }

    #[test]
    fn test_row_width_is_enforced() {
        let err = ResidualCorrector::new(small_config())
            .fit(&[vec![1.0, 2.0]], &[0.5])
            .unwrap_err();
        assert!(matches!(err, ForecastError::ResidualFit(_)));
    }

    #[test]
    fn test_fit_is_deterministic_for_fixed_seed() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| row(i as f64 * 5.0, 80.0)).collect();
        let residuals: Vec<f64> = (0..30).map(|i| (i % 7) as f64 - 3.0).collect();

        let corrector = ResidualCorrector::new(small_config());
        let a = corrector.fit(&rows, &residuals).unwrap();
        let b = corrector.fit(&rows, &residuals).unwrap();

        let probe = row(42.0, 80.0);
        assert_eq!(a.predict(&probe).unwrap(), b.predict(&probe).unwrap());
    }
}
