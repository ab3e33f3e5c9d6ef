//! Fit-quality metrics logged after each model stage.

use anyhow::{ensure, Result};
use serde::Serialize;

/// In-sample fit summary for a fitted stage.
#[derive(Debug, Clone, Serialize)]
pub struct FitMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Mean absolute percentage error over hours with a nonzero actual.
    /// Idle hours are exactly 0.0 in this domain and carry no percentage.
    pub mape: f64,
    pub r2: f64,
}

pub fn compute(predictions: &[f64], targets: &[f64]) -> Result<FitMetrics> {
    ensure!(
        predictions.len() == targets.len(),
        "prediction/target length mismatch: {} vs {}",
        predictions.len(),
        targets.len()
    );
    ensure!(!predictions.is_empty(), "nothing to evaluate");

    let n = targets.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_count = 0usize;
    for (p, t) in predictions.iter().zip(targets) {
        let err = p - t;
        abs_sum += err.abs();
        sq_sum += err * err;
        if t.abs() > 1e-10 {
            pct_sum += (err / t).abs() * 100.0;
            pct_count += 1;
        }
    }

    let mean = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();

    Ok(FitMetrics {
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        mape: if pct_count > 0 { pct_sum / pct_count as f64 } else { 0.0 },
        r2: if ss_tot > 1e-10 { 1.0 - sq_sum / ss_tot } else { 0.0 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_errors() {
        let m = compute(&[12.0, 18.0, 30.0], &[10.0, 20.0, 30.0]).unwrap();
        assert!((m.mae - 4.0 / 3.0).abs() < 1e-12);
        assert!((m.rmse - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
        // 20% + 10% + 0% over three nonzero targets.
        assert!((m.mape - 10.0).abs() < 1e-12);
        assert!(m.r2 > 0.9 && m.r2 < 1.0);
    }

    #[test]
    fn test_mape_averages_over_nonzero_targets_only() {
        // One idle hour, one operating hour 50% off; the idle hour must not
        // dilute the percentage.
        let m = compute(&[10.0, 10.0], &[0.0, 20.0]).unwrap();
        assert_eq!(m.mape, 50.0);

        let all_idle = compute(&[1.0, 2.0], &[0.0, 0.0]).unwrap();
        assert_eq!(all_idle.mape, 0.0);
    }

    #[test]
    fn test_perfect_fit() {
        let values = [10.0, 20.0, 30.0];
        let m = compute(&values, &values).unwrap();
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_rejects_mismatch_and_empty() {
        assert!(compute(&[1.0], &[1.0, 2.0]).is_err());
        assert!(compute(&[], &[]).is_err());
    }
}
