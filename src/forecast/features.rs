//! Feature engineering for the two model stages
//!
//! Everything here except lag lookup is a pure function of the timestamp plus
//! the calendar rules, so identical feature rows can be produced for history
//! and for future hours during rollout.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarModel;
use crate::domain::{DayKind, HourlySeries, Shift};

/// Hand-tuned pattern hours; configurable per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternHours {
    pub lunch_hours: Vec<u32>,
    pub morning_dip_hours: Vec<u32>,
    pub shift_change_hours: Vec<u32>,
}

impl Default for PatternHours {
    fn default() -> Self {
        Self {
            lunch_hours: vec![13],
            morning_dip_hours: vec![5, 6, 7],
            shift_change_hours: vec![8, 20],
        }
    }
}

/// Deterministic per-timestamp feature vector shared by both model stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourFeatures {
    pub hour_of_day: u32,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u32,
    pub shift: Shift,
    pub is_off_day: bool,
    pub is_holiday: bool,
    /// Full-day cyclical encoding (period 24).
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub is_lunch_hour: bool,
    pub is_morning_dip: bool,
    pub is_shift_change: bool,
}

/// Lag features relative to one timestamp; `None` marks an hour that does not
/// exist in the as-of series (e.g. at the very start of history).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagFeatures {
    pub lag_1h: Option<f64>,
    pub lag_24h: Option<f64>,
}

impl LagFeatures {
    pub fn is_complete(&self) -> bool {
        self.lag_1h.is_some() && self.lag_24h.is_some()
    }
}

/// History extended with already-produced predictions, one value per hour.
/// A map rather than a dense vector: rollout may start a calendar day after a
/// history that ends mid-day, leaving hours nothing ever observed or
/// predicted.
#[derive(Debug, Clone, Default)]
pub struct AsOfSeries {
    values: BTreeMap<NaiveDateTime, f64>,
}

impl AsOfSeries {
    pub fn from_history(history: &HourlySeries) -> Self {
        Self {
            values: history
                .points()
                .iter()
                .map(|p| (p.timestamp, p.kvah))
                .collect(),
        }
    }

    pub fn insert(&mut self, timestamp: NaiveDateTime, kvah: f64) {
        self.values.insert(timestamp, kvah);
    }

    pub fn get(&self, timestamp: NaiveDateTime) -> Option<f64> {
        self.values.get(&timestamp).copied()
    }
}

/// Stateless `timestamp -> HourFeatures` builder plus lag lookup.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    calendar: CalendarModel,
    patterns: PatternHours,
}

impl FeatureBuilder {
    pub fn new(calendar: CalendarModel, patterns: PatternHours) -> Self {
        Self { calendar, patterns }
    }

    pub fn calendar(&self) -> &CalendarModel {
        &self.calendar
    }

    pub fn build(&self, timestamp: NaiveDateTime) -> HourFeatures {
        let hour = timestamp.hour();
        let angle = 2.0 * PI * hour as f64 / 24.0;
        let kind = self.calendar.classify(timestamp);

        HourFeatures {
            hour_of_day: hour,
            day_of_week: timestamp.weekday().num_days_from_monday(),
            shift: self.calendar.shift(timestamp),
            is_off_day: kind == DayKind::OffPeriod,
            is_holiday: kind == DayKind::Holiday,
            hour_sin: angle.sin(),
            hour_cos: angle.cos(),
            is_lunch_hour: self.patterns.lunch_hours.contains(&hour),
            is_morning_dip: self.patterns.morning_dip_hours.contains(&hour),
            is_shift_change: self.patterns.shift_change_hours.contains(&hour),
        }
    }

    /// Values 1 hour and 24 hours prior, from history or earlier predictions.
    pub fn lags(&self, as_of: &AsOfSeries, timestamp: NaiveDateTime) -> LagFeatures {
        LagFeatures {
            lag_1h: as_of.get(timestamp - Duration::hours(1)),
            lag_24h: as_of.get(timestamp - Duration::hours(24)),
        }
    }
}

/// Residual-model input row. Column order is part of the fitted model's
/// contract and must match between training and prediction.
pub const RESIDUAL_FEATURE_NAMES: [&str; 11] = [
    "hour",
    "day_of_week",
    "shift_flag",
    "is_off_day",
    "lag_1h",
    "lag_24h",
    "hour_sin",
    "hour_cos",
    "is_lunch_hour",
    "is_morning_dip",
    "is_shift_change",
];

/// Flatten features + lags into the residual-model row, `None` when either
/// lag is unavailable (such rows are excluded from training and trigger the
/// fail-soft path during rollout).
pub fn residual_row(features: &HourFeatures, lags: &LagFeatures) -> Option<Vec<f64>> {
    let (lag_1h, lag_24h) = (lags.lag_1h?, lags.lag_24h?);
    Some(vec![
        features.hour_of_day as f64,
        features.day_of_week as f64,
        features.shift.flag(),
        bool_flag(features.is_off_day),
        lag_1h,
        lag_24h,
        features.hour_sin,
        features.hour_cos,
        bool_flag(features.is_lunch_hour),
        bool_flag(features.is_morning_dip),
        bool_flag(features.is_shift_change),
    ])
}

pub(crate) fn bool_flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HourlyPoint, Observation};
    use crate::timeline::TimelineReconstructor;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(CalendarModel::with_default_schedule(), PatternHours::default())
    }

    fn history(start: NaiveDateTime, values: &[f64]) -> HourlySeries {
        let observations: Vec<Observation> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation {
                timestamp: start + Duration::hours(i as i64),
                kvah: *v,
            })
            .collect();
        TimelineReconstructor::new(CalendarModel::with_default_schedule(), 0.0)
            .reconstruct(&observations)
            .unwrap()
    }

    #[test]
    fn test_cyclical_encoding() {
        let b = builder();
        let midnight = b.build(ts(8, 0));
        assert!(midnight.hour_sin.abs() < 1e-12);
        assert!((midnight.hour_cos - 1.0).abs() < 1e-12);

        let six = b.build(ts(8, 6));
        assert!((six.hour_sin - 1.0).abs() < 1e-12);
        assert!(six.hour_cos.abs() < 1e-12);

        for h in 0..24 {
            let f = b.build(ts(8, h));
            assert!((f.hour_sin.powi(2) + f.hour_cos.powi(2) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pattern_flags() {
        let b = builder();
        assert!(b.build(ts(8, 13)).is_lunch_hour);
        assert!(b.build(ts(8, 6)).is_morning_dip);
        assert!(b.build(ts(8, 20)).is_shift_change);

        let f = b.build(ts(8, 15));
        assert!(!f.is_lunch_hour && !f.is_morning_dip && !f.is_shift_change);
    }

    #[test]
    fn test_custom_pattern_hours() {
        let patterns = PatternHours {
            lunch_hours: vec![12],
            morning_dip_hours: vec![4],
            shift_change_hours: vec![6, 18],
        };
        let b = FeatureBuilder::new(CalendarModel::with_default_schedule(), patterns);
        assert!(b.build(ts(8, 12)).is_lunch_hour);
        assert!(!b.build(ts(8, 13)).is_lunch_hour);
        assert!(b.build(ts(8, 18)).is_shift_change);
    }

    #[test]
    fn test_lag_lookup_with_predictions() {
        let b = builder();
        let hist = history(ts(8, 0), &[100.0, 110.0, 120.0]);
        let mut as_of = AsOfSeries::from_history(&hist);

        // Start-of-history lags are unavailable.
        let lags = b.lags(&as_of, ts(8, 0));
        assert_eq!(lags.lag_1h, None);
        assert_eq!(lags.lag_24h, None);
        assert!(!lags.is_complete());

        let lags = b.lags(&as_of, ts(8, 2));
        assert_eq!(lags.lag_1h, Some(110.0));
        assert_eq!(lags.lag_24h, None);

        // A rolled-out prediction becomes the next hour's lag-1.
        as_of.insert(ts(8, 3), 130.0);
        let lags = b.lags(&as_of, ts(8, 4));
        assert_eq!(lags.lag_1h, Some(130.0));
        // 24h prior is Monday 04:00, before the series.
        assert_eq!(lags.lag_24h, None);

        as_of.insert(ts(9, 2), 140.0);
        let lags = b.lags(&as_of, ts(9, 2) + Duration::hours(24));
        assert_eq!(lags.lag_24h, Some(140.0));
    }

    #[test]
    fn test_residual_row_shape_and_exclusion() {
        let b = builder();
        let features = b.build(ts(8, 13));
        let complete = LagFeatures { lag_1h: Some(100.0), lag_24h: Some(90.0) };
        let row = residual_row(&features, &complete).unwrap();
        assert_eq!(row.len(), RESIDUAL_FEATURE_NAMES.len());
        assert_eq!(row[0], 13.0);
        assert_eq!(row[4], 100.0);
        assert_eq!(row[5], 90.0);
        assert_eq!(row[8], 1.0); // lunch hour

        let incomplete = LagFeatures { lag_1h: Some(100.0), lag_24h: None };
        assert!(residual_row(&features, &incomplete).is_none());
    }

    #[test]
    fn test_off_and_holiday_flags() {
        let b = builder();
        let sunday_noon = b.build(ts(13, 12));
        assert!(sunday_noon.is_off_day);
        assert_eq!(sunday_noon.shift, Shift::Off);
        assert!(!sunday_noon.is_holiday);
    }

    #[test]
    fn test_as_of_series_matches_history() {
        let hist = HourlySeries::from_points(vec![
            HourlyPoint { timestamp: ts(8, 0), kvah: 1.0 },
            HourlyPoint { timestamp: ts(8, 1), kvah: 2.0 },
        ]);
        let as_of = AsOfSeries::from_history(&hist);
        assert_eq!(as_of.get(ts(8, 1)), Some(2.0));
        assert_eq!(as_of.get(ts(8, 2)), None);
    }
}
