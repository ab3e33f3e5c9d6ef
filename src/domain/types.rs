use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// A raw hourly meter reading as delivered by the metering API.
///
/// Raw observations may be irregularly spaced or contain duplicates; the
/// timeline reconstructor resolves duplicates by keeping the first-seen value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub kvah: f64,
}

/// One hour of the reconstructed consumption timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    pub timestamp: NaiveDateTime,
    pub kvah: f64,
}

/// A gap-free hourly consumption series.
///
/// Invariant: points are sorted ascending, one hour apart, with exactly one
/// entry for every hour in `[start, end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySeries {
    points: Vec<HourlyPoint>,
}

impl HourlySeries {
    /// Wrap an already contiguous, sorted point list.
    pub(crate) fn from_points(points: Vec<HourlyPoint>) -> Self {
        debug_assert!(points
            .windows(2)
            .all(|w| w[1].timestamp - w[0].timestamp == Duration::hours(1)));
        Self { points }
    }

    pub fn points(&self) -> &[HourlyPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> NaiveDateTime {
        self.points[0].timestamp
    }

    pub fn end(&self) -> NaiveDateTime {
        self.points[self.points.len() - 1].timestamp
    }

    /// Value at an hour slot, `None` when the hour lies outside the series.
    pub fn value_at(&self, timestamp: NaiveDateTime) -> Option<f64> {
        if self.points.is_empty() || timestamp < self.start() || timestamp > self.end() {
            return None;
        }
        let idx = (timestamp - self.start()).num_hours() as usize;
        Some(self.points[idx].kvah)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.kvah).collect()
    }
}

/// Externally curated holiday entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayAnnotation {
    pub date: NaiveDate,
    pub description: String,
}

/// Operating classification of an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum DayKind {
    Operating,
    OffPeriod,
    Holiday,
}

/// Shift category of an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum Shift {
    Day,
    Night,
    Off,
}

impl Shift {
    /// Numeric encoding used as a model feature (off=0, day=1, night=2).
    pub fn flag(&self) -> f64 {
        match self {
            Shift::Off => 0.0,
            Shift::Day => 1.0,
            Shift::Night => 2.0,
        }
    }
}

/// Calendar event the baseline model learns a distinct offset for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Holiday,
    WeeklyOff,
}

/// An (hour, event category) annotation row fed to the baseline fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub timestamp: NaiveDateTime,
    pub kind: EventKind,
}

/// One hour of the final forecast, keyed by (date, hour) for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub hour: u32,
    pub predicted_kvah: f64,
}

impl ForecastPoint {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date
            .and_hms_opt(self.hour, 0, 0)
            .expect("forecast hour in 0..24")
    }
}

/// Half-open time range `[start, end)` used when querying the reading source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Truncate a timestamp to the top of its hour.
pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("minute/second truncation is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_series_value_at() {
        let series = HourlySeries::from_points(vec![
            HourlyPoint { timestamp: ts(1, 0), kvah: 100.0 },
            HourlyPoint { timestamp: ts(1, 1), kvah: 110.0 },
            HourlyPoint { timestamp: ts(1, 2), kvah: 120.0 },
        ]);

        assert_eq!(series.value_at(ts(1, 1)), Some(110.0));
        assert_eq!(series.value_at(ts(1, 3)), None);
        assert_eq!(series.value_at(ts(1, 0) - Duration::hours(1)), None);
    }

    #[test]
    fn test_shift_flag_encoding() {
        assert_eq!(Shift::Off.flag(), 0.0);
        assert_eq!(Shift::Day.flag(), 1.0);
        assert_eq!(Shift::Night.flag(), 2.0);
    }

    #[test]
    fn test_floor_to_hour() {
        let raw = NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(8, 37, 12)
            .unwrap();
        assert_eq!(floor_to_hour(raw), ts(1, 8));
    }

    #[test]
    fn test_forecast_point_timestamp() {
        let point = ForecastPoint {
            date: NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
            hour: 13,
            predicted_kvah: 123.45,
        };
        assert_eq!(point.timestamp(), ts(2, 13));
    }
}
