//! Operating-calendar model for the factory site
//!
//! Classifies any hour into operating / weekly-off / holiday and into a shift
//! category. Both gap-filling and feature engineering query this model, so it
//! is a pure function of the timestamp plus the configured rules.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};

use crate::domain::{DayKind, HolidayAnnotation, Shift};

/// Recurring weekly off window, e.g. Sunday 08:00 through Monday 08:00.
///
/// The window is computed relative to each week (never a fixed date list), so
/// it classifies arbitrary past or future timestamps. It may wrap across the
/// Monday 00:00 week boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffWindow {
    pub start_weekday: Weekday,
    pub start_hour: u32,
    pub end_weekday: Weekday,
    pub end_hour: u32,
}

impl OffWindow {
    /// Default factory schedule: Sunday 08:00 -> Monday 08:00.
    pub fn sunday_morning_to_monday_morning() -> Self {
        Self {
            start_weekday: Weekday::Sun,
            start_hour: 8,
            end_weekday: Weekday::Mon,
            end_hour: 8,
        }
    }

    fn hour_of_week(weekday: Weekday, hour: u32) -> u32 {
        weekday.num_days_from_monday() * 24 + hour
    }

    /// Whether the hour slot starting at `timestamp` falls inside the window.
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let how = Self::hour_of_week(timestamp.weekday(), timestamp.hour());
        let start = Self::hour_of_week(self.start_weekday, self.start_hour);
        let end = Self::hour_of_week(self.end_weekday, self.end_hour);

        if start <= end {
            how >= start && how < end
        } else {
            how >= start || how < end
        }
    }
}

/// Calendar rules for one site.
#[derive(Debug, Clone)]
pub struct CalendarModel {
    off_window: OffWindow,
    holidays: BTreeSet<NaiveDate>,
    day_shift_start_hour: u32,
    day_shift_end_hour: u32,
    /// Whether holiday gaps are imputed with the idle load (like the weekly
    /// off window) instead of being interpolated as operating-hour gaps.
    holiday_idle_fill: bool,
}

impl CalendarModel {
    pub fn new(
        off_window: OffWindow,
        holidays: &[HolidayAnnotation],
        day_shift_start_hour: u32,
        day_shift_end_hour: u32,
        holiday_idle_fill: bool,
    ) -> Self {
        Self {
            off_window,
            holidays: holidays.iter().map(|h| h.date).collect(),
            day_shift_start_hour,
            day_shift_end_hour,
            holiday_idle_fill,
        }
    }

    /// Default schedule with no holidays.
    pub fn with_default_schedule() -> Self {
        Self::new(OffWindow::sunday_morning_to_monday_morning(), &[], 8, 20, true)
    }

    /// Operating classification of an hour. Holiday wins over the weekly
    /// window so the baseline model can learn a distinct holiday offset.
    pub fn classify(&self, timestamp: NaiveDateTime) -> DayKind {
        if self.holidays.contains(&timestamp.date()) {
            DayKind::Holiday
        } else if self.off_window.contains(timestamp) {
            DayKind::OffPeriod
        } else {
            DayKind::Operating
        }
    }

    /// Shift category. Hours inside the weekly off window are "off"; holiday
    /// hours keep their day/night category (the holiday flag is separate).
    pub fn shift(&self, timestamp: NaiveDateTime) -> Shift {
        if self.off_window.contains(timestamp) {
            Shift::Off
        } else if self.is_day_shift_hour(timestamp.hour()) {
            Shift::Day
        } else {
            Shift::Night
        }
    }

    /// Whether a missing reading at this hour represents known downtime
    /// (filled with the idle load) rather than data loss.
    pub fn is_downtime(&self, timestamp: NaiveDateTime) -> bool {
        match self.classify(timestamp) {
            DayKind::OffPeriod => true,
            DayKind::Holiday => self.holiday_idle_fill,
            DayKind::Operating => false,
        }
    }

    /// Day/night grouping by hour alone, used for boundary-gap shift means.
    pub fn is_day_shift_hour(&self, hour: u32) -> bool {
        hour >= self.day_shift_start_hour && hour < self.day_shift_end_hour
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn off_window(&self) -> &OffWindow {
        &self.off_window
    }
}
