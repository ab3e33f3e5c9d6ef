//! Timeline reconstruction
//!
//! Turns an irregular raw reading stream into a continuous hourly series.
//! Missing hours inside the weekly off window (and holidays, when configured)
//! are known downtime and get the idle-load constant; missing operating hours
//! are interpolated; anything left at a series boundary falls back to the
//! mean of its shift category.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime, Timelike};
use itertools::Itertools;
use tracing::debug;

use crate::calendar::CalendarModel;
use crate::domain::{floor_to_hour, HourlyPoint, HourlySeries, Observation};
use crate::pipeline::ForecastError;

pub struct TimelineReconstructor {
    calendar: CalendarModel,
    idle_load_kvah: f64,
}

impl TimelineReconstructor {
    pub fn new(calendar: CalendarModel, idle_load_kvah: f64) -> Self {
        Self {
            calendar,
            idle_load_kvah,
        }
    }

    /// Reconstruct a gap-free hourly series spanning `[min, max]` of the
    /// observations. Duplicate timestamps keep the first-seen value.
    pub fn reconstruct(&self, observations: &[Observation]) -> Result<HourlySeries, ForecastError> {
        if observations.is_empty() {
            return Err(ForecastError::EmptyInput);
        }

        let mut by_hour: BTreeMap<NaiveDateTime, f64> = BTreeMap::new();
        for obs in observations {
            by_hour.entry(floor_to_hour(obs.timestamp)).or_insert(obs.kvah);
        }

        let (start, end) = match by_hour.keys().minmax().into_option() {
            Some((min, max)) => (*min, *max),
            None => return Err(ForecastError::EmptyInput),
        };

        let n_slots = (end - start).num_hours() as usize + 1;
        let mut slots: Vec<Option<f64>> = Vec::with_capacity(n_slots);
        for i in 0..n_slots {
            let ts = start + Duration::hours(i as i64);
            slots.push(by_hour.get(&ts).copied());
        }
        let observed = slots.iter().filter(|v| v.is_some()).count();

        self.fill_downtime(start, &mut slots);
        interpolate_gaps(&mut slots);
        self.fill_boundary_gaps(start, &mut slots);

        debug!(
            slots = n_slots,
            observed,
            filled = n_slots - observed,
            "timeline reconstructed"
        );

        let points = slots
            .into_iter()
            .enumerate()
            .map(|(i, value)| HourlyPoint {
                timestamp: start + Duration::hours(i as i64),
                kvah: value.expect("all slots filled after boundary pass"),
            })
            .collect();
        Ok(HourlySeries::from_points(points))
    }

    /// Step 1: missing hours in known downtime get the idle load, exactly.
    /// Runs before interpolation so idle values also anchor adjacent gaps.
    fn fill_downtime(&self, start: NaiveDateTime, slots: &mut [Option<f64>]) {
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() && self.calendar.is_downtime(start + Duration::hours(i as i64)) {
                *slot = Some(self.idle_load_kvah);
            }
        }
    }

    /// Step 3: gaps touching a series boundary have no neighbour on one side,
    /// so they take the mean of their shift category over the rest of the
    /// series (overall mean if that category is empty).
    fn fill_boundary_gaps(&self, start: NaiveDateTime, slots: &mut [Option<f64>]) {
        if slots.iter().all(|s| s.is_some()) {
            return;
        }

        let mut day_sum = (0.0, 0usize);
        let mut night_sum = (0.0, 0usize);
        for (i, slot) in slots.iter().enumerate() {
            if let Some(v) = slot {
                let ts = start + Duration::hours(i as i64);
                if self.calendar.is_day_shift_hour(ts.hour()) {
                    day_sum = (day_sum.0 + v, day_sum.1 + 1);
                } else {
                    night_sum = (night_sum.0 + v, night_sum.1 + 1);
                }
            }
        }
        let overall = {
            let (s, n) = (day_sum.0 + night_sum.0, day_sum.1 + night_sum.1);
            s / n as f64
        };
        let day_mean = if day_sum.1 > 0 { day_sum.0 / day_sum.1 as f64 } else { overall };
        let night_mean = if night_sum.1 > 0 { night_sum.0 / night_sum.1 as f64 } else { overall };

        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                let ts = start + Duration::hours(i as i64);
                *slot = Some(if self.calendar.is_day_shift_hour(ts.hour()) {
                    day_mean
                } else {
                    night_mean
                });
            }
        }
    }
}

/// Step 2: time-proportional linear interpolation across interior gaps.
fn interpolate_gaps(slots: &mut [Option<f64>]) {
    let mut i = 0;
    while i < slots.len() {
        if slots[i].is_some() {
            i += 1;
            continue;
        }
        let gap_start = i;
        let mut gap_end = i;
        while gap_end < slots.len() && slots[gap_end].is_none() {
            gap_end += 1;
        }
        // Boundary gaps (no neighbour on one side) are left for the shift-mean pass.
        if gap_start > 0 && gap_end < slots.len() {
            let left = slots[gap_start - 1].expect("left anchor known");
            let right = slots[gap_end].expect("right anchor known");
            let span = (gap_end - (gap_start - 1)) as f64;
            for (k, slot) in slots[gap_start..gap_end].iter_mut().enumerate() {
                let frac = (k + 1) as f64 / span;
                *slot = Some(left + (right - left) * frac);
            }
        }
        i = gap_end;
    }
}
