use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Weekday};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::calendar::{CalendarModel, OffWindow};
use crate::domain::HolidayAnnotation;
use crate::forecast::baseline::BaselineConfig;
use crate::forecast::features::PatternHours;
use crate::forecast::residual::ResidualConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    pub patterns: PatternHours,
    pub baseline: BaselineConfig,
    pub residual: ResidualConfig,
    pub source: SourceConfig,
    pub db: DbConfig,
    /// Site holiday list, used when no holiday table is available.
    #[serde(default)]
    pub holidays: Vec<HolidayAnnotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub idle_load_kvah: f64,
    pub day_shift_start_hour: u32,
    pub day_shift_end_hour: u32,
    /// Whether holiday gaps are imputed with the idle load instead of being
    /// interpolated like operating-hour gaps.
    pub holiday_idle_fill: bool,
    pub off_window: OffWindowConfig,
}

/// Weekly off window as configured; weekdays are names ("Sun", "Monday", ...)
#[derive(Debug, Clone, Deserialize)]
pub struct OffWindowConfig {
    pub start_weekday: String,
    pub start_hour: u32,
    pub end_weekday: String,
    pub end_hour: u32,
}

impl OffWindowConfig {
    pub fn parse(&self) -> Result<OffWindow> {
        let parse_day = |name: &str| {
            Weekday::from_str(name)
                .map_err(|_| anyhow::anyhow!("invalid weekday name: {name:?}"))
        };
        anyhow::ensure!(
            self.start_hour < 24 && self.end_hour < 24,
            "off-window hours must be in 0..24"
        );
        Ok(OffWindow {
            start_weekday: parse_day(&self.start_weekday)?,
            start_hour: self.start_hour,
            end_weekday: parse_day(&self.end_weekday)?,
            end_hour: self.end_hour,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// "simulated" or "meter_api".
    pub provider: String,
    pub base_url: String,
    pub http_timeout_seconds: u64,
    /// Fetch start when no reconstructed history is persisted yet.
    pub history_start: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("FLF__").split("__"));
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks figment cannot express.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.baseline.cap_kvah > self.baseline.floor_kvah,
            "baseline cap_kvah ({}) must exceed floor_kvah ({})",
            self.baseline.cap_kvah,
            self.baseline.floor_kvah
        );
        Ok(())
    }

    /// Build the calendar model from site settings plus externally supplied
    /// holidays.
    pub fn calendar(&self, holidays: &[HolidayAnnotation]) -> Result<CalendarModel> {
        let off_window = self
            .site
            .off_window
            .parse()
            .context("invalid [site.off_window] configuration")?;
        anyhow::ensure!(
            self.site.day_shift_start_hour < self.site.day_shift_end_hour
                && self.site.day_shift_end_hour <= 24,
            "day shift hours must satisfy start < end <= 24"
        );
        Ok(CalendarModel::new(
            off_window,
            holidays,
            self.site.day_shift_start_hour,
            self.site.day_shift_end_hour,
            self.site.holiday_idle_fill,
        ))
    }
}
