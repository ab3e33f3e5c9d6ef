use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use factory_load_forecast::calendar::CalendarModel;
use factory_load_forecast::config::Config;
use factory_load_forecast::forecast::features::FeatureBuilder;
use factory_load_forecast::source::http::{fetch_window, MeterApiSource};
use factory_load_forecast::source::{ForecastStore, HolidayProvider, ReadingSource};
use factory_load_forecast::telemetry::init_tracing;
use factory_load_forecast::ForecastPipeline;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;

    let (store, holiday_source) = build_persistence(&cfg).await?;
    let holidays = holiday_source.fetch_holidays().await?;
    let calendar = cfg.calendar(&holidays)?;
    let source: Arc<dyn ReadingSource> = build_source(&cfg, &calendar)?;

    // Two-phase run: top up the persisted history with whatever the meter
    // has since the last run (never today's partial day), then forecast off
    // the combined series.
    let now = Local::now().naive_local();
    let mut observations = store.reconstructed_history().await?;
    let latest = store.latest_reconstructed().await?;
    match fetch_window(latest, cfg.source.history_start, now) {
        Some(range) => {
            info!(start = %range.start, end = %range.end, "fetching meter readings");
            let fresh = source.fetch_observations(range).await?;
            if fresh.is_empty() {
                warn!("meter returned no readings for the requested window");
            }
            observations.extend(fresh);
        }
        None => info!("history already covers yesterday, skipping fetch"),
    }

    let pipeline = ForecastPipeline::new(
        calendar.clone(),
        cfg.site.idle_load_kvah,
        FeatureBuilder::new(calendar, cfg.patterns.clone()),
        cfg.baseline.clone(),
        cfg.residual.clone(),
    );
    let output = pipeline.run(&observations)?;

    store.persist_reconstructed(&output.reconstructed).await?;
    store.persist_forecast_latest(&output.forecast).await?;
    store.persist_forecast_history(&output.forecast).await?;

    if let Some(first) = output.forecast.first() {
        info!(date = %first.date, points = output.forecast.len(), "forecast persisted");
    }

    Ok(())
}

fn build_source(cfg: &Config, calendar: &CalendarModel) -> Result<Arc<dyn ReadingSource>> {
    #[cfg(not(feature = "sim"))]
    let _ = calendar;
    match cfg.source.provider.as_str() {
        "meter_api" => {
            let source = MeterApiSource::new(
                cfg.source.base_url.clone(),
                Duration::from_secs(cfg.source.http_timeout_seconds),
            )?;
            Ok(Arc::new(source))
        }
        #[cfg(feature = "sim")]
        "simulated" => Ok(Arc::new(factory_load_forecast::source::sim::SimulatedMeter::new(
            calendar.clone(),
            cfg.site.idle_load_kvah,
        ))),
        other => anyhow::bail!("unknown source provider {other:?}"),
    }
}

/// Store plus holiday source: the Postgres `holidays` table when the db
/// feature is on, otherwise the list from the config file.
async fn build_persistence(
    cfg: &Config,
) -> Result<(Arc<dyn ForecastStore>, Arc<dyn HolidayProvider>)> {
    #[cfg(feature = "db")]
    {
        let store =
            Arc::new(factory_load_forecast::source::pg::PgStore::connect(&cfg.db.url).await?);
        Ok((
            store.clone() as Arc<dyn ForecastStore>,
            store as Arc<dyn HolidayProvider>,
        ))
    }
    #[cfg(not(feature = "db"))]
    {
        use factory_load_forecast::source::memory::InMemoryStore;
        use factory_load_forecast::source::StaticHolidays;

        let _ = &cfg.db;
        warn!("db feature disabled, keeping results in memory only");
        Ok((
            Arc::new(InMemoryStore::new()) as Arc<dyn ForecastStore>,
            Arc::new(StaticHolidays::new(cfg.holidays.clone())) as Arc<dyn HolidayProvider>,
        ))
    }
}
