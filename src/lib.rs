//! Factory Load Forecast
//!
//! Forecasts next-day hourly electrical energy consumption for a factory
//! site from historical hourly meter readings. Two stages: a clean, gap-free
//! timeline is reconstructed from the raw feed under the site's operating
//! calendar, then a hybrid model (seasonal/trend baseline plus a learned
//! residual correction) rolls the next 24 hours forward, each predicted hour
//! feeding the next as a lag feature.

pub mod calendar;
pub mod config;
pub mod domain;
pub mod forecast;
pub mod pipeline;
pub mod source;
pub mod telemetry;
pub mod timeline;

pub use pipeline::{ForecastError, ForecastPipeline, PipelineOutput};
