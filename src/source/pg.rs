#![cfg(feature = "db")]

//! Postgres persistence for the reconstructed series and forecasts.
//!
//! `consumption_data` holds the cleaned hourly history and is upserted,
//! `prediction` always holds only the most recent forecast run, and
//! `prediction_history` is append-only so past forecasts stay comparable
//! with what actually happened; all three are keyed by (date, hour). The
//! `holidays` table is externally curated and only read here.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::domain::{ForecastPoint, HolidayAnnotation, HourlySeries, Observation};
use crate::source::{ForecastStore, HolidayProvider};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and make sure the tables exist.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await
            .context("failed to create database pool")?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("database connection pool initialized");
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS consumption_data (
                date DATE NOT NULL,
                hour INTEGER NOT NULL,
                consumption DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (date, hour)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create consumption_data table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS holidays (
                date DATE PRIMARY KEY,
                description TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create holidays table")?;

        for table in ["prediction", "prediction_history"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    date DATE NOT NULL,
                    hour INTEGER NOT NULL,
                    predicted_consumption DOUBLE PRECISION NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    PRIMARY KEY (date, hour)
                )
                "#
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to create {table} table"))?;
        }

        Ok(())
    }
}

#[async_trait]
impl HolidayProvider for PgStore {
    async fn fetch_holidays(&self) -> Result<Vec<HolidayAnnotation>> {
        let rows = sqlx::query("SELECT date, description FROM holidays ORDER BY date")
            .fetch_all(&self.pool)
            .await
            .context("failed to read holidays")?;

        Ok(rows
            .into_iter()
            .map(|r| HolidayAnnotation {
                date: r.get("date"),
                description: r.get("description"),
            })
            .collect())
    }
}

#[async_trait]
impl ForecastStore for PgStore {
    async fn latest_reconstructed(&self) -> Result<Option<NaiveDateTime>> {
        let row = sqlx::query(
            r#"
            SELECT date, hour FROM consumption_data
            ORDER BY date DESC, hour DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to read latest reconstructed hour")?;

        Ok(row.map(|r| {
            let date: NaiveDate = r.get("date");
            let hour: i32 = r.get("hour");
            NaiveDateTime::new(
                date,
                NaiveTime::from_hms_opt(hour as u32, 0, 0).unwrap_or(NaiveTime::MIN),
            )
        }))
    }

    async fn reconstructed_history(&self) -> Result<Vec<Observation>> {
        let rows = sqlx::query(
            r#"
            SELECT date, hour, consumption FROM consumption_data
            ORDER BY date ASC, hour ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to read reconstructed history")?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let date: NaiveDate = r.get("date");
                let hour: i32 = r.get("hour");
                Observation {
                    timestamp: NaiveDateTime::new(
                        date,
                        NaiveTime::from_hms_opt(hour as u32, 0, 0).unwrap_or(NaiveTime::MIN),
                    ),
                    kvah: r.get("consumption"),
                }
            })
            .collect())
    }

    async fn persist_reconstructed(&self, series: &HourlySeries) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;
        for point in series.points() {
            sqlx::query(
                r#"
                INSERT INTO consumption_data (date, hour, consumption)
                VALUES ($1, $2, $3)
                ON CONFLICT (date, hour)
                DO UPDATE SET consumption = EXCLUDED.consumption
                "#,
            )
            .bind(point.timestamp.date())
            .bind(point.timestamp.hour() as i32)
            .bind(point.kvah)
            .execute(&mut *tx)
            .await
            .context("failed to upsert consumption row")?;
        }
        tx.commit().await.context("failed to commit transaction")?;
        debug!(rows = series.len(), "reconstructed series persisted");
        Ok(())
    }

    async fn persist_forecast_latest(&self, points: &[ForecastPoint]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;
        sqlx::query("DELETE FROM prediction")
            .execute(&mut *tx)
            .await
            .context("failed to clear prediction table")?;
        for p in points {
            sqlx::query(
                r#"
                INSERT INTO prediction (date, hour, predicted_consumption)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(p.date)
            .bind(p.hour as i32)
            .bind(p.predicted_kvah)
            .execute(&mut *tx)
            .await
            .context("failed to insert prediction row")?;
        }
        tx.commit().await.context("failed to commit transaction")?;
        info!(rows = points.len(), "latest forecast replaced");
        Ok(())
    }

    async fn persist_forecast_history(&self, points: &[ForecastPoint]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;
        for p in points {
            sqlx::query(
                r#"
                INSERT INTO prediction_history (date, hour, predicted_consumption)
                VALUES ($1, $2, $3)
                ON CONFLICT (date, hour) DO NOTHING
                "#,
            )
            .bind(p.date)
            .bind(p.hour as i32)
            .bind(p.predicted_kvah)
            .execute(&mut *tx)
            .await
            .context("failed to insert prediction history row")?;
        }
        tx.commit().await.context("failed to commit transaction")?;
        debug!(rows = points.len(), "forecast history appended");
        Ok(())
    }
}
