// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daily usage accounting with an atomic check-and-log.
//!
//! Counters are keyed by `(UTC date, worker)` in SQLite. The check and
//! the insert run inside one `BEGIN IMMEDIATE` transaction, so N runners
//! hammering the same database can never jointly overshoot the daily
//! maxima.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("daily budget exceeded: {0}")]
    Exceeded(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct BudgetGate {
    conn: Mutex<Connection>,
    max_daily_api_calls: u32,
    max_daily_cost_usd: f64,
}

impl BudgetGate {
    /// Open (and create) the budget database. Maxima of zero disable the
    /// corresponding limit.
    pub fn open(
        db_path: &Path,
        max_daily_api_calls: u32,
        max_daily_cost_usd: f64,
    ) -> Result<Self, BudgetError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS budget_log (
                date      TEXT NOT NULL,
                worker    TEXT NOT NULL,
                api_calls INTEGER NOT NULL DEFAULT 0,
                cost_usd  REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (date, worker)
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_daily_api_calls,
            max_daily_cost_usd: max_daily_cost_usd.max(0.0),
        })
    }

    /// Whether any limit is configured at all.
    pub fn enabled(&self) -> bool {
        self.max_daily_api_calls > 0 || self.max_daily_cost_usd > 0.0
    }

    /// Atomically check today's aggregate against the maxima and record
    /// the requested usage. Raises [`BudgetError::Exceeded`] without
    /// recording anything when the request would overshoot.
    pub fn check_and_log(
        &self,
        worker: &str,
        api_calls: u32,
        cost_usd: f64,
    ) -> Result<(), BudgetError> {
        self.check_and_log_on(Utc::now().date_naive(), worker, api_calls, cost_usd)
    }

    /// Fixed-date variant backing [`BudgetGate::check_and_log`]; exposed
    /// so tests can pin the day.
    pub fn check_and_log_on(
        &self,
        date: NaiveDate,
        worker: &str,
        api_calls: u32,
        cost_usd: f64,
    ) -> Result<(), BudgetError> {
        let cost_usd = cost_usd.max(0.0);
        let date = date.to_string();
        let worker = if worker.trim().is_empty() {
            "unknown"
        } else {
            worker
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (used_calls, used_cost): (u32, f64) = tx.query_row(
            "SELECT COALESCE(SUM(api_calls), 0), COALESCE(SUM(cost_usd), 0.0)
             FROM budget_log WHERE date = ?1",
            params![date],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if self.max_daily_api_calls > 0 && used_calls + api_calls > self.max_daily_api_calls {
            return Err(BudgetError::Exceeded(format!(
                "MAX_DAILY_API_CALLS: used={used_calls}, requested={api_calls}, limit={}",
                self.max_daily_api_calls
            )));
        }
        if self.max_daily_cost_usd > 0.0 && used_cost + cost_usd > self.max_daily_cost_usd {
            return Err(BudgetError::Exceeded(format!(
                "MAX_DAILY_COST_USD: used={used_cost:.6}, requested={cost_usd:.6}, limit={:.6}",
                self.max_daily_cost_usd
            )));
        }

        tx.execute(
            "INSERT INTO budget_log (date, worker, api_calls, cost_usd)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (date, worker) DO UPDATE SET
                 api_calls = api_calls + excluded.api_calls,
                 cost_usd  = cost_usd + excluded.cost_usd",
            params![date, worker, api_calls, cost_usd],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Today's aggregate across all workers (api_calls, cost_usd).
    pub fn today_usage(&self) -> Result<(u32, f64), BudgetError> {
        let date = Utc::now().date_naive().to_string();
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT COALESCE(SUM(api_calls), 0), COALESCE(SUM(cost_usd), 0.0)
             FROM budget_log WHERE date = ?1",
            params![date],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(row)
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
