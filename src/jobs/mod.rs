//! Scheduled Jobs
//!
//! Periodic maintenance that bounds storage growth of idempotency keys and
//! refresh tokens.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::AppResult;
use crate::idempotency;
use crate::store::users;

// =========================================================================
// Expired Idempotency Key Deletion Job
// =========================================================================

/// Delete idempotency keys past their `expires_at`
pub async fn delete_expired_idempotency_keys(pool: &PgPool) -> AppResult<u64> {
    let rows_deleted = idempotency::delete_expired(pool).await?;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Deleted expired idempotency keys");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Expired Refresh Token Deletion Job
// =========================================================================

pub async fn delete_expired_refresh_tokens(pool: &PgPool) -> AppResult<u64> {
    let rows_deleted = users::delete_expired_refresh_tokens(pool).await?;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Deleted expired refresh tokens");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    interval: Duration,
}

impl JobScheduler {
    /// A zero interval is raised to one second.
    pub fn new(pool: PgPool, interval: Duration) -> Self {
        Self {
            pool,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Job scheduler started");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.run_all_once().await;
            for error in &report.errors {
                tracing::error!(error = %error, "Maintenance job failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match delete_expired_idempotency_keys(&self.pool).await {
            Ok(count) => report.idempotency_keys_deleted = count,
            Err(e) => report.errors.push(format!("Idempotency deletion: {}", e)),
        }

        match delete_expired_refresh_tokens(&self.pool).await {
            Ok(count) => report.refresh_tokens_deleted = count,
            Err(e) => report.errors.push(format!("Refresh token deletion: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub idempotency_keys_deleted: u64,
    pub refresh_tokens_deleted: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl MaintenanceReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
