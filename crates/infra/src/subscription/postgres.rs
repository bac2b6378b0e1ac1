//! Postgres-backed subscription store.
//!
//! One row per subscription in `escr_<repository>_subscriptions`. Positions
//! are written after every applied event, so a crashed catch-up resumes
//! right after the last success.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tokio::runtime::RuntimeFlavor;
use tracing::instrument;

use escr_core::{ContentRepositoryId, SubscriptionId};
use escr_events::SequenceNumber;

use super::store::SubscriptionStore;
use super::{Subscription, SubscriptionCriteria, SubscriptionError, SubscriptionStatus};

#[derive(Debug, Clone)]
pub struct PostgresSubscriptionStore {
    pool: Arc<PgPool>,
    table: String,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool, repository: &ContentRepositoryId) -> Self {
        Self {
            pool: Arc::new(pool),
            table: format!("escr_{repository}_subscriptions"),
        }
    }

    #[instrument(skip(self), fields(table = %self.table), err)]
    pub async fn setup_schema(&self) -> Result<(), SubscriptionError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(255) PRIMARY KEY,
                status VARCHAR(32) NOT NULL,
                position BIGINT NOT NULL DEFAULT 0,
                error TEXT NULL,
                last_status_change TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table
        ))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("setup", e))?;
        Ok(())
    }

    #[instrument(skip(self, criteria), fields(table = %self.table), err)]
    pub async fn find_subscriptions(
        &self,
        criteria: &SubscriptionCriteria,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let ids: Option<Vec<String>> = if criteria.ids.is_empty() {
            None
        } else {
            Some(criteria.ids.iter().map(|id| id.as_str().to_string()).collect())
        };
        let statuses: Option<Vec<String>> = if criteria.statuses.is_empty() {
            None
        } else {
            Some(criteria.statuses.iter().map(|s| s.as_str().to_string()).collect())
        };

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, status, position, error, last_status_change
            FROM {}
            WHERE ($1::text[] IS NULL OR id = ANY($1))
                AND ($2::text[] IS NULL OR status = ANY($2))
            ORDER BY id ASC
            "#,
            self.table
        ))
        .bind(ids)
        .bind(statuses)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find", e))?;

        rows.iter()
            .map(|row| {
                SubscriptionRow::from_row(row)
                    .map_err(|e| SubscriptionError::Store(format!("failed to read subscription row: {e}")))
                    .and_then(Subscription::try_from)
            })
            .collect()
    }

    #[instrument(skip(self, subscription), fields(table = %self.table, subscription = %subscription.id), err)]
    pub async fn insert(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, status, position, error, last_status_change)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            self.table
        ))
        .bind(subscription.id.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.position.value() as i64)
        .bind(subscription.error.as_deref())
        .bind(subscription.last_status_change)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("add", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, subscription),
        fields(
            table = %self.table,
            subscription = %subscription.id,
            status = %subscription.status,
            position = %subscription.position
        ),
        err
    )]
    pub async fn save(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET status = $2, position = $3, error = $4, last_status_change = $5
            WHERE id = $1
            "#,
            self.table
        ))
        .bind(subscription.id.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.position.value() as i64)
        .bind(subscription.error.as_deref())
        .bind(subscription.last_status_change)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(SubscriptionError::Store(format!(
                "subscription '{}' does not exist",
                subscription.id
            )));
        }
        Ok(())
    }
}

fn block_on<F, T>(operation: &str, future: F) -> Result<T, SubscriptionError>
where
    F: Future<Output = Result<T, SubscriptionError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        SubscriptionError::Store(format!(
            "{operation}: PostgresSubscriptionStore requires a tokio runtime"
        ))
    })?;
    // block_in_place panics on a current-thread runtime.
    if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
        return Err(SubscriptionError::Store(format!(
            "{operation}: PostgresSubscriptionStore requires a multi-threaded tokio runtime"
        )));
    }
    tokio::task::block_in_place(|| handle.block_on(future))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SubscriptionError {
    match err {
        sqlx::Error::Database(db_err) => {
            SubscriptionError::Store(format!("database error in {}: {}", operation, db_err.message()))
        }
        other => SubscriptionError::Store(format!("sqlx error in {operation}: {other}")),
    }
}

#[derive(Debug)]
struct SubscriptionRow {
    id: String,
    status: String,
    position: i64,
    error: Option<String>,
    last_status_change: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SubscriptionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SubscriptionRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            position: row.try_get("position")?,
            error: row.try_get("error")?,
            last_status_change: row.try_get("last_status_change")?,
        })
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = SubscriptionError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let id = SubscriptionId::new(row.id)
            .map_err(|e| SubscriptionError::Store(format!("invalid subscription id: {e}")))?;
        let status = SubscriptionStatus::parse(&row.status).ok_or_else(|| {
            SubscriptionError::Store(format!("subscription '{id}' has unknown status '{}'", row.status))
        })?;
        Ok(Subscription {
            id,
            status,
            position: SequenceNumber::new(row.position.max(0) as u64),
            error: row.error,
            last_status_change: row.last_status_change,
        })
    }
}

impl SubscriptionStore for PostgresSubscriptionStore {
    fn setup(&self) -> Result<(), SubscriptionError> {
        block_on("setup", self.setup_schema())
    }

    fn find(&self, criteria: &SubscriptionCriteria) -> Result<Vec<Subscription>, SubscriptionError> {
        block_on("find", self.find_subscriptions(criteria))
    }

    fn add(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        block_on("add", self.insert(subscription))
    }

    fn update(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        block_on("update", self.save(subscription))
    }
}
