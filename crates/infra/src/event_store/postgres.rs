//! Postgres-backed event store implementation.
//!
//! One table per content repository (`escr_<repository>_events`) holds every
//! stream. The global sequence number is a `BIGSERIAL`; stream versions are
//! guarded by a `UNIQUE (stream, version)` constraint.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | EventStoreError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database (unique violation) | `23505` | `Concurrency` | Another writer took the same stream version |
//! | Database (check constraint violation) | `23514` | `InvalidAppend` | Invalid data (e.g. version <= 0) |
//! | Database (other) | Any other | `Database` | Other database errors |
//! | PoolClosed | N/A | `Database` | Connection pool was closed |
//! | Other | N/A | `Database` | Network errors, connection failures, etc. |
//!
//! ## Commit ordering
//!
//! ```text
//! BEGIN
//!   LOCK TABLE <events> IN EXCLUSIVE MODE   -- readers continue, writers queue
//!   SELECT MAX(version) WHERE stream = $1   -- expected version check
//!   INSERT ... RETURNING sequence_number    -- one row per event
//! COMMIT
//! ```
//!
//! The table lock keeps sequence numbers visible in commit order, so a
//! catch-up that read up to N never misses a smaller number committed later.
//!
//! ## Thread Safety
//!
//! `PostgresEventStore` is `Send + Sync`. The synchronous [`EventStore`] impl
//! blocks on the async methods and must run inside a multi-threaded tokio
//! runtime.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tokio::runtime::RuntimeFlavor;
use tracing::instrument;

use escr_core::{ContentRepositoryId, EventId, ExpectedVersion};
use escr_events::{EventMetadata, ProjectionStatus, SequenceNumber, StreamName};

use super::r#trait::{
    CommitResult, EventStore, EventStoreError, EventStreamFilter, EventStreamSelector, StoredEvent,
    UncommittedEvent,
};

/// Postgres-backed append-only event store.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
    table: String,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool, repository: &ContentRepositoryId) -> Self {
        Self {
            pool: Arc::new(pool),
            // Repository ids are lowercase alphanumerics and '_', safe to splice.
            table: format!("escr_{repository}_events"),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    #[instrument(skip(self), fields(table = %self.table), err)]
    pub async fn setup_schema(&self) -> Result<(), EventStoreError> {
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    sequence_number BIGSERIAL PRIMARY KEY,
                    stream VARCHAR(255) NOT NULL,
                    version BIGINT NOT NULL CHECK (version > 0),
                    event_id UUID NOT NULL UNIQUE,
                    event_type VARCHAR(255) NOT NULL,
                    payload JSONB NOT NULL,
                    metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    UNIQUE (stream, version)
                )
                "#,
                table = self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_type_idx ON {table} (event_type)",
                table = self.table
            ),
        ];
        for statement in statements {
            sqlx::query(&statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("setup", e))?;
        }
        Ok(())
    }

    /// Commit a batch under an expected-version check.
    #[instrument(
        skip(self, events),
        fields(
            table = %self.table,
            stream = %stream,
            event_count = events.len(),
            expected = %expected
        ),
        err
    )]
    pub async fn commit_events(
        &self,
        stream: &StreamName,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<CommitResult, EventStoreError> {
        if events.is_empty() {
            return Err(EventStoreError::InvalidAppend(format!(
                "empty commit to {stream}"
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(&format!("LOCK TABLE {} IN EXCLUSIVE MODE", self.table))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_table", e))?;

        let current: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(version) FROM {} WHERE stream = $1",
            self.table
        ))
        .bind(stream.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("stream_version", e))?;
        let current = current.unwrap_or(0) as u64;

        if !expected.matches(current) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::Concurrency {
                stream: stream.clone(),
                expected,
                actual: Some(current),
            });
        }

        let insert = format!(
            r#"
            INSERT INTO {} (stream, version, event_id, event_type, payload, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING sequence_number
            "#,
            self.table
        );
        let mut version = current;
        let mut sequence_number = SequenceNumber::none();
        for event in events {
            version += 1;
            let metadata = serde_json::to_value(&event.metadata)
                .map_err(|e| EventStoreError::Serialization(format!("metadata serialization failed: {e}")))?;
            let sequence: i64 = sqlx::query_scalar(&insert)
                .bind(stream.as_str())
                .bind(version as i64)
                .bind(event.event_id.as_uuid())
                .bind(&event.event_type)
                .bind(&event.payload)
                .bind(metadata)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        EventStoreError::Concurrency {
                            stream: stream.clone(),
                            expected,
                            actual: None,
                        }
                    } else {
                        map_sqlx_error("insert_event", e)
                    }
                })?;
            sequence_number = SequenceNumber::new(sequence as u64);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommitResult {
            version,
            sequence_number,
        })
    }

    #[instrument(skip(self, filter), fields(table = %self.table, selector = ?selector), err)]
    pub async fn load_events(
        &self,
        selector: &EventStreamSelector,
        filter: &EventStreamFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let stream = match selector {
            EventStreamSelector::All => None,
            EventStreamSelector::Stream(name) => Some(name.as_str()),
        };
        let event_types: Option<Vec<String>> = if filter.event_types.is_empty() {
            None
        } else {
            Some(filter.event_types.iter().cloned().collect())
        };

        let rows = sqlx::query(&format!(
            r#"
            SELECT sequence_number, stream, version, event_id, event_type, payload, metadata, recorded_at
            FROM {}
            WHERE ($1::text IS NULL OR stream = $1)
                AND ($2::text[] IS NULL OR event_type = ANY($2))
                AND ($3::bigint IS NULL OR sequence_number >= $3)
                AND ($4::bigint IS NULL OR sequence_number <= $4)
            ORDER BY sequence_number ASC
            "#,
            self.table
        ))
        .bind(stream)
        .bind(event_types)
        .bind(filter.min_sequence_number.map(|s| s.value() as i64))
        .bind(filter.max_sequence_number.map(|s| s.value() as i64))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load", e))?;

        rows.iter()
            .map(|row| {
                StoredEventRow::from_row(row)
                    .map_err(|e| EventStoreError::Serialization(format!("failed to read event row: {e}")))
                    .and_then(StoredEvent::try_from)
            })
            .collect()
    }

    #[instrument(skip(self), fields(table = %self.table), err)]
    pub async fn max_sequence_number(&self) -> Result<SequenceNumber, EventStoreError> {
        let max: Option<i64> = sqlx::query_scalar(&format!("SELECT MAX(sequence_number) FROM {}", self.table))
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("highest_sequence_number", e))?;
        Ok(SequenceNumber::new(max.unwrap_or(0) as u64))
    }

    pub async fn version_of(&self, stream: &StreamName) -> Result<u64, EventStoreError> {
        let max: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(version) FROM {} WHERE stream = $1",
            self.table
        ))
        .bind(stream.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stream_version", e))?;
        Ok(max.unwrap_or(0) as u64)
    }

    pub async fn check_status(&self) -> ProjectionStatus {
        let exists: Result<Option<String>, sqlx::Error> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(&self.table)
            .fetch_one(&*self.pool)
            .await;
        match exists {
            Ok(Some(_)) => ProjectionStatus::Ok,
            Ok(None) => ProjectionStatus::SetupRequired(format!("table {} does not exist", self.table)),
            Err(e) => ProjectionStatus::Error(format!("event store unreachable: {e}")),
        }
    }
}

/// Run an async store operation from the synchronous trait.
fn block_on<F, T>(operation: &str, future: F) -> Result<T, EventStoreError>
where
    F: Future<Output = Result<T, EventStoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::Database(format!(
            "{operation}: PostgresEventStore requires a tokio runtime"
        ))
    })?;
    // block_in_place panics on a current-thread runtime.
    if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
        return Err(EventStoreError::Database(format!(
            "{operation}: PostgresEventStore requires a multi-threaded tokio runtime"
        )));
    }
    tokio::task::block_in_place(|| handle.block_on(future))
}

/// Map SQLx errors to EventStoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Database(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

#[derive(Debug)]
struct StoredEventRow {
    sequence_number: i64,
    stream: String,
    version: i64,
    event_id: uuid::Uuid,
    event_type: String,
    payload: serde_json::Value,
    metadata: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StoredEventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            sequence_number: row.try_get("sequence_number")?,
            stream: row.try_get("stream")?,
            version: row.try_get("version")?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            metadata: row.try_get("metadata")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl TryFrom<StoredEventRow> for StoredEvent {
    type Error = EventStoreError;

    fn try_from(row: StoredEventRow) -> Result<Self, Self::Error> {
        let metadata: EventMetadata = serde_json::from_value(row.metadata)
            .map_err(|e| EventStoreError::Serialization(format!("invalid event metadata: {e}")))?;
        Ok(StoredEvent {
            event_id: EventId::from_uuid(row.event_id),
            stream_name: StreamName::new(row.stream),
            version: row.version as u64,
            sequence_number: SequenceNumber::new(row.sequence_number as u64),
            event_type: row.event_type,
            recorded_at: row.recorded_at,
            metadata,
            payload: row.payload,
        })
    }
}

impl EventStore for PostgresEventStore {
    fn setup(&self) -> Result<(), EventStoreError> {
        block_on("setup", self.setup_schema())
    }

    fn commit(
        &self,
        stream: &StreamName,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<CommitResult, EventStoreError> {
        block_on("commit", self.commit_events(stream, events, expected))
    }

    fn load(
        &self,
        selector: &EventStreamSelector,
        filter: &EventStreamFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on("load", self.load_events(selector, filter))
    }

    fn highest_sequence_number(&self) -> Result<SequenceNumber, EventStoreError> {
        block_on("highest_sequence_number", self.max_sequence_number())
    }

    fn stream_version(&self, stream: &StreamName) -> Result<u64, EventStoreError> {
        block_on("stream_version", self.version_of(stream))
    }

    fn status(&self) -> ProjectionStatus {
        match block_on("status", async { Ok(self.check_status().await) }) {
            Ok(status) => status,
            Err(e) => ProjectionStatus::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn repository_id() -> ContentRepositoryId {
        ContentRepositoryId::new(format!("test_{}", uuid::Uuid::now_v7().simple())).unwrap()
    }

    fn event(kind: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: EventId::new(),
            event_type: kind.to_string(),
            payload: json!({ "type": kind }),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn current_thread_runtimes_are_rejected_instead_of_panicking() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://escr@localhost/escr")
            .unwrap();
        let store = PostgresEventStore::new(pool, &repository_id());

        let err = store.highest_sequence_number().unwrap_err();
        assert!(
            matches!(&err, EventStoreError::Database(message) if message.contains("multi-threaded")),
            "{err}"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres database"]
    async fn commits_and_loads_against_postgres() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.unwrap();
        let store = PostgresEventStore::new(pool, &repository_id());
        store.setup().unwrap();
        // Setting up twice is harmless.
        store.setup().unwrap();
        assert!(store.status().is_ok());

        let a = StreamName::new("ContentStream:a");
        let first = store
            .commit(&a, vec![event("A1"), event("A2")], ExpectedVersion::NO_STREAM)
            .unwrap();
        assert_eq!(first.version, 2);
        assert_eq!(first.sequence_number, SequenceNumber::new(2));

        let err = store
            .commit(&a, vec![event("A3")], ExpectedVersion::NO_STREAM)
            .unwrap_err();
        assert!(err.is_concurrency_conflict(), "{err}");

        store.commit(&a, vec![event("A3")], ExpectedVersion::Exact(2)).unwrap();
        let loaded = store
            .load(&EventStreamSelector::Stream(a.clone()), &EventStreamFilter::new())
            .unwrap();
        let types: Vec<&str> = loaded.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["A1", "A2", "A3"]);
        assert_eq!(store.stream_version(&a).unwrap(), 3);
        assert_eq!(store.highest_sequence_number().unwrap(), SequenceNumber::new(3));
    }
}
