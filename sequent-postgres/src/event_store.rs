//! PostgreSQL Event Store
//!
//! This module provides an implementation of the `EventStore` trait using PostgreSQL
//! as the underlying storage. Tail insertion is serialized by a transaction-scoped
//! advisory lock with a bounded wait, and the append condition is checked inside the
//! append transaction while the lock is held, so a successful conditional append
//! proves no matching event was committed after the observed position.
mod append;
mod criteria;

use append::{InsertEventsBuilder, NewEventRow};
use criteria::CriteriaBuilder;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, instrument};

use sequent::{
    validate_event, validate_query, AppendCondition, EventStore, InputEvent, PersistedEvent,
    Position, Query, ReadOptions, SequencedEvents, Tag,
};

use crate::config::{AppendIsolation, PgEventStoreConfig};
use crate::migrator::Migrator;
use crate::Error;

/// Default page size for cursor-paged scans when `ReadOptions.batch_size` is absent.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 1000;

/// Advisory lock key serializing tail insertion across appenders.
const TAIL_LOCK_KEY: i64 = 0x5345_5155_454e_5421;

/// PostgreSQL event store implementation.
#[derive(Clone)]
pub struct PgEventStore {
    pub(crate) pool: PgPool,
    config: PgEventStoreConfig,
}

impl PgEventStore {
    /// Initializes the PostgreSQL DB and returns a new instance of `PgEventStore`.
    ///
    /// The backend is pinged before the schema is initialized, so construction fails
    /// fast when the database is unreachable.
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool.
    /// * `config` - The store configuration.
    pub async fn try_new(pool: PgPool, config: PgEventStoreConfig) -> Result<Self, Error> {
        let event_store = Self::new_uninitialized(pool, config);
        event_store.ping().await?;
        Migrator::new(event_store.clone()).init_event_store().await?;
        Ok(event_store)
    }

    /// Creates a new instance of `PgEventStore` without initializing the database.
    ///
    /// If you plan to use this constructor, ensure that the schema has been created
    /// beforehand. Refer to the SQL files in the "event_store/sql" directory to
    /// recreate the default structure.
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool.
    /// * `config` - The store configuration.
    pub fn new_uninitialized(pool: PgPool, config: PgEventStoreConfig) -> Self {
        Self { pool, config }
    }

    /// Legacy constructor taking only a batch limit; every other option keeps its
    /// default. Prefer [`PgEventStore::try_new`].
    pub async fn with_max_batch_size(pool: PgPool, max_batch_size: usize) -> Result<Self, Error> {
        Self::try_new(
            pool,
            PgEventStoreConfig::new().with_max_batch_size(max_batch_size),
        )
        .await
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &PgEventStoreConfig {
        &self.config
    }

    /// Fetches one page of events inside a transaction bounded by the read timeout.
    async fn fetch_page(&self, sql: &str) -> Result<Vec<PgRow>, Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.config.read_timeout().as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(rows)
    }
}

fn row_to_event(row: &PgRow) -> Result<PersistedEvent, Error> {
    let position: Position = row.get(0);
    let id: String = row.get(1);
    let event_type: String = row.get(2);
    let tags: Vec<Tag> = serde_json::from_value(row.get(3)).map_err(Error::Decode)?;
    let payload: serde_json::Value = row.get(4);
    let data = serde_json::to_vec(&payload).map_err(Error::Decode)?;
    Ok(PersistedEvent::new(
        position,
        id,
        InputEvent::new(event_type, tags, data),
    ))
}

const SELECT_EVENT: &str = "SELECT position, id, event_type, tags, payload FROM event";

#[async_trait]
impl EventStore for PgEventStore {
    type Error = Error;

    /// Reads the events matching the query into a buffer, in ascending position
    /// order, within the configured read time budget.
    async fn read(
        &self,
        query: &Query,
        options: &ReadOptions,
    ) -> Result<SequencedEvents, Self::Error> {
        validate_query(query)?;
        if options.max_events() == Some(0) {
            return Ok(SequencedEvents::new(vec![], options.empty_position()));
        }
        let criteria = CriteriaBuilder::new(query).from(options.from()).build();
        let limit = options
            .max_events()
            .map(|limit| format!(" LIMIT {limit}"))
            .unwrap_or_default();
        let sql = format!("{SELECT_EVENT} WHERE {criteria} ORDER BY position ASC{limit}");

        let rows = self.fetch_page(&sql).await?;
        let events = rows
            .iter()
            .map(row_to_event)
            .collect::<Result<Vec<_>, _>>()?;
        let position = events
            .last()
            .map(|event| event.position())
            .unwrap_or_else(|| options.empty_position());
        Ok(SequencedEvents::new(events, position))
    }

    /// Appends new events to the event store.
    ///
    /// The batch is validated, then persisted in a single transaction: the advisory
    /// tail lock is acquired with a bounded wait, the append condition (if any) is
    /// checked while the lock is held, and the events are inserted with positions
    /// drawn from the table's sequence. On any failure the transaction rolls back
    /// and no event of the batch is visible.
    #[instrument(skip_all, fields(batch = events.len()))]
    async fn append(
        &self,
        events: Vec<InputEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<Position, Self::Error> {
        if events.len() > self.config.max_batch_size() {
            return Err(Error::BatchTooLarge {
                max: self.config.max_batch_size(),
                actual: events.len(),
            });
        }
        for event in &events {
            validate_event(event)?;
        }
        if let Some(condition) = &condition {
            if let Some(query) = condition.query() {
                validate_query(query)?;
            }
        }
        let rows = events
            .iter()
            .map(NewEventRow::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;
        if self.config.append_isolation() == AppendIsolation::Serializable {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.config.lock_timeout().as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(TAIL_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        if let Some(condition) = &condition {
            if let Some(query) = condition.query() {
                let criteria = CriteriaBuilder::new(query)
                    .after(condition.after_position())
                    .build();
                let conflict: bool = sqlx::query_scalar(&format!(
                    "SELECT EXISTS (SELECT 1 FROM event WHERE {criteria})"
                ))
                .fetch_one(&mut *tx)
                .await?;
                if conflict {
                    debug!("append condition matched, rejecting batch");
                    return Err(Error::Concurrency);
                }
            }
        }

        if rows.is_empty() {
            let position: Position = sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) FROM event")
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(position);
        }

        let mut insert = InsertEventsBuilder::new(&rows);
        let positions: Vec<Position> = insert
            .build()
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|row| row.get(0))
            .collect();
        tx.commit().await?;

        let position = positions.into_iter().max().unwrap_or(0);
        debug!(position, "batch appended");
        Ok(position)
    }

    /// Streams events based on the provided query.
    ///
    /// The scan pages through the log with a position cursor, fetching
    /// `ReadOptions.batch_size` rows at a time (default
    /// [`DEFAULT_SCAN_BATCH_SIZE`]), so the working set stays bounded regardless of
    /// the log size. Events appended after the scan starts may or may not appear; no
    /// snapshot guarantee is made across pages.
    fn stream<'a>(
        &'a self,
        query: &'a Query,
        options: &'a ReadOptions,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>> {
        let page_size = options.page_size().unwrap_or(DEFAULT_SCAN_BATCH_SIZE).max(1);
        stream! {
            if let Err(err) = validate_query(query) {
                yield Err(err.into());
                return;
            }
            let mut from = options.from();
            let mut remaining = options.max_events();
            loop {
                if remaining == Some(0) {
                    return;
                }
                let page = remaining.map_or(page_size, |r| r.min(page_size));
                let criteria = CriteriaBuilder::new(query).from(from).build();
                let sql =
                    format!("{SELECT_EVENT} WHERE {criteria} ORDER BY position ASC LIMIT {page}");
                let rows = match self.fetch_page(&sql).await {
                    Ok(rows) => rows,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };
                let count = rows.len();
                for row in &rows {
                    match row_to_event(row) {
                        Ok(event) => {
                            from = Some(event.position() + 1);
                            if let Some(remaining) = remaining.as_mut() {
                                *remaining -= 1;
                            }
                            yield Ok(event);
                        }
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
                if count < page {
                    return;
                }
            }
        }
        .boxed()
    }

    /// Probes the backend for liveness.
    async fn ping(&self) -> Result<(), Self::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
