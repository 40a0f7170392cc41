//! In-memory event store for tests.
//!
//! [`InMemoryEventStore`] honors the full store contract, including conditional
//! appends and the batch-size limit, against a plain `Vec` guarded by a mutex. Use it
//! to exercise projections and decision cycles without a database.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use thiserror::Error;

use crate::event::{InputEvent, PersistedEvent, Position};
use crate::event_store::{AppendCondition, EventStore, ReadOptions, SequencedEvents};
use crate::query::Query;
use crate::type_id::generate_tag_based_type_id;
use crate::validator::{validate_event, validate_query, ValidationError};

const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Represents the ways the in-memory store can fail.
#[derive(Debug, Error)]
pub enum InMemoryStoreError {
    /// An event or a query is structurally invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The append batch exceeds the configured maximum.
    #[error("append batch exceeds the maximum of {max} events (got {actual})")]
    BatchTooLarge { max: usize, actual: usize },
    /// The append condition matched events newer than the observed position.
    #[error("append condition matched events appended after the observed position")]
    Concurrency,
}

/// An event store backed by process memory.
#[derive(Clone)]
pub struct InMemoryEventStore {
    log: Arc<Mutex<Vec<PersistedEvent>>>,
    max_batch_size: usize,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Creates an empty store with the default batch limit.
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Overrides the maximum append batch size.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    fn snapshot(&self, query: &Query, options: &ReadOptions) -> Vec<PersistedEvent> {
        let log = self.log.lock().expect("event log mutex poisoned");
        let from = options.from().unwrap_or(Position::MIN);
        let scan = log
            .iter()
            .filter(|event| event.position() >= from && query.matches(event))
            .cloned();
        match options.max_events() {
            Some(limit) => scan.take(limit).collect(),
            None => scan.collect(),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    type Error = InMemoryStoreError;

    async fn read(
        &self,
        query: &Query,
        options: &ReadOptions,
    ) -> Result<SequencedEvents, Self::Error> {
        validate_query(query)?;
        let events = self.snapshot(query, options);
        let position = events
            .last()
            .map(|event| event.position())
            .unwrap_or_else(|| options.empty_position());
        Ok(SequencedEvents::new(events, position))
    }

    async fn append(
        &self,
        events: Vec<InputEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<Position, Self::Error> {
        if events.len() > self.max_batch_size {
            return Err(InMemoryStoreError::BatchTooLarge {
                max: self.max_batch_size,
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

        let mut log = self.log.lock().expect("event log mutex poisoned");
        if let Some(condition) = &condition {
            if let Some(query) = condition.query() {
                let after = condition.after_position().unwrap_or(Position::MIN);
                let conflict = log
                    .iter()
                    .any(|event| event.position() > after && query.matches(event));
                if conflict {
                    return Err(InMemoryStoreError::Concurrency);
                }
            }
        }

        let mut position = log.last().map(|event| event.position()).unwrap_or(0);
        for event in events {
            position += 1;
            let id = generate_tag_based_type_id(event.tags());
            log.push(PersistedEvent::new(position, id, event));
        }
        Ok(position)
    }

    fn stream<'a>(
        &'a self,
        query: &'a Query,
        options: &'a ReadOptions,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>> {
        if let Err(err) = validate_query(query) {
            return stream::iter([Err(err.into())]).boxed();
        }
        stream::iter(self.snapshot(query, options).into_iter().map(Ok)).boxed()
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
