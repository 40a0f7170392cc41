//! Event store is responsible for storing and retrieving events.
//!
//! It is designed to be implemented by different storage backends. Implementations of
//! this trait must honor the log contract: positions are strictly increasing and agree
//! with commit order, appends are atomic, scans return events in ascending position
//! order, and the append condition is evaluated inside the append transaction so that
//! a successful conditional append proves no matching event was committed after the
//! observed position.
//!
//! Every operation returns a future; dropping the future is the cancellation handle.
//! Backends roll back in-flight transactions and close cursors when that happens.
use crate::event::{InputEvent, PersistedEvent, Position};
use crate::query::Query;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Options bounding a read or a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    from_position: Option<Position>,
    limit: Option<usize>,
    batch_size: Option<usize>,
}

impl ReadOptions {
    /// Creates the default options: read from the beginning, unbounded, with the
    /// backend's configured page size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inclusive lower position bound.
    pub fn from_position(mut self, position: Position) -> Self {
        self.from_position = Some(position);
        self
    }

    /// Sets the maximum number of events returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the cursor page size for streaming scans.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// The inclusive lower position bound, if any.
    pub fn from(&self) -> Option<Position> {
        self.from_position
    }

    /// The maximum number of events returned, if bounded.
    pub fn max_events(&self) -> Option<usize> {
        self.limit
    }

    /// The cursor page size for streaming scans, if set.
    pub fn page_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// The position reported for an empty result: one before the lower bound, or 0
    /// when reading from the beginning.
    pub fn empty_position(&self) -> Position {
        self.from_position.map(|p| p - 1).unwrap_or(0)
    }
}

/// A buffered read result: the matching events plus the largest position read.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvents {
    events: Vec<PersistedEvent>,
    position: Position,
}

impl SequencedEvents {
    /// Creates a new `SequencedEvents` from the read events and the resulting
    /// position.
    pub fn new(events: Vec<PersistedEvent>, position: Position) -> Self {
        Self { events, position }
    }

    /// The events, in ascending position order.
    pub fn events(&self) -> &[PersistedEvent] {
        &self.events
    }

    /// The largest position read, or the sentinel before the scan's lower bound when
    /// no event matched.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Consumes the result, returning the events.
    pub fn into_events(self) -> Vec<PersistedEvent> {
        self.events
    }
}

/// A guard for a conditional append.
///
/// The append is rejected with a concurrency conflict if any event matching
/// `fail_if_events_match` exists with a position greater than `after` (any position if
/// `after` is absent) at the serialization point of the append transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendCondition {
    fail_if_events_match: Option<Query>,
    after: Option<Position>,
}

impl AppendCondition {
    /// Creates a condition rejecting the append if any event matches the given query.
    pub fn fail_if_events_match(query: Query) -> Self {
        Self {
            fail_if_events_match: Some(query),
            after: None,
        }
    }

    /// Restricts the condition to events with a position strictly greater than the
    /// given one.
    pub fn after(mut self, position: Position) -> Self {
        self.after = Some(position);
        self
    }

    /// The query whose matches reject the append, if any.
    pub fn query(&self) -> Option<&Query> {
        self.fail_if_events_match.as_ref()
    }

    /// The exclusive position bound of the condition, if any.
    pub fn after_position(&self) -> Option<Position> {
        self.after
    }
}

/// An event store with dynamic consistency boundary semantics.
///
/// This trait provides methods for reading, streaming and conditionally appending
/// events. Writers guard appends with a predicate over already-persisted events to
/// implement optimistic concurrency without per-stream aggregates.
#[async_trait]
pub trait EventStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads the events matching the query into a buffer.
    ///
    /// # Arguments
    ///
    /// * `query` - The query specifying the filtering conditions.
    /// * `options` - Position bound and limit of the read.
    ///
    /// # Returns
    ///
    /// The matching events in ascending position order, plus the largest position
    /// read.
    async fn read(
        &self,
        query: &Query,
        options: &ReadOptions,
    ) -> Result<SequencedEvents, Self::Error>;

    /// Appends a batch of events to the event store.
    ///
    /// All events in the batch share one transaction: either every event becomes
    /// visible or none does. When `condition` is set, the append fails with a
    /// concurrency conflict if the condition's query matches any event newer than the
    /// condition's position at the transaction's serialization point.
    ///
    /// # Returns
    ///
    /// The largest position assigned to the batch.
    async fn append(
        &self,
        events: Vec<InputEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<Position, Self::Error>;

    /// Streams events based on the provided query.
    ///
    /// Events are yielded in ascending position order, each with a position greater
    /// than or equal to the options' lower bound. Events appended after the scan
    /// starts may or may not appear; no snapshot guarantee is made.
    fn stream<'a>(
        &'a self,
        query: &'a Query,
        options: &'a ReadOptions,
    ) -> BoxStream<'a, Result<PersistedEvent, Self::Error>>;

    /// Probes the backend for liveness.
    async fn ping(&self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_options_report_the_empty_position() {
        assert_eq!(ReadOptions::new().empty_position(), 0);
        assert_eq!(ReadOptions::new().from_position(7).empty_position(), 6);
    }

    #[test]
    fn append_condition_builder_sets_the_bound() {
        let condition = AppendCondition::fail_if_events_match(Query::all()).after(42);
        assert_eq!(condition.after_position(), Some(42));
        assert!(condition.query().is_some());
        assert_eq!(AppendCondition::default().query(), None);
    }
}
