//! Channel and cursor adapters over the event store scan.
//!
//! [`read_stream_channel`] pushes scanned events into a bounded channel: the producer
//! blocks when the buffer is full, backpressuring against the consumer, and a
//! [`CancellationToken`] stops it promptly. [`EventIterator`] is the pull-style
//! counterpart: a finite, non-restartable cursor with `next`/`current`/`err`/`close`
//! capabilities.
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::PersistedEvent;
use crate::event_store::{EventStore, ReadOptions};
use crate::query::Query;

/// Default capacity of the channels produced by the streaming surface.
pub const DEFAULT_STREAM_BUFFER: usize = 1000;

/// Streams the events matching `query` into a bounded channel.
///
/// The producer task scans the store, sends each event on the channel, and closes the
/// channel when the scan ends, a scan error is delivered, or `cancellation` fires. No
/// event is sent after the token fires; at most `buffer` events are fetched ahead of
/// the consumer. The scan cursor is dropped, releasing its backend resources, on
/// every exit path.
///
/// Must be called within a Tokio runtime.
pub fn read_stream_channel<ES>(
    store: ES,
    query: Query,
    options: ReadOptions,
    buffer: usize,
    cancellation: CancellationToken,
) -> mpsc::Receiver<Result<PersistedEvent, ES::Error>>
where
    ES: EventStore + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(async move {
        let mut stream = store.stream(&query, &options);
        loop {
            let item = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return,
                item = stream.next() => item,
            };
            let Some(item) = item else { return };
            let failed = item.is_err();
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return,
                sent = tx.send(item) => {
                    if sent.is_err() || failed {
                        return;
                    }
                }
            }
        }
    });
    rx
}

/// A pull-style cursor over a stream of events.
///
/// The iterator is finite and not restartable: once `next` returns `false` the cursor
/// is exhausted (or failed, see [`EventIterator::err`]) and stays so.
pub struct EventIterator<'a, E> {
    stream: Option<BoxStream<'a, Result<PersistedEvent, E>>>,
    current: Option<PersistedEvent>,
    error: Option<E>,
}

impl<'a, E> EventIterator<'a, E> {
    /// Wraps a scan stream into an iterator.
    pub fn new(stream: BoxStream<'a, Result<PersistedEvent, E>>) -> Self {
        Self {
            stream: Some(stream),
            current: None,
            error: None,
        }
    }

    /// Advances the cursor. Returns `true` when a new event is available via
    /// [`EventIterator::current`], `false` when the stream is exhausted, closed, or
    /// failed.
    pub async fn next(&mut self) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        match stream.next().await {
            Some(Ok(event)) => {
                self.current = Some(event);
                true
            }
            Some(Err(err)) => {
                self.error = Some(err);
                self.current = None;
                self.stream = None;
                false
            }
            None => {
                self.current = None;
                self.stream = None;
                false
            }
        }
    }

    /// The event the cursor currently points at.
    pub fn current(&self) -> Option<&PersistedEvent> {
        self.current.as_ref()
    }

    /// The error that terminated the iteration, if any.
    pub fn err(&self) -> Option<&E> {
        self.error.as_ref()
    }

    /// Releases the underlying cursor. Further calls to `next` return `false`.
    pub fn close(&mut self) {
        self.stream = None;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryEventStore;
    use crate::{tags, InputEvent};

    async fn seeded_store(count: usize) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let events = (0..count)
            .map(|i| {
                InputEvent::new(
                    "Tick",
                    tags! {"seq" => format!("{i}")},
                    b"{}".to_vec(),
                )
            })
            .collect();
        store.append(events, None).await.unwrap();
        store
    }

    #[tokio::test]
    async fn it_streams_all_events_in_order() {
        let store = seeded_store(5).await;
        let mut rx = read_stream_channel(
            store,
            Query::all(),
            ReadOptions::new(),
            2,
            CancellationToken::new(),
        );
        let mut positions = Vec::new();
        while let Some(item) = rx.recv().await {
            positions.push(item.unwrap().position());
        }
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn cancellation_closes_the_channel_promptly() {
        let store = seeded_store(100).await;
        let token = CancellationToken::new();
        let mut rx = read_stream_channel(
            store,
            Query::all(),
            ReadOptions::new(),
            4,
            token.clone(),
        );
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.position(), 1);
        token.cancel();
        // Drain whatever was already buffered; the channel must close without
        // delivering the rest of the log.
        let mut drained = 1;
        while rx.recv().await.is_some() {
            drained += 1;
        }
        assert!(drained <= 1 + 4 + 1, "drained {drained} events");
    }

    #[tokio::test]
    async fn the_iterator_walks_the_stream_and_closes() {
        let store = seeded_store(3).await;
        let query = Query::all();
        let options = ReadOptions::new();
        let mut iter = EventIterator::new(store.stream(&query, &options));

        assert!(iter.next().await);
        assert_eq!(iter.current().unwrap().position(), 1);
        assert!(iter.next().await);
        assert_eq!(iter.current().unwrap().position(), 2);

        iter.close();
        assert!(!iter.next().await);
        assert!(iter.current().is_none());
        assert!(iter.err().is_none());
    }

    #[tokio::test]
    async fn the_iterator_is_exhausted_after_the_last_event() {
        let store = seeded_store(1).await;
        let query = Query::all();
        let options = ReadOptions::new();
        let mut iter = EventIterator::new(store.stream(&query, &options));

        assert!(iter.next().await);
        assert!(!iter.next().await);
        assert!(!iter.next().await);
    }
}
