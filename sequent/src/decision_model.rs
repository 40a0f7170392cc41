//! A decision model projects one or more in-memory states from a filtered event
//! stream and returns the append condition for a subsequent conditional append.
//!
//! The engine scans the log once with the union of all projector queries, folds every
//! event into each matching projector in position order, and emits an
//! [`AppendCondition`] of the form "fail if any event matching what I just observed
//! has appeared after the point I read". A follow-up conditional append therefore
//! implements optimistic concurrency on exactly the decision's read-set, with no
//! aggregate identifier involved.
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{PersistedEvent, Position};
use crate::event_store::{AppendCondition, EventStore, ReadOptions};
use crate::query::Query;
use crate::validator::{validate_query, ValidationError};
use crate::BoxDynError;

/// A stateful projector folding events matching its query into a state value.
///
/// The transition function is assumed pure: given the same committed log prefix, the
/// projection is deterministic.
pub trait StateProjector: Send + Sync {
    type State: Clone + Send + Sync + 'static;

    /// The query selecting the events this projector folds.
    fn query(&self) -> Query;

    /// The state before any event is applied.
    fn initial_state(&self) -> Self::State;

    /// Folds one event into the state.
    fn apply(&self, state: Self::State, event: &PersistedEvent) -> Self::State;
}

type ErasedState = Arc<dyn Any + Send + Sync>;
type ErasedApply = Box<dyn Fn(&ErasedState, &PersistedEvent) -> ErasedState + Send + Sync>;

/// A named projector whose state type has been erased, so projectors over different
/// state types can run in one batch.
pub struct BatchProjector {
    id: String,
    query: Query,
    state: ErasedState,
    apply: ErasedApply,
}

impl BatchProjector {
    /// Wraps a [`StateProjector`] under the given id. The id must be unique within a
    /// batch.
    pub fn new<P>(id: impl Into<String>, projector: P) -> Self
    where
        P: StateProjector + 'static,
    {
        let query = projector.query();
        let state: ErasedState = Arc::new(projector.initial_state());
        let apply: ErasedApply = Box::new(move |state, event| {
            let current = state
                .downcast_ref::<P::State>()
                .expect("projector state carries the type it was created with")
                .clone();
            Arc::new(projector.apply(current, event))
        });
        Self {
            id: id.into(),
            query,
            state,
            apply,
        }
    }

    /// The id of this projector within the batch.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The query selecting the events this projector folds.
    pub fn query(&self) -> &Query {
        &self.query
    }

    fn fold(&mut self, event: &PersistedEvent) {
        self.state = (self.apply)(&self.state, event);
    }
}

/// The outcome of a batch projection: the final state of every projector plus the
/// append condition guarding the decision.
pub struct DecisionModel {
    states: HashMap<String, ErasedState>,
    append_condition: AppendCondition,
    position: Position,
    processed: u64,
}

impl std::fmt::Debug for DecisionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionModel")
            .field("states", &self.states.keys())
            .field("append_condition", &self.append_condition)
            .field("position", &self.position)
            .field("processed", &self.processed)
            .finish()
    }
}

impl DecisionModel {
    /// The final state of the projector registered under `id`, downcast to its
    /// concrete type. Returns `None` for an unknown id or a mismatched type.
    pub fn state<S: Clone + Send + Sync + 'static>(&self, id: &str) -> Option<&S> {
        self.states.get(id)?.downcast_ref()
    }

    /// The condition to attach to a subsequent conditional append.
    pub fn append_condition(&self) -> &AppendCondition {
        &self.append_condition
    }

    /// The position of the final event processed, or 0 when the scan was empty.
    pub fn position(&self) -> Position {
        self.position
    }

    /// The number of events processed by the scan.
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

/// Represents the ways a projection can fail.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError<ES> {
    /// A projector id or query is structurally invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The scan failed; partial state is discarded.
    #[error("event store error: {0}")]
    EventStore(#[source] ES),
}

fn check_projectors(projectors: &[BatchProjector]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for projector in projectors {
        if !seen.insert(projector.id.clone()) {
            return Err(ValidationError::DuplicateProjectorId {
                id: projector.id.clone(),
            });
        }
        validate_query(&projector.query)?;
    }
    Ok(())
}

/// The union of all projector queries: the single scan predicate of the batch.
fn union_query(projectors: &[BatchProjector]) -> Query {
    projectors
        .iter()
        .map(|p| p.query.clone())
        .reduce(Query::union)
        .unwrap_or_default()
}

/// Projects all given projectors in one scan of the log, from the beginning.
///
/// Returns the final states keyed by projector id and an [`AppendCondition`] of
/// `(union of all queries, after = last position processed)`. With no projectors the
/// model is empty and the condition is unconditional.
pub async fn project_decision_model<ES>(
    store: &ES,
    projectors: Vec<BatchProjector>,
) -> Result<DecisionModel, ProjectionError<ES::Error>>
where
    ES: EventStore,
{
    check_projectors(&projectors)?;
    if projectors.is_empty() {
        return Ok(DecisionModel {
            states: HashMap::new(),
            append_condition: AppendCondition::default(),
            position: 0,
            processed: 0,
        });
    }

    let union = union_query(&projectors);
    let options = ReadOptions::new();
    let mut runners = projectors;
    let mut position: Position = 0;
    let mut processed: u64 = 0;
    {
        let mut stream = store.stream(&union, &options);
        while let Some(item) = stream.next().await {
            let event = item.map_err(ProjectionError::EventStore)?;
            position = event.position();
            processed += 1;
            for runner in runners.iter_mut() {
                if runner.query.matches(&event) {
                    runner.fold(&event);
                }
            }
        }
    }
    debug!(processed, position, "decision model projected");

    Ok(DecisionModel {
        states: runners.into_iter().map(|r| (r.id, r.state)).collect(),
        append_condition: AppendCondition::fail_if_events_match(union).after(position),
        position,
        processed,
    })
}

/// One projection step emitted on the channel variant: the state of a projector after
/// folding one matching event, or a terminal error.
pub struct ProjectionResult {
    projector_id: Option<String>,
    state: Option<ErasedState>,
    event: Option<PersistedEvent>,
    position: Position,
    error: Option<BoxDynError>,
}

impl ProjectionResult {
    fn step(id: String, state: ErasedState, event: PersistedEvent) -> Self {
        Self {
            projector_id: Some(id),
            state: Some(state),
            position: event.position(),
            event: Some(event),
            error: None,
        }
    }

    fn terminal(position: Position, error: BoxDynError) -> Self {
        Self {
            projector_id: None,
            state: None,
            event: None,
            position,
            error: Some(error),
        }
    }

    /// The id of the projector this step belongs to; `None` on a terminal error.
    pub fn projector_id(&self) -> Option<&str> {
        self.projector_id.as_deref()
    }

    /// The projector state after folding the event, downcast to its concrete type.
    pub fn state<S: Clone + Send + Sync + 'static>(&self) -> Option<&S> {
        self.state.as_ref()?.downcast_ref()
    }

    /// The event folded by this step.
    pub fn event(&self) -> Option<&PersistedEvent> {
        self.event.as_ref()
    }

    /// The position of the event, or of the last event processed before a terminal
    /// error.
    pub fn position(&self) -> Position {
        self.position
    }

    /// The scan failure terminating the projection, if this is the terminal result.
    pub fn error(&self) -> Option<&BoxDynError> {
        self.error.as_ref()
    }
}

/// Streams projection steps on a bounded channel.
///
/// One [`ProjectionResult`] is emitted per (event, matching projector) pair. Results
/// of a given projector arrive in event-position order; the interleaving across
/// projectors for one event is unspecified. A scan failure emits a terminal result
/// carrying the error, then the channel closes. Cancellation closes the channel with
/// nothing further emitted. The producer blocks when the buffer is full,
/// backpressuring against the consumer.
///
/// Must be called within a Tokio runtime.
pub fn project_decision_model_channel<ES>(
    store: ES,
    projectors: Vec<BatchProjector>,
    buffer: usize,
    cancellation: CancellationToken,
) -> Result<mpsc::Receiver<ProjectionResult>, ValidationError>
where
    ES: EventStore + Send + Sync + 'static,
{
    check_projectors(&projectors)?;
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(async move {
        let union = union_query(&projectors);
        let options = ReadOptions::new();
        let mut runners = projectors;
        let mut position: Position = 0;
        let mut stream = store.stream(&union, &options);
        loop {
            let item = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return,
                item = stream.next() => item,
            };
            let event = match item {
                None => return,
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    let _ = tx
                        .send(ProjectionResult::terminal(position, Box::new(err)))
                        .await;
                    return;
                }
            };
            position = event.position();
            for runner in runners.iter_mut() {
                if !runner.query.matches(&event) {
                    continue;
                }
                runner.fold(&event);
                let result =
                    ProjectionResult::step(runner.id.clone(), runner.state.clone(), event.clone());
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => return,
                    sent = tx.send(result) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
    Ok(rx)
}
