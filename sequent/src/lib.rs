#![doc = include_str!("../README.md")]

mod decision_model;
mod event;
mod event_store;
mod query;
mod streaming;
pub mod testing;
mod type_id;
mod validator;

#[doc(inline)]
pub use crate::decision_model::{
    project_decision_model, project_decision_model_channel, BatchProjector, DecisionModel,
    ProjectionError, ProjectionResult, StateProjector,
};
#[doc(inline)]
pub use crate::event::{InputEvent, PersistedEvent, Position, Tag};
#[doc(inline)]
pub use crate::event_store::{AppendCondition, EventStore, ReadOptions, SequencedEvents};
#[doc(inline)]
pub use crate::query::{Query, QueryItem};
#[doc(inline)]
pub use crate::streaming::{read_stream_channel, EventIterator, DEFAULT_STREAM_BUFFER};
#[doc(inline)]
pub use crate::type_id::{extract_uuid_from_type_id, generate_tag_based_type_id, MAX_TYPE_ID_LEN};
#[doc(inline)]
pub use crate::validator::{validate_event, validate_query, ValidationError};

pub type BoxDynError = Box<dyn std::error::Error + 'static + Send + Sync>;
