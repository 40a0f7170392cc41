//! Event represents an occurrence or action of interest within the system.
//!
//! Events are immutable, tagged records. A [`Tag`] categorises the event along one
//! dimension (for example `course_id=c1`); all tags of an event are conjunctive for
//! matching. The [`InputEvent`] struct is the shape handed to the store for appending,
//! and [`PersistedEvent`] wraps it with the global position and the id assigned by the
//! event store.
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

use crate::validator::ValidationError;

/// The global position of an event in the log.
///
/// Positions are strictly increasing and assigned at commit time; they define the
/// total order of the log across all writers.
pub type Position = i64;

/// A key/value pair categorising an event along one dimension.
#[derive(Debug, Hash, PartialEq, Eq, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Creates a new tag from a key and a value.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the key or the value is empty.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        let value = value.into();
        if key.is_empty() {
            return Err(ValidationError::EmptyTagKey);
        }
        if value.is_empty() {
            return Err(ValidationError::EmptyTagValue { key });
        }
        Ok(Self { key, value })
    }

    /// Creates a tag without checking the key and the value.
    ///
    /// This constructor is intended for the [`tags!`](crate::tags) macro, where the
    /// store boundary still validates every appended event. Prefer [`Tag::new`].
    #[doc(hidden)]
    pub fn unchecked(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The dimension this tag categorises.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value of the dimension.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Creates a `Vec<Tag>` from `key => value` pairs.
///
/// # Example
///
/// ```
/// use sequent::tags;
///
/// let tags = tags! {"course_id" => "c1", "student_id" => "s1"};
/// assert_eq!(tags.len(), 2);
/// ```
#[macro_export]
macro_rules! tags {
    {} => {
        Vec::<$crate::Tag>::new()
    };
    {$($key:expr => $value:expr),+ $(,)?} => {
        vec![$($crate::Tag::unchecked($key, $value)),+]
    };
}

/// An event to be appended to the event store.
///
/// Same shape as a stored event minus the position and the id, which are assigned by
/// the store at commit time. `data` is an opaque payload required to be valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    event_type: String,
    tags: Vec<Tag>,
    data: Vec<u8>,
}

impl InputEvent {
    /// Creates a new input event from a type, a set of tags and a raw JSON payload.
    pub fn new(event_type: impl Into<String>, tags: Vec<Tag>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            event_type: event_type.into(),
            tags,
            data: data.into(),
        }
    }

    /// Creates a new input event serializing the given payload to JSON.
    pub fn json<T: Serialize>(
        event_type: impl Into<String>,
        tags: Vec<Tag>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, tags, serde_json::to_vec(payload)?))
    }

    /// The short identifier describing what happened.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The tags categorising this event.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// The opaque JSON payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Wrapper for a persisted event.
///
/// It contains the global position and the tag-derived id assigned by the event store,
/// along with the event itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEvent {
    position: Position,
    id: String,
    event: InputEvent,
}

impl PersistedEvent {
    /// Creates a new `PersistedEvent` with the given position, id and event.
    pub fn new(position: Position, id: impl Into<String>, event: InputEvent) -> Self {
        Self {
            position,
            id: id.into(),
            event,
        }
    }

    /// The global position assigned by the event store.
    pub fn position(&self) -> Position {
        self.position
    }

    /// The stable identifier derived from the event's tags.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the inner event.
    pub fn into_inner(self) -> InputEvent {
        self.event
    }
}

impl Deref for PersistedEvent {
    type Target = InputEvent;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::let_assert;

    #[test]
    fn it_creates_a_valid_tag() {
        let tag = Tag::new("order_id", "o1").unwrap();
        assert_eq!(tag.key(), "order_id");
        assert_eq!(tag.value(), "o1");
        assert_eq!(tag.to_string(), "order_id=o1");
    }

    #[test]
    fn it_rejects_an_empty_tag_key() {
        let_assert!(Err(ValidationError::EmptyTagKey) = Tag::new("", "o1"));
    }

    #[test]
    fn it_rejects_an_empty_tag_value() {
        let_assert!(Err(ValidationError::EmptyTagValue { key }) = Tag::new("order_id", ""));
        assert_eq!(key, "order_id");
    }

    #[test]
    fn it_builds_tags_with_the_macro() {
        let tags = tags! {"course_id" => "c1", "student_id" => "s1"};
        assert_eq!(tags[0], Tag::new("course_id", "c1").unwrap());
        assert_eq!(tags[1], Tag::new("student_id", "s1").unwrap());
        assert!(tags! {}.is_empty());
    }

    #[test]
    fn it_serializes_a_json_payload() {
        let event = InputEvent::json(
            "OrderPlaced",
            tags! {"order_id" => "o1"},
            &serde_json::json!({"amt": 10}),
        )
        .unwrap();
        assert_eq!(event.event_type(), "OrderPlaced");
        assert_eq!(event.data(), br#"{"amt":10}"#);
    }

    #[test]
    fn it_dereferences_a_persisted_event() {
        let event = InputEvent::new("OrderPlaced", tags! {"order_id" => "o1"}, b"{}".to_vec());
        let persisted = PersistedEvent::new(1, "order_id_01H455VB4PEX5VSKNK084SN02Q", event);
        assert_eq!(persisted.position(), 1);
        assert_eq!(persisted.event_type(), "OrderPlaced");
    }
}
