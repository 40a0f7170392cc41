//! Structural checks on events and queries before any I/O.
//!
//! The validator is pure: repeated calls on the same input yield the same result with
//! no side effect. Storage backends run these checks at the append and read
//! boundaries; callers can run them earlier to fail fast.
use thiserror::Error;

use crate::event::InputEvent;
use crate::query::Query;

/// Represents all the ways an event or a query can be structurally invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The event type is empty.
    #[error("event type must not be empty")]
    EmptyEventType,
    /// The event carries no tags.
    #[error("event must carry at least one tag")]
    NoTags,
    /// A tag key is empty.
    #[error("tag key must not be empty")]
    EmptyTagKey,
    /// A tag value is empty.
    #[error("tag value must not be empty (key: {key})")]
    EmptyTagValue { key: String },
    /// The event payload is not valid JSON.
    #[error("event data is not valid JSON: {reason}")]
    InvalidJson { reason: String },
    /// A query item's type list contains an empty string.
    #[error("query item contains an empty event type")]
    EmptyQueryType,
    /// Two projectors in one batch share an id.
    #[error("duplicate projector id: {id}")]
    DuplicateProjectorId { id: String },
}

impl ValidationError {
    /// The offending field, for structured reporting.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyEventType => "type",
            ValidationError::NoTags
            | ValidationError::EmptyTagKey
            | ValidationError::EmptyTagValue { .. } => "tags",
            ValidationError::InvalidJson { .. } => "data",
            ValidationError::EmptyQueryType => "query.items.types",
            ValidationError::DuplicateProjectorId { .. } => "projectors.id",
        }
    }
}

fn validate_tag(key: &str, value: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyTagKey);
    }
    if value.is_empty() {
        return Err(ValidationError::EmptyTagValue {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Checks that an event is structurally sound: non-empty type, at least one tag,
/// non-empty tag keys and values, and a valid JSON payload.
pub fn validate_event(event: &InputEvent) -> Result<(), ValidationError> {
    if event.event_type().is_empty() {
        return Err(ValidationError::EmptyEventType);
    }
    if event.tags().is_empty() {
        return Err(ValidationError::NoTags);
    }
    for tag in event.tags() {
        validate_tag(tag.key(), tag.value())?;
    }
    if let Err(err) = serde_json::from_slice::<serde::de::IgnoredAny>(event.data()) {
        return Err(ValidationError::InvalidJson {
            reason: err.to_string(),
        });
    }
    Ok(())
}

/// Checks that a query is structurally sound. The empty query is valid.
pub fn validate_query(query: &Query) -> Result<(), ValidationError> {
    for item in query.items() {
        for event_type in item.types() {
            if event_type.is_empty() {
                return Err(ValidationError::EmptyQueryType);
            }
        }
        for tag in item.tags() {
            validate_tag(tag.key(), tag.value())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryItem;
    use crate::{tags, Tag};
    use assert2::let_assert;

    fn valid_event() -> InputEvent {
        InputEvent::new(
            "OrderPlaced",
            tags! {"order_id" => "o1"},
            br#"{"amt":10}"#.to_vec(),
        )
    }

    #[test]
    fn it_accepts_a_valid_event() {
        assert_eq!(validate_event(&valid_event()), Ok(()));
    }

    #[test]
    fn it_rejects_an_empty_event_type() {
        let event = InputEvent::new("", tags! {"order_id" => "o1"}, b"{}".to_vec());
        let_assert!(Err(ValidationError::EmptyEventType) = validate_event(&event));
    }

    #[test]
    fn it_rejects_an_event_without_tags() {
        let event = InputEvent::new("OrderPlaced", tags! {}, b"{}".to_vec());
        let err = validate_event(&event).unwrap_err();
        assert_eq!(err, ValidationError::NoTags);
        assert_eq!(err.field(), "tags");
    }

    #[test]
    fn it_rejects_an_empty_tag_key_or_value() {
        let event = InputEvent::new(
            "OrderPlaced",
            vec![Tag::unchecked("", "o1")],
            b"{}".to_vec(),
        );
        let_assert!(Err(ValidationError::EmptyTagKey) = validate_event(&event));

        let event = InputEvent::new(
            "OrderPlaced",
            vec![Tag::unchecked("order_id", "")],
            b"{}".to_vec(),
        );
        let_assert!(Err(ValidationError::EmptyTagValue { key }) = validate_event(&event));
        assert_eq!(key, "order_id");
    }

    #[test]
    fn it_rejects_a_non_json_payload() {
        let event = InputEvent::new("OrderPlaced", tags! {"order_id" => "o1"}, b"not json".to_vec());
        let err = validate_event(&event).unwrap_err();
        assert_eq!(err.field(), "data");
    }

    #[test]
    fn the_empty_query_is_valid() {
        assert_eq!(validate_query(&Query::all()), Ok(()));
    }

    #[test]
    fn it_rejects_a_query_with_an_empty_type() {
        let query: Query = QueryItem::new().with_types(["OrderPlaced", ""]).into();
        let_assert!(Err(ValidationError::EmptyQueryType) = validate_query(&query));
    }

    #[test]
    fn it_rejects_a_query_with_an_invalid_tag() {
        let query: Query = QueryItem::new()
            .with_tags(vec![Tag::unchecked("order_id", "")])
            .into();
        let_assert!(Err(ValidationError::EmptyTagValue { .. }) = validate_query(&query));
    }

    #[test]
    fn validation_is_idempotent() {
        let event = valid_event();
        let first = validate_event(&event);
        let second = validate_event(&event);
        assert_eq!(first, second);
    }
}
