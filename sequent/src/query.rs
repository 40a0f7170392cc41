//! A query represents a filter over the event log.
//!
//! A [`Query`] is a disjunction of [`QueryItem`]s. Each item is a conjunction of a set
//! of allowed event types (empty means any type) and a set of required tags (empty
//! means any tags). An event matches an item iff its type is in the item's type list
//! (or the list is empty) and the item's tags are a subset of the event's tags. An
//! event matches the query iff it matches at least one item. The empty query matches
//! every event.
//!
//! The same matching rules drive both the in-process evaluation used by the projection
//! engine and the SQL predicate compiled by the storage backends, so the two can never
//! disagree.
use serde::{Deserialize, Serialize};

use crate::event::{InputEvent, Tag};

/// A conjunction of allowed event types and required tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryItem {
    types: Vec<String>,
    tags: Vec<Tag>,
}

impl QueryItem {
    /// Creates an item matching every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the item to the given event types.
    pub fn with_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Requires the given tags to be present on matching events.
    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// The allowed event types; empty means any type.
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// The required tags; empty means any tags.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Returns `true` if the given event satisfies this item.
    pub fn matches(&self, event: &InputEvent) -> bool {
        let type_matches =
            self.types.is_empty() || self.types.iter().any(|t| t == event.event_type());
        type_matches && self.tags.iter().all(|tag| event.tags().contains(tag))
    }
}

/// A disjunction of [`QueryItem`]s filtering the event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    items: Vec<QueryItem>,
}

impl Query {
    /// Creates the empty query, which matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a query from the given items.
    pub fn new(items: Vec<QueryItem>) -> Self {
        Self { items }
    }

    /// The items of the disjunction, in source order.
    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }

    /// Returns `true` if this is the empty query.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if the given event matches at least one item, or if the query
    /// is empty.
    pub fn matches(&self, event: &InputEvent) -> bool {
        self.items.is_empty() || self.items.iter().any(|item| item.matches(event))
    }

    /// Returns the union of two queries.
    ///
    /// The empty query already matches every event, so a union with it collapses to
    /// the empty query.
    pub fn union(self, other: Query) -> Query {
        if self.items.is_empty() || other.items.is_empty() {
            return Query::all();
        }
        let mut items = self.items;
        items.extend(other.items);
        Query { items }
    }
}

impl From<QueryItem> for Query {
    fn from(item: QueryItem) -> Self {
        Query::new(vec![item])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;

    fn event(event_type: &str, tags: Vec<Tag>) -> InputEvent {
        InputEvent::new(event_type, tags, b"{}".to_vec())
    }

    #[test]
    fn empty_query_matches_every_event() {
        let query = Query::all();
        assert!(query.matches(&event("OrderPlaced", tags! {"order_id" => "o1"})));
        assert!(query.matches(&event("Deposit", tags! {"account" => "a1"})));
    }

    #[test]
    fn it_matches_by_type() {
        let query: Query = QueryItem::new().with_types(["Deposit"]).into();
        assert!(query.matches(&event("Deposit", tags! {"account" => "a1"})));
        assert!(!query.matches(&event("Withdrawal", tags! {"account" => "a1"})));
    }

    #[test]
    fn it_requires_all_item_tags() {
        let query: Query = QueryItem::new()
            .with_tags(tags! {"course_id" => "c1", "student_id" => "s1"})
            .into();
        assert!(query.matches(&event(
            "Subscribed",
            tags! {"course_id" => "c1", "student_id" => "s1", "term" => "t1"},
        )));
        assert!(!query.matches(&event("Subscribed", tags! {"course_id" => "c1"})));
    }

    #[test]
    fn items_are_disjunctive() {
        let query = Query::new(vec![
            QueryItem::new().with_types(["Deposit"]),
            QueryItem::new().with_tags(tags! {"account" => "a2"}),
        ]);
        assert!(query.matches(&event("Deposit", tags! {"account" => "a1"})));
        assert!(query.matches(&event("Withdrawal", tags! {"account" => "a2"})));
        assert!(!query.matches(&event("Withdrawal", tags! {"account" => "a1"})));
    }

    #[test]
    fn union_concatenates_items() {
        let a: Query = QueryItem::new().with_types(["A"]).into();
        let b: Query = QueryItem::new().with_types(["B"]).into();
        let union = a.union(b);
        assert_eq!(union.items().len(), 2);
        assert!(union.matches(&event("A", tags! {"k" => "v"})));
        assert!(union.matches(&event("B", tags! {"k" => "v"})));
    }

    #[test]
    fn union_with_the_empty_query_matches_everything() {
        let a: Query = QueryItem::new().with_types(["A"]).into();
        let union = a.union(Query::all());
        assert!(union.is_empty());
        assert!(union.matches(&event("C", tags! {"k" => "v"})));
    }
}
