use sequent::{Position, Query};
use std::fmt::Write;

/// SQL Criteria Builder
///
/// A builder for constructing the SQL predicate of a query, optionally bounded by a
/// position: `from` is the inclusive lower bound of a scan, `after` the exclusive
/// bound of an append condition.
pub struct CriteriaBuilder<'a> {
    query: &'a Query,
    from: Option<Position>,
    after: Option<Position>,
    builder: String,
}

impl<'a> CriteriaBuilder<'a> {
    /// Creates a new instance of `CriteriaBuilder`.
    ///
    /// # Arguments
    ///
    /// * `query` - The query specifying the filtering conditions.
    pub fn new(query: &'a Query) -> Self {
        Self {
            query,
            from: None,
            after: None,
            builder: String::with_capacity(512),
        }
    }

    /// Bounds the predicate to positions greater than or equal to `from`.
    pub fn from(mut self, from: Option<Position>) -> Self {
        self.from = from;
        self
    }

    /// Bounds the predicate to positions strictly greater than `after`.
    pub fn after(mut self, after: Option<Position>) -> Self {
        self.after = after;
        self
    }

    /// Builds the SQL criteria string.
    pub fn build(mut self) -> String {
        let bound = match (self.from, self.after) {
            (Some(from), _) => Some(format!("position >= {from}")),
            (None, Some(after)) => Some(format!("position > {after}")),
            (None, None) => None,
        };

        // The empty query matches every event.
        if self.query.items().is_empty() {
            return bound.unwrap_or_else(|| "TRUE".to_string());
        }

        if let Some(bound) = &bound {
            write!(self.builder, "{bound} AND (").unwrap();
        }
        let mut items = self.query.items().iter().peekable();
        while let Some(item) = items.next() {
            self.builder.push('(');
            let mut empty_item = true;
            if !item.types().is_empty() {
                let types = item
                    .types()
                    .iter()
                    .map(|event_type| format!("'{}'", escape_literal(event_type)))
                    .collect::<Vec<_>>()
                    .join(",");
                write!(self.builder, "event_type IN ({types})").unwrap();
                empty_item = false;
            }
            if !item.tags().is_empty() {
                if !empty_item {
                    self.builder.push_str(" AND ");
                }
                let tags = serde_json::to_string(item.tags()).expect("tags serialize to JSON");
                write!(self.builder, "tags @> '{}'", escape_literal(&tags)).unwrap();
                empty_item = false;
            }
            if empty_item {
                self.builder.push_str("TRUE");
            }
            self.builder.push(')');
            if items.peek().is_some() {
                self.builder.push_str(" OR ");
            }
        }
        if bound.is_some() {
            self.builder.push(')');
        }

        self.builder
    }
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequent::{tags, QueryItem};

    #[test]
    fn the_empty_query_compiles_to_true() {
        assert_eq!(CriteriaBuilder::new(&Query::all()).build(), "TRUE");
    }

    #[test]
    fn the_empty_query_with_a_bound_compiles_to_the_bound() {
        assert_eq!(
            CriteriaBuilder::new(&Query::all()).from(Some(5)).build(),
            "position >= 5"
        );
        assert_eq!(
            CriteriaBuilder::new(&Query::all()).after(Some(5)).build(),
            "position > 5"
        );
    }

    #[test]
    fn it_builds_a_type_criteria() {
        let query: Query = QueryItem::new().with_types(["OrderPlaced"]).into();
        assert_eq!(
            CriteriaBuilder::new(&query).build(),
            "(event_type IN ('OrderPlaced'))"
        );
    }

    #[test]
    fn it_builds_a_tag_criteria() {
        let query: Query = QueryItem::new()
            .with_tags(tags! {"order_id" => "o1"})
            .into();
        assert_eq!(
            CriteriaBuilder::new(&query).build(),
            r#"(tags @> '[{"key":"order_id","value":"o1"}]')"#
        );
    }

    #[test]
    fn types_and_tags_are_conjunctive_within_an_item() {
        let query: Query = QueryItem::new()
            .with_types(["Deposit", "Withdrawal"])
            .with_tags(tags! {"account" => "a1"})
            .into();
        assert_eq!(
            CriteriaBuilder::new(&query).build(),
            r#"(event_type IN ('Deposit','Withdrawal') AND tags @> '[{"key":"account","value":"a1"}]')"#
        );
    }

    #[test]
    fn items_are_disjunctive_and_preserve_source_order() {
        let query = Query::new(vec![
            QueryItem::new().with_types(["B"]),
            QueryItem::new().with_types(["A"]),
        ]);
        assert_eq!(
            CriteriaBuilder::new(&query).build(),
            "(event_type IN ('B')) OR (event_type IN ('A'))"
        );
    }

    #[test]
    fn a_bound_wraps_the_whole_disjunction() {
        let query = Query::new(vec![
            QueryItem::new().with_types(["A"]),
            QueryItem::new().with_types(["B"]),
        ]);
        assert_eq!(
            CriteriaBuilder::new(&query).from(Some(10)).build(),
            "position >= 10 AND ((event_type IN ('A')) OR (event_type IN ('B')))"
        );
    }

    #[test]
    fn it_escapes_single_quotes() {
        let query: Query = QueryItem::new().with_types(["O'Brien"]).into();
        assert_eq!(
            CriteriaBuilder::new(&query).build(),
            "(event_type IN ('O''Brien'))"
        );
    }
}
