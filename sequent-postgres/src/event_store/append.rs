use sequent::{generate_tag_based_type_id, InputEvent, ValidationError};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

/// A validated event bound to the row shape of the `event` table. The id is assigned
/// here; the position comes from the table's sequence.
pub struct NewEventRow {
    id: String,
    event_type: String,
    tags: serde_json::Value,
    payload: serde_json::Value,
}

impl TryFrom<&InputEvent> for NewEventRow {
    type Error = ValidationError;

    fn try_from(event: &InputEvent) -> Result<Self, Self::Error> {
        let payload =
            serde_json::from_slice(event.data()).map_err(|err| ValidationError::InvalidJson {
                reason: err.to_string(),
            })?;
        Ok(Self {
            id: generate_tag_based_type_id(event.tags()),
            event_type: event.event_type().to_string(),
            tags: serde_json::to_value(event.tags()).expect("tags serialize to JSON"),
            payload,
        })
    }
}

/// SQL Insert Events Builder
///
/// A builder for constructing the batch insert query for the `event` table.
pub struct InsertEventsBuilder<'a> {
    builder: sqlx::QueryBuilder<'a, Postgres>,
    rows: &'a [NewEventRow],
}

impl<'a> InsertEventsBuilder<'a> {
    /// Creates a new instance of `InsertEventsBuilder`.
    ///
    /// # Arguments
    ///
    /// * `rows` - The event rows to be inserted.
    pub fn new(rows: &'a [NewEventRow]) -> Self {
        Self {
            builder: sqlx::QueryBuilder::new("INSERT INTO event (id,event_type,tags,payload) "),
            rows,
        }
    }

    /// Builds the SQL batch insert query, returning the assigned positions.
    pub fn build(&'a mut self) -> Query<'a, Postgres, PgArguments> {
        if self.rows.is_empty() {
            panic!("Cannot build an insert query with no events");
        }

        self.builder.push_values(self.rows, |mut b, row| {
            b.push_bind(row.id.clone());
            b.push_bind(row.event_type.clone());
            b.push_bind(row.tags.clone());
            b.push_bind(row.payload.clone());
        });
        self.builder.push(" RETURNING position");

        self.builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequent::tags;
    use sqlx::Execute;

    fn row(event_type: &str) -> NewEventRow {
        NewEventRow::try_from(&InputEvent::new(
            event_type,
            tags! {"order_id" => "o1"},
            br#"{"amt":10}"#.to_vec(),
        ))
        .unwrap()
    }

    #[test]
    fn it_builds_a_batch_insert() {
        let rows = [row("OrderPlaced"), row("OrderShipped")];
        let mut insert_query = InsertEventsBuilder::new(&rows);
        assert_eq!(
            insert_query.build().sql(),
            "INSERT INTO event (id,event_type,tags,payload) VALUES ($1, $2, $3, $4), ($5, $6, $7, $8) RETURNING position"
        );
    }

    #[test]
    fn a_row_derives_its_id_from_the_tags() {
        let row = row("OrderPlaced");
        assert!(row.id.starts_with("order_id_"));
        assert_eq!(row.tags, serde_json::json!([{"key": "order_id", "value": "o1"}]));
        assert_eq!(row.payload, serde_json::json!({"amt": 10}));
    }

    #[test]
    fn a_row_rejects_a_non_json_payload() {
        let event = InputEvent::new("OrderPlaced", tags! {"order_id" => "o1"}, b"oops".to_vec());
        assert!(NewEventRow::try_from(&event).is_err());
    }
}
