//! Database initialization utilities for the `PgEventStore`.
//!
//! This module provides helpers to initialize the PostgreSQL schema for a fresh
//! deployment. The migrator is typically executed during application startup or via
//! dedicated administrative tooling; every statement is idempotent, so re-running it
//! against an initialized database is safe.
use crate::event_store::PgEventStore;
use crate::Error;

/// Helper for initializing the `PgEventStore` database schema.
pub struct Migrator {
    event_store: PgEventStore,
}

impl Migrator {
    pub fn new(event_store: PgEventStore) -> Self {
        Self { event_store }
    }

    /// Init `PgEventStore` database
    pub async fn init_event_store(&self) -> Result<(), Error> {
        sqlx::query(include_str!("event_store/sql/seq_event_position.sql"))
            .execute(&self.event_store.pool)
            .await?;
        sqlx::query(include_str!("event_store/sql/table_event.sql"))
            .execute(&self.event_store.pool)
            .await?;
        sqlx::query(include_str!("event_store/sql/idx_event_type.sql"))
            .execute(&self.event_store.pool)
            .await?;
        sqlx::query(include_str!("event_store/sql/idx_event_tags.sql"))
            .execute(&self.event_store.pool)
            .await?;
        Ok(())
    }
}
