//! # PostgreSQL Sequent Backend Library
mod config;
mod error;
mod event_store;
mod migrator;

pub use crate::config::{AppendIsolation, PgEventStoreConfig};
pub use crate::event_store::{PgEventStore, DEFAULT_SCAN_BATCH_SIZE};
pub use crate::migrator::Migrator;
pub use error::Error;
