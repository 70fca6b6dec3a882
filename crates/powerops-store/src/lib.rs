//! PowerOps Store
//!
//! This crate provides the storage trait and implementations for the
//! records that describe SHOP runs. Data is persisted to a database (SQLite).
//!
//! The [`Store`] trait defines operations for:
//! - Creating and querying events (run requests, process markers)
//! - Linking resources with labelled relationships
//! - Storing and reading sequences (objective function tables)

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{
  Event, EventFilter, Relationship, RelationshipFilter, ResourceType, Sequence, SequenceColumn,
  SequenceRow, ValueType,
};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record with this external id already exists.
  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for events, relationships and sequences.
#[async_trait]
pub trait Store: Send + Sync {
  /// Create a new event.
  async fn create_event(&self, event: &Event) -> Result<(), Error>;

  /// Get an event by external id.
  async fn get_event(&self, external_id: &str) -> Result<Event, Error>;

  /// Get the events with the given external ids. Unknown ids are skipped.
  async fn get_events(&self, external_ids: &[String]) -> Result<Vec<Event>, Error>;

  /// List events matching a filter, newest first.
  async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, Error>;

  /// Create relationships atomically.
  async fn create_relationships(&self, relationships: &[Relationship]) -> Result<(), Error>;

  /// List relationships whose source is the given resource.
  async fn list_relationships(
    &self,
    source_external_id: &str,
    filter: &RelationshipFilter,
  ) -> Result<Vec<Relationship>, Error>;

  /// Create a new sequence.
  async fn create_sequence(&self, sequence: &Sequence) -> Result<(), Error>;

  /// Get a sequence by external id.
  async fn get_sequence(&self, external_id: &str) -> Result<Sequence, Error>;

  /// Get the sequences with the given external ids. Unknown ids are skipped.
  async fn get_sequences(&self, external_ids: &[String]) -> Result<Vec<Sequence>, Error>;
}
