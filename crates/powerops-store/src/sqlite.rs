use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::{Error, Event, EventFilter, Relationship, RelationshipFilter, Sequence, Store};

const EVENT_COLUMNS: &str =
  "external_id, event_type, subtype, source, start_time, end_time, metadata, created_time";
const RELATIONSHIP_COLUMNS: &str = "external_id, source_external_id, source_type, target_external_id, target_type, labels, created_time";
const SEQUENCE_COLUMNS: &str = "external_id, name, metadata, columns, rows, created_time";

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and run migrations.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A private in-memory database, migrated and ready to use.
  ///
  /// Each SQLite in-memory connection is its own database, so the pool is
  /// pinned to a single connection that is never recycled.
  pub async fn in_memory() -> Result<Self, Error> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect("sqlite::memory:")
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

fn insert_error(e: sqlx::Error, external_id: &str) -> Error {
  match e {
    sqlx::Error::Database(ref db) if db.is_unique_violation() => {
      Error::AlreadyExists(external_id.to_string())
    }
    other => Error::Database(other),
  }
}

fn not_found(e: sqlx::Error, external_id: &str) -> Error {
  match e {
    sqlx::Error::RowNotFound => Error::NotFound(external_id.to_string()),
    other => Error::Database(other),
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_event(&self, event: &Event) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO events (external_id, event_type, subtype, source, start_time, end_time, metadata, created_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&event.external_id)
    .bind(&event.event_type)
    .bind(&event.subtype)
    .bind(&event.source)
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(&event.metadata)
    .bind(event.created_time)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(e, &event.external_id))?;

    debug!(external_id = %event.external_id, event_type = %event.event_type, "event created");
    Ok(())
  }

  async fn get_event(&self, external_id: &str) -> Result<Event, Error> {
    sqlx::query_as(&format!(
      "SELECT {EVENT_COLUMNS} FROM events WHERE external_id = ?"
    ))
    .bind(external_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| not_found(e, external_id))
  }

  async fn get_events(&self, external_ids: &[String]) -> Result<Vec<Event>, Error> {
    if external_ids.is_empty() {
      return Ok(Vec::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(format!(
      "SELECT {EVENT_COLUMNS} FROM events WHERE external_id IN ("
    ));
    let mut ids = query.separated(", ");
    for id in external_ids {
      ids.push_bind(id);
    }
    ids.push_unseparated(")");

    Ok(query.build_query_as().fetch_all(&self.pool).await?)
  }

  async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
    if let Some(event_type) = &filter.event_type {
      query.push(" WHERE event_type = ").push_bind(event_type);
    }
    query.push(" ORDER BY created_time DESC");

    let events: Vec<Event> = query.build_query_as().fetch_all(&self.pool).await?;

    // Metadata is a JSON blob; match it here rather than in SQL.
    Ok(
      events
        .into_iter()
        .filter(|e| filter.matches(e))
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect(),
    )
  }

  async fn create_relationships(&self, relationships: &[Relationship]) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    for relationship in relationships {
      sqlx::query(
        r#"
            INSERT INTO relationships (external_id, source_external_id, source_type, target_external_id, target_type, labels, created_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
      )
      .bind(&relationship.external_id)
      .bind(&relationship.source_external_id)
      .bind(relationship.source_type)
      .bind(&relationship.target_external_id)
      .bind(relationship.target_type)
      .bind(&relationship.labels)
      .bind(relationship.created_time)
      .execute(&mut *tx)
      .await
      .map_err(|e| insert_error(e, &relationship.external_id))?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn list_relationships(
    &self,
    source_external_id: &str,
    filter: &RelationshipFilter,
  ) -> Result<Vec<Relationship>, Error> {
    let relationships: Vec<Relationship> = sqlx::query_as(&format!(
      "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE source_external_id = ? ORDER BY created_time ASC"
    ))
    .bind(source_external_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(
      relationships
        .into_iter()
        .filter(|r| filter.matches(r))
        .collect(),
    )
  }

  async fn create_sequence(&self, sequence: &Sequence) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO sequences (external_id, name, metadata, columns, rows, created_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&sequence.external_id)
    .bind(&sequence.name)
    .bind(&sequence.metadata)
    .bind(&sequence.columns)
    .bind(&sequence.rows)
    .bind(sequence.created_time)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(e, &sequence.external_id))?;

    Ok(())
  }

  async fn get_sequence(&self, external_id: &str) -> Result<Sequence, Error> {
    sqlx::query_as(&format!(
      "SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE external_id = ?"
    ))
    .bind(external_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| not_found(e, external_id))
  }

  async fn get_sequences(&self, external_ids: &[String]) -> Result<Vec<Sequence>, Error> {
    if external_ids.is_empty() {
      return Ok(Vec::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(format!(
      "SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE external_id IN ("
    ));
    let mut ids = query.separated(", ");
    for id in external_ids {
      ids.push_bind(id);
    }
    ids.push_unseparated(")");

    Ok(query.build_query_as().fetch_all(&self.pool).await?)
  }
}
