//! Optimistic-concurrency updates.
//!
//! Every versioned row carries a `version INTEGER` column. A mutation reads
//! the row, changes it in memory, and writes it back with
//! `WHERE <key> = $k AND version = $v`, bumping the version in the same
//! statement. Zero affected rows means another writer got there first and
//! the caller receives [`UpdateError::VersionConflict`]; there is no blind
//! overwrite path.

use coursehub_core::types::DbId;
use sqlx::{Encode, PgExecutor, Postgres, QueryBuilder, Type};

/// A row that participates in optimistic concurrency control.
pub trait Versioned {
    /// Table name used in the generated `UPDATE`.
    const TABLE: &'static str;
    /// Primary-key column the update is conditioned on.
    const KEY_COLUMN: &'static str;
    /// Entity name for error messages.
    const ENTITY: &'static str;

    fn key(&self) -> DbId;
    fn version(&self) -> i32;
}

/// Failure of a conditional update.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: DbId,
        expected: i32,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl UpdateError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, UpdateError::VersionConflict { .. })
    }
}

/// Builder for a single version-conditioned `UPDATE` statement.
///
/// ```ignore
/// let new_version = VersionedUpdate::new(&course)
///     .set("name", course.name.clone())
///     .set("price", course.price)
///     .execute(pool)
///     .await?;
/// ```
pub struct VersionedUpdate<'args> {
    builder: QueryBuilder<'args, Postgres>,
    entity: &'static str,
    key_column: &'static str,
    key: DbId,
    version: i32,
}

impl<'args> VersionedUpdate<'args> {
    /// Start an update of `row`, conditioned on the version it was read at.
    pub fn new<T: Versioned>(row: &T) -> Self {
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", T::TABLE));
        builder.push("version = version + 1, updated_at = now()");
        Self {
            builder,
            entity: T::ENTITY,
            key_column: T::KEY_COLUMN,
            key: row.key(),
            version: row.version(),
        }
    }

    /// Assign `value` to `column`. Column names are trusted identifiers.
    pub fn set<V>(mut self, column: &'static str, value: V) -> Self
    where
        V: 'args + Encode<'args, Postgres> + Type<Postgres> + Send,
    {
        self.builder.push(", ").push(column).push(" = ").push_bind(value);
        self
    }

    /// Run the statement and return the new version.
    pub async fn execute<'e, E>(mut self, executor: E) -> Result<i32, UpdateError>
    where
        E: PgExecutor<'e>,
    {
        self.builder
            .push(" WHERE ")
            .push(self.key_column)
            .push(" = ")
            .push_bind(self.key)
            .push(" AND version = ")
            .push_bind(self.version)
            .push(" RETURNING version");

        let new_version: Option<i32> = self
            .builder
            .build_query_scalar()
            .fetch_optional(executor)
            .await?;

        new_version.ok_or(UpdateError::VersionConflict {
            entity: self.entity,
            id: self.key,
            expected: self.version,
        })
    }
}
