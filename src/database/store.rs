use async_trait::async_trait;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

/// A row or a set of field values, keyed by column name
pub type Row = Map<String, Value>;

/// Failures surfaced by a [`TableStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the storage engine with its own error code
    #[error("database error [{code}]: {message}")]
    Engine { code: String, message: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Update requires at least one field")]
    EmptyUpdate,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn engine(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Engine {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Engine-defined error code (SQLSTATE for PostgreSQL), if any
    pub fn code(&self) -> Option<Cow<'_, str>> {
        match self {
            StoreError::Engine { code, .. } => Some(Cow::Borrowed(code.as_str())),
            StoreError::Sqlx(sqlx::Error::Database(db_err)) => db_err.code(),
            _ => None,
        }
    }
}

/// Database handle contract consumed by the CRUD handlers.
///
/// `id` arrives as a string from the request path and is compared as a value
/// of the table's `id` column type, so integer and UUID keys both work. An id
/// that type cannot represent matches no row.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// All columns of every row, or of the rows whose `id` equals `id`
    async fn select(&self, table: &str, id: Option<&str>) -> Result<Vec<Row>, StoreError>;

    /// Insert one row and return the generated identifiers
    async fn insert(&self, table: &str, row: &Row) -> Result<Vec<Value>, StoreError>;

    /// Set `fields` on the row whose `id` equals `id`; returns affected rows
    async fn update(&self, table: &str, id: &str, fields: &Row) -> Result<u64, StoreError>;

    /// Delete the row whose `id` equals `id`; returns affected rows
    async fn delete(&self, table: &str, id: &str) -> Result<u64, StoreError>;
}

#[async_trait]
impl<T: TableStore + ?Sized> TableStore for Arc<T> {
    async fn select(&self, table: &str, id: Option<&str>) -> Result<Vec<Row>, StoreError> {
        (**self).select(table, id).await
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Vec<Value>, StoreError> {
        (**self).insert(table, row).await
    }

    async fn update(&self, table: &str, id: &str, fields: &Row) -> Result<u64, StoreError> {
        (**self).update(table, id, fields).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<u64, StoreError> {
        (**self).delete(table, id).await
    }
}
