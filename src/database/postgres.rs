use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row as _};
use tracing::debug;

use crate::database::query_builder::{bind_param_query, SqlStatement, TableQuery};
use crate::database::store::{Row, StoreError, TableStore};

/// [`TableStore`] backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_rows(&self, stmt: SqlStatement) -> Result<Vec<Row>, StoreError> {
        let mut q = sqlx::query(&stmt.query);
        for p in stmt.params.iter() {
            q = bind_param_query(q, p);
        }

        let rows = q.fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Value::Object(map) = row.try_get::<Value, _>("row")? {
                records.push(map);
            }
        }
        Ok(records)
    }

    async fn execute(&self, stmt: SqlStatement) -> Result<u64, StoreError> {
        let mut q = sqlx::query(&stmt.query);
        for p in stmt.params.iter() {
            q = bind_param_query(q, p);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Whether `id` converts to the `id` column's type
    async fn id_parses(&self, query: &TableQuery, id: &str) -> Result<bool, StoreError> {
        match self.execute(query.parse_id(id)).await {
            Ok(_) => Ok(true),
            Err(err) if is_unparseable_id(&err) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// SQLSTATE codes raised when text cannot become a value of the id type:
/// invalid_text_representation and numeric_value_out_of_range
const UNPARSEABLE_ID: &[&str] = &["22P02", "22003"];

fn is_unparseable_id(err: &StoreError) -> bool {
    err.code().map_or(false, |code| UNPARSEABLE_ID.contains(&&*code))
}

/// An id the column cannot represent matches no row
fn unmatched_on_bad_id<T>(result: Result<T, StoreError>, unmatched: T) -> Result<T, StoreError> {
    match result {
        Err(err) if is_unparseable_id(&err) => {
            debug!("Id does not parse as the id column type: {}", err);
            Ok(unmatched)
        }
        other => other,
    }
}

#[async_trait]
impl TableStore for PgStore {
    async fn select(&self, table: &str, id: Option<&str>) -> Result<Vec<Row>, StoreError> {
        let query = TableQuery::new(table)?;
        match id {
            Some(id) => unmatched_on_bad_id(self.fetch_rows(query.select_by_id(id)).await, Vec::new()),
            None => self.fetch_rows(query.select_all()).await,
        }
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Vec<Value>, StoreError> {
        let stmt = TableQuery::new(table)?.insert(row)?;

        let mut q = sqlx::query(&stmt.query);
        for p in stmt.params.iter() {
            q = bind_param_query(q, p);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| r.try_get::<Value, _>("id").map_err(StoreError::from))
            .collect()
    }

    async fn update(&self, table: &str, id: &str, fields: &Row) -> Result<u64, StoreError> {
        let query = TableQuery::new(table)?;
        match self.execute(query.update(id, fields)?).await {
            // The payload can fail to parse too; only a bad id means no match
            Err(err) if is_unparseable_id(&err) => {
                if self.id_parses(&query, id).await? {
                    Err(err)
                } else {
                    Ok(0)
                }
            }
            other => other,
        }
    }

    async fn delete(&self, table: &str, id: &str) -> Result<u64, StoreError> {
        let query = TableQuery::new(table)?;
        unmatched_on_bad_id(self.execute(query.delete(id)).await, 0)
    }
}
