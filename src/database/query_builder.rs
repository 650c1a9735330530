use serde_json::Value;
use sqlx::postgres::PgArguments;

use crate::database::store::{Row, StoreError};

/// Primary key column every CRUD table is expected to carry
pub const ID_COLUMN: &str = "id";

/// Longest identifier PostgreSQL keeps without truncation
const MAX_IDENTIFIER_LEN: usize = 63;

/// SQL text plus positional parameters ($1, $2, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub query: String,
    pub params: Vec<Value>,
}

/// Builds the CRUD statements for a single table.
///
/// Values never reach the SQL text: payloads travel as one JSONB parameter
/// and are converted to column types by `jsonb_populate_record`, so the
/// engine reports type and length problems with its usual SQLSTATE codes.
///
/// Ids arrive as text and go through the same conversion, so they are
/// compared as values of the `id` column's type and the primary key index
/// still applies.
#[derive(Debug, Clone)]
pub struct TableQuery {
    table: String,
}

impl TableQuery {
    pub fn new(table_name: impl Into<String>) -> Result<Self, StoreError> {
        let table = table_name.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn select_all(&self) -> SqlStatement {
        SqlStatement {
            query: format!(
                "SELECT row_to_json(r) AS row FROM (SELECT * FROM {}) r",
                quote_identifier(&self.table)
            ),
            params: vec![],
        }
    }

    pub fn select_by_id(&self, id: &str) -> SqlStatement {
        SqlStatement {
            query: format!(
                "SELECT row_to_json(r) AS row FROM (SELECT * FROM {} WHERE {} = {}) r",
                quote_identifier(&self.table),
                quote_identifier(ID_COLUMN),
                self.typed_id("$1")
            ),
            params: vec![Value::String(id.to_string())],
        }
    }

    pub fn insert(&self, row: &Row) -> Result<SqlStatement, StoreError> {
        let table = quote_identifier(&self.table);
        let returning = format!("RETURNING to_jsonb({}) AS id", quote_identifier(ID_COLUMN));

        if row.is_empty() {
            return Ok(SqlStatement {
                query: format!("INSERT INTO {} DEFAULT VALUES {}", table, returning),
                params: vec![],
            });
        }

        let columns = quoted_columns(row)?.join(", ");
        Ok(SqlStatement {
            query: format!(
                "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) {returning}"
            ),
            params: vec![Value::Object(row.clone())],
        })
    }

    pub fn update(&self, id: &str, fields: &Row) -> Result<SqlStatement, StoreError> {
        if fields.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let table = quote_identifier(&self.table);
        let assignments = quoted_columns(fields)?
            .iter()
            .map(|c| format!("{c} = p.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(SqlStatement {
            query: format!(
                "UPDATE {table} SET {assignments} FROM jsonb_populate_record(NULL::{table}, $1) AS p WHERE {table}.{} = {}",
                quote_identifier(ID_COLUMN),
                self.typed_id("$2")
            ),
            params: vec![Value::Object(fields.clone()), Value::String(id.to_string())],
        })
    }

    pub fn delete(&self, id: &str) -> SqlStatement {
        SqlStatement {
            query: format!(
                "DELETE FROM {} WHERE {} = {}",
                quote_identifier(&self.table),
                quote_identifier(ID_COLUMN),
                self.typed_id("$1")
            ),
            params: vec![Value::String(id.to_string())],
        }
    }

    /// Converts `id` to the `id` column's type and nothing else; fails the
    /// same way the id lookups above do when the id does not parse
    pub fn parse_id(&self, id: &str) -> SqlStatement {
        SqlStatement {
            query: format!("SELECT {}", self.typed_id("$1")),
            params: vec![Value::String(id.to_string())],
        }
    }

    /// Scalar subquery yielding the text parameter `param` as a value of the
    /// `id` column's type
    fn typed_id(&self, param: &str) -> String {
        let id = quote_identifier(ID_COLUMN);
        format!(
            "(SELECT {id} FROM jsonb_populate_record(NULL::{}, jsonb_build_object('{ID_COLUMN}', {param}::text)))",
            quote_identifier(&self.table)
        )
    }
}

fn quoted_columns(row: &Row) -> Result<Vec<String>, StoreError> {
    row.keys()
        .map(|column| {
            validate_identifier(column)?;
            Ok(quote_identifier(column))
        })
        .collect()
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*` up to 63 bytes
pub fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote SQL identifier to prevent injection
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        // Ids travel as text
        Value::String(s) => q.bind(s.as_str()),
        // Payloads travel as JSONB
        other => q.bind(other.clone()),
    }
}
