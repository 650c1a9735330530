use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::database::store::{Row, StoreError, TableStore};
use crate::middleware::response::Sent;

/// Column definition for [`MemoryStore`] tables
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text { max_len: Option<usize> },
    Integer,
}

impl ColumnSpec {
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Text { max_len: None },
            nullable: true,
        }
    }

    pub fn integer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Integer,
            nullable: true,
        }
    }

    pub fn max_len(mut self, len: usize) -> Self {
        self.kind = ColumnKind::Text { max_len: Some(len) };
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Check a value the way PostgreSQL would on assignment
    fn check(&self, value: &Value) -> Result<(), StoreError> {
        match (value, self.kind) {
            (Value::Null, _) if !self.nullable => Err(StoreError::engine(
                "23502",
                format!("null value in column \"{}\" violates not-null constraint", self.name),
            )),
            (Value::Null, _) => Ok(()),
            (Value::String(s), ColumnKind::Text { max_len: Some(max) }) if s.chars().count() > max => {
                Err(StoreError::engine(
                    "22001",
                    format!("value too long for type character varying({})", max),
                ))
            }
            (Value::String(_), ColumnKind::Text { .. }) => Ok(()),
            (Value::Number(n), ColumnKind::Integer) if n.as_i64().is_some() => Ok(()),
            (Value::Number(_), ColumnKind::Integer) => Err(StoreError::engine(
                "22003",
                format!("value out of range for column \"{}\"", self.name),
            )),
            (other, _) => Err(StoreError::engine(
                "22P02",
                format!("invalid input syntax for column \"{}\": {}", self.name, other),
            )),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
    last_id: i64,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Result<&ColumnSpec, StoreError> {
        self.columns.iter().find(|c| c.name == name).ok_or_else(|| {
            StoreError::engine("42703", format!("column \"{}\" does not exist", name))
        })
    }

    fn check_fields(&self, fields: &Row) -> Result<(), StoreError> {
        for (name, value) in fields {
            self.column(name)?.check(value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    fail_next: Option<(String, String)>,
    suppress_returning: bool,
}

impl MemoryState {
    fn take_failure(&mut self) -> Result<(), StoreError> {
        match self.fail_next.take() {
            Some((code, message)) => Err(StoreError::engine(code, message)),
            None => Ok(()),
        }
    }

    fn table(&mut self, name: &str) -> Result<&mut MemoryTable, StoreError> {
        self.tables.get_mut(name).ok_or_else(|| {
            StoreError::engine("42P01", format!("relation \"{}\" does not exist", name))
        })
    }
}

/// In-memory [`TableStore`] with serial integer ids that reports
/// constraint problems with PostgreSQL SQLSTATE codes
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn id_matches(row: &Row, id: &str) -> bool {
    match row.get("id") {
        Some(Value::String(s)) => s == id,
        Some(other) => other.to_string() == id,
        None => false,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnSpec>) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert(
            name.to_string(),
            MemoryTable {
                columns,
                ..Default::default()
            },
        );
    }

    /// Insert a row directly, bypassing column checks
    pub fn seed(&self, table: &str, row: Row) {
        self.seed_row(table, None, row);
    }

    /// Insert a row under an explicit id, even one already taken
    pub fn seed_with_id(&self, table: &str, id: impl Into<Value>, row: Row) {
        self.seed_row(table, Some(id.into()), row);
    }

    fn seed_row(&self, table: &str, id: Option<Value>, mut row: Row) {
        let mut state = self.state.lock().unwrap();
        let table = state.tables.get_mut(table).expect("seed into unknown table");
        let id = id.unwrap_or_else(|| {
            table.last_id += 1;
            Value::from(table.last_id)
        });
        row.insert("id".to_string(), id);
        for column in &table.columns {
            row.entry(column.name.clone()).or_insert(Value::Null);
        }
        table.rows.push(row);
    }

    pub fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Make the next call fail with the given engine error
    pub fn fail_next(&self, code: &str, message: &str) {
        self.state.lock().unwrap().fail_next = Some((code.to_string(), message.to_string()));
    }

    /// Make inserts succeed without returning ids, like a trigger that
    /// swallows the row
    pub fn suppress_returning(&self, suppress: bool) {
        self.state.lock().unwrap().suppress_returning = suppress;
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select(&self, table: &str, id: Option<&str>) -> Result<Vec<Row>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let table = state.table(table)?;
        Ok(table
            .rows
            .iter()
            .filter(|row| id.map_or(true, |id| id_matches(row, id)))
            .cloned()
            .collect())
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Vec<Value>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let suppress_returning = state.suppress_returning;
        let table = state.table(table)?;

        table.check_fields(row)?;
        if let Some(missing) = table
            .columns
            .iter()
            .find(|c| !c.nullable && !row.contains_key(&c.name))
        {
            return Err(StoreError::engine(
                "23502",
                format!("null value in column \"{}\" violates not-null constraint", missing.name),
            ));
        }

        if suppress_returning {
            return Ok(vec![]);
        }

        table.last_id += 1;
        let id = Value::from(table.last_id);
        let mut stored = row.clone();
        stored.insert("id".to_string(), id.clone());
        for column in &table.columns {
            stored.entry(column.name.clone()).or_insert(Value::Null);
        }
        table.rows.push(stored);
        Ok(vec![id])
    }

    async fn update(&self, table: &str, id: &str, fields: &Row) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let table = state.table(table)?;

        if fields.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }
        table.check_fields(fields)?;

        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|row| id_matches(row, id)) {
            for (name, value) in fields {
                row.insert(name.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let table = state.table(table)?;

        let before = table.rows.len();
        table.rows.retain(|row| !id_matches(row, id));
        Ok((before - table.rows.len()) as u64)
    }
}

/// Read a response body as JSON
pub async fn body_json(sent: Sent) -> Value {
    let bytes = axum::body::to_bytes(sent.into_inner().into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

pub async fn is_empty_body(sent: Sent) -> bool {
    let bytes = axum::body::to_bytes(sent.into_inner().into_body(), usize::MAX)
        .await
        .expect("read body");
    bytes.is_empty()
}
