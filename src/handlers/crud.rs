//! Generic CRUD handlers for a single table.
//!
//! [`CrudRoutes`] binds a table name and a [`TableStore`] once and exposes the
//! five operations every resource needs. Each operation takes a
//! [`ResponseSink`] by value and returns the [`Sent`] it produced, so a request
//! is answered exactly once whatever path the operation takes:
//!
//! | Operation  | Success            | Nothing matched | Bad payload | Other failure    |
//! |------------|--------------------|-----------------|-------------|------------------|
//! | `get_one`  | 200 + row          | 404             | n/a         | error translator |
//! | `get_many` | 200 + rows         | n/a             | n/a         | error translator |
//! | `add`      | 201 + `{id}`       | 400             | 400         | error translator |
//! | `update`   | 200                | 404             | 400         | error translator |
//! | `remove`   | 200                | 404             | n/a         | error translator |
//!
//! "Bad payload" is decided by the [`ErrorClassifier`] configured for the
//! store's engine.

use axum::http::{Method, StatusCode};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::classify::{Classification, ErrorClassifier, PostgresCodes};
use crate::database::store::{Row, StoreError, TableStore};
use crate::error::{self, ErrorTranslator};
use crate::middleware::response::{ResponseSink, Sent};

/// Per-request data recorded on each operation's tracing span
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdParams {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct InsertParams {
    pub insert_data: Row,
}

#[derive(Debug, Clone)]
pub struct UpdateParams {
    pub id: String,
    pub update_data: Row,
}

/// Identifier of a freshly inserted row, serialized as `{"id": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedId {
    pub id: Value,
}

impl CreatedId {
    /// The id in the text form the stores match against
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

pub type SuccessCallback = Box<dyn FnOnce(ResponseSink, CreatedId) -> BoxFuture<'static, Sent> + Send>;

/// How `add` answers once the row exists
#[derive(Default)]
pub enum ResponseMode {
    /// 201 Created with `{"id": ...}`
    #[default]
    DefaultJson,
    /// Hand the sink and the new id to the caller, who answers instead
    Delegate(SuccessCallback),
}

impl ResponseMode {
    pub fn delegate<F, Fut>(callback: F) -> Self
    where
        F: FnOnce(ResponseSink, CreatedId) -> Fut + Send + 'static,
        Fut: Future<Output = Sent> + Send + 'static,
    {
        ResponseMode::Delegate(Box::new(move |sink, created| Box::pin(callback(sink, created))))
    }
}

impl std::fmt::Debug for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseMode::DefaultJson => f.write_str("DefaultJson"),
            ResponseMode::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

/// The five CRUD handlers of one table
pub struct CrudRoutes<S> {
    table: String,
    store: S,
    classifier: Arc<dyn ErrorClassifier>,
    translator: ErrorTranslator,
}

impl<S: TableStore> CrudRoutes<S> {
    pub fn new(table: impl Into<String>, store: S) -> Self {
        Self {
            table: table.into(),
            store,
            classifier: Arc::new(PostgresCodes),
            translator: error::send,
        }
    }

    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_error_translator(mut self, translator: ErrorTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch the row with the given id
    #[tracing::instrument(name = "crud.get_one", skip_all, fields(table = %self.table, request_id = %ctx.request_id, id = %params.id))]
    pub async fn get_one(&self, ctx: &RequestContext, sink: ResponseSink, params: IdParams) -> Sent {
        match self.store.select(&self.table, Some(&params.id)).await {
            // More than one match means a broken schema; the first row wins
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => sink.json(StatusCode::OK, &row),
                None => {
                    debug!("No row matched");
                    sink.status(StatusCode::NOT_FOUND)
                }
            },
            Err(err) => (self.translator)(sink, err),
        }
    }

    /// Fetch every row of the table
    #[tracing::instrument(name = "crud.get_many", skip_all, fields(table = %self.table, request_id = %ctx.request_id))]
    pub async fn get_many(&self, ctx: &RequestContext, sink: ResponseSink) -> Sent {
        match self.store.select(&self.table, None).await {
            Ok(rows) => {
                debug!(count = rows.len(), "Fetched rows");
                sink.json(StatusCode::OK, &rows)
            }
            Err(err) => (self.translator)(sink, err),
        }
    }

    /// Insert one row and report its id, or let `mode` answer instead
    #[tracing::instrument(name = "crud.add", skip_all, fields(table = %self.table, request_id = %ctx.request_id))]
    pub async fn add(
        &self,
        ctx: &RequestContext,
        sink: ResponseSink,
        params: InsertParams,
        mode: ResponseMode,
    ) -> Sent {
        let ids = match self.store.insert(&self.table, &params.insert_data).await {
            Ok(ids) => ids,
            Err(err) => return self.write_failed(sink, err),
        };

        let Some(id) = ids.into_iter().next() else {
            warn!("Insert returned no identifier");
            return sink.status(StatusCode::BAD_REQUEST);
        };

        debug!(id = %id, "Inserted row");
        let created = CreatedId { id };
        match mode {
            ResponseMode::DefaultJson => sink.json(StatusCode::CREATED, &created),
            ResponseMode::Delegate(callback) => callback(sink, created).await,
        }
    }

    /// Set fields on the row with the given id.
    ///
    /// Zero affected rows answers 404, which also covers an existing row the
    /// engine reports as unchanged.
    #[tracing::instrument(name = "crud.update", skip_all, fields(table = %self.table, request_id = %ctx.request_id, id = %params.id))]
    pub async fn update(&self, ctx: &RequestContext, sink: ResponseSink, params: UpdateParams) -> Sent {
        match self.store.update(&self.table, &params.id, &params.update_data).await {
            Ok(0) => sink.status(StatusCode::NOT_FOUND),
            Ok(affected) => {
                debug!(affected, "Updated rows");
                sink.status(StatusCode::OK)
            }
            Err(err) => self.write_failed(sink, err),
        }
    }

    /// Delete the row with the given id
    #[tracing::instrument(name = "crud.remove", skip_all, fields(table = %self.table, request_id = %ctx.request_id, id = %params.id))]
    pub async fn remove(&self, ctx: &RequestContext, sink: ResponseSink, params: IdParams) -> Sent {
        match self.store.delete(&self.table, &params.id).await {
            Ok(0) => sink.status(StatusCode::NOT_FOUND),
            Ok(affected) => {
                debug!(affected, "Deleted rows");
                sink.status(StatusCode::OK)
            }
            Err(err) => (self.translator)(sink, err),
        }
    }

    /// Answer 201 with the full row behind a freshly created id.
    /// Meant to be called from a [`ResponseMode::Delegate`] callback.
    #[tracing::instrument(name = "crud.get_created", skip_all, fields(table = %self.table, request_id = %ctx.request_id, id = %created.id))]
    pub async fn get_created(&self, ctx: &RequestContext, sink: ResponseSink, created: CreatedId) -> Sent {
        match self.store.select(&self.table, Some(&created.id_string())).await {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => sink.json(StatusCode::CREATED, &row),
                None => sink.status(StatusCode::NOT_FOUND),
            },
            Err(err) => (self.translator)(sink, err),
        }
    }

    fn write_failed(&self, sink: ResponseSink, err: StoreError) -> Sent {
        match self.classifier.classify(&err) {
            Classification::BadRequest => {
                warn!(code = ?err.code(), "Rejected payload: {}", err);
                sink.status(StatusCode::BAD_REQUEST)
            }
            Classification::Unclassified => (self.translator)(sink, err),
        }
    }
}
