use axum::{
    extract::{Path, Query, State},
    http::{Method, Uri},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::database::store::{Row, TableStore};
use crate::handlers::crud::{
    CrudRoutes, IdParams, InsertParams, RequestContext, ResponseMode, UpdateParams,
};
use crate::middleware::response::{ResponseSink, Sent};

#[derive(Debug, Default, Deserialize)]
pub struct CreateQuery {
    /// Answer with the full created row instead of `{"id": ...}`
    pub expand: Option<bool>,
}

/// Mount one table's handlers:
///
/// - `GET    /{prefix}/{table}`     list rows
/// - `POST   /{prefix}/{table}`     create a row (`?expand=true` returns the row)
/// - `GET    /{prefix}/{table}/:id` show a row
/// - `PUT    /{prefix}/{table}/:id` update a row (PATCH behaves the same)
/// - `DELETE /{prefix}/{table}/:id` delete a row
pub fn table_router<S>(prefix: &str, routes: Arc<CrudRoutes<S>>) -> Router
where
    S: TableStore + 'static,
{
    let collection = if prefix.is_empty() {
        format!("/{}", routes.table())
    } else {
        format!("/{}/{}", prefix, routes.table())
    };
    let member = format!("{}/:id", collection);

    Router::new()
        .route(&collection, get(list::<S>).post(create::<S>))
        .route(
            &member,
            get(show::<S>)
                .put(modify::<S>)
                .patch(modify::<S>)
                .delete(destroy::<S>),
        )
        .with_state(routes)
}

async fn list<S: TableStore + 'static>(
    State(routes): State<Arc<CrudRoutes<S>>>,
    method: Method,
    uri: Uri,
) -> Sent {
    let ctx = RequestContext::new(method, uri.path());
    routes.get_many(&ctx, ResponseSink::new()).await
}

async fn show<S: TableStore + 'static>(
    State(routes): State<Arc<CrudRoutes<S>>>,
    method: Method,
    uri: Uri,
    Path(id): Path<String>,
) -> Sent {
    let ctx = RequestContext::new(method, uri.path());
    routes.get_one(&ctx, ResponseSink::new(), IdParams { id }).await
}

async fn create<S: TableStore + 'static>(
    State(routes): State<Arc<CrudRoutes<S>>>,
    method: Method,
    uri: Uri,
    Query(query): Query<CreateQuery>,
    Json(insert_data): Json<Row>,
) -> Sent {
    let ctx = RequestContext::new(method, uri.path());

    let mode = if query.expand.unwrap_or(false) {
        let routes = routes.clone();
        let ctx = ctx.clone();
        ResponseMode::delegate(move |sink, created| async move {
            routes.get_created(&ctx, sink, created).await
        })
    } else {
        ResponseMode::DefaultJson
    };

    routes
        .add(&ctx, ResponseSink::new(), InsertParams { insert_data }, mode)
        .await
}

async fn modify<S: TableStore + 'static>(
    State(routes): State<Arc<CrudRoutes<S>>>,
    method: Method,
    uri: Uri,
    Path(id): Path<String>,
    Json(update_data): Json<Row>,
) -> Sent {
    let ctx = RequestContext::new(method, uri.path());
    routes
        .update(&ctx, ResponseSink::new(), UpdateParams { id, update_data })
        .await
}

async fn destroy<S: TableStore + 'static>(
    State(routes): State<Arc<CrudRoutes<S>>>,
    method: Method,
    uri: Uri,
    Path(id): Path<String>,
) -> Sent {
    let ctx = RequestContext::new(method, uri.path());
    routes.remove(&ctx, ResponseSink::new(), IdParams { id }).await
}
