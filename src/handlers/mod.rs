// handlers/mod.rs - CRUD handler factory and the HTTP glue around it
pub mod crud;
pub mod routes;

pub use crud::{
    CreatedId, CrudRoutes, IdParams, InsertParams, RequestContext, ResponseMode, UpdateParams,
};
pub use routes::table_router;
