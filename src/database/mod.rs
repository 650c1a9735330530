pub mod classify;
pub mod manager;
pub mod postgres;
pub mod query_builder;
pub mod store;

pub use classify::{Classification, ErrorClassifier, MysqlCodes, PostgresCodes};
pub use manager::{DatabaseError, DatabaseManager};
pub use postgres::PgStore;
pub use store::{Row, StoreError, TableStore};
