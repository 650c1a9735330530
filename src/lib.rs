pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;

#[cfg(test)]
pub mod testing;
