pub mod response;

pub use response::{ResponseSink, Sent};
