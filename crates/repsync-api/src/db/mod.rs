//! Database plumbing: Diesel schema and connection pooling.

pub mod schema;
pub mod session;

pub use session::{init_pool, DatabaseError, DbPool};
