//! Connection pooling for the PostgreSQL-backed stores.

use std::env;

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use thiserror::Error;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("failed to create connection pool: {message}")]
    PoolCreation { message: String },
}

/// Build a pool from `DATABASE_URL`, sized by `DATABASE_POOL_SIZE`.
pub fn init_pool() -> Result<DbPool, DatabaseError> {
    let database_url =
        env::var("DATABASE_URL").map_err(|_| DatabaseError::MissingDatabaseUrl)?;
    let pool_size = env::var("DATABASE_POOL_SIZE")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_POOL_SIZE);

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(pool_size)
        .build(manager)
        .map_err(|e| DatabaseError::PoolCreation {
            message: e.to_string(),
        })
}
