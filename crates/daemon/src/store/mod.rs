// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable store: an embedded SQLite database with a single writer
//! connection pool (serialized transactions) and a separate read pool for
//! concurrent reads, matching the "single writer" concurrency model.

mod approvals;
mod events;
mod jobs;
mod push_devices;
mod threads;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::{BridgeError, ErrorCode};

pub use approvals::ApprovalRow;
pub use events::EventRow;
pub use jobs::JobRow;
pub use push_devices::PushDeviceRow;
pub use threads::ThreadRow;

/// The embedded database, split into a single-writer pool (matches the
/// "store is a single writer" requirement) and a multi-reader pool for
/// concurrent list/get queries that don't need commit ordering.
#[derive(Debug, Clone)]
pub struct Store {
    writer: SqlitePool,
    reader: SqlitePool,
}

impl Store {
    pub async fn open(db_path: &Path) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let writer = SqlitePoolOptions::new().max_connections(1).connect_with(options.clone()).await?;
        let reader = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&writer).await?;

        Ok(Self { writer, reader })
    }

    /// Open an in-memory database, for tests.
    #[cfg(test)]
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let writer = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&writer).await?;
        let reader = writer.clone();
        Ok(Self { writer, reader })
    }

    pub fn writer(&self) -> &SqlitePool {
        &self.writer
    }

    pub fn reader(&self) -> &SqlitePool {
        &self.reader
    }
}

/// Map a `sqlx::Error` that should mean "row not found" to the given not
/// found error, anything else to an internal error.
pub fn map_not_found(err: sqlx::Error, not_found: ErrorCode, message: impl Into<String>) -> BridgeError {
    match err {
        sqlx::Error::RowNotFound => BridgeError::new(not_found, message),
        other => BridgeError::internal(other.to_string()),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
