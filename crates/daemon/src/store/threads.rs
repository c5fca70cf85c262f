// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

use crate::domain::Thread;
use crate::error::{BridgeError, ErrorCode};

use super::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ThreadRow {
    pub id: String,
    pub project_path: String,
    pub name: Option<String>,
    pub preview: Option<String>,
    pub archived: bool,
    pub pending_approval_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ThreadRow> for Thread {
    fn from(row: ThreadRow) -> Self {
        Thread {
            id: row.id,
            project_path: row.project_path,
            name: row.name,
            preview: row.preview,
            archived: row.archived,
            pending_approval_count: row.pending_approval_count.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Store {
    pub async fn create_thread(&self, id: &str, project_path: &str, name: Option<&str>) -> Result<Thread, BridgeError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO threads (id, project_path, name, archived, pending_approval_count, created_at, updated_at)
             VALUES (?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(id)
        .bind(project_path)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(self.writer())
        .await
        .map_err(|e| BridgeError::internal(e.to_string()))?;

        self.get_thread(id).await
    }

    pub async fn get_thread(&self, id: &str) -> Result<Thread, BridgeError> {
        let row: ThreadRow = sqlx::query_as("SELECT * FROM threads WHERE id = ?")
            .bind(id)
            .fetch_one(self.reader())
            .await
            .map_err(|e| super::map_not_found(e, ErrorCode::ThreadNotFound, "thread not found"))?;
        Ok(row.into())
    }

    pub async fn list_threads(&self, archived: bool) -> Result<Vec<Thread>, BridgeError> {
        let rows: Vec<ThreadRow> = sqlx::query_as("SELECT * FROM threads WHERE archived = ? ORDER BY updated_at DESC")
            .bind(archived)
            .fetch_all(self.reader())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn set_thread_archived(&self, id: &str, archived: bool) -> Result<Thread, BridgeError> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE threads SET archived = ?, updated_at = ? WHERE id = ?")
            .bind(archived)
            .bind(now)
            .bind(id)
            .execute(self.writer())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::new(ErrorCode::ThreadNotFound, "thread not found"));
        }
        self.get_thread(id).await
    }

    /// Refresh the thread's list-view preview snippet, bumping `updated_at`
    /// so recently active threads sort first.
    pub async fn set_thread_preview(&self, id: &str, preview: &str) -> Result<(), BridgeError> {
        sqlx::query("UPDATE threads SET preview = ?, updated_at = ? WHERE id = ?")
            .bind(preview)
            .bind(Utc::now())
            .bind(id)
            .execute(self.writer())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }

    pub async fn set_thread_pending_approval_count(&self, id: &str, count: u32) -> Result<(), BridgeError> {
        sqlx::query("UPDATE threads SET pending_approval_count = ?, updated_at = ? WHERE id = ?")
            .bind(count as i64)
            .bind(Utc::now())
            .bind(id)
            .execute(self.writer())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "threads_tests.rs"]
mod tests;
