// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::domain::PushDevice;
use crate::error::BridgeError;

use super::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PushDeviceRow {
    pub token: String,
    pub platform: String,
    pub bundle: String,
    pub environment: String,
    pub thread_scope: Option<String>,
}

impl From<PushDeviceRow> for PushDevice {
    fn from(row: PushDeviceRow) -> Self {
        PushDevice { token: row.token, platform: row.platform, bundle: row.bundle, environment: row.environment, thread_scope: row.thread_scope }
    }
}

impl Store {
    pub async fn register_push_device(&self, device: &PushDevice) -> Result<(), BridgeError> {
        sqlx::query(
            "INSERT INTO push_devices (token, platform, bundle, environment, thread_scope) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(token) DO UPDATE SET platform = excluded.platform, bundle = excluded.bundle,
             environment = excluded.environment, thread_scope = excluded.thread_scope",
        )
        .bind(&device.token)
        .bind(&device.platform)
        .bind(&device.bundle)
        .bind(&device.environment)
        .bind(&device.thread_scope)
        .execute(self.writer())
        .await
        .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }

    pub async fn unregister_push_device(&self, token: &str) -> Result<(), BridgeError> {
        sqlx::query("DELETE FROM push_devices WHERE token = ?")
            .bind(token)
            .execute(self.writer())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }

    /// Devices that should receive a push for `thread_id`: those with no
    /// scope (global) plus those explicitly scoped to this thread.
    pub async fn push_devices_for_thread(&self, thread_id: &str) -> Result<Vec<PushDevice>, BridgeError> {
        let rows: Vec<PushDeviceRow> =
            sqlx::query_as("SELECT * FROM push_devices WHERE thread_scope IS NULL OR thread_scope = ?")
                .bind(thread_id)
                .fetch_all(self.reader())
                .await
                .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
#[path = "push_devices_tests.rs"]
mod tests;
