//! Outbox of stock movements waiting for delivery.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{LocalStore, StoreError};

/// A queued write, as stored in the outbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedOperation {
    /// Store-assigned sequence id; increases with insertion order.
    pub id: i64,
    pub payload: Value,
}

#[derive(sqlx::FromRow)]
struct MovementRow {
    movement_id: i64,
    movement_data: Option<String>,
}

impl MovementRow {
    fn decode(&self) -> Result<QueuedOperation, serde_json::Error> {
        let data = self.movement_data.as_deref().unwrap_or_default();
        Ok(QueuedOperation {
            id: self.movement_id,
            payload: serde_json::from_str(data)?,
        })
    }
}

impl LocalStore {
    /// Appends `payload` to the outbox and returns its sequence id.
    pub async fn enqueue(&self, payload: &Value) -> Result<i64, StoreError> {
        let result = sqlx::query("INSERT INTO stock_movements (movement_data) VALUES (?)")
            .bind(payload.to_string())
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        debug!(id = id, "Queued stock movement");
        Ok(id)
    }

    /// Returns every queued operation, oldest first.
    ///
    /// Rows that don't decode as JSON are logged and left out so one bad row
    /// can't hold up delivery of the rest. See [`list_unreadable`](Self::list_unreadable).
    pub async fn list_queued(&self) -> Result<Vec<QueuedOperation>, StoreError> {
        let queued = self
            .movement_rows()
            .await?
            .into_iter()
            .filter_map(|row| match row.decode() {
                Ok(operation) => Some(operation),
                Err(e) => {
                    warn!(id = row.movement_id, error = %e, "Skipping malformed queued movement");
                    None
                }
            })
            .collect();

        Ok(queued)
    }

    /// Returns the ids of outbox rows that can't be decoded, oldest first.
    pub async fn list_unreadable(&self) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .movement_rows()
            .await?
            .iter()
            .filter(|row| row.decode().is_err())
            .map(|row| row.movement_id)
            .collect())
    }

    /// Deletes outbox rows that can't be decoded and returns how many went.
    pub async fn purge_unreadable(&self) -> Result<usize, StoreError> {
        let ids = self.list_unreadable().await?;
        for id in &ids {
            self.dequeue(*id).await?;
        }
        if !ids.is_empty() {
            warn!(count = ids.len(), ids = ?ids, "Purged unreadable queued movements");
        }
        Ok(ids.len())
    }

    async fn movement_rows(&self) -> Result<Vec<MovementRow>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT movement_id, movement_data FROM stock_movements ORDER BY movement_id ASC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Removes the operation with sequence id `id`. Removing an id that is
    /// not queued is a no-op.
    pub async fn dequeue(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM stock_movements WHERE movement_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(id = id, "Queued movement already removed");
        }
        Ok(())
    }

    /// Number of rows in the outbox, including malformed ones.
    pub async fn queued_count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stock_movements")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
