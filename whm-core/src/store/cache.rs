//! Product cache: one JSON document per product id, last write wins.

use serde_json::Value;
use tracing::warn;

use super::{LocalStore, StoreError};

#[derive(sqlx::FromRow)]
struct ProductRow {
    product_data: Option<String>,
}

impl LocalStore {
    /// Stores `document` for `product_id`, replacing any previous document.
    pub async fn put_cached_document(
        &self,
        product_id: &str,
        document: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (product_id, product_data)
            VALUES (?, ?)
            ON CONFLICT(product_id) DO UPDATE SET product_data = excluded.product_data
            "#,
        )
        .bind(product_id)
        .bind(document.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the cached document for `product_id`.
    ///
    /// A row whose text isn't valid JSON is reported as missing.
    pub async fn get_cached_document(&self, product_id: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<ProductRow> =
            sqlx::query_as("SELECT product_data FROM products WHERE product_id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(data) = row.and_then(|r| r.product_data) else {
            return Ok(None);
        };

        match serde_json::from_str(&data) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Ignoring malformed cached product");
                Ok(None)
            }
        }
    }
}
