//! Outbox delivery and cache-backed product lookups.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::SyncError;
use crate::api::{ApiClient, ApiError, ParsedResponse};
use crate::store::LocalStore;

/// Default path for product lookups; the product id is appended.
pub const DEFAULT_PRODUCT_ENDPOINT: &str = "/api/products";
/// Default path stock movements are POSTed to.
pub const DEFAULT_MOVEMENT_ENDPOINT: &str = "/api/stockMovements";

/// Backend paths used by the coordinator, relative to the client base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub products: String,
    pub movements: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            products: DEFAULT_PRODUCT_ENDPOINT.to_string(),
            movements: DEFAULT_MOVEMENT_ENDPOINT.to_string(),
        }
    }
}

/// Where a flush cycle is.
///
/// `Idle → Draining → (Delivered | Blocked) → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Draining,
    Delivered,
    Blocked,
}

/// Result of a flush cycle that emptied the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Movements delivered during this cycle.
    pub delivered: usize,
}

/// Where a product document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Live,
    Cache,
}

/// A product document together with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductLookup {
    pub document: Value,
    pub source: Source,
}

/// What happened to a submitted stock movement.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Delivered, along with everything queued before it.
    Delivered { id: i64 },
    /// Still queued; the server couldn't be reached.
    Queued { id: i64, cause: ApiError },
}

/// Coordinates the API client and the local store.
pub struct SyncCoordinator {
    client: ApiClient,
    store: LocalStore,
    endpoints: Endpoints,
    drain_lock: tokio::sync::Mutex<()>,
    state: Mutex<SyncState>,
}

impl SyncCoordinator {
    pub fn new(client: ApiClient, store: LocalStore, endpoints: Endpoints) -> Self {
        Self {
            client,
            store,
            endpoints,
            drain_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Returns the current flush state.
    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SyncState) {
        debug!(state = ?state, "Sync state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Returns the movements waiting for delivery, oldest first.
    pub async fn pending(&self) -> Result<Vec<crate::QueuedOperation>, SyncError> {
        Ok(self.store.list_queued().await?)
    }

    /// Runs one flush cycle: delivers queued movements in order until the
    /// outbox is empty or a delivery fails.
    ///
    /// Concurrent calls wait for the running cycle to finish, including
    /// cycles run by other processes on the same database file. A movement
    /// is removed only after the server confirmed it, so dropping this
    /// future mid-cycle leaves undelivered movements queued.
    pub async fn flush(&self) -> Result<FlushReport, SyncError> {
        let _drain = self.drain_lock.lock().await;
        let _file_lock = self.store.lock_drain().await?;
        let _reset = IdleOnDrop(self);

        self.set_state(SyncState::Draining);
        let result = self.drain().await;

        self.set_state(match &result {
            Ok(_) => SyncState::Delivered,
            Err(_) => SyncState::Blocked,
        });

        result
    }

    async fn drain(&self) -> Result<FlushReport, SyncError> {
        let queued = self.store.list_queued().await?;
        let mut delivered = 0;

        for operation in queued {
            match self
                .client
                .post(&self.endpoints.movements, &operation.payload)
                .await
            {
                Ok(_) => {
                    self.store.dequeue(operation.id).await?;
                    delivered += 1;
                    debug!(id = operation.id, "Delivered queued movement");
                }
                Err(source) => {
                    warn!(
                        id = operation.id,
                        delivered = delivered,
                        error = %source,
                        "Delivery failed, leaving remaining movements queued"
                    );
                    return Err(SyncError::Blocked {
                        id: operation.id,
                        delivered,
                        source,
                    });
                }
            }
        }

        if delivered > 0 {
            info!(delivered = delivered, "Outbox drained");
        }
        Ok(FlushReport { delivered })
    }

    /// Queues a stock movement and runs a flush cycle.
    ///
    /// Connectivity failures leave the movement queued and return
    /// [`SubmitOutcome::Queued`]. A rejected credential is returned as an
    /// error; the movement stays queued for after the next login.
    pub async fn submit_stock_movement(&self, payload: &Value) -> Result<SubmitOutcome, SyncError> {
        let id = self.store.enqueue(payload).await?;

        match self.flush().await {
            Ok(_) => Ok(SubmitOutcome::Delivered { id }),
            Err(SyncError::Blocked { source, .. }) if !source.is_unauthorized() => {
                Ok(SubmitOutcome::Queued { id, cause: source })
            }
            Err(e) => Err(e),
        }
    }

    /// Looks up a product, preferring the server and falling back to the cache.
    ///
    /// A live read that returns a JSON object replaces the cached copy. Any
    /// other body (such as a login page) counts as a failed read. If the
    /// server can't be reached and nothing is cached, the request error is
    /// returned.
    /// [`ApiError::Unauthorized`] is always returned, never masked by the cache.
    pub async fn fetch_product(&self, product_id: &str) -> Result<ProductLookup, SyncError> {
        let path = format!(
            "{}/{}",
            self.endpoints.products,
            urlencoding::encode(product_id)
        );

        let live = self
            .client
            .get(&path)
            .await
            .and_then(|response| match response {
                ParsedResponse::Object(map) => Ok(Value::Object(map)),
                other => Err(ApiError::UnexpectedBody { kind: other.kind() }),
            });

        match live {
            Ok(document) => {
                self.store.put_cached_document(product_id, &document).await?;
                Ok(ProductLookup {
                    document,
                    source: Source::Live,
                })
            }
            Err(e) if e.is_unauthorized() => Err(e.into()),
            Err(e) => match self.store.get_cached_document(product_id).await? {
                Some(document) => {
                    warn!(product_id = %product_id, error = %e, "Live lookup failed, using cached product");
                    Ok(ProductLookup {
                        document,
                        source: Source::Cache,
                    })
                }
                None => Err(e.into()),
            },
        }
    }
}

/// Returns the coordinator to `Idle` when a flush cycle ends or is dropped.
struct IdleOnDrop<'a>(&'a SyncCoordinator);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(SyncState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialStore;
    use crate::test_server::{serve, unreachable_base_url, HitCounter};
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::Html;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct TestContext {
        coordinator: SyncCoordinator,
        store: LocalStore,
        _temp_dir: TempDir,
    }

    async fn setup(base_url: &str) -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let credentials = CredentialStore::new(temp_dir.path().join("preferences.yaml"));
        let client = ApiClient::new(base_url, credentials).unwrap();
        TestContext {
            coordinator: SyncCoordinator::new(client, store.clone(), Endpoints::default()),
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Movement endpoint that records every attempt and rejects `fail_line`.
    fn movement_server(attempts: Arc<Mutex<Vec<Value>>>, fail_line: Option<i64>) -> Router {
        Router::new().route(
            DEFAULT_MOVEMENT_ENDPOINT,
            post(move |Json(body): Json<Value>| {
                let attempts = attempts.clone();
                async move {
                    attempts.lock().unwrap().push(body.clone());
                    if fail_line.is_some() && body["line"].as_i64() == fail_line {
                        (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "rejected"})))
                    } else {
                        (StatusCode::CREATED, Json(json!({"status": "ok"})))
                    }
                }
            }),
        )
    }

    fn lines(values: &[Value]) -> Vec<i64> {
        values.iter().filter_map(|v| v["line"].as_i64()).collect()
    }

    #[tokio::test]
    async fn test_flush_delivers_in_order() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let base = serve(movement_server(attempts.clone(), None)).await;
        let ctx = setup(&base).await;

        for line in 1..=3 {
            ctx.store.enqueue(&json!({"line": line})).await.unwrap();
        }

        let report = ctx.coordinator.flush().await.unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(lines(&attempts.lock().unwrap()), vec![1, 2, 3]);
        assert!(ctx.store.list_queued().await.unwrap().is_empty());
        assert_eq!(ctx.coordinator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_flush_empty_outbox() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let base = serve(movement_server(attempts.clone(), None)).await;
        let ctx = setup(&base).await;

        let report = ctx.coordinator.flush().await.unwrap();
        assert_eq!(report.delivered, 0);
        assert!(attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_stops_at_first_failure() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let base = serve(movement_server(attempts.clone(), Some(2))).await;
        let ctx = setup(&base).await;

        let p1 = json!({"line": 1});
        let p2 = json!({"line": 2});
        let p3 = json!({"line": 3});
        let id1 = ctx.store.enqueue(&p1).await.unwrap();
        let id2 = ctx.store.enqueue(&p2).await.unwrap();
        let id3 = ctx.store.enqueue(&p3).await.unwrap();

        let err = ctx.coordinator.flush().await.unwrap_err();
        match err {
            SyncError::Blocked {
                id,
                delivered,
                source,
            } => {
                assert_eq!(id, id2);
                assert_eq!(delivered, 1);
                assert!(matches!(source, ApiError::Status { status: 422, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Entry 2 was retried once, entry 3 never attempted
        assert_eq!(lines(&attempts.lock().unwrap()), vec![1, 2, 2]);

        let remaining = ctx.store.list_queued().await.unwrap();
        assert_eq!(
            remaining,
            vec![
                crate::QueuedOperation { id: id2, payload: p2 },
                crate::QueuedOperation { id: id3, payload: p3 },
            ]
        );
        assert!(!remaining.iter().any(|q| q.id == id1));
        assert_eq!(ctx.coordinator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_flush_unauthorized_keeps_outbox() {
        let hits = HitCounter::new();
        let counter = hits.clone();
        let app = Router::new().route(
            DEFAULT_MOVEMENT_ENDPOINT,
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.hit();
                    StatusCode::UNAUTHORIZED
                }
            }),
        );
        let base = serve(app).await;
        let ctx = setup(&base).await;
        ctx.coordinator.client().save_api_key("revoked").unwrap();

        ctx.store.enqueue(&json!({"line": 1})).await.unwrap();
        ctx.store.enqueue(&json!({"line": 2})).await.unwrap();

        let err = ctx.coordinator.flush().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(hits.count(), 1);
        assert_eq!(ctx.store.list_queued().await.unwrap().len(), 2);
        assert!(ctx.coordinator.client().credential().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_flushes_deliver_once() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let base = serve(movement_server(attempts.clone(), None)).await;
        let ctx = setup(&base).await;

        for line in 1..=5 {
            ctx.store.enqueue(&json!({"line": line})).await.unwrap();
        }

        let (first, second) = tokio::join!(ctx.coordinator.flush(), ctx.coordinator.flush());
        let total = first.unwrap().delivered + second.unwrap().delivered;

        assert_eq!(total, 5);
        assert_eq!(lines(&attempts.lock().unwrap()), vec![1, 2, 3, 4, 5]);
        assert!(ctx.store.list_queued().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_online_delivers() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let base = serve(movement_server(attempts.clone(), None)).await;
        let ctx = setup(&base).await;

        let outcome = ctx
            .coordinator
            .submit_stock_movement(&json!({"line": 7}))
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Delivered { .. }));
        assert_eq!(lines(&attempts.lock().unwrap()), vec![7]);
        assert!(ctx.store.list_queued().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_offline_queues() {
        let base = unreachable_base_url().await;
        let ctx = setup(&base).await;

        let payload = json!({"line": 7});
        let outcome = ctx.coordinator.submit_stock_movement(&payload).await.unwrap();

        let queued_id = match outcome {
            SubmitOutcome::Queued { id, cause } => {
                assert!(matches!(cause, ApiError::Request(_)));
                id
            }
            other => panic!("unexpected outcome: {other:?}"),
        };

        let pending = ctx.coordinator.pending().await.unwrap();
        assert_eq!(
            pending,
            vec![crate::QueuedOperation {
                id: queued_id,
                payload
            }]
        );
    }

    fn product_server(hits: HitCounter) -> Router {
        Router::new().route(
            "/api/products/{id}",
            get(move |Path(id): Path<String>| {
                let hits = hits.clone();
                async move {
                    hits.hit();
                    Json(json!({"id": id, "name": "Widget", "quantityOnHand": 12}))
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_fetch_product_live_refreshes_cache() {
        let hits = HitCounter::new();
        let base = serve(product_server(hits.clone())).await;
        let ctx = setup(&base).await;

        ctx.store
            .put_cached_document("sku-100", &json!({"name": "stale"}))
            .await
            .unwrap();

        let lookup = ctx.coordinator.fetch_product("sku-100").await.unwrap();
        assert_eq!(lookup.source, Source::Live);
        assert_eq!(lookup.document["name"], "Widget");
        assert_eq!(hits.count(), 1);

        assert_eq!(
            ctx.store.get_cached_document("sku-100").await.unwrap(),
            Some(lookup.document)
        );
    }

    #[tokio::test]
    async fn test_fetch_product_encodes_id() {
        let hits = HitCounter::new();
        let base = serve(product_server(hits.clone())).await;
        let ctx = setup(&base).await;

        let lookup = ctx.coordinator.fetch_product("bin A/01").await.unwrap();
        assert_eq!(lookup.document["id"], "bin A/01");
    }

    #[tokio::test]
    async fn test_fetch_product_offline_uses_cache() {
        let base = unreachable_base_url().await;
        let ctx = setup(&base).await;

        ctx.store
            .put_cached_document("sku-100", &json!({"name": "Widget"}))
            .await
            .unwrap();

        let lookup = ctx.coordinator.fetch_product("sku-100").await.unwrap();
        assert_eq!(lookup.source, Source::Cache);
        assert_eq!(lookup.document, json!({"name": "Widget"}));
    }

    #[tokio::test]
    async fn test_fetch_product_server_error_uses_cache() {
        let app = Router::new().route(
            "/api/products/{id}",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = serve(app).await;
        let ctx = setup(&base).await;

        ctx.store
            .put_cached_document("sku-100", &json!({"name": "Widget"}))
            .await
            .unwrap();

        let lookup = ctx.coordinator.fetch_product("sku-100").await.unwrap();
        assert_eq!(lookup.source, Source::Cache);
    }

    #[tokio::test]
    async fn test_fetch_product_offline_without_cache() {
        let base = unreachable_base_url().await;
        let ctx = setup(&base).await;

        let err = ctx.coordinator.fetch_product("sku-404").await.unwrap_err();
        assert!(matches!(err, SyncError::Api(ApiError::Request(_))));
    }

    #[tokio::test]
    async fn test_fetch_product_unauthorized_not_masked() {
        let app = Router::new().route(
            "/api/products/{id}",
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(app).await;
        let ctx = setup(&base).await;

        ctx.store
            .put_cached_document("sku-100", &json!({"name": "Widget"}))
            .await
            .unwrap();

        let err = ctx.coordinator.fetch_product("sku-100").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_coordinators_on_same_database_deliver_once() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let recorded = attempts.clone();
        let app = Router::new().route(
            DEFAULT_MOVEMENT_ENDPOINT,
            post(move |Json(body): Json<Value>| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(body);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    StatusCode::CREATED
                }
            }),
        );
        let base = serve(app).await;

        // Two separately opened stores, as two `whm` processes would have
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("whm.db");
        let open = |name: &str| {
            let credentials = CredentialStore::new(temp_dir.path().join(name));
            let client = ApiClient::new(&base, credentials).unwrap();
            let db_path = db_path.clone();
            async move {
                let store = LocalStore::open(&db_path).await.unwrap();
                SyncCoordinator::new(client, store, Endpoints::default())
            }
        };
        let first = open("a.yaml").await;
        let second = open("b.yaml").await;

        for line in 1..=3 {
            first.store().enqueue(&json!({"line": line})).await.unwrap();
        }

        let (a, b) = tokio::join!(first.flush(), second.flush());
        assert_eq!(a.unwrap().delivered + b.unwrap().delivered, 3);
        assert_eq!(lines(&attempts.lock().unwrap()), vec![1, 2, 3]);
        assert_eq!(second.store().queued_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_flush_keeps_unconfirmed_movements() {
        let app = Router::new().route(
            DEFAULT_MOVEMENT_ENDPOINT,
            post(|Json(body): Json<Value>| async move {
                if body["line"] != 1 {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                StatusCode::CREATED
            }),
        );
        let base = serve(app).await;
        let ctx = setup(&base).await;

        let mut ids = Vec::new();
        for line in 1..=3 {
            ids.push(ctx.store.enqueue(&json!({"line": line})).await.unwrap());
        }

        let cancelled =
            tokio::time::timeout(Duration::from_millis(500), ctx.coordinator.flush()).await;
        assert!(cancelled.is_err());

        let remaining: Vec<i64> = ctx
            .store
            .list_queued()
            .await
            .unwrap()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(remaining, ids[1..].to_vec());
        assert_eq!(ctx.coordinator.state(), SyncState::Idle);

        // The drain lock went with the dropped cycle
        let relock = tokio::time::timeout(Duration::from_secs(5), ctx.store.lock_drain()).await;
        assert!(relock.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_fetch_product_non_json_keeps_cache() {
        let app = Router::new().route(
            "/api/products/{id}",
            get(|| async { Html("<html>Please log in</html>") }),
        );
        let base = serve(app).await;
        let ctx = setup(&base).await;

        let cached = json!({"name": "Widget"});
        ctx.store
            .put_cached_document("sku-100", &cached)
            .await
            .unwrap();

        let lookup = ctx.coordinator.fetch_product("sku-100").await.unwrap();
        assert_eq!(lookup.source, Source::Cache);
        assert_eq!(lookup.document, cached);
        assert_eq!(
            ctx.store.get_cached_document("sku-100").await.unwrap(),
            Some(cached)
        );
    }

    #[tokio::test]
    async fn test_fetch_product_array_without_cache() {
        let app = Router::new().route(
            "/api/products/{id}",
            get(|| async { Json(json!([{"name": "Widget"}])) }),
        );
        let base = serve(app).await;
        let ctx = setup(&base).await;

        let err = ctx.coordinator.fetch_product("sku-100").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Api(ApiError::UnexpectedBody { kind: "array" })
        ));
        assert!(ctx
            .store
            .get_cached_document("sku-100")
            .await
            .unwrap()
            .is_none());
    }
}
