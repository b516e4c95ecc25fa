pub mod channels;
pub mod check;
pub mod export;
pub mod health;
pub mod subscriptions;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Error shape shared by all handlers: status plus `{"error": ".."}`
pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/live", get(health::live))
        // Subscriptions and updates
        .route(
            "/api/subscriptions",
            get(subscriptions::list_subscriptions)
                .post(subscriptions::add_subscription)
                .delete(subscriptions::remove_subscription),
        )
        .route("/api/update", post(subscriptions::trigger_update))
        // Catalog
        .route(
            "/api/channels",
            get(channels::list_channels).delete(channels::delete_channel),
        )
        .route("/api/groups", get(channels::list_groups))
        .route("/api/cleanup", post(channels::cleanup_offline))
        // Checking
        .route("/api/check", post(check::start_check))
        .route("/api/check/progress", get(check::check_progress))
        // Export
        .route("/api/export", get(export::export_catalog))
        .route("/playlist.m3u", get(export::full_playlist))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Channel, ChannelStatus};
    use crate::services::catalog::Catalog;
    use crate::services::checker::Checker;
    use crate::services::prober::Prober;
    use crate::services::scheduler::Pipeline;
    use crate::services::store::{CatalogStore, MemoryStore};
    use crate::services::subscriptions::SubscriptionRegistry;
    use crate::test_support::{m3u_feed, spawn_server, StaticFetcher};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    const FEED: &str = "http://feeds.test/main.m3u";

    async fn test_state(catalog: Catalog) -> (Arc<AppState>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let dyn_store: Arc<dyn CatalogStore> = store.clone();
        let feed = m3u_feed("cdn.test", "news", 3);
        let fetcher = Arc::new(StaticFetcher::new(&[(FEED, feed.as_str())]));

        let catalog = catalog.shared();
        let subscriptions = Arc::new(SubscriptionRegistry::load(dyn_store.clone()).await.unwrap());
        let checker = Arc::new(Checker::new(
            catalog.clone(),
            dyn_store.clone(),
            Prober::new("test-agent").unwrap(),
            Vec::new(),
            4,
            0,
        ));
        let pipeline = Arc::new(Pipeline::new(
            catalog.clone(),
            subscriptions.clone(),
            dyn_store.clone(),
            fetcher,
        ));

        let mut config = Config::from_env();
        config.max_items_page = 2;
        config.offline_retention_hours = 0;

        let state = Arc::new(AppState {
            config,
            catalog,
            subscriptions,
            store: dyn_store,
            checker,
            pipeline,
            start_time: Instant::now(),
        });
        (state, store)
    }

    async fn send(state: &Arc<AppState>, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = router(state.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_update_and_list() {
        let (state, store) = test_state(Catalog::new()).await;

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/subscriptions",
            Some(&format!(r#"{{"url":"{}","name":"Main"}}"#, FEED)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&state, Method::POST, "/api/update", None).await;
        assert_eq!(status, StatusCode::OK);
        let summary = json(&body);
        assert_eq!(summary["added"], 3);
        assert_eq!(summary["trigger"], "manual");
        assert_eq!(store.channels.lock().len(), 3);

        let (status, body) = send(&state, Method::GET, "/api/channels?limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        let page = json(&body);
        assert_eq!(page["total"], 3);
        assert_eq!(page["channels"].as_array().unwrap().len(), 2);
        assert_eq!(page["has_more"], true);

        let (_, body) = send(&state, Method::GET, "/api/groups", None).await;
        assert_eq!(json(&body)["groups"][0]["name"], "news");

        let (_, body) = send(&state, Method::GET, "/api/subscriptions", None).await;
        let subs = json(&body);
        assert_eq!(subs["total"], 1);
        assert_eq!(subs["subscriptions"][0]["last_result"]["channel_count"], 3);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let (state, _) = test_state(Catalog::new()).await;

        let (status, body) = send(&state, Method::POST, "/api/subscriptions", Some(r#"{"url":"nope"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json(&body)["error"].as_str().unwrap().contains("invalid url"));

        let (status, _) = send(&state, Method::DELETE, "/api/channels?url=http%3A%2F%2Fnone", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, Method::DELETE, "/api/subscriptions?url=http%3A%2F%2Fnone", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, Method::POST, "/api/check", Some(r#"{"concurrency":0}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json(&body)["error"].as_str().unwrap().contains("concurrency"));
    }

    #[tokio::test]
    async fn test_check_start_conflict_and_progress() {
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = spawn_server(app).await;

        let mut catalog = Catalog::new();
        catalog.merge(vec![Channel::new("Slow", format!("http://{}/slow", addr))]);
        let (state, _) = test_state(catalog).await;

        let (_, body) = send(&state, Method::GET, "/api/check/progress", None).await;
        assert!(json(&body).is_null());

        let (status, body) = send(&state, Method::POST, "/api/check", Some(r#"{"timeout_ms":500}"#)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json(&body)["total"], 1);

        let (status, _) = send(&state, Method::POST, "/api/check", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let mut waited = 0;
        while state.checker.is_running() && waited < 100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += 1;
        }

        let (_, body) = send(&state, Method::GET, "/api/check/progress", None).await;
        let progress = json(&body);
        assert_eq!(progress["is_running"], false);
        assert_eq!(progress["percent"], 100.0);
        assert_eq!(progress["offline_count"], 1);
    }

    #[tokio::test]
    async fn test_export_and_cleanup() {
        let mut online = Channel::new("Live", "http://cdn.test/live").with_group("News");
        online.status = ChannelStatus::Online;
        let mut dead = Channel::new("Dead", "http://cdn.test/dead");
        dead.status = ChannelStatus::Offline;
        dead.last_checked = Some(chrono::Utc::now() - chrono::Duration::hours(1));

        let mut catalog = Catalog::new();
        catalog.merge(vec![online, dead]);
        let (state, store) = test_state(catalog).await;

        let (status, body) = send(&state, Method::GET, "/playlist.m3u", None).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("#EXTM3U"));
        assert!(text.contains("http://cdn.test/dead"));

        let (_, body) = send(&state, Method::GET, "/api/export?format=json&only_online=true", None).await;
        let doc = json(&body);
        assert_eq!(doc["total_channels"], 1);
        assert_eq!(doc["channels"][0]["name"], "Live");

        let (status, body) = send(&state, Method::POST, "/api/cleanup", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["removed"], 1);
        assert_eq!(state.catalog.read().await.len(), 1);
        assert_eq!(store.channels.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (state, _) = test_state(Catalog::new()).await;

        let (status, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");

        let (status, body) = send(&state, Method::GET, "/live", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"alive");

        let (status, _) = send(&state, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
