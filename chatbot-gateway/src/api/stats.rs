use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    core::{
        cache::{CacheStats, ResponseCache},
        rate_limiter::TrafficShaper,
    },
    models::error::ApiResult,
};

#[derive(Clone)]
pub struct StatsState {
    pub cache: ResponseCache,
    pub shaper: Arc<TrafficShaper>,
    pub started_at: Instant,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub cache: CacheStats,
    pub active_rate_buckets: usize,
    pub version: &'static str,
}

pub async fn health(State(state): State<StatsState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "OK",
        timestamp: Utc::now(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub async fn get_stats(State(state): State<StatsState>) -> ApiResult<impl IntoResponse> {
    let stats = SystemStats {
        cache: state.cache.stats(),
        active_rate_buckets: state.shaper.active_buckets(),
        version: env!("CARGO_PKG_VERSION"),
    };

    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::TestApp;
    use crate::core::completion::MockCompletionProvider;
    use crate::core::rate_limiter::RouteClass;
    use serde_json::Value;

    #[tokio::test]
    async fn test_stats_report_cache_and_buckets() {
        let app = TestApp::new(MockCompletionProvider::new());
        app.services.shaper.admit("alice", RouteClass::TurnSubmission);
        app.services.shaper.admit("bob", RouteClass::TurnSubmission);

        let response = app.server.get("/api/stats").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["active_rate_buckets"], 2);
        assert_eq!(body["cache"]["total_entries"], 0);
        assert_eq!(body["cache"]["enabled"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
