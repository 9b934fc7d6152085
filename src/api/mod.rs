use crate::analyzer::IpAnalyzer;
use crate::models::{BlockedIp, TrafficEntry};
use crate::protection::MitigationController;
use crate::services::{summarize_anomalies, AnomalySummary, TrafficReporter};
use crate::stats::TrafficStatsStore;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Dépendances partagées par les handlers
#[derive(Clone)]
pub struct ApiState {
    pub store: TrafficStatsStore,
    pub analyzer: Arc<IpAnalyzer>,
    pub reporter: Arc<TrafficReporter>,
    pub mitigation: Arc<MitigationController>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockRequest {
    pub ips: Vec<String>,
    #[serde(default = "default_reason")]
    pub reason: String,
    /// Vrai si la demande vient d'un système d'alerte plutôt que d'un opérateur
    #[serde(default)]
    pub automatic: bool,
}

fn default_reason() -> String {
    "Manual block".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HintsRequest {
    pub ip: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok(message: String) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse { success: true, message }))
}

fn fail(status: StatusCode, message: String) -> ApiResult {
    (status, Json(ApiResponse { success: false, message }))
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/traffic", get(traffic))
        .route("/api/anomalies", get(anomalies))
        .route("/api/blocked-ips", get(blocked_ips))
        .route("/api/block", post(block_ips))
        .route("/api/unblock/:ip", post(unblock_ip))
        .route("/api/scale", post(scale))
        .route("/api/hints", post(request_hints))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Local::now().timestamp(),
    }))
}

async fn traffic(State(state): State<ApiState>) -> Json<Vec<TrafficEntry>> {
    Json(state.reporter.snapshot())
}

async fn anomalies(State(state): State<ApiState>) -> Json<AnomalySummary> {
    let entries = state.reporter.snapshot();
    Json(summarize_anomalies(&entries, state.analyzer.thresholds()))
}

async fn blocked_ips(State(state): State<ApiState>) -> Json<Vec<BlockedIp>> {
    Json(state.mitigation.blocked_ips())
}

async fn block_ips(State(state): State<ApiState>, Json(payload): Json<BlockRequest>) -> ApiResult {
    let mut ips = Vec::with_capacity(payload.ips.len());
    for raw in &payload.ips {
        match raw.trim().parse::<IpAddr>() {
            Ok(ip) => ips.push(crate::cidr::normalize(&ip)),
            Err(_) => return fail(StatusCode::BAD_REQUEST, format!("IP invalide: {}", raw)),
        }
    }

    match state.mitigation.block(&ips, &payload.reason, payload.automatic).await {
        Ok(count) => ok(format!("{} IP(s) bloquée(s)", count)),
        Err(e) => fail(
            StatusCode::BAD_GATEWAY,
            format!("Erreur lors du blocage: {:#}", e),
        ),
    }
}

async fn unblock_ip(State(state): State<ApiState>, Path(ip): Path<String>) -> ApiResult {
    state.mitigation.unblock(&ip).await;
    ok(format!("IP {} débloquée", ip))
}

async fn scale(State(state): State<ApiState>) -> ApiResult {
    match state.mitigation.scale().await {
        Ok(()) => ok("Mise à l'échelle demandée".to_string()),
        Err(e) => fail(
            StatusCode::BAD_GATEWAY,
            format!("Erreur lors de la mise à l'échelle: {:#}", e),
        ),
    }
}

async fn request_hints(State(state): State<ApiState>, Json(payload): Json<HintsRequest>) -> ApiResult {
    let Ok(ip) = payload.ip.trim().parse::<IpAddr>() else {
        return fail(StatusCode::BAD_REQUEST, format!("IP invalide: {}", payload.ip));
    };

    state
        .store
        .set_request_hints(crate::cidr::normalize(&ip), payload.headers, payload.user_agent);
    ok(format!("En-têtes enregistrés pour {}", ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::models::{Connection, IoCounters, ResourceUsage};
    use crate::protection::LogOnlyBackend;
    use crate::services::HostProbe;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct StaticProbe;

    impl HostProbe for StaticProbe {
        fn io_counters(&self) -> anyhow::Result<IoCounters> {
            Ok(IoCounters::default())
        }

        fn established_connections(&self) -> anyhow::Result<Vec<Connection>> {
            Ok(Vec::new())
        }

        fn resource_usage(&self) -> ResourceUsage {
            ResourceUsage::default()
        }

        fn local_ip(&self) -> Option<IpAddr> {
            None
        }
    }

    fn state() -> ApiState {
        let store = TrafficStatsStore::new(Arc::new(ManualClock::new()));
        let probe: Arc<dyn HostProbe> = Arc::new(StaticProbe);
        let analyzer = Arc::new(IpAnalyzer::new(&Config::default(), store.clone(), None).unwrap());
        ApiState {
            reporter: Arc::new(TrafficReporter::new(store.clone(), analyzer.clone(), probe)),
            mitigation: Arc::new(MitigationController::new(store.clone(), Arc::new(LogOnlyBackend))),
            analyzer,
            store,
        }
    }

    async fn call(router: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(create_router(state()), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_hints_then_traffic() {
        let state = state();
        let router = create_router(state.clone());

        let hints = serde_json::json!({
            "ip": "203.0.113.5",
            "headers": {"X-Forwarded-For": "198.51.100.1"},
            "user_agent": "Mozilla/5.0"
        });
        let (status, _) = call(router.clone(), "POST", "/api/hints", Some(hints)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(router, "GET", "/api/traffic", None).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["source_ip"], "203.0.113.5");
        assert_eq!(entries[0]["category"]["type"], "source");
        assert_eq!(entries[0]["category"]["is_proxy"], true);
        assert_eq!(entries[0]["user_agent"], "Mozilla/5.0");
        assert_eq!(entries[0]["status"], "normal");
        assert!(entries[0]["attack_type"].is_null());
        assert!(entries[0]["behavioral_flags"].is_array());
    }

    #[tokio::test]
    async fn test_block_list_unblock() {
        let router = create_router(state());

        let block = serde_json::json!({"ips": ["203.0.113.1", "203.0.113.2"], "reason": "flood"});
        let (status, body) = call(router.clone(), "POST", "/api/block", Some(block)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = call(router.clone(), "GET", "/api/blocked-ips", None).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["reason"], "flood");
        assert_eq!(body[0]["automatic"], false);

        let (status, _) = call(router.clone(), "POST", "/api/unblock/203.0.113.1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(router, "GET", "/api/blocked-ips", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mapped_addresses_reach_the_same_ip() {
        let state = state();
        state
            .store
            .update("203.0.113.7".parse().unwrap(), |r| r.packets = 10.0);
        let router = create_router(state.clone());

        let block = serde_json::json!({"ips": ["::ffff:203.0.113.9"]});
        call(router.clone(), "POST", "/api/block", Some(block)).await;
        let (_, body) = call(router.clone(), "GET", "/api/blocked-ips", None).await;
        assert_eq!(body[0]["ip"], "203.0.113.9");

        let (status, _) = call(router.clone(), "POST", "/api/unblock/::ffff:203.0.113.7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.store.contains(&"203.0.113.7".parse().unwrap()));

        call(router.clone(), "POST", "/api/unblock/203.0.113.9", None).await;
        let (_, body) = call(router, "GET", "/api/blocked-ips", None).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unblock_unknown_ip_succeeds() {
        let (status, body) = call(create_router(state()), "POST", "/api/unblock/10.0.0.5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_block_rejects_invalid_ip() {
        let block = serde_json::json!({"ips": ["203.0.113.1", "not-an-ip"]});
        let (status, body) = call(create_router(state()), "POST", "/api/block", Some(block)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_anomalies_and_scale() {
        let state = state();
        state
            .store
            .update("203.0.113.1".parse().unwrap(), |r| r.requests_per_second = 500.0);
        let router = create_router(state);

        let (_, body) = call(router.clone(), "GET", "/api/anomalies", None).await;
        assert_eq!(body["total_anomalies"], 1);
        assert_eq!(body["suspicious_ips"][0], "203.0.113.1");
        assert_eq!(body["threshold_rps"], 100.0);

        let (status, _) = call(router, "POST", "/api/scale", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
