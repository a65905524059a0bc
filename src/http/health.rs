//! Read-only health endpoints.
//!
//! `GET /health` reports timeout registry and performance stats;
//! `GET /health/slow?threshold_ms=` reports operations slower than the
//! threshold (the recorder's slow threshold when omitted).

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::lifecycle::Services;
use crate::performance::{OperationStats, SlowOperation};
use crate::timeouts::TimeoutStats;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub timeouts: TimeoutStats,
    pub performance: OperationStats,
}

#[derive(Debug, Deserialize)]
pub struct SlowQuery {
    pub threshold_ms: Option<u64>,
}

pub fn routes(services: Services) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/slow", get(slow_operations))
        .with_state(services)
}

async fn health(State(services): State<Services>) -> Json<HealthReport> {
    let status = if services.is_stopped() { "stopping" } else { "ok" };
    Json(HealthReport {
        status,
        timeouts: services.timeouts.stats(),
        performance: services.logger.performance().stats(None),
    })
}

async fn slow_operations(
    State(services): State<Services>,
    Query(query): Query<SlowQuery>,
) -> Json<Vec<SlowOperation>> {
    let performance = services.logger.performance();
    let threshold = query
        .threshold_ms
        .unwrap_or_else(|| performance.slow_threshold_ms());
    Json(performance.slow_operations_report(threshold))
}
