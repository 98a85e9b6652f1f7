//! Health check endpoints
//!
//! - `/health` - liveness, 200 while the process is serving
//! - `/ready` - readiness, 200 only when both stores answer a ping

use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use super::{json_response, FullBody};
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    pub dev_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub ready: bool,
    pub document_store: bool,
    pub reference_store: bool,
}

pub fn health_check(state: &AppState) -> Response<FullBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            uptime: state.started_at.elapsed().as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            dev_mode: state.args.dev_mode,
        },
    )
}

pub async fn readiness_check(state: &AppState) -> Response<FullBody> {
    let (documents, references) = tokio::join!(
        state.engine.documents().ping(),
        state.engine.references().ping()
    );

    if let Err(e) = &documents {
        warn!("Document store not ready: {}", e);
    }
    if let Err(e) = &references {
        warn!("Reference store not ready: {}", e);
    }

    let body = ReadinessResponse {
        ready: documents.is_ok() && references.is_ok(),
        document_store: documents.is_ok(),
        reference_store: references.is_ok(),
    };
    let status = if body.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &body)
}
