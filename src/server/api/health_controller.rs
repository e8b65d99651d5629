use axum::Extension;
use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::error;

use crate::server::dtos::health_dto::{
    HealthResponse, HealthStatus, LinkCacheHealth, ServiceHealthDetails,
};
use crate::server::services::edge_services::EdgeServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint, the only dependency worth checking is the link store
pub async fn health_endpoint(
    Extension(services): Extension<EdgeServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let link_cache = check_link_cache_health(&services).await;

    let status = link_cache.status;
    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: services.config.cargo_env.as_str().to_string(),
        services: ServiceHealthDetails { link_cache },
    };

    let http_status = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

async fn check_link_cache_health(services: &EdgeServices) -> LinkCacheHealth {
    let backend = services.link_cache.backend();
    match services.link_cache.health_check().await {
        Ok(response_time) => LinkCacheHealth {
            status: HealthStatus::Healthy,
            backend,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("Link cache health check failed: {}", e);
            LinkCacheHealth {
                status: HealthStatus::Unhealthy,
                backend,
                response_time_ms: 0.0,
            }
        }
    }
}

/// prometheus scrape endpoint, 404 when no recorder was installed
pub async fn metrics_endpoint(Extension(services): Extension<EdgeServices>) -> Response {
    match services.metrics.as_ref() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
