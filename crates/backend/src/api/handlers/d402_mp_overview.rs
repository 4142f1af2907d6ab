use axum::{extract::Query, http::StatusCode, Json};
use contracts::dashboards::d402_mp_overview::{DashboardQuery, DashboardView};

use crate::dashboards::d402_mp_overview::service;

/// GET /api/d402/overview?force=true
pub async fn get_overview(Query(query): Query<DashboardQuery>) -> Result<Json<DashboardView>, StatusCode> {
    let Some(service) = service::instance() else {
        tracing::error!("D402 Dashboard: service is not initialized");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let view = service.get_view(query.force).await;
    tracing::info!(
        "D402 Dashboard: returning view (cache_hit={}, partial={}, force={})",
        view.cache_hit,
        view.banner.is_some(),
        query.force
    );
    Ok(Json(view))
}

/// POST /api/d402/overview/invalidate
pub async fn invalidate_overview() -> StatusCode {
    match service::instance() {
        Some(service) => {
            service.invalidate().await;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::SERVICE_UNAVAILABLE,
    }
}
