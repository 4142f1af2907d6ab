use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use tower_http::cors::{Any, CorsLayer};

use crate::{api::handlers, system};

/// Конфигурация всех роутов приложения
pub fn configure_routes(tz: FixedOffset) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // D402 MARKETPLACE OVERVIEW
        // ========================================
        .route("/api/d402/overview", get(handlers::d402_mp_overview::get_overview))
        .route(
            "/api/d402/overview/invalidate",
            post(handlers::d402_mp_overview::invalidate_overview),
        )
        .layer(middleware::from_fn_with_state(
            tz,
            system::middleware::request_logger::request_logger,
        ))
        .layer(cors)
}
