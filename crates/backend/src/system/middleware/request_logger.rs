use axum::body::to_bytes;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{FixedOffset, Utc};

use crate::shared::format::format_number;

/// Middleware для логирования HTTP запросов
///
/// Пишет одной строкой:
/// - время (локальное, смещение из конфигурации)
/// - длительность (ms)
/// - размер ответа (форматированный)
/// - статус код
/// - метод и путь
pub async fn request_logger(State(tz): State<FixedOffset>, req: Request<Body>, next: Next) -> Response {
    let start = std::time::Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;
    let (parts, body) = response.into_parts();

    // Читаем тело ответа, чтобы узнать реальный размер
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(
                "{} | {:>5}ms | {:>12} | {} {:>6} {} ({})",
                Utc::now().with_timezone(&tz).format("%H:%M:%S"),
                start.elapsed().as_millis(),
                "error",
                parts.status.as_u16(),
                method,
                uri.path(),
                e
            );
            return Response::from_parts(parts, Body::default());
        }
    };

    let size = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
    let line = format!(
        "{} | {:>5}ms | {:>12} | {} {:>6} {}",
        Utc::now().with_timezone(&tz).format("%H:%M:%S"),
        start.elapsed().as_millis(),
        format_number(size),
        parts.status.as_u16(),
        method,
        uri.path()
    );
    if parts.status.is_success() {
        tracing::info!("{}", line);
    } else {
        tracing::warn!("{}", line);
    }

    Response::from_parts(parts, Body::from(bytes))
}
