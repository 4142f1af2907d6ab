use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::error::UpstreamError;

/// Отправить запрос и разобрать JSON-ответ, классифицируя сбои по этапу
pub(crate) async fn send_json<T: DeserializeOwned>(
    stage: &'static str,
    request: RequestBuilder,
) -> Result<T, UpstreamError> {
    let response = request.send().await.map_err(|e| {
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            format!("request failed: {}", e)
        };
        UpstreamError::Transient {
            stage,
            status: None,
            message,
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(300).collect();
        tracing::debug!("{} request failed with status {}: {}", stage, status, preview);
        return Err(classify_status(stage, status, preview));
    }

    let body = response.text().await.map_err(|e| UpstreamError::Transient {
        stage,
        status: Some(status.as_u16()),
        message: format!("failed to read body: {}", e),
    })?;

    decode_body(stage, &body)
}

pub(crate) fn classify_status(stage: &'static str, status: StatusCode, body: String) -> UpstreamError {
    if status == StatusCode::NOT_FOUND {
        UpstreamError::NotFound {
            stage,
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        }
    } else {
        UpstreamError::Transient {
            stage,
            status: Some(status.as_u16()),
            message: body,
        }
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(stage: &'static str, body: &str) -> Result<T, UpstreamError> {
    if body.trim().is_empty() {
        return Err(UpstreamError::Decode {
            stage,
            message: "empty response body".to_string(),
        });
    }
    serde_json::from_str::<T>(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        tracing::error!("Failed to parse {} response: {}. Body: {}", stage, e, preview);
        UpstreamError::Decode {
            stage,
            message: e.to_string(),
        }
    })
}
