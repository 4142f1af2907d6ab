use chrono::Utc;
use contracts::dashboards::d402_mp_overview::{SkuMetric, SourceSnapshot, StageError};
use contracts::enums::source_id::SourceId;
use std::collections::BTreeMap;
use thiserror::Error;

/// Этап для ошибок конфигурации
pub const CONFIG_STAGE: &str = "config";

/// Сбой одного этапа запроса к API маркетплейса. Наружу не пробрасывается.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Лимит запросов, 5xx, таймаут, обрыв соединения
    #[error("{stage}: transient upstream failure: {message}")]
    Transient {
        stage: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// Необязательный ресурс отсутствует
    #[error("{stage}: not found: {message}")]
    NotFound { stage: &'static str, message: String },

    /// Тело ответа не разобрано
    #[error("{stage}: failed to decode response: {message}")]
    Decode { stage: &'static str, message: String },

    /// Лимит страниц исчерпан, а источник отдаёт ещё данные
    #[error("{stage}: incomplete data: {message}")]
    Incomplete { stage: &'static str, message: String },
}

impl UpstreamError {
    pub fn stage(&self) -> &'static str {
        match self {
            UpstreamError::Transient { stage, .. }
            | UpstreamError::NotFound { stage, .. }
            | UpstreamError::Decode { stage, .. }
            | UpstreamError::Incomplete { stage, .. } => *stage,
        }
    }

    pub fn message(&self) -> String {
        match self {
            UpstreamError::Transient {
                status: Some(status),
                message,
                ..
            } => format!("HTTP {}: {}", status, message),
            UpstreamError::Transient { message, .. }
            | UpstreamError::NotFound { message, .. }
            | UpstreamError::Decode { message, .. }
            | UpstreamError::Incomplete { message, .. } => message.clone(),
        }
    }
}

/// Фатально только для одного аккаунта/источника
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("account '{account_id}': {field} is required")]
    MissingCredential {
        account_id: String,
        field: &'static str,
    },

    #[error("account '{account_id}': {message}")]
    Malformed { account_id: String, message: String },
}

impl ConfigurationError {
    pub fn account_id(&self) -> &str {
        match self {
            ConfigurationError::MissingCredential { account_id, .. }
            | ConfigurationError::Malformed { account_id, .. } => account_id,
        }
    }
}

/// Сборка снимка из результатов этапов.
///
/// Успешный этап добавляет данные, неудачный даёт нулевое значение,
/// запись в `errors` и `partial = true`.
pub struct SnapshotBuilder {
    snapshot: SourceSnapshot,
    metrics: BTreeMap<String, SkuMetric>,
}

impl SnapshotBuilder {
    pub fn new(source_id: SourceId, account_id: &str) -> Self {
        Self {
            snapshot: SourceSnapshot::empty(source_id, Some(account_id.to_string()), Utc::now()),
            metrics: BTreeMap::new(),
        }
    }

    pub fn stage<T: Default>(&mut self, result: Result<T, UpstreamError>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    "{} account '{}': stage '{}' degraded to zero: {}",
                    self.snapshot.source_id,
                    self.snapshot.account_id.as_deref().unwrap_or("-"),
                    e.stage(),
                    e
                );
                self.snapshot.record_error(StageError {
                    stage: e.stage().to_string(),
                    message: e.message(),
                    account_id: self.snapshot.account_id.clone(),
                });
                T::default()
            }
        }
    }

    pub fn metric(&mut self, sku: &str) -> &mut SkuMetric {
        self.metrics
            .entry(sku.to_string())
            .or_insert_with(|| SkuMetric::new(sku))
    }

    pub fn finish(mut self) -> SourceSnapshot {
        self.snapshot.metrics = self.metrics.into_values().collect();
        self.snapshot
    }
}
