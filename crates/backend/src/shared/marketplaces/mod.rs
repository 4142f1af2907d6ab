pub mod error;
mod http;
#[cfg(test)]
pub(crate) mod mock_server;
pub mod ozon;
pub mod wildberries;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use contracts::dashboards::d402_mp_overview::SourceSnapshot;
use contracts::enums::source_id::SourceId;
use std::fmt;

pub use error::{ConfigurationError, SnapshotBuilder, UpstreamError};

/// Имя склада для строк, где источник его не указал
pub const UNKNOWN_WAREHOUSE: &str = "Склад не указан";

/// Учётные данные аккаунта. Ядро их не разбирает, только передаёт клиенту.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Client-Id (только Ozon)
    pub client_id: Option<String>,
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("api_key", &"****")
            .finish()
    }
}

/// Настройки одного аккаунта маркетплейса
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub account_id: String,
    pub credentials: Credentials,
    /// Ограничение списка SKU (offer_id для Ozon)
    pub sku_filter: Option<Vec<String>>,
}

impl AccountConfig {
    pub fn accepts_sku(&self, sku: &str) -> bool {
        match &self.sku_filter {
            Some(filter) => filter.iter().any(|s| s == sku),
            None => true,
        }
    }
}

/// Клиент источника метрик.
///
/// Обычные сбои API (лимиты, 5xx, 404, пустое тело) не возвращаются как
/// ошибка: этап заменяется нулями, в снимок пишется `errors` и `partial`.
/// `Err` только для [`ConfigurationError`].
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source_id(&self) -> SourceId;

    fn validate(&self, account: &AccountConfig) -> Result<(), ConfigurationError>;

    /// Полный снимок "сегодня" (все страницы выбраны). Метрики не отсортированы.
    async fn fetch(
        &self,
        account: &AccountConfig,
        tz: FixedOffset,
    ) -> Result<SourceSnapshot, ConfigurationError>;
}

/// Сутки источника: от локальной полуночи до следующей
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDay {
    pub date: NaiveDate,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl LocalDay {
    pub fn today(tz: FixedOffset) -> Self {
        Self::containing(Utc::now(), tz)
    }

    pub fn containing(instant: DateTime<Utc>, tz: FixedOffset) -> Self {
        let date = instant.with_timezone(&tz).date_naive();
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        // Fixed offsets have no gaps, the local midnight is always unique
        let start = tz
            .from_local_datetime(&midnight)
            .single()
            .unwrap_or_else(|| instant.with_timezone(&tz));
        Self {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    /// Попадает ли отметка времени источника в эти сутки.
    ///
    /// Отметки без смещения (WB отдаёт "2024-01-15T12:34:56") считаются
    /// локальными.
    pub fn contains_timestamp(&self, raw: &str) -> bool {
        parse_local_date(raw, *self.start.offset()) == Some(self.date)
    }
}

fn parse_local_date(raw: &str, tz: FixedOffset) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&tz).date_naive());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.date());
    }
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msk() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_local_day_uses_configured_offset() {
        // 22:30 UTC is already the next day in Moscow
        let instant = Utc.with_ymd_and_hms(2025, 3, 10, 22, 30, 0).unwrap();
        let day = LocalDay::containing(instant, msk());
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(day.start.to_rfc3339(), "2025-03-11T00:00:00+03:00");
        assert_eq!(day.end.to_rfc3339(), "2025-03-12T00:00:00+03:00");
    }

    #[test]
    fn test_contains_timestamp_formats() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 11, 9, 0, 0).unwrap();
        let day = LocalDay::containing(instant, msk());
        assert!(day.contains_timestamp("2025-03-11T10:15:00"));
        assert!(day.contains_timestamp("2025-03-11T10:15:00.123"));
        assert!(day.contains_timestamp("2025-03-10T21:30:00Z"));
        assert!(!day.contains_timestamp("2025-03-10T20:59:59Z"));
        assert!(!day.contains_timestamp("2025-03-10T23:59:59"));
        assert!(day.contains_timestamp("2025-03-11"));
        assert!(!day.contains_timestamp("garbage"));
    }

    #[test]
    fn test_credentials_debug_hides_key() {
        let creds = Credentials {
            client_id: Some("42".into()),
            api_key: "secret".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("42"));
    }
}
