//! TTL-кэш объединённого снимка.
//!
//! На каждый ключ свой асинхронный мьютекс: пока идёт пересчёт, остальные
//! запросы того же ключа ждут его результата, поэтому при промахе
//! выполняется ровно один `collect()`. Запись заменяется целиком под
//! мьютексом, читатели получают копию и не видят промежуточных состояний.

use chrono::{DateTime, Duration, Utc};
use contracts::dashboards::d402_mp_overview::MergedDashboard;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::aggregator::DashboardProducer;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: MergedDashboard,
    pub expires_at: DateTime<Utc>,
}

/// Нарушение инварианта записи; запись отбрасывается как промах
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cache entry for '{key}' is corrupted: {reason}")]
pub struct CacheCorruption {
    pub key: String,
    pub reason: String,
}

type Slot = Arc<tokio::sync::Mutex<Option<CacheEntry>>>;

pub struct DashboardCache {
    producer: Arc<dyn DashboardProducer>,
    ttl_seconds: i64,
    slots: Mutex<HashMap<String, Slot>>,
}

impl DashboardCache {
    /// `ttl_seconds <= 0`: всегда пересчитывать
    pub fn new(producer: Arc<dyn DashboardProducer>, ttl_seconds: i64) -> Self {
        if ttl_seconds <= 0 {
            tracing::warn!("Dashboard cache disabled (ttl = {}s)", ttl_seconds);
        }
        Self {
            producer,
            ttl_seconds,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.entry(key.to_string()).or_default().clone()
    }

    pub async fn get_or_refresh(&self, key: &str, force: bool) -> MergedDashboard {
        let slot = self.slot(key);
        let mut current = slot.lock().await;
        let now = Utc::now();

        if force {
            tracing::info!("Cache '{}': forced refresh", key);
        } else if let Some(entry) = current.as_ref() {
            match self.check_entry(key, entry, now) {
                Ok(true) => {
                    tracing::debug!("Cache '{}': hit, expires at {}", key, entry.expires_at);
                    let mut value = entry.value.clone();
                    value.cache_hit = true;
                    return value;
                }
                Ok(false) => tracing::debug!("Cache '{}': expired at {}", key, entry.expires_at),
                Err(e) => {
                    tracing::warn!("{}; discarding entry", e);
                    *current = None;
                }
            }
        } else {
            tracing::debug!("Cache '{}': miss", key);
        }

        let mut value = self.producer.collect().await;
        value.cache_hit = false;

        *current = if self.ttl_seconds > 0 {
            Some(CacheEntry {
                key: key.to_string(),
                value: value.clone(),
                expires_at: Utc::now() + Duration::seconds(self.ttl_seconds),
            })
        } else {
            None
        };
        value
    }

    /// Удалить запись; следующий `get_or_refresh` пересчитает безусловно.
    /// Идущий пересчёт дожидается и его результат тоже удаляется.
    pub async fn invalidate(&self, key: &str) {
        let slot = self.slot(key);
        let mut current = slot.lock().await;
        if current.take().is_some() {
            tracing::info!("Cache '{}': invalidated", key);
        }
    }

    /// Ok(true): запись свежая, Ok(false): истекла
    fn check_entry(&self, key: &str, entry: &CacheEntry, now: DateTime<Utc>) -> Result<bool, CacheCorruption> {
        if entry.key != key {
            return Err(CacheCorruption {
                key: key.to_string(),
                reason: format!("slot holds entry for '{}'", entry.key),
            });
        }
        if self.ttl_seconds <= 0 {
            return Err(CacheCorruption {
                key: key.to_string(),
                reason: "entry stored while caching is disabled".to_string(),
            });
        }
        let latest_valid_expiry = now + Duration::seconds(self.ttl_seconds);
        if entry.expires_at > latest_valid_expiry {
            return Err(CacheCorruption {
                key: key.to_string(),
                reason: format!("expiry {} is beyond the configured TTL", entry.expires_at),
            });
        }
        Ok(now < entry.expires_at)
    }

    #[cfg(test)]
    async fn put_raw(&self, key: &str, entry: CacheEntry) {
        *self.slot(key).lock().await = Some(entry);
    }
}
