//! Заглушки клиентов источников для тестов агрегатора и кэша

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use contracts::dashboards::d402_mp_overview::{MergedDashboard, SourceSnapshot};
use contracts::enums::source_id::SourceId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::aggregator::{Aggregator, DashboardProducer};
use crate::shared::marketplaces::{
    AccountConfig, ConfigurationError, Credentials, SnapshotBuilder, SourceClient, UpstreamError,
};
use crate::shared::sku_aliases::{AliasResolver, AliasRule, AliasTable};

#[derive(Clone)]
pub enum StubBehavior {
    /// (sku, warehouse, qty)
    Stock(Vec<(String, String, i64)>),
    Transient,
    ConfigError,
    Hang,
}

impl StubBehavior {
    pub fn stock(rows: &[(&str, &str, i64)]) -> Self {
        StubBehavior::Stock(
            rows.iter()
                .map(|(sku, wh, qty)| (sku.to_string(), wh.to_string(), *qty))
                .collect(),
        )
    }
}

#[derive(Clone)]
pub struct StubClient {
    source: SourceId,
    behaviors: HashMap<String, StubBehavior>,
    calls: Arc<AtomicUsize>,
}

impl StubClient {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            behaviors: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with(mut self, account_id: &str, behavior: StubBehavior) -> Self {
        self.behaviors.insert(account_id.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for StubClient {
    fn source_id(&self) -> SourceId {
        self.source
    }

    fn validate(&self, account: &AccountConfig) -> Result<(), ConfigurationError> {
        match self.behaviors.get(&account.account_id) {
            Some(StubBehavior::ConfigError) | None => Err(ConfigurationError::MissingCredential {
                account_id: account.account_id.clone(),
                field: "api_key",
            }),
            Some(_) => Ok(()),
        }
    }

    async fn fetch(
        &self,
        account: &AccountConfig,
        _tz: FixedOffset,
    ) -> Result<SourceSnapshot, ConfigurationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.validate(account)?;
        let mut builder = SnapshotBuilder::new(self.source, &account.account_id);
        match self.behaviors.get(&account.account_id) {
            Some(StubBehavior::Stock(rows)) => {
                for (sku, wh, qty) in rows {
                    builder.metric(sku).add_stock(wh, *qty);
                }
            }
            Some(StubBehavior::Transient) => {
                let _: Vec<u8> = builder.stage(Err(UpstreamError::Transient {
                    stage: "stocks",
                    status: Some(503),
                    message: "Service Unavailable".into(),
                }));
            }
            Some(StubBehavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Some(StubBehavior::ConfigError) | None => {}
        }
        Ok(builder.finish())
    }
}

pub fn account(id: &str) -> AccountConfig {
    AccountConfig {
        account_id: id.to_string(),
        credentials: Credentials {
            client_id: Some("1".into()),
            api_key: "key".into(),
        },
        sku_filter: None,
    }
}

pub fn alias_resolver() -> Arc<AliasResolver> {
    let rules = vec![
        AliasRule {
            raw_sku: "BRACKET".into(),
            display_name: "Кронштейны".into(),
            rank: 0,
        },
        AliasRule {
            raw_sku: "PACK-2".into(),
            display_name: "Пакеты по 2 шт.".into(),
            rank: 2,
        },
    ];
    Arc::new(AliasResolver::new(AliasTable::new(rules).unwrap()))
}

pub fn aggregator(wb: StubClient, ozon: StubClient, ozon_accounts: &[&str]) -> Aggregator {
    Aggregator::new(
        Arc::new(wb),
        Arc::new(ozon),
        account("wb"),
        ozon_accounts.iter().map(|id| account(id)).collect(),
        alias_resolver(),
        FixedOffset::east_opt(3 * 3600).unwrap(),
        Duration::from_millis(200),
    )
}

/// Производитель, считающий вызовы; каждый вызов длится `delay`
pub struct CountingProducer {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl CountingProducer {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay,
        }
    }
}

#[async_trait]
impl DashboardProducer for CountingProducer {
    async fn collect(&self) -> MergedDashboard {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let mut wb = SourceSnapshot::empty(SourceId::Wb, Some("wb".into()), Utc::now());
        wb.metrics.push(contracts::dashboards::d402_mp_overview::SkuMetric::new(format!(
            "run-{}",
            n
        )));
        MergedDashboard {
            wb,
            ozon: SourceSnapshot::empty(SourceId::Ozon, None, Utc::now()),
            generated_at: Utc::now(),
            cache_hit: false,
        }
    }
}
