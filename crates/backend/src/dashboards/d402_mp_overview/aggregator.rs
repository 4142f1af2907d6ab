use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use contracts::dashboards::d402_mp_overview::{MergedDashboard, SkuMetric, SourceSnapshot, StageError};
use contracts::enums::source_id::SourceId;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::shared::marketplaces::error::CONFIG_STAGE;
use crate::shared::marketplaces::{AccountConfig, SourceClient};
use crate::shared::sku_aliases::AliasResolver;

pub const TIMEOUT_STAGE: &str = "timeout";

/// Источник готовых снимков для кэша
#[async_trait]
pub trait DashboardProducer: Send + Sync {
    /// Никогда не завершается ошибкой: сбои видны через `partial`/`errors`
    async fn collect(&self) -> MergedDashboard;
}

/// Сбор метрик со всех аккаунтов и объединение в один снимок
pub struct Aggregator {
    wb_client: Arc<dyn SourceClient>,
    ozon_client: Arc<dyn SourceClient>,
    wb_account: AccountConfig,
    ozon_accounts: Vec<AccountConfig>,
    aliases: Arc<AliasResolver>,
    tz: FixedOffset,
    branch_timeout: Duration,
}

impl Aggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wb_client: Arc<dyn SourceClient>,
        ozon_client: Arc<dyn SourceClient>,
        wb_account: AccountConfig,
        ozon_accounts: Vec<AccountConfig>,
        aliases: Arc<AliasResolver>,
        tz: FixedOffset,
        branch_timeout: Duration,
    ) -> Self {
        Self {
            wb_client,
            ozon_client,
            wb_account,
            ozon_accounts,
            aliases,
            tz,
            branch_timeout,
        }
    }

    /// Одна ветка = один аккаунт. Ошибка конфигурации и таймаут дают
    /// пустой `partial` снимок, соседние ветки не затрагиваются.
    async fn run_branch(&self, client: &dyn SourceClient, account: &AccountConfig) -> SourceSnapshot {
        let source = client.source_id();
        let account_id = Some(account.account_id.clone());

        match tokio::time::timeout(self.branch_timeout, client.fetch(account, self.tz)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                tracing::error!("{} account '{}': configuration error: {}", source, account.account_id, e);
                SourceSnapshot::failed(source, account_id, Utc::now(), CONFIG_STAGE, e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    "{} account '{}': no response within {:?}, branch abandoned",
                    source,
                    account.account_id,
                    self.branch_timeout
                );
                SourceSnapshot::failed(
                    source,
                    account_id,
                    Utc::now(),
                    TIMEOUT_STAGE,
                    format!("no response within {}s", self.branch_timeout.as_secs_f64()),
                )
            }
        }
    }
}

#[async_trait]
impl DashboardProducer for Aggregator {
    async fn collect(&self) -> MergedDashboard {
        let started = std::time::Instant::now();
        let table = self.aliases.table();

        let wb_branch = self.run_branch(self.wb_client.as_ref(), &self.wb_account);
        let ozon_branches = join_all(
            self.ozon_accounts
                .iter()
                .map(|account| self.run_branch(self.ozon_client.as_ref(), account)),
        );
        let (mut wb, ozon_snapshots) = tokio::join!(wb_branch, ozon_branches);

        let mut ozon = if ozon_snapshots.is_empty() {
            SourceSnapshot::failed(
                SourceId::Ozon,
                None,
                Utc::now(),
                CONFIG_STAGE,
                "no Ozon accounts configured",
            )
        } else {
            merge_accounts(SourceId::Ozon, ozon_snapshots)
        };

        table.annotate_and_sort(&mut wb.metrics);
        table.annotate_and_sort(&mut ozon.metrics);

        tracing::info!(
            "Dashboard collected in {} ms: WB {} SKUs (partial={}), Ozon {} SKUs from {} account(s) (partial={})",
            started.elapsed().as_millis(),
            wb.metrics.len(),
            wb.partial,
            ozon.metrics.len(),
            self.ozon_accounts.len(),
            ozon.partial
        );

        MergedDashboard {
            wb,
            ozon,
            generated_at: Utc::now(),
            cache_hit: false,
        }
    }
}

/// Объединение снимков аккаунтов одного источника.
///
/// Количества одного SKU складываются, склады объединяются по точному
/// совпадению имени, `partial`: логическое ИЛИ, ошибки помечаются аккаунтом.
pub fn merge_accounts(source_id: SourceId, snapshots: Vec<SourceSnapshot>) -> SourceSnapshot {
    let fetched_at = snapshots
        .iter()
        .map(|s| s.fetched_at)
        .min()
        .unwrap_or_else(Utc::now);
    let mut merged = SourceSnapshot::empty(source_id, None, fetched_at);
    let mut metrics: BTreeMap<String, SkuMetric> = BTreeMap::new();

    for snapshot in snapshots {
        merged.partial |= snapshot.partial;
        for error in snapshot.errors {
            merged.errors.push(StageError {
                account_id: error.account_id.or_else(|| snapshot.account_id.clone()),
                ..error
            });
        }
        for metric in snapshot.metrics {
            match metrics.get_mut(&metric.sku) {
                Some(existing) => existing.absorb(&metric),
                None => {
                    metrics.insert(metric.sku.clone(), metric);
                }
            }
        }
    }

    merged.metrics = metrics.into_values().collect();
    merged
}
