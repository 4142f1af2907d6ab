use anyhow::bail;
use chrono::FixedOffset;
use contracts::dashboards::d402_mp_overview::{DashboardView, MergedDashboard};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;

use super::aggregator::{Aggregator, DashboardProducer};
use super::cache::DashboardCache;
use super::presenter::Presenter;
use crate::shared::config::Config;
use crate::shared::marketplaces::ozon::OzonClient;
use crate::shared::marketplaces::wildberries::WildberriesClient;
use crate::shared::marketplaces::{AccountConfig, SourceClient};
use crate::shared::sku_aliases::{AliasResolver, AliasTable};

pub const CACHE_KEY: &str = "d402:overview";

static SERVICE: OnceCell<Arc<DashboardService>> = OnceCell::new();

/// Кэш + представление для дашборда d402
pub struct DashboardService {
    cache: DashboardCache,
    presenter: Presenter,
}

impl DashboardService {
    pub fn new(producer: Arc<dyn DashboardProducer>, ttl_seconds: i64, tz: FixedOffset) -> Self {
        Self {
            cache: DashboardCache::new(producer, ttl_seconds),
            presenter: Presenter::new(tz),
        }
    }

    /// Собирает клиенты, таблицу алиасов и агрегатор из конфигурации.
    /// Ошибка, если ни один источник не проходит проверку конфигурации.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let tz = config.dashboard.timezone()?;
        let timeout = Duration::from_secs(config.dashboard.fetch_timeout_seconds.max(1));

        let wb_client: Arc<dyn SourceClient> =
            Arc::new(WildberriesClient::new(config.wildberries.base_url.clone(), timeout)?);
        let ozon_client: Arc<dyn SourceClient> = Arc::new(OzonClient::new(config.ozon.base_url.clone(), timeout)?);

        let wb_account = config.wb_account();
        let ozon_accounts = config.ozon_accounts();
        check_sources(wb_client.as_ref(), &wb_account, ozon_client.as_ref(), &ozon_accounts)?;

        let table = AliasTable::new(config.aliases.clone())?;
        tracing::info!("Loaded {} SKU aliases", table.len());

        let aggregator = Aggregator::new(
            wb_client,
            ozon_client,
            wb_account,
            ozon_accounts,
            Arc::new(AliasResolver::new(table)),
            tz,
            timeout,
        );

        Ok(Self::new(Arc::new(aggregator), config.dashboard.cache_ttl_seconds, tz))
    }

    pub async fn snapshot(&self, force: bool) -> MergedDashboard {
        self.cache.get_or_refresh(CACHE_KEY, force).await
    }

    pub async fn get_view(&self, force: bool) -> DashboardView {
        let dashboard = self.snapshot(force).await;
        self.presenter.render_view(&dashboard)
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate(CACHE_KEY).await;
    }
}

/// Проверка учётных данных при старте. Невалидные аккаунты остаются в
/// работе и отображаются как `partial`; отказ только если невалидно всё.
pub fn check_sources(
    wb_client: &dyn SourceClient,
    wb_account: &AccountConfig,
    ozon_client: &dyn SourceClient,
    ozon_accounts: &[AccountConfig],
) -> anyhow::Result<()> {
    let mut valid = 0usize;
    let mut problems = Vec::new();

    let checks = std::iter::once((wb_client, wb_account)).chain(ozon_accounts.iter().map(|a| (ozon_client, a)));
    for (client, account) in checks {
        match client.validate(account) {
            Ok(()) => valid += 1,
            Err(e) => {
                tracing::warn!("{} account '{}': {}", client.source_id(), account.account_id, e);
                problems.push(format!("{}: {}", client.source_id(), e));
            }
        }
    }

    if ozon_accounts.is_empty() {
        tracing::warn!("No Ozon accounts configured");
    }

    if valid == 0 {
        bail!("no marketplace source is configured correctly: {}", problems.join("; "));
    }
    tracing::info!("{} source account(s) passed configuration check", valid);
    Ok(())
}

pub fn install(service: Arc<DashboardService>) -> anyhow::Result<()> {
    SERVICE
        .set(service)
        .map_err(|_| anyhow::anyhow!("dashboard service already initialized"))
}

pub fn instance() -> Option<Arc<DashboardService>> {
    SERVICE.get().cloned()
}
