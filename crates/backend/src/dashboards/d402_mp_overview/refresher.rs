use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use super::service::DashboardService;

/// Периодически пересчитывает дашборд в обход TTL, чтобы запросы
/// пользователей попадали в тёплый кэш.
pub struct DashboardRefresher {
    service: Arc<DashboardService>,
    interval_seconds: u64,
}

impl DashboardRefresher {
    pub fn new(service: Arc<DashboardService>, interval_seconds: u64) -> Self {
        Self {
            service,
            interval_seconds,
        }
    }

    pub async fn run_loop(&self) {
        info!("Dashboard refresher started with interval {} seconds", self.interval_seconds);
        let mut interval = time::interval(time::Duration::from_secs(self.interval_seconds.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.refresh_once().await;
        }
    }

    pub async fn refresh_once(&self) {
        let started = std::time::Instant::now();
        let dashboard = self.service.snapshot(true).await;
        if dashboard.is_partial() {
            let errors = dashboard.wb.errors.len() + dashboard.ozon.errors.len();
            tracing::warn!(
                "Background refresh finished in {} ms with {} source error(s)",
                started.elapsed().as_millis(),
                errors
            );
        } else {
            info!("Background refresh finished in {} ms", started.elapsed().as_millis());
        }
    }
}
