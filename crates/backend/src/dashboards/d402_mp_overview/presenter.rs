use chrono::FixedOffset;
use contracts::dashboards::d402_mp_overview::{
    Banner, ColumnTotals, DashboardView, InTransit, MergedDashboard, SkuMetric, SkuRow, SourceColumn,
    SourceSnapshot, StageError, WarehouseQty,
};

use crate::shared::format::format_number;

pub const NO_BREAKDOWN: &str = "Детализация недоступна";
pub const PARTIAL_BANNER: &str = "Часть данных недоступна, показаны неполные значения";

/// Преобразует снимок в модель отображения. Не ходит ни в сеть, ни в кэш.
pub struct Presenter {
    tz: FixedOffset,
}

impl Presenter {
    pub fn new(tz: FixedOffset) -> Self {
        Self { tz }
    }

    pub fn render_view(&self, dashboard: &MergedDashboard) -> DashboardView {
        let columns: Vec<SourceColumn> = dashboard.sources().into_iter().map(render_column).collect();

        let banner = if dashboard.is_partial() {
            Some(Banner {
                message: PARTIAL_BANNER.to_string(),
                details: dashboard
                    .sources()
                    .into_iter()
                    .flat_map(|s| s.errors.iter().map(move |e| banner_line(s, e)))
                    .collect(),
            })
        } else {
            None
        };

        DashboardView {
            generated_at_local: dashboard
                .generated_at
                .with_timezone(&self.tz)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            cache_hit: dashboard.cache_hit,
            columns,
            banner,
        }
    }
}

fn render_column(snapshot: &SourceSnapshot) -> SourceColumn {
    let totals = ColumnTotals {
        ordered: snapshot.total_ordered(),
        purchased: snapshot.total_purchased(),
        stock: snapshot.total_stock(),
        in_transit_to_client: snapshot.total_in_transit_to_client(),
        in_transit_from_client: snapshot.total_in_transit_from_client(),
    };

    SourceColumn {
        source: snapshot.source_id,
        title: snapshot.source_id.display_name().to_string(),
        stock_label: format_number(totals.stock),
        warehouse_tooltip: tooltip(&snapshot.warehouse_totals()),
        totals,
        rows: snapshot.metrics.iter().map(render_row).collect(),
        partial: snapshot.partial,
        errors: snapshot.errors.clone(),
    }
}

fn render_row(metric: &SkuMetric) -> SkuRow {
    let in_transit = (metric.in_transit_to_client != 0 || metric.in_transit_from_client != 0).then(|| InTransit {
        to_client: metric.in_transit_to_client,
        from_client: metric.in_transit_from_client,
    });

    SkuRow {
        sku: metric.sku.clone(),
        display_name: metric.display_name.clone(),
        ordered: metric.ordered_qty,
        purchased: metric.purchased_qty,
        stock: metric.stock_qty,
        in_transit,
        tooltip: tooltip(&metric.warehouse_breakdown),
        ordered_tooltip: tooltip(&metric.ordered_breakdown),
        purchased_tooltip: tooltip(&metric.purchased_breakdown),
    }
}

fn tooltip(breakdown: &[WarehouseQty]) -> String {
    if breakdown.is_empty() {
        return NO_BREAKDOWN.to_string();
    }
    breakdown
        .iter()
        .map(|w| format!("{}: {}", w.warehouse_name, format_number(w.qty)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn banner_line(snapshot: &SourceSnapshot, error: &StageError) -> String {
    let origin = match &error.account_id {
        Some(account) => format!("{}/{}", snapshot.source_id.code(), account),
        None => snapshot.source_id.code().to_string(),
    };
    format!("{} {}: {}", origin, error.stage, error.message)
}
