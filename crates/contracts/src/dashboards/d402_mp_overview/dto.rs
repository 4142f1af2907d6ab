use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::source_id::SourceId;

/// Ранг сортировки SKU, отсутствующих в таблице алиасов (после всех известных)
pub const UNMAPPED_RANK: u32 = u32::MAX;

/// Query parameters for GET /api/d402/overview
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardQuery {
    /// Bypass the cache and recompute immediately
    #[serde(default, deserialize_with = "lenient_bool")]
    pub force: bool,
}

/// Принимает `true`/`false` и строки "1", "yes", "on" (для query-параметров)
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    })
}

/// Остаток на одном складе
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseQty {
    pub warehouse_name: String,
    pub qty: i64,
}

/// Метрики одного SKU внутри одного источника
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuMetric {
    /// Идентификатор SKU в системе источника (артикул продавца / offer_id)
    pub sku: String,
    pub display_name: String,
    pub sort_rank: u32,
    pub ordered_qty: i64,
    pub purchased_qty: i64,
    /// Всегда равен сумме `warehouse_breakdown`
    pub stock_qty: i64,
    #[serde(default)]
    pub in_transit_to_client: i64,
    #[serde(default)]
    pub in_transit_from_client: i64,
    pub warehouse_breakdown: Vec<WarehouseQty>,
    /// Заказы за сутки по складам, сумма равна `ordered_qty`
    #[serde(default)]
    pub ordered_breakdown: Vec<WarehouseQty>,
    /// Выкупы за сутки по складам, сумма равна `purchased_qty`
    #[serde(default)]
    pub purchased_breakdown: Vec<WarehouseQty>,
}

impl SkuMetric {
    /// Пустая метрика: имя совпадает с SKU, ранг "неизвестный"
    pub fn new(sku: impl Into<String>) -> Self {
        let sku = sku.into();
        Self {
            display_name: sku.clone(),
            sku,
            sort_rank: UNMAPPED_RANK,
            ordered_qty: 0,
            purchased_qty: 0,
            stock_qty: 0,
            in_transit_to_client: 0,
            in_transit_from_client: 0,
            warehouse_breakdown: Vec::new(),
            ordered_breakdown: Vec::new(),
            purchased_breakdown: Vec::new(),
        }
    }

    /// Добавить остаток на складе. Одноимённые склады складываются.
    pub fn add_stock(&mut self, warehouse_name: &str, qty: i64) {
        add_to_breakdown(&mut self.warehouse_breakdown, warehouse_name, qty);
        self.stock_qty += qty;
    }

    /// Добавить заказанное количество со склада отгрузки
    pub fn add_ordered(&mut self, warehouse_name: &str, qty: i64) {
        add_to_breakdown(&mut self.ordered_breakdown, warehouse_name, qty);
        self.ordered_qty += qty;
    }

    /// Добавить выкупленное количество со склада отгрузки
    pub fn add_purchased(&mut self, warehouse_name: &str, qty: i64) {
        add_to_breakdown(&mut self.purchased_breakdown, warehouse_name, qty);
        self.purchased_qty += qty;
    }

    /// Сложить метрики того же SKU из другого аккаунта
    pub fn absorb(&mut self, other: &SkuMetric) {
        self.in_transit_to_client += other.in_transit_to_client;
        self.in_transit_from_client += other.in_transit_from_client;
        for w in &other.warehouse_breakdown {
            self.add_stock(&w.warehouse_name, w.qty);
        }
        for w in &other.ordered_breakdown {
            self.add_ordered(&w.warehouse_name, w.qty);
        }
        for w in &other.purchased_breakdown {
            self.add_purchased(&w.warehouse_name, w.qty);
        }
        // количества, пришедшие без детализации
        self.ordered_qty += other.ordered_qty - breakdown_sum(&other.ordered_breakdown);
        self.purchased_qty += other.purchased_qty - breakdown_sum(&other.purchased_breakdown);
    }

    /// Ключ полного порядка: (ранг, отображаемое имя, исходный SKU)
    pub fn sort_key(&self) -> (u32, &str, &str) {
        (self.sort_rank, self.display_name.as_str(), self.sku.as_str())
    }
}

fn add_to_breakdown(breakdown: &mut Vec<WarehouseQty>, warehouse_name: &str, qty: i64) {
    match breakdown.iter_mut().find(|w| w.warehouse_name == warehouse_name) {
        Some(existing) => existing.qty += qty,
        None => breakdown.push(WarehouseQty {
            warehouse_name: warehouse_name.to_string(),
            qty,
        }),
    }
}

fn breakdown_sum(breakdown: &[WarehouseQty]) -> i64 {
    breakdown.iter().map(|w| w.qty).sum()
}

/// Ошибка одного этапа получения данных
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// Этап: "stocks", "orders", "sales", "config", "timeout", ...
    pub stage: String,
    pub message: String,
    /// Аккаунт-источник ошибки (для Ozon с несколькими магазинами)
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Снимок метрик одного источника
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub source_id: SourceId,
    pub account_id: Option<String>,
    pub metrics: Vec<SkuMetric>,
    pub fetched_at: DateTime<Utc>,
    /// true, если хотя бы один этап/аккаунт был заменён нулями
    pub partial: bool,
    pub errors: Vec<StageError>,
}

impl SourceSnapshot {
    pub fn empty(source_id: SourceId, account_id: Option<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_id,
            account_id,
            metrics: Vec::new(),
            fetched_at,
            partial: false,
            errors: Vec::new(),
        }
    }

    /// Снимок без данных с одной ошибкой (partial = true)
    pub fn failed(
        source_id: SourceId,
        account_id: Option<String>,
        fetched_at: DateTime<Utc>,
        stage: &str,
        message: impl Into<String>,
    ) -> Self {
        let mut snapshot = Self::empty(source_id, account_id.clone(), fetched_at);
        snapshot.record_error(StageError {
            stage: stage.to_string(),
            message: message.into(),
            account_id,
        });
        snapshot
    }

    pub fn record_error(&mut self, error: StageError) {
        self.partial = true;
        self.errors.push(error);
    }

    pub fn total_stock(&self) -> i64 {
        self.metrics.iter().map(|m| m.stock_qty).sum()
    }

    pub fn total_ordered(&self) -> i64 {
        self.metrics.iter().map(|m| m.ordered_qty).sum()
    }

    pub fn total_purchased(&self) -> i64 {
        self.metrics.iter().map(|m| m.purchased_qty).sum()
    }

    pub fn total_in_transit_to_client(&self) -> i64 {
        self.metrics.iter().map(|m| m.in_transit_to_client).sum()
    }

    pub fn total_in_transit_from_client(&self) -> i64 {
        self.metrics.iter().map(|m| m.in_transit_from_client).sum()
    }

    /// Остатки по складам по всем SKU: по убыванию количества, затем по имени
    pub fn warehouse_totals(&self) -> Vec<WarehouseQty> {
        let mut totals: Vec<WarehouseQty> = Vec::new();
        for w in self.metrics.iter().flat_map(|m| m.warehouse_breakdown.iter()) {
            match totals.iter_mut().find(|t| t.warehouse_name == w.warehouse_name) {
                Some(t) => t.qty += w.qty,
                None => totals.push(w.clone()),
            }
        }
        totals.sort_by(|a, b| {
            b.qty
                .cmp(&a.qty)
                .then_with(|| a.warehouse_name.cmp(&b.warehouse_name))
        });
        totals
    }
}

/// Объединённый снимок обоих источников. Принадлежит кэшу.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDashboard {
    pub wb: SourceSnapshot,
    /// Объединено по всем аккаунтам Ozon
    pub ozon: SourceSnapshot,
    pub generated_at: DateTime<Utc>,
    pub cache_hit: bool,
}

impl MergedDashboard {
    pub fn source(&self, source_id: SourceId) -> &SourceSnapshot {
        match source_id {
            SourceId::Wb => &self.wb,
            SourceId::Ozon => &self.ozon,
        }
    }

    /// Снимки в порядке отображения
    pub fn sources(&self) -> [&SourceSnapshot; 2] {
        SourceId::all().map(|id| self.source(id))
    }

    pub fn is_partial(&self) -> bool {
        self.wb.partial || self.ozon.partial
    }
}
