use serde::{Deserialize, Serialize};

use super::StageError;
use crate::enums::source_id::SourceId;

/// Response for GET /api/d402/overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    /// Local time of the snapshot, "YYYY-MM-DD HH:MM"
    pub generated_at_local: String,
    pub cache_hit: bool,
    /// Columns in display order: WB left, Ozon right
    pub columns: Vec<SourceColumn>,
    /// Present if any source returned partial data
    pub banner: Option<Banner>,
}

/// Колонка дашборда для одного источника
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub source: SourceId,
    pub title: String,
    pub totals: ColumnTotals,
    /// Остаток с разделителями тысяч, например "12.345"
    pub stock_label: String,
    /// Подсказка со складами по всем SKU
    pub warehouse_tooltip: String,
    pub rows: Vec<SkuRow>,
    pub partial: bool,
    pub errors: Vec<StageError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTotals {
    pub ordered: i64,
    pub purchased: i64,
    pub stock: i64,
    pub in_transit_to_client: i64,
    pub in_transit_from_client: i64,
}

/// Строка SKU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRow {
    pub sku: String,
    pub display_name: String,
    pub ordered: i64,
    pub purchased: i64,
    pub stock: i64,
    /// None, если товаров в пути нет
    pub in_transit: Option<InTransit>,
    /// Детализация по складам, по строке на склад
    pub tooltip: String,
    /// Заказы по складам отгрузки
    #[serde(default)]
    pub ordered_tooltip: String,
    #[serde(default)]
    pub purchased_tooltip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTransit {
    pub to_client: i64,
    pub from_client: i64,
}

/// Non-fatal degradation notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub message: String,
    pub details: Vec<String>,
}
