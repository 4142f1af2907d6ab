use async_trait::async_trait;
use chrono::FixedOffset;
use contracts::dashboards::d402_mp_overview::SourceSnapshot;
use contracts::enums::source_id::SourceId;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use super::http::send_json;
use super::{
    AccountConfig, ConfigurationError, LocalDay, SnapshotBuilder, SourceClient, UpstreamError, UNKNOWN_WAREHOUSE,
};

const DEFAULT_BASE_URL: &str = "https://statistics-api.wildberries.ru";
/// Самая ранняя дата Statistics API: с неё отдаются все остатки
const STOCKS_DATE_FROM: &str = "2019-06-20";
/// Максимум строк в одном ответе; короткая страница последняя
const STOCKS_PAGE_LIMIT: usize = 60_000;
const MAX_STOCK_PAGES: usize = 20;

pub const STAGE_STOCKS: &str = "stocks";
pub const STAGE_ORDERS: &str = "orders";
pub const STAGE_SALES: &str = "sales";

/// Клиент Wildberries Statistics API (один аккаунт)
pub struct WildberriesClient {
    client: reqwest::Client,
    base_url: String,
    stocks_page_limit: usize,
    max_stock_pages: usize,
}

impl WildberriesClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            stocks_page_limit: STOCKS_PAGE_LIMIT,
            max_stock_pages: MAX_STOCK_PAGES,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_paging(mut self, page_limit: usize, max_pages: usize) -> Self {
        self.stocks_page_limit = page_limit;
        self.max_stock_pages = max_pages;
        self
    }

    fn get(&self, path: &str, api_key: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", api_key)
    }

    /// GET /api/v1/supplier/stocks, постранично по lastChangeDate.
    /// Полная страница на последней разрешённой итерации: `Incomplete`.
    async fn fetch_stocks(&self, api_key: &str) -> Result<Vec<WbStockRow>, UpstreamError> {
        let mut date_from = STOCKS_DATE_FROM.to_string();
        let mut all_rows = Vec::new();

        for page in 1..=self.max_stock_pages {
            let rows: Vec<WbStockRow> = send_json(
                STAGE_STOCKS,
                self.get("/api/v1/supplier/stocks", api_key)
                    .query(&[("dateFrom", date_from.as_str())]),
            )
            .await?;
            tracing::debug!("WB stocks page {}: {} rows from {}", page, rows.len(), date_from);

            let is_last_page = rows.len() < self.stocks_page_limit;
            let next_from = rows.last().and_then(|r| r.last_change_date.clone());
            all_rows.extend(rows);

            match next_from {
                Some(next) if !is_last_page && next != date_from => date_from = next,
                _ => return Ok(dedupe_stock_rows(all_rows)),
            }
        }

        Err(UpstreamError::Incomplete {
            stage: STAGE_STOCKS,
            message: format!(
                "more than {} pages of stocks available, {} rows received",
                self.max_stock_pages,
                all_rows.len()
            ),
        })
    }

    /// GET /api/v1/supplier/orders за локальные сутки (flag=1)
    async fn fetch_orders(&self, api_key: &str, day: &LocalDay) -> Result<Vec<WbOrderRow>, UpstreamError> {
        let date = day.date.format("%Y-%m-%d").to_string();
        send_json(
            STAGE_ORDERS,
            self.get("/api/v1/supplier/orders", api_key)
                .query(&[("dateFrom", date.as_str()), ("flag", "1")]),
        )
        .await
    }

    /// GET /api/v1/supplier/sales за локальные сутки (flag=1)
    async fn fetch_sales(&self, api_key: &str, day: &LocalDay) -> Result<Vec<WbSaleRow>, UpstreamError> {
        let date = day.date.format("%Y-%m-%d").to_string();
        send_json(
            STAGE_SALES,
            self.get("/api/v1/supplier/sales", api_key)
                .query(&[("dateFrom", date.as_str()), ("flag", "1")]),
        )
        .await
    }
}

#[async_trait]
impl SourceClient for WildberriesClient {
    fn source_id(&self) -> SourceId {
        SourceId::Wb
    }

    fn validate(&self, account: &AccountConfig) -> Result<(), ConfigurationError> {
        let api_key = account.credentials.api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigurationError::MissingCredential {
                account_id: account.account_id.clone(),
                field: "api_token",
            });
        }
        if !api_key.is_ascii() {
            return Err(ConfigurationError::Malformed {
                account_id: account.account_id.clone(),
                message: "API token must contain only ASCII characters".into(),
            });
        }
        Ok(())
    }

    async fn fetch(
        &self,
        account: &AccountConfig,
        tz: FixedOffset,
    ) -> Result<SourceSnapshot, ConfigurationError> {
        self.validate(account)?;
        let api_key = account.credentials.api_key.trim().replace(['\n', '\r', '\t'], "");
        let day = LocalDay::today(tz);

        let (stocks, orders, sales) = tokio::join!(
            self.fetch_stocks(&api_key),
            self.fetch_orders(&api_key, &day),
            self.fetch_sales(&api_key, &day),
        );

        let mut builder = SnapshotBuilder::new(SourceId::Wb, &account.account_id);
        let stocks = builder.stage(stocks);
        let orders = builder.stage(orders);
        let sales = builder.stage(sales);

        apply_stocks(&mut builder, account, &stocks);
        for ((article, warehouse), count) in count_today(&orders, &day) {
            if account.accepts_sku(&article) {
                builder.metric(&article).add_ordered(&warehouse, count);
            }
        }
        for ((article, warehouse), count) in count_today(&sales, &day) {
            if account.accepts_sku(&article) {
                builder.metric(&article).add_purchased(&warehouse, count);
            }
        }

        let snapshot = builder.finish();
        tracing::info!(
            "WB snapshot: {} SKUs, stock {}, ordered {}, purchased {}, partial={}",
            snapshot.metrics.len(),
            snapshot.total_stock(),
            snapshot.total_ordered(),
            snapshot.total_purchased(),
            snapshot.partial
        );
        Ok(snapshot)
    }
}

/// Повторы строк на границах страниц: последняя версия строки побеждает
fn dedupe_stock_rows(rows: Vec<WbStockRow>) -> Vec<WbStockRow> {
    let mut index: HashMap<(i64, String, String), usize> = HashMap::new();
    let mut unique: Vec<WbStockRow> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = (row.nm_id, row.barcode.clone(), row.warehouse_name.clone());
        match index.get(&key) {
            Some(&i) => unique[i] = row,
            None => {
                index.insert(key, unique.len());
                unique.push(row);
            }
        }
    }
    unique
}

fn apply_stocks(builder: &mut SnapshotBuilder, account: &AccountConfig, rows: &[WbStockRow]) {
    for row in rows {
        if !account.accepts_sku(&row.supplier_article) {
            continue;
        }
        let metric = builder.metric(&row.supplier_article);
        if row.quantity != 0 {
            metric.add_stock(&row.warehouse_name, row.quantity);
        }
        metric.in_transit_to_client += row.in_way_to_client;
        metric.in_transit_from_client += row.in_way_from_client;
    }
}

/// Строка заказа/продажи с датой и srid
trait DatedRow {
    fn date(&self) -> &str;
    fn srid(&self) -> Option<&str>;
    fn article(&self) -> &str;
    fn warehouse(&self) -> &str;
    /// Учитывается ли строка (не отмена, не возврат)
    fn counts(&self) -> bool;
}

/// Количество за сутки по (артикул, склад): без отмен, без повторов srid
fn count_today<R: DatedRow>(rows: &[R], day: &LocalDay) -> BTreeMap<(String, String), i64> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut counts: BTreeMap<(String, String), i64> = BTreeMap::new();
    for row in rows {
        if !row.counts() || !day.contains_timestamp(row.date()) {
            continue;
        }
        if let Some(srid) = row.srid().filter(|s| !s.is_empty()) {
            if !seen.insert(srid) {
                continue;
            }
        }
        let warehouse = match row.warehouse().trim() {
            "" => UNKNOWN_WAREHOUSE,
            name => name,
        };
        *counts
            .entry((row.article().to_string(), warehouse.to_string()))
            .or_insert(0) += 1;
    }
    counts
}

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WbStockRow {
    #[serde(rename = "lastChangeDate", default)]
    pub last_change_date: Option<String>,
    #[serde(rename = "warehouseName", default)]
    pub warehouse_name: String,
    #[serde(rename = "supplierArticle", default)]
    pub supplier_article: String,
    #[serde(rename = "nmId", default)]
    pub nm_id: i64,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(rename = "inWayToClient", default)]
    pub in_way_to_client: i64,
    #[serde(rename = "inWayFromClient", default)]
    pub in_way_from_client: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WbOrderRow {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub srid: Option<String>,
    #[serde(rename = "supplierArticle", default)]
    pub supplier_article: String,
    #[serde(rename = "warehouseName", default)]
    pub warehouse_name: String,
    #[serde(rename = "isCancel", default)]
    pub is_cancel: bool,
}

impl DatedRow for WbOrderRow {
    fn date(&self) -> &str {
        &self.date
    }
    fn srid(&self) -> Option<&str> {
        self.srid.as_deref()
    }
    fn article(&self) -> &str {
        &self.supplier_article
    }
    fn warehouse(&self) -> &str {
        &self.warehouse_name
    }
    fn counts(&self) -> bool {
        !self.is_cancel
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WbSaleRow {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub srid: Option<String>,
    #[serde(rename = "supplierArticle", default)]
    pub supplier_article: String,
    /// "S…": продажа, "R…": возврат
    #[serde(rename = "saleID", default)]
    pub sale_id: Option<String>,
    #[serde(rename = "warehouseName", default)]
    pub warehouse_name: String,
    #[serde(rename = "isCancel", default)]
    pub is_cancel: bool,
}

impl DatedRow for WbSaleRow {
    fn date(&self) -> &str {
        &self.date
    }
    fn srid(&self) -> Option<&str> {
        self.srid.as_deref()
    }
    fn article(&self) -> &str {
        &self.supplier_article
    }
    fn warehouse(&self) -> &str {
        &self.warehouse_name
    }
    fn counts(&self) -> bool {
        let is_return = self.sale_id.as_deref().is_some_and(|id| id.starts_with('R'));
        !self.is_cancel && !is_return
    }
}
