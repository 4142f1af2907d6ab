use async_trait::async_trait;
use chrono::{FixedOffset, SecondsFormat};
use contracts::dashboards::d402_mp_overview::SourceSnapshot;
use contracts::enums::source_id::SourceId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::http::send_json;
use super::{
    AccountConfig, ConfigurationError, LocalDay, SnapshotBuilder, SourceClient, UpstreamError, UNKNOWN_WAREHOUSE,
};

const DEFAULT_BASE_URL: &str = "https://api-seller.ozon.ru";
const PAGE_LIMIT: usize = 1000;
const MAX_PAGES: usize = 50;
/// Возвраты, которые ещё едут от покупателя на склад Ozon
const RETURNS_IN_TRANSIT_STATUS: &str = "MovingToOzon";

pub const STAGE_STOCKS: &str = "stocks";
pub const STAGE_ORDERS: &str = "orders";
pub const STAGE_RETURNS: &str = "returns";

/// Клиент OZON Seller API (FBO), один экземпляр на все магазины
pub struct OzonClient {
    client: reqwest::Client,
    base_url: String,
    page_limit: usize,
    max_pages: usize,
}

impl OzonClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            page_limit: PAGE_LIMIT,
            max_pages: MAX_PAGES,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_paging(mut self, page_limit: usize, max_pages: usize) -> Self {
        self.page_limit = page_limit;
        self.max_pages = max_pages;
        self
    }

    fn post<B: Serialize>(&self, path: &str, client_id: &str, api_key: &str, body: &B) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("Client-Id", client_id)
            .header("Api-Key", api_key)
            .json(body)
    }

    fn truncated(&self, stage: &'static str, received: usize) -> UpstreamError {
        UpstreamError::Incomplete {
            stage,
            message: format!(
                "more than {} pages available, {} rows received",
                self.max_pages, received
            ),
        }
    }

    /// POST /v2/analytics/stock_on_warehouses, постранично по offset
    async fn fetch_stocks(&self, client_id: &str, api_key: &str) -> Result<Vec<OzonStockRow>, UpstreamError> {
        let mut rows = Vec::new();
        for page in 0..self.max_pages {
            let request = OzonStockRequest {
                limit: self.page_limit,
                offset: page * self.page_limit,
                warehouse_type: "ALL".to_string(),
            };
            let response: OzonStockResponse = send_json(
                STAGE_STOCKS,
                self.post("/v2/analytics/stock_on_warehouses", client_id, api_key, &request),
            )
            .await?;
            let received = response.result.rows.len();
            rows.extend(response.result.rows);
            if received < self.page_limit {
                return Ok(rows);
            }
        }
        Err(self.truncated(STAGE_STOCKS, rows.len()))
    }

    /// POST /v2/posting/fbo/list за локальные сутки, постранично по offset
    async fn fetch_postings(
        &self,
        client_id: &str,
        api_key: &str,
        day: &LocalDay,
    ) -> Result<Vec<OzonPosting>, UpstreamError> {
        let mut postings = Vec::new();
        for page in 0..self.max_pages {
            let request = OzonPostingListRequest {
                dir: "ASC".to_string(),
                filter: OzonPostingFilter {
                    since: day.start.to_rfc3339_opts(SecondsFormat::Secs, false),
                    to: day.end.to_rfc3339_opts(SecondsFormat::Secs, false),
                },
                limit: self.page_limit,
                offset: page * self.page_limit,
                with: OzonPostingWith { analytics_data: true },
            };
            let response: OzonPostingListResponse = send_json(
                STAGE_ORDERS,
                self.post("/v2/posting/fbo/list", client_id, api_key, &request),
            )
            .await?;
            let (page_postings, has_next) = response.result.into_page(self.page_limit);
            postings.extend(page_postings);
            if !has_next {
                return Ok(postings);
            }
        }
        Err(self.truncated(STAGE_ORDERS, postings.len()))
    }

    /// POST /v2/returns/company/fbo: возвраты в пути от покупателя
    async fn fetch_returns(&self, client_id: &str, api_key: &str) -> Result<Vec<OzonReturn>, UpstreamError> {
        let mut returns = Vec::new();
        for page in 0..self.max_pages {
            let request = OzonReturnsRequest {
                filter: OzonReturnsFilter {
                    status: vec![RETURNS_IN_TRANSIT_STATUS.to_string()],
                },
                limit: self.page_limit,
                offset: page * self.page_limit,
            };
            let response: OzonReturnsResponse = send_json(
                STAGE_RETURNS,
                self.post("/v2/returns/company/fbo", client_id, api_key, &request),
            )
            .await?;
            let received = response.result.len();
            returns.extend(response.result);
            if received < self.page_limit {
                return Ok(returns);
            }
        }
        Err(self.truncated(STAGE_RETURNS, returns.len()))
    }
}

#[async_trait]
impl SourceClient for OzonClient {
    fn source_id(&self) -> SourceId {
        SourceId::Ozon
    }

    fn validate(&self, account: &AccountConfig) -> Result<(), ConfigurationError> {
        let client_id = account.credentials.client_id.as_deref().unwrap_or("").trim();
        if client_id.is_empty() {
            return Err(ConfigurationError::MissingCredential {
                account_id: account.account_id.clone(),
                field: "client_id",
            });
        }
        if account.credentials.api_key.trim().is_empty() {
            return Err(ConfigurationError::MissingCredential {
                account_id: account.account_id.clone(),
                field: "api_key",
            });
        }
        if !client_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigurationError::Malformed {
                account_id: account.account_id.clone(),
                message: format!("Client-Id must be numeric, got '{}'", client_id),
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
        let client_id = account.credentials.client_id.as_deref().unwrap_or("").trim();
        let api_key = account.credentials.api_key.trim();
        let day = LocalDay::today(tz);

        let (stocks, postings, returns) = tokio::join!(
            self.fetch_stocks(client_id, api_key),
            self.fetch_postings(client_id, api_key, &day),
            self.fetch_returns(client_id, api_key),
        );

        let mut builder = SnapshotBuilder::new(SourceId::Ozon, &account.account_id);
        let stocks = builder.stage(stocks);
        let postings = builder.stage(postings);
        let returns = builder.stage(returns);
        apply_stocks(&mut builder, account, &stocks);
        apply_postings(&mut builder, account, &postings);
        apply_returns(&mut builder, account, &returns);

        let snapshot = builder.finish();
        tracing::info!(
            "Ozon snapshot for '{}': {} SKUs, stock {}, ordered {}, purchased {}, returning {}, partial={}",
            account.account_id,
            snapshot.metrics.len(),
            snapshot.total_stock(),
            snapshot.total_ordered(),
            snapshot.total_purchased(),
            snapshot.total_in_transit_from_client(),
            snapshot.partial
        );
        Ok(snapshot)
    }
}

fn apply_stocks(builder: &mut SnapshotBuilder, account: &AccountConfig, rows: &[OzonStockRow]) {
    for row in rows {
        if row.item_code.is_empty() || !account.accepts_sku(&row.item_code) {
            continue;
        }
        let metric = builder.metric(&row.item_code);
        if row.free_to_sell_amount != 0 {
            metric.add_stock(&row.warehouse_name, row.free_to_sell_amount);
        }
        metric.in_transit_to_client += row.promised_amount;
    }
}

/// Заказано: все неотменённые отправления; выкуплено: доставленные
fn apply_postings(builder: &mut SnapshotBuilder, account: &AccountConfig, postings: &[OzonPosting]) {
    for posting in postings {
        if posting.status == "cancelled" {
            continue;
        }
        let delivered = posting.status == "delivered";
        let warehouse = posting.warehouse_name();
        for product in &posting.products {
            if !account.accepts_sku(&product.offer_id) {
                continue;
            }
            let metric = builder.metric(&product.offer_id);
            metric.add_ordered(warehouse, product.quantity);
            if delivered {
                metric.add_purchased(warehouse, product.quantity);
            }
        }
    }
}

fn apply_returns(builder: &mut SnapshotBuilder, account: &AccountConfig, returns: &[OzonReturn]) {
    for product in returns.iter().flat_map(|r| r.products.iter()) {
        if product.offer_id.is_empty() || !account.accepts_sku(&product.offer_id) {
            continue;
        }
        builder.metric(&product.offer_id).in_transit_from_client += product.quantity;
    }
}

// ============================================================================
// Request/Response structures
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct OzonStockRequest {
    limit: usize,
    offset: usize,
    warehouse_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonStockResponse {
    pub result: OzonStockResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonStockResult {
    #[serde(default)]
    pub rows: Vec<OzonStockRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonStockRow {
    #[serde(default)]
    pub sku: i64,
    /// offer_id продавца
    #[serde(default)]
    pub item_code: String,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub free_to_sell_amount: i64,
    #[serde(default)]
    pub promised_amount: i64,
    #[serde(default)]
    pub reserved_amount: i64,
    #[serde(default)]
    pub warehouse_name: String,
}

#[derive(Debug, Clone, Serialize)]
struct OzonPostingListRequest {
    dir: String,
    filter: OzonPostingFilter,
    limit: usize,
    offset: usize,
    with: OzonPostingWith,
}

#[derive(Debug, Clone, Serialize)]
struct OzonPostingWith {
    analytics_data: bool,
}

#[derive(Debug, Clone, Serialize)]
struct OzonPostingFilter {
    since: String,
    to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonPostingListResponse {
    pub result: OzonPostingListResult,
}

/// v2 отдаёт массив, v3: объект с `has_next`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OzonPostingListResult {
    Flat(Vec<OzonPosting>),
    Paged {
        #[serde(default)]
        postings: Vec<OzonPosting>,
        #[serde(default)]
        has_next: bool,
    },
}

impl OzonPostingListResult {
    fn into_page(self, limit: usize) -> (Vec<OzonPosting>, bool) {
        match self {
            OzonPostingListResult::Paged { postings, has_next } => (postings, has_next),
            OzonPostingListResult::Flat(postings) => {
                let full = postings.len() >= limit;
                (postings, full)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonPosting {
    #[serde(default)]
    pub posting_number: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub products: Vec<OzonPostingProduct>,
    #[serde(default)]
    pub analytics_data: Option<OzonPostingAnalytics>,
}

impl OzonPosting {
    fn warehouse_name(&self) -> &str {
        self.analytics_data
            .as_ref()
            .and_then(|a| a.warehouse_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_WAREHOUSE)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonPostingAnalytics {
    #[serde(default)]
    pub warehouse_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonPostingProduct {
    pub offer_id: String,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
struct OzonReturnsRequest {
    filter: OzonReturnsFilter,
    limit: usize,
    offset: usize,
}

#[derive(Debug, Clone, Serialize)]
struct OzonReturnsFilter {
    status: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonReturnsResponse {
    #[serde(default)]
    pub result: Vec<OzonReturn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonReturn {
    #[serde(default)]
    pub products: Vec<OzonReturnProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OzonReturnProduct {
    #[serde(default)]
    pub offer_id: String,
    #[serde(default)]
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::marketplaces::{mock_server, Credentials};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn account(filter: Option<Vec<&str>>) -> AccountConfig {
        AccountConfig {
            account_id: "shop-1".into(),
            credentials: Credentials {
                client_id: Some("12345".into()),
                api_key: "key".into(),
            },
            sku_filter: filter.map(|f| f.into_iter().map(String::from).collect()),
        }
    }

    #[test]
    fn test_stock_rows_grouped_by_offer() {
        let response: OzonStockResponse = serde_json::from_value(json!({
            "result": {"rows": [
                {"sku": 1, "item_code": "101", "item_name": "Пакеты", "free_to_sell_amount": 10,
                 "promised_amount": 1, "reserved_amount": 3, "warehouse_name": "Склад 1"},
                {"sku": 1, "item_code": "101", "free_to_sell_amount": 4, "warehouse_name": "Склад 2"},
                {"sku": 2, "item_code": "102", "free_to_sell_amount": 5, "warehouse_name": "Склад 2"}
            ]}
        }))
        .unwrap();

        let mut builder = SnapshotBuilder::new(SourceId::Ozon, "shop-1");
        apply_stocks(&mut builder, &account(None), &response.result.rows);
        let snapshot = builder.finish();

        assert_eq!(snapshot.metrics.len(), 2);
        assert_eq!(snapshot.metrics[0].sku, "101");
        assert_eq!(snapshot.metrics[0].stock_qty, 14);
        assert_eq!(snapshot.metrics[0].in_transit_to_client, 1);
        assert_eq!(snapshot.metrics[1].stock_qty, 5);
        assert_eq!(snapshot.total_stock(), 19);
    }

    #[test]
    fn test_postings_counted_by_status() {
        let response: OzonPostingListResponse = serde_json::from_value(json!({
            "result": [
                {"posting_number": "1", "status": "awaiting_deliver", "products": [{"offer_id": "101", "quantity": 2}]},
                {"posting_number": "2", "status": "delivered", "products": [{"offer_id": "101", "quantity": 1}, {"offer_id": "201", "quantity": 3}]},
                {"posting_number": "3", "status": "cancelled", "products": [{"offer_id": "101", "quantity": 5}]}
            ]
        }))
        .unwrap();
        let (postings, has_next) = response.result.into_page(1000);
        assert!(!has_next);

        let mut builder = SnapshotBuilder::new(SourceId::Ozon, "shop-1");
        apply_postings(&mut builder, &account(Some(vec!["101"])), &postings);
        let snapshot = builder.finish();

        assert_eq!(snapshot.metrics.len(), 1);
        assert_eq!(snapshot.metrics[0].ordered_qty, 3);
        assert_eq!(snapshot.metrics[0].purchased_qty, 1);
    }

    #[test]
    fn test_paged_posting_result() {
        let response: OzonPostingListResponse = serde_json::from_value(json!({
            "result": {"postings": [{"status": "delivered", "products": []}], "has_next": true}
        }))
        .unwrap();
        let (postings, has_next) = response.result.into_page(1000);
        assert_eq!(postings.len(), 1);
        assert!(has_next);
    }

    #[test]
    fn test_validate_requires_client_id_and_key() {
        let client = OzonClient::new(None, Duration::from_secs(5)).unwrap();
        let mut acc = account(None);
        assert!(client.validate(&acc).is_ok());

        acc.credentials.client_id = None;
        assert!(matches!(
            client.validate(&acc),
            Err(ConfigurationError::MissingCredential { field: "client_id", .. })
        ));

        acc.credentials.client_id = Some("abc".into());
        assert!(matches!(client.validate(&acc), Err(ConfigurationError::Malformed { .. })));

        acc.credentials.client_id = Some("1".into());
        acc.credentials.api_key = String::new();
        assert!(matches!(
            client.validate(&acc),
            Err(ConfigurationError::MissingCredential { field: "api_key", .. })
        ));
    }

    #[test]
    fn test_posting_detail_per_warehouse() {
        let response: OzonPostingListResponse = serde_json::from_value(json!({
            "result": [
                {"status": "delivering", "analytics_data": {"warehouse_name": "Хоругвино"},
                 "products": [{"offer_id": "101", "quantity": 2}]},
                {"status": "delivered", "analytics_data": {"warehouse_name": "Хоругвино"},
                 "products": [{"offer_id": "101", "quantity": 1}]},
                {"status": "delivered", "analytics_data": {"warehouse_name": " "},
                 "products": [{"offer_id": "101", "quantity": 1}]}
            ]
        }))
        .unwrap();
        let (postings, _) = response.result.into_page(1000);

        let mut builder = SnapshotBuilder::new(SourceId::Ozon, "shop-1");
        apply_postings(&mut builder, &account(None), &postings);
        let metric = &builder.finish().metrics[0];

        assert_eq!(metric.ordered_qty, 4);
        assert_eq!(metric.purchased_qty, 2);
        let ordered: Vec<(&str, i64)> = metric
            .ordered_breakdown
            .iter()
            .map(|w| (w.warehouse_name.as_str(), w.qty))
            .collect();
        assert_eq!(ordered, vec![("Хоругвино", 3), (UNKNOWN_WAREHOUSE, 1)]);
        assert_eq!(metric.purchased_breakdown.len(), 2);
    }

    #[test]
    fn test_returns_fill_in_transit_from_client() {
        let response: OzonReturnsResponse = serde_json::from_value(json!({
            "result": [
                {"id": 1, "status": "MovingToOzon", "products": [{"offer_id": "101", "quantity": 2}]},
                {"id": 2, "products": [{"offer_id": "101", "quantity": 1}, {"offer_id": "999", "quantity": 4}]},
                {"id": 3, "products": [{"offer_id": "", "quantity": 7}]}
            ]
        }))
        .unwrap();

        let mut builder = SnapshotBuilder::new(SourceId::Ozon, "shop-1");
        apply_returns(&mut builder, &account(Some(vec!["101"])), &response.result);
        let snapshot = builder.finish();

        assert_eq!(snapshot.metrics.len(), 1);
        assert_eq!(snapshot.metrics[0].in_transit_from_client, 3);
        assert_eq!(snapshot.total_in_transit_from_client(), 3);
    }

    fn stock_page(n: usize) -> Value {
        json!({"result": {"rows": [
            {"item_code": "101", "free_to_sell_amount": 1, "warehouse_name": format!("Склад {}", 2 * n)},
            {"item_code": "101", "free_to_sell_amount": 1, "warehouse_name": format!("Склад {}", 2 * n + 1)}
        ]}})
    }

    /// Остатки: полные страницы по 2 строки, после `pages` страниц пусто (None: без конца)
    fn ozon_router(pages: Option<usize>, returns_status: StatusCode) -> Router {
        let served = Arc::new(AtomicUsize::new(0));
        Router::new()
            .route(
                "/v2/analytics/stock_on_warehouses",
                post(move || {
                    let served = served.clone();
                    async move {
                        let n = served.fetch_add(1, Ordering::SeqCst);
                        if pages.is_some_and(|p| n >= p) {
                            return Json(json!({"result": {"rows": []}}));
                        }
                        Json(stock_page(n))
                    }
                }),
            )
            .route("/v2/posting/fbo/list", post(|| async { Json(json!({"result": []})) }))
            .route(
                "/v2/returns/company/fbo",
                post(move || async move {
                    if returns_status.is_success() {
                        (returns_status, Json(json!({"result": [
                            {"products": [{"offer_id": "101", "quantity": 2}]}
                        ]})))
                    } else {
                        (returns_status, Json(json!({"message": "unavailable"})))
                    }
                }),
            )
    }

    fn msk() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    #[tokio::test]
    async fn test_all_stages_drained_from_server() {
        let base_url = mock_server::serve(ozon_router(Some(2), StatusCode::OK)).await;
        let client = OzonClient::new(Some(base_url), Duration::from_secs(5))
            .unwrap()
            .with_paging(2, 5);

        let snapshot = client.fetch(&account(None), msk()).await.unwrap();

        assert!(!snapshot.partial, "{:?}", snapshot.errors);
        assert_eq!(snapshot.total_stock(), 4);
        assert_eq!(snapshot.total_in_transit_from_client(), 2);
    }

    #[tokio::test]
    async fn test_stock_page_cap_marks_snapshot_partial() {
        let base_url = mock_server::serve(ozon_router(None, StatusCode::OK)).await;
        let client = OzonClient::new(Some(base_url), Duration::from_secs(5))
            .unwrap()
            .with_paging(2, 3);

        let snapshot = client.fetch(&account(None), msk()).await.unwrap();

        assert!(snapshot.partial);
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].stage, STAGE_STOCKS);
        assert_eq!(snapshot.errors[0].account_id.as_deref(), Some("shop-1"));
        assert_eq!(snapshot.total_stock(), 0);
        assert_eq!(snapshot.total_in_transit_from_client(), 2);
    }

    #[tokio::test]
    async fn test_returns_failure_keeps_other_stages() {
        let base_url = mock_server::serve(ozon_router(Some(1), StatusCode::SERVICE_UNAVAILABLE)).await;
        let client = OzonClient::new(Some(base_url), Duration::from_secs(5))
            .unwrap()
            .with_paging(2, 5);

        let snapshot = client.fetch(&account(None), msk()).await.unwrap();

        assert!(snapshot.partial);
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].stage, STAGE_RETURNS);
        assert_eq!(snapshot.total_stock(), 2);
        assert_eq!(snapshot.total_in_transit_from_client(), 0);
    }
}
