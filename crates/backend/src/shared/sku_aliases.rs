//! Таблица алиасов SKU: отображаемое имя и пользовательский порядок.
//!
//! Таблица неизменяема; замена возможна только целиком через
//! [`AliasResolver::reload`]. Один цикл агрегации работает с одной версией
//! таблицы ([`AliasResolver::table`]).

use contracts::dashboards::d402_mp_overview::{SkuMetric, UNMAPPED_RANK};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AliasRule {
    pub raw_sku: String,
    pub display_name: String,
    pub rank: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AliasTableError {
    #[error("duplicate alias for SKU '{0}'")]
    DuplicateSku(String),

    #[error("rank {rank} of SKU '{raw_sku}' is reserved for unmapped SKUs")]
    ReservedRank { raw_sku: String, rank: u32 },
}

/// Результат разрешения SKU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSku {
    pub display_name: String,
    pub rank: u32,
}

#[derive(Debug, Default)]
pub struct AliasTable {
    rules: HashMap<String, AliasRule>,
}

impl AliasTable {
    pub fn new(rules: Vec<AliasRule>) -> Result<Self, AliasTableError> {
        let mut map = HashMap::with_capacity(rules.len());
        for rule in rules {
            if rule.rank == UNMAPPED_RANK {
                return Err(AliasTableError::ReservedRank {
                    raw_sku: rule.raw_sku,
                    rank: rule.rank,
                });
            }
            if map.contains_key(&rule.raw_sku) {
                return Err(AliasTableError::DuplicateSku(rule.raw_sku));
            }
            map.insert(rule.raw_sku.clone(), rule);
        }
        Ok(Self { rules: map })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Точное совпадение; неизвестный SKU остаётся как есть и уходит в конец
    pub fn resolve(&self, raw_sku: &str) -> ResolvedSku {
        match self.rules.get(raw_sku) {
            Some(rule) => ResolvedSku {
                display_name: rule.display_name.clone(),
                rank: rule.rank,
            },
            None => ResolvedSku {
                display_name: raw_sku.to_string(),
                rank: UNMAPPED_RANK,
            },
        }
    }

    /// Проставить имя/ранг и отсортировать по (ранг, имя, SKU)
    pub fn annotate_and_sort(&self, metrics: &mut [SkuMetric]) {
        for metric in metrics.iter_mut() {
            let resolved = self.resolve(&metric.sku);
            metric.display_name = resolved.display_name;
            metric.sort_rank = resolved.rank;
        }
        metrics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}

/// Разделяемый handle таблицы алиасов
#[derive(Debug)]
pub struct AliasResolver {
    table: RwLock<Arc<AliasTable>>,
}

impl AliasResolver {
    pub fn new(table: AliasTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    /// Текущая версия таблицы
    pub fn table(&self) -> Arc<AliasTable> {
        self.table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn resolve(&self, raw_sku: &str) -> ResolvedSku {
        self.table().resolve(raw_sku)
    }

    /// Атомарная замена таблицы целиком
    pub fn reload(&self, table: AliasTable) {
        let size = table.len();
        *self
            .table
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(table);
        tracing::info!("Alias table reloaded: {} rules", size);
    }
}
