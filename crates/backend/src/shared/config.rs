use chrono::FixedOffset;
use serde::Deserialize;

use crate::shared::marketplaces::{AccountConfig, Credentials};
use crate::shared::sku_aliases::AliasRule;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub wildberries: WildberriesConfig,
    #[serde(default)]
    pub ozon: OzonConfig,
    #[serde(default)]
    pub aliases: Vec<AliasRule>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    /// <= 0: кэш отключён, каждый запрос пересчитывается
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: i64,
    /// Граница суток маркетплейсов (МСК = +3)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// 0 = фоновое обновление выключено
    #[serde(default)]
    pub refresh_interval_seconds: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl(),
            utc_offset_hours: default_utc_offset(),
            fetch_timeout_seconds: default_fetch_timeout(),
            refresh_interval_seconds: 0,
        }
    }
}

impl DashboardConfig {
    pub fn timezone(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            anyhow::anyhow!("utc_offset_hours out of range: {}", self.utc_offset_hours)
        })
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WildberriesConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OzonConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub accounts: Vec<OzonAccountEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OzonAccountEntry {
    /// По умолчанию совпадает с client_id
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub skus: Vec<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_cache_ttl() -> i64 {
    1800
}

fn default_utc_offset() -> i32 {
    3
}

fn default_fetch_timeout() -> u64 {
    30
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[server]
port = 3000

[dashboard]
cache_ttl_seconds = 1800
utc_offset_hours = 3
fetch_timeout_seconds = 30
refresh_interval_seconds = 0

[wildberries]
api_token = ""

[ozon]
accounts = []

[[aliases]]
raw_sku = "GOOD-CONDITION-1"
display_name = "Кронштейны для кондиционера"
rank = 0

[[aliases]]
raw_sku = "VALERY-CARDS-1"
display_name = "Карточки для фотосессии"
rank = 1

[[aliases]]
raw_sku = "VALERY-PACK-8-NO-SMELL"
display_name = "Пакеты по 8 шт."
rank = 2

[[aliases]]
raw_sku = "VALERY-PACK-5-NO-SMELL"
display_name = "Пакеты по 5 шт."
rank = 3

[[aliases]]
raw_sku = "VALERY-PACK-2-NO-SMELL"
display_name = "Пакеты по 2 шт."
rank = 4
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
///
/// Secrets from the environment (and `.env`) override the file in both cases.
pub fn load_config() -> anyhow::Result<Config> {
    let mut config = load_file_config()?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

fn load_file_config() -> anyhow::Result<Config> {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                let config: Config = toml::from_str(&contents)?;
                return Ok(config);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    let config: Config = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

impl Config {
    /// Переопределение секретов из переменных окружения.
    ///
    /// `WB_API_TOKEN`; магазины Ozon: `OZON_CLIENT_ID_<i>`, `OZON_API_KEY_<i>`,
    /// `OZON_SKUS_<i>` начиная с 1 до первого пропуска. Если найден хотя бы один
    /// магазин, список из файла заменяется целиком.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("WB_API_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.wildberries.api_token = token;
        }

        let mut accounts = Vec::new();
        for i in 1.. {
            let (Some(client_id), Some(api_key)) = (
                var(&format!("OZON_CLIENT_ID_{i}")).filter(|v| !v.is_empty()),
                var(&format!("OZON_API_KEY_{i}")).filter(|v| !v.is_empty()),
            ) else {
                break;
            };
            let skus = var(&format!("OZON_SKUS_{i}"))
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            accounts.push(OzonAccountEntry {
                account_id: None,
                client_id,
                api_key,
                skus,
            });
        }
        if !accounts.is_empty() {
            tracing::info!("Using {} Ozon account(s) from environment", accounts.len());
            self.ozon.accounts = accounts;
        }
    }

    /// Единственный аккаунт WB
    pub fn wb_account(&self) -> AccountConfig {
        AccountConfig {
            account_id: "wb".to_string(),
            credentials: Credentials {
                client_id: None,
                api_key: self.wildberries.api_token.clone(),
            },
            sku_filter: None,
        }
    }

    pub fn ozon_accounts(&self) -> Vec<AccountConfig> {
        self.ozon
            .accounts
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let account_id = entry
                    .account_id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .or_else(|| Some(entry.client_id.clone()).filter(|id| !id.trim().is_empty()))
                    .unwrap_or_else(|| format!("ozon-{}", i + 1));
                AccountConfig {
                    account_id,
                    credentials: Credentials {
                        client_id: Some(entry.client_id.clone()),
                        api_key: entry.api_key.clone(),
                    },
                    sku_filter: if entry.skus.is_empty() {
                        None
                    } else {
                        Some(entry.skus.clone())
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_loads() {
        let config: Result<Config, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.dashboard.cache_ttl_seconds, 1800);
        assert_eq!(config.aliases.len(), 5);
        assert!(config.ozon.accounts.is_empty());
        assert_eq!(
            config.dashboard.timezone().unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap()
        );
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("[wildberries]\napi_token = \"t\"\n").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.dashboard.fetch_timeout_seconds, 30);
        assert_eq!(config.wb_account().credentials.api_key, "t");
    }

    #[test]
    fn test_env_overrides_ozon_accounts() {
        let vars: HashMap<&str, &str> = [
            ("WB_API_TOKEN", "wb-secret"),
            ("OZON_CLIENT_ID_1", "111"),
            ("OZON_API_KEY_1", "k1"),
            ("OZON_SKUS_1", "A, B,,"),
            ("OZON_CLIENT_ID_2", "222"),
            ("OZON_API_KEY_2", "k2"),
            // gap at 3 stops the scan
            ("OZON_CLIENT_ID_4", "444"),
            ("OZON_API_KEY_4", "k4"),
        ]
        .into_iter()
        .collect();

        let mut config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.wildberries.api_token, "wb-secret");
        let accounts = config.ozon_accounts();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_id, "111");
        assert_eq!(
            accounts[0].sku_filter,
            Some(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(accounts[1].sku_filter, None);
    }

    #[test]
    fn test_file_accounts_kept_without_env() {
        let toml_src = r#"
[[ozon.accounts]]
account_id = "main"
client_id = "1"
api_key = "k"

[[ozon.accounts]]
client_id = ""
api_key = ""
"#;
        let mut config: Config = toml::from_str(toml_src).unwrap();
        config.apply_env_overrides(|_| None);
        let accounts = config.ozon_accounts();
        assert_eq!(accounts[0].account_id, "main");
        assert_eq!(accounts[1].account_id, "ozon-2");
    }
}
