pub mod config;
pub mod format;
pub mod marketplaces;
pub mod sku_aliases;
