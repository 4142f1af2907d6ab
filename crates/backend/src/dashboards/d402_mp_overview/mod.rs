pub mod aggregator;
pub mod cache;
pub mod presenter;
pub mod refresher;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;
