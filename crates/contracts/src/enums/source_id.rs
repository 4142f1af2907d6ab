use serde::{Deserialize, Serialize};
use std::fmt;

/// Источник данных дашборда (маркетплейс)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceId {
    #[serde(rename = "WB")]
    Wb,
    #[serde(rename = "OZON")]
    Ozon,
}

impl SourceId {
    /// Получить код источника
    pub fn code(&self) -> &'static str {
        match self {
            SourceId::Wb => "WB",
            SourceId::Ozon => "OZON",
        }
    }

    /// Получить человекочитаемое название
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceId::Wb => "Wildberries",
            SourceId::Ozon => "Ozon",
        }
    }

    /// Все источники в порядке отображения (WB слева, Ozon справа)
    pub fn all() -> [SourceId; 2] {
        [SourceId::Wb, SourceId::Ozon]
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_order_and_codes() {
        let codes: Vec<&str> = SourceId::all().iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec!["WB", "OZON"]);
        assert_eq!(SourceId::Wb.to_string(), "WB");
    }

    #[test]
    fn test_serializes_as_code() {
        assert_eq!(serde_json::to_string(&SourceId::Ozon).unwrap(), "\"OZON\"");
    }
}
