use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 数字书写格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    Swiss,         // 1'234'567.89
    International, // 1,234,567.89
    Plain,         // 1234567.89
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swiss => write!(f, "swiss"),
            Self::International => write!(f, "international"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

/// 评分策略标识 (也是 Decision.method 中的标签)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Proximity,
    Format,
    ContextKeyword,
    CurrencyPrefixed,
    TableRow,
    KnownValue,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proximity => "proximity",
            Self::Format => "format",
            Self::ContextKeyword => "context_keyword",
            Self::CurrencyPrefixed => "currency_prefixed",
            Self::TableRow => "table_row",
            Self::KnownValue => "known_value",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 候选金额 - 每个 (实体, 附近数字) 组合生成一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueCandidate {
    pub raw_text: String,
    pub parsed_value: BigDecimal,
    pub line: usize,
    pub offset: usize,
    pub distance_from_entity: usize,
    pub format: NumberFormat,
    pub currency_hint: Option<String>,
}

impl ValueCandidate {
    pub fn end(&self) -> usize {
        self.offset + self.raw_text.len()
    }
}

/// 单个策略对候选的打分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: ValueCandidate,
    pub confidence: f64,
    pub method: StrategyKind,
}

impl ScoredCandidate {
    pub fn new(candidate: &ValueCandidate, confidence: f64, method: StrategyKind) -> Self {
        Self {
            candidate: candidate.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            method,
        }
    }
}
