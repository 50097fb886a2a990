use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::NumberFormat;

/// 融合后的最终判定 (每个证券代码最多一条)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub entity_code: String,
    pub value: BigDecimal,
    pub confidence: f64,
    pub method: String,
    pub reasoning: String,
    pub currency: Option<String>,
    pub line: usize,
    pub corroborated: bool, // 是否获得一致性加分 (离群过滤豁免)
}

/// 文档合计金额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTotal {
    pub value: BigDecimal,
    pub confidence: f64,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    External,
    Detected,
}

/// 覆盖率报告
///
/// `coverage_percent = min(sum, ref) / max(sum, ref) * 100`，对少提取和多提取做对称惩罚。
/// 这是一个准确度代理指标，不是 precision/recall。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyReport {
    pub extracted_sum: BigDecimal,
    pub reference_total: Option<BigDecimal>,
    pub reference_source: Option<ReferenceSource>,
    pub coverage_percent: f64,
}

/// 文档主导数字格式的检测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleDetection {
    pub format: NumberFormat,
    pub swiss_votes: usize,
    pub international_votes: usize,
    pub ambiguous: bool,
}

/// 处理过程统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub locale: LocaleDetection,
    pub entity_occurrences: usize,
    pub candidates_considered: usize,
    pub parse_failures: usize,
    pub no_total_found: bool,
}

/// 一次提取的完整输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub decisions: Vec<Decision>,
    pub document_total: Option<DocumentTotal>,
    pub accuracy: Option<AccuracyReport>,
    pub rejected_outliers: Vec<Decision>,
    pub summary_decisions: Vec<Decision>,
    pub unresolved_entities: Vec<String>,
    pub diagnostics: Diagnostics,
}

impl ExtractionResult {
    /// 查找某证券代码的判定
    pub fn decision_for(&self, code: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.entity_code == code)
    }
}
