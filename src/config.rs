use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ExtractError, Result};
use crate::models::StrategyKind;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub pattern_store_path: Option<String>,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            pattern_store_path: None,
            extraction: ExtractionConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 -> holdings.{toml,json,yaml} (可选) -> HOLDINGS__* 环境变量
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .add_source(config::File::with_name("holdings").required(false))
            .add_source(
                config::Environment::with_prefix("HOLDINGS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.extraction.validate()?;
        Ok(app)
    }
}

/// 提取流程参数 (每次调用可整体覆盖，无全局可变状态)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// 实体左右两侧的候选窗口 (字节)
    pub window_radius: usize,
    /// 候选与实体每相隔一行额外计入的距离 (字节)
    pub line_penalty: usize,
    /// 关键词策略的候选邻域 (字节)
    pub context_radius: usize,
    pub min_security_value: f64,
    pub max_security_value: f64,
    /// 策略权重；移除某一项即停用该策略
    pub strategy_weights: BTreeMap<StrategyKind, f64>,
    /// 主导格式无法判定时 Format 策略的置信度乘数
    pub ambiguous_locale_penalty: f64,
    pub fusion: FusionConfig,
    pub outlier: OutlierConfig,
    pub total: TotalConfig,
    pub currencies: Vec<String>,
    pub context_keywords: Vec<String>,
    pub summary_keywords: Vec<String>,
    pub identifier_pattern: String,
    /// 实体数量达到该值时启用 rayon 并行
    pub parallel_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub min_confidence: f64,
    pub agreement_tolerance: f64,
    pub agreement_bonus: f64,
    pub typical_min: f64,
    pub typical_max: f64,
    pub typical_bonus: f64,
    pub round_unit: f64,
    pub non_round_bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub iqr_multiplier: f64,
    pub min_median_ratio: f64,
    pub min_sample: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalConfig {
    /// 关键词合计行里低于该值的数字不视为合计 (如 "Total 3 positions")
    pub min_total_value: f64,
    pub min_repeated_value: f64,
    pub min_repeat_count: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let strategy_weights = BTreeMap::from([
            (StrategyKind::Proximity, 1.5),
            (StrategyKind::Format, 0.6),
            (StrategyKind::ContextKeyword, 0.8),
            (StrategyKind::CurrencyPrefixed, 1.0),
            (StrategyKind::TableRow, 1.2),
            (StrategyKind::KnownValue, 0.7),
        ]);

        Self {
            window_radius: 400,
            line_penalty: 80,
            context_radius: 60,
            min_security_value: 1_000.0,
            max_security_value: 50_000_000.0,
            strategy_weights,
            ambiguous_locale_penalty: 0.8,
            fusion: FusionConfig::default(),
            outlier: OutlierConfig::default(),
            total: TotalConfig::default(),
            currencies: ["CHF", "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "SEK", "NOK", "DKK"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            context_keywords: [
                "market value",
                "marktwert",
                "countervalue",
                "valuation",
                "amount",
                "balance",
                "value",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            summary_keywords: ["grand total", "subtotal", "total", "sum"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            identifier_pattern: r"\b[A-Z]{2}[A-Z0-9]{9}[0-9]\b".to_string(),
            parallel_threshold: 16,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            agreement_tolerance: 0.2,
            agreement_bonus: 0.1,
            typical_min: 10_000.0,
            typical_max: 5_000_000.0,
            typical_bonus: 0.05,
            round_unit: 100_000.0,
            non_round_bonus: 0.05,
        }
    }
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: 3.0,
            min_median_ratio: 3.0,
            min_sample: 4,
        }
    }
}

impl Default for TotalConfig {
    fn default() -> Self {
        Self {
            min_total_value: 1_000.0,
            min_repeated_value: 100_000.0,
            min_repeat_count: 2,
        }
    }
}

impl ExtractionConfig {
    /// 处理开始前校验，任何不合理参数都直接报错
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ExtractError::InvalidConfig(msg));

        if self.window_radius == 0 {
            return invalid("window_radius must be positive".to_string());
        }
        if self.context_radius == 0 {
            return invalid("context_radius must be positive".to_string());
        }
        if !(self.min_security_value.is_finite() && self.min_security_value >= 0.0) {
            return invalid(format!(
                "min_security_value must be a non-negative number, got {}",
                self.min_security_value
            ));
        }
        if !self.max_security_value.is_finite() || self.max_security_value < self.min_security_value {
            return invalid(format!(
                "max_security_value ({}) must not be below min_security_value ({})",
                self.max_security_value, self.min_security_value
            ));
        }
        for (kind, weight) in &self.strategy_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return invalid(format!("weight for strategy '{}' must be non-negative, got {}", kind, weight));
            }
        }
        if !self.strategy_weights.values().any(|w| *w > 0.0) {
            return invalid("at least one strategy needs a positive weight".to_string());
        }
        if !(0.0..=1.0).contains(&self.ambiguous_locale_penalty) {
            return invalid("ambiguous_locale_penalty must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.fusion.min_confidence) {
            return invalid("fusion.min_confidence must be within [0, 1]".to_string());
        }
        if !(self.fusion.agreement_tolerance > 0.0 && self.fusion.agreement_tolerance < 1.0) {
            return invalid("fusion.agreement_tolerance must be within (0, 1)".to_string());
        }
        if self.fusion.typical_min > self.fusion.typical_max {
            return invalid("fusion.typical_min must not exceed fusion.typical_max".to_string());
        }
        if self.fusion.round_unit <= 0.0 {
            return invalid("fusion.round_unit must be positive".to_string());
        }
        if !(self.outlier.iqr_multiplier.is_finite() && self.outlier.iqr_multiplier >= 0.0) {
            return invalid("outlier.iqr_multiplier must be non-negative".to_string());
        }
        if self.outlier.min_median_ratio < 1.0 {
            return invalid("outlier.min_median_ratio must be at least 1".to_string());
        }
        if !(self.total.min_total_value.is_finite() && self.total.min_total_value >= 0.0) {
            return invalid("total.min_total_value must be non-negative".to_string());
        }
        if self.total.min_repeat_count < 2 {
            return invalid("total.min_repeat_count must be at least 2".to_string());
        }
        if let Some(bad) = self
            .currencies
            .iter()
            .find(|c| c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_uppercase()))
        {
            return invalid(format!("currency code '{}' must be three uppercase letters", bad));
        }
        if self.identifier_pattern.trim().is_empty() {
            return invalid("identifier_pattern must not be empty".to_string());
        }
        regex::Regex::new(&self.identifier_pattern)?;

        Ok(())
    }

    /// 某策略的权重 (未配置即为停用)
    pub fn weight(&self, kind: StrategyKind) -> f64 {
        self.strategy_weights.get(&kind).copied().unwrap_or(0.0)
    }
}
