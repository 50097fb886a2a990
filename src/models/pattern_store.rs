use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Decision;
use crate::error::Result;

/// 已确认的历史金额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownValue {
    pub value: BigDecimal,
    pub confidence: f64,
    pub observations: u32,
}

/// 模式库 - 跨文档积累的提取经验
///
/// 由调用方持久化并以引用方式传入流程；流程内部只读，不存在进程级单例。
/// 每次更新都会产生新版本。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternStore {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub known_values: BTreeMap<String, KnownValue>,
    #[serde(default)]
    pub context_keywords: Vec<String>,
}

impl PatternStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: 0,
            updated_at: now,
            known_values: BTreeMap::new(),
            context_keywords: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn known_value(&self, code: &str) -> Option<&KnownValue> {
        self.known_values.get(code)
    }

    /// 用本次的判定结果生成下一版本 (原库不变)
    pub fn with_decisions(&self, decisions: &[Decision], now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        for d in decisions {
            next.known_values
                .entry(d.entity_code.clone())
                .and_modify(|kv| {
                    kv.value = d.value.clone();
                    kv.confidence = d.confidence;
                    kv.observations += 1;
                })
                .or_insert_with(|| KnownValue {
                    value: d.value.clone(),
                    confidence: d.confidence,
                    observations: 1,
                });
        }
        next.version = self.version + 1;
        next.updated_at = now;
        next
    }
}
