use bigdecimal::ToPrimitive;

use crate::config::OutlierConfig;
use crate::models::Decision;

/// 四分位统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    /// 线性插值分位数；输入需已排序且非空
    pub fn from_sorted(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            q1: percentile(values, 0.25),
            median: percentile(values, 0.5),
            q3: percentile(values, 0.75),
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// 过滤结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierSplit {
    pub kept: Vec<Decision>,
    pub rejected: Vec<Decision>,
    pub fence: Option<f64>,
}

/// 基于 IQR 的离群过滤 (只剔除上侧异常值)
///
/// 同时满足以下条件才剔除：超过 `Q3 + k*IQR`、超过 `min_median_ratio * median`、
/// 且融合阶段没有其他候选佐证。
pub struct OutlierFilter<'a> {
    config: &'a OutlierConfig,
}

impl<'a> OutlierFilter<'a> {
    pub fn new(config: &'a OutlierConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, decisions: Vec<Decision>) -> OutlierSplit {
        if decisions.len() < self.config.min_sample {
            return OutlierSplit {
                kept: decisions,
                rejected: Vec::new(),
                fence: None,
            };
        }

        let mut values: Vec<f64> = decisions.iter().filter_map(|d| d.value.to_f64()).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let Some(quartiles) = Quartiles::from_sorted(&values) else {
            return OutlierSplit {
                kept: decisions,
                rejected: Vec::new(),
                fence: None,
            };
        };

        let fence = quartiles.q3 + self.config.iqr_multiplier * quartiles.iqr();
        let ratio_floor = quartiles.median * self.config.min_median_ratio;

        let (rejected, kept): (Vec<Decision>, Vec<Decision>) = decisions.into_iter().partition(|d| {
            let value = d.value.to_f64().unwrap_or(0.0);
            value > fence && value > ratio_floor && !d.corroborated
        });

        for d in &rejected {
            tracing::info!(
                "outlier rejected: {} = {} (fence {:.2}, median {:.2})",
                d.entity_code,
                d.value,
                fence,
                quartiles.median
            );
        }

        OutlierSplit {
            kept,
            rejected,
            fence: Some(fence),
        }
    }
}
