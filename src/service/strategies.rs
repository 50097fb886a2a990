use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use regex::Regex;
use std::collections::HashMap;

use super::candidates::{amount_matches, ceil_boundary, floor_boundary};
use super::entities::DocumentIndex;
use super::locale::LocaleParser;
use crate::config::ExtractionConfig;
use crate::models::{
    Entity, LocaleDetection, NumberFormat, PatternStore, ScoredCandidate, StrategyKind, TableLayout,
    ValueCandidate,
};

/// 策略共享的只读文档上下文
pub struct DocumentContext<'a> {
    pub text: &'a str,
    pub index: &'a DocumentIndex,
    pub locale: &'a LocaleDetection,
    pub config: &'a ExtractionConfig,
    pub context_keywords: &'a [Regex],
    pub table: Option<&'a TableIndex>,
    pub store: Option<&'a PatternStore>,
}

/// 评分策略
///
/// 每个策略独立给出 [0,1] 置信度；返回 `None` 表示弃权。
/// 策略之间互不依赖，只通过 `ScoredCandidate` 交给融合层。
pub trait ScoringStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// 该策略对此实体是否有发言权；不适用的策略不计入投票分母
    fn applies(&self, _entity: &Entity, _ctx: &DocumentContext<'_>) -> bool {
        true
    }

    fn score(
        &self,
        entity: &Entity,
        candidate: &ValueCandidate,
        ctx: &DocumentContext<'_>,
    ) -> Option<ScoredCandidate>;
}

/// 按权重表注册策略 (权重为 0 或缺失的策略不注册)
pub fn registry(config: &ExtractionConfig) -> Vec<Box<dyn ScoringStrategy>> {
    config
        .strategy_weights
        .iter()
        .filter(|(_, weight)| **weight > 0.0)
        .map(|(kind, _)| -> Box<dyn ScoringStrategy> {
            match kind {
                StrategyKind::Proximity => Box::new(ProximityStrategy {
                    radius: config.window_radius,
                }),
                StrategyKind::Format => Box::new(FormatStrategy {
                    ambiguous_penalty: config.ambiguous_locale_penalty,
                }),
                StrategyKind::ContextKeyword => Box::new(ContextKeywordStrategy {
                    radius: config.context_radius,
                }),
                StrategyKind::CurrencyPrefixed => Box::new(CurrencyPrefixedStrategy),
                StrategyKind::TableRow => Box::new(TableRowStrategy),
                StrategyKind::KnownValue => Box::new(KnownValueStrategy {
                    tolerance: config.fusion.agreement_tolerance,
                }),
            }
        })
        .collect()
}

/// 所有策略对所有候选打分
pub fn score_all(
    strategies: &[Box<dyn ScoringStrategy>],
    entity: &Entity,
    candidates: &[ValueCandidate],
    ctx: &DocumentContext<'_>,
) -> Vec<ScoredCandidate> {
    candidates
        .iter()
        .flat_map(|c| strategies.iter().filter_map(move |s| s.score(entity, c, ctx)))
        .collect()
}

/// 对某实体适用的策略集合
pub fn panel(
    strategies: &[Box<dyn ScoringStrategy>],
    entity: &Entity,
    ctx: &DocumentContext<'_>,
) -> Vec<StrategyKind> {
    strategies
        .iter()
        .filter(|s| s.applies(entity, ctx))
        .map(|s| s.kind())
        .collect()
}

/// 距离越近置信度越高：(1 - d/r)^2，超出半径弃权
pub struct ProximityStrategy {
    pub radius: usize,
}

impl ScoringStrategy for ProximityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Proximity
    }

    fn score(&self, _entity: &Entity, candidate: &ValueCandidate, _ctx: &DocumentContext<'_>) -> Option<ScoredCandidate> {
        if candidate.distance_from_entity > self.radius {
            return None;
        }
        let closeness = 1.0 - candidate.distance_from_entity as f64 / self.radius as f64;
        Some(ScoredCandidate::new(candidate, closeness * closeness, self.kind()))
    }
}

/// 与文档主导格式一致的分组写法加分
pub struct FormatStrategy {
    pub ambiguous_penalty: f64,
}

impl ScoringStrategy for FormatStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Format
    }

    fn score(&self, _entity: &Entity, candidate: &ValueCandidate, ctx: &DocumentContext<'_>) -> Option<ScoredCandidate> {
        let base = match candidate.format {
            NumberFormat::Plain if candidate.raw_text.contains('.') => 0.6,
            NumberFormat::Plain => 0.5,
            f if f == ctx.locale.format => 0.9,
            _ => 0.4,
        };
        let confidence = if ctx.locale.ambiguous {
            base * self.ambiguous_penalty
        } else {
            base
        };
        Some(ScoredCandidate::new(candidate, confidence, self.kind()))
    }
}

/// 候选附近出现 "market value"、"amount" 等词或币种代码时加分
pub struct ContextKeywordStrategy {
    pub radius: usize,
}

impl ScoringStrategy for ContextKeywordStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ContextKeyword
    }

    fn score(&self, _entity: &Entity, candidate: &ValueCandidate, ctx: &DocumentContext<'_>) -> Option<ScoredCandidate> {
        let start = floor_boundary(ctx.text, candidate.offset.saturating_sub(self.radius));
        let end = ceil_boundary(ctx.text, (candidate.end() + self.radius).min(ctx.text.len()));
        let sub_window = &ctx.text[start..end];

        let keyword_hits = ctx.context_keywords.iter().filter(|k| k.is_match(sub_window)).count();
        let currency_hit = ctx
            .index
            .currency_positions
            .iter()
            .any(|(pos, code)| *pos >= start && pos + code.len() <= end);

        let hits = keyword_hits + usize::from(currency_hit);
        if hits == 0 {
            return None;
        }
        let confidence = (0.6 + 0.15 * (hits - 1) as f64).min(0.95);
        Some(ScoredCandidate::new(candidate, confidence, self.kind()))
    }
}

/// 紧贴币种代码的数字 (如 "USD 1'000.00" 或 "1'000.00 USD")
pub struct CurrencyPrefixedStrategy;

impl ScoringStrategy for CurrencyPrefixedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CurrencyPrefixed
    }

    // 全文没有币种代码时弃权不算反对
    fn applies(&self, _entity: &Entity, ctx: &DocumentContext<'_>) -> bool {
        !ctx.index.currency_positions.is_empty()
    }

    fn score(&self, _entity: &Entity, candidate: &ValueCandidate, ctx: &DocumentContext<'_>) -> Option<ScoredCandidate> {
        let before = ctx.text[..candidate.offset].trim_end_matches([' ', '\t']);
        let after = ctx.text[candidate.end()..].trim_start_matches([' ', '\t']);

        let adjacent = ctx.config.currencies.iter().any(|code| {
            let prefixed = before.ends_with(code.as_str())
                && !before[..before.len() - code.len()]
                    .ends_with(|c: char| c.is_ascii_alphanumeric());
            let suffixed = after.starts_with(code.as_str())
                && !after[code.len()..].starts_with(|c: char| c.is_ascii_alphanumeric());
            prefixed || suffixed
        });

        adjacent.then(|| ScoredCandidate::new(candidate, 0.95, self.kind()))
    }
}

/// 表格同一行内的数字单元格
pub struct TableRowStrategy;

impl ScoringStrategy for TableRowStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TableRow
    }

    fn applies(&self, entity: &Entity, ctx: &DocumentContext<'_>) -> bool {
        ctx.table.and_then(|t| t.values_for(&entity.code)).is_some()
    }

    fn score(&self, entity: &Entity, candidate: &ValueCandidate, ctx: &DocumentContext<'_>) -> Option<ScoredCandidate> {
        let values = ctx.table?.values_for(&entity.code)?;
        values
            .iter()
            .any(|v| *v == candidate.parsed_value)
            .then(|| ScoredCandidate::new(candidate, 0.9, self.kind()))
    }
}

/// 与模式库中已确认金额接近
pub struct KnownValueStrategy {
    pub tolerance: f64,
}

impl ScoringStrategy for KnownValueStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::KnownValue
    }

    fn applies(&self, entity: &Entity, ctx: &DocumentContext<'_>) -> bool {
        ctx.store.and_then(|s| s.known_value(&entity.code)).is_some()
    }

    fn score(&self, entity: &Entity, candidate: &ValueCandidate, ctx: &DocumentContext<'_>) -> Option<ScoredCandidate> {
        let known = ctx.store?.known_value(&entity.code)?;
        let diff = relative_diff(&known.value, &candidate.parsed_value)?;
        (diff <= self.tolerance).then(|| ScoredCandidate::new(candidate, 0.85 * (1.0 - diff), self.kind()))
    }
}

/// |a - b| / max(|a|, |b|)
pub fn relative_diff(a: &BigDecimal, b: &BigDecimal) -> Option<f64> {
    let (a, b) = (a.to_f64()?, b.to_f64()?);
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return Some(0.0);
    }
    Some((a - b).abs() / scale)
}

/// 表格索引：证券代码 -> 同行数字单元格的值
#[derive(Debug, Clone, Default)]
pub struct TableIndex {
    rows_by_code: HashMap<String, Vec<BigDecimal>>,
}

impl TableIndex {
    pub fn build(layout: &TableLayout, identifier: &Regex, parser: LocaleParser) -> Self {
        let mut rows_by_code: HashMap<String, Vec<BigDecimal>> = HashMap::new();

        for row in &layout.rows {
            let joined = row.joined_text();
            let codes: Vec<String> = identifier
                .find_iter(&joined)
                .map(|m| m.as_str().to_string())
                .collect();
            if codes.is_empty() {
                continue;
            }

            let values: Vec<BigDecimal> = row
                .cells
                .iter()
                .filter(|cell| !identifier.is_match(&cell.text))
                .filter_map(|cell| amount_matches(cell.text.trim()).next().map(|m| parser.parse(m.as_str())))
                .filter(|v| *v > BigDecimal::zero())
                .collect();

            for code in codes {
                rows_by_code.entry(code).or_default().extend(values.iter().cloned());
            }
        }

        Self { rows_by_code }
    }

    pub fn values_for(&self, code: &str) -> Option<&Vec<BigDecimal>> {
        self.rows_by_code.get(code)
    }

    pub fn is_empty(&self) -> bool {
        self.rows_by_code.is_empty()
    }
}
