use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::candidates::CandidateExtractor;
use super::entities::{keyword_patterns, DocumentIndex, EntityExtractor};
use super::fusion::EnsembleFusion;
use super::locale::LocaleParser;
use super::outlier::OutlierFilter;
use super::strategies::{panel, registry, score_all, DocumentContext, ScoringStrategy, TableIndex};
use super::totals::{accuracy_report, TotalDetector};
use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::models::{
    Decision, Diagnostics, Entity, ExtractionResult, PatternStore, Section, TableLayout,
};

/// 一份文档的输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub text: String,
    #[serde(default)]
    pub table: Option<TableLayout>,
    #[serde(default)]
    pub reference_total: Option<BigDecimal>,
}

impl DocumentInput {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// 单个实体出现位置的处理结果
#[derive(Debug, Clone)]
struct EntityOutcome {
    entity: Entity,
    decision: Option<Decision>,
    candidates: usize,
    parse_failures: usize,
}

/// 持仓提取服务 - 单文档、无副作用
pub struct HoldingsExtractor {
    config: ExtractionConfig,
    identifier: Regex,
    summary_keywords: Vec<Regex>,
    strategies: Vec<Box<dyn ScoringStrategy>>,
}

impl HoldingsExtractor {
    /// 校验配置并预编译正则
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        let identifier = Regex::new(&config.identifier_pattern)?;
        let summary_keywords = keyword_patterns(&config.summary_keywords);
        let strategies = registry(&config);

        Ok(Self {
            config,
            identifier,
            summary_keywords,
            strategies,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// 完整流程：实体 -> 候选 -> 策略打分 -> 融合 -> 去重 -> 离群过滤 -> 合计与覆盖率
    pub fn extract(&self, input: &DocumentInput, store: Option<&PatternStore>) -> ExtractionResult {
        let text = input.text.as_str();

        // Phase 1: 单次扫描建立索引
        let index = DocumentIndex::build(text, &self.config.currencies);
        let locale = LocaleParser::detect_tokens(&index.tokens);
        if locale.ambiguous {
            tracing::warn!(
                "number format inconclusive (swiss {} vs international {}), falling back to {}",
                locale.swiss_votes,
                locale.international_votes,
                locale.format
            );
        }
        let parser = LocaleParser::new(locale.format);

        let entities = EntityExtractor::new(&self.identifier, &self.summary_keywords).extract(text, &index);
        tracing::info!(
            "document: {} lines, {} entity occurrences, dominant format {}",
            index.line_count(),
            entities.len(),
            locale.format
        );

        // Phase 2: 构建只读上下文
        let mut keywords = self.config.context_keywords.clone();
        if let Some(store) = store {
            keywords.extend(store.context_keywords.iter().cloned());
        }
        let context_keywords = keyword_patterns(&keywords);
        let table = input
            .table
            .as_ref()
            .map(|layout| TableIndex::build(layout, &self.identifier, parser))
            .filter(|table| {
                if table.is_empty() {
                    tracing::warn!("table layout has no row with an identifier, ignoring it");
                }
                !table.is_empty()
            });

        let ctx = DocumentContext {
            text,
            index: &index,
            locale: &locale,
            config: &self.config,
            context_keywords: &context_keywords,
            table: table.as_ref(),
            store,
        };
        let candidate_extractor = CandidateExtractor::new(
            text,
            &index,
            parser,
            &self.identifier,
            &self.config,
        );
        let fusion = EnsembleFusion::new(&self.config);

        // Phase 3: 按实体独立评分 (实体之间无共享状态)
        let process = |entity: &Entity| -> EntityOutcome {
            let batch = candidate_extractor.extract(entity);
            let scored = score_all(&self.strategies, entity, &batch.candidates, &ctx);
            let outcome = fusion.fuse(entity, &scored, &panel(&self.strategies, entity, &ctx));
            tracing::debug!(
                "{} (line {}): {} candidates, {} scores, decision {:?}",
                entity.code,
                entity.line + 1,
                batch.candidates.len(),
                scored.len(),
                outcome.decision.as_ref().map(|d| d.value.to_string())
            );
            EntityOutcome {
                entity: entity.clone(),
                decision: outcome.decision,
                candidates: batch.candidates.len(),
                parse_failures: batch.parse_failures,
            }
        };

        let outcomes: Vec<EntityOutcome> = if entities.len() >= self.config.parallel_threshold {
            entities.par_iter().map(process).collect()
        } else {
            entities.iter().map(process).collect()
        };

        let candidates_considered = outcomes.iter().map(|o| o.candidates).sum();
        let parse_failures = outcomes.iter().map(|o| o.parse_failures).sum();

        // Phase 4: 按代码去重 (最高置信度胜出，同分取先出现者)
        let (line_items, summary_decisions, unresolved) = dedup_by_code(outcomes);
        for code in &unresolved {
            tracing::warn!("{}: no confident candidate", code);
        }

        // Phase 5: 离群过滤
        let split = OutlierFilter::new(&self.config.outlier).apply(line_items);

        // Phase 6: 合计与覆盖率
        let document_total = TotalDetector::new(&self.config.total, parser).detect(text, &index);
        let accuracy = accuracy_report(&split.kept, document_total.as_ref(), input.reference_total.as_ref());

        tracing::info!(
            "extraction finished: {} decisions, {} outliers, {} summary, {} unresolved, coverage {}",
            split.kept.len(),
            split.rejected.len(),
            summary_decisions.len(),
            unresolved.len(),
            accuracy
                .as_ref()
                .map(|a| format!("{:.2}%", a.coverage_percent))
                .unwrap_or_else(|| "n/a".to_string())
        );

        ExtractionResult {
            decisions: split.kept,
            diagnostics: Diagnostics {
                locale,
                entity_occurrences: entities.len(),
                candidates_considered,
                parse_failures,
                no_total_found: document_total.is_none(),
            },
            document_total,
            accuracy,
            rejected_outliers: split.rejected,
            summary_decisions,
            unresolved_entities: unresolved,
        }
    }
}

/// 同一代码多次出现时只保留一条判定；返回 (明细判定, 汇总区判定, 未决代码)
fn dedup_by_code(outcomes: Vec<EntityOutcome>) -> (Vec<Decision>, Vec<Decision>, Vec<String>) {
    let mut best: IndexMap<String, Option<(Decision, Section)>> = IndexMap::new();

    for outcome in outcomes {
        let slot = best.entry(outcome.entity.code.clone()).or_insert(None);
        let Some(decision) = outcome.decision else {
            continue;
        };
        let replace = match slot {
            None => true,
            Some((current, _)) => decision.confidence > current.confidence,
        };
        if replace {
            *slot = Some((decision, outcome.entity.section));
        }
    }

    let mut line_items = Vec::new();
    let mut summary = Vec::new();
    let mut unresolved = Vec::new();
    for (code, slot) in best {
        match slot {
            Some((decision, Section::LineItem)) => line_items.push(decision),
            Some((decision, Section::Summary)) => summary.push(decision),
            None => unresolved.push(code),
        }
    }
    (line_items, summary, unresolved)
}
