use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use super::candidates::{amount_matches, overlaps, DATE};
use super::entities::DocumentIndex;
use super::locale::LocaleParser;
use crate::config::TotalConfig;
use crate::models::{AccuracyReport, Decision, DocumentTotal, ReferenceSource};

static TOTAL_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:portfolio\s+total|total\s+portfolio|total\s+assets|grand\s+total|total\s+value|total)\b")
        .unwrap()
});

static TOTAL_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btotal\b").unwrap());
static PORTFOLIO_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bportfolio\b").unwrap());
static ASSETS_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bassets\b").unwrap());

/// 合计候选 (检测过程中间结果)
#[derive(Debug, Clone, PartialEq)]
struct TotalCandidate {
    value: BigDecimal,
    confidence: f64,
    sources: Vec<String>,
    first_offset: usize,
}

/// 文档合计检测 - 关键词模式 + 大额重复数字
pub struct TotalDetector<'a> {
    config: &'a TotalConfig,
    parser: LocaleParser,
}

impl<'a> TotalDetector<'a> {
    pub fn new(config: &'a TotalConfig, parser: LocaleParser) -> Self {
        Self { config, parser }
    }

    pub fn detect(&self, text: &str, index: &DocumentIndex) -> Option<DocumentTotal> {
        let mut candidates: BTreeMap<String, TotalCandidate> = BTreeMap::new();

        for candidate in self.keyword_candidates(text, index).into_iter().chain(self.frequency_candidates(text, index)) {
            let key = candidate.value.normalized().to_string();
            match candidates.get_mut(&key) {
                Some(existing) => {
                    existing.confidence = (existing.confidence.max(candidate.confidence) + 0.1).min(0.99);
                    for s in candidate.sources {
                        if !existing.sources.contains(&s) {
                            existing.sources.push(s);
                        }
                    }
                    existing.first_offset = existing.first_offset.min(candidate.first_offset);
                }
                None => {
                    candidates.insert(key, candidate);
                }
            }
        }

        let best = candidates.into_values().reduce(|best, c| {
            let better = c.confidence > best.confidence
                || (c.confidence == best.confidence && c.value > best.value);
            if better {
                c
            } else {
                best
            }
        })?;

        tracing::debug!("document total {} ({:.2}) via {}", best.value, best.confidence, best.sources.join(","));
        Some(DocumentTotal {
            value: best.value,
            confidence: best.confidence,
            source: best.sources.join("+"),
        })
    }

    /// "Total: 19'464'431"、"Total assets as of 31.12.2023 CHF 244'390.50" 等关键词行
    ///
    /// 取关键词之后 (到同一行下一个关键词为止) 的最大金额，日期、百分比和过小的数字不算。
    fn keyword_candidates(&self, text: &str, index: &DocumentIndex) -> Vec<TotalCandidate> {
        let labels: Vec<regex::Match<'_>> = TOTAL_LABEL.find_iter(text).collect();
        let mut out: Vec<TotalCandidate> = Vec::new();

        for (i, label) in labels.iter().enumerate() {
            let line_no = index.line_of(label.start());
            let line = index.line_text(text, line_no);
            let line_start = index.line_start(line_no);
            let line_end = line_start + line.len();
            let segment_end = labels
                .get(i + 1)
                .map(|next| next.start())
                .filter(|next| *next < line_end)
                .unwrap_or(line_end);

            let Some(value) = self.largest_amount(line, line_start, label.end(), segment_end) else {
                tracing::trace!("total label '{}' on line {} has no usable amount", label.as_str(), line_no + 1);
                continue;
            };

            let label_text = label.as_str();
            let mut confidence: f64 = 0.5;
            if TOTAL_WORD.is_match(label_text) {
                confidence += 0.15;
            }
            if PORTFOLIO_WORD.is_match(label_text) || PORTFOLIO_WORD.is_match(line) {
                confidence += 0.2;
            }
            if ASSETS_WORD.is_match(label_text) || ASSETS_WORD.is_match(line) {
                confidence += 0.15;
            }

            out.push(TotalCandidate {
                value,
                confidence: confidence.min(0.99),
                sources: vec![format!("keyword:{}", label_text.to_lowercase())],
                first_offset: label.start(),
            });
        }
        out
    }

    /// 行内 [from, to) 区间 (全文偏移) 的最大有效金额
    fn largest_amount(&self, line: &str, line_start: usize, from: usize, to: usize) -> Option<BigDecimal> {
        let dates: Vec<(usize, usize)> = DATE
            .find_iter(line)
            .map(|m| (line_start + m.start(), line_start + m.end()))
            .collect();

        amount_matches(line)
            .filter(|m| line_start + m.start() >= from && line_start + m.end() <= to)
            .filter(|m| !dates.iter().any(|&d| overlaps(d, (line_start + m.start(), line_start + m.end()))))
            .filter(|m| !line[m.end()..].starts_with('%'))
            .map(|m| self.parser.parse(m.as_str()))
            .filter(|v| v.to_f64().map_or(false, |v| v >= self.config.min_total_value))
            .max()
    }

    /// 至少出现 `min_repeat_count` 次的大额数字
    fn frequency_candidates(&self, text: &str, index: &DocumentIndex) -> Vec<TotalCandidate> {
        let mut seen: BTreeMap<String, (BigDecimal, usize, usize, bool)> = BTreeMap::new();

        for m in amount_matches(text) {
            let value = self.parser.parse(m.as_str());
            if value.to_f64().map_or(true, |v| v < self.config.min_repeated_value) {
                continue;
            }
            let near_total = TOTAL_WORD.is_match(index.line_text(text, index.line_of(m.start())));
            let entry = seen
                .entry(value.normalized().to_string())
                .or_insert_with(|| (value.clone(), 0, m.start(), false));
            entry.1 += 1;
            entry.3 |= near_total;
        }

        seen.into_values()
            .filter(|(_, count, _, _)| *count >= self.config.min_repeat_count)
            .map(|(value, count, first_offset, near_total)| {
                let mut confidence = (0.35 + 0.05 * (count - self.config.min_repeat_count) as f64).min(0.55);
                if near_total {
                    confidence += 0.1;
                }
                TotalCandidate {
                    value,
                    confidence,
                    sources: vec![format!("frequency:{}x", count)],
                    first_offset,
                }
            })
            .collect()
    }
}

/// 覆盖率 = min(sum, ref) / max(sum, ref) * 100
///
/// 对称比值：少提取和多提取同等扣分，仅是准确度的代理指标。
pub fn coverage_percent(extracted_sum: &BigDecimal, reference_total: &BigDecimal) -> f64 {
    let (Some(sum), Some(reference)) = (extracted_sum.to_f64(), reference_total.to_f64()) else {
        return 0.0;
    };
    let hi = sum.max(reference);
    if hi <= 0.0 {
        return 0.0;
    }
    sum.min(reference) / hi * 100.0
}

/// 生成覆盖率报告；外部给定的参考合计优先于检测结果，都没有则返回 None
pub fn accuracy_report(
    decisions: &[Decision],
    detected: Option<&DocumentTotal>,
    external: Option<&BigDecimal>,
) -> Option<AccuracyReport> {
    let (reference, source) = match (external, detected) {
        (Some(ext), _) => (ext.clone(), ReferenceSource::External),
        (None, Some(total)) => (total.value.clone(), ReferenceSource::Detected),
        (None, None) => return None,
    };

    let extracted_sum = decisions
        .iter()
        .fold(BigDecimal::zero(), |acc, d| acc + &d.value);
    let coverage = coverage_percent(&extracted_sum, &reference);

    Some(AccuracyReport {
        extracted_sum,
        reference_total: Some(reference),
        reference_source: Some(source),
        coverage_percent: coverage,
    })
}
