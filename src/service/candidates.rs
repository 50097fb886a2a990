use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use once_cell::sync::Lazy;
use regex::Regex;

use super::entities::DocumentIndex;
use super::locale::LocaleParser;
use crate::config::ExtractionConfig;
use crate::models::{Entity, ValueCandidate};

/// 金额 token：瑞士分组 | 国际分组 | 纯数字，可带小数
///
/// 不带前导 `\b`，起点由 [`starts_cleanly`] 检查，见 [`amount_matches`]。
static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\d{1,3}(?:['’]\d{3})+|\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,4})?").unwrap()
});

pub(crate) static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,2}[./]\d{1,2}[./]\d{2,4}|\d{4}-\d{2}-\d{2})\b").unwrap()
});

/// 数字起点检查：前面不能紧跟数字或字母，
/// 唯一例外是紧贴的三位大写币种前缀 (如 "USD1'000.00")
pub(crate) fn starts_cleanly(text: &str, start: usize) -> bool {
    let before = &text[..start];
    let Some(prev) = before.chars().next_back() else {
        return true;
    };
    if prev.is_ascii_digit() || prev == '_' {
        return false;
    }
    if !prev.is_alphanumeric() {
        return true;
    }

    let letters = before.len() - before.trim_end_matches(|c: char| c.is_ascii_uppercase()).len();
    letters == 3 && !before[..start - 3].ends_with(|c: char| c.is_alphanumeric() || c == '_')
}

/// 文本中所有金额 token (已排除嵌在代码、单词或更长数字中的片段)
pub(crate) fn amount_matches(text: &str) -> impl Iterator<Item = regex::Match<'_>> {
    AMOUNT.find_iter(text).filter(move |m| starts_cleanly(text, m.start()))
}

/// 两个区间是否相交
pub(crate) fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// 单个实体的候选提取结果
#[derive(Debug, Clone, Default)]
pub struct CandidateBatch {
    pub candidates: Vec<ValueCandidate>,
    pub parse_failures: usize,
}

/// 候选金额提取器
pub struct CandidateExtractor<'a> {
    text: &'a str,
    index: &'a DocumentIndex,
    parser: LocaleParser,
    identifier: &'a Regex,
    window_radius: usize,
    line_penalty: usize,
    min_value: f64,
    max_value: f64,
}

impl<'a> CandidateExtractor<'a> {
    pub fn new(
        text: &'a str,
        index: &'a DocumentIndex,
        parser: LocaleParser,
        identifier: &'a Regex,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            text,
            index,
            parser,
            identifier,
            window_radius: config.window_radius,
            line_penalty: config.line_penalty,
            min_value: config.min_security_value,
            max_value: config.max_security_value,
        }
    }

    /// 实体左右 `window_radius` 字节内的所有合理金额
    ///
    /// 距离 = 字节间隔 + 跨行数 * `line_penalty`，超过窗口半径的候选直接丢弃。
    pub fn extract(&self, entity: &Entity) -> CandidateBatch {
        let start = floor_boundary(self.text, entity.offset.saturating_sub(self.window_radius));
        let window_end = ceil_boundary(self.text, (entity.end() + self.window_radius).min(self.text.len()));
        let window = &self.text[start..window_end];

        let blocked: Vec<(usize, usize)> = DATE
            .find_iter(window)
            .chain(self.identifier.find_iter(window))
            .map(|m| (start + m.start(), start + m.end()))
            .collect();

        let mut batch = CandidateBatch::default();
        for m in amount_matches(window) {
            let offset = start + m.start();
            let end = start + m.end();

            if blocked.iter().any(|&b| overlaps(b, (offset, end))) {
                continue;
            }
            if self.text[end..].starts_with('%') {
                continue;
            }

            let raw = m.as_str();
            let value = self.parser.parse(raw);
            if value <= BigDecimal::zero() {
                batch.parse_failures += 1;
                tracing::trace!("discarding unparsable token '{}' near {}", raw, entity.code);
                continue;
            }
            if !self.in_range(&value) {
                continue;
            }

            let line = self.index.line_of(offset);
            let distance = span_distance((entity.offset, entity.end()), (offset, end))
                + self.line_penalty * line.abs_diff(entity.line);
            if distance > self.window_radius {
                continue;
            }

            batch.candidates.push(ValueCandidate {
                raw_text: raw.to_string(),
                parsed_value: value,
                line,
                offset,
                distance_from_entity: distance,
                format: LocaleParser::classify(raw),
                currency_hint: self.nearest_currency(offset, end, start, window_end),
            });
        }

        batch
    }

    fn in_range(&self, value: &BigDecimal) -> bool {
        value
            .to_f64()
            .map_or(false, |v| v >= self.min_value && v <= self.max_value)
    }

    /// 窗口内离候选最近的币种代码
    fn nearest_currency(&self, offset: usize, end: usize, window_start: usize, window_end: usize) -> Option<String> {
        self.index
            .currency_positions
            .iter()
            .filter(|(pos, code)| *pos >= window_start && pos + code.len() <= window_end)
            .min_by_key(|(pos, code)| span_distance((*pos, pos + code.len()), (offset, end)))
            .map(|(_, code)| code.clone())
    }
}

/// 两个区间之间的间隔字节数 (相交为 0)
pub fn span_distance(a: (usize, usize), b: (usize, usize)) -> usize {
    if b.0 >= a.1 {
        b.0 - a.1
    } else if a.0 >= b.1 {
        a.0 - b.1
    } else {
        0
    }
}

pub(crate) fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

pub(crate) fn ceil_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
