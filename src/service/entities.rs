use regex::Regex;

use super::candidates::{amount_matches, overlaps, DATE};
use crate::models::{Entity, RawToken, Section};

/// 文档索引 - 单次扫描生成，之后只读
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    pub tokens: Vec<RawToken>,
    line_starts: Vec<usize>,
    /// (偏移, 币种代码)，按偏移升序
    pub currency_positions: Vec<(usize, String)>,
}

impl DocumentIndex {
    pub fn build(text: &str, currencies: &[String]) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));

        let mut tokens = Vec::new();
        let mut currency_positions = Vec::new();
        let mut line = 0;
        for (line_start, line_text) in line_starts.iter().zip(text.split('\n')) {
            let mut cursor = 0;
            for word in line_text.split_whitespace() {
                let rel = line_text[cursor..].find(word).map_or(cursor, |p| cursor + p);
                cursor = rel + word.len();
                let char_offset = line_start + rel;

                let bare = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
                // "USD" 或紧贴金额的 "USD1'000.00"
                let currency = currencies.iter().find(|c| {
                    bare == c.as_str()
                        || bare
                            .strip_prefix(c.as_str())
                            .map_or(false, |rest| rest.starts_with(|ch: char| ch.is_ascii_digit()))
                });
                if let Some(code) = currency {
                    let inner = word.find(bare).unwrap_or(0);
                    currency_positions.push((char_offset + inner, code.clone()));
                }

                tokens.push(RawToken {
                    text: word.to_string(),
                    line,
                    char_offset,
                });
            }
            line += 1;
        }

        Self {
            tokens,
            line_starts,
            currency_positions,
        }
    }

    /// 偏移 -> 行号 (0 起)
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// 行首偏移 (超出范围时取最后一行)
    pub fn line_start(&self, line: usize) -> usize {
        self.line_starts[line.min(self.line_starts.len() - 1)]
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_text<'a>(&self, text: &'a str, line: usize) -> &'a str {
        let Some(&start) = self.line_starts.get(line) else {
            return "";
        };
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(text.len());
        text[start..end].trim_end_matches('\r')
    }
}

/// 证券代码提取
pub struct EntityExtractor<'a> {
    pattern: &'a Regex,
    summary_keywords: &'a [Regex],
}

impl<'a> EntityExtractor<'a> {
    pub fn new(pattern: &'a Regex, summary_keywords: &'a [Regex]) -> Self {
        Self {
            pattern,
            summary_keywords,
        }
    }

    /// 全文区分大小写匹配，按出现顺序返回
    pub fn extract(&self, text: &str, index: &DocumentIndex) -> Vec<Entity> {
        self.pattern
            .find_iter(text)
            .map(|m| {
                let line = index.line_of(m.start());
                let context = index.line_text(text, line).trim().to_string();
                let section = self.section_of(text, index, line);
                Entity {
                    code: m.as_str().to_string(),
                    line,
                    offset: m.start(),
                    context,
                    section,
                }
            })
            .collect()
    }

    /// 本行出现汇总关键词，或上一行是不带金额的汇总标题 (如 "Total equities")，即视为汇总区
    ///
    /// 上一行若是自带金额的小计行 ("Total bonds 199'080.00")，它只结束上一个分组，不影响本行。
    fn section_of(&self, text: &str, index: &DocumentIndex, line: usize) -> Section {
        let has_keyword = |l: &str| self.summary_keywords.iter().any(|k| k.is_match(l));

        let own = index.line_text(text, line);
        let in_summary = has_keyword(own)
            || (line > 0 && {
                let previous = index.line_text(text, line - 1);
                has_keyword(previous) && !carries_amount(previous)
            });

        if in_summary {
            Section::Summary
        } else {
            Section::LineItem
        }
    }
}

/// 行内是否有日期以外的金额
fn carries_amount(line: &str) -> bool {
    let dates: Vec<(usize, usize)> = DATE.find_iter(line).map(|m| (m.start(), m.end())).collect();
    amount_matches(line).any(|m| !dates.iter().any(|&d| overlaps(d, (m.start(), m.end()))))
}

/// 关键词 -> 不区分大小写的整词正则
pub fn keyword_patterns(keywords: &[String]) -> Vec<Regex> {
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .filter_map(|k| {
            let escaped = regex::escape(k.trim()).replace(' ', r"\s+");
            Regex::new(&format!(r"(?i)\b{}\b", escaped)).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isin() -> Regex {
        Regex::new(r"\b[A-Z]{2}[A-Z0-9]{9}[0-9]\b").unwrap()
    }

    fn currencies() -> Vec<String> {
        vec!["USD".to_string(), "CHF".to_string()]
    }

    #[test]
    fn index_records_lines_and_offsets() {
        let text = "first line\n  second USD 12\nthird";
        let index = DocumentIndex::build(text, &currencies());

        assert_eq!(index.line_count(), 3);
        assert_eq!(index.line_of(0), 0);
        assert_eq!(index.line_of(11), 1);
        assert_eq!(index.line_of(text.len() - 1), 2);
        assert_eq!(index.line_text(text, 1), "  second USD 12");

        let second = &index.tokens[2];
        assert_eq!(second.text, "second");
        assert_eq!(second.line, 1);
        assert_eq!(&text[second.char_offset..second.char_offset + 6], "second");

        assert_eq!(index.currency_positions, vec![(20, "USD".to_string())]);
    }

    #[test]
    fn currency_glued_to_punctuation_is_found() {
        let text = "(CHF) 1'000";
        let index = DocumentIndex::build(text, &currencies());
        assert_eq!(index.currency_positions, vec![(1, "CHF".to_string())]);
    }

    #[test]
    fn currency_glued_to_amount_is_found() {
        let text = "Notes USD199'080.00 and USDX 5";
        let index = DocumentIndex::build(text, &currencies());
        assert_eq!(index.currency_positions, vec![(6, "USD".to_string())]);
    }

    #[test]
    fn extracts_isin_codes_case_sensitively() {
        let text = "Bond XS2530201644 note\nxs2530201644 lower\nShares CH0244767585";
        let pattern = isin();
        let summary = keyword_patterns(&["total".to_string()]);
        let index = DocumentIndex::build(text, &currencies());
        let entities = EntityExtractor::new(&pattern, &summary).extract(text, &index);

        let codes: Vec<&str> = entities.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["XS2530201644", "CH0244767585"]);
        assert_eq!(entities[0].line, 0);
        assert_eq!(entities[0].offset, 5);
        assert_eq!(entities[0].context, "Bond XS2530201644 note");
        assert_eq!(entities[1].line, 2);
    }

    #[test]
    fn summary_keyword_on_previous_line_marks_summary() {
        let text = "XS2530201644 100'000\nGrand Total\nCH0244767585 200'000";
        let pattern = isin();
        let summary = keyword_patterns(&["grand total".to_string(), "total".to_string()]);
        let index = DocumentIndex::build(text, &currencies());
        let entities = EntityExtractor::new(&pattern, &summary).extract(text, &index);

        assert_eq!(entities[0].section, Section::LineItem);
        assert_eq!(entities[1].section, Section::Summary);
    }

    #[test]
    fn subtotal_row_with_amount_does_not_swallow_next_position() {
        let text = "XS2530201644 Notes 199'080.00 USD\nTotal bonds 199'080.00 USD\nCH0012005267 Novartis 45'310.50\n\
                    Total as of 31.12.2023\nUS0378331005 Apple 195'560.50";
        let pattern = isin();
        let summary = keyword_patterns(&["total".to_string()]);
        let index = DocumentIndex::build(text, &currencies());
        let entities = EntityExtractor::new(&pattern, &summary).extract(text, &index);

        let sections: Vec<Section> = entities.iter().map(|e| e.section).collect();
        assert_eq!(sections, vec![Section::LineItem, Section::LineItem, Section::Summary]);
    }

    #[test]
    fn keyword_patterns_match_whole_words_only() {
        let patterns = keyword_patterns(&["sum".to_string()]);
        assert!(patterns[0].is_match("Sum of positions"));
        assert!(!patterns[0].is_match("Consumer staples"));
    }
}
