use bigdecimal::{BigDecimal, Zero};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

use super::candidates::starts_cleanly;
use crate::models::{LocaleDetection, NumberFormat, RawToken};

static SWISS_GROUPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,3}(?:['’]\d{3})+").unwrap());
static INTERNATIONAL_GROUPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+").unwrap());

/// 按文档主导格式解析金额
///
/// 瑞士格式用撇号分组，国际格式用逗号分组，小数点始终是 `.`。
/// 逗号后恰好一个 1-2 位尾组且没有小数点时按小数逗号处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleParser {
    dominant: NumberFormat,
}

impl LocaleParser {
    pub fn new(dominant: NumberFormat) -> Self {
        Self { dominant }
    }

    pub fn dominant(&self) -> NumberFormat {
        self.dominant
    }

    /// 多数投票检测文档主导格式；平票 (含 0:0) 退回国际格式并标记为不明确
    pub fn detect(text: &str) -> LocaleDetection {
        Self::vote(text.split_whitespace())
    }

    /// 同 [`detect`](Self::detect)，直接使用文档索引里的 token
    pub fn detect_tokens(tokens: &[RawToken]) -> LocaleDetection {
        Self::vote(tokens.iter().map(|t| t.text.as_str()))
    }

    fn vote<'t>(words: impl Iterator<Item = &'t str>) -> LocaleDetection {
        let (mut swiss_votes, mut international_votes) = (0, 0);
        for word in words {
            swiss_votes += count_grouped(&SWISS_GROUPED, word);
            international_votes += count_grouped(&INTERNATIONAL_GROUPED, word);
        }

        let (format, ambiguous) = if swiss_votes > international_votes {
            (NumberFormat::Swiss, false)
        } else if international_votes > swiss_votes {
            (NumberFormat::International, false)
        } else {
            (NumberFormat::International, true)
        };

        LocaleDetection {
            format,
            swiss_votes,
            international_votes,
            ambiguous,
        }
    }

    /// 解析失败返回 0，调用方需检查非正数
    pub fn parse(&self, raw: &str) -> BigDecimal {
        let mut cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '\'' | '’' | ' ' | '\u{a0}'))
            .collect();

        if cleaned.contains(',') {
            cleaned = self.resolve_commas(&cleaned);
        }
        if cleaned.is_empty() {
            return BigDecimal::zero();
        }

        BigDecimal::from_str(&cleaned).unwrap_or_else(|_| BigDecimal::zero())
    }

    fn resolve_commas(&self, s: &str) -> String {
        let groups: Vec<&str> = s.split(',').collect();
        let tail = groups.last().copied().unwrap_or_default();
        let tail_digits = tail.split('.').next().unwrap_or_default();

        let thousands = groups[1..].iter().all(|g| g.split('.').next().map_or(false, |d| d.len() == 3));
        if self.dominant == NumberFormat::International || thousands {
            return s.replace(',', "");
        }

        // 1234,56 -> 1234.56
        if groups.len() == 2 && !s.contains('.') && (1..=2).contains(&tail_digits.len()) {
            return s.replace(',', ".");
        }

        s.replace(',', "")
    }

    /// 识别单个数字 token 的书写格式
    pub fn classify(raw: &str) -> NumberFormat {
        if raw.contains('\'') || raw.contains('’') {
            NumberFormat::Swiss
        } else if raw.contains(',') {
            NumberFormat::International
        } else {
            NumberFormat::Plain
        }
    }
}

fn count_grouped(pattern: &Regex, text: &str) -> usize {
    pattern
        .find_iter(text)
        .filter(|m| starts_cleanly(text, m.start()))
        .filter(|m| !text[m.end()..].starts_with(|c: char| c.is_ascii_digit()))
        .count()
}

/// 按指定格式输出金额 (保留两位小数)
pub fn format_amount(value: &BigDecimal, format: NumberFormat) -> String {
    let rendered = value.with_scale(2).to_string();
    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let separator = match format {
        NumberFormat::Swiss => Some('\''),
        NumberFormat::International => Some(','),
        NumberFormat::Plain => None,
    };

    let grouped = match separator {
        Some(sep) => {
            let digits: Vec<char> = int_part.chars().collect();
            let mut out = String::with_capacity(digits.len() + digits.len() / 3);
            for (i, ch) in digits.iter().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    out.push(sep);
                }
                out.push(*ch);
            }
            out
        }
        None => int_part.to_string(),
    };

    format!("{}{}.{}", sign, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_swiss_grouping() {
        let parser = LocaleParser::new(NumberFormat::Swiss);
        assert_eq!(parser.parse("1'234'567.89"), dec("1234567.89"));
        assert_eq!(parser.parse("199’080.00"), dec("199080"));
    }

    #[test]
    fn parses_international_grouping() {
        let parser = LocaleParser::new(NumberFormat::International);
        assert_eq!(parser.parse("1,234,567.89"), dec("1234567.89"));
        assert_eq!(parser.parse("12,50"), dec("1250"));
    }

    #[test]
    fn swiss_document_reads_trailing_comma_pair_as_decimal() {
        let parser = LocaleParser::new(NumberFormat::Swiss);
        assert_eq!(parser.parse("1234,50"), dec("1234.50"));
        assert_eq!(parser.parse("1,234"), dec("1234"));
    }

    #[test]
    fn garbage_parses_to_zero() {
        let parser = LocaleParser::new(NumberFormat::Swiss);
        assert!(parser.parse("n/a").is_zero());
        assert!(parser.parse("").is_zero());
        assert!(parser.parse("1.2.3").is_zero());
    }

    #[test]
    fn detect_majority_swiss() {
        let detection = LocaleParser::detect("a 1'000.00 b 25'300 c 1,200");
        assert_eq!(detection.format, NumberFormat::Swiss);
        assert_eq!(detection.swiss_votes, 2);
        assert_eq!(detection.international_votes, 1);
        assert!(!detection.ambiguous);
    }

    #[test]
    fn token_vote_matches_text_vote() {
        let text = "XS2530201644 USD1'000.00 25'300\nCH0012005267 1,200.50 CHF";
        let index = crate::service::entities::DocumentIndex::build(text, &[]);
        let detection = LocaleParser::detect_tokens(&index.tokens);

        assert_eq!(detection, LocaleParser::detect(text));
        assert_eq!((detection.swiss_votes, detection.international_votes), (2, 1));
    }

    #[test]
    fn detect_tie_falls_back_to_international() {
        let detection = LocaleParser::detect("no grouped numbers here 12345");
        assert_eq!(detection.format, NumberFormat::International);
        assert!(detection.ambiguous);
    }

    #[test]
    fn format_amount_groups_digits() {
        assert_eq!(format_amount(&dec("1234567.891"), NumberFormat::Swiss), "1'234'567.89");
        assert_eq!(format_amount(&dec("1234567"), NumberFormat::International), "1,234,567.00");
        assert_eq!(format_amount(&dec("999"), NumberFormat::Swiss), "999.00");
        assert_eq!(format_amount(&dec("1000"), NumberFormat::Plain), "1000.00");
    }

    proptest! {
        #[test]
        fn locale_round_trip(cents in 0u64..1_000_000_000_000u64, swiss in any::<bool>()) {
            let value = dec(&format!("{}.{:02}", cents / 100, cents % 100));
            let format = if swiss { NumberFormat::Swiss } else { NumberFormat::International };
            let parser = LocaleParser::new(format);
            prop_assert_eq!(parser.parse(&format_amount(&value, format)), value);
        }

        #[test]
        fn parse_never_panics(raw in "\\PC*") {
            let _ = LocaleParser::new(NumberFormat::Swiss).parse(&raw);
            let _ = LocaleParser::new(NumberFormat::International).parse(&raw);
        }
    }
}
