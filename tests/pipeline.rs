use bigdecimal::BigDecimal;
use chrono::Utc;
use holdings_extract::models::{
    KnownValue, NumberFormat, ReferenceSource, TableCell, TableLayout, TableRow,
};
use holdings_extract::{DocumentInput, ExtractError, ExtractionConfig, HoldingsExtractor, PatternStore};
use pretty_assertions::assert_eq;
use std::str::FromStr;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn extractor() -> HoldingsExtractor {
    HoldingsExtractor::new(ExtractionConfig::default()).unwrap()
}

const SWISS_STATEMENT: &str = "Portfolio statement as of 31.12.2023
Position                              Market value
XS2530201644 Goldman Sachs 0% Notes 199'080.00 USD
CH0012005267 Novartis AG registered 45'310.50 CHF
";

/// 40 条相同市值的持仓 + 文末合计行
fn forty_positions() -> String {
    let mut text = String::from("Custody account overview\n");
    for i in 0..40 {
        text.push_str(&format!("CH{:09}{} Fund units 482'500.00 CHF\n", i, i % 10));
    }
    text.push_str("Total: 19'464'431\n");
    text
}

#[test]
fn swiss_statement_assigns_same_line_values() {
    let result = extractor().extract(&DocumentInput::from_text(SWISS_STATEMENT), None);

    let notes = result.decision_for("XS2530201644").unwrap();
    assert_eq!(notes.value, dec("199080.00"));
    assert!(notes.method.contains("proximity"));
    assert!(notes.method.contains("format"));
    assert_eq!(notes.currency.as_deref(), Some("USD"));
    assert_eq!(notes.line, 2);

    let novartis = result.decision_for("CH0012005267").unwrap();
    assert_eq!(novartis.value, dec("45310.50"));
    assert_eq!(result.diagnostics.locale.format, NumberFormat::Swiss);
    assert!(result.unresolved_entities.is_empty());
}

#[test]
fn entity_without_nearby_numbers_stays_unresolved() {
    let text = "Holdings overview\nCH0244767585 Nestle SA registered shares\nNo valuation available\n";
    let result = extractor().extract(&DocumentInput::from_text(text), None);

    assert!(result.decisions.is_empty());
    assert!(result.decision_for("CH0244767585").is_none());
    assert_eq!(result.unresolved_entities, vec!["CH0244767585".to_string()]);
    assert!(result.accuracy.is_none());
    assert!(result.diagnostics.no_total_found);
}

#[test]
fn coverage_against_detected_total_is_not_perfect() {
    let result = extractor().extract(&DocumentInput::from_text(forty_positions()), None);

    assert_eq!(result.decisions.len(), 40);
    assert!(result.rejected_outliers.is_empty());

    let total = result.document_total.as_ref().unwrap();
    assert_eq!(total.value, dec("19464431"));

    let accuracy = result.accuracy.as_ref().unwrap();
    assert_eq!(accuracy.extracted_sum, dec("19300000"));
    assert_eq!(accuracy.reference_source, Some(ReferenceSource::Detected));
    assert!(accuracy.coverage_percent < 100.0);
    assert!((accuracy.coverage_percent - 99.155).abs() < 0.01);
}

#[test]
fn repeated_runs_are_identical() {
    let extractor = extractor();
    let input = DocumentInput::from_text(forty_positions());

    let first = extractor.extract(&input, None);
    let second = extractor.extract(&input, None);
    assert_eq!(first, second);
}

#[test]
fn parallel_and_sequential_paths_agree() {
    let input = DocumentInput::from_text(forty_positions());
    let parallel = extractor().extract(&input, None);

    let sequential_config = ExtractionConfig {
        parallel_threshold: usize::MAX,
        ..Default::default()
    };
    let sequential = HoldingsExtractor::new(sequential_config).unwrap().extract(&input, None);

    assert_eq!(parallel.decisions, sequential.decisions);
    assert_eq!(parallel.accuracy, sequential.accuracy);
}

#[test]
fn repeated_code_is_counted_once() {
    let text = "XS2530201644 Notes 150'250.00 USD
CH0012005267 Novartis 45'310.50 CHF
XS2530201644 Notes (continued) 150'250.00 USD
";
    let result = extractor().extract(&DocumentInput::from_text(text), None);

    let codes: Vec<&str> = result.decisions.iter().map(|d| d.entity_code.as_str()).collect();
    assert_eq!(codes, vec!["XS2530201644", "CH0012005267"]);
    assert_eq!(result.diagnostics.entity_occurrences, 3);
}

#[test]
fn summary_section_is_reported_separately() {
    let text = "XS2530201644 Notes 150'250.00 USD
CH0012005267 Novartis 45'310.50 CHF
Total equities
US0378331005 Apple shares 195'560.50 USD
";
    let result = extractor().extract(&DocumentInput::from_text(text), None);

    let codes: Vec<&str> = result.decisions.iter().map(|d| d.entity_code.as_str()).collect();
    assert_eq!(codes, vec!["XS2530201644", "CH0012005267"]);
    assert_eq!(result.summary_decisions.len(), 1);
    assert_eq!(result.summary_decisions[0].entity_code, "US0378331005");
    assert_eq!(result.summary_decisions[0].value, dec("195560.50"));
}

#[test]
fn subtotal_row_closes_a_group_without_swallowing_the_next_position() {
    let text = "XS2530201644 Notes 199'080.00 USD
Total bonds 199'080.00 USD
CH0012005267 Novartis 45'310.50 CHF
CH0038863350 Nestle 88'120.25 CHF
";
    let result = extractor().extract(&DocumentInput::from_text(text), None);

    let codes: Vec<&str> = result.decisions.iter().map(|d| d.entity_code.as_str()).collect();
    assert_eq!(codes, vec!["XS2530201644", "CH0012005267", "CH0038863350"]);
    assert!(result.summary_decisions.is_empty());
    assert_eq!(result.decision_for("CH0012005267").unwrap().value, dec("45310.50"));
}

#[test]
fn dated_total_line_yields_the_amount() {
    let text = "XS2530201644 Notes 199'080.00 USD
CH0012005267 Novartis 45'310.50 CHF
Total assets as of 31.12.2023 CHF 244'390.50
";
    let result = extractor().extract(&DocumentInput::from_text(text), None);

    let total = result.document_total.as_ref().unwrap();
    assert_eq!(total.value, dec("244390.50"));

    let accuracy = result.accuracy.as_ref().unwrap();
    assert_eq!(accuracy.extracted_sum, dec("244390.50"));
    assert!((accuracy.coverage_percent - 100.0).abs() < 1e-9);
}

#[test]
fn currency_glued_to_amount_is_read_in_full() {
    let text = "XS2530201644 Goldman Sachs Notes USD199'080.00\n";
    let result = extractor().extract(&DocumentInput::from_text(text), None);

    let decision = result.decision_for("XS2530201644").unwrap();
    assert_eq!(decision.value, dec("199080.00"));
    assert!(decision.method.contains("currency_prefixed"));
    assert_eq!(result.diagnostics.parse_failures, 0);
}

#[test]
fn external_reference_total_takes_precedence() {
    let input = DocumentInput {
        text: SWISS_STATEMENT.to_string(),
        table: None,
        reference_total: Some(dec("244390.50")),
    };
    let result = extractor().extract(&input, None);

    let accuracy = result.accuracy.unwrap();
    assert_eq!(accuracy.reference_source, Some(ReferenceSource::External));
    assert_eq!(accuracy.extracted_sum, dec("244390.50"));
    assert!((accuracy.coverage_percent - 100.0).abs() < 1e-9);
}

#[test]
fn table_layout_overrides_nearest_number() {
    let text = "XS2530201644 12'000.00 85'000.00";
    let plain = extractor().extract(&DocumentInput::from_text(text), None);
    assert_eq!(plain.decision_for("XS2530201644").unwrap().value, dec("12000.00"));

    let input = DocumentInput {
        text: text.to_string(),
        table: Some(TableLayout {
            rows: vec![TableRow {
                cells: vec![
                    TableCell { text: "XS2530201644".to_string(), column_index: 0, row_index: 0 },
                    TableCell { text: "85'000.00".to_string(), column_index: 2, row_index: 0 },
                ],
            }],
        }),
        reference_total: None,
    };
    let with_table = extractor().extract(&input, None);
    let decision = with_table.decision_for("XS2530201644").unwrap();
    assert_eq!(decision.value, dec("85000.00"));
    assert!(decision.method.contains("table_row"));
}

#[test]
fn known_value_from_pattern_store_shifts_the_vote() {
    let text = "XS2530201644 12'000.00 85'000.00";
    let mut store = PatternStore::new(Utc::now());
    store.known_values.insert(
        "XS2530201644".to_string(),
        KnownValue {
            value: dec("85000"),
            confidence: 0.9,
            observations: 4,
        },
    );

    let result = extractor().extract(&DocumentInput::from_text(text), Some(&store));
    let decision = result.decision_for("XS2530201644").unwrap();
    assert_eq!(decision.value, dec("85000.00"));
    assert!(decision.method.contains("known_value"));

    // 调用方持久化新版本，原库不变
    let next = store.with_decisions(&result.decisions, Utc::now());
    assert_eq!(next.version, store.version + 1);
    assert_eq!(next.known_value("XS2530201644").unwrap().observations, 5);
    assert_eq!(store.known_value("XS2530201644").unwrap().observations, 4);
}

#[test]
fn mixed_grouping_is_flagged_as_ambiguous() {
    let text = "XS2530201644 Fund A 12'500.00\nCH0012005267 Fund B 4,500.00\n";
    let result = extractor().extract(&DocumentInput::from_text(text), None);

    let locale = &result.diagnostics.locale;
    assert!(locale.ambiguous);
    assert_eq!((locale.swiss_votes, locale.international_votes), (1, 1));
    assert_eq!(locale.format, NumberFormat::International);
}

#[test]
fn invalid_configuration_fails_before_processing() {
    let mut config = ExtractionConfig::default();
    config.fusion.min_confidence = 1.5;
    let err = HoldingsExtractor::new(config).err().unwrap();
    assert!(matches!(err, ExtractError::InvalidConfig(_)));
}
