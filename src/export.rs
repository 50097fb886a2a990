use std::io::Write;

use crate::models::Decision;

/// 将判定结果写成 CSV (带表头)；写到哪里由调用方决定
pub fn write_decisions_csv<W: Write>(
    writer: W,
    decisions: &[Decision],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["entity_code", "value", "currency", "confidence", "method", "line"])?;

    for d in decisions {
        writer.write_record(&[
            d.entity_code.clone(),
            d.value.to_string(),
            d.currency.clone().unwrap_or_default(),
            format!("{:.3}", d.confidence),
            d.method.clone(),
            (d.line + 1).to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn writes_header_and_rows() {
        let decisions = vec![Decision {
            entity_code: "XS2530201644".to_string(),
            value: BigDecimal::from_str("199080.00").unwrap(),
            confidence: 0.9512,
            method: "proximity+format".to_string(),
            reasoning: "ignored".to_string(),
            currency: Some("USD".to_string()),
            line: 4,
            corroborated: false,
        }];

        let mut buf = Vec::new();
        write_decisions_csv(&mut buf, &decisions).unwrap();
        let csv = String::from_utf8(buf).unwrap();

        assert_eq!(
            csv,
            "entity_code,value,currency,confidence,method,line\nXS2530201644,199080.00,USD,0.951,proximity+format,5\n"
        );
    }
}
