//! XML optimization report parser
//!
//! MT5 exports optimization sweeps as `<Row Pass="N">` elements whose
//! children are either `<Parameter name="...">` entries or metric tags
//! (`Result`, `Trades`, `ProfitFactor`, ...). Tag names go through the
//! shared normalizer, so any element that does not look like a metric
//! becomes a parameter.

use crate::error::{EngineError, EngineResult};
use crate::normalize::RowNormalizer;
use crate::types::ReportRecord;

pub fn parse_optimization(text: &str) -> EngineResult<Vec<ReportRecord>> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| EngineError::Format(format!("invalid XML: {e}")))?;

    let mut records = Vec::new();
    let rows = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("row"));

    for (index, row) in rows.enumerate() {
        let mut norm = RowNormalizer::new();

        if let Some(pass) = row.attribute("Pass").and_then(|s| s.trim().parse().ok()) {
            norm.set_pass(pass);
        }

        for child in row.children().filter(|c| c.is_element()) {
            let value = child.text().unwrap_or("").trim();
            if child.tag_name().name().eq_ignore_ascii_case("parameter") {
                if let Some(name) = child.attribute("name") {
                    norm.push_parameter(name, value);
                }
            } else {
                norm.push(child.tag_name().name(), value);
            }
        }

        records.push(norm.finish(index as i64 + 1));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    #[test]
    fn test_row_without_pass_attribute_falls_back_to_order() {
        let xml = r#"<?xml version="1.0"?>
<Report>
  <Row><Result>10</Result><Trades>2</Trades></Row>
  <Row><Result>20</Result><Trades>4</Trades></Row>
</Report>"#;
        let records = parse_optimization(xml).unwrap();
        assert_eq!(records[0].pass_number, 1);
        assert_eq!(records[1].pass_number, 2);
        assert_eq!(records[1].profit, 20.0);
    }

    #[test]
    fn test_unknown_tags_become_parameters() {
        let xml = r#"<?xml version="1.0"?>
<Report>
  <Row Pass="4">
    <Result>15.5</Result>
    <Trades>8</Trades>
    <MaPeriod>21</MaPeriod>
    <Timeframe>M15</Timeframe>
  </Row>
</Report>"#;
        let records = parse_optimization(xml).unwrap();
        let record = &records[0];
        assert_eq!(record.pass_number, 4);
        assert_eq!(record.parameters.get("MaPeriod"), Some(&ParamValue::Int(21)));
        assert_eq!(
            record.parameters.get("Timeframe"),
            Some(&ParamValue::Text("M15".to_string()))
        );
    }

    #[test]
    fn test_ragged_row_degrades_not_aborts() {
        // Second row is missing every metric tag; it must still come out as
        // a record, with defaults.
        let xml = r#"<?xml version="1.0"?>
<Report>
  <Row Pass="1"><Result>10</Result><Trades>2</Trades></Row>
  <Row Pass="2"><Parameter name="Lots">0.1</Parameter></Row>
</Report>"#;
        let records = parse_optimization(xml).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].profit, 0.0);
        assert_eq!(records[1].total_trades, 0);
        assert_eq!(
            records[1].parameters.get("Lots"),
            Some(&ParamValue::Float(0.1))
        );
    }

    #[test]
    fn test_sharpe_and_recovery_tags() {
        let xml = r#"<?xml version="1.0"?>
<Report>
  <Row Pass="1">
    <Result>10</Result>
    <Trades>12</Trades>
    <SharpeRatio>-0.4</SharpeRatio>
    <RecoveryFactor>2.1</RecoveryFactor>
  </Row>
</Report>"#;
        let records = parse_optimization(xml).unwrap();
        assert_eq!(records[0].sharpe_ratio, Some(-0.4));
        assert_eq!(records[0].recovery_factor, Some(2.1));
    }
}
