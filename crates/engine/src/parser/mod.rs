//! MT5 report document parser
//!
//! Turns raw uploaded bytes into [`ReportRecord`]s. Two sub-parsers exist,
//! XML optimization rows and HTML result tables, selected by content
//! sniffing with the declared filename as a tie-breaker only. A mislabeled
//! `.xml` that actually contains HTML still parses: when the primary path
//! yields nothing, the other path gets a try before the upload is rejected.

mod html;
mod xml;

use crate::error::{EngineError, EngineResult};
use crate::types::{BacktestReport, ReportRecord};
use tracing::{debug, info};

/// Closed set of supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Xml,
    Html,
}

impl ReportFormat {
    fn other(self) -> Self {
        match self {
            ReportFormat::Xml => ReportFormat::Html,
            ReportFormat::Html => ReportFormat::Xml,
        }
    }
}

/// Parse an optimization or forward-test report.
///
/// Fails with [`EngineError::Format`] only when neither sub-parser can
/// extract a single row; ragged rows degrade to records with absent metrics.
pub fn parse_report(raw: &[u8], filename: &str) -> EngineResult<Vec<ReportRecord>> {
    let text = decode_text(raw);
    if text.trim().is_empty() {
        return Err(EngineError::Format("empty document".to_string()));
    }

    let primary = sniff_format(&text, filename);
    debug!(?primary, filename, bytes = raw.len(), "parsing report");

    match parse_as(primary, &text) {
        Ok(records) if !records.is_empty() => {
            info!(records = records.len(), format = ?primary, "report parsed");
            Ok(records)
        }
        first_attempt => {
            let fallback = primary.other();
            match parse_as(fallback, &text) {
                Ok(records) if !records.is_empty() => {
                    info!(records = records.len(), format = ?fallback, "report parsed via fallback");
                    Ok(records)
                }
                _ => match first_attempt {
                    Err(e) => Err(e),
                    Ok(_) => Err(EngineError::Format(
                        "no optimization rows found in document".to_string(),
                    )),
                },
            }
        }
    }
}

/// Parse a single-run backtest detail report (HTML).
pub fn parse_backtest(raw: &[u8], filename: &str) -> EngineResult<BacktestReport> {
    let text = decode_text(raw);
    if text.trim().is_empty() {
        return Err(EngineError::Format("empty document".to_string()));
    }
    debug!(filename, bytes = raw.len(), "parsing backtest report");
    html::parse_backtest(&text)
}

fn parse_as(format: ReportFormat, text: &str) -> EngineResult<Vec<ReportRecord>> {
    match format {
        ReportFormat::Xml => xml::parse_optimization(text),
        ReportFormat::Html => html::parse_optimization(text),
    }
}

/// Pick the primary parser path by looking at the content, not the filename.
fn sniff_format(text: &str, filename: &str) -> ReportFormat {
    let head: String = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(512)
        .collect::<String>()
        .to_ascii_lowercase();

    if head.contains("<html") || head.contains("<!doctype html") || head.contains("<table") {
        return ReportFormat::Html;
    }
    if head.starts_with("<?xml") {
        return ReportFormat::Xml;
    }
    // Extension is only a hint for ambiguous content
    if filename.to_ascii_lowercase().ends_with(".xml") {
        ReportFormat::Xml
    } else {
        ReportFormat::Html
    }
}

/// Decode uploaded bytes into text. MT5 writes reports as UTF-16 more often
/// than not; honor the BOM before falling back to lossy UTF-8.
fn decode_text(raw: &[u8]) -> String {
    match raw {
        [0xff, 0xfe, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xfe, 0xff, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8_lossy(raw)
            .trim_start_matches('\u{feff}')
            .to_string(),
    }
}

fn decode_utf16(raw: &[u8], combine: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| combine([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    const XML_REPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Report>
  <Row Pass="1">
    <Parameter name="StopLoss">50</Parameter>
    <Parameter name="TakeProfit">100</Parameter>
    <Result>100.0</Result>
    <Trades>5</Trades>
    <ProfitFactor>1.2</ProfitFactor>
    <Drawdown>10.0</Drawdown>
  </Row>
  <Row Pass="2">
    <Parameter name="StopLoss">60</Parameter>
    <Parameter name="TakeProfit">120</Parameter>
    <Result>500.0</Result>
    <Trades>20</Trades>
    <ProfitFactor>1.8</ProfitFactor>
    <Drawdown>8.0</Drawdown>
  </Row>
  <Row Pass="3">
    <Parameter name="StopLoss">70</Parameter>
    <Parameter name="TakeProfit">140</Parameter>
    <Result>300.0</Result>
    <Trades>15</Trades>
    <ProfitFactor>1.5</ProfitFactor>
    <Drawdown>12.0</Drawdown>
  </Row>
</Report>"#;

    const HTML_REPORT: &str = r#"<html><body>
<table>
  <tr><th>Pass</th><th>Result</th><th>Trades</th><th>Profit Factor</th><th>Drawdown</th><th>StopLoss</th><th>TakeProfit</th></tr>
  <tr><td>1</td><td>100.0</td><td>5</td><td>1.2</td><td>10.0</td><td>50</td><td>100</td></tr>
  <tr><td>2</td><td>500.0</td><td>20</td><td>1.8</td><td>8.0</td><td>60</td><td>120</td></tr>
  <tr><td>3</td><td>300.0</td><td>15</td><td>1.5</td><td>12.0</td><td>70</td><td>140</td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_xml_report_parses() {
        let records = parse_report(XML_REPORT.as_bytes(), "report.xml").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].pass_number, 1);
        assert_eq!(records[1].profit, 500.0);
        assert_eq!(records[1].total_trades, 20);
        assert_eq!(records[1].profit_factor, Some(1.8));
        assert_eq!(
            records[1].parameters.get("StopLoss"),
            Some(&ParamValue::Int(60))
        );
    }

    #[test]
    fn test_html_report_parses() {
        let records = parse_report(HTML_REPORT.as_bytes(), "report.html").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].pass_number, 3);
        assert_eq!(records[2].profit, 300.0);
        assert_eq!(
            records[2].parameters.get("TakeProfit"),
            Some(&ParamValue::Int(140))
        );
    }

    #[test]
    fn test_xml_and_html_describe_identical_rows() {
        // Format-independence: same logical rows, same extracted records.
        let from_xml = parse_report(XML_REPORT.as_bytes(), "report.xml").unwrap();
        let from_html = parse_report(HTML_REPORT.as_bytes(), "report.html").unwrap();

        assert_eq!(from_xml.len(), from_html.len());
        for (x, h) in from_xml.iter().zip(&from_html) {
            assert_eq!(x.pass_number, h.pass_number);
            assert_eq!(x.parameters, h.parameters);
            assert_eq!(x.profit, h.profit);
            assert_eq!(x.total_trades, h.total_trades);
            assert_eq!(x.profit_factor, h.profit_factor);
            assert_eq!(x.drawdown, h.drawdown);
        }
    }

    #[test]
    fn test_mislabeled_extension_still_parses() {
        // HTML content uploaded as report.xml must go through the HTML path.
        let records = parse_report(HTML_REPORT.as_bytes(), "report.xml").unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_utf16le_document_is_decoded() {
        let mut raw = vec![0xff, 0xfe];
        for unit in XML_REPORT.encode_utf16() {
            raw.extend_from_slice(&unit.to_le_bytes());
        }
        let records = parse_report(&raw, "report.xml").unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = parse_report(b"not a report at all", "notes.txt").unwrap_err();
        assert!(matches!(err, EngineError::Format(_)));

        let err = parse_report(b"", "empty.xml").unwrap_err();
        assert!(matches!(err, EngineError::Format(_)));
    }

    #[test]
    fn test_xml_without_rows_is_rejected() {
        let err = parse_report(b"<?xml version=\"1.0\"?><Report></Report>", "r.xml").unwrap_err();
        assert!(matches!(err, EngineError::Format(_)));
    }
}
