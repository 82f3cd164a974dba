//! HTML report parsers: optimization result tables and backtest summaries
//!
//! Optimization reports saved from the strategy tester are plain HTML tables
//! with one header row. The results table is located by counting how many
//! header cells the normalizer recognizes as metrics; everything else on the
//! page (settings tables, trade logs) scores lower and is skipped.

use crate::error::{EngineError, EngineResult};
use crate::normalize::{classify, coerce_number, RowNormalizer};
use crate::types::{BacktestReport, ReportRecord};
use scraper::{ElementRef, Html, Selector};

/// Header cells that must classify as metrics before a table is treated as
/// the results table.
const MIN_METRIC_COLUMNS: usize = 2;

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<String>()
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

pub fn parse_optimization(text: &str) -> EngineResult<Vec<ReportRecord>> {
    let doc = Html::parse_document(text);
    let table_sel = Selector::parse("table").expect("static selector");
    let row_sel = Selector::parse("tr").expect("static selector");
    let cell_sel = Selector::parse("th, td").expect("static selector");

    for table in doc.select(&table_sel) {
        let rows: Vec<ElementRef<'_>> = table.select(&row_sel).collect();
        if rows.len() < 2 {
            continue;
        }

        let headers: Vec<String> = rows[0].select(&cell_sel).map(cell_text).collect();
        let metric_columns = headers.iter().filter(|h| classify(h).is_some()).count();
        if metric_columns < MIN_METRIC_COLUMNS {
            continue;
        }

        let mut records = Vec::new();
        for (index, row) in rows[1..].iter().enumerate() {
            let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
            if cells.len() < 2 {
                // Separator / footer rows
                continue;
            }

            let mut norm = RowNormalizer::new();
            for (header, value) in headers.iter().zip(&cells) {
                norm.push(header, value);
            }
            records.push(norm.finish(index as i64 + 1));
        }

        if !records.is_empty() {
            return Ok(records);
        }
    }

    Err(EngineError::Format(
        "no optimization results table found in HTML".to_string(),
    ))
}

/// Parse a single-run backtest detail report.
///
/// These reports are label/value tables ("Total net profit", "Profit factor",
/// ...). All two-column rows on the page are collected into one label map and
/// the known metrics extracted from it; missing labels default to zero rather
/// than failing the document.
pub fn parse_backtest(text: &str) -> EngineResult<BacktestReport> {
    let doc = Html::parse_document(text);
    let row_sel = Selector::parse("tr").expect("static selector");
    let cell_sel = Selector::parse("th, td").expect("static selector");

    let mut labels: Vec<(String, String)> = Vec::new();
    for row in doc.select(&row_sel) {
        let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
        if cells.len() >= 2 && !cells[0].is_empty() {
            labels.push((cells[0].to_ascii_lowercase(), cells[1].clone()));
        }
    }

    let lookup = |needle: &str| -> Option<&str> {
        labels
            .iter()
            .find(|(label, _)| label.contains(needle))
            .map(|(_, value)| value.as_str())
    };
    let metric = |needle: &str| -> f64 { lookup(needle).and_then(coerce_number).unwrap_or(0.0) };
    // "Profit trades (% of total)" style cells: the count is the first token
    let leading_count = |needle: &str| -> u32 {
        lookup(needle)
            .and_then(|v| v.split_whitespace().next())
            .and_then(coerce_number)
            .map(|n| n.max(0.0) as u32)
            .unwrap_or(0)
    };

    if lookup("total net profit").is_none() && lookup("total trades").is_none() {
        return Err(EngineError::Format(
            "document is not a backtest report".to_string(),
        ));
    }

    let total_net_profit = metric("total net profit");
    let maximal_drawdown = metric("maximal drawdown").abs();
    // "Relative drawdown" renders as "4.50% (450.00)"; keep the leading part
    let relative_drawdown = lookup("relative drawdown")
        .map(|v| v.split('(').next().unwrap_or(""))
        .and_then(coerce_number)
        .unwrap_or(0.0);

    let sharpe_ratio = lookup("sharpe").and_then(coerce_number);
    let recovery_factor = lookup("recovery")
        .and_then(coerce_number)
        .or_else(|| (maximal_drawdown > 0.0).then(|| total_net_profit / maximal_drawdown));

    Ok(BacktestReport {
        initial_deposit: metric("initial deposit"),
        total_net_profit,
        gross_profit: metric("gross profit"),
        gross_loss: metric("gross loss"),
        profit_factor: metric("profit factor"),
        expected_payoff: metric("expected payoff"),
        absolute_drawdown: metric("absolute drawdown"),
        maximal_drawdown,
        relative_drawdown,
        total_trades: metric("total trades").max(0.0) as u32,
        profit_trades: leading_count("profit trades"),
        loss_trades: leading_count("loss trades"),
        sharpe_ratio,
        recovery_factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    #[test]
    fn test_settings_table_is_skipped() {
        // First table has no metric headers; the second one is the results.
        let html = r#"<html><body>
<table>
  <tr><th>Expert</th><th>Symbol</th></tr>
  <tr><td>MyEA</td><td>EURUSD</td></tr>
</table>
<table>
  <tr><th>Pass</th><th>Profit</th><th>Trades</th><th>Lots</th></tr>
  <tr><td>1</td><td>250.00</td><td>12</td><td>0.1</td></tr>
</table>
</body></html>"#;
        let records = parse_optimization(html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].profit, 250.0);
        assert_eq!(
            records[0].parameters.get("Lots"),
            Some(&ParamValue::Float(0.1))
        );
    }

    #[test]
    fn test_currency_and_separator_values() {
        let html = r#"<table>
  <tr><th>Pass</th><th>Profit</th><th>Trades</th><th>Drawdown %</th></tr>
  <tr><td>1</td><td>$1,250.50</td><td>40</td><td>12.5%</td></tr>
</table>"#;
        let records = parse_optimization(html).unwrap();
        assert_eq!(records[0].profit, 1250.5);
        assert_eq!(records[0].drawdown, Some(12.5));
    }

    #[test]
    fn test_short_rows_are_skipped_not_fatal() {
        let html = r#"<table>
  <tr><th>Pass</th><th>Profit</th><th>Trades</th></tr>
  <tr><td colspan="3">section break</td></tr>
  <tr><td>1</td><td>100</td><td>10</td></tr>
</table>"#;
        let records = parse_optimization(html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_trades, 10);
    }

    #[test]
    fn test_backtest_summary_extraction() {
        let html = r#"<html><body><table>
  <tr><td>Initial deposit</td><td>10 000.00</td></tr>
  <tr><td>Total net profit</td><td>2 345.67</td></tr>
  <tr><td>Gross profit</td><td>5 000.00</td></tr>
  <tr><td>Gross loss</td><td>-2 654.33</td></tr>
  <tr><td>Profit factor</td><td>1.88</td></tr>
  <tr><td>Expected payoff</td><td>23.46</td></tr>
  <tr><td>Absolute drawdown</td><td>120.00</td></tr>
  <tr><td>Maximal drawdown</td><td>480.00</td></tr>
  <tr><td>Relative drawdown</td><td>4.50% (450.00)</td></tr>
  <tr><td>Total trades</td><td>100</td></tr>
  <tr><td>Profit trades (% of total)</td><td>60 (60.00%)</td></tr>
  <tr><td>Loss trades (% of total)</td><td>40 (40.00%)</td></tr>
</table></body></html>"#;

        let report = parse_backtest(html).unwrap();
        assert_eq!(report.total_net_profit, 2345.67);
        assert_eq!(report.profit_factor, 1.88);
        assert_eq!(report.maximal_drawdown, 480.0);
        assert_eq!(report.relative_drawdown, 4.5);
        assert_eq!(report.total_trades, 100);
        assert_eq!(report.profit_trades, 60);
        assert_eq!(report.win_rate(), 60.0);
        // Not in the document: computed from net profit / max drawdown
        let recovery = report.recovery_factor.unwrap();
        assert!((recovery - 2345.67 / 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_backtest_rejects_unrelated_html() {
        let err = parse_backtest("<html><body><p>hello</p></body></html>").unwrap_err();
        assert!(matches!(err, EngineError::Format(_)));
    }
}
