//! Metric name normalization shared by the XML and HTML parser paths
//!
//! MT5 reports are inconsistent about column naming ("Profit" vs "Result",
//! "Profit Factor" vs "ProfitFactor", localized currency decorations on the
//! values). Both parser paths feed raw name/value pairs through the single
//! declarative table below so the mapping lives in exactly one place.

use crate::types::{ParamValue, Parameters, ReportRecord};

/// Canonical metric fields a source column can map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    Pass,
    Profit,
    Trades,
    ProfitFactor,
    ExpectedPayoff,
    Drawdown,
    Sharpe,
    Recovery,
}

/// Lowercase substring patterns, checked top to bottom; first match wins.
/// The compound names sit above the bare ones so "Profit Factor" is never
/// swallowed by the plain profit rule.
const METRIC_PATTERNS: &[(MetricField, &[&str])] = &[
    (MetricField::ProfitFactor, &["profitfactor", "profit factor"]),
    (
        MetricField::ExpectedPayoff,
        &["expectedpayoff", "expected payoff", "payoff"],
    ),
    (MetricField::Recovery, &["recovery"]),
    (MetricField::Sharpe, &["sharpe"]),
    (MetricField::Drawdown, &["drawdown"]),
    (MetricField::Trades, &["trades"]),
    (MetricField::Profit, &["result", "profit"]),
    (MetricField::Pass, &["pass"]),
];

/// Map a source column/tag name onto a canonical metric field, if any.
pub fn classify(name: &str) -> Option<MetricField> {
    let lower = name.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    for (field, patterns) in METRIC_PATTERNS {
        if patterns.iter().any(|p| lower.contains(p)) {
            return Some(*field);
        }
    }
    None
}

/// Parse a numeric cell, tolerating thousands separators, currency and
/// percent decorations ("1 234.56", "$500", "12.5%").
pub fn coerce_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%' | '€' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Accumulates one raw row into a [`ReportRecord`], regardless of which
/// parser path produced the name/value pairs.
#[derive(Debug, Default)]
pub struct RowNormalizer {
    pass_number: Option<i64>,
    parameters: Parameters,
    profit: Option<f64>,
    total_trades: Option<u32>,
    profit_factor: Option<f64>,
    expected_payoff: Option<f64>,
    drawdown: Option<f64>,
    sharpe_ratio: Option<f64>,
    recovery_factor: Option<f64>,
}

impl RowNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass number known up front (XML `Pass` attribute).
    pub fn set_pass(&mut self, pass: i64) {
        self.pass_number = Some(pass);
    }

    /// A cell that is known to be a parameter (XML `<Parameter name=...>`).
    pub fn push_parameter(&mut self, name: &str, raw: &str) {
        self.parameters
            .insert(name.trim().to_string(), ParamValue::parse(raw));
    }

    /// A cell whose role is determined by its source name. Metric cells that
    /// fail numeric coercion fall back into the parameter map as raw text;
    /// nothing is ever dropped and nothing aborts the row.
    pub fn push(&mut self, name: &str, raw: &str) {
        let Some(field) = classify(name) else {
            self.push_parameter(name, raw);
            return;
        };

        let number = coerce_number(raw);
        match (field, number) {
            (MetricField::Pass, Some(n)) => self.pass_number = Some(n as i64),
            (MetricField::Profit, Some(n)) => self.profit = Some(n),
            (MetricField::Trades, Some(n)) => self.total_trades = Some(n.max(0.0) as u32),
            (MetricField::ProfitFactor, Some(n)) => self.profit_factor = Some(n),
            (MetricField::ExpectedPayoff, Some(n)) => self.expected_payoff = Some(n),
            (MetricField::Drawdown, Some(n)) => self.drawdown = Some(n.abs()),
            (MetricField::Sharpe, Some(n)) => self.sharpe_ratio = Some(n),
            (MetricField::Recovery, Some(n)) => self.recovery_factor = Some(n),
            (_, None) => {
                if !raw.trim().is_empty() {
                    self.push_parameter(name, raw);
                }
            }
        }
    }

    /// Finish the row. `fallback_pass` (source row order) is used when the
    /// document carried no usable pass number.
    pub fn finish(self, fallback_pass: i64) -> ReportRecord {
        ReportRecord {
            pass_number: self.pass_number.unwrap_or(fallback_pass),
            parameters: self.parameters,
            profit: self.profit.unwrap_or(0.0),
            total_trades: self.total_trades.unwrap_or(0),
            profit_factor: self.profit_factor,
            expected_payoff: self.expected_payoff,
            drawdown: self.drawdown,
            sharpe_ratio: self.sharpe_ratio,
            recovery_factor: self.recovery_factor,
        }
    }
}
