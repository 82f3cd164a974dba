//! Types for parsed MT5 strategy-tester reports

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single parameter value as found in a report or `.set` file.
///
/// MT5 reports carry an open-ended parameter vector whose value types are
/// only known at parse time, so this is a tagged union rather than a fixed
/// struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Coerce a raw string the way MT5 renders values: integer when there is
    /// no decimal point, float when there is one, raw text otherwise.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.contains('.') {
            if let Ok(f) = trimmed.parse::<f64>() {
                return ParamValue::Float(f);
            }
        } else if let Ok(i) = trimmed.parse::<i64>() {
            return ParamValue::Int(i);
        }
        ParamValue::Text(trimmed.to_string())
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => {
                // Rust's f64 Display never emits scientific notation, but it
                // drops the fractional part of whole floats ("2" for 2.0).
                // Keep the decimal point so decode() restores the same type.
                let s = v.to_string();
                if s.contains('.') {
                    write!(f, "{s}")
                } else {
                    write!(f, "{s}.0")
                }
            }
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered parameter vector. Insertion order mirrors the source document and
/// is preserved through storage and `.set` export.
pub type Parameters = IndexMap<String, ParamValue>;

/// One optimization or forward-test pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub pass_number: i64,
    pub parameters: Parameters,
    pub profit: f64,
    pub total_trades: u32,
    pub profit_factor: Option<f64>,
    pub expected_payoff: Option<f64>,
    pub drawdown: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub recovery_factor: Option<f64>,
}

impl ReportRecord {
    /// Snapshot of the metrics, detached from the record, for storing with a
    /// preset.
    pub fn metrics(&self) -> RecordMetrics {
        RecordMetrics {
            profit: self.profit,
            total_trades: self.total_trades,
            profit_factor: self.profit_factor,
            expected_payoff: self.expected_payoff,
            drawdown: self.drawdown,
            sharpe_ratio: self.sharpe_ratio,
            recovery_factor: self.recovery_factor,
        }
    }
}

/// Optimizer metrics copied into a preset at creation time. Immutable after
/// that point; the originating report collection is request-scoped and gone
/// once the upload completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetrics {
    pub profit: f64,
    pub total_trades: u32,
    pub profit_factor: Option<f64>,
    pub expected_payoff: Option<f64>,
    pub drawdown: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub recovery_factor: Option<f64>,
}

/// Summary of a single-run backtest detail report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub initial_deposit: f64,
    pub total_net_profit: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub expected_payoff: f64,
    pub absolute_drawdown: f64,
    pub maximal_drawdown: f64,
    pub relative_drawdown: f64,
    pub total_trades: u32,
    pub profit_trades: u32,
    pub loss_trades: u32,
    pub sharpe_ratio: Option<f64>,
    pub recovery_factor: Option<f64>,
}

impl BacktestReport {
    /// Winning trades as a percentage of total trades.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades > 0 {
            self.profit_trades as f64 / self.total_trades as f64 * 100.0
        } else {
            0.0
        }
    }
}
