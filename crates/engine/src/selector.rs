//! Filtering and ranking of parsed optimization records

use crate::error::{EngineError, EngineResult};
use crate::types::{Parameters, ReportRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Filter criteria for selecting the best parameter sets.
///
/// Optional metric filters only apply when the record actually carries the
/// metric; absence is never treated as failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionCriteria {
    pub min_profit: f64,
    pub min_profit_factor: f64,
    pub min_trades: u32,
    pub max_drawdown: Option<f64>,
    pub min_sharpe: Option<f64>,
    pub min_recovery: Option<f64>,
    pub top_n: usize,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            min_profit: 0.0,
            min_profit_factor: 1.0,
            min_trades: 10,
            max_drawdown: None,
            min_sharpe: None,
            min_recovery: None,
            top_n: 10,
        }
    }
}

impl SelectionCriteria {
    pub fn validate(&self) -> EngineResult<()> {
        if self.top_n == 0 {
            return Err(EngineError::Validation(
                "top_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn passes(&self, record: &ReportRecord) -> bool {
        if record.profit < self.min_profit {
            return false;
        }
        if record.total_trades < self.min_trades {
            return false;
        }
        if let Some(pf) = record.profit_factor {
            if pf < self.min_profit_factor {
                return false;
            }
        }
        if let (Some(max_dd), Some(dd)) = (self.max_drawdown, record.drawdown) {
            if dd > max_dd {
                return false;
            }
        }
        if let (Some(min_sharpe), Some(sharpe)) = (self.min_sharpe, record.sharpe_ratio) {
            if sharpe < min_sharpe {
                return false;
            }
        }
        if let (Some(min_recovery), Some(recovery)) = (self.min_recovery, record.recovery_factor) {
            if recovery < min_recovery {
                return false;
            }
        }
        true
    }
}

/// Filter, optionally cross-reference against forward-test records, rank by
/// profit and truncate to `top_n`.
///
/// Empty output is a legitimate outcome, never an error. Ordering is total:
/// profit descending, ties broken by pass number ascending, so repeated runs
/// over the same input are byte-for-byte reproducible.
pub fn select_best(
    records: &[ReportRecord],
    criteria: &SelectionCriteria,
    forward: Option<&[ReportRecord]>,
) -> EngineResult<Vec<ReportRecord>> {
    criteria.validate()?;

    let mut kept: Vec<ReportRecord> = records
        .iter()
        .filter(|r| criteria.passes(r))
        .cloned()
        .collect();

    if let Some(forward_records) = forward {
        // A parameter set is only trustworthy if it also showed up in the
        // out-of-sample run. An empty forward set fails closed.
        kept.retain(|record| {
            forward_records
                .iter()
                .any(|fwd| parameters_match(&record.parameters, &fwd.parameters))
        });
    }

    kept.sort_by(|a, b| {
        b.profit
            .total_cmp(&a.profit)
            .then(a.pass_number.cmp(&b.pass_number))
    });
    kept.truncate(criteria.top_n);

    info!(
        candidates = records.len(),
        selected = kept.len(),
        forward_validated = forward.is_some(),
        "selection complete"
    );

    Ok(kept)
}

/// Compare two parameter vectors on the intersection of their keys. Both
/// sets must be non-empty and share at least one key with equal values;
/// any shared key with differing values is a mismatch.
fn parameters_match(a: &Parameters, b: &Parameters) -> bool {
    if a.is_empty() || b.is_empty() {
        return a.is_empty() && b.is_empty();
    }
    let mut shared = 0usize;
    for (key, value) in a {
        if let Some(other) = b.get(key) {
            if value != other {
                return false;
            }
            shared += 1;
        }
    }
    shared > 0
}
