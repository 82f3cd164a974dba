//! Cross-preset comparison
//!
//! Computes per-metric winners and chart-ready series over a set of saved
//! presets. When a preset has a backtest report attached, its actual numbers
//! supersede the optimizer estimates for every metric.

use crate::repository::Preset;
use crate::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// The winning preset for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricWinner {
    pub preset_id: String,
    pub name: String,
    pub value: f64,
}

/// One point of a chart series: preset name plus its metric value, in the
/// order the presets were requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonChart {
    pub profit: Vec<ChartPoint>,
    pub profit_factor: Vec<ChartPoint>,
    pub drawdown: Vec<ChartPoint>,
    pub sharpe_ratio: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetComparison {
    pub best_profit: Option<MetricWinner>,
    pub best_profit_factor: Option<MetricWinner>,
    pub best_sharpe: Option<MetricWinner>,
    pub lowest_drawdown: Option<MetricWinner>,
    pub chart: ComparisonChart,
}

/// Effective metric accessors: backtest numbers first, optimizer estimates
/// as the fallback.
fn effective_profit(preset: &Preset) -> Option<f64> {
    preset
        .backtest_report
        .as_ref()
        .map(|b| b.total_net_profit)
        .or(Some(preset.optimization_metrics.profit))
}

fn effective_profit_factor(preset: &Preset) -> Option<f64> {
    preset
        .backtest_report
        .as_ref()
        .map(|b| b.profit_factor)
        .or(preset.optimization_metrics.profit_factor)
}

fn effective_drawdown(preset: &Preset) -> Option<f64> {
    preset
        .backtest_report
        .as_ref()
        .map(|b| b.maximal_drawdown)
        .or(preset.optimization_metrics.drawdown)
}

fn effective_sharpe(preset: &Preset) -> Option<f64> {
    preset
        .backtest_report
        .as_ref()
        .and_then(|b| b.sharpe_ratio)
        .or(preset.optimization_metrics.sharpe_ratio)
}

/// Pick the winning preset for one metric. Ties go to the earliest
/// `created_at` so repeated comparisons are deterministic.
fn pick_winner(
    presets: &[Preset],
    metric: impl Fn(&Preset) -> Option<f64>,
    higher_is_better: bool,
) -> Option<MetricWinner> {
    let mut best: Option<&Preset> = None;
    let mut best_value = 0.0f64;

    for preset in presets {
        let Some(value) = metric(preset) else {
            continue;
        };
        let wins = match best {
            None => true,
            Some(current) => {
                let better = if higher_is_better {
                    value > best_value
                } else {
                    value < best_value
                };
                better || (value == best_value && preset.created_at < current.created_at)
            }
        };
        if wins {
            best = Some(preset);
            best_value = value;
        }
    }

    best.map(|preset| MetricWinner {
        preset_id: preset.id.clone(),
        name: preset.name.clone(),
        value: best_value,
    })
}

fn series(presets: &[Preset], metric: impl Fn(&Preset) -> Option<f64>) -> Vec<ChartPoint> {
    presets
        .iter()
        .map(|p| ChartPoint {
            name: p.name.clone(),
            value: metric(p),
        })
        .collect()
}

/// Compare at least two presets.
pub fn compare_presets(presets: &[Preset]) -> StoreResult<PresetComparison> {
    if presets.len() < 2 {
        return Err(StoreError::Validation(
            "comparison requires at least 2 presets".to_string(),
        ));
    }

    Ok(PresetComparison {
        best_profit: pick_winner(presets, effective_profit, true),
        best_profit_factor: pick_winner(presets, effective_profit_factor, true),
        best_sharpe: pick_winner(presets, effective_sharpe, true),
        lowest_drawdown: pick_winner(presets, effective_drawdown, false),
        chart: ComparisonChart {
            profit: series(presets, effective_profit),
            profit_factor: series(presets, effective_profit_factor),
            drawdown: series(presets, effective_drawdown),
            sharpe_ratio: series(presets, effective_sharpe),
        },
    })
}
