//! Preset repository — the process-wide store of saved parameter sets

use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use engine::types::{BacktestReport, Parameters, RecordMetrics};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Monotonic component of preset ids. Combined with a millisecond timestamp
/// so concurrent creates in the same process can never collide.
static PRESET_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_preset_id(created_at: DateTime<Utc>) -> String {
    let seq = PRESET_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}_{}", seq, created_at.timestamp_millis())
}

/// A named, saved parameter set.
///
/// `optimization_metrics` is a snapshot taken at creation time; the report
/// collection it came from is request-scoped and already gone. The optional
/// `backtest_report` is attached later and, once present, is the preferred
/// source of display metrics (actual performance beats optimizer estimate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub parameters: Parameters,
    pub optimization_metrics: RecordMetrics,
    pub backtest_report: Option<BacktestReport>,
    pub created_at: DateTime<Utc>,
}

/// Raw preset row; JSON columns decoded on the way out.
#[derive(Debug, FromRow)]
struct PresetRow {
    id: String,
    name: String,
    parameters: String,
    optimization_metrics: String,
    backtest_report: Option<String>,
    created_at: String,
}

impl PresetRow {
    fn into_preset(self) -> StoreResult<Preset> {
        let backtest_report = match self.backtest_report {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(Preset {
            id: self.id,
            name: self.name,
            parameters: serde_json::from_str(&self.parameters)?,
            optimization_metrics: serde_json::from_str(&self.optimization_metrics)?,
            backtest_report,
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| StoreError::Connection(format!("bad created_at: {e}")))?,
        })
    }
}

const PRESET_COLUMNS: &str =
    "id, name, parameters, optimization_metrics, backtest_report, created_at";

/// Repository for saved presets
pub struct PresetRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PresetRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a preset from a chosen report record. The parameter vector and
    /// metrics are copied, not referenced.
    pub async fn create(
        &self,
        name: &str,
        parameters: &Parameters,
        metrics: &RecordMetrics,
    ) -> StoreResult<Preset> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation(
                "preset name must not be empty".to_string(),
            ));
        }

        let created_at = Utc::now();
        let id = next_preset_id(created_at);

        sqlx::query(
            r#"
            INSERT INTO presets (id, name, parameters, optimization_metrics, backtest_report, created_at)
            VALUES (?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(serde_json::to_string(parameters)?)
        .bind(serde_json::to_string(metrics)?)
        .bind(created_at.to_rfc3339())
        .execute(self.pool)
        .await?;

        info!(preset_id = %id, name, "preset created");

        Ok(Preset {
            id,
            name: name.to_string(),
            parameters: parameters.clone(),
            optimization_metrics: metrics.clone(),
            backtest_report: None,
            created_at,
        })
    }

    /// Get a preset by id
    pub async fn get(&self, id: &str) -> StoreResult<Preset> {
        let sql = format!("SELECT {PRESET_COLUMNS} FROM presets WHERE id = ?");
        let row = sqlx::query_as::<_, PresetRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.into_preset()
    }

    /// All presets in creation order
    pub async fn list(&self) -> StoreResult<Vec<Preset>> {
        let sql = format!("SELECT {PRESET_COLUMNS} FROM presets ORDER BY rowid");
        let rows = sqlx::query_as::<_, PresetRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(PresetRow::into_preset).collect()
    }

    /// Resolve several presets by id, preserving the requested order
    pub async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<Preset>> {
        let mut presets = Vec::with_capacity(ids.len());
        for id in ids {
            presets.push(self.get(id).await?);
        }
        Ok(presets)
    }

    /// Delete a preset by id
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM presets WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        info!(preset_id = %id, "preset deleted");
        Ok(())
    }

    /// Attach a parsed backtest report to a preset. Single-statement update:
    /// readers see either the old or the new preset, nothing in between.
    pub async fn attach_backtest(
        &self,
        id: &str,
        report: &BacktestReport,
    ) -> StoreResult<Preset> {
        let result = sqlx::query("UPDATE presets SET backtest_report = ? WHERE id = ?")
            .bind(serde_json::to_string(report)?)
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        info!(preset_id = %id, "backtest report attached");
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use engine::types::ParamValue;

    fn sample_parameters() -> Parameters {
        let mut p = Parameters::new();
        p.insert("StopLoss".to_string(), ParamValue::Int(50));
        p.insert("TakeProfit".to_string(), ParamValue::Int(100));
        p.insert("Lots".to_string(), ParamValue::Float(0.1));
        p
    }

    fn sample_metrics() -> RecordMetrics {
        RecordMetrics {
            profit: 500.0,
            total_trades: 20,
            profit_factor: Some(1.8),
            expected_payoff: Some(25.0),
            drawdown: Some(80.0),
            sharpe_ratio: Some(1.1),
            recovery_factor: None,
        }
    }

    fn sample_backtest() -> BacktestReport {
        BacktestReport {
            initial_deposit: 10000.0,
            total_net_profit: 432.1,
            gross_profit: 900.0,
            gross_loss: -467.9,
            profit_factor: 1.92,
            expected_payoff: 21.6,
            absolute_drawdown: 50.0,
            maximal_drawdown: 120.0,
            relative_drawdown: 1.2,
            total_trades: 20,
            profit_trades: 12,
            loss_trades: 8,
            sharpe_ratio: Some(0.9),
            recovery_factor: Some(3.6),
        }
    }

    #[tokio::test]
    async fn test_create_get_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let repo = PresetRepository::new(db.pool());

        let created = repo
            .create("scalper v2", &sample_parameters(), &sample_metrics())
            .await
            .unwrap();
        let fetched = repo.get(&created.id).await.unwrap();

        assert_eq!(fetched, created);
        // Parameter order survives the JSON column
        let keys: Vec<&String> = fetched.parameters.keys().collect();
        assert_eq!(keys, vec!["StopLoss", "TakeProfit", "Lots"]);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let db = Database::in_memory().await.unwrap();
        let repo = PresetRepository::new(db.pool());
        let err = repo
            .create("   ", &sample_parameters(), &sample_metrics())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_is_creation_ordered() {
        let db = Database::in_memory().await.unwrap();
        let repo = PresetRepository::new(db.pool());

        for name in ["first", "second", "third"] {
            repo.create(name, &sample_parameters(), &sample_metrics())
                .await
                .unwrap();
        }

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_attach_backtest_then_get() {
        let db = Database::in_memory().await.unwrap();
        let repo = PresetRepository::new(db.pool());

        let created = repo
            .create("with backtest", &sample_parameters(), &sample_metrics())
            .await
            .unwrap();
        let updated = repo
            .attach_backtest(&created.id, &sample_backtest())
            .await
            .unwrap();

        assert_eq!(updated.backtest_report, Some(sample_backtest()));
        // Everything else unchanged
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.parameters, created.parameters);
        assert_eq!(updated.optimization_metrics, created.optimization_metrics);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_delete_and_not_found() {
        let db = Database::in_memory().await.unwrap();
        let repo = PresetRepository::new(db.pool());

        let created = repo
            .create("doomed", &sample_parameters(), &sample_metrics())
            .await
            .unwrap();
        repo.delete(&created.id).await.unwrap();

        assert!(matches!(
            repo.get(&created.id).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            repo.delete(&created.id).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            repo.attach_backtest(&created.id, &sample_backtest())
                .await
                .unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let db = Database::in_memory().await.unwrap();
        let repo = PresetRepository::new(db.pool());

        let a = repo
            .create("a", &sample_parameters(), &sample_metrics())
            .await
            .unwrap();
        let b = repo
            .create("b", &sample_parameters(), &sample_metrics())
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }
}
