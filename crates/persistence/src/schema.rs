//! Database schema definitions

/// SQL to create all tables
/// NOTE: parameters and metric snapshots are stored as JSON text; the
/// parameter schema is open-ended and only interpreted by the engine crate.
pub const CREATE_TABLES: &str = r#"
-- Saved presets (named parameter sets with their metrics snapshots)
CREATE TABLE IF NOT EXISTS presets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parameters TEXT NOT NULL,
    optimization_metrics TEXT NOT NULL,
    backtest_report TEXT,
    created_at TEXT NOT NULL
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_presets_created ON presets(created_at)
"#;
