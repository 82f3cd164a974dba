//! MT5 Report Engine — report parsing, ranking, and preset export
//!
//! The core pipeline for the analyzer:
//! - XML/HTML strategy-tester report parser with a shared metric normalizer
//! - Filter/rank/top-N selection with forward-test cross-validation
//! - MT5 `.set` preset file codec
//! - OpenAI-compatible client for AI commentary on comparison payloads
//!
//! Everything except the analysis client is pure, synchronous computation
//! over in-memory data; file bytes and criteria arrive already read.

pub mod api;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod selector;
pub mod setfile;
pub mod types;

// Re-exports for convenience
pub use api::AnalysisClient;
pub use error::{EngineError, EngineResult};
pub use parser::{parse_backtest, parse_report};
pub use selector::{select_best, SelectionCriteria};
pub use types::{BacktestReport, ParamValue, Parameters, RecordMetrics, ReportRecord};
