//! MT5 Analyzer — report ingestion, ranking, and preset management
//!
//! Usage:
//!   mt5-analyzer serve --port 3001        — Launch web server with UI
//!   mt5-analyzer rank report.xml          — Rank a report from the CLI

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use engine::{
    parse_backtest, parse_report, select_best, setfile, AnalysisClient, EngineError,
    SelectionCriteria,
};
use persistence::{compare_presets, PresetRepository, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "mt5-analyzer")]
#[command(about = "MT5 strategy-tester report analyzer and preset manager", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the analyzer web server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Rank an optimization report from the CLI (no web server)
    Rank {
        /// Path to the optimization report (XML or HTML)
        report: PathBuf,
        /// Optional forward-test report for out-of-sample validation
        #[arg(long)]
        forward: Option<PathBuf>,
        /// Minimum net profit
        #[arg(long, default_value_t = 0.0)]
        min_profit: f64,
        /// Minimum profit factor
        #[arg(long, default_value_t = 1.0)]
        min_profit_factor: f64,
        /// Minimum number of trades
        #[arg(long, default_value_t = 10)]
        min_trades: u32,
        /// Maximum drawdown (no filter when omitted)
        #[arg(long)]
        max_drawdown: Option<f64>,
        /// Number of top results to show
        #[arg(long, default_value_t = 10)]
        top_n: usize,
        /// Write the best parameter set to this `.set` file
        #[arg(long)]
        export_set: Option<PathBuf>,
    },
}

#[derive(Clone)]
struct AppState {
    db: Arc<persistence::Database>,
    analysis: Option<Arc<AnalysisClient>>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,mt5_analyzer=debug")
    } else {
        EnvFilter::new("info,engine=info,persistence=info,mt5_analyzer=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port).await?;
        }
        Commands::Rank {
            report,
            forward,
            min_profit,
            min_profit_factor,
            min_trades,
            max_drawdown,
            top_n,
            export_set,
        } => {
            let criteria = SelectionCriteria {
                min_profit,
                min_profit_factor,
                min_trades,
                max_drawdown,
                top_n,
                ..Default::default()
            };
            cmd_rank(report, forward, criteria, export_set)?;
        }
    }

    Ok(())
}

// ============================================================================
// Serve command — Axum web server
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("MT5 Analyzer v{} starting...", APP_VERSION);

    let db_path =
        std::env::var("MT5_ANALYZER_DB_PATH").unwrap_or_else(|_| "data/presets.db".to_string());
    let db = persistence::Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!("Database initialized: {}", db_path);

    let analysis = AnalysisClient::from_env().map(Arc::new);
    if analysis.is_none() {
        info!("OPENAI_API_KEY not set — /api/presets/analyze disabled");
    }

    let state = AppState {
        db: Arc::new(db),
        analysis,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Determine static files directory
    let exe_path = std::env::current_exe().unwrap_or_default();
    let exe_dir = exe_path.parent().unwrap_or(std::path::Path::new("."));
    let dist_dir = exe_dir.join("dist");
    let static_dir = if dist_dir.exists() {
        dist_dir
    } else {
        std::path::PathBuf::from("dist")
    };

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/reports/select", post(api_select_reports))
        .route("/presets", post(api_create_preset).get(api_list_presets))
        .route("/presets/compare", post(api_compare_presets))
        .route("/presets/analyze", post(api_analyze_presets))
        .route(
            "/presets/:id",
            get(api_get_preset).delete(api_delete_preset),
        )
        .route("/presets/:id/backtest", post(api_attach_backtest))
        .route("/presets/:id/set", get(api_download_set))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&static_dir))
        .layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== MT5 Analyzer v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET    /api/health               - Health check");
    println!("  POST   /api/reports/select       - Upload report(s), get ranked results");
    println!("  POST   /api/presets              - Save a preset");
    println!("  GET    /api/presets              - List presets");
    println!("  GET    /api/presets/:id          - Get one preset");
    println!("  DELETE /api/presets/:id          - Delete a preset");
    println!("  POST   /api/presets/:id/backtest - Attach a backtest report");
    println!("  GET    /api/presets/:id/set      - Download .set file");
    println!("  POST   /api/presets/compare      - Compare presets");
    println!("  POST   /api/presets/analyze      - AI commentary on a comparison");
    println!("\n  Database: {}", db_path);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error mapping — named error kind and violated constraint only, no internals
// ============================================================================

type ApiError = (StatusCode, Json<Value>);

fn engine_error(e: EngineError) -> ApiError {
    let kind = match &e {
        EngineError::Format(_) => "format_error",
        EngineError::Validation(_) => "validation_error",
    };
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "kind": kind, "error": e.to_string() })),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "kind": "not_found",
                "error": format!("preset not found: {id}"),
            })),
        ),
        StoreError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "kind": "validation_error", "error": msg })),
        ),
        other => {
            error!("storage error: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "kind": "storage_error", "error": "internal storage error" })),
            )
        }
    }
}

fn bad_request(msg: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "kind": "validation_error", "error": msg })),
    )
}

// ============================================================================
// API Handlers — Reports
// ============================================================================

/// GET /api/health
async fn api_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "mt5-analyzer",
        "version": APP_VERSION,
    }))
}

/// POST /api/reports/select — multipart upload of an optimization report
/// (field `optimization`), optional forward report (field `forward`) and
/// optional JSON criteria (field `criteria`); returns the ranked records.
async fn api_select_reports(mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut optimization: Option<(String, Vec<u8>)> = None;
    let mut forward: Option<(String, Vec<u8>)> = None;
    let mut criteria = SelectionCriteria::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "optimization" => {
                let filename = field.file_name().unwrap_or("report.xml").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {e}")))?;
                optimization = Some((filename, bytes.to_vec()));
            }
            "forward" => {
                let filename = field.file_name().unwrap_or("forward.xml").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {e}")))?;
                forward = Some((filename, bytes.to_vec()));
            }
            "criteria" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("failed to read criteria: {e}")))?;
                criteria = serde_json::from_str(&text)
                    .map_err(|e| bad_request(format!("invalid criteria: {e}")))?;
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        optimization.ok_or_else(|| bad_request("missing `optimization` report file".into()))?;

    let records = parse_report(&bytes, &filename).map_err(engine_error)?;
    let forward_records = match &forward {
        Some((fwd_name, fwd_bytes)) => {
            Some(parse_report(fwd_bytes, fwd_name).map_err(engine_error)?)
        }
        None => None,
    };

    let selected =
        select_best(&records, &criteria, forward_records.as_deref()).map_err(engine_error)?;

    info!(
        parsed = records.len(),
        selected = selected.len(),
        forward = forward_records.is_some(),
        "report selection served"
    );

    Ok(Json(json!({
        "success": true,
        "total_parsed": records.len(),
        "forward_parsed": forward_records.as_ref().map(|r| r.len()),
        "results": selected,
    })))
}

// ============================================================================
// API Handlers — Presets
// ============================================================================

#[derive(Deserialize)]
struct CreatePresetRequest {
    name: String,
    parameters: engine::Parameters,
    optimization_metrics: engine::RecordMetrics,
}

/// POST /api/presets
async fn api_create_preset(
    State(state): State<AppState>,
    Json(request): Json<CreatePresetRequest>,
) -> Result<Json<Value>, ApiError> {
    let repo = PresetRepository::new(state.db.pool());
    let preset = repo
        .create(
            &request.name,
            &request.parameters,
            &request.optimization_metrics,
        )
        .await
        .map_err(store_error)?;
    Ok(Json(json!({ "success": true, "preset": preset })))
}

/// GET /api/presets
async fn api_list_presets(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let repo = PresetRepository::new(state.db.pool());
    let presets = repo.list().await.map_err(store_error)?;
    Ok(Json(json!({
        "success": true,
        "total": presets.len(),
        "presets": presets,
    })))
}

/// GET /api/presets/:id
async fn api_get_preset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let repo = PresetRepository::new(state.db.pool());
    let preset = repo.get(&id).await.map_err(store_error)?;
    Ok(Json(json!({ "success": true, "preset": preset })))
}

/// DELETE /api/presets/:id
async fn api_delete_preset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let repo = PresetRepository::new(state.db.pool());
    repo.delete(&id).await.map_err(store_error)?;
    Ok(Json(json!({ "success": true })))
}

/// POST /api/presets/:id/backtest — multipart upload of a backtest report
async fn api_attach_backtest(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        if let Some(filename) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("failed to read upload: {e}")))?;
            upload = Some((filename, bytes.to_vec()));
            break;
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| bad_request("missing backtest report file".into()))?;
    let report = parse_backtest(&bytes, &filename).map_err(engine_error)?;

    let repo = PresetRepository::new(state.db.pool());
    let preset = repo
        .attach_backtest(&id, &report)
        .await
        .map_err(store_error)?;
    Ok(Json(json!({ "success": true, "preset": preset })))
}

/// GET /api/presets/:id/set — downloadable MT5 preset file
async fn api_download_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = PresetRepository::new(state.db.pool());
    let preset = repo.get(&id).await.map_err(store_error)?;
    let body = setfile::encode(&preset.parameters);

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"preset_{}.set\"", preset.id),
            ),
        ],
        body,
    ))
}

// ============================================================================
// API Handlers — Comparison & Analysis
// ============================================================================

#[derive(Deserialize)]
struct ComparePresetsRequest {
    preset_ids: Vec<String>,
}

/// POST /api/presets/compare
async fn api_compare_presets(
    State(state): State<AppState>,
    Json(request): Json<ComparePresetsRequest>,
) -> Result<Json<Value>, ApiError> {
    let repo = PresetRepository::new(state.db.pool());
    let presets = repo
        .get_many(&request.preset_ids)
        .await
        .map_err(store_error)?;
    let comparison = compare_presets(&presets).map_err(store_error)?;

    Ok(Json(json!({
        "success": true,
        "comparison": comparison,
        "presets": presets,
    })))
}

/// POST /api/presets/analyze — comparison plus AI commentary
async fn api_analyze_presets(
    State(state): State<AppState>,
    Json(request): Json<ComparePresetsRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(client) = state.analysis.clone() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "kind": "analysis_disabled",
                "error": "analysis is not configured on this server",
            })),
        ));
    };

    let repo = PresetRepository::new(state.db.pool());
    let presets = repo
        .get_many(&request.preset_ids)
        .await
        .map_err(store_error)?;
    let comparison = compare_presets(&presets).map_err(store_error)?;

    let payload = json!({ "presets": presets, "comparison": comparison });
    let commentary = client.analyze(&payload).await.map_err(|e| {
        error!("analysis request failed: {}", e);
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "success": false,
                "kind": "analysis_error",
                "error": "analysis service unavailable",
            })),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "comparison": comparison,
        "analysis": commentary,
    })))
}

// ============================================================================
// Rank command — CLI mode (no web server)
// ============================================================================

fn cmd_rank(
    report: PathBuf,
    forward: Option<PathBuf>,
    criteria: SelectionCriteria,
    export_set: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("\n=== MT5 Analyzer v{} ===", APP_VERSION);

    let raw = std::fs::read(&report)?;
    let filename = report
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let records = parse_report(&raw, &filename)?;
    println!("Parsed {} passes from {}", records.len(), report.display());

    let forward_records = match &forward {
        Some(path) => {
            let raw = std::fs::read(path)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let parsed = parse_report(&raw, &filename)?;
            println!("Parsed {} forward passes from {}", parsed.len(), path.display());
            Some(parsed)
        }
        None => None,
    };

    let selected = select_best(&records, &criteria, forward_records.as_deref())?;
    if selected.is_empty() {
        println!("\nNo passes matched the criteria.");
        return Ok(());
    }

    println!("\nTop {} Results:", selected.len());
    println!(
        "  {:>3}  {:>6} {:>12} {:>8} {:>8} {:>10} {:>8}",
        "#", "Pass", "Profit", "Trades", "PF", "Drawdown", "Sharpe"
    );
    println!("  {}", "-".repeat(64));
    for (i, r) in selected.iter().enumerate() {
        println!(
            "  {:>3}  {:>6} {:>+12.2} {:>8} {:>8} {:>10} {:>8}",
            i + 1,
            r.pass_number,
            r.profit,
            r.total_trades,
            r.profit_factor
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            r.drawdown
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            r.sharpe_ratio
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    let best = &selected[0];
    println!("\nBest parameters (pass {}):", best.pass_number);
    for (key, value) in &best.parameters {
        println!("  {key} = {value}");
    }

    if let Some(path) = export_set {
        std::fs::write(&path, setfile::encode(&best.parameters))?;
        println!("\nPreset written to {}", path.display());
    }

    Ok(())
}
