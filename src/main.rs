//! govdraft - Government document template search and draft generation server.

mod cache;
mod config;
mod cost;
mod drafts;
mod error;
mod extract;
mod government;
mod html;
mod normalizer;
mod openai;
mod redact;
mod schema;
mod search;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use cache::ResultCache;
use config::AppConfig;
use drafts::{DraftInput, DraftService};
use error::CostError;
use government::GovernmentClient;
use openai::CompletionClient;
use schema::{now_iso8601, DocType, DocumentQuery, SearchItem, SearchResult, TokenCostInfo};
use search::SearchService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    search: SearchService,
    drafts: Arc<DraftService>,
    config: Arc<AppConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("govdraft={},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.public_data_api_key.is_none() {
        warn!("PUBLIC_DATA_API_KEY is not set; searches will fail");
    }
    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; analysis and drafts will fail");
    }

    let client = GovernmentClient::from_config(&config)?;
    let completion = CompletionClient::from_config(&config)?;
    info!(
        "Clients initialized (model: {}, retries: {}/{})",
        config.openai_model, config.max_retries, config.openai_max_retries
    );

    let port = config.port;
    let state = AppState {
        search: SearchService::new(client, ResultCache::new()),
        drafts: Arc::new(DraftService::new(completion)),
        config: Arc::new(config),
    };

    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", get(search_documents))
        .route("/search/all", get(search_all))
        .route("/api/token-cost", post(token_cost))
        .route("/analyze", post(analyze_templates))
        .route("/analyze/document", post(analyze_document))
        .route("/generate", post(generate_draft))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn completion_failed(e: error::CompletionError) -> ApiError {
    error!("Completion failed: {}", e);
    api_error(StatusCode::BAD_GATEWAY, format!("Completion failed: {}", e))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "timestamp": now_iso8601()}))
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

fn default_doc_type() -> String {
    DocType::Press.as_str().to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    keyword: String,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
    #[serde(default = "default_doc_type")]
    doc_type: String,
    #[serde(default)]
    manager: String,
    #[serde(default = "default_true")]
    use_cache: bool,
}

/// Search one page of documents.
async fn search_documents(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResult> {
    info!(
        "Search: keyword={:?}, doc_type={}, page={}, per_page={}",
        params.keyword, params.doc_type, params.page, params.per_page
    );
    let query = DocumentQuery::new(params.keyword, params.doc_type)
        .page(params.page, params.per_page)
        .manager(params.manager);

    let result = state.search.search(&query, params.use_cache).await;
    match result.page() {
        Some(page) => info!("Search returned {} of {} items", page.items.len(), page.total_count),
        None if result.is_error() => warn!("Search failed for {}", query.fingerprint()),
        None => {}
    }
    Json(result)
}

#[derive(Debug, Deserialize)]
struct SearchAllParams {
    #[serde(default)]
    keyword: String,
    #[serde(default = "default_doc_type")]
    doc_type: String,
    #[serde(default)]
    manager: String,
    #[serde(default = "default_max_pages")]
    max_pages: u32,
}

#[derive(Debug, Serialize)]
struct SearchAllResponse {
    items: Vec<SearchItem>,
    count: usize,
}

/// Crawl several pages of one query.
async fn search_all(
    State(state): State<AppState>,
    Query(params): Query<SearchAllParams>,
) -> Json<SearchAllResponse> {
    let items = state
        .search
        .fetch_all(&params.keyword, &params.doc_type, &params.manager, params.max_pages)
        .await;
    Json(SearchAllResponse {
        count: items.len(),
        items,
    })
}

/// Either texts to tokenize or precomputed counts. Texts win when both are
/// present.
#[derive(Debug, Deserialize)]
struct TokenCostRequest {
    input_text: Option<String>,
    output_text: Option<String>,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    model: Option<String>,
}

async fn token_cost(
    State(state): State<AppState>,
    Json(request): Json<TokenCostRequest>,
) -> Result<Json<TokenCostInfo>, ApiError> {
    price_request(request, &state.config.openai_model, state.config.exchange_rate).map(Json)
}

fn price_request(
    request: TokenCostRequest,
    default_model: &str,
    exchange_rate: f64,
) -> Result<TokenCostInfo, ApiError> {
    let model = request.model.as_deref().unwrap_or(default_model);

    let result = if request.input_text.is_some() || request.output_text.is_some() {
        cost::estimate_token_cost(
            request.input_text.as_deref().unwrap_or_default(),
            request.output_text.as_deref().unwrap_or_default(),
            model,
            exchange_rate,
        )
    } else {
        cost::calculate_token_cost(request.input_tokens, request.output_tokens, model, exchange_rate)
    };

    result.map_err(|e| {
        error!("Token cost calculation failed: {}", e);
        let status = match e {
            CostError::Overflow { .. } => StatusCode::BAD_REQUEST,
            CostError::TokenizerUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e.to_string())
    })
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    template_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    analysis: Value,
    token_info: TokenCostInfo,
}

/// Analyze cached templates.
async fn analyze_templates(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let templates = select_templates(&state.search, &request.template_ids)?;

    let (analysis, token_info) = state
        .drafts
        .analyze_templates(&templates)
        .await
        .map_err(completion_failed)?;

    Ok(Json(AnalyzeResponse {
        analysis,
        token_info,
    }))
}

#[derive(Debug, Deserialize)]
struct AnalyzeDocumentRequest {
    #[serde(default)]
    text: String,
}

async fn analyze_document(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeDocumentRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Document text is required"));
    }
    Ok(Json(state.drafts.analyze_document(&request.text).await))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    template_ids: Vec<String>,
    #[serde(default)]
    user_input: DraftInput,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    id: String,
    created_at: String,
    template_ids: Vec<String>,
    user_input: DraftInput,
    draft: drafts::Draft,
    token_info: TokenCostInfo,
    status: &'static str,
}

/// Generate a report draft from cached templates.
async fn generate_draft(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    if request.user_input.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Draft details are required"));
    }
    let templates = select_templates(&state.search, &request.template_ids)?;

    let (draft, token_info) = state
        .drafts
        .generate_draft(&request.user_input, &templates)
        .await
        .map_err(completion_failed)?;

    let id = uuid::Uuid::new_v4().to_string();
    info!("Draft created: {}", id);

    Ok(Json(GenerateResponse {
        id,
        created_at: now_iso8601(),
        template_ids: request.template_ids,
        user_input: request.user_input,
        draft,
        token_info,
        status: "success",
    }))
}

/// Resolve template ids against previously cached search results.
fn select_templates(search: &SearchService, ids: &[String]) -> Result<Vec<SearchItem>, ApiError> {
    if ids.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Template ids are required"));
    }

    search.cache().find_items(ids).map_err(|missing| {
        warn!("Templates not in cache: {:?}", missing);
        api_error(
            StatusCode::NOT_FOUND,
            format!(
                "Templates not found: {}. Run the search again.",
                missing.join(", ")
            ),
        )
    })
}
