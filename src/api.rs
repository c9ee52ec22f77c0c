//! HTTP API Server
//!
//! JSON endpoints over the ranking engine's public operations.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::ranking::{
    AlgorithmPerformance, ContentMetric, InteractionKind, RankingEngine, ScoredContent,
    UserInsights,
};

/// Shared application state
pub struct AppState {
    pub engine: Arc<RankingEngine>,
}

/// Query params for feed endpoints
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

impl FeedQuery {
    /// Unwrap the extractor, turning a bad query string into a JSON 400
    fn from_extracted(query: std::result::Result<Query<Self>, QueryRejection>) -> Result<Self> {
        query
            .map(|Query(q)| q)
            .map_err(|e| Error::bad_request(e.body_text()))
    }

    fn capped_limit(&self) -> usize {
        self.limit.min(MAX_LIMIT)
    }
}

/// Upper bound on a single page
const MAX_LIMIT: usize = 500;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response for feed endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    pub items: Vec<FeedItem>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub content_id: String,
    pub score: f64,
}

impl From<ScoredContent> for FeedItem {
    fn from(scored: ScoredContent) -> Self {
        Self {
            content_id: scored.content_id,
            score: scored.score,
        }
    }
}

impl FeedResponse {
    fn from_scored(scored: Vec<ScoredContent>) -> Self {
        let items: Vec<FeedItem> = scored.into_iter().map(FeedItem::from).collect();
        Self {
            total: items.len(),
            items,
        }
    }
}

/// Request body for recording interactions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub user_id: String,
    pub content_id: String,
    pub kind: String,
    pub duration_ms: Option<u64>,
}

/// Request body for registering content
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub content_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the router
pub fn router(engine: Arc<RankingEngine>, cors_enabled: bool) -> Router {
    let state = Arc::new(AppState { engine });

    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Writes
        .route("/api/v1/interactions", post(record_interaction))
        .route("/api/v1/content", post(register_content))
        // Feeds
        .route("/api/v1/feed/:user_id", get(get_personalized_feed))
        .route("/api/v1/trending", get(get_trending))
        // Insights
        .route("/api/v1/insights/users/:user_id", get(get_user_insights))
        .route("/api/v1/insights/content/:content_id", get(get_content_insights))
        .route("/api/v1/performance", get(get_performance))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state);

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app.layer(cors)
    } else {
        app
    }
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    engine: Arc<RankingEngine>,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(engine, config.cors_enabled);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting ranking API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Record a user interaction
async fn record_interaction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InteractionRequest>,
) -> Result<StatusCode> {
    if req.user_id.is_empty() || req.content_id.is_empty() {
        return Err(Error::bad_request("userId and contentId are required"));
    }
    let kind: InteractionKind = req.kind.parse()?;

    state
        .engine
        .track(&req.user_id, &req.content_id, kind, req.duration_ms);
    Ok(StatusCode::CREATED)
}

/// Register content tags and creation time
async fn register_content(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContentRequest>,
) -> Result<StatusCode> {
    if req.content_id.is_empty() {
        return Err(Error::bad_request("contentId is required"));
    }

    state
        .engine
        .register_content(&req.content_id, &req.tags, req.created_at);
    Ok(StatusCode::CREATED)
}

/// Get personalized feed - unseen content ranked for this user
async fn get_personalized_feed(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    query: std::result::Result<Query<FeedQuery>, QueryRejection>,
) -> Result<Json<FeedResponse>> {
    let query = FeedQuery::from_extracted(query)?;
    let scored = state
        .engine
        .personalized_feed_scored(&user_id, query.capped_limit());
    Ok(Json(FeedResponse::from_scored(scored)))
}

/// Get trending content
async fn get_trending(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<FeedQuery>, QueryRejection>,
) -> Result<Json<FeedResponse>> {
    let query = FeedQuery::from_extracted(query)?;
    let scored = state.engine.trending_scored(query.capped_limit());
    Ok(Json(FeedResponse::from_scored(scored)))
}

async fn get_user_insights(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<UserInsights> {
    Json(state.engine.user_insights(&user_id))
}

async fn get_content_insights(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> Result<Json<ContentMetric>> {
    state
        .engine
        .content_insights(&content_id)
        .map(Json)
        .ok_or_else(|| Error::not_found("content", content_id))
}

async fn get_performance(State(state): State<Arc<AppState>>) -> Json<AlgorithmPerformance> {
    Json(state.engine.algorithm_performance())
}
