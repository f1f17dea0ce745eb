//! REST API for the star registry
//!
//! Thin translation layer: parses requests, calls the registry, ledger and
//! identity store, and maps `ChainError` kinds to HTTP status codes.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::{parse_height, Block};
use crate::error::ChainError;
use crate::identity::{IdentityChallenge, VerificationOutcome};
use crate::registry::StarRegistry;
use crate::star::StarSubmission;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct Node {
    pub registry: Arc<StarRegistry>,
    started: Instant,
}

impl Node {
    pub fn new(registry: Arc<StarRegistry>) -> Self {
        Self {
            registry,
            started: Instant::now(),
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Chain(ChainError),
    InvalidInput(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Chain(ChainError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Chain(ChainError::NotAuthorized(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Chain(ChainError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Chain(ChainError::Crypto(_)) => StatusCode::BAD_REQUEST,
            ApiError::Chain(ChainError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Chain(e) => e.to_string(),
            ApiError::InvalidInput(msg) => msg,
        };

        (
            status,
            Json(ErrorResponse {
                status: status.as_u16(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Chain(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct ValidationRequest {
    #[serde(default)]
    pub address: String,
}

#[derive(Deserialize)]
pub struct SignatureRequest {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Deserialize)]
pub struct RegisterStarRequest {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub star: StarSubmission,
}

#[derive(Serialize)]
pub struct ChainValidationResponse {
    pub height: u64,
    pub valid: bool,
    pub invalid_heights: Vec<u64>,
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!(
            "{} cannot be empty. Please provide a valid {}",
            field,
            field.to_lowercase()
        )));
    }
    Ok(())
}

// ============================================================================
// Middleware
// ============================================================================

async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        // Ledger reads
        .route("/block/:height", get(get_block_by_height))
        .route("/stars/address/:address", get(get_stars_by_address))
        .route("/stars/hash/:hash", get(get_star_by_hash))
        .route("/chain/height", get(get_chain_height))
        .route("/chain/validate", get(validate_chain))
        // Identity workflow
        .route("/requestValidation", post(request_validation))
        .route("/message-signature/validate", post(validate_signature))
        // Gated write
        .route("/block", post(register_star))
        // System
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(node)
        .layer(cors)
}

pub async fn run_api_server(node: Arc<Node>, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(node);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Star registry API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "height": node.registry.ledger().height(),
        "uptime_seconds": node.started.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_block_by_height(
    State(node): State<Arc<Node>>,
    Path(height): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let height = parse_height(&height)?;
    Ok(Json(node.registry.ledger().get_by_height(height)?))
}

async fn get_stars_by_address(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Result<Json<Vec<Block>>, ApiError> {
    Ok(Json(node.registry.ledger().get_by_address(&address)?))
}

async fn get_star_by_hash(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(node.registry.ledger().get_by_hash(&hash)?))
}

async fn get_chain_height(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(node.registry.ledger().height())
}

async fn validate_chain(
    State(node): State<Arc<Node>>,
) -> Result<Json<ChainValidationResponse>, ApiError> {
    let ledger = node.registry.ledger();
    let invalid_heights = ledger.validate_chain()?;
    Ok(Json(ChainValidationResponse {
        height: ledger.height(),
        valid: invalid_heights.is_empty(),
        invalid_heights,
    }))
}

async fn request_validation(
    State(node): State<Arc<Node>>,
    Json(req): Json<ValidationRequest>,
) -> Result<Json<IdentityChallenge>, ApiError> {
    require("Address", &req.address)?;
    Ok(Json(node.registry.identity().get_or_issue(&req.address)?))
}

async fn validate_signature(
    State(node): State<Arc<Node>>,
    Json(req): Json<SignatureRequest>,
) -> Result<(StatusCode, Json<VerificationOutcome>), ApiError> {
    require("Address", &req.address)?;
    require("Signature", &req.signature)?;

    let outcome = node.registry.identity().verify(&req.address, &req.signature)?;
    let status = if outcome.register_star {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    Ok((status, Json(outcome)))
}

async fn register_star(
    State(node): State<Arc<Node>>,
    Json(req): Json<RegisterStarRequest>,
) -> Result<Json<Block>, ApiError> {
    require("Address", &req.address)?;
    Ok(Json(node.registry.submit_record(&req.address, req.star)?))
}
