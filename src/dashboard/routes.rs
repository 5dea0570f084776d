//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::engine::{Orchestrator, PredictionPayload};
use crate::storage::{self, PredictionRow};
use crate::store::{Portfolio, PortfolioBook, Trade, TradeRequest};
use crate::types::{normalize_ticker, ProviderSelection, TradeError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub orchestrator: Orchestrator,
    pub portfolios: PortfolioBook,
    pub csv_path: String,
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<TradeError> for ApiError {
    fn from(e: TradeError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub provider: Option<String>,
}

/// GET /predict/:ticker?provider=xai|openai|both
pub async fn predict(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<PredictionPayload>, ApiError> {
    let ticker = normalize_ticker(&ticker)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid ticker: {ticker}")))?;
    let selection = match query.provider.as_deref() {
        None | Some("") => ProviderSelection::default(),
        Some(raw) => raw
            .parse::<ProviderSelection>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    info!(ticker = %ticker, selection = %selection, "Prediction requested");
    Ok(Json(state.orchestrator.predict(&ticker, selection).await))
}

/// GET /portfolio/:user
pub async fn get_portfolio(State(state): State<AppState>, Path(user): Path<String>) -> Json<Portfolio> {
    Json(state.portfolios.get_or_create(&user))
}

/// POST /trade
pub async fn trade(
    State(state): State<AppState>,
    body: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<Portfolio>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(format!("Missing required trade data: {e}")))?;
    let trade = Trade::try_from(request)?;
    match state.portfolios.execute(&trade) {
        Ok(portfolio) => Ok(Json(portfolio)),
        Err(e) => {
            warn!(user = %trade.user_id, ticker = %trade.ticker, error = %e, "Trade rejected");
            Err(e.into())
        }
    }
}

/// GET /api/predictions
pub async fn get_predictions(State(state): State<AppState>) -> Result<Json<Vec<PredictionRow>>, ApiError> {
    storage::read_predictions(&state.csv_path).map(Json).map_err(|e| {
        error!(error = %e, path = %state.csv_path, "Failed to read predictions");
        ApiError::internal("Could not read predictions data")
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
