//! Scale conversion endpoints

use axum::{
    extract::Query,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiJson};
use super::AppState;
use crate::combat::{Conversion, Scale, ScaleInfo};

/// Build scale router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scales", get(list))
        .route("/scales/convert", post(convert))
        .route("/scales/suggest", get(suggest))
}

/// Reference data for every scale, smallest first
async fn list() -> impl IntoResponse {
    let infos: Vec<ScaleInfo> = Scale::all().iter().map(|s| s.info()).collect();
    Json(infos)
}

/// Conversion request
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub amount: f64,
    pub from: Scale,
    pub to: Scale,
}

async fn convert(ApiJson(req): ApiJson<ConvertRequest>) -> Result<impl IntoResponse, ApiError> {
    if !req.amount.is_finite() {
        return Err(ApiError::BadRequest("amount must be a finite number".into()));
    }
    Ok(Json(Conversion::new(req.amount, req.from, req.to)))
}

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    pub entity: String,
}

#[derive(Debug, Serialize)]
struct SuggestResponse {
    entity: String,
    scale: Scale,
}

/// Guess a scale from an entity description
async fn suggest(Query(query): Query<SuggestQuery>) -> impl IntoResponse {
    let scale = Scale::suggest(&query.entity);
    Json(SuggestResponse {
        entity: query.entity,
        scale,
    })
}
