//! Dice API endpoints

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::error::{ApiError, ApiJson};
use super::AppState;
use crate::combat::{parse_formula, RollMode};

/// Build dice router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dice/roll", post(roll))
        .route("/dice/history", get(history).delete(clear_history))
        .route("/dice/formula", post(evaluate))
        .route("/dice/formula/check", post(check))
}

/// Roll request
#[derive(Debug, Deserialize)]
pub struct RollRequest {
    #[serde(default)]
    pub modifier: i32,
    pub target_number: i32,
    #[serde(default)]
    pub mode: Option<RollMode>,
}

/// Roll 2d10 (3d10 keep two with advantage or disadvantage) against a target number
async fn roll(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RollRequest>,
) -> impl IntoResponse {
    let result = state.encounters.roll(
        req.modifier,
        req.target_number,
        req.mode.unwrap_or(RollMode::Normal),
    );
    Json(result)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Recent rolls, newest first
async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(state.encounters.rules().history_limit);
    Json(state.encounters.history(limit))
}

async fn clear_history(State(state): State<AppState>) -> impl IntoResponse {
    state.encounters.clear_history();
    StatusCode::NO_CONTENT
}

/// Formula request
#[derive(Debug, Deserialize)]
pub struct FormulaRequest {
    pub formula: String,
    #[serde(default)]
    pub attributes: HashMap<String, i32>,
}

/// Roll a dice formula such as "2d10+@agility"
async fn evaluate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FormulaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.encounters.evaluate(&req.formula, &req.attributes)?;
    Ok(Json(result))
}

#[derive(Debug, serde::Serialize)]
struct CheckResponse {
    formula: String,
    attributes: Vec<String>,
    min: Option<i64>,
    max: Option<i64>,
}

/// Parse a formula without rolling it
async fn check(ApiJson(req): ApiJson<FormulaRequest>) -> Result<impl IntoResponse, ApiError> {
    let formula = parse_formula(&req.formula)?;
    let bounds = formula.bounds(&req.attributes).ok();
    Ok(Json(CheckResponse {
        formula: formula.to_string(),
        attributes: formula.attributes().into_iter().map(String::from).collect(),
        min: bounds.map(|(low, _)| low),
        max: bounds.map(|(_, high)| high),
    }))
}
