//! API error type and JSON extractor

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::combat::{EncounterError, FormulaError};
use crate::encounters::ManagerError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Errors returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("invalid formula: {0}")]
    Formula(#[from] FormulaError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<EncounterError> for ApiError {
    fn from(e: EncounterError) -> Self {
        ApiError::Manager(ManagerError::Encounter(e))
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Manager(ManagerError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "encounter_not_found")
            }
            ApiError::Manager(ManagerError::CombatantNotFound(_)) => {
                (StatusCode::NOT_FOUND, "combatant_not_found")
            }
            ApiError::Manager(ManagerError::Encounter(e)) => match e {
                EncounterError::EmptyEncounter => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "empty_encounter")
                }
                EncounterError::AlreadyActive => (StatusCode::CONFLICT, "already_active"),
                EncounterError::CombatNotActive => (StatusCode::CONFLICT, "combat_not_active"),
                EncounterError::InvalidSnapshot(_) => (StatusCode::BAD_REQUEST, "invalid_snapshot"),
            },
            ApiError::Formula(_) => (StatusCode::BAD_REQUEST, "invalid_formula"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code,
            }),
        )
            .into_response()
    }
}

/// `Json` extractor whose rejections use the API error shape
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ManagerError::NotFound(Uuid::nil()).into(), StatusCode::NOT_FOUND),
            (ManagerError::CombatantNotFound(3).into(), StatusCode::NOT_FOUND),
            (EncounterError::EmptyEncounter.into(), StatusCode::UNPROCESSABLE_ENTITY),
            (EncounterError::AlreadyActive.into(), StatusCode::CONFLICT),
            (EncounterError::CombatNotActive.into(), StatusCode::CONFLICT),
            (
                EncounterError::InvalidSnapshot("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (FormulaError::Empty.into(), StatusCode::BAD_REQUEST),
            (ApiError::BadRequest("nope".into()), StatusCode::BAD_REQUEST),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
