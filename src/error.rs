use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::EntityKind;

/// Failures inside the recommendation core
///
/// None of these ever reach a caller of the core. Each one is absorbed where it
/// happens and replaced with its fallback value: a stale or empty snapshot, a
/// default field value, or an empty result list.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Catalog source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed {relation}.{field}, using default")]
    MalformedRecord {
        relation: &'static str,
        field: &'static str,
    },

    #[error("Unknown {kind} id {id}")]
    UnknownEntity { kind: EntityKind, id: i64 },

    #[error("Not enough {0} entities to rank")]
    EmptyCatalog(EntityKind),
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_messages() {
        let err = CatalogError::UnknownEntity {
            kind: EntityKind::Place,
            id: 42,
        };
        assert_eq!(err.to_string(), "Unknown place id 42");

        let err = CatalogError::MalformedRecord {
            relation: "reviews",
            field: "rating",
        };
        assert_eq!(err.to_string(), "Malformed reviews.rating, using default");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::NotFound("place 7".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_input_maps_to_400() {
        let response = AppError::InvalidInput("k must be at least 1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
