use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{EntityKind, Place, SimilarityResult},
    services::{
        catalog::{
            self, ContributorDetail, ContributorQuery, ContributorSummary, DirectoryEntry,
            PlaceDetail, PlaceQuery, UserProfile,
        },
        narrative::PlaceComparison,
        recommendations,
    },
};

use super::AppState;

// Request/Response types

const DEFAULT_K: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub k: Option<i64>,
}

impl SimilarQuery {
    fn k(&self) -> AppResult<usize> {
        let k = self.k.unwrap_or(DEFAULT_K);
        if k < 1 {
            return Err(AppError::InvalidInput(format!("k must be at least 1, got {}", k)));
        }
        Ok(k as usize)
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub id: i64,
    /// Absent when there is too little review text to summarize
    pub summary: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub user_id: i64,
    pub followed: Vec<i64>,
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let status = state.coordinator.status().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "generation": status.generation,
            "degraded": status.degraded,
            "age_secs": status.age_secs,
            "vector_sets": status.vector_sets,
        })),
    )
}

pub async fn list_places(
    State(state): State<AppState>,
    Query(query): Query<PlaceQuery>,
) -> Json<Vec<Place>> {
    let snapshot = state.coordinator.get_snapshot().await;
    Json(catalog::search_places(&snapshot, &query))
}

pub async fn place_directory(State(state): State<AppState>) -> Json<Vec<DirectoryEntry>> {
    let snapshot = state.coordinator.get_snapshot().await;
    Json(catalog::place_directory(&snapshot))
}

pub async fn get_place(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
) -> AppResult<Json<PlaceDetail>> {
    let snapshot = state.coordinator.get_snapshot().await;
    catalog::place_detail(&snapshot, place_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Place {} not found", place_id)))
}

/// Places whose rating profile and reviewers most resemble this one
pub async fn similar_places(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
    Query(query): Query<SimilarQuery>,
) -> AppResult<Json<Vec<SimilarityResult>>> {
    let k = query.k()?;
    let neighbors =
        recommendations::top_k_similar(&state.coordinator, EntityKind::Place, place_id, k).await;
    Ok(Json(neighbors.results))
}

pub async fn place_summary(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
) -> AppResult<Json<SummaryResponse>> {
    let snapshot = state.coordinator.get_snapshot().await;
    if snapshot.place(place_id).is_none() {
        return Err(AppError::NotFound(format!("Place {} not found", place_id)));
    }

    let summary = state.narrative.place_summary(&snapshot, place_id).await;
    Ok(Json(SummaryResponse {
        id: place_id,
        summary,
    }))
}

pub async fn compare_places(
    State(state): State<AppState>,
    Query(query): Query<CompareQuery>,
) -> AppResult<Json<PlaceComparison>> {
    let snapshot = state.coordinator.get_snapshot().await;
    let find = |id: i64| {
        snapshot
            .place(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Place {} not found", id)))
    };
    let (a, b) = (find(query.a)?, find(query.b)?);

    Ok(Json(state.narrative.compare(&snapshot, &a, &b).await))
}

pub async fn list_contributors(
    State(state): State<AppState>,
    Query(query): Query<ContributorQuery>,
) -> Json<Vec<ContributorSummary>> {
    let snapshot = state.coordinator.get_snapshot().await;
    Json(catalog::search_contributors(&snapshot, &query))
}

pub async fn get_contributor(
    State(state): State<AppState>,
    Path(contributor_id): Path<i64>,
) -> AppResult<Json<ContributorDetail>> {
    let snapshot = state.coordinator.get_snapshot().await;
    catalog::contributor_detail(&snapshot, contributor_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Contributor {} not found", contributor_id)))
}

/// Contributors who rate like this one and visit the same places
pub async fn similar_contributors(
    State(state): State<AppState>,
    Path(contributor_id): Path<i64>,
    Query(query): Query<SimilarQuery>,
) -> AppResult<Json<Vec<SimilarityResult>>> {
    let k = query.k()?;
    let neighbors = recommendations::top_k_similar(
        &state.coordinator,
        EntityKind::Contributor,
        contributor_id,
        k,
    )
    .await;
    Ok(Json(neighbors.results))
}

pub async fn contributor_summary(
    State(state): State<AppState>,
    Path(contributor_id): Path<i64>,
) -> AppResult<Json<SummaryResponse>> {
    let snapshot = state.coordinator.get_snapshot().await;
    if snapshot.contributor(contributor_id).is_none() {
        return Err(AppError::NotFound(format!(
            "Contributor {} not found",
            contributor_id
        )));
    }

    let summary = state
        .narrative
        .contributor_profile(&snapshot, contributor_id)
        .await;
    Ok(Json(SummaryResponse {
        id: contributor_id,
        summary,
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<UserProfile>> {
    let snapshot = state.coordinator.get_snapshot().await;
    catalog::user_profile(&snapshot, user_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

pub async fn follow(
    State(state): State<AppState>,
    Path((user_id, contributor_id)): Path<(i64, i64)>,
) -> AppResult<Json<FollowResponse>> {
    let followed = state.writes.follow(user_id, contributor_id).await?;
    Ok(Json(FollowResponse { user_id, followed }))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path((user_id, contributor_id)): Path<(i64, i64)>,
) -> AppResult<Json<FollowResponse>> {
    let followed = state.writes.unfollow(user_id, contributor_id).await?;
    Ok(Json(FollowResponse { user_id, followed }))
}

/// Drops the cached snapshot so the next read reloads from the store
pub async fn invalidate_cache(State(state): State<AppState>) -> StatusCode {
    state.coordinator.invalidate().await;
    StatusCode::NO_CONTENT
}
