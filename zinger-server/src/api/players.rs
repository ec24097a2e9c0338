use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use zinger_sdk::objects::{StatusResponse, TrackedPlayer};

use super::StoreApiError;
use crate::state::AppState;

fn validated(
    payload: Result<Json<TrackedPlayer>, JsonRejection>,
) -> Result<TrackedPlayer, StoreApiError> {
    let Json(player) = payload?;
    match player.blank_field() {
        Some(field) => Err(StoreApiError::InvalidBody(format!(
            "{field} must not be blank"
        ))),
        None => Ok(player),
    }
}

async fn invalidate_cached_list(state: &AppState) {
    if let Err(e) = state.cache.invalidate_players().await {
        tracing::warn!(error = %e, "Failed to invalidate cached player list");
    }
}

/// `POST /add_summoner`: start tracking a player.
pub async fn add_summoner(
    State(state): State<AppState>,
    payload: Result<Json<TrackedPlayer>, JsonRejection>,
) -> Result<impl IntoResponse, StoreApiError> {
    let player = validated(payload)?;
    state.players.add(&player).await?;
    invalidate_cached_list(&state).await;

    tracing::info!(
        player = %player.riot_id(),
        guild_id = %player.summoner_guild_id,
        "Tracking player"
    );
    Ok((StatusCode::CREATED, Json(StatusResponse::success())))
}

/// `GET /get_summoners`: list tracked players, read through the cache.
///
/// The cache is only filled if no add or update invalidated it while the
/// list was being read.
pub async fn get_summoners(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StoreApiError> {
    let generation = match state.cache.cached_players().await {
        Ok(Some(players)) => return Ok(Json(players)),
        Ok(None) => state
            .cache
            .players_generation()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to read player list generation"))
            .ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Player list cache unavailable");
            None
        }
    };

    let players = state.players.list().await?;
    if let Some(generation) = generation {
        if let Err(e) = state.cache.store_players(&players, generation).await {
            tracing::warn!(error = %e, "Failed to cache player list");
        }
    }
    Ok(Json(players))
}

/// `POST /update_summoner`: update the player with the same name.
pub async fn update_summoner(
    State(state): State<AppState>,
    payload: Result<Json<TrackedPlayer>, JsonRejection>,
) -> Result<impl IntoResponse, StoreApiError> {
    let player = validated(payload)?;
    let updated = state.players.update_by_name(&player).await?;
    if updated == 0 {
        return Err(StoreApiError::NotFound);
    }
    invalidate_cached_list(&state).await;

    tracing::info!(
        player = %player.riot_id(),
        guild_id = %player.summoner_guild_id,
        updated,
        "Updated player"
    );
    Ok(Json(StatusResponse::success()))
}
