//! Store API handlers.
//!
//! Called by the chat front end and the match watcher on the trusted
//! internal network, so requests carry no credentials.
//!
//! # Endpoints
//!
//! - `POST /add_summoner`    – start tracking a player in a guild
//! - `GET  /get_summoners`   – list every tracked player
//! - `POST /update_summoner` – move a player (matched by name) to a new guild/tagline

use axum::{
    Router,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use zinger_core::entities::RepositoryError;

use crate::state::AppState;

mod players;

/// Build the Store API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add_summoner", post(players::add_summoner))
        .route("/get_summoners", get(players::get_summoners))
        .route("/update_summoner", post(players::update_summoner))
}

/// Errors that can occur in Store API handlers.
#[derive(Debug)]
pub(crate) enum StoreApiError {
    /// Body is not valid JSON or has a blank field.
    InvalidBody(String),
    /// The player is already tracked in that guild.
    Conflict,
    NotFound,
    Database(sqlx::Error),
}

impl From<RepositoryError> for StoreApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict => StoreApiError::Conflict,
            RepositoryError::Database(e) => StoreApiError::Database(e),
        }
    }
}

impl From<JsonRejection> for StoreApiError {
    fn from(rejection: JsonRejection) -> Self {
        StoreApiError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for StoreApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            StoreApiError::InvalidBody(reason) => {
                (StatusCode::BAD_REQUEST, format!("invalid request body: {reason}"))
                    .into_response()
            }
            StoreApiError::Conflict => (
                StatusCode::CONFLICT,
                "player is already tracked in this guild",
            )
                .into_response(),
            StoreApiError::NotFound => {
                (StatusCode::NOT_FOUND, "player not found").into_response()
            }
            StoreApiError::Database(e) => {
                tracing::error!(error = %e, "Store API database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
