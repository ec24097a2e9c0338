//! Store API client (front end / Match Watcher → tracked-player store).

use reqwest::{Client, StatusCode};
use url::Url;

use super::ClientError;
use crate::objects::{StatusResponse, TrackedPlayer};

/// Typed HTTP client for the tracked-player **store**.
///
/// The store is reachable only on the trusted internal network, so requests
/// carry no credentials.
#[derive(Debug, Clone)]
pub struct StoreClient {
    http: Client,
    base_url: Url,
}

impl StoreClient {
    /// Create a new `StoreClient`.
    ///
    /// * `base_url` – root URL of the store (e.g. `http://db-service:8000`).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /add_summoner` – start tracking a player. Expects `201 Created`.
    pub async fn add_player(&self, player: &TrackedPlayer) -> Result<StatusResponse, ClientError> {
        let url = self.base_url.join("/add_summoner")?;
        let resp = self.http.post(url).json(player).send().await?;
        parse_response(resp, StatusCode::CREATED).await
    }

    /// `POST /update_summoner` – update the player with the same name.
    pub async fn update_player(
        &self,
        player: &TrackedPlayer,
    ) -> Result<StatusResponse, ClientError> {
        let url = self.base_url.join("/update_summoner")?;
        let resp = self.http.post(url).json(player).send().await?;
        parse_response(resp, StatusCode::OK).await
    }

    /// `GET /get_summoners` – list every tracked player.
    pub async fn list_players(&self) -> Result<Vec<TrackedPlayer>, ClientError> {
        let url = self.base_url.join("/get_summoners")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp, StatusCode::OK).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    expected: StatusCode,
) -> Result<T, ClientError> {
    let status = resp.status();
    if status != expected {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
