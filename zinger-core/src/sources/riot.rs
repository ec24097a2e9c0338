//! Match-data source backed by the Riot Games API.
//!
//! Uses account-v1 to resolve a Riot id to a PUUID and tft-match-v1 for
//! match ids and match details. Both live on the regional routing host
//! (`americas`, `europe`, `asia`, `sea`).

use super::{MatchDetail, MatchSource, SourceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-Riot-Token";

#[derive(Debug, Deserialize)]
struct Account {
    puuid: String,
}

/// [`MatchSource`] talking to `https://<routing>.api.riotgames.com`.
#[derive(Debug, Clone)]
pub struct RiotMatchSource {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl RiotMatchSource {
    /// Create a source for the given regional routing value.
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(api_key: impl Into<String>, routing: &str, timeout: Duration) -> Self {
        Self::with_base_url(
            api_key,
            format!("https://{routing}.api.riotgames.com"),
            timeout,
        )
    }

    /// Create a source against an arbitrary base URL.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    /// Replace the default `reqwest::Client`.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    fn account_url(&self, name: &str, tagline: &str) -> String {
        format!(
            "{}/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.base_url,
            urlencoding::encode(name),
            urlencoding::encode(tagline)
        )
    }

    fn match_ids_url(&self, puuid: &str) -> String {
        format!(
            "{}/tft/match/v1/matches/by-puuid/{}/ids",
            self.base_url,
            urlencoding::encode(puuid)
        )
    }

    fn match_url(&self, match_id: &str) -> String {
        format!(
            "{}/tft/match/v1/matches/{}",
            self.base_url,
            urlencoding::encode(match_id)
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, SourceError> {
        let send = async {
            let response = request
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(SourceError::NotFound(what.to_string()));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SourceError::Api {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(response.json::<T>().await?)
        };

        tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| SourceError::TimedOut(self.timeout))?
    }
}

#[async_trait]
impl MatchSource for RiotMatchSource {
    async fn resolve_puuid(&self, name: &str, tagline: &str) -> Result<String, SourceError> {
        let request = self.http.get(self.account_url(name, tagline));
        let account: Account = self
            .get_json(request, &format!("account {name}#{tagline}"))
            .await?;
        debug!(player = %format!("{name}#{tagline}"), "Resolved PUUID");
        Ok(account.puuid)
    }

    async fn recent_match_ids(
        &self,
        puuid: &str,
        start_time: i64,
        count: u32,
    ) -> Result<Vec<String>, SourceError> {
        let request = self.http.get(self.match_ids_url(puuid)).query(&[
            ("start", "0".to_string()),
            ("count", count.to_string()),
            ("startTime", start_time.to_string()),
        ]);
        self.get_json(request, "match ids").await
    }

    async fn match_detail(&self, match_id: &str) -> Result<MatchDetail, SourceError> {
        let request = self.http.get(self.match_url(match_id));
        self.get_json(request, &format!("match {match_id}")).await
    }
}
