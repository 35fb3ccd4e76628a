//! reqwest implementation of [`HubClient`]
//!
//! Endpoints (relative to `hub.url`):
//! - `POST /auth` exchanges `{apiKey, secretKey}` for `{token}`
//! - `GET /ping` validates a bearer token
//! - `PUT /products/price-batch` and `PUT /products/stock-batch` submit batches
//!
//! Every request carries the `App-Token` header. Non-2xx responses become
//! [`HubError::Status`]; transport failures become [`HubError::Network`].

use std::time::Duration;

use async_trait::async_trait;
use hubrelay_core::{HubClient, HubError};
use hubrelay_domain::constants::APP_TOKEN_HEADER;
use hubrelay_domain::{
    BearerToken, DispatchResult, HubBatch, HubConfig, HubRelayError, HubResponse,
    PartitionCredentials,
};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::HttpClient;

const AUTH_PATH: &str = "/auth";
const PING_PATH: &str = "/ping";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    api_key: &'a str,
    secret_key: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Hub client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpHubClient {
    http: HttpClient,
    base_url: String,
}

impl HttpHubClient {
    /// Build a client from the hub settings.
    pub fn new(config: &HubConfig) -> Result<Self, HubRelayError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_header(APP_TOKEN_HEADER, &config.app_token)
            .build()?;
        Ok(Self::with_http_client(http, &config.url))
    }

    pub fn with_http_client(http: HttpClient, base_url: &str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    #[instrument(
        skip(self, token, batch),
        fields(endpoint = batch.endpoint(), items = batch.len())
    )]
    async fn submit_batch(
        &self,
        token: &BearerToken,
        batch: &HubBatch,
    ) -> Result<DispatchResult, HubError> {
        let request = self
            .http
            .request(Method::PUT, self.url(batch.endpoint()))
            .header(AUTHORIZATION, token.as_str())
            .json(batch);
        let response = ensure_success(self.http.send(request).await.map_err(transport_error)?)
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        let hub_response = if body.trim().is_empty() {
            HubResponse::default()
        } else {
            serde_json::from_str::<HubResponse>(&body)
                .map_err(|err| HubError::Decode(err.to_string()))?
        };

        let result = hub_response.into_dispatch_result(status);
        debug!(id = result.id, status, "hub accepted batch request");
        Ok(result)
    }

    async fn issue_token(
        &self,
        credentials: &PartitionCredentials,
    ) -> Result<Option<String>, HubError> {
        let payload =
            AuthRequest { api_key: &credentials.api_key, secret_key: &credentials.secret_key };
        let request = self.http.request(Method::POST, self.url(AUTH_PATH)).json(&payload);
        let response = ensure_success(self.http.send(request).await.map_err(transport_error)?)
            .await?;

        let body: TokenResponse =
            response.json().await.map_err(|err| HubError::Decode(err.to_string()))?;
        Ok(body.token.filter(|token| !token.is_empty()))
    }

    async fn validate_token(&self, token: &BearerToken) -> Result<(), HubError> {
        let request = self
            .http
            .request(Method::GET, self.url(PING_PATH))
            .header(AUTHORIZATION, token.as_str());
        ensure_success(self.http.send(request).await.map_err(transport_error)?).await?;
        Ok(())
    }
}

/// Pass 2xx responses through; turn anything else into [`HubError::Status`].
async fn ensure_success(response: Response) -> Result<Response, HubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        body
    };
    Err(HubError::status(status.as_u16(), message))
}

fn transport_error(err: reqwest::Error) -> HubError {
    if err.is_timeout() {
        HubError::timeout(err.to_string())
    } else if err.is_decode() {
        HubError::Decode(err.to_string())
    } else {
        HubError::network(err.to_string())
    }
}
