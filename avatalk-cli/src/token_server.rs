// Access token endpoint
//
// Mints short-lived streaming tokens from the vendor API key so the key never
// reaches the conversation front-end.

use anyhow::{anyhow, Context};
use avatalk_core::{Credential, TokenServerConfig};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const TOKEN_PATH: &str = "/api/get-access-token";

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct CreateTokenResponse {
    data: CreateTokenData,
}

#[derive(Deserialize)]
struct CreateTokenData {
    token: String,
}

#[derive(Clone)]
pub struct TokenServerState {
    client: Client,
    create_token_url: String,
    api_key: Arc<Credential>,
}

impl TokenServerState {
    pub fn new(config: &TokenServerConfig, api_key: Credential) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            create_token_url: format!(
                "{}/v1/streaming.create_token",
                config.upstream_base_url.trim_end_matches('/')
            ),
            api_key: Arc::new(api_key),
        })
    }

    /// Read the API key from the variable named by `api_key_env`.
    pub fn from_env(config: &TokenServerConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map(Credential::new)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("{} is not set", config.api_key_env))?;
        info!("Using API key {} from {}", api_key.redacted(), config.api_key_env);
        Self::new(config, api_key)
    }

    async fn create_token(&self) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.create_token_url)
            .header("x-api-key", self.api_key.expose())
            .send()
            .await
            .context("create_token request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("create_token returned {}", status));
        }

        let body: CreateTokenResponse = response
            .json()
            .await
            .context("create_token response is not the expected JSON")?;
        Ok(body.data.token)
    }
}

pub fn router(state: TokenServerState) -> Router {
    Router::new()
        .route(TOKEN_PATH, post(get_access_token))
        .with_state(state)
}

async fn get_access_token(State(state): State<TokenServerState>) -> Response {
    match state.create_token().await {
        Ok(token) => {
            debug!("Issued access token {}", Credential::new(token.as_str()).redacted());
            token.into_response()
        }
        Err(e) => {
            error!("Error retrieving access token: {:#}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Serve until Ctrl-C.
pub async fn serve(config: &TokenServerConfig) -> anyhow::Result<()> {
    let state = TokenServerState::from_env(config)?;
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Token server listening on http://{}{}", listener.local_addr()?, TOKEN_PATH);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("Token server stopped");
    Ok(())
}
