use crate::api::auth::Authenticator;
use crate::error::{AppError, AppResult};
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const BASE_URL: &str = "https://api.spotify.com/v1";

/// Shared HTTP client with a bounded timeout; every outbound call in the
/// crate goes through one of these.
pub fn build_http(timeout: Duration) -> AppResult<reqwest::Client> {
    let http = reqwest::Client::builder()
        .user_agent("nowbar/0.1.0")
        .timeout(timeout)
        .build()?;
    Ok(http)
}

/// Thin authenticated wrapper over the playback API. Tokens come from
/// the authenticator, which refreshes expired credentials before the
/// request goes out.
pub struct SpotifyClient {
    http: reqwest::Client,
    auth: Arc<Authenticator>,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, auth: Arc<Authenticator>) -> Self {
        Self { http, auth }
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let url = format!("{}{}", BASE_URL, path);

        let mut request = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", token));
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        self.check_response(response).await
    }

    pub async fn get(&self, path: &str) -> AppResult<reqwest::Response> {
        self.request(Method::GET, path, &[]).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let response = self.get(path).await?;
        Ok(response.json().await?)
    }

    pub async fn put(&self, path: &str, query: &[(&str, String)]) -> AppResult<reqwest::Response> {
        self.request(Method::PUT, path, query).await
    }

    pub async fn post(&self, path: &str) -> AppResult<reqwest::Response> {
        self.request(Method::POST, path, &[]).await
    }

    pub async fn delete(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<reqwest::Response> {
        self.request(Method::DELETE, path, query).await
    }

    async fn check_response(&self, response: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            // The token was fresh by expiry but the server rejected it:
            // revoked or invalidated. Drop it and ask for a new login.
            log::warn!("[client] bearer token rejected, clearing credentials");
            let _ = self.auth.logout();
            Err(AppError::ReauthRequired)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            Err(AppError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
