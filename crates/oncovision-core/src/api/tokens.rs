//! The two token endpoints: password exchange and access-token refresh.

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::ApiError;

/// Path of the credential-exchange endpoint, relative to the auth base URL
const TOKEN_PATH: &str = "api/token/";

/// Path of the refresh endpoint, relative to the auth base URL
const REFRESH_PATH: &str = "api/token/refresh/";

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Tokens issued by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Client for the token endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct TokenApi {
    client: Client,
    token_url: Url,
    refresh_url: Url,
}

impl TokenApi {
    pub fn new(client: Client, auth_base: &Url) -> Result<Self, ApiError> {
        Ok(Self {
            client,
            token_url: auth_base.join(TOKEN_PATH)?,
            refresh_url: auth_base.join(REFRESH_PATH)?,
        })
    }

    /// Exchange a username and password for an access/refresh pair.
    pub async fn obtain_pair(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        debug!(url = %self.token_url, username, "Requesting token pair");
        let response = self
            .client
            .post(self.token_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&TokenRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::CredentialsRejected { status });
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("token response: {}", e)))
    }

    /// Trade a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        debug!(url = %self.refresh_url, "Refreshing access token");
        let response = self
            .client
            .post(self.refresh_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&RefreshRequest { refresh: refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::RefreshRejected { status });
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("refresh response: {}", e)))?;
        Ok(body.access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let base = Url::parse("http://127.0.0.1:8080/").expect("url");
        let api = TokenApi::new(Client::new(), &base).expect("token api");
        assert_eq!(api.token_url.as_str(), "http://127.0.0.1:8080/api/token/");
        assert_eq!(api.refresh_url.as_str(), "http://127.0.0.1:8080/api/token/refresh/");
    }

    #[test]
    fn test_parse_token_pair() {
        let pair: TokenPair =
            serde_json::from_str(r#"{"access":"A1","refresh":"R1"}"#).expect("parse");
        assert_eq!(pair.access, "A1");
        assert_eq!(pair.refresh, "R1");
    }
}
