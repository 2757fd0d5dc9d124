//! Access Token Acquisition
//!
//! The room service hands out credentials through a small HTTP endpoint.
//! The core never inspects the token; it only carries the opaque value into
//! `connect`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Connection timeout for the token endpoint.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Overall request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Opaque credential for the room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors from the token endpoint.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint rejected the request (HTTP {status})")]
    Rejected { status: u16 },

    #[error("token endpoint returned no token")]
    Empty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    room_name: &'a str,
    participant_name: &'a str,
    is_host: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Client for the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Client,
    endpoint: String,
}

impl TokenClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Request a credential for joining `room` as `participant_name`.
    pub async fn fetch(
        &self,
        room: &str,
        participant_name: &str,
        is_host: bool,
    ) -> Result<AccessToken, TokenError> {
        debug!(room, participant_name, is_host, "requesting access token");

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&TokenRequest {
                room_name: room,
                participant_name,
                is_host,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TokenError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = resp.json().await?;
        if body.token.is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(AccessToken(body.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_the_endpoint_field_names() {
        let body = serde_json::to_value(TokenRequest {
            room_name: "friday",
            participant_name: "Alice",
            is_host: true,
        })
        .unwrap();

        assert_eq!(body["roomName"], "friday");
        assert_eq!(body["participantName"], "Alice");
        assert_eq!(body["isHost"], true);
    }

    #[test]
    fn token_stays_opaque() {
        let token = AccessToken::new("jwt.goes.here");
        assert_eq!(token.as_str(), "jwt.goes.here");
    }
}
