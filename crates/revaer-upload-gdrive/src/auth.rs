//! Access-token refresh for Google Drive storage profiles.

use chrono::{Duration, Utc};
use reqwest::Client;
use revaer_data::DataStore;
use revaer_jobs_core::StorageCredentials;
use serde::Deserialize;

use crate::error::{GDriveError, GDriveResult};

/// Google's OAuth 2.0 token endpoint.
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Refreshes and persists a profile's Google Drive access token.
///
/// Grounded in the same "one POST, parse the JSON body, write the token back" shape a durable
/// refresh job would use, minus the actor/rate-limiter machinery such a job needs at scale: one
/// profile refresh per upload run does not warrant it here.
pub struct TokenRefresher {
    http_client: Client,
    token_endpoint: String,
}

impl TokenRefresher {
    /// Build a refresher using the default Google OAuth endpoint.
    #[must_use]
    pub fn new(http_client: Client) -> Self {
        Self { http_client, token_endpoint: TOKEN_ENDPOINT.to_string() }
    }

    /// Build a refresher against a custom token endpoint, for tests.
    #[must_use]
    pub fn with_endpoint(http_client: Client, token_endpoint: impl Into<String>) -> Self {
        Self { http_client, token_endpoint: token_endpoint.into() }
    }

    /// Exchange `profile`'s refresh token for a fresh access token and persist it via `store`.
    /// Returns the access token so the caller can use it immediately without a re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`GDriveError::WrongProviderType`] if the profile does not hold Drive credentials,
    /// [`GDriveError::NoRefreshToken`] if no refresh token is present, and
    /// [`GDriveError::RefreshFailed`] if the token endpoint rejects the request.
    pub async fn refresh(&self, store: &DataStore, profile_id: i64, credentials: &StorageCredentials) -> GDriveResult<String> {
        let StorageCredentials::GoogleDrive { client_id, client_secret, refresh_token, .. } = credentials else {
            return Err(GDriveError::WrongProviderType { profile_id });
        };
        if refresh_token.is_empty() {
            return Err(GDriveError::NoRefreshToken { profile_id });
        }

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GDriveError::RefreshFailed { profile_id, reason: format!("status {status}: {body}") });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|source| GDriveError::RefreshFailed { profile_id, reason: source.to_string() })?;

        let expires_at = Utc::now() + Duration::seconds(payload.expires_in);
        store
            .storage_profiles()
            .update_gdrive_access_token(profile_id, &payload.access_token, expires_at)
            .await?;
        Ok(payload.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_credentials(refresh_token: &str) -> StorageCredentials {
        StorageCredentials::GoogleDrive {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: refresh_token.into(),
            access_token: None,
            expires_at: None,
        }
    }

    #[test]
    fn empty_refresh_token_is_detected_before_any_request() {
        let credentials = drive_credentials("");
        let StorageCredentials::GoogleDrive { refresh_token, .. } = &credentials else {
            unreachable!("constructed as GoogleDrive above");
        };
        assert!(refresh_token.is_empty());
    }
}
