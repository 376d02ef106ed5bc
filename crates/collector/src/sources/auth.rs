//! OAuth token acquisition against a UAA token endpoint.

use super::SourceError;
use serde::Deserialize;
use tracing::debug;

/// Client id the platform manager's UAA issues user tokens for.
pub const PLATFORM_MANAGER_CLIENT_ID: &str = "opsman";

/// Credentials used to obtain an access token.
#[derive(Clone)]
pub enum Grant {
    /// Resource owner password grant.
    Password {
        client_id: String,
        username: String,
        password: String,
    },
    /// Client credentials grant.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grant::Password {
                client_id,
                username,
                ..
            } => f
                .debug_struct("Password")
                .field("client_id", client_id)
                .field("username", username)
                .finish_non_exhaustive(),
            Grant::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fetch an access token from `token_url`.
pub async fn fetch_token(
    client: &reqwest::Client,
    token_url: reqwest::Url,
    grant: &Grant,
) -> Result<String, SourceError> {
    debug!("Fetching token from {} ({:?})", token_url, grant);

    let request = match grant {
        Grant::Password {
            client_id,
            username,
            password,
        } => client
            .post(token_url.clone())
            .basic_auth(client_id, Some(""))
            .form(&[
                ("grant_type", "password"),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ]),
        Grant::ClientCredentials {
            client_id,
            client_secret,
        } => client
            .post(token_url.clone())
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")]),
    };

    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|source| SourceError::Request {
            url: token_url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::UnexpectedStatus {
            url: token_url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|source| SourceError::Request {
        url: token_url.to_string(),
        source,
    })?;
    let token: TokenResponse =
        serde_json::from_slice(&body).map_err(|source| SourceError::Decode {
            url: token_url.to_string(),
            source,
        })?;

    Ok(token.access_token)
}
