//! Identity gate and identity providers

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::Deserialize;
use shopora_store::Identity;
use tracing::{debug, info};

use crate::error::ChatError;

/// What the chat knows about the current user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    pub identity: Option<Identity>,
    pub resolving: bool,
}

impl IdentityState {
    pub fn resolving() -> Self {
        Self {
            identity: None,
            resolving: true,
        }
    }

    pub fn resolved(identity: Option<Identity>) -> Self {
        Self {
            identity,
            resolving: false,
        }
    }

    /// Identity usable for chat actions: present and no longer resolving
    pub fn ready(&self) -> Option<&Identity> {
        if self.resolving {
            None
        } else {
            self.identity.as_ref()
        }
    }
}

impl Default for IdentityState {
    fn default() -> Self {
        Self::resolving()
    }
}

/// Source of the signed-in user's address
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_identity(&self) -> Result<Option<Identity>, ChatError>;
}

/// Fixed identity
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    identity: Option<Identity>,
}

impl StaticIdentityProvider {
    pub fn new(identity: Option<Identity>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, ChatError> {
        Ok(self.identity.clone())
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    #[allow(dead_code)]
    id: String,
    email: String,
}

/// Asks the storefront backend who the session cookie belongs to
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    api_url: String,
}

impl HttpIdentityProvider {
    pub fn new(api_url: &str) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Self::with_client(client, api_url)
    }

    /// Provider that sends `cookie` (e.g. `token=...`) with every request
    pub fn with_session_cookie(api_url: &str, cookie: &str) -> Result<Self, ChatError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ChatError::Identity(format!("invalid cookie: {}", e)))?;
        headers.insert(COOKIE, value);

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;
        Self::with_client(client, api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: &str) -> Result<Self, ChatError> {
        url::Url::parse(api_url)?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    /// End the backend session
    pub async fn sign_out(&self) -> Result<(), ChatError> {
        self.client
            .post(self.endpoint("public-log-out"))
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;
        info!("Signed out");
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    /// Any failure (network, 401, malformed body) means "not signed in"
    async fn current_identity(&self) -> Result<Option<Identity>, ChatError> {
        let response = match self
            .client
            .get(self.endpoint("public-protected"))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Identity request failed: {}", e);
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            debug!("Identity request returned {}", response.status());
            return Ok(None);
        }

        match response.json::<AuthResponse>().await {
            Ok(auth) => Ok(Some(Identity::new(auth.user.email))),
            Err(e) => {
                debug!("Unreadable identity response: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_requires_resolution() {
        let id = Identity::new("alice@example.com");
        let mut state = IdentityState::resolving();
        assert!(state.ready().is_none());

        state.identity = Some(id.clone());
        assert!(state.ready().is_none());

        let state = IdentityState::resolved(Some(id.clone()));
        assert_eq!(state.ready(), Some(&id));
        assert!(IdentityState::resolved(None).ready().is_none());
    }

    #[test]
    fn test_http_provider_rejects_bad_url() {
        assert!(HttpIdentityProvider::new("not a url").is_err());
    }

    #[test]
    fn test_http_provider_endpoints() {
        let provider = HttpIdentityProvider::new("https://api.example.com/").unwrap();
        assert_eq!(
            provider.endpoint("public-protected"),
            "https://api.example.com/public-protected"
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_resolves_to_absent() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let provider = HttpIdentityProvider::new("http://127.0.0.1:9").unwrap();
        assert!(provider.current_identity().await.unwrap().is_none());
    }
}
