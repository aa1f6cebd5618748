//! Session and pending-authorization records.

use serde::{Deserialize, Serialize};

use crate::server::{AuthorizationServerMetadata, DpopKey};

/// Token pair issued by the authorization server.
///
/// `expires_at` is an absolute timestamp in milliseconds since the Unix epoch,
/// computed by the protocol layer from the `expires_in` of the token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(rename = "type", default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

fn default_token_type() -> String {
    "DPoP".to_string()
}

impl TokenSet {
    /// Create a DPoP-bound access token with no refresh token and no expiry.
    pub fn new(access: impl Into<String>) -> Self {
        Self {
            token_type: default_token_type(),
            scope: String::new(),
            access: access.into(),
            refresh: None,
            expires_at: None,
        }
    }

    /// Set the refresh token.
    pub fn with_refresh(mut self, refresh: impl Into<String>) -> Self {
        self.refresh = Some(refresh.into());
        self
    }

    /// Set the absolute expiry (ms since epoch).
    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the granted scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Whether the session can outlive its access token.
    pub fn is_refreshable(&self) -> bool {
        self.refresh.is_some()
    }
}

/// Identity of the account a session belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Account identifier (DID); also the key of the session in the store.
    pub sub: String,
    /// Resource server the tokens are issued for.
    pub aud: String,
    pub server: AuthorizationServerMetadata,
}

/// An established OAuth session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub dpop_key: DpopKey,
    pub info: SessionInfo,
    pub token: TokenSet,
}

impl Session {
    /// Storage expiry for this session.
    ///
    /// A refreshable session never expires on its own; otherwise it lives as
    /// long as its access token. A token without an expiry is kept until it is
    /// deleted explicitly.
    pub fn expires_at(&self) -> Option<i64> {
        if self.token.is_refreshable() {
            return None;
        }
        self.token.expires_at
    }
}

/// State kept between the authorization redirect and the callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub dpop_key: DpopKey,
    pub metadata: AuthorizationServerMetadata,
    /// PKCE code verifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
}
