//! Authorization server metadata and DPoP key material.

use serde::{Deserialize, Serialize};

/// A DPoP private key in exportable form.
///
/// Key generation and proof signing belong to the protocol layer; the store
/// only keeps the serialized key around for the lifetime of a session or a
/// pending authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpopKey {
    /// JWS algorithm the key signs with (e.g. `ES256`).
    pub typ: String,
    /// Base64-encoded PKCS#8 private key.
    pub key: String,
}

impl DpopKey {
    pub fn new(typ: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            typ: typ.into(),
            key: key.into(),
        }
    }
}

/// OAuth 2.0 authorization server metadata (RFC 8414).
///
/// Only the endpoints the client needs are typed; everything else the server
/// advertises is preserved in `extra` so a round trip through the store is
/// lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dpop_signing_alg_values_supported: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizationServerMetadata {
    /// Minimal metadata with just the issuer and the two mandatory endpoints.
    pub fn new(
        issuer: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            pushed_authorization_request_endpoint: None,
            revocation_endpoint: None,
            introspection_endpoint: None,
            dpop_signing_alg_values_supported: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_preserves_unknown_fields() {
        let json = r#"{
            "issuer": "https://bsky.social",
            "authorization_endpoint": "https://bsky.social/oauth/authorize",
            "token_endpoint": "https://bsky.social/oauth/token",
            "dpop_signing_alg_values_supported": ["ES256"],
            "scopes_supported": ["atproto", "transition:generic"]
        }"#;

        let metadata: AuthorizationServerMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.issuer, "https://bsky.social");
        assert_eq!(metadata.dpop_signing_alg_values_supported, vec!["ES256"]);
        assert!(metadata.pushed_authorization_request_endpoint.is_none());
        assert!(metadata.extra.contains_key("scopes_supported"));

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["scopes_supported"][1], "transition:generic");
        assert!(back.get("revocation_endpoint").is_none());
    }
}
