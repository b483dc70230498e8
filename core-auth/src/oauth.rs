//! OAuth 2.0 Authorization Flow with PKCE Support
//!
//! Implements RFC 6749 (authorization code grant) and RFC 7636 (PKCE) against
//! a hosted identity tenant, for the delegated provider.
//!
//! # Overview
//!
//! The flow manager handles:
//! - Building authorization URLs with a PKCE challenge
//! - Exchanging authorization codes for tokens
//! - Fetching the signed-in user's profile
//! - Building the tenant logout URL
//!
//! # Security
//!
//! - State and code verifier come from a cryptographically secure RNG
//! - The callback state is checked before any code is exchanged
//! - Tokens, codes and verifiers are never logged
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use core_runtime::config::AuthConfig;
//! use std::sync::Arc;
//!
//! # fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let config = AuthConfig::builder()
//!     .delegated("tenant.eu.auth0.com", "client-id")
//!     .build()?;
//!
//! let oauth = OAuthConfig::from_tenant(&config.delegated)?;
//! let manager = OAuthFlowManager::new(oauth, http_client);
//! let (auth_url, verifier) = manager.build_auth_url(&[])?;
//! // Send the user to auth_url and keep the verifier for the callback
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use core_runtime::config::DelegatedConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Endpoints and client settings for one OAuth tenant.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Only set for confidential clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub audience: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub logout_url: String,
}

impl OAuthConfig {
    /// Derive the tenant endpoints from the delegated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderLoad`] when the domain or client id is
    /// missing, or when the domain does not form valid endpoint URLs.
    pub fn from_tenant(tenant: &DelegatedConfig) -> Result<Self> {
        let domain = tenant
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AuthError::provider_load("delegated", "AUTH0_DOMAIN is not set"))?;
        let client_id = tenant
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::provider_load("delegated", "AUTH0_CLIENT_ID is not set"))?;

        let base = format!("https://{}", domain.trim_end_matches('/'));
        let config = Self {
            client_id: client_id.to_string(),
            client_secret: tenant.client_secret.clone(),
            redirect_uri: tenant.redirect_uri.clone(),
            scopes: tenant.scopes.clone(),
            audience: tenant.audience.clone(),
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/oauth/token", base),
            userinfo_url: format!("{}/userinfo", base),
            logout_url: format!("{}/v2/logout", base),
        };
        config.validate_endpoints()?;
        Ok(config)
    }

    fn validate_endpoints(&self) -> Result<()> {
        for endpoint in [
            &self.authorize_url,
            &self.token_url,
            &self.userinfo_url,
            &self.logout_url,
        ] {
            Url::parse(endpoint).map_err(|e| {
                AuthError::provider_load(
                    "delegated",
                    format!("Invalid tenant endpoint {}: {}", endpoint, e),
                )
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("audience", &self.audience)
            .field("authorize_url", &self.authorize_url)
            .finish_non_exhaustive()
    }
}

/// PKCE (Proof Key for Code Exchange) verifier.
///
/// Holds the code verifier and the CSRF state for one authorization attempt.
///
/// # Security
///
/// The verifier must never reach the authorization server before the code
/// exchange. Only the derived challenge is sent with the authorization
/// request.
#[derive(Clone)]
pub struct PkceVerifier {
    /// The code verifier (base64-url-encoded random string)
    verifier: String,
    /// The state parameter for CSRF protection
    state: String,
}

impl PkceVerifier {
    /// Create a new verifier with cryptographically secure random values.
    ///
    /// Generates a 32-byte code verifier and a 16-byte state, both URL-safe
    /// base64 without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        // 43 characters once encoded, within RFC 7636 bounds
        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// OAuth 2.0 flow manager for the delegated tenant.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the authorization URL with a fresh PKCE challenge.
    ///
    /// `extra` carries pass-through parameters such as `screen_hint` or
    /// `login_hint`. The returned verifier must be kept until the callback
    /// arrives.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the authorize endpoint does not
    /// parse.
    #[instrument(skip(self, extra), fields(client_id = %self.config.client_id))]
    pub fn build_auth_url(&self, extra: &[(&str, &str)]) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid authorize URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            if let Some(audience) = &self.config.audience {
                query.append_pair("audience", audience);
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }

        debug!(extra_params = extra.len(), "Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - [`AuthError::StateMismatch`] when `state` is not the verifier's state
    /// - [`AuthError::NetworkError`] when the token endpoint is unreachable
    /// - [`AuthError::AuthenticationFailed`] when the endpoint rejects the code
    #[instrument(skip(self, code, state, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthTokens> {
        // CSRF check before anything leaves the process
        if state != verifier.state() {
            warn!("OAuth state mismatch on authorization callback");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual: state.to_string(),
            });
        }

        let mut params = BTreeMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", self.config.redirect_uri.as_str());
        params.insert("client_id", self.config.client_id.as_str());
        params.insert("code_verifier", verifier.verifier());
        if let Some(client_secret) = &self.config.client_secret {
            params.insert("client_secret", client_secret.as_str());
        }

        let encoded_body = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::Serialization(format!("Failed to encode token request: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from(encoded_body));

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            warn!(status, error = %error_body, "Authorization code exchange failed");

            return Err(AuthError::AuthenticationFailed {
                provider: "delegated".to_string(),
                reason: format!("Token endpoint returned {}", status),
            });
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Serialization(format!("Failed to parse token response: {}", e)))?;

        info!(
            expires_in = token_response.expires_in,
            has_refresh_token = token_response.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );

        let mut tokens = OAuthTokens::new(token_response.access_token, token_response.expires_in);
        tokens.id_token = token_response.id_token;
        tokens.refresh_token = token_response.refresh_token;
        Ok(tokens)
    }

    /// Fetch the OIDC profile of the token's subject.
    #[instrument(skip(self, access_token))]
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<Value> {
        let request = HttpRequest::new(HttpMethod::Get, self.config.userinfo_url.clone())
            .bearer_token(access_token);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            warn!(status = response.status, "User info request failed");
            return Err(AuthError::AuthenticationFailed {
                provider: "delegated".to_string(),
                reason: format!("User info endpoint returned {}", response.status),
            });
        }

        response
            .json()
            .map_err(|e| AuthError::Serialization(format!("Failed to parse user info: {}", e)))
    }

    /// Tenant logout URL returning to the redirect URI's origin.
    pub fn build_logout_url(&self) -> Result<String> {
        let return_to = Url::parse(&self.config.redirect_uri)
            .map(|u| u.origin().ascii_serialization())
            .map_err(|e| AuthError::Configuration(format!("Invalid redirect URI: {}", e)))?;

        let mut url = Url::parse(&self.config.logout_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid logout URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("returnTo", &return_to);

        Ok(url.to_string())
    }
}

/// JSON body of the token endpoint.
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use mockall::mock;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn tenant() -> DelegatedConfig {
        DelegatedConfig {
            domain: Some("tenant.example.com".to_string()),
            client_id: Some("test-client".to_string()),
            ..DelegatedConfig::default()
        }
    }

    fn manager(http: MockHttp) -> OAuthFlowManager {
        let config = OAuthConfig::from_tenant(&tenant()).unwrap();
        OAuthFlowManager::new(config, Arc::new(http))
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();

        assert!(!verifier.verifier().is_empty());
        assert!(!verifier.state().is_empty());
        assert_eq!(verifier.challenge(), verifier.challenge());

        let verifier2 = PkceVerifier::new();
        assert_ne!(verifier.verifier(), verifier2.verifier());
        assert_ne!(verifier.state(), verifier2.state());
    }

    #[test]
    fn test_pkce_challenge_known_value() {
        // RFC 7636 appendix B
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "state".to_string(),
        };
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_pkce_debug_redacts_verifier() {
        let verifier = PkceVerifier::new();
        let debug = format!("{:?}", verifier);
        assert!(!debug.contains(verifier.verifier()));
    }

    #[test]
    fn test_from_tenant_derives_endpoints() {
        let config = OAuthConfig::from_tenant(&tenant()).unwrap();
        assert_eq!(config.authorize_url, "https://tenant.example.com/authorize");
        assert_eq!(config.token_url, "https://tenant.example.com/oauth/token");
        assert_eq!(config.userinfo_url, "https://tenant.example.com/userinfo");
        assert_eq!(config.logout_url, "https://tenant.example.com/v2/logout");
    }

    #[test]
    fn test_from_tenant_rejects_malformed_domain() {
        let mut bad_host = tenant();
        bad_host.domain = Some("bad host.example.com".to_string());

        match OAuthConfig::from_tenant(&bad_host) {
            Err(AuthError::ProviderLoad { provider, reason }) => {
                assert_eq!(provider, "delegated");
                assert!(reason.contains("authorize"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_tenant_requires_domain_and_client() {
        let mut missing_domain = tenant();
        missing_domain.domain = None;
        assert!(matches!(
            OAuthConfig::from_tenant(&missing_domain),
            Err(AuthError::ProviderLoad { .. })
        ));

        let mut missing_client = tenant();
        missing_client.client_id = Some("  ".to_string());
        assert!(matches!(
            OAuthConfig::from_tenant(&missing_client),
            Err(AuthError::ProviderLoad { .. })
        ));
    }

    #[test]
    fn test_build_auth_url() {
        let (url, verifier) = manager(MockHttp::new())
            .build_auth_url(&[("screen_hint", "signup")])
            .unwrap();

        assert!(url.starts_with("https://tenant.example.com/authorize?"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+profile+email"));
        assert!(url.contains(&format!("state={}", verifier.state())));
        assert!(url.contains(&format!("code_challenge={}", verifier.challenge())));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("screen_hint=signup"));
        assert!(!url.contains(verifier.verifier()));
    }

    #[test]
    fn test_build_logout_url() {
        let url = manager(MockHttp::new()).build_logout_url().unwrap();
        assert!(url.starts_with("https://tenant.example.com/v2/logout?"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("returnTo=http%3A%2F%2Flocalhost%3A8080"));
    }

    #[tokio::test]
    async fn test_exchange_code_rejects_state_mismatch() {
        let mut http = MockHttp::new();
        http.expect_execute().never();

        let verifier = PkceVerifier::new();
        let result = manager(http)
            .exchange_code("code", "forged-state", &verifier)
            .await;

        assert!(matches!(result, Err(AuthError::StateMismatch { .. })));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.url == "https://tenant.example.com/oauth/token"
                    && req.method == HttpMethod::Post
                    && req
                        .body
                        .as_ref()
                        .is_some_and(|b| b.starts_with(b"client_id=test-client"))
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"access_token":"at","id_token":"it","expires_in":7200,"token_type":"Bearer"}"#,
                ))
            });

        let verifier = PkceVerifier::new();
        let tokens = manager(http)
            .exchange_code("code", verifier.state(), &verifier)
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.id_token.as_deref(), Some("it"));
        assert!(tokens.refresh_token.is_none());
        assert!(!tokens.is_expired());
    }

    #[tokio::test]
    async fn test_exchange_code_rejected_by_endpoint() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(403, r#"{"error":"invalid_grant"}"#)));

        let verifier = PkceVerifier::new();
        let result = manager(http)
            .exchange_code("code", verifier.state(), &verifier)
            .await;

        assert!(matches!(
            result,
            Err(AuthError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_user_info_network_error() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let result = manager(http).fetch_user_info("at").await;
        assert!(matches!(result, Err(AuthError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_fetch_user_info_sends_bearer() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.url.ends_with("/userinfo")
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer at")
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"sub":"auth0|1","name":"Ada"}"#)));

        let user = manager(http).fetch_user_info("at").await.unwrap();
        assert_eq!(user["name"], "Ada");
    }

    #[test]
    fn test_token_response_defaults() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"token"}"#).unwrap();
        assert_eq!(response.access_token, "token");
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.expires_in, 3600);
    }
}
