mod common;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::SecureStore;
use common::*;
use core_auth::providers::DelegatedProvider;
use core_auth::{
    AuthError, AuthFacade, LoginOptions, OAuthConfig, OAuthFlowManager, OAuthTokens,
    ProviderAdapter, ProviderKind, ProviderLoader, TokenStore,
};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

fn state_from(url: &str) -> String {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

fn facade(loader: Arc<TestLoader>) -> AuthFacade {
    AuthFacade::builder()
        .default_provider(ProviderKind::Delegated)
        .loader(loader)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_full_authorization_code_flow() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| req.method == HttpMethod::Post && req.url.ends_with("/oauth/token"))
        .times(1)
        .returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"access_token":"at","id_token":"it","expires_in":86400}"#,
            ))
        });
    http.expect_execute()
        .withf(|req| req.method == HttpMethod::Get && req.url.ends_with("/userinfo"))
        .times(1)
        .returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"sub":"auth0|42","email":"ada@example.com"}"#,
            ))
        });

    let loader = Arc::new(TestLoader::new().with_http(Arc::new(http)));
    let facade = facade(loader.clone());
    facade.init_auth().await.unwrap();

    assert!(facade.login(LoginOptions::new()).await.unwrap());
    let state = state_from(&loader.redirect.last().unwrap());

    facade.complete_authorization("auth-code", &state).await.unwrap();

    let view = facade.state();
    assert!(view.is_authenticated);
    assert_eq!(
        view.user,
        Some(json!({"sub": "auth0|42", "email": "ada@example.com"}))
    );
    assert!(view.error.is_none());
    assert!(loader
        .secure
        .get_secret("oauth_tokens:delegated")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_recorded() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .times(1)
        .returning(|_| Ok(HttpResponse::new(403, r#"{"error":"invalid_grant"}"#)));

    let loader = Arc::new(TestLoader::new().with_http(Arc::new(http)));
    let facade = facade(loader.clone());

    facade.login(LoginOptions::new()).await.unwrap();
    let state = state_from(&loader.redirect.last().unwrap());

    assert!(facade.complete_authorization("bad-code", &state).await.is_err());

    let view = facade.state();
    assert!(!view.is_authenticated);
    assert_eq!(view.error.as_deref(), Some("Token endpoint returned 403"));
}

#[tokio::test]
async fn test_initialize_restores_stored_session() {
    let loader = Arc::new(TestLoader::new());
    let store = TokenStore::new(loader.secure.clone(), "delegated");
    store
        .store_session(
            &OAuthTokens::new("at".to_string(), 3600),
            &json!({"sub": "auth0|7"}),
        )
        .await
        .unwrap();

    let facade = facade(loader);
    facade.init_auth().await.unwrap();

    let view = facade.state();
    assert!(view.is_authenticated);
    assert_eq!(view.user, Some(json!({"sub": "auth0|7"})));
}

#[tokio::test]
async fn test_initialize_drops_expired_session() {
    let loader = Arc::new(TestLoader::new());
    let store = TokenStore::new(loader.secure.clone(), "delegated");
    store
        .store_session(
            &OAuthTokens::new("at".to_string(), 60),
            &json!({"sub": "auth0|7"}),
        )
        .await
        .unwrap();

    let facade = facade(loader);
    facade.init_auth().await.unwrap();

    assert!(!facade.state().is_authenticated);
    assert!(!store.has_session().await.unwrap());
}

/// Serves a delegated adapter whose authorize endpoint cannot be parsed.
struct BrokenEndpointLoader(TestLoader);

#[async_trait]
impl ProviderLoader for BrokenEndpointLoader {
    async fn load(&self, _kind: ProviderKind) -> core_auth::Result<ProviderAdapter> {
        let mut config = OAuthConfig::from_tenant(&delegated_tenant())?;
        config.authorize_url = "https://bad host.example.com/authorize".to_string();

        Ok(ProviderAdapter::Delegated(DelegatedProvider::new(
            OAuthFlowManager::new(config, self.0.http.clone()),
            TokenStore::new(self.0.secure.clone(), "delegated"),
            self.0.redirect.clone(),
        )))
    }
}

#[tokio::test]
async fn test_unbuildable_authorize_url_settles_loading() {
    let loader = Arc::new(BrokenEndpointLoader(TestLoader::new()));
    let facade = AuthFacade::builder()
        .default_provider(ProviderKind::Delegated)
        .loader(loader.clone())
        .build()
        .unwrap();

    let err = facade.login(LoginOptions::new()).await.unwrap_err();
    assert!(matches!(err, AuthError::Configuration(_)));

    let view = facade.state();
    assert!(!view.loading);
    assert!(!view.is_authenticated);
    assert_eq!(view.error, Some(err.user_message()));
    assert!(loader.0.redirect.last().is_none());
}
