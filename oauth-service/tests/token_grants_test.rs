mod common;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use common::{code_request, device_request, refresh_request, token_request, TestApp};
use oauth_service::{
    dtos::{DeviceAuthorizationRequest, TokenRequest},
    models::{ActivityKind, TokenIssuedPayload},
    services::{EngineSettings, ServiceError},
};
use sha2::{Digest, Sha256};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_client_credentials_grants_requested_scope_only() {
    let app = TestApp::spawn();
    let client = app.create_client("Reporting Job", "read write").await;

    let request = TokenRequest {
        scope: Some("read".to_string()),
        ..token_request(&client, "client_credentials")
    };
    let response = assert_ok!(app.state.engine.token(&request).await);

    assert_eq!(response.scope, "read");
    assert_eq!(response.token_type, "Bearer");
    assert!(response.refresh_token.is_none());

    let claims = app.jwt.validate_access_token(&response.access_token).unwrap();
    assert_eq!(claims.sub, client.application.id.to_string());
    assert!(claims.sid.is_none());
    assert!(claims.email.is_none());
}

#[tokio::test]
async fn test_client_credentials_empty_scope_gets_full_entitlement() {
    let app = TestApp::spawn();
    let client = app.create_client("Nightly Export", "read write").await;

    let response = app
        .state
        .engine
        .token(&token_request(&client, "client_credentials"))
        .await
        .unwrap();

    assert_eq!(response.scope, "read write");
}

#[tokio::test]
async fn test_client_credentials_drops_unentitled_scopes() {
    let app = TestApp::spawn();
    let client = app.create_client("Metrics Scraper", "read").await;

    let request = TokenRequest {
        scope: Some("read admin".to_string()),
        ..token_request(&client, "client_credentials")
    };
    let response = app.state.engine.token(&request).await.unwrap();

    assert_eq!(response.scope, "read");
}

#[tokio::test]
async fn test_wrong_secret_is_invalid_client() {
    let app = TestApp::spawn();
    let client = app.create_client("Billing Sync", "read").await;

    let request = TokenRequest {
        client_secret: "not-the-secret".to_string(),
        ..token_request(&client, "client_credentials")
    };
    let err = app.state.engine.token(&request).await.unwrap_err();

    assert!(matches!(err, ServiceError::InvalidClient));
}

#[tokio::test]
async fn test_deleted_client_is_invalid_client() {
    let app = TestApp::spawn();
    let client = app.create_client("Retired App", "read").await;
    app.state
        .clients
        .delete(client.application.id, common::ADMIN_EMAIL)
        .await
        .unwrap();

    let err = app
        .state
        .engine
        .token(&token_request(&client, "client_credentials"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidClient));
}

#[tokio::test]
async fn test_unknown_grant_type_reports_violation() {
    let app = TestApp::spawn();
    let client = app.create_client("Legacy App", "read").await;

    let err = app
        .state
        .engine
        .token(&token_request(&client, "password"))
        .await
        .unwrap_err();

    let fields: Vec<String> = err.violations().into_iter().map(|v| v.field).collect();
    assert!(fields.contains(&"grant_type".to_string()));
}

#[tokio::test]
async fn test_authorization_code_exchange_issues_user_tokens() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read profile").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;

    let code = app
        .authorization_code(&client, &principal, Some("photos.read"), None)
        .await;
    let response = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap();

    assert_eq!(response.scope, "photos.read");
    assert!(response.refresh_token.is_some());

    let claims = app.jwt.validate_access_token(&response.access_token).unwrap();
    assert_eq!(claims.subject_id(), Some(principal.user_id));
    assert_eq!(claims.session_id(), Some(principal.session_id));
    assert_eq!(claims.aud, client.application.id.to_string());
}

#[tokio::test]
async fn test_authorization_code_is_single_use() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;
    let code = app.authorization_code(&client, &principal, None, None).await;

    app.state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap();
    let replay = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap_err();

    assert!(matches!(replay, ServiceError::InvalidGrant));
}

#[tokio::test]
async fn test_authorization_code_redirect_mismatch() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;
    let code = app.authorization_code(&client, &principal, None, None).await;

    let request = TokenRequest {
        redirect_uri: Some("https://evil.example.com/callback".to_string()),
        ..code_request(&client, &code)
    };
    let err = app.state.engine.token(&request).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidGrant));

    // A mismatch does not burn the code
    assert_ok!(app.state.engine.token(&code_request(&client, &code)).await);
}

#[tokio::test]
async fn test_authorization_code_pkce_s256() {
    let app = TestApp::spawn();
    let client = app.create_client("Mobile App", "profile").await;
    let (principal, _) = app.signed_in_user("bob@example.com").await;

    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

    let code = app
        .authorization_code(&client, &principal, None, Some((&challenge, "S256")))
        .await;
    let missing = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap_err();
    assert!(matches!(missing, ServiceError::InvalidGrant));

    let code = app
        .authorization_code(&client, &principal, None, Some((&challenge, "S256")))
        .await;
    let request = TokenRequest {
        code_verifier: Some(verifier.to_string()),
        ..code_request(&client, &code)
    };
    assert_ok!(app.state.engine.token(&request).await);
}

#[tokio::test]
async fn test_authorization_code_rejected_after_logout() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;
    let code = app.authorization_code(&client, &principal, None, None).await;

    app.state.accounts.logout(&principal).await.unwrap();

    let err = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidGrant));
}

#[tokio::test]
async fn test_authorize_rejects_unregistered_callback() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;

    let request = oauth_service::dtos::AuthorizeRequest {
        client_id: client.application.id.to_string(),
        callback_uri: "https://other.example.com/cb".to_string(),
        ..Default::default()
    };
    let err = app
        .state
        .engine
        .authorize(&request, principal.session_id)
        .await
        .unwrap_err();

    let fields: Vec<String> = err.violations().into_iter().map(|v| v.field).collect();
    assert_eq!(fields, vec!["callback_uri".to_string()]);
}

#[tokio::test]
async fn test_authorize_redirect_carries_code_and_state() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;

    let request = oauth_service::dtos::AuthorizeRequest {
        client_id: client.application.id.to_string(),
        callback_uri: common::TEST_CALLBACK.to_string(),
        state: Some("af0ifjsldkj".to_string()),
        ..Default::default()
    };
    let response = app
        .state
        .engine
        .authorize(&request, principal.session_id)
        .await
        .unwrap();

    let redirect = url::Url::parse(&response.redirect_uri).unwrap();
    let pairs: Vec<(String, String)> = redirect
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert!(pairs.contains(&("code".to_string(), response.code.clone())));
    assert!(pairs.contains(&("state".to_string(), "af0ifjsldkj".to_string())));
}

async fn start_device_flow(app: &TestApp, client_id: uuid::Uuid) -> (String, String) {
    let response = app
        .state
        .engine
        .start_device_authorization(&DeviceAuthorizationRequest {
            client_id: client_id.to_string(),
            scope: Some("tv.watch".to_string()),
        })
        .await
        .unwrap();
    assert!(response
        .verification_uri_complete
        .ends_with(&format!("user_code={}", response.user_code)));
    (response.device_code, response.user_code)
}

#[tokio::test]
async fn test_device_code_pending_then_approved_then_consumed() {
    let app = TestApp::spawn();
    let client = app.create_client("Living Room TV", "tv.watch").await;
    let (principal, _) = app.signed_in_user("carol@example.com").await;
    let (device_code, user_code) = start_device_flow(&app, client.application.id).await;

    let pending = app
        .state
        .engine
        .token(&device_request(&client, &device_code))
        .await
        .unwrap_err();
    assert!(matches!(pending, ServiceError::AuthorizationPending));
    assert_eq!(pending.oauth_code(), "authorization_pending");

    app.stores
        .devices
        .approve(&user_code, principal.user_id, principal.session_id)
        .await
        .unwrap();

    let response = app
        .state
        .engine
        .token(&device_request(&client, &device_code))
        .await
        .unwrap();
    assert_eq!(response.scope, "tv.watch");
    assert!(response.refresh_token.is_some());

    let again = app
        .state
        .engine
        .token(&device_request(&client, &device_code))
        .await
        .unwrap_err();
    assert!(matches!(again, ServiceError::InvalidGrant));
}

#[tokio::test]
async fn test_device_code_denied() {
    let app = TestApp::spawn();
    let client = app.create_client("Living Room TV", "tv.watch").await;
    let (device_code, user_code) = start_device_flow(&app, client.application.id).await;

    app.stores.devices.deny(&user_code).await.unwrap();

    let err = app
        .state
        .engine
        .token(&device_request(&client, &device_code))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidGrant));
}

#[tokio::test]
async fn test_device_code_expired() {
    let app = TestApp::with_settings(EngineSettings {
        device_code_ttl: Duration::seconds(-1),
        ..Default::default()
    });
    let client = app.create_client("Living Room TV", "tv.watch").await;
    let (device_code, _) = start_device_flow(&app, client.application.id).await;

    let err = app
        .state
        .engine
        .token(&device_request(&client, &device_code))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Expired));
    assert_eq!(err.oauth_code(), "expired_token");
}

#[tokio::test]
async fn test_device_code_belongs_to_its_client() {
    let app = TestApp::spawn();
    let tv = app.create_client("Living Room TV", "tv.watch").await;
    let other = app.create_client("Other Device", "tv.watch").await;
    let (device_code, _) = start_device_flow(&app, tv.application.id).await;

    let err = app
        .state
        .engine
        .token(&device_request(&other, &device_code))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidGrant));
}

#[tokio::test]
async fn test_refresh_token_rotation_is_single_use() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read profile").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;
    let code = app.authorization_code(&client, &principal, None, None).await;
    let first = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap();
    let old_refresh = first.refresh_token.unwrap();

    let rotated = app
        .state
        .engine
        .token(&refresh_request(&client, &old_refresh))
        .await
        .unwrap();
    let new_refresh = rotated.refresh_token.clone().unwrap();
    assert_ne!(new_refresh, old_refresh);
    assert_eq!(rotated.scope, "photos.read profile");

    let replay = app
        .state
        .engine
        .token(&refresh_request(&client, &old_refresh))
        .await
        .unwrap_err();
    assert!(matches!(replay, ServiceError::InvalidGrant));

    assert_ok!(
        app.state
            .engine
            .token(&refresh_request(&client, &new_refresh))
            .await
    );
}

#[tokio::test]
async fn test_refresh_can_narrow_but_not_widen() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read profile admin").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;
    let code = app
        .authorization_code(&client, &principal, Some("photos.read profile"), None)
        .await;
    let first = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap();

    let request = TokenRequest {
        scope: Some("profile admin".to_string()),
        ..refresh_request(&client, first.refresh_token.as_deref().unwrap())
    };
    let narrowed = app.state.engine.token(&request).await.unwrap();

    assert_eq!(narrowed.scope, "profile");
}

#[tokio::test]
async fn test_refresh_token_is_bound_to_client() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read").await;
    let other = app.create_client("Other App", "photos.read").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;
    let code = app.authorization_code(&client, &principal, None, None).await;
    let first = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap();

    let err = app
        .state
        .engine
        .token(&refresh_request(&other, first.refresh_token.as_deref().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidGrant));
}

#[tokio::test]
async fn test_each_issuance_records_one_activity() {
    let app = TestApp::spawn();
    let client = app.create_client("Photo Printer", "photos.read").await;
    let (principal, _) = app.signed_in_user("alice@example.com").await;
    let code = app.authorization_code(&client, &principal, None, None).await;

    let first = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap();
    app.state
        .engine
        .token(&refresh_request(&client, first.refresh_token.as_deref().unwrap()))
        .await
        .unwrap();

    let issued: Vec<_> = app
        .state
        .activity
        .read_all("alice@example.com")
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.kind == ActivityKind::TokenIssued)
        .collect();
    assert_eq!(issued.len(), 2);

    // Newest first
    let latest: TokenIssuedPayload = issued[0].payload_as().unwrap();
    assert_eq!(latest.grant_type.to_string(), "refresh_token");
    assert_eq!(latest.session_id, Some(principal.session_id));
    assert!(latest.refresh_token_issued);
}

#[tokio::test]
async fn test_failed_request_records_no_activity() {
    let app = TestApp::spawn();
    let client = app.create_client("Billing Sync", "read").await;
    let actor = format!("client:{}", client.application.id);

    let request = TokenRequest {
        client_secret: "wrong".to_string(),
        ..token_request(&client, "client_credentials")
    };
    app.state.engine.token(&request).await.unwrap_err();

    let activities = app.state.activity.read_all(&actor).await.unwrap();
    assert!(activities.is_empty());
}

#[tokio::test]
async fn test_sweep_clears_abandoned_codes_and_device_flows() {
    let app = TestApp::with_settings(EngineSettings {
        authorization_code_ttl: Duration::seconds(-1),
        device_code_ttl: Duration::seconds(-1),
        ..Default::default()
    });
    let client = app.create_client("Kiosk", "tv.watch").await;
    let (principal, _) = app.signed_in_user("dave@example.com").await;
    let code = app.authorization_code(&client, &principal, None, None).await;
    let (_, user_code) = start_device_flow(&app, client.application.id).await;

    assert_eq!(app.stores.purge_expired().await.unwrap(), 2);
    assert_eq!(app.stores.purge_expired().await.unwrap(), 0);

    let err = app
        .state
        .engine
        .token(&code_request(&client, &code))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidGrant));
    assert!(matches!(
        app.stores.devices.deny(&user_code).await,
        Err(ServiceError::NotFound(_))
    ));
}
