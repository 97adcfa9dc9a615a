mod common;

use common::{token_request, TestApp, ADMIN_EMAIL, TEST_CALLBACK};
use oauth_service::{models::ActivityKind, services::ServiceError};

#[tokio::test]
async fn test_application_names_are_unique_case_insensitively() {
    let app = TestApp::spawn();
    app.create_client("Photo Printer", "read").await;

    let err = app
        .state
        .clients
        .create("photo printer", TEST_CALLBACK, "read", ADMIN_EMAIL)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn test_deleted_application_frees_its_name() {
    let app = TestApp::spawn();
    let first = app.create_client("Photo Printer", "read").await;
    app.state
        .clients
        .delete(first.application.id, ADMIN_EMAIL)
        .await
        .unwrap();

    let second = app.create_client("Photo Printer", "read").await;
    assert_ne!(first.application.id, second.application.id);

    let audit = app
        .stores
        .clients
        .find_for_audit(first.application.id)
        .await
        .unwrap()
        .expect("deleted application stays readable for audit");
    assert!(audit.is_deleted);
    assert_eq!(audit.deleted_by.as_deref(), Some(ADMIN_EMAIL));
}

#[tokio::test]
async fn test_create_validates_every_field() {
    let app = TestApp::spawn();

    let err = app
        .state
        .clients
        .create("  ", "not a uri", "read", ADMIN_EMAIL)
        .await
        .unwrap_err();

    let mut fields: Vec<String> = err.violations().into_iter().map(|v| v.field).collect();
    fields.sort();
    assert_eq!(fields, vec!["callback_uri".to_string(), "name".to_string()]);
}

#[tokio::test]
async fn test_rename_into_taken_name_conflicts() {
    let app = TestApp::spawn();
    app.create_client("Photo Printer", "read").await;
    let other = app.create_client("Scanner", "read").await;

    let err = app
        .state
        .clients
        .rename(other.application.id, "PHOTO PRINTER", ADMIN_EMAIL)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let renamed = app
        .state
        .clients
        .rename(other.application.id, "Document Scanner", ADMIN_EMAIL)
        .await
        .unwrap();
    assert_eq!(renamed.name, "Document Scanner");
    assert_eq!(renamed.modified_by.as_deref(), Some(ADMIN_EMAIL));
}

#[tokio::test]
async fn test_rotated_secret_replaces_the_old_one() {
    let app = TestApp::spawn();
    let client = app.create_client("Billing Sync", "read").await;

    let new_secret = app
        .state
        .clients
        .rotate_secret(client.application.id, ADMIN_EMAIL)
        .await
        .unwrap();

    let old = app
        .state
        .engine
        .token(&token_request(&client, "client_credentials"))
        .await
        .unwrap_err();
    assert!(matches!(old, ServiceError::InvalidClient));

    let mut request = token_request(&client, "client_credentials");
    request.client_secret = new_secret;
    assert!(app.state.engine.token(&request).await.is_ok());
}

#[tokio::test]
async fn test_application_changes_are_recorded_against_the_actor() {
    let app = TestApp::spawn();
    let client = app.create_client("Billing Sync", "read").await;
    app.state
        .clients
        .rename(client.application.id, "Billing Export", ADMIN_EMAIL)
        .await
        .unwrap();
    app.state
        .clients
        .delete(client.application.id, ADMIN_EMAIL)
        .await
        .unwrap();

    let kinds: Vec<ActivityKind> = app
        .state
        .activity
        .read_all(ADMIN_EMAIL)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ActivityKind::ApplicationDeleted,
            ActivityKind::ApplicationUpdated,
            ActivityKind::ApplicationCreated,
        ]
    );
}

#[tokio::test]
async fn test_only_the_registering_account_manages_an_application() {
    let app = TestApp::spawn();
    let client = app.create_client("Billing Sync", "read").await;
    let id = client.application.id;
    let stranger = "bob@example.com";

    let registry = &app.state.clients;
    assert!(matches!(
        registry.delete(id, stranger).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        registry.rename(id, "Bob's Sync", stranger).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        registry.rotate_secret(id, stranger).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        registry.get(id, stranger).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(registry.list(stranger).await.unwrap().is_empty());
    assert!(app.state.activity.read_all(stranger).await.unwrap().is_empty());

    // Untouched: the original secret still authenticates
    assert!(app
        .state
        .engine
        .token(&token_request(&client, "client_credentials"))
        .await
        .is_ok());

    // Owner match ignores email case
    let owned = registry.get(id, &ADMIN_EMAIL.to_uppercase()).await.unwrap();
    assert_eq!(owned.name, "Billing Sync");
    assert_eq!(registry.list(ADMIN_EMAIL).await.unwrap().len(), 1);
}
