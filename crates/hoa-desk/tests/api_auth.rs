mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, PASSWORD};
use hoa_desk::domain::Role;
use serde_json::json;

#[tokio::test]
async fn login_me_and_logout_round_trip() {
    let app = TestApp::new();
    app.user("Grace Admin", "grace@cedar.example", Role::Admin);

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "  GRACE@cedar.example ", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["user"]["email"], "grace@cedar.example");
    assert!(body["data"]["user"].get("password_hash").is_none());
    let token = body["data"]["token"].as_str().expect("token").to_string();

    let (status, body) = app.get("/v1/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Grace Admin");
    assert_eq!(body["data"]["role"], "admin");

    let (status, _) = app.call(Method::POST, "/v1/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/v1/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthenticated.");
}

#[tokio::test]
async fn rejects_bad_credentials_and_missing_tokens() {
    let app = TestApp::new();
    app.user("Grace Admin", "grace@cedar.example", Role::Admin);

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "grace@cedar.example", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let (status, body) = app
        .call(Method::POST, "/v1/auth/login", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["email"].is_array());
    assert!(body["errors"]["password"].is_array());

    let (status, _) = app.call(Method::GET, "/v1/buildings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/v1/buildings", "not-a-real-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_are_enforced_per_resource() {
    let app = TestApp::new();
    let (_, admin) = app.session(Role::Admin).await;
    let (_, tenant) = app.session(Role::Tenant).await;
    let (_, accountant) = app.session(Role::Accountant).await;
    let (_, manager) = app.session(Role::Manager).await;

    let building = json!({ "name": "Cedar Court", "address": "1 Harbour Road" });

    let (status, body) = app.post("/v1/buildings", &tenant, building.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "error");

    let (status, _) = app.post("/v1/buildings", &accountant, building.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/v1/buildings", &tenant).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post("/v1/buildings", &manager, building).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.get("/v1/users", &manager).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post(
            "/v1/users",
            &manager,
            json!({ "name": "New Tenant", "email": "new@cedar.example", "role": "tenant", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/v1/users",
            &admin,
            json!({ "name": "New Tenant", "email": "new@cedar.example", "role": "tenant", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "tenant");
    assert!(body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn admins_cannot_delete_themselves() {
    let app = TestApp::new();
    let (admin_id, admin) = app.session(Role::Admin).await;

    let (status, body) = app.delete(&format!("/v1/users/{admin_id}"), &admin).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let (status, _) = app.get(&format!("/v1/users/{admin_id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);
}
