use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;

use snagbase::create_app;

async fn setup() -> Result<(Router, TempDir)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_auth.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool).await?;
    Ok((app, dir))
}

async fn read_json(resp: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn registration_and_login_edge_cases() -> Result<()> {
    let (app, _dir) = setup().await?;

    // Short password is refused.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "shorty", "email": "shorty@example.com", "password": "short"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Unknown role is a hard rejection, not a silent default.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "mystery", "email": "mystery@example.com", "password": "password123", "role": "user"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = read_json(resp).await?;
    assert_eq!(body["error"], "invalid_payload");

    // Valid registration; omitted role defaults to engineer.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "valid", "email": "valid@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = read_json(resp).await?;
    assert_eq!(body["user"]["role"], "engineer");
    let token = body["token"].as_str().unwrap().to_string();

    // Duplicate username is refused.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "valid", "email": "other@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Duplicate email is refused too.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "someone", "email": "valid@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Wrong password.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"username": "valid", "password": "wrongpassword"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Unknown username.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"username": "nobody", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Successful login echoes identity and role.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"username": "valid", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await?;
    assert_eq!(body["user"]["username"], "valid");
    assert_eq!(body["user"]["role"], "engineer");

    // /auth/me works with a fresh token.
    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn token_faults_collapse_to_unauthorized() -> Result<()> {
    let (app, _dir) = setup().await?;

    // Missing token.
    let req = Request::builder()
        .method("GET")
        .uri("/projects")
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Garbage token.
    let req = Request::builder()
        .method("GET")
        .uri("/projects")
        .header("authorization", "Bearer not.a.token")
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(resp).await?;
    assert_eq!(body["error"], "token_invalid");

    // Token signed with a different secret.
    let foreign = snagbase::jwt::JwtConfig::new(*b"some-other-secret", 24);
    let forged = foreign.issue(uuid::Uuid::new_v4(), "intruder", snagbase::authz::Role::Admin)?;
    let req = Request::builder()
        .method("GET")
        .uri("/projects")
        .header("authorization", format!("Bearer {forged}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Expired token, otherwise well-formed.
    let expired = snagbase::jwt::JwtConfig::new(*b"test-secret", -1)
        .issue(uuid::Uuid::new_v4(), "late", snagbase::authz::Role::Admin)?;
    let req = Request::builder()
        .method("GET")
        .uri("/projects")
        .header("authorization", format!("Bearer {expired}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn user_management_is_admin_only() -> Result<()> {
    let (app, _dir) = setup().await?;

    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "boss", "email": "boss@example.com", "password": "password123", "role": "admin"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = read_json(resp).await?;
    let admin_token = body["token"].as_str().unwrap().to_string();
    let admin_id = body["user"]["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "pm", "email": "pm@example.com", "password": "password123", "role": "manager"}),
        )?)
        .await?;
    let body = read_json(resp).await?;
    let manager_token = body["token"].as_str().unwrap().to_string();
    let manager_id = body["user"]["id"].as_str().unwrap().to_string();

    // Manager may not list users.
    let req = Request::builder()
        .method("GET")
        .uri("/auth/users")
        .header("authorization", format!("Bearer {manager_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = read_json(resp).await?;
    assert_eq!(body["error"], "permission_denied");

    // Admin may.
    let req = Request::builder()
        .method("GET")
        .uri("/auth/users")
        .header("authorization", format!("Bearer {admin_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Admin cannot delete their own account.
    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/auth/users/{admin_id}"))
        .header("authorization", format!("Bearer {admin_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Manager may not create accounts either.
    let new_user = json!({
        "username": "obs",
        "email": "obs@example.com",
        "password": "password123",
        "role": "observer"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/users")
        .header("authorization", format!("Bearer {manager_token}"))
        .header("content-type", "application/json")
        .body(Body::from(new_user.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Admin may.
    let req = Request::builder()
        .method("POST")
        .uri("/auth/users")
        .header("authorization", format!("Bearer {admin_token}"))
        .header("content-type", "application/json")
        .body(Body::from(new_user.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = read_json(resp).await?;
    assert_eq!(body["username"], "obs");
    assert_eq!(body["role"], "observer");

    // Admin deletes the manager.
    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/auth/users/{manager_id}"))
        .header("authorization", format!("Bearer {admin_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn profile_updates_are_guarded() -> Result<()> {
    let (app, _dir) = setup().await?;

    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "ivan", "email": "ivan@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let token = read_json(resp).await?["token"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "taken", "email": "taken@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let put = |body: Value, token: &str| -> Result<Request<Body>> {
        Ok(Request::builder()
            .method("PUT")
            .uri("/auth/profile")
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?)
    };

    // Renaming onto an existing username is refused.
    let resp = app
        .clone()
        .oneshot(put(json!({"username": "taken"}), &token)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // A password change demands the correct current password.
    let resp = app
        .clone()
        .oneshot(put(json!({"new_password": "password456"}), &token)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(put(
            json!({"current_password": "wrong", "new_password": "password456"}),
            &token,
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Correct current password, plus a rename back onto our own username.
    let resp = app
        .clone()
        .oneshot(put(
            json!({"username": "ivan", "current_password": "password123", "new_password": "password456"}),
            &token,
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // The new password works at login.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"username": "ivan", "password": "password456"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}
