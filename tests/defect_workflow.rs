//! End-to-end walk through the defect lifecycle across all four roles:
//! project creation, defect reporting, ownership-widened editing, the
//! zero-defects deletion guard, and the eventual cleanup.

use anyhow::{ensure, Context, Result};
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
    let db_path = dir.path().join("test_workflow.db");
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

async fn register(app: &Router, username: &str, role: &str) -> Result<(String, String)> {
    let body = json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": "password123",
        "role": role,
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    ensure!(resp.status() == StatusCode::CREATED, "registration of {username} failed");
    let body = read_json(resp).await?;
    Ok((
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    ))
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Result<Request<Body>> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    Ok(match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))?,
        None => builder.body(Body::empty())?,
    })
}

#[tokio::test]
async fn full_defect_lifecycle() -> Result<()> {
    let (app, _dir) = setup().await?;
    let (admin, _) = register(&app, "admin", "admin").await?;
    let (manager, _) = register(&app, "pm", "manager").await?;
    let (engineer, engineer_id) = register(&app, "eng", "engineer").await?;

    // Admin creates project P (start only, no end).
    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            "/projects",
            &admin,
            Some(json!({"name": "North Tower facade", "start_date": "2025-01-01"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let project = read_json(resp).await?;
    let project_id = project["id"].as_str().unwrap().to_string();
    assert_eq!(project["status"], "active");

    // Manager reports defect D in P, no deadline.
    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            "/defects",
            &manager,
            Some(json!({"title": "Cracked tile on level 3", "project_id": project_id})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let defect = read_json(resp).await?;
    let defect_id = defect["id"].as_str().unwrap().to_string();
    assert_eq!(defect["status"], "new");
    assert_eq!(defect["priority"], "medium");

    // The engineer is neither creator nor assignee: edit denied.
    let resp = app
        .clone()
        .oneshot(authed(
            "PUT",
            &format!("/defects/{defect_id}"),
            &engineer,
            Some(json!({"status": "in_progress"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = read_json(resp).await?;
    assert_eq!(body["error"], "permission_denied");

    // Admin assigns D to the engineer.
    let resp = app
        .clone()
        .oneshot(authed(
            "PUT",
            &format!("/defects/{defect_id}"),
            &admin,
            Some(json!({"assigned_to": engineer_id})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Now the edit goes through.
    let resp = app
        .clone()
        .oneshot(authed(
            "PUT",
            &format!("/defects/{defect_id}"),
            &engineer,
            Some(json!({"status": "in_progress"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await?;
    assert_eq!(body["status"], "in_progress");
    // created_by is untouched by edits.
    assert_eq!(body["created_by"], defect["created_by"]);

    // Manager tries to delete P while D still references it.
    let resp = app
        .clone()
        .oneshot(authed("DELETE", &format!("/projects/{project_id}"), &manager, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = read_json(resp).await?;
    assert_eq!(body["error"], "integrity_violation");

    // The engineer may never delete, not even their assigned defect.
    let resp = app
        .clone()
        .oneshot(authed("DELETE", &format!("/defects/{defect_id}"), &engineer, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Admin removes D, then the manager can delete P.
    let resp = app
        .clone()
        .oneshot(authed("DELETE", &format!("/defects/{defect_id}"), &admin, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(authed("DELETE", &format!("/projects/{project_id}"), &manager, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // P is gone.
    let resp = app
        .clone()
        .oneshot(authed("GET", &format!("/projects/{project_id}"), &admin, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn defect_delete_cascades_to_comments_and_attachments() -> Result<()> {
    let (app, _dir) = setup().await?;
    let (manager, _) = register(&app, "pm", "manager").await?;

    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            "/projects",
            &manager,
            Some(json!({"name": "Annex", "start_date": "2025-02-01"})),
        )?)
        .await?;
    let project_id = read_json(resp).await?["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            "/defects",
            &manager,
            Some(json!({"title": "Leaking joint", "project_id": project_id})),
        )?)
        .await?;
    let defect_id = read_json(resp).await?["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/defects/{defect_id}/comments"),
            &manager,
            Some(json!({"body": "Found during the walkthrough."})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/defects/{defect_id}/attachments"),
            &manager,
            Some(json!({"file_name": "joint.jpg", "file_type": "image/jpeg", "size_bytes": 2048})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(authed("DELETE", &format!("/defects/{defect_id}"), &manager, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // Dependent records went with it.
    let resp = app
        .clone()
        .oneshot(authed(
            "GET",
            &format!("/defects/{defect_id}/comments"),
            &manager,
            None,
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // And the project is deletable again.
    let resp = app
        .clone()
        .oneshot(authed("DELETE", &format!("/projects/{project_id}"), &manager, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    Ok(())
}
