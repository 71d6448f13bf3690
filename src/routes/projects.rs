use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Gate};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::project::{DbProject, Project, ProjectCreateRequest, ProjectUpdateRequest};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "List projects", body = [Project])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Project>>> {
    Gate::new(&state.pool, &auth).require(Action::ViewProject)?;

    let projects = sqlx::query_as::<_, DbProject>(
        "SELECT id, name, description, status, start_date, end_date, created_at, updated_at FROM projects ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let projects: Vec<Project> = projects
        .into_iter()
        .map(Project::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Only admin and manager create projects")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let attrs = Gate::new(&state.pool, &auth).create_project(&payload)?;

    let now = utc_now();
    let project_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO projects (id, name, description, status, start_date, end_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(&attrs.name)
    .bind(&attrs.description)
    .bind(attrs.status.as_str())
    .bind(attrs.start_date)
    .bind(attrs.end_date)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let project: Project = fetch_project(&state.pool, project_id).await?.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Project detail", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    Gate::new(&state.pool, &auth).require(Action::ViewProject)?;

    let project: Project = fetch_project(&state.pool, id).await?.try_into()?;
    Ok(Json(project))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Only admin and manager edit projects")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let current: Project = fetch_project(&state.pool, id).await?.try_into()?;
    let attrs = Gate::new(&state.pool, &auth).update_project(&current, &payload)?;

    let now = utc_now();
    sqlx::query(
        "UPDATE projects SET name = ?, description = ?, status = ?, start_date = ?, end_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&attrs.name)
    .bind(&attrs.description)
    .bind(attrs.status.as_str())
    .bind(attrs.start_date)
    .bind(attrs.end_date)
    .bind(now)
    .bind(id)
    .execute(&state.pool)
    .await?;

    let project: Project = fetch_project(&state.pool, id).await?.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &project,
        Some(&current),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 400, description = "Defects still reference this project"),
        (status = 403, description = "Only admin and manager delete projects")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    // Role check, existence check and the zero-defects guard, in that order.
    Gate::new(&state.pool, &auth).delete_project(id).await?;

    let project: Project = fetch_project(&state.pool, id).await?.try_into()?;

    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<DbProject> {
    sqlx::query_as::<_, DbProject>(
        "SELECT id, name, description, status, start_date, end_date, created_at, updated_at FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("project not found"))
}
