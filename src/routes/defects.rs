use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Gate, ReferenceStore};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::attachment::{Attachment, AttachmentCreateRequest};
use crate::models::comment::{Comment, CommentCreateRequest};
use crate::models::defect::{
    DbDefect, Defect, DefectCreateRequest, DefectListQuery, DefectUpdateRequest,
};
use crate::utils::utc_now;

const DEFECT_COLUMNS: &str =
    "id, title, description, priority, status, project_id, created_by, assigned_to, deadline, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/defects",
    tag = "Defects",
    params(
        ("project_id" = Option<Uuid>, Query, description = "Filter by project"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("priority" = Option<String>, Query, description = "Filter by priority"),
        ("assigned_to" = Option<Uuid>, Query, description = "Filter by assignee")
    ),
    responses((status = 200, description = "List defects", body = [Defect])),
    security(("bearerAuth" = []))
)]
pub async fn list_defects(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<DefectListQuery>,
) -> AppResult<Json<Vec<Defect>>> {
    Gate::new(&state.pool, &auth).require(Action::ViewDefect)?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {DEFECT_COLUMNS} FROM defects WHERE 1=1"
    ));
    if let Some(project_id) = query.project_id {
        builder.push(" AND project_id = ").push_bind(project_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(priority) = query.priority {
        builder.push(" AND priority = ").push_bind(priority);
    }
    if let Some(assigned_to) = query.assigned_to {
        builder.push(" AND assigned_to = ").push_bind(assigned_to);
    }
    builder.push(" ORDER BY created_at DESC");

    let defects = builder
        .build_query_as::<DbDefect>()
        .fetch_all(&state.pool)
        .await?;

    let defects: Vec<Defect> = defects
        .into_iter()
        .map(Defect::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(defects))
}

#[utoipa::path(
    post,
    path = "/defects",
    tag = "Defects",
    request_body = DefectCreateRequest,
    responses(
        (status = 201, description = "Defect created", body = Defect),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Observers may not create defects"),
        (status = 404, description = "Referenced project does not exist")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_defect(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<DefectCreateRequest>,
) -> AppResult<(StatusCode, Json<Defect>)> {
    let attrs = Gate::new(&state.pool, &auth).create_defect(&payload).await?;

    let now = utc_now();
    let defect_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO defects (id, title, description, priority, status, project_id, created_by, assigned_to, deadline, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(defect_id)
    .bind(&attrs.title)
    .bind(&attrs.description)
    .bind(attrs.priority.as_str())
    .bind(attrs.status.as_str())
    .bind(attrs.project_id)
    .bind(auth.user_id)
    .bind(attrs.assigned_to)
    .bind(attrs.deadline)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let defect: Defect = fetch_defect(&state.pool, defect_id).await?.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &defect,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(defect)))
}

#[utoipa::path(
    get,
    path = "/defects/{id}",
    tag = "Defects",
    params(("id" = Uuid, Path, description = "Defect id")),
    responses((status = 200, description = "Defect detail", body = Defect)),
    security(("bearerAuth" = []))
)]
pub async fn get_defect(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Defect>> {
    Gate::new(&state.pool, &auth).require(Action::ViewDefect)?;

    let defect: Defect = fetch_defect(&state.pool, id).await?.try_into()?;
    Ok(Json(defect))
}

#[utoipa::path(
    put,
    path = "/defects/{id}",
    tag = "Defects",
    params(("id" = Uuid, Path, description = "Defect id")),
    request_body = DefectUpdateRequest,
    responses(
        (status = 200, description = "Defect updated", body = Defect),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Engineers edit only defects they created or are assigned to")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_defect(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<DefectUpdateRequest>,
) -> AppResult<Json<Defect>> {
    let current: Defect = fetch_defect(&state.pool, id).await?.try_into()?;
    let attrs = Gate::new(&state.pool, &auth).update_defect(&current, &payload).await?;

    // created_by is immutable; it is deliberately absent from the UPDATE.
    let now = utc_now();
    sqlx::query(
        "UPDATE defects SET title = ?, description = ?, priority = ?, status = ?, project_id = ?, assigned_to = ?, deadline = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&attrs.title)
    .bind(&attrs.description)
    .bind(attrs.priority.as_str())
    .bind(attrs.status.as_str())
    .bind(attrs.project_id)
    .bind(attrs.assigned_to)
    .bind(attrs.deadline)
    .bind(now)
    .bind(id)
    .execute(&state.pool)
    .await?;

    let defect: Defect = fetch_defect(&state.pool, id).await?.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &defect,
        Some(&current),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(defect))
}

#[utoipa::path(
    delete,
    path = "/defects/{id}",
    tag = "Defects",
    params(("id" = Uuid, Path, description = "Defect id")),
    responses(
        (status = 204, description = "Defect deleted along with its comments and attachments"),
        (status = 403, description = "Only admin and manager delete defects")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_defect(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    Gate::new(&state.pool, &auth).delete_defect()?;

    let defect: Defect = fetch_defect(&state.pool, id).await?.try_into()?;

    let stored_files: Vec<String> =
        sqlx::query_scalar("SELECT file_path FROM defect_attachments WHERE defect_id = ?")
            .bind(id)
            .fetch_all(&state.pool)
            .await?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM defect_comments WHERE defect_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM defect_attachments WHERE defect_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM defects WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    for path in stored_files {
        remove_stored_file(&path);
    }

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &defect,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/defects/{id}/comments",
    tag = "Defects",
    params(("id" = Uuid, Path, description = "Defect id")),
    responses((status = 200, description = "Comments in chronological order", body = [Comment])),
    security(("bearerAuth" = []))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Comment>>> {
    Gate::new(&state.pool, &auth).require(Action::ViewDefect)?;
    ensure_defect_exists(&state.pool, id).await?;

    let comments = sqlx::query_as::<_, Comment>(
        "SELECT c.id, c.defect_id, c.user_id, u.username AS author, c.body, c.created_at \
         FROM defect_comments c LEFT JOIN users u ON c.user_id = u.id \
         WHERE c.defect_id = ? ORDER BY c.created_at ASC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(comments))
}

#[utoipa::path(
    post,
    path = "/defects/{id}/comments",
    tag = "Defects",
    params(("id" = Uuid, Path, description = "Defect id")),
    request_body = CommentCreateRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 403, description = "Observers may not comment"),
        (status = 404, description = "Defect not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentCreateRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let body = Gate::new(&state.pool, &auth).comment(&payload.body)?;
    ensure_defect_exists(&state.pool, id).await?;

    let comment = Comment {
        id: Uuid::new_v4(),
        defect_id: id,
        user_id: auth.user_id,
        author: Some(auth.username.clone()),
        body,
        created_at: utc_now(),
    };

    sqlx::query(
        "INSERT INTO defect_comments (id, defect_id, user_id, body, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(comment.id)
    .bind(comment.defect_id)
    .bind(comment.user_id)
    .bind(&comment.body)
    .bind(comment.created_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &comment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    get,
    path = "/defects/{id}/attachments",
    tag = "Defects",
    params(("id" = Uuid, Path, description = "Defect id")),
    responses((status = 200, description = "Attachments, newest first", body = [Attachment])),
    security(("bearerAuth" = []))
)]
pub async fn list_attachments(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Attachment>>> {
    Gate::new(&state.pool, &auth).require(Action::ViewDefect)?;
    ensure_defect_exists(&state.pool, id).await?;

    let attachments = sqlx::query_as::<_, Attachment>(
        "SELECT id, defect_id, file_name, file_path, file_type, size_bytes, uploaded_by, created_at \
         FROM defect_attachments WHERE defect_id = ? ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(attachments))
}

#[utoipa::path(
    post,
    path = "/defects/{id}/attachments",
    tag = "Defects",
    params(("id" = Uuid, Path, description = "Defect id")),
    request_body = AttachmentCreateRequest,
    responses(
        (status = 201, description = "Attachment registered", body = Attachment),
        (status = 400, description = "Disallowed type or over the 10 MB limit"),
        (status = 404, description = "Defect not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachmentCreateRequest>,
) -> AppResult<(StatusCode, Json<Attachment>)> {
    Gate::new(&state.pool, &auth).attach(&payload.file_name, &payload.file_type, payload.size_bytes)?;
    ensure_defect_exists(&state.pool, id).await?;

    let attachment_id = Uuid::new_v4();
    let attachment = Attachment {
        id: attachment_id,
        defect_id: id,
        file_name: payload.file_name.clone(),
        file_path: format!("uploads/{}-{}", attachment_id, payload.file_name),
        file_type: payload.file_type.clone(),
        size_bytes: payload.size_bytes,
        uploaded_by: auth.user_id,
        created_at: utc_now(),
    };

    sqlx::query(
        "INSERT INTO defect_attachments (id, defect_id, file_name, file_path, file_type, size_bytes, uploaded_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(attachment.id)
    .bind(attachment.defect_id)
    .bind(&attachment.file_name)
    .bind(&attachment.file_path)
    .bind(&attachment.file_type)
    .bind(attachment.size_bytes)
    .bind(attachment.uploaded_by)
    .bind(attachment.created_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &attachment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(attachment)))
}

#[utoipa::path(
    delete,
    path = "/defects/{id}/attachments/{attachment_id}",
    tag = "Defects",
    params(
        ("id" = Uuid, Path, description = "Defect id"),
        ("attachment_id" = Uuid, Path, description = "Attachment id")
    ),
    responses(
        (status = 204, description = "Attachment removed"),
        (status = 403, description = "Only the uploader or admin/manager may remove it")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((id, attachment_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let attachment = sqlx::query_as::<_, Attachment>(
        "SELECT id, defect_id, file_name, file_path, file_type, size_bytes, uploaded_by, created_at \
         FROM defect_attachments WHERE id = ? AND defect_id = ?",
    )
    .bind(attachment_id)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("attachment not found"))?;

    Gate::new(&state.pool, &auth).delete_attachment(attachment.uploaded_by)?;

    sqlx::query("DELETE FROM defect_attachments WHERE id = ?")
        .bind(attachment_id)
        .execute(&state.pool)
        .await?;

    remove_stored_file(&attachment.file_path);

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &attachment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Best-effort cleanup of the externally stored file; a missing file is not
/// an error.
fn remove_stored_file(path: &str) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path, "failed to remove stored attachment file: {err}");
        }
    }
}

/// Dependent-record routes only need to know the defect is there; the
/// ownership-column lookup is enough.
async fn ensure_defect_exists(pool: &SqlitePool, defect_id: Uuid) -> AppResult<()> {
    pool.find_defect(defect_id)
        .await?
        .ok_or_else(|| AppError::not_found("defect not found"))?;
    Ok(())
}

async fn fetch_defect(pool: &SqlitePool, defect_id: Uuid) -> AppResult<DbDefect> {
    sqlx::query_as::<_, DbDefect>(&format!(
        "SELECT {DEFECT_COLUMNS} FROM defects WHERE id = ?"
    ))
    .bind(defect_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("defect not found"))
}
