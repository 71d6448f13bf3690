use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Gate, ReferenceStore, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::user::{
    AuthResponse, DbUser, LoginRequest, ProfileUpdateRequest, RegisterRequest, User,
};
use crate::utils::{hash_password, utc_now, verify_password};

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid payload or username/email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let user = insert_user(&state.pool, &payload).await?;
    let token = state.jwt.issue(user.id, &user.username, user.role)?;

    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, role, created_at, updated_at FROM users WHERE username = ?",
    )
    .bind(&payload.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid username or password"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid username or password"));
    }

    let user: User = db_user.try_into()?;
    let token = state.jwt.issue(user.id, &user.username, user.role)?;

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/auth/profile",
    tag = "Auth",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Username/email taken or wrong current password")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<ProfileUpdateRequest>,
) -> AppResult<Json<User>> {
    let current = fetch_user_by_id(&state.pool, auth.user_id).await?;

    let username = match payload.username.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("username must not be empty")),
        Some(name) => name.to_string(),
        None => current.username.clone(),
    };
    let email = match payload.email.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("email must not be empty")),
        Some(email) => email.to_string(),
        None => current.email.clone(),
    };

    if state
        .pool
        .username_or_email_taken(&username, &email, Some(auth.user_id))
        .await?
    {
        return Err(AppError::bad_request("username or email already in use"));
    }

    let password_hash = match payload.new_password.as_deref() {
        Some(new_password) => {
            let current_password = payload
                .current_password
                .as_deref()
                .ok_or_else(|| AppError::bad_request("current password is required to set a new one"))?;
            if !verify_password(current_password, &current.password_hash)? {
                return Err(AppError::bad_request("current password is incorrect"));
            }
            hash_password(new_password)?
        }
        None => current.password_hash.clone(),
    };

    let now = utc_now();
    sqlx::query("UPDATE users SET username = ?, email = ?, password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&username)
        .bind(&email)
        .bind(&password_hash)
        .bind(now)
        .bind(auth.user_id)
        .execute(&state.pool)
        .await?;

    let old: User = current.try_into()?;
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &user,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user))
}

#[utoipa::path(
    get,
    path = "/auth/users",
    tag = "Auth",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Requires the manage_users permission")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    Gate::new(&state.pool, &auth).require(Action::ManageUsers)?;

    let users = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, role, created_at, updated_at FROM users ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let users: Vec<User> = users
        .into_iter()
        .map(User::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    post,
    path = "/auth/users",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 403, description = "Requires the manage_users permission")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    Gate::new(&state.pool, &auth).require(Action::ManageUsers)?;

    let user = insert_user(&state.pool, &payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    delete,
    path = "/auth/users/{id}",
    tag = "Auth",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete own account"),
        (status = 403, description = "Requires the manage_users permission")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    Gate::new(&state.pool, &auth).require(Action::ManageUsers)?;

    if id == auth.user_id {
        return Err(AppError::bad_request("cannot delete your own account"));
    }

    let db_user = fetch_user_by_id(&state.pool, id).await?;
    let user: User = db_user.try_into()?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Lightweight listing for assignment dropdowns; open to every
/// authenticated role.
#[utoipa::path(
    get,
    path = "/users",
    tag = "Auth",
    responses((status = 200, description = "Assignable users", body = [User])),
    security(("bearerAuth" = []))
)]
pub async fn assignable_users(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> AppResult<Json<Vec<User>>> {
    let users = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, role, created_at, updated_at FROM users ORDER BY username",
    )
    .fetch_all(&state.pool)
    .await?;

    let users: Vec<User> = users
        .into_iter()
        .map(User::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(users))
}

/// Shared between self-registration and admin user creation. The role is
/// parsed at this boundary; a missing role falls back to engineer, an
/// unrecognized one is rejected outright.
async fn insert_user(pool: &SqlitePool, payload: &RegisterRequest) -> AppResult<User> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("username must not be empty"));
    }
    let email = payload.email.trim();
    if email.is_empty() {
        return Err(AppError::bad_request("email must not be empty"));
    }

    let role = match payload.role.as_deref() {
        Some(raw) => Role::parse(raw)?,
        None => Role::Engineer,
    };

    if pool.username_or_email_taken(username, email, None).await? {
        return Err(AppError::bad_request("username or email already in use"));
    }

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let db_user = fetch_user_by_id(pool, user_id).await?;
    db_user.try_into()
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, role, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))
}
