use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, defects, health, projects, reports};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/profile", put(auth::update_profile))
        .route("/users", get(auth::list_users).post(auth::create_user))
        .route("/users/:id", delete(auth::delete_user));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        );

    let defect_routes = Router::new()
        .route("/", get(defects::list_defects).post(defects::create_defect))
        .route(
            "/:id",
            get(defects::get_defect)
                .put(defects::update_defect)
                .delete(defects::delete_defect),
        )
        .route("/:id/comments", get(defects::list_comments).post(defects::add_comment))
        .route(
            "/:id/attachments",
            get(defects::list_attachments).post(defects::add_attachment),
        )
        .route(
            "/:id/attachments/:attachment_id",
            delete(defects::delete_attachment),
        );

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        // assignment lookup for defect forms, open to every authenticated role
        .route("/users", get(auth::assignable_users))
        .nest("/projects", project_routes)
        .nest("/defects", defect_routes)
        .route("/reports/defects", get(reports::export_defects))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
