mod app;
mod authz;
mod db;
mod errors;
mod events;
mod jwt;
mod models;
mod routes;
mod utils;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(
            authz::Role,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::ProfileUpdateRequest,
            models::project::Project,
            models::project::ProjectStatus,
            models::project::ProjectCreateRequest,
            models::project::ProjectUpdateRequest,
            models::defect::Defect,
            models::defect::DefectStatus,
            models::defect::Priority,
            models::defect::DefectCreateRequest,
            models::defect::DefectUpdateRequest,
            models::comment::Comment,
            models::comment::CommentCreateRequest,
            models::attachment::Attachment,
            models::attachment::AttachmentCreateRequest,
            routes::reports::DefectReportRow
        )
    ),
    tags(
        (name = "Auth", description = "Authentication and user management"),
        (name = "Projects", description = "Construction project management"),
        (name = "Defects", description = "Defect tracking with comments and attachments"),
        (name = "Reports", description = "Data export"),
        (name = "Health", description = "Liveness")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let pool = db::init().await?;
    let app = app::create_app(pool).await?;

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
