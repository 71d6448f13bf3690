use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Gate};
use crate::errors::AppResult;
use crate::jwt::AuthUser;

/// One exported row. Rendering (CSV or otherwise) is the caller's business;
/// this endpoint only assembles the data.
#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct DefectReportRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub project_name: String,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub project_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/reports/defects",
    tag = "Reports",
    params(("project_id" = Option<Uuid>, Query, description = "Restrict to one project")),
    responses(
        (status = 200, description = "Defect report rows", body = [DefectReportRow]),
        (status = 403, description = "Only admin and manager export reports")
    ),
    security(("bearerAuth" = []))
)]
pub async fn export_defects(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Vec<DefectReportRow>>> {
    Gate::new(&state.pool, &auth).require(Action::ExportReport)?;

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT d.id, d.title, d.description, d.status, d.priority, p.name AS project_name, \
         d.assigned_to, d.deadline, d.created_at \
         FROM defects d JOIN projects p ON d.project_id = p.id WHERE 1=1",
    );
    if let Some(project_id) = query.project_id {
        builder.push(" AND d.project_id = ").push_bind(project_id);
    }
    builder.push(" ORDER BY d.created_at DESC");

    let rows = builder
        .build_query_as::<DefectReportRow>()
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows))
}
