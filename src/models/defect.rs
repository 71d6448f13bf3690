use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn parse(input: &str) -> Result<Self, AppError> {
        match input {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(AppError::bad_request(format!("unknown priority: {other}"))),
        }
    }
}

/// Allowed status values. Any authorized caller may set any of them; there
/// is deliberately no transition graph (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DefectStatus {
    New,
    InProgress,
    Review,
    Resolved,
    Closed,
    Cancelled,
}

impl DefectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectStatus::New => "new",
            DefectStatus::InProgress => "in_progress",
            DefectStatus::Review => "review",
            DefectStatus::Resolved => "resolved",
            DefectStatus::Closed => "closed",
            DefectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(input: &str) -> Result<Self, AppError> {
        match input {
            "new" => Ok(DefectStatus::New),
            "in_progress" => Ok(DefectStatus::InProgress),
            "review" => Ok(DefectStatus::Review),
            "resolved" => Ok(DefectStatus::Resolved),
            "closed" => Ok(DefectStatus::Closed),
            "cancelled" => Ok(DefectStatus::Cancelled),
            other => Err(AppError::bad_request(format!("unknown defect status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Defect {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: DefectStatus,
    pub project_id: Uuid,
    /// Set at creation, immutable thereafter.
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Defect {
    fn entity_type() -> &'static str { "defect" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Important }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDefect {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbDefect> for Defect {
    type Error = AppError;

    fn try_from(value: DbDefect) -> Result<Self, Self::Error> {
        Ok(Defect {
            id: value.id,
            title: value.title,
            description: value.description,
            priority: Priority::parse(&value.priority)?,
            status: DefectStatus::parse(&value.status)?,
            project_id: value.project_id,
            created_by: value.created_by,
            assigned_to: value.assigned_to,
            deadline: value.deadline,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DefectCreateRequest {
    #[schema(example = "Cracked tile on level 3 lobby")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "high")]
    pub priority: Option<String>,
    #[schema(example = "new")]
    pub status: Option<String>,
    pub project_id: Uuid,
    pub assigned_to: Option<Uuid>,
    #[schema(example = "2025-12-10")]
    pub deadline: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DefectUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub project_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    /// Only a newly supplied deadline is checked against today; an already
    /// stored past deadline left untouched stays valid.
    pub deadline: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DefectListQuery {
    pub project_id: Option<Uuid>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
}
