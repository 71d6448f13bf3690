use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// Append-only. Comments are never edited or deleted individually; they go
/// away only when their defect is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Comment {
    pub id: Uuid,
    pub defect_id: Uuid,
    pub user_id: Uuid,
    /// Author username, joined in for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[sqlx(default)]
    pub author: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Loggable for Comment {
    fn entity_type() -> &'static str { "comment" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Noise }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentCreateRequest {
    #[schema(example = "Retiled, awaiting sign-off.")]
    pub body: String,
}
