use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Attachment {
    pub id: Uuid,
    pub defect_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for Attachment {
    fn entity_type() -> &'static str { "attachment" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Noise }
}

/// Metadata registration for a file whose bytes live in external storage.
/// Type and size are still checked here at ingestion.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachmentCreateRequest {
    #[schema(example = "crack-photo.jpg")]
    pub file_name: String,
    #[schema(example = "image/jpeg")]
    pub file_type: String,
    #[schema(example = 204800)]
    pub size_bytes: i64,
}
