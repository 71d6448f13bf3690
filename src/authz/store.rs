use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::errors::AppResult;

/// The ownership columns of a defect row, enough to answer "may this user
/// touch it" without loading the full record.
#[derive(Debug, Clone, FromRow)]
pub struct DefectRef {
    pub id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
}

/// Read-only lookups the authorization core delegates to storage. Every call
/// re-reads current state; there is no caching layer, so ordering between
/// concurrent requests is the storage engine's concern, not ours.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn project_exists(&self, project_id: Uuid) -> AppResult<bool>;

    async fn defect_count_for_project(&self, project_id: Uuid) -> AppResult<i64>;

    async fn find_defect(&self, defect_id: Uuid) -> AppResult<Option<DefectRef>>;

    /// Uniqueness probe for registration and profile updates. `exclude_user`
    /// lets a user keep their own username/email on update.
    async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
        exclude_user: Option<Uuid>,
    ) -> AppResult<bool>;
}

#[async_trait]
impl ReferenceStore for SqlitePool {
    async fn project_exists(&self, project_id: Uuid) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(self)
            .await?;
        Ok(count > 0)
    }

    async fn defect_count_for_project(&self, project_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM defects WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(self)
            .await?;
        Ok(count)
    }

    async fn find_defect(&self, defect_id: Uuid) -> AppResult<Option<DefectRef>> {
        let found = sqlx::query_as::<_, DefectRef>(
            "SELECT id, created_by, assigned_to FROM defects WHERE id = ?",
        )
        .bind(defect_id)
        .fetch_optional(self)
        .await?;
        Ok(found)
    }

    async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
        exclude_user: Option<Uuid>,
    ) -> AppResult<bool> {
        let count: i64 = match exclude_user {
            Some(id) => {
                sqlx::query_scalar(
                    "SELECT COUNT(1) FROM users WHERE (username = ? OR email = ?) AND id != ?",
                )
                .bind(username)
                .bind(email)
                .bind(id)
                .fetch_one(self)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE username = ? OR email = ?")
                    .bind(username)
                    .bind(email)
                    .fetch_one(self)
                    .await?
            }
        };
        Ok(count > 0)
    }
}
