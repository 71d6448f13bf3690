//! Per-request authorization pipeline.
//!
//! Stages run in a fixed order: the bearer token is verified by the
//! [`crate::jwt::AuthUser`] extractor before a `Gate` ever exists, then each
//! operation runs role policy, ownership (where the policy entry is
//! conditional), integrity guards, and payload invariants — in that order,
//! short-circuiting on the first failure. A denial means no storage write
//! was attempted, so there is never anything to roll back.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::defect::{Defect, DefectCreateRequest, DefectUpdateRequest};
use crate::models::project::{Project, ProjectCreateRequest, ProjectUpdateRequest};

use super::invariants::{self, DefectAttrs, ProjectAttrs};
use super::ownership::{self, Ownership};
use super::policy::{can_perform, Action};
use super::store::ReferenceStore;

pub struct Gate<'a, S: ReferenceStore + ?Sized> {
    store: &'a S,
    actor: &'a AuthUser,
}

impl<'a, S: ReferenceStore + ?Sized> Gate<'a, S> {
    pub fn new(store: &'a S, actor: &'a AuthUser) -> Self {
        Self { store, actor }
    }

    /// Policy stage. Every call site asks the matrix; nobody compares role
    /// strings inline.
    pub fn require(&self, action: Action) -> AppResult<()> {
        if can_perform(self.actor.role, action) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %self.actor.user_id,
                role = %self.actor.role,
                action = %action,
                "permission denied"
            );
            Err(AppError::forbidden(format!(
                "role {} may not {}",
                self.actor.role, action
            )))
        }
    }

    pub fn create_project(&self, req: &ProjectCreateRequest) -> AppResult<ProjectAttrs> {
        self.require(Action::CreateProject)?;
        invariants::validate_new_project(req)
    }

    pub fn update_project(
        &self,
        current: &Project,
        req: &ProjectUpdateRequest,
    ) -> AppResult<ProjectAttrs> {
        self.require(Action::EditProject)?;
        invariants::validate_project_update(current, req)
    }

    /// Role check first, then the zero-defects integrity guard. The guard
    /// applies to every role that gets this far.
    pub async fn delete_project(&self, project_id: Uuid) -> AppResult<()> {
        self.require(Action::DeleteProject)?;

        if !self.store.project_exists(project_id).await? {
            return Err(AppError::not_found("project not found"));
        }

        let attached = self.store.defect_count_for_project(project_id).await?;
        if attached > 0 {
            return Err(AppError::integrity(format!(
                "project cannot be deleted while {attached} defect(s) reference it"
            )));
        }

        Ok(())
    }

    pub async fn create_defect(&self, req: &DefectCreateRequest) -> AppResult<DefectAttrs> {
        self.require(Action::CreateDefect)?;
        invariants::validate_new_defect(self.store, req, Utc::now().date_naive()).await
    }

    /// Ownership runs between the role check and payload validation: an
    /// engineer only passes for defects they created or are assigned to.
    pub async fn update_defect(
        &self,
        current: &Defect,
        req: &DefectUpdateRequest,
    ) -> AppResult<DefectAttrs> {
        self.require(Action::EditDefect)?;

        let ownership =
            Ownership::resolve(self.actor.user_id, current.created_by, current.assigned_to);
        if !ownership::may_edit_defect(self.actor.role, ownership) {
            return Err(AppError::forbidden(
                "defect may only be edited by its creator or assignee",
            ));
        }

        invariants::validate_defect_update(self.store, current, req, Utc::now().date_naive()).await
    }

    pub fn delete_defect(&self) -> AppResult<()> {
        self.require(Action::DeleteDefect)
    }

    pub fn comment(&self, body: &str) -> AppResult<String> {
        self.require(Action::CommentOnDefect)?;
        invariants::validate_comment(body)
    }

    /// Attachments ride the defect-contribution permission; their type and
    /// size limits are validator concerns even though the bytes live
    /// elsewhere.
    pub fn attach(&self, file_name: &str, file_type: &str, size_bytes: i64) -> AppResult<()> {
        self.require(Action::CommentOnDefect)?;
        invariants::validate_attachment(file_name, file_type, size_bytes)
    }

    pub fn delete_attachment(&self, uploaded_by: Uuid) -> AppResult<()> {
        if ownership::may_delete_attachment(self.actor.role, self.actor.user_id, uploaded_by) {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "attachment may only be removed by its uploader or a manager",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::authz::store::DefectRef;
    use crate::authz::Role;
    use crate::models::defect::{DefectStatus, Priority};

    struct StubStore {
        projects: Vec<Uuid>,
        defect_count: i64,
    }

    #[async_trait]
    impl ReferenceStore for StubStore {
        async fn project_exists(&self, project_id: Uuid) -> AppResult<bool> {
            Ok(self.projects.contains(&project_id))
        }

        async fn defect_count_for_project(&self, _project_id: Uuid) -> AppResult<i64> {
            Ok(self.defect_count)
        }

        async fn find_defect(&self, _defect_id: Uuid) -> AppResult<Option<DefectRef>> {
            Ok(None)
        }

        async fn username_or_email_taken(
            &self,
            _username: &str,
            _email: &str,
            _exclude_user: Option<Uuid>,
        ) -> AppResult<bool> {
            Ok(false)
        }
    }

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            username: "someone".to_string(),
            role,
        }
    }

    fn defect(created_by: Uuid, assigned_to: Option<Uuid>) -> Defect {
        Defect {
            id: Uuid::new_v4(),
            title: "Cracked tile".to_string(),
            description: None,
            priority: Priority::Medium,
            status: DefectStatus::New,
            project_id: Uuid::new_v4(),
            created_by,
            assigned_to,
            deadline: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn no_changes() -> DefectUpdateRequest {
        DefectUpdateRequest {
            title: None,
            description: None,
            priority: None,
            status: None,
            project_id: None,
            assigned_to: None,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn project_delete_role_beats_integrity() {
        let project_id = Uuid::new_v4();
        let store = StubStore { projects: vec![project_id], defect_count: 3 };

        // Engineer is turned away at the policy stage even though the
        // integrity guard would also fire.
        let engineer = actor(Role::Engineer);
        let err = Gate::new(&store, &engineer).delete_project(project_id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Manager passes policy and hits the guard.
        let manager = actor(Role::Manager);
        let err = Gate::new(&store, &manager).delete_project(project_id).await.unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[tokio::test]
    async fn project_delete_allowed_when_empty() {
        let project_id = Uuid::new_v4();
        let store = StubStore { projects: vec![project_id], defect_count: 0 };

        let manager = actor(Role::Manager);
        assert!(Gate::new(&store, &manager).delete_project(project_id).await.is_ok());

        let observer = actor(Role::Observer);
        let err = Gate::new(&store, &observer).delete_project(project_id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let store = StubStore { projects: vec![], defect_count: 0 };
        let admin = actor(Role::Admin);
        let err = Gate::new(&store, &admin).delete_project(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn engineer_edits_only_owned_defects() {
        let store = StubStore { projects: vec![], defect_count: 0 };
        let engineer = actor(Role::Engineer);
        let gate = Gate::new(&store, &engineer);

        let foreign = defect(Uuid::new_v4(), None);
        let err = gate.update_defect(&foreign, &no_changes()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let assigned = defect(Uuid::new_v4(), Some(engineer.user_id));
        assert!(gate.update_defect(&assigned, &no_changes()).await.is_ok());

        let created = defect(engineer.user_id, None);
        assert!(gate.update_defect(&created, &no_changes()).await.is_ok());
    }

    #[tokio::test]
    async fn manager_edits_irrespective_of_ownership() {
        let store = StubStore { projects: vec![], defect_count: 0 };
        let manager = actor(Role::Manager);
        let gate = Gate::new(&store, &manager);

        let foreign = defect(Uuid::new_v4(), None);
        assert!(gate.update_defect(&foreign, &no_changes()).await.is_ok());
    }

    #[tokio::test]
    async fn engineer_never_deletes_defects() {
        let store = StubStore { projects: vec![], defect_count: 0 };
        let engineer = actor(Role::Engineer);
        assert!(Gate::new(&store, &engineer).delete_defect().is_err());

        let manager = actor(Role::Manager);
        assert!(Gate::new(&store, &manager).delete_defect().is_ok());
    }

    #[tokio::test]
    async fn observer_cannot_comment_or_attach() {
        let store = StubStore { projects: vec![], defect_count: 0 };
        let observer = actor(Role::Observer);
        let gate = Gate::new(&store, &observer);

        assert!(gate.comment("looks bad").is_err());
        assert!(gate.attach("photo.jpg", "image/jpeg", 1024).is_err());
    }

    #[tokio::test]
    async fn policy_failure_wins_over_bad_payload() {
        // An observer sending an invalid project payload gets the 403, not
        // the validator's 400.
        let store = StubStore { projects: vec![], defect_count: 0 };
        let observer = actor(Role::Observer);
        let gate = Gate::new(&store, &observer);

        let req = ProjectCreateRequest {
            name: String::new(),
            description: None,
            status: None,
            start_date: None,
            end_date: None,
        };
        let err = gate.create_project(&req).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn deadline_today_is_accepted() {
        let project_id = Uuid::new_v4();
        let store = StubStore { projects: vec![project_id], defect_count: 0 };
        let engineer = actor(Role::Engineer);
        let gate = Gate::new(&store, &engineer);

        let today: NaiveDate = Utc::now().date_naive();
        let req = DefectCreateRequest {
            title: "Cracked tile".to_string(),
            description: None,
            priority: None,
            status: None,
            project_id,
            assigned_to: None,
            deadline: Some(today.format("%Y-%m-%d").to_string()),
        };
        assert!(gate.create_defect(&req).await.is_ok());
    }
}
