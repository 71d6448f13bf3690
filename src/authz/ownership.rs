use uuid::Uuid;

use super::policy::Role;

/// The acting user's relation to a defect. Widens permissions for the
/// engineer role beyond the blanket policy matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub is_creator: bool,
    pub is_assignee: bool,
}

impl Ownership {
    pub fn resolve(user_id: Uuid, created_by: Uuid, assigned_to: Option<Uuid>) -> Self {
        Ownership {
            is_creator: user_id == created_by,
            is_assignee: assigned_to == Some(user_id),
        }
    }

    pub fn any(&self) -> bool {
        self.is_creator || self.is_assignee
    }
}

/// Admin and manager edit irrespective of ownership; an engineer only the
/// defects they created or are assigned to; an observer never.
pub fn may_edit_defect(role: Role, ownership: Ownership) -> bool {
    match role {
        Role::Admin | Role::Manager => true,
        Role::Engineer => ownership.any(),
        Role::Observer => false,
    }
}

/// Attachments can be removed by their uploader or by admin/manager.
pub fn may_delete_attachment(role: Role, actor: Uuid, uploaded_by: Uuid) -> bool {
    matches!(role, Role::Admin | Role::Manager) || actor == uploaded_by
}
