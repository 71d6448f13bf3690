use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// The closed set of roles a user can hold. Parsed once at the system
/// boundary; the policy engine never sees a free-form role string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Engineer,
    Observer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Engineer, Role::Observer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Engineer => "engineer",
            Role::Observer => "observer",
        }
    }

    /// Strict parse. An unrecognized role is a payload error, never a
    /// silent fallback to some default.
    pub fn parse(input: &str) -> Result<Role, AppError> {
        match input {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "engineer" => Ok(Role::Engineer),
            "observer" => Ok(Role::Observer),
            other => Err(AppError::bad_request(format!("unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every operation the policy engine can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateProject,
    EditProject,
    DeleteProject,
    ViewProject,
    CreateDefect,
    EditDefect,
    DeleteDefect,
    ViewDefect,
    ManageUsers,
    ExportReport,
    CommentOnDefect,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::CreateProject,
        Action::EditProject,
        Action::DeleteProject,
        Action::ViewProject,
        Action::CreateDefect,
        Action::EditDefect,
        Action::DeleteDefect,
        Action::ViewDefect,
        Action::ManageUsers,
        Action::ExportReport,
        Action::CommentOnDefect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateProject => "create_project",
            Action::EditProject => "edit_project",
            Action::DeleteProject => "delete_project",
            Action::ViewProject => "view_project",
            Action::CreateDefect => "create_defect",
            Action::EditDefect => "edit_defect",
            Action::DeleteDefect => "delete_defect",
            Action::ViewDefect => "view_defect",
            Action::ManageUsers => "manage_users",
            Action::ExportReport => "export_report",
            Action::CommentOnDefect => "comment_on_defect",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role permission matrix. Pure lookup, no hidden state, deny by default.
///
/// `EditDefect` for an engineer answers "eligible": the final decision also
/// needs the ownership guard (creator or assignee). Every other entry is
/// unconditional.
pub fn can_perform(role: Role, action: Action) -> bool {
    use Action::*;

    match role {
        Role::Admin => true,
        Role::Manager => !matches!(action, ManageUsers),
        Role::Engineer => matches!(
            action,
            ViewProject | ViewDefect | CreateDefect | EditDefect | CommentOnDefect
        ),
        Role::Observer => matches!(action, ViewProject | ViewDefect),
    }
}
