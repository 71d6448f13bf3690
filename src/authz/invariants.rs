//! Structural and temporal payload checks, run strictly before any
//! persistence call. Failures surface as rejection reasons, never as
//! generic faults.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::defect::{Defect, DefectCreateRequest, DefectStatus, DefectUpdateRequest, Priority};
use crate::models::project::{Project, ProjectCreateRequest, ProjectStatus, ProjectUpdateRequest};

use super::store::ReferenceStore;

/// MIME types accepted for defect attachments.
pub const ALLOWED_ATTACHMENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// 10 MiB ceiling for a single attachment.
pub const MAX_ATTACHMENT_BYTES: i64 = 10 * 1024 * 1024;

/// Accepts ISO (`YYYY-MM-DD`) and day-first (`DD.MM.YYYY`) forms,
/// normalizing to a `NaiveDate` before any comparison.
pub fn parse_date(input: &str) -> AppResult<NaiveDate> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%d.%m.%Y"))
        .map_err(|_| AppError::bad_request(format!("unparseable date: {input}")))
}

/// A project payload that passed validation, normalized and ready to write.
#[derive(Debug, Clone)]
pub struct ProjectAttrs {
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

fn check_project_dates(start: NaiveDate, end: Option<NaiveDate>) -> AppResult<()> {
    if let Some(end) = end {
        // Equal dates are fine; a zero-length project is legal.
        if end < start {
            return Err(AppError::bad_request(
                "project end date must not precede its start date",
            ));
        }
    }
    Ok(())
}

pub fn validate_new_project(req: &ProjectCreateRequest) -> AppResult<ProjectAttrs> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("project name must not be empty"));
    }

    let start_date = req
        .start_date
        .as_deref()
        .ok_or_else(|| AppError::bad_request("project start date is required"))
        .and_then(parse_date)?;
    let end_date = req.end_date.as_deref().map(parse_date).transpose()?;
    check_project_dates(start_date, end_date)?;

    let status = match req.status.as_deref() {
        Some(s) => ProjectStatus::parse(s)?,
        None => ProjectStatus::Active,
    };

    Ok(ProjectAttrs {
        name: name.to_string(),
        description: req.description.clone(),
        status,
        start_date,
        end_date,
    })
}

/// Overlay the update on the current row, then re-check the date invariant
/// over the merged result.
pub fn validate_project_update(
    current: &Project,
    req: &ProjectUpdateRequest,
) -> AppResult<ProjectAttrs> {
    let name = match req.name.as_deref() {
        Some(name) => {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::bad_request("project name must not be empty"));
            }
            name.to_string()
        }
        None => current.name.clone(),
    };

    let start_date = match req.start_date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => current.start_date,
    };
    let end_date = match req.end_date.as_deref() {
        Some(raw) => Some(parse_date(raw)?),
        None => current.end_date,
    };
    check_project_dates(start_date, end_date)?;

    let status = match req.status.as_deref() {
        Some(s) => ProjectStatus::parse(s)?,
        None => current.status,
    };

    Ok(ProjectAttrs {
        name,
        description: req.description.clone().or_else(|| current.description.clone()),
        status,
        start_date,
        end_date,
    })
}

/// A defect payload that passed validation.
#[derive(Debug, Clone)]
pub struct DefectAttrs {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: DefectStatus,
    pub project_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<NaiveDate>,
}

/// A deadline is measured against "today" at validation time, not against
/// any persisted creation date.
fn check_deadline(deadline: NaiveDate, today: NaiveDate) -> AppResult<()> {
    if deadline < today {
        return Err(AppError::bad_request("defect deadline must not be in the past"));
    }
    Ok(())
}

pub async fn validate_new_defect<S: ReferenceStore + ?Sized>(
    store: &S,
    req: &DefectCreateRequest,
    today: NaiveDate,
) -> AppResult<DefectAttrs> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("defect title must not be empty"));
    }

    if !store.project_exists(req.project_id).await? {
        return Err(AppError::not_found(format!(
            "project {} does not exist",
            req.project_id
        )));
    }

    let deadline = req.deadline.as_deref().map(parse_date).transpose()?;
    if let Some(deadline) = deadline {
        check_deadline(deadline, today)?;
    }

    let priority = match req.priority.as_deref() {
        Some(p) => Priority::parse(p)?,
        None => Priority::Medium,
    };
    let status = match req.status.as_deref() {
        Some(s) => DefectStatus::parse(s)?,
        None => DefectStatus::New,
    };

    Ok(DefectAttrs {
        title: title.to_string(),
        description: req.description.clone(),
        priority,
        status,
        project_id: req.project_id,
        assigned_to: req.assigned_to,
        deadline,
    })
}

/// An edit that leaves an already-past deadline untouched is not
/// retroactively rejected; only newly supplied values are checked. A
/// re-targeted project id is re-checked for existence.
pub async fn validate_defect_update<S: ReferenceStore + ?Sized>(
    store: &S,
    current: &Defect,
    req: &DefectUpdateRequest,
    today: NaiveDate,
) -> AppResult<DefectAttrs> {
    let title = match req.title.as_deref() {
        Some(title) => {
            let title = title.trim();
            if title.is_empty() {
                return Err(AppError::bad_request("defect title must not be empty"));
            }
            title.to_string()
        }
        None => current.title.clone(),
    };

    let project_id = match req.project_id {
        Some(project_id) if project_id != current.project_id => {
            if !store.project_exists(project_id).await? {
                return Err(AppError::not_found(format!(
                    "project {project_id} does not exist"
                )));
            }
            project_id
        }
        Some(project_id) => project_id,
        None => current.project_id,
    };

    let deadline = match req.deadline.as_deref() {
        Some(raw) => {
            let deadline = parse_date(raw)?;
            check_deadline(deadline, today)?;
            Some(deadline)
        }
        None => current.deadline,
    };

    let priority = match req.priority.as_deref() {
        Some(p) => Priority::parse(p)?,
        None => current.priority,
    };
    let status = match req.status.as_deref() {
        Some(s) => DefectStatus::parse(s)?,
        None => current.status,
    };

    Ok(DefectAttrs {
        title,
        description: req.description.clone().or_else(|| current.description.clone()),
        priority,
        status,
        project_id,
        assigned_to: req.assigned_to.or(current.assigned_to),
        deadline,
    })
}

pub fn validate_comment(body: &str) -> AppResult<String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::bad_request("comment text must not be empty"));
    }
    Ok(body.to_string())
}

pub fn validate_attachment(file_name: &str, file_type: &str, size_bytes: i64) -> AppResult<()> {
    if file_name.trim().is_empty() {
        return Err(AppError::bad_request("attachment file name must not be empty"));
    }
    if !ALLOWED_ATTACHMENT_TYPES.contains(&file_type) {
        return Err(AppError::bad_request(format!(
            "attachment type {file_type} is not allowed; only JPEG/PNG images and PDF/DOC/DOCX documents are accepted"
        )));
    }
    if size_bytes <= 0 {
        return Err(AppError::bad_request("attachment size must be positive"));
    }
    if size_bytes > MAX_ATTACHMENT_BYTES {
        return Err(AppError::bad_request("attachment exceeds the 10 MB size limit"));
    }
    Ok(())
}
