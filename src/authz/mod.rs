//! Authorization core: who may perform which operation, and which payloads
//! are structurally legal.
//!
//! Composition per request, in this order:
//! 1. token verification ([`crate::jwt`]) — 401 on any credential fault;
//! 2. role policy ([`policy::can_perform`]) — 403;
//! 3. ownership ([`ownership`]) for role-conditional entries — 403;
//! 4. integrity guards (e.g. the zero-defects rule on project delete) — 400;
//! 5. payload invariants ([`invariants`]) — 400, or 404 for dangling ids.
//!
//! Earlier stages always win, the first failure short-circuits, and no
//! storage write happens on any denial. All state the core needs beyond the
//! request itself comes in through [`ReferenceStore`] lookups.

mod gate;
mod invariants;
mod ownership;
mod policy;
mod store;

pub use gate::Gate;
pub use invariants::{
    parse_date, validate_attachment, DefectAttrs, ProjectAttrs, ALLOWED_ATTACHMENT_TYPES,
    MAX_ATTACHMENT_BYTES,
};
pub use ownership::{may_delete_attachment, may_edit_defect, Ownership};
pub use policy::{can_perform, Action, Role};
pub use store::{DefectRef, ReferenceStore};
