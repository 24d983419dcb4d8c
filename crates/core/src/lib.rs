//! `passport-core` — domain foundation for the Passport authorization engine.
//!
//! This crate contains **pure domain** primitives (no storage concerns):
//! identifiers, the error taxonomy, guard-token derivation, polymorphic
//! role/permission references, pagination, and the record types.

pub mod error;
pub mod guard;
pub mod id;
pub mod model;
pub mod pager;
pub mod reference;

pub use error::{PassportError, PassportResult};
pub use guard::guard;
pub use id::{PermissionId, RoleId, UserId};
pub use model::{
    NewPermission, NewRole, Permission, PermissionUpdate, Role, RoleUpdate, permission_ids,
    role_ids,
};
pub use pager::{DEFAULT_PAGE_SIZE, Pager};
pub use reference::{PermissionRef, Ref, RoleRef};
