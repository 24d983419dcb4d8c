//! `passport-engine` — the authorization engine.
//!
//! This crate is intentionally decoupled from HTTP and storage: it defines
//! the narrow repository contracts the engine consumes and the [`Passport`]
//! orchestrator that resolves polymorphic role/permission references,
//! aggregates grants, and answers membership questions.

pub mod passport;
pub mod repository;

pub use passport::Passport;
pub use repository::{PermissionRepository, RoleRepository, UserGrantRepository};
