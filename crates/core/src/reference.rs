//! Polymorphic role/permission references.
//!
//! Callers may refer to a role or permission by display name, by identifier,
//! or by a homogeneous list of either. The four legal shapes are an explicit
//! tagged variant, and the validating [`Ref::classify`] factory rejects
//! ambiguous or mixed shapes at the API boundary rather than deep inside
//! resolution logic.

use uuid::Uuid;

use crate::error::{PassportError, PassportResult};
use crate::id::{PermissionId, RoleId};

/// A reference to one or many roles/permissions, by name or identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ref<I> {
    /// A single display name (guarded before lookup).
    Name(String),
    /// A single identifier.
    Id(I),
    /// A homogeneous list of display names.
    Names(Vec<String>),
    /// A homogeneous list of identifiers.
    Ids(Vec<I>),
}

pub type RoleRef = Ref<RoleId>;
pub type PermissionRef = Ref<PermissionId>;

impl<I> Ref<I> {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn id(id: I) -> Self {
        Self::Id(id)
    }

    pub fn names(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn ids(ids: impl IntoIterator<Item = I>) -> Self {
        Self::Ids(ids.into_iter().collect())
    }

    /// Whether this reference holds a collection rather than a scalar.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Names(_) | Self::Ids(_))
    }
}

impl<I: From<Uuid>> Ref<I> {
    /// Classify a single opaque token: identifier-shaped input (a UUID)
    /// becomes [`Ref::Id`], anything else is treated as a display name.
    pub fn classify_one(value: &str) -> Self {
        match Uuid::parse_str(value) {
            Ok(uuid) => Self::Id(I::from(uuid)),
            Err(_) => Self::Name(value.to_string()),
        }
    }

    /// Classify a sequence of opaque tokens into a homogeneous list.
    ///
    /// All elements must classify the same way; a sequence mixing names and
    /// identifiers fails with `InvalidReference` — it is never coerced or
    /// truncated to its first element.
    pub fn classify(values: &[&str]) -> PassportResult<Self> {
        if values.is_empty() {
            return Err(PassportError::invalid_reference("empty reference list"));
        }

        let mut names = Vec::new();
        let mut ids = Vec::new();
        for value in values {
            match Uuid::parse_str(value) {
                Ok(uuid) => ids.push(I::from(uuid)),
                Err(_) => names.push((*value).to_string()),
            }
        }

        match (names.is_empty(), ids.is_empty()) {
            (false, true) => Ok(Self::Names(names)),
            (true, false) => Ok(Self::Ids(ids)),
            _ => Err(PassportError::invalid_reference(
                "reference list mixes names and identifiers",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_name_and_id_classify_by_shape() {
        let id = RoleId::new();
        assert_eq!(RoleRef::classify_one("admin"), Ref::Name("admin".into()));
        assert_eq!(RoleRef::classify_one(&id.to_string()), Ref::Id(id));
    }

    #[test]
    fn homogeneous_lists_classify() {
        let list = RoleRef::classify(&["admin", "manager"]).unwrap();
        assert_eq!(list, Ref::Names(vec!["admin".into(), "manager".into()]));

        let a = RoleId::new();
        let b = RoleId::new();
        let list = RoleRef::classify(&[&a.to_string(), &b.to_string()]).unwrap();
        assert_eq!(list, Ref::Ids(vec![a, b]));
    }

    #[test]
    fn mixed_list_is_invalid() {
        let id = PermissionId::new().to_string();
        let err = PermissionRef::classify(&["admin", &id]).unwrap_err();
        assert!(matches!(err, PassportError::InvalidReference(_)));
    }

    #[test]
    fn empty_list_is_invalid() {
        let err = RoleRef::classify(&[]).unwrap_err();
        assert!(matches!(err, PassportError::InvalidReference(_)));
    }
}
