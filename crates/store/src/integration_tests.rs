//! End-to-end engine tests over the in-memory store.
//!
//! These exercise the public `Passport` surface the way a backend service
//! would, with all three repository contracts backed by one [`InMemoryStore`].

use std::sync::Arc;

use passport_core::{Pager, PassportError, PermissionRef, RoleRef, UserId};
use passport_engine::Passport;

use crate::InMemoryStore;

fn passport() -> Passport {
    passport_observability::init();
    let store = Arc::new(InMemoryStore::new());
    Passport::new(store.clone(), store.clone(), store)
}

// ─────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn names_resolve_through_guard_tokens() {
    let passport = passport();
    let created = passport.create_role("Site Admin", "").await.unwrap();

    // Any spelling that slugs to the same token finds the same record.
    for name in ["Site Admin", "site admin", "  Site!!  Admin  "] {
        let found = passport
            .resolve_role(&RoleRef::name(name), false)
            .await
            .unwrap();
        assert_eq!(found.id, created.id);
    }

    let by_id = passport
        .resolve_role(&RoleRef::id(created.id), false)
        .await
        .unwrap();
    assert_eq!(by_id.guard_name, "site-admin");
}

#[tokio::test]
async fn unknown_name_is_not_found() {
    let passport = passport();
    let err = passport
        .resolve_role(&RoleRef::name("ghost"), false)
        .await
        .unwrap_err();
    assert_eq!(err, PassportError::NotFound);
}

#[tokio::test]
async fn create_role_twice_returns_the_first_record() {
    let passport = passport();
    let first = passport.create_role("Admin", "original").await.unwrap();
    let second = passport.create_role("admin", "ignored").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.description, "original");
}

#[tokio::test]
async fn batch_resolution_skips_unknown_names() {
    let passport = passport();
    passport.create_role("Editor", "").await.unwrap();

    let roles = passport
        .resolve_roles(&RoleRef::names(["Editor", "No Such Role"]), false)
        .await
        .unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].guard_name, "editor");
}

#[tokio::test]
async fn eager_loading_attaches_role_permissions() {
    let passport = passport();
    let role = passport.create_role("Auditor", "").await.unwrap();
    passport.create_permission("read reports", "").await.unwrap();
    passport
        .add_permissions_to_role(&RoleRef::id(role.id), &PermissionRef::name("read reports"))
        .await
        .unwrap();

    let lean = passport
        .resolve_role(&RoleRef::id(role.id), false)
        .await
        .unwrap();
    assert!(lean.permissions.is_empty());

    let eager = passport
        .resolve_role(&RoleRef::id(role.id), true)
        .await
        .unwrap();
    assert_eq!(eager.permissions.len(), 1);
    assert_eq!(eager.permissions[0].guard_name, "read-reports");
}

// ─────────────────────────────────────────────────────────────────────────
// Mutators
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_with_empty_reference_clears_role_permissions() {
    let passport = passport();
    let role = passport.create_role("Manager", "").await.unwrap();
    passport.create_permission("approve", "").await.unwrap();
    passport
        .add_permissions_to_role(&RoleRef::id(role.id), &PermissionRef::name("approve"))
        .await
        .unwrap();

    passport
        .replace_permissions_of_role(&RoleRef::id(role.id), &PermissionRef::ids([]))
        .await
        .unwrap();

    let role = passport
        .resolve_role(&RoleRef::id(role.id), true)
        .await
        .unwrap();
    assert!(role.permissions.is_empty());
}

#[tokio::test]
async fn replace_with_empty_reference_clears_user_roles() {
    let passport = passport();
    let user = UserId::new();
    passport.create_role("Viewer", "").await.unwrap();
    passport
        .add_roles_to_user(user, &RoleRef::name("Viewer"))
        .await
        .unwrap();

    passport
        .replace_roles_of_user(user, &RoleRef::ids([]))
        .await
        .unwrap();

    let (roles, total) = passport.list_roles_of_user(user, None, false).await.unwrap();
    assert!(roles.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn remove_detaches_only_the_named_permissions() {
    let passport = passport();
    let role = passport.create_role("Ops", "").await.unwrap();
    passport.create_permission("deploy", "").await.unwrap();
    passport.create_permission("rollback", "").await.unwrap();
    passport
        .add_permissions_to_role(
            &RoleRef::id(role.id),
            &PermissionRef::names(["deploy", "rollback"]),
        )
        .await
        .unwrap();

    passport
        .remove_permissions_from_role(&RoleRef::id(role.id), &PermissionRef::name("deploy"))
        .await
        .unwrap();

    let role = passport
        .resolve_role(&RoleRef::id(role.id), true)
        .await
        .unwrap();
    assert_eq!(role.permissions.len(), 1);
    assert_eq!(role.permissions[0].guard_name, "rollback");
}

#[tokio::test]
async fn delete_role_cascades_into_join_rows() {
    let passport = passport();
    let user = UserId::new();
    let role = passport.create_role("Temp", "").await.unwrap();
    passport.create_permission("poke", "").await.unwrap();
    passport
        .add_permissions_to_role(&RoleRef::id(role.id), &PermissionRef::name("poke"))
        .await
        .unwrap();
    passport
        .add_roles_to_user(user, &RoleRef::id(role.id))
        .await
        .unwrap();

    passport.delete_role(&RoleRef::id(role.id)).await.unwrap();

    let err = passport
        .resolve_role(&RoleRef::id(role.id), false)
        .await
        .unwrap_err();
    assert_eq!(err, PassportError::NotFound);

    let (_, total) = passport.list_roles_of_user(user, None, false).await.unwrap();
    assert_eq!(total, 0);
    // The permission survives; only its attachment to the role is gone.
    assert!(passport.all_permissions_of_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_permission_cascades_into_join_rows() {
    let passport = passport();
    let user = UserId::new();
    let role = passport.create_role("Keeper", "").await.unwrap();
    let permission = passport.create_permission("transient", "").await.unwrap();
    passport
        .add_permissions_to_role(&RoleRef::id(role.id), &PermissionRef::id(permission.id))
        .await
        .unwrap();
    passport
        .add_permissions_to_user(user, &PermissionRef::id(permission.id))
        .await
        .unwrap();

    passport
        .delete_permission(&PermissionRef::id(permission.id))
        .await
        .unwrap();

    let err = passport
        .resolve_permission(&PermissionRef::id(permission.id))
        .await
        .unwrap_err();
    assert_eq!(err, PassportError::NotFound);

    // Both attachment paths are gone: the role's set and the direct grant.
    let role = passport
        .resolve_role(&RoleRef::id(role.id), true)
        .await
        .unwrap();
    assert!(role.permissions.is_empty());
    let (direct, total) = passport
        .list_direct_permissions_of_user(user, None)
        .await
        .unwrap();
    assert!(direct.is_empty());
    assert_eq!(total, 0);
    assert!(passport.all_permissions_of_user(user).await.unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────
// Effective permissions
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn all_permissions_union_direct_and_role_derived_without_duplicates() {
    let passport = passport();
    let user = UserId::new();
    let shared = passport.create_permission("read", "").await.unwrap();
    let derived = passport.create_permission("write", "").await.unwrap();

    passport.create_role("Writer", "").await.unwrap();
    passport
        .add_permissions_to_role(
            &RoleRef::name("Writer"),
            &PermissionRef::ids([shared.id, derived.id]),
        )
        .await
        .unwrap();
    passport
        .add_roles_to_user(user, &RoleRef::name("Writer"))
        .await
        .unwrap();
    // Direct grant overlaps a role-derived one.
    passport
        .add_permissions_to_user(user, &PermissionRef::id(shared.id))
        .await
        .unwrap();

    let all = passport.all_permissions_of_user(user).await.unwrap();
    let mut guards: Vec<&str> = all.iter().map(|p| p.guard_name.as_str()).collect();
    guards.sort_unstable();
    assert_eq!(guards, ["read", "write"]);
}

#[tokio::test]
async fn user_has_permission_via_direct_or_role_path() {
    let passport = passport();
    let direct_user = UserId::new();
    let role_user = UserId::new();
    let outsider = UserId::new();

    passport.create_permission("publish", "").await.unwrap();
    passport.create_role("Publisher", "").await.unwrap();
    passport
        .add_permissions_to_role(&RoleRef::name("Publisher"), &PermissionRef::name("publish"))
        .await
        .unwrap();

    passport
        .add_permissions_to_user(direct_user, &PermissionRef::name("publish"))
        .await
        .unwrap();
    passport
        .add_roles_to_user(role_user, &RoleRef::name("Publisher"))
        .await
        .unwrap();

    let reference = PermissionRef::name("publish");
    assert!(passport.user_has_permission(direct_user, &reference).await.unwrap());
    assert!(passport.user_has_permission(role_user, &reference).await.unwrap());
    assert!(!passport.user_has_permission(outsider, &reference).await.unwrap());
    // Only the direct path counts for the direct predicate.
    assert!(!passport
        .user_has_direct_permission(role_user, &reference)
        .await
        .unwrap());
}

#[tokio::test]
async fn direct_permission_listing_and_predicates_ignore_role_grants() {
    let passport = passport();
    let user = UserId::new();
    let read = passport.create_permission("read", "").await.unwrap();
    let write = passport.create_permission("write", "").await.unwrap();

    // `write` is only reachable through a role; the direct surface must not
    // see it.
    passport.create_role("Writer", "").await.unwrap();
    passport
        .add_permissions_to_role(&RoleRef::name("Writer"), &PermissionRef::id(write.id))
        .await
        .unwrap();
    passport
        .add_roles_to_user(user, &RoleRef::name("Writer"))
        .await
        .unwrap();
    passport
        .add_permissions_to_user(user, &PermissionRef::id(read.id))
        .await
        .unwrap();

    let (direct, total) = passport
        .list_direct_permissions_of_user(user, None)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(direct[0].id, read.id);

    let both = PermissionRef::ids([read.id, write.id]);
    assert!(passport
        .user_has_any_direct_permissions(user, &both)
        .await
        .unwrap());
    assert!(!passport
        .user_has_all_direct_permissions(user, &both)
        .await
        .unwrap());

    passport
        .add_permissions_to_user(user, &PermissionRef::id(write.id))
        .await
        .unwrap();
    assert!(passport
        .user_has_all_direct_permissions(user, &both)
        .await
        .unwrap());
}

#[tokio::test]
async fn user_has_all_and_any_span_both_grant_paths() {
    let passport = passport();
    let user = UserId::new();
    let direct = passport.create_permission("read", "").await.unwrap();
    let derived = passport.create_permission("write", "").await.unwrap();
    let missing = passport.create_permission("delete", "").await.unwrap();

    passport.create_role("Writer", "").await.unwrap();
    passport
        .add_permissions_to_role(&RoleRef::name("Writer"), &PermissionRef::id(derived.id))
        .await
        .unwrap();
    passport
        .add_roles_to_user(user, &RoleRef::name("Writer"))
        .await
        .unwrap();
    passport
        .add_permissions_to_user(user, &PermissionRef::id(direct.id))
        .await
        .unwrap();

    assert!(passport
        .user_has_all_permissions(user, &PermissionRef::ids([direct.id, derived.id]))
        .await
        .unwrap());
    assert!(!passport
        .user_has_all_permissions(user, &PermissionRef::ids([direct.id, missing.id]))
        .await
        .unwrap());
    assert!(passport
        .user_has_any_permissions(user, &PermissionRef::ids([missing.id, derived.id]))
        .await
        .unwrap());
    assert!(!passport
        .user_has_any_permissions(user, &PermissionRef::id(missing.id))
        .await
        .unwrap());
}

// ─────────────────────────────────────────────────────────────────────────
// Role predicates
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn role_has_all_permissions_requires_full_cartesian_coverage() {
    let passport = passport();
    let full = passport.create_role("Full", "").await.unwrap();
    let partial = passport.create_role("Partial", "").await.unwrap();
    let read = passport.create_permission("read", "").await.unwrap();
    let write = passport.create_permission("write", "").await.unwrap();

    passport
        .add_permissions_to_role(
            &RoleRef::id(full.id),
            &PermissionRef::ids([read.id, write.id]),
        )
        .await
        .unwrap();
    passport
        .add_permissions_to_role(&RoleRef::id(partial.id), &PermissionRef::id(read.id))
        .await
        .unwrap();

    let both_roles = RoleRef::ids([full.id, partial.id]);
    let both_permissions = PermissionRef::ids([read.id, write.id]);

    // Union coverage is complete, but `Partial` lacks `write`: every role
    // must hold every permission, so ALL is false.
    assert!(!passport
        .role_has_all_permissions(&both_roles, &both_permissions)
        .await
        .unwrap());
    assert!(passport
        .role_has_any_permissions(&both_roles, &both_permissions)
        .await
        .unwrap());

    passport
        .add_permissions_to_role(&RoleRef::id(partial.id), &PermissionRef::id(write.id))
        .await
        .unwrap();
    assert!(passport
        .role_has_all_permissions(&both_roles, &both_permissions)
        .await
        .unwrap());
}

#[tokio::test]
async fn user_role_predicates() {
    let passport = passport();
    let user = UserId::new();
    let held = passport.create_role("Held", "").await.unwrap();
    let other = passport.create_role("Other", "").await.unwrap();

    passport
        .add_roles_to_user(user, &RoleRef::id(held.id))
        .await
        .unwrap();

    assert!(passport.user_has_role(user, &RoleRef::id(held.id)).await.unwrap());
    assert!(!passport.user_has_role(user, &RoleRef::id(other.id)).await.unwrap());
    assert!(!passport
        .user_has_all_roles(user, &RoleRef::ids([held.id, other.id]))
        .await
        .unwrap());
    assert!(passport
        .user_has_any_roles(user, &RoleRef::ids([held.id, other.id]))
        .await
        .unwrap());
}

// ─────────────────────────────────────────────────────────────────────────
// Listing and pagination
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pagination_pages_slices_but_totals_stay_unfiltered() {
    let passport = passport();
    for name in ["One", "Two", "Three"] {
        passport.create_role(name, "").await.unwrap();
    }

    let (page, total) = passport
        .list_all_roles(Some(Pager::new(1, 2)), false)
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(total, 3);

    let (rest, total) = passport
        .list_all_roles(Some(Pager::new(2, 2)), false)
        .await
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(total, 3);
}

#[tokio::test]
async fn permissions_of_roles_are_distinct_across_roles() {
    let passport = passport();
    let a = passport.create_role("A", "").await.unwrap();
    let b = passport.create_role("B", "").await.unwrap();
    let shared = passport.create_permission("shared", "").await.unwrap();

    for role in [a.id, b.id] {
        passport
            .add_permissions_to_role(&RoleRef::id(role), &PermissionRef::id(shared.id))
            .await
            .unwrap();
    }

    let (permissions, total) = passport
        .list_permissions_of_roles(&RoleRef::ids([a.id, b.id]), None)
        .await
        .unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(total, 1);
}

// ─────────────────────────────────────────────────────────────────────────
// Reference classification at the boundary
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn classified_tokens_drive_resolution() {
    let passport = passport();
    let role = passport.create_role("Classified", "").await.unwrap();

    let by_name = RoleRef::classify_one("Classified");
    let by_id = RoleRef::classify_one(&role.id.to_string());
    assert_eq!(
        passport.resolve_role(&by_name, false).await.unwrap().id,
        role.id
    );
    assert_eq!(
        passport.resolve_role(&by_id, false).await.unwrap().id,
        role.id
    );

    let mixed = RoleRef::classify(&["Classified", &role.id.to_string()]);
    assert!(matches!(mixed, Err(PassportError::InvalidReference(_))));
}

#[tokio::test]
async fn update_permission_moves_the_guard_token() {
    let passport = passport();
    let permission = passport.create_permission("Old Perm", "").await.unwrap();

    let updated = passport
        .update_permission(
            &PermissionRef::id(permission.id),
            passport_core::PermissionUpdate {
                name: Some("New Perm".into()),
                description: Some("renamed".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.guard_name, "new-perm");
    assert_eq!(updated.description, "renamed");

    let err = passport
        .resolve_permission(&PermissionRef::name("Old Perm"))
        .await
        .unwrap_err();
    assert_eq!(err, PassportError::NotFound);
    let found = passport
        .resolve_permission(&PermissionRef::name("New Perm"))
        .await
        .unwrap();
    assert_eq!(found.id, permission.id);
}

#[tokio::test]
async fn rename_moves_the_guard_token() {
    let passport = passport();
    let role = passport.create_role("Old Name", "").await.unwrap();

    let updated = passport
        .update_role(
            &RoleRef::id(role.id),
            passport_core::RoleUpdate {
                name: Some("New Name".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.guard_name, "new-name");

    let err = passport
        .resolve_role(&RoleRef::name("Old Name"), false)
        .await
        .unwrap_err();
    assert_eq!(err, PassportError::NotFound);
    let found = passport
        .resolve_role(&RoleRef::name("New Name"), false)
        .await
        .unwrap();
    assert_eq!(found.id, role.id);
}
