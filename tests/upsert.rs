//! Upsert engine tests: direct grants, inheritance requests and cascades

mod common;

use std::collections::HashSet;

use canopy::{
    Assignee, CanopyError, ErrorKind, Operation, OperationSet, PermissionInput, PermissionLevel, PermissionValues,
};
use common::setup;
use uuid::Uuid;

// ============================================================================
// Direct grants
// ============================================================================

#[test]
fn upsert_twice_is_a_no_op() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());

    let first = f.grant(&root, PermissionLevel::Editor, role);
    let second = f.grant(&root, PermissionLevel::Editor, role);

    assert_eq!(first, second);
    assert_eq!(f.perms(&root).len(), 2);
}

#[test]
fn overwrite_keeps_one_record_per_assignee() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());

    let a = f.grant(&root, PermissionLevel::View, role);
    let b = f.grant(&root, PermissionLevel::FullAccess, role);
    assert_eq!(a.id, b.id);
    assert_eq!(b.level, PermissionLevel::FullAccess);

    let perms = f.perms(&root);
    let keys: HashSet<Assignee> = perms.iter().map(|p| p.assignee).collect();
    assert_eq!(keys.len(), perms.len());
}

#[test]
fn custom_level_keeps_explicit_operations() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());
    let ops = OperationSet::of(&[Operation::Read, Operation::EditLock]);

    let input = PermissionInput::Values(PermissionValues::custom(ops, role));
    let p = f.engine.upsert_permission(&root.id, &input).unwrap();
    assert_eq!(p.level, PermissionLevel::Custom);
    assert_eq!(p.grant(), ops);

    let empty = PermissionInput::Values(PermissionValues::custom(OperationSet::EMPTY, role));
    let e = f.engine.upsert_permission(&root.id, &empty).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidInput);
}

#[test]
fn named_level_drops_explicit_operations() {
    let f = setup();
    let root = f.root();
    let mut values = PermissionValues::new(PermissionLevel::View, Assignee::Space(f.space));
    values.operations = OperationSet::of(&[Operation::Delete]);

    let p = f.engine.upsert_permission(&root.id, &values.into()).unwrap();
    assert!(p.operations.is_empty());
    assert!(!p.grant().contains(Operation::Delete));
}

#[test]
fn discovery_flag_only_sticks_to_public() {
    let f = setup();
    let root = f.root();

    let public = PermissionValues::new(PermissionLevel::View, Assignee::Public).discoverable(true);
    assert!(f.engine.upsert_permission(&root.id, &public.into()).unwrap().allow_discovery);

    let space = PermissionValues::new(PermissionLevel::View, Assignee::Space(f.space)).discoverable(true);
    assert!(!f.engine.upsert_permission(&root.id, &space.into()).unwrap().allow_discovery);

    // omitted flag keeps the stored value
    let again = PermissionValues::new(PermissionLevel::View, Assignee::Public);
    assert!(f.engine.upsert_permission(&root.id, &again.into()).unwrap().allow_discovery);
}

// ============================================================================
// Tenant isolation
// ============================================================================

#[test]
fn foreign_space_assignee_is_insecure() {
    let f = setup();
    let root = f.root();
    let before = f.perms(&root);

    let input = PermissionValues::new(PermissionLevel::View, Assignee::Space(Uuid::new_v4()));
    let e = f.engine.upsert_permission(&root.id, &input.into()).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InsecureOperation);
    assert_eq!(f.perms(&root), before);
}

#[test]
fn foreign_role_and_non_member_are_insecure() {
    let f = setup();
    let root = f.root();
    let foreign_role = f.dir().create_role(Uuid::new_v4());

    let role = PermissionValues::new(PermissionLevel::View, Assignee::Role(foreign_role));
    assert!(matches!(
        f.engine.upsert_permission(&root.id, &role.into()),
        Err(CanopyError::InsecureOperation(_))
    ));

    let unknown = PermissionValues::new(PermissionLevel::View, Assignee::Role(Uuid::new_v4()));
    assert!(matches!(
        f.engine.upsert_permission(&root.id, &unknown.into()),
        Err(CanopyError::InsecureOperation(_))
    ));

    let stranger = PermissionValues::new(PermissionLevel::View, Assignee::User(Uuid::new_v4()));
    assert!(matches!(
        f.engine.upsert_permission(&root.id, &stranger.into()),
        Err(CanopyError::InsecureOperation(_))
    ));
    assert_eq!(f.perms(&root).len(), 1);
}

// ============================================================================
// Inheritance requests
// ============================================================================

#[test]
fn value_equal_to_parent_becomes_inheritance() {
    let f = setup();
    let root = f.root();
    let child = f.child(&root);
    let role = Assignee::Role(f.role());

    let parent_grant = f.grant(&root, PermissionLevel::View, role);
    // the child was created before the role grant, so it has nothing for the role yet
    let p = f.grant(&child, PermissionLevel::View, role);
    assert_eq!(p.source_permission_id, Some(parent_grant.id));
}

#[test]
fn inherit_request_flattens_one_hop() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());
    let top = f.grant(&root, PermissionLevel::Editor, role);
    let mid = f.child(&root);
    let leaf = f.child(&mid);

    let mid_grant = f.perm_for(&mid, role);
    assert_eq!(mid_grant.source_permission_id, Some(top.id));

    let p = f.engine.upsert_permission(&leaf.id, &PermissionInput::inherit(mid_grant.id)).unwrap();
    assert_eq!(p.source_permission_id, Some(top.id));
    assert_eq!(p.level, PermissionLevel::Editor);
}

#[test]
fn inherit_from_outside_the_tree_makes_an_independent_copy() {
    let f = setup();
    let role = Assignee::Role(f.role());
    let elsewhere = f.root();
    let foreign = f.grant(&elsewhere, PermissionLevel::ViewComment, role);
    let root = f.root();

    let p = f.engine.upsert_permission(&root.id, &PermissionInput::inherit(foreign.id)).unwrap();
    assert_eq!(p.source_permission_id, None);
    assert_eq!(p.level, PermissionLevel::ViewComment);
    assert_eq!(p.assignee, role);
    assert_eq!(p.page_id, root.id);
}

#[test]
fn inherit_through_a_corrupted_record_makes_an_independent_copy() {
    let f = setup();
    let role = Assignee::Role(f.role());
    let elsewhere = f.root();
    let foreign = f.grant(&elsewhere, PermissionLevel::Editor, role);
    let root = f.root();
    f.grant(&root, PermissionLevel::Editor, role);
    let mid = f.child(&root);
    let leaf = f.child(&mid);

    // point the middle record at a grant from another tree
    let mut corrupt = f.perm_for(&mid, role);
    corrupt.source_permission_id = Some(foreign.id);
    f.engine.store().transact(|tx| tx.put_permission(&corrupt)).unwrap();

    let p = f.engine.upsert_permission(&leaf.id, &PermissionInput::inherit(corrupt.id)).unwrap();
    assert_eq!(p.source_permission_id, None);
    assert_eq!(p.level, PermissionLevel::Editor);
    assert!(f.engine.illegal_references(&leaf.id).unwrap().is_empty());
}

#[test]
fn inherit_from_own_record_fails() {
    let f = setup();
    let root = f.root();
    let own = f.perm_for(&root, f.owner_assignee());

    let e = f.engine.upsert_permission(&root.id, &PermissionInput::inherit(own.id)).unwrap_err();
    assert_eq!(e, CanopyError::SelfInheritance);
}

#[test]
fn inherit_from_unknown_record_fails() {
    let f = setup();
    let root = f.root();
    let e = f
        .engine
        .upsert_permission(&root.id, &PermissionInput::inherit(Uuid::new_v4()))
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::NotFound);
}

#[test]
fn ancestor_sharing_more_than_the_page_yields_independent_copy() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());
    f.grant(&root, PermissionLevel::View, role);
    let child = f.child(&root);

    // drop the child's role grant: the root now shares more than the child holds
    let child_role = f.perm_for(&child, role);
    f.engine.delete_permission(&child_role.id).unwrap();

    let root_owner = f.perm_for(&root, f.owner_assignee());
    let p = f.engine.upsert_permission(&child.id, &PermissionInput::inherit(root_owner.id)).unwrap();
    assert_eq!(p.source_permission_id, None);
    assert_eq!(p.level, PermissionLevel::FullAccess);
}

#[test]
fn unknown_page_is_not_found() {
    let f = setup();
    let input = PermissionValues::new(PermissionLevel::View, Assignee::Public);
    let e = f.engine.upsert_permission(&Uuid::new_v4(), &input.into()).unwrap_err();
    assert!(matches!(e, CanopyError::PageNotFound(_)));
}

// ============================================================================
// Cascades
// ============================================================================

#[test]
fn editing_a_shared_grant_updates_every_inheritor() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());
    let top = f.grant(&root, PermissionLevel::View, role);
    let a = f.child(&root);
    let b = f.child(&root);
    let a1 = f.child(&a);

    f.grant(&root, PermissionLevel::Editor, role);

    for page in [&a, &b, &a1] {
        let p = f.perm_for(page, role);
        assert_eq!(p.level, PermissionLevel::Editor);
        assert_eq!(p.source_permission_id, Some(top.id));
    }
}

#[test]
fn overriding_a_child_repoints_only_its_subtree() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());
    let top = f.grant(&root, PermissionLevel::View, role);
    let a = f.child(&root);
    let b = f.child(&root);
    let a1 = f.child(&a);
    let b1 = f.child(&b);

    let own = f.grant(&a, PermissionLevel::Editor, role);
    assert_eq!(own.source_permission_id, None);

    let a1p = f.perm_for(&a1, role);
    assert_eq!(a1p.source_permission_id, Some(own.id));
    assert_eq!(a1p.level, PermissionLevel::Editor);

    for page in [&b, &b1] {
        let p = f.perm_for(page, role);
        assert_eq!(p.source_permission_id, Some(top.id));
        assert_eq!(p.level, PermissionLevel::View);
    }
}

#[test]
fn repointing_back_to_parent_refreshes_the_subtree() {
    let f = setup();
    let root = f.root();
    let role = Assignee::Role(f.role());
    let top = f.grant(&root, PermissionLevel::View, role);
    let a = f.child(&root);
    let a1 = f.child(&a);
    let own = f.grant(&a, PermissionLevel::Editor, role);

    // same value as the parent again: the page re-inherits from the root
    let back = f.grant(&a, PermissionLevel::View, role);
    assert_eq!(back.id, own.id);
    assert_eq!(back.source_permission_id, Some(top.id));

    let a1p = f.perm_for(&a1, role);
    assert_eq!(a1p.level, PermissionLevel::View);
    assert_eq!(a1p.source_permission_id, Some(top.id));
}
