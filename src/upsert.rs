//! Upsert engine: the central permission write path
//!
//! A write either carries explicit values or references an ancestor's record to
//! inherit from. After the record is stored, every record inheriting from it is
//! refreshed, and when its own pointer moved, the subtree's records that followed
//! the old pointer are re-pointed in the same pass.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::assignee::Assignee;
use crate::compare::{find_existing_permission_for_assignee, has_same_or_more_permissions};
use crate::directory::Directory;
use crate::error::{CanopyError, Result};
use crate::model::{Page, PagePermission, PermissionInput, PermissionValues};
use crate::tree::{resolve_tree, ResolveOptions, ResolvedTree};
use crate::tx::{PermissionPatch, Tx};

/// Create or overwrite the permission of `page_id` for one assignee.
///
/// `tree` is reused when it is a flattened tree of `page_id`; otherwise the
/// tree is resolved inside the transaction.
pub fn upsert_permission(
    tx: &mut Tx,
    dir: &dyn Directory,
    page_id: &Uuid,
    input: &PermissionInput,
    tree: Option<&ResolvedTree>,
) -> Result<PagePermission> {
    let resolved;
    let tree = match tree {
        Some(t) if t.is_flattened() && t.target().id() == *page_id => t,
        _ => {
            resolved = resolve_tree(&tx.view(), page_id, ResolveOptions::whole_subtree())?;
            &resolved
        }
    };
    match input {
        PermissionInput::Values(values) => upsert_values(tx, dir, tree, values),
        PermissionInput::InheritFrom { inherit_from } => upsert_inherited(tx, dir, tree, inherit_from),
    }
}

fn upsert_values(
    tx: &mut Tx,
    dir: &dyn Directory,
    tree: &ResolvedTree,
    values: &PermissionValues,
) -> Result<PagePermission> {
    let operations = values.level.normalize(values.operations)?;

    if let Some(parent_perm) = tree
        .immediate_parent()
        .and_then(|p| find_existing_permission_for_assignee(&p.permissions, &values.assignee))
    {
        let same_grant = parent_perm.level == values.level && parent_perm.operations == operations;
        let same_discovery = !values.assignee.is_public()
            || values.allow_discovery.map_or(true, |a| a == parent_perm.allow_discovery);
        if same_grant && same_discovery {
            debug!(
                page_id = %tree.target().id(),
                source = %parent_perm.id,
                "value matches parent grant, inheriting instead"
            );
            return upsert_inherited(tx, dir, tree, &parent_perm.id);
        }
    }

    let page = &tree.target().page;
    let view = tx.view();
    validate_assignee(dir, page, &values.assignee)?;
    let before = view.permission_for_assignee(&page.id, &values.assignee)?;

    let allow_discovery = values.assignee.is_public()
        && values
            .allow_discovery
            .or(before.as_ref().map(|b| b.allow_discovery))
            .unwrap_or(false);
    let record = PagePermission {
        id: before.as_ref().map_or_else(Uuid::new_v4, |b| b.id),
        page_id: page.id,
        level: values.level,
        operations,
        assignee: values.assignee,
        source_permission_id: None,
        allow_discovery,
    };
    write_and_cascade(tx, tree, before, record)
}

fn upsert_inherited(
    tx: &mut Tx,
    dir: &dyn Directory,
    tree: &ResolvedTree,
    permission_id: &Uuid,
) -> Result<PagePermission> {
    let page = &tree.target().page;
    let view = tx.view();
    let referenced = view.require_permission(permission_id)?;
    if referenced.page_id == page.id {
        return Err(CanopyError::SelfInheritance);
    }

    // Chains are one hop deep in storage: inherit from the referenced record's source
    let copy_from = match referenced.source_permission_id {
        Some(s) => view.permission(&s)?.unwrap_or_else(|| referenced.clone()),
        None => referenced.clone(),
    };
    validate_assignee(dir, page, &copy_from.assignee)?;

    let mut inherit = match check_inheritance(tree, &referenced) {
        Ok(legal) => legal,
        Err(CanopyError::CannotInheritOutsideTree { source_page, target_page }) => {
            warn!(
                source_page = %source_page,
                target_page = %target_page,
                "inheritance source outside the tree, creating an independent copy"
            );
            false
        }
        Err(e) => return Err(e),
    };
    // the referenced record may itself hold an illegal pointer
    if inherit && !tree.ancestors().any(|n| n.id() == copy_from.page_id) {
        warn!(
            permission_id = %referenced.id,
            source_page = %copy_from.page_id,
            target_page = %page.id,
            "referenced record inherits from outside the tree, creating an independent copy"
        );
        inherit = false;
    }

    let before = view.permission_for_assignee(&page.id, &copy_from.assignee)?;
    let record = PagePermission {
        id: before.as_ref().map_or_else(Uuid::new_v4, |b| b.id),
        page_id: page.id,
        level: copy_from.level,
        operations: copy_from.operations,
        assignee: copy_from.assignee,
        source_permission_id: inherit.then_some(copy_from.id),
        allow_discovery: copy_from.allow_discovery,
    };
    write_and_cascade(tx, tree, before, record)
}

/// Whether the target may keep a pointer to `referenced`.
///
/// Fails with `CannotInheritOutsideTree` when the referenced record's page is not
/// an ancestor. Otherwise the ancestor's records must all be matched or exceeded
/// by the target's records plus the inherited one.
pub fn check_inheritance(tree: &ResolvedTree, referenced: &PagePermission) -> Result<bool> {
    let Some(ancestor) = tree.ancestors().find(|n| n.id() == referenced.page_id) else {
        return Err(CanopyError::CannotInheritOutsideTree {
            source_page: referenced.page_id,
            target_page: tree.target().id(),
        });
    };
    let comparison = tree.target().permissions.iter().chain(std::iter::once(referenced));
    Ok(has_same_or_more_permissions(&ancestor.permissions, comparison))
}

/// Assignees must belong to the page's space
pub fn validate_assignee(dir: &dyn Directory, page: &Page, assignee: &Assignee) -> Result<()> {
    match assignee {
        Assignee::Space(id) if *id != page.space_id => Err(CanopyError::insecure(
            "space permissions can only target the space the page belongs to",
        )),
        Assignee::Role(id) if dir.role_space(id)? != Some(page.space_id) => Err(CanopyError::insecure(
            "role permissions can only target roles of the space the page belongs to",
        )),
        Assignee::User(id) if dir.space_role(&page.space_id, id)?.is_none() => Err(CanopyError::insecure(
            "user permissions can only target members of the space the page belongs to",
        )),
        _ => Ok(()),
    }
}

fn write_and_cascade(
    tx: &mut Tx,
    tree: &ResolvedTree,
    before: Option<PagePermission>,
    record: PagePermission,
) -> Result<PagePermission> {
    let saved = tx.put_permission(&record)?;

    // Everyone inheriting from this record follows its new value, and its pointer if it has one
    let mut patch = PermissionPatch::values_of(&saved);
    if saved.source_permission_id.is_some() {
        patch = patch.with_source(saved.source_permission_id);
    }
    let refreshed = tx.update_where_source(&saved.id, None, &patch)?;

    // The pointer moved: descendants that followed the old pointer now follow this record
    let mut repointed = 0;
    if let Some(old) = before.and_then(|b| b.source_permission_id) {
        if saved.source_permission_id != Some(old) {
            let scope = tree.descendant_page_ids();
            let patch = PermissionPatch::values_of(&saved).with_source(Some(saved.source_of_truth()));
            repointed = tx.update_where_source(&old, Some(&scope), &patch)?.len();
        }
    }

    debug!(
        page_id = %saved.page_id,
        permission_id = %saved.id,
        assignee = %saved.assignee,
        inherited = saved.is_inherited(),
        refreshed = refreshed.len(),
        repointed,
        "upserted permission"
    );
    Ok(saved)
}
