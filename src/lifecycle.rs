//! Lifecycle handlers: page created, page repositioned, container permission edited

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assignee::Assignee;
use crate::compare::find_existing_permission_for_assignee;
use crate::directory::Directory;
use crate::error::{CanopyError, Result};
use crate::levels::{OperationSet, PermissionLevel};
use crate::model::{Page, PagePermission, PermissionInput, PermissionValues};
use crate::repair::{repair_illegal_permissions, RepairReport};
use crate::tree::{resolve_tree, ResolveOptions};
use crate::tx::{PermissionPatch, Tx};
use crate::upsert::upsert_permission;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created { page_id: Uuid },
    Repositioned { page_id: Uuid },
    /// A permission on a board-type page changed and must reach every card below it
    ContainerPermissionUpdated { permission_id: Uuid },
}

/// What a handler wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleOutcome {
    /// Records created or overwritten
    pub written: Vec<PagePermission>,
    /// Existing descendant records updated in place
    pub updated: usize,
    pub repair: Option<RepairReport>,
}

pub fn on_lifecycle_event(tx: &mut Tx, dir: &dyn Directory, event: &LifecycleEvent) -> Result<LifecycleOutcome> {
    match event {
        LifecycleEvent::Created { page_id } => on_page_created(tx, dir, page_id),
        LifecycleEvent::Repositioned { page_id } => on_page_repositioned(tx, page_id),
        LifecycleEvent::ContainerPermissionUpdated { permission_id } => {
            on_container_permission_updated(tx, permission_id)
        }
    }
}

// ============================================================================
// Page created
// ============================================================================

/// Seed a new page: tenant defaults on roots, a copy of the parent's records otherwise.
/// The creator is granted full access either way.
pub fn on_page_created(tx: &mut Tx, dir: &dyn Directory, page_id: &Uuid) -> Result<LifecycleOutcome> {
    let mut page = tx.view().require_page(page_id)?;
    let Some(parent_id) = page.parent_id else {
        return seed_root(tx, dir, &page);
    };
    if tx.view().page(&parent_id)?.is_none() {
        warn!(page_id = %page.id, parent_id = %parent_id, "parent missing, treating page as root");
        page.parent_id = None;
        tx.put_page(&page)?;
        return seed_root(tx, dir, &page);
    }
    inherit_from_parent(tx, dir, &page, &parent_id)
}

#[inline]
fn new_record(page: &Page, level: PermissionLevel, assignee: Assignee) -> PagePermission {
    PagePermission {
        id: Uuid::new_v4(),
        page_id: page.id,
        level,
        operations: OperationSet::EMPTY,
        assignee,
        source_permission_id: None,
        allow_discovery: false,
    }
}

/// Whether the creator gets a direct full access grant
fn creator_is_grantable(dir: &dyn Directory, page: &Page) -> Result<bool> {
    if dir.is_service_account(&page.created_by)? {
        debug!(page_id = %page.id, user_id = %page.created_by, "service account creator, no direct grant");
        return Ok(false);
    }
    if dir.space_role(&page.space_id, &page.created_by)?.is_none() {
        warn!(
            page_id = %page.id,
            user_id = %page.created_by,
            "creator is not a member of the space, no direct grant"
        );
        return Ok(false);
    }
    Ok(true)
}

fn seed_root(tx: &mut Tx, dir: &dyn Directory, page: &Page) -> Result<LifecycleOutcome> {
    let defaults = dir.space_defaults(&page.space_id)?;
    let mut records = Vec::with_capacity(3);
    match defaults.default_level {
        Some(PermissionLevel::Custom) => {
            warn!(space_id = %page.space_id, "custom default level has no operations, skipping space grant");
        }
        Some(level) => records.push(new_record(page, level, Assignee::Space(page.space_id))),
        None => {}
    }
    if defaults.public_pages {
        records.push(new_record(page, PermissionLevel::View, Assignee::Public));
    }
    if creator_is_grantable(dir, page)? {
        records.push(new_record(page, PermissionLevel::FullAccess, Assignee::User(page.created_by)));
    }
    let written = tx.create_many(&records)?;
    info!(page_id = %page.id, space_id = %page.space_id, count = written.len(), "seeded root page");
    Ok(LifecycleOutcome { written, ..Default::default() })
}

fn inherit_from_parent(tx: &mut Tx, dir: &dyn Directory, page: &Page, parent_id: &Uuid) -> Result<LifecycleOutcome> {
    let repair = repair_illegal_permissions(tx, parent_id)?;

    let copies: Vec<PagePermission> = tx
        .view()
        .permissions_for_page(parent_id)?
        .into_iter()
        .map(|p| PagePermission {
            id: Uuid::new_v4(),
            page_id: page.id,
            level: p.level,
            operations: p.operations,
            assignee: p.assignee,
            source_permission_id: Some(p.source_of_truth()),
            allow_discovery: p.allow_discovery,
        })
        .collect();
    let mut written = tx.create_many(&copies)?;

    if creator_is_grantable(dir, page)? {
        let input = PermissionInput::Values(PermissionValues::new(
            PermissionLevel::FullAccess,
            Assignee::User(page.created_by),
        ));
        let granted = upsert_permission(tx, dir, &page.id, &input, None)?;
        written.retain(|p| p.id != granted.id);
        written.push(granted);
    }
    info!(page_id = %page.id, parent_id = %parent_id, count = written.len(), "inherited parent permissions");
    Ok(LifecycleOutcome { written, updated: 0, repair: Some(repair) })
}

/// Store a new page and run the created handler in the same transaction
pub fn insert_page(tx: &mut Tx, dir: &dyn Directory, page: &Page) -> Result<LifecycleOutcome> {
    if tx.view().page(&page.id)?.is_some() {
        return Err(CanopyError::invalid(format!("page {} already exists", page.id)));
    }
    if let Some(pid) = page.parent_id {
        if let Some(parent) = tx.view().page(&pid)? {
            if parent.space_id != page.space_id {
                return Err(CanopyError::invalid("parent page belongs to a different space"));
            }
        }
    }
    tx.put_page(page)?;
    on_page_created(tx, dir, &page.id)
}

// ============================================================================
// Page repositioned
// ============================================================================

pub fn on_page_repositioned(tx: &mut Tx, page_id: &Uuid) -> Result<LifecycleOutcome> {
    let repair = repair_illegal_permissions(tx, page_id)?;
    Ok(LifecycleOutcome { repair: Some(repair), ..Default::default() })
}

/// Rewrite the parent link of a page and heal its subtree.
/// `None` turns the page into a root.
pub fn move_page(tx: &mut Tx, page_id: &Uuid, new_parent: Option<Uuid>) -> Result<LifecycleOutcome> {
    let mut page = tx.view().require_page(page_id)?;
    if let Some(pid) = new_parent {
        if pid == page.id {
            return Err(CanopyError::invalid("a page cannot be its own parent"));
        }
        let parent = tx.view().require_page(&pid)?;
        if parent.space_id != page.space_id {
            return Err(CanopyError::invalid("cannot move a page into another space"));
        }
        let chain = resolve_tree(&tx.view(), &pid, ResolveOptions::default())?;
        if chain.ancestors().any(|n| n.id() == page.id) {
            return Err(CanopyError::invalid("cannot move a page into its own subtree"));
        }
    }
    page.parent_id = new_parent;
    tx.put_page(&page)?;
    on_page_repositioned(tx, &page.id)
}

// ============================================================================
// Container permission updated
// ============================================================================

/// Push a board's record verbatim onto every descendant: existing records for the
/// assignee are updated, missing ones are created, all pointing at the source of truth.
pub fn on_container_permission_updated(tx: &mut Tx, permission_id: &Uuid) -> Result<LifecycleOutcome> {
    let view = tx.view();
    let record = view.require_permission(permission_id)?;
    let page = view.require_page(&record.page_id)?;
    if !page.page_type.is_container() {
        return Err(CanopyError::invalid(format!(
            "page {} is a {:?}, not a board",
            page.id, page.page_type
        )));
    }
    let source = record.source_of_truth();
    let tree = resolve_tree(&view, &page.id, ResolveOptions::with_descendants())?;

    let mut to_update = Vec::new();
    let mut to_create = Vec::new();
    for node in tree.descendants() {
        match find_existing_permission_for_assignee(&node.permissions, &record.assignee) {
            Some(existing) => to_update.push(existing.id),
            None => to_create.push(PagePermission {
                id: Uuid::new_v4(),
                page_id: node.id(),
                level: record.level,
                operations: record.operations,
                assignee: record.assignee,
                source_permission_id: Some(source),
                allow_discovery: record.allow_discovery,
            }),
        }
    }

    let patch = PermissionPatch::values_of(&record).with_source(Some(source));
    let updated = tx.update_permissions(&to_update, &patch)?;
    let written = tx.create_many(&to_create)?;
    info!(
        page_id = %page.id,
        permission_id = %record.id,
        updated,
        created = written.len(),
        "synced board permission"
    );
    Ok(LifecycleOutcome { written, updated, repair: None })
}
