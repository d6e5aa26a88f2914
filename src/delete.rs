//! Permission deletion and the public discoverability toggle

use tracing::debug;
use uuid::Uuid;

use crate::error::{CanopyError, Result};
use crate::model::PagePermission;
use crate::tree::{resolve_tree, ResolveOptions};
use crate::tx::{PermissionPatch, Tx};

/// Delete a permission and everything that inherits it.
///
/// An independent record takes every inheritor with it. An inherited record only
/// takes the records in its page's subtree that share its source, so sibling
/// subtrees keep their inherited copies. Returns every deleted id, the target first.
pub fn delete_permission(tx: &mut Tx, permission_id: &Uuid) -> Result<Vec<Uuid>> {
    let record = tx.view().require_permission(permission_id)?;

    let mut deleted = match record.source_permission_id {
        Some(source) => {
            let tree = resolve_tree(&tx.view(), &record.page_id, ResolveOptions::whole_subtree())?;
            let scope = tree.descendant_page_ids();
            tx.delete_where_source(&source, Some(&scope))?
        }
        None => tx.delete_where_source(&record.id, None)?,
    };
    tx.delete_permission_record(&record.id)?;
    deleted.insert(0, record.id);

    debug!(
        permission_id = %record.id,
        page_id = %record.page_id,
        cascaded = deleted.len() - 1,
        "deleted permission"
    );
    Ok(deleted)
}

/// Toggle whether a public page is surfaced in browse listings.
/// The flag follows the record to everything inheriting from it.
pub fn set_public_discoverability(tx: &mut Tx, permission_id: &Uuid, allow: bool) -> Result<PagePermission> {
    let record = tx.view().require_permission(permission_id)?;
    if !record.assignee.is_public() {
        return Err(CanopyError::invalid(
            "discoverability can only be set on public permissions",
        ));
    }
    let patch = PermissionPatch { allow_discovery: Some(allow), ..Default::default() };
    tx.update_permissions(&[record.id], &patch)?;
    tx.update_where_source(&record.id, None, &patch)?;
    tx.view().require_permission(&record.id)
}
