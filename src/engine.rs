//! Engine facade: one call per operation, each in its own transaction

use std::collections::HashMap;

use tracing::info;
use uuid::Uuid;

use crate::accessible::{list_accessible_ids, AccessQuery};
use crate::compute::{compute_page_permissions, compute_page_permissions_bulk, PermissionFlags};
use crate::config::EngineConfig;
use crate::db::Store;
use crate::delete;
use crate::directory::Directory;
use crate::error::{CanopyError, Result};
use crate::lifecycle::{self, LifecycleEvent, LifecycleOutcome};
use crate::model::{Page, PagePermission, PermissionInput};
use crate::repair::{self, IllegalReference, RepairReport};
use crate::tree::{resolve_tree, ResolveOptions, ResolvedTree};
use crate::upsert;

/// A store plus the directory it consults
pub struct PermissionEngine<D> {
    store: Store,
    directory: D,
}

impl<D: Directory> PermissionEngine<D> {
    pub fn new(store: Store, directory: D) -> Self {
        PermissionEngine { store, directory }
    }

    /// Open the store described by `config`
    pub fn open(config: &EngineConfig, directory: D) -> Result<Self> {
        let store = Store::open(&config.storage.path, config.map_size_bytes())?.with_max_depth(config.tree.max_depth);
        Ok(Self::new(store, directory))
    }

    #[inline]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[inline]
    pub fn directory(&self) -> &D {
        &self.directory
    }

    // ========================================================================
    // Pages
    // ========================================================================

    /// Insert a page and seed its permissions
    pub fn create_page(&self, page: &Page) -> Result<LifecycleOutcome> {
        self.store.transact(|tx| lifecycle::insert_page(tx, &self.directory, page))
    }

    /// Change page state (title, lock, archive, ...). Parent changes go through `move_page`.
    pub fn update_page(&self, page: &Page) -> Result<()> {
        self.store.transact(|tx| {
            let old = tx.view().require_page(&page.id)?;
            if old.parent_id != page.parent_id || old.space_id != page.space_id {
                return Err(CanopyError::invalid("use move_page to change where a page lives"));
            }
            tx.put_page(page)
        })
    }

    pub fn move_page(&self, page_id: &Uuid, new_parent: Option<Uuid>) -> Result<LifecycleOutcome> {
        self.store.transact(|tx| lifecycle::move_page(tx, page_id, new_parent))
    }

    pub fn page(&self, page_id: &Uuid) -> Result<Page> {
        self.store.read(|v| v.require_page(page_id))
    }

    pub fn resolve_tree(&self, page_id: &Uuid, opts: ResolveOptions) -> Result<ResolvedTree> {
        self.store.read(|v| resolve_tree(v, page_id, opts))
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    pub fn upsert_permission(&self, page_id: &Uuid, input: &PermissionInput) -> Result<PagePermission> {
        self.store
            .transact(|tx| upsert::upsert_permission(tx, &self.directory, page_id, input, None))
    }

    /// Returns every deleted id, the target first
    pub fn delete_permission(&self, permission_id: &Uuid) -> Result<Vec<Uuid>> {
        self.store.transact(|tx| delete::delete_permission(tx, permission_id))
    }

    pub fn list_permissions(&self, page_id: &Uuid) -> Result<Vec<PagePermission>> {
        self.store.read(|v| {
            v.require_page(page_id)?;
            v.permissions_for_page(page_id)
        })
    }

    pub fn set_public_discoverability(&self, permission_id: &Uuid, allow: bool) -> Result<PagePermission> {
        self.store
            .transact(|tx| delete::set_public_discoverability(tx, permission_id, allow))
    }

    pub fn compute_permissions(&self, page_id: &Uuid, user_id: Option<&Uuid>) -> Result<PermissionFlags> {
        self.store
            .read(|v| compute_page_permissions(v, &self.directory, page_id, user_id))
    }

    /// Flags for many pages in one read transaction
    pub fn compute_permissions_bulk(
        &self,
        page_ids: &[Uuid],
        user_id: Option<&Uuid>,
    ) -> Result<HashMap<Uuid, PermissionFlags>> {
        self.store
            .read(|v| compute_page_permissions_bulk(v, &self.directory, page_ids, user_id))
    }

    pub fn list_accessible_ids(&self, query: &AccessQuery) -> Result<Vec<Uuid>> {
        self.store.read(|v| list_accessible_ids(v, &self.directory, query))
    }

    pub fn on_lifecycle_event(&self, event: &LifecycleEvent) -> Result<LifecycleOutcome> {
        self.store
            .transact(|tx| lifecycle::on_lifecycle_event(tx, &self.directory, event))
    }

    // ========================================================================
    // Repair
    // ========================================================================

    pub fn repair_illegal_permissions(&self, page_id: &Uuid) -> Result<RepairReport> {
        self.store.transact(|tx| repair::repair_illegal_permissions(tx, page_id))
    }

    /// Repair every live root page of a space, and with it the whole space
    pub fn repair_space(&self, space_id: &Uuid) -> Result<Vec<RepairReport>> {
        let reports = self.store.transact(|tx| {
            let roots: Vec<Uuid> = tx
                .view()
                .space_pages(space_id)?
                .into_iter()
                .filter(|p| p.parent_id.is_none() && !p.deleted)
                .map(|p| p.id)
                .collect();
            roots
                .iter()
                .map(|id| repair::repair_illegal_permissions(tx, id))
                .collect::<Result<Vec<_>>>()
        })?;
        info!(
            space_id = %space_id,
            roots = reports.len(),
            repaired = reports.iter().filter(|r| !r.plan.is_empty()).count(),
            "repaired space"
        );
        Ok(reports)
    }

    /// Illegal references in the page and its subtree, without fixing them
    pub fn illegal_references(&self, page_id: &Uuid) -> Result<Vec<IllegalReference>> {
        let tree = self.resolve_tree(page_id, ResolveOptions::whole_subtree())?;
        Ok(repair::find_illegal_references(&tree))
    }
}
