//! Read operations over one transaction snapshot

use heed::RoTxn;
use uuid::Uuid;

use crate::assignee::Assignee;
use crate::db::Dbs;
use crate::error::{err, CanopyError, Result};
use crate::keys::{page_assignee, read_id};
use crate::model::{Page, PagePermission};

/// Read access to the store. Inside a write transaction it sees uncommitted writes.
pub struct View<'t, 'e> {
    dbs: &'t Dbs,
    txn: &'t RoTxn<'e>,
    max_depth: usize,
}

impl<'t, 'e> View<'t, 'e> {
    #[inline]
    pub(crate) fn new(dbs: &'t Dbs, txn: &'t RoTxn<'e>, max_depth: usize) -> Self {
        View { dbs, txn, max_depth }
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // ========================================================================
    // Pages
    // ========================================================================

    #[inline]
    pub fn page(&self, id: &Uuid) -> Result<Option<Page>> {
        self.dbs.pages.get(self.txn, id.as_bytes()).map_err(err)
    }

    /// Load a page, failing with `PageNotFound` if it does not exist
    #[inline]
    pub fn require_page(&self, id: &Uuid) -> Result<Page> {
        self.page(id)?.ok_or(CanopyError::PageNotFound(*id))
    }

    /// Ids of the direct children of a page
    pub fn child_ids(&self, id: &Uuid) -> Result<Vec<Uuid>> {
        self.dbs.children.list(self.txn, id)
    }

    /// Direct children of a page, ordered by sibling index then id
    pub fn children(&self, id: &Uuid) -> Result<Vec<Page>> {
        let mut r = Vec::new();
        for child in self.child_ids(id)? {
            if let Some(p) = self.page(&child)? {
                r.push(p);
            }
        }
        r.sort_by(|a, b| a.index.cmp(&b.index).then(a.id.cmp(&b.id)));
        Ok(r)
    }

    /// Every page of a space
    pub fn space_pages(&self, space_id: &Uuid) -> Result<Vec<Page>> {
        let mut r = Vec::new();
        for id in self.dbs.space_pages.list(self.txn, space_id)? {
            if let Some(p) = self.page(&id)? {
                r.push(p);
            }
        }
        Ok(r)
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    #[inline]
    pub fn permission(&self, id: &Uuid) -> Result<Option<PagePermission>> {
        self.dbs.permissions.get(self.txn, id.as_bytes()).map_err(err)
    }

    /// Load a permission, failing with `PermissionNotFound` if it does not exist
    #[inline]
    pub fn require_permission(&self, id: &Uuid) -> Result<PagePermission> {
        self.permission(id)?.ok_or(CanopyError::PermissionNotFound(*id))
    }

    /// All permission records of a page, grouped by assignee kind
    pub fn permissions_for_page(&self, page_id: &Uuid) -> Result<Vec<PagePermission>> {
        let mut ids = Vec::new();
        for item in self.dbs.by_assignee.prefix_iter(self.txn, page_id.as_bytes()).map_err(err)? {
            let (_, v) = item.map_err(err)?;
            if let Some(id) = read_id(v) {
                ids.push(id);
            }
        }
        let mut r = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.permission(&id)? {
                r.push(p);
            }
        }
        Ok(r)
    }

    /// The record of a page for one assignee, if any
    pub fn permission_for_assignee(
        &self,
        page_id: &Uuid,
        assignee: &Assignee,
    ) -> Result<Option<PagePermission>> {
        let k = page_assignee(page_id, assignee);
        match self.dbs.by_assignee.get(self.txn, &k).map_err(err)? {
            Some(v) => match read_id(v) {
                Some(id) => self.permission(&id),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Ids of records whose source is `source_id`
    pub fn inheritor_ids(&self, source_id: &Uuid) -> Result<Vec<Uuid>> {
        self.dbs.by_source.list(self.txn, source_id)
    }

    /// Records whose source is `source_id`
    pub fn inheritors(&self, source_id: &Uuid) -> Result<Vec<PagePermission>> {
        let mut r = Vec::new();
        for id in self.inheritor_ids(source_id)? {
            if let Some(p) = self.permission(&id)? {
                r.push(p);
            }
        }
        Ok(r)
    }
}
