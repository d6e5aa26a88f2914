//! Transaction wrapper for batched writes

use std::collections::HashSet;

use heed::RwTxn;
use tracing::debug;
use uuid::Uuid;

use crate::db::Dbs;
use crate::error::{err, Result};
use crate::keys::{page_assignee, read_id};
use crate::levels::{OperationSet, PermissionLevel};
use crate::model::{Page, PagePermission};
use crate::read::View;

/// A set of field changes applied to many permission records at once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionPatch {
    pub grant: Option<(PermissionLevel, OperationSet)>,
    pub allow_discovery: Option<bool>,
    /// `Some(None)` clears the pointer
    pub source: Option<Option<Uuid>>,
}

impl PermissionPatch {
    /// Copy level, operations and discovery from `from`
    pub fn values_of(from: &PagePermission) -> Self {
        PermissionPatch {
            grant: Some((from.level, from.operations)),
            allow_discovery: Some(from.allow_discovery),
            source: None,
        }
    }

    pub fn with_source(mut self, source: Option<Uuid>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn apply(&self, p: &mut PagePermission) {
        if let Some((level, ops)) = self.grant {
            p.level = level;
            p.operations = ops;
        }
        if let Some(allow) = self.allow_discovery {
            p.allow_discovery = allow && p.assignee.is_public();
        }
        if let Some(source) = self.source {
            p.source_permission_id = source.filter(|s| *s != p.id);
        }
    }
}

/// Transaction wrapper for batched writes
pub struct Tx<'s> {
    txn: RwTxn<'s>,
    dbs: &'s Dbs,
    max_depth: usize,
}

impl<'s> Tx<'s> {
    #[inline]
    pub(crate) fn new(txn: RwTxn<'s>, dbs: &'s Dbs, max_depth: usize) -> Self {
        Tx { txn, dbs, max_depth }
    }

    #[inline]
    pub(crate) fn commit(self) -> Result<()> {
        self.txn.commit().map_err(err)
    }

    /// Read access that sees this transaction's writes
    #[inline]
    pub fn view(&self) -> View<'_, 's> {
        View::new(self.dbs, &self.txn, self.max_depth)
    }

    // ========================================================================
    // Pages
    // ========================================================================

    /// Insert or replace a page row, keeping the parent and space indexes in sync
    pub fn put_page(&mut self, page: &Page) -> Result<()> {
        let old = self.view().page(&page.id)?;
        if let Some(old) = old {
            if old.parent_id != page.parent_id {
                if let Some(p) = old.parent_id {
                    self.dbs.children.del(&mut self.txn, &p, &page.id)?;
                }
            }
            if old.space_id != page.space_id {
                self.dbs.space_pages.del(&mut self.txn, &old.space_id, &page.id)?;
            }
        }
        if let Some(p) = page.parent_id {
            self.dbs.children.put(&mut self.txn, &p, &page.id)?;
        }
        self.dbs.space_pages.put(&mut self.txn, &page.space_id, &page.id)?;
        self.dbs.pages.put(&mut self.txn, page.id.as_bytes(), page).map_err(err)
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// Upsert by (page, assignee): an existing record for the same key keeps its id
    pub fn put_permission(&mut self, record: &PagePermission) -> Result<PagePermission> {
        let k = page_assignee(&record.page_id, &record.assignee);
        let existing = self.dbs.by_assignee.get(&self.txn, &k).map_err(err)?.and_then(read_id);
        let mut record = record.clone();
        if let Some(id) = existing {
            record.id = id;
        }
        if record.source_permission_id == Some(record.id) {
            record.source_permission_id = None;
        }
        if !record.assignee.is_public() {
            record.allow_discovery = false;
        }
        let old = self.view().permission(&record.id)?;
        self.store(old.as_ref(), &record)?;
        Ok(record)
    }

    /// Set-based update of every record inheriting from `source`,
    /// optionally limited to a set of pages. Returns the updated ids.
    pub fn update_where_source(
        &mut self,
        source: &Uuid,
        pages: Option<&HashSet<Uuid>>,
        patch: &PermissionPatch,
    ) -> Result<Vec<Uuid>> {
        let targets = self.view().inheritors(source)?;
        let mut r = Vec::new();
        for old in targets {
            if pages.is_some_and(|s| !s.contains(&old.page_id)) {
                continue;
            }
            let mut new = old.clone();
            patch.apply(&mut new);
            if new != old {
                self.store(Some(&old), &new)?;
            }
            r.push(new.id);
        }
        debug!(source = %source, count = r.len(), "updated inheritors");
        Ok(r)
    }

    /// Apply one patch to a batch of records; missing ids are skipped
    pub fn update_permissions(&mut self, ids: &[Uuid], patch: &PermissionPatch) -> Result<usize> {
        let mut n = 0;
        for id in ids {
            let Some(old) = self.view().permission(id)? else {
                continue;
            };
            let mut new = old.clone();
            patch.apply(&mut new);
            if new != old {
                self.store(Some(&old), &new)?;
            }
            n += 1;
        }
        Ok(n)
    }

    /// Batched creation; colliding assignee keys overwrite the existing record
    pub fn create_many(&mut self, records: &[PagePermission]) -> Result<Vec<PagePermission>> {
        let mut r = Vec::with_capacity(records.len());
        for rec in records {
            r.push(self.put_permission(rec)?);
        }
        Ok(r)
    }

    /// Delete one record. Inheritors keep their pointer; callers cascade.
    pub fn delete_permission_record(&mut self, id: &Uuid) -> Result<Option<PagePermission>> {
        let Some(old) = self.view().permission(id)? else {
            return Ok(None);
        };
        let k = page_assignee(&old.page_id, &old.assignee);
        let owner = self.dbs.by_assignee.get(&self.txn, &k).map_err(err)?.and_then(read_id);
        if owner == Some(old.id) {
            self.dbs.by_assignee.delete(&mut self.txn, &k).map_err(err)?;
        }
        if let Some(s) = old.source_permission_id {
            self.dbs.by_source.del(&mut self.txn, &s, &old.id)?;
        }
        self.dbs.permissions.delete(&mut self.txn, old.id.as_bytes()).map_err(err)?;
        Ok(Some(old))
    }

    /// Set-based delete of every record inheriting from `source`,
    /// optionally limited to a set of pages. Returns the deleted ids.
    pub fn delete_where_source(
        &mut self,
        source: &Uuid,
        pages: Option<&HashSet<Uuid>>,
    ) -> Result<Vec<Uuid>> {
        let targets = self.view().inheritors(source)?;
        let mut r = Vec::new();
        for p in targets {
            if pages.is_some_and(|s| !s.contains(&p.page_id)) {
                continue;
            }
            if self.delete_permission_record(&p.id)?.is_some() {
                r.push(p.id);
            }
        }
        Ok(r)
    }

    fn store(&mut self, old: Option<&PagePermission>, new: &PagePermission) -> Result<()> {
        if let Some(old) = old {
            if old.page_id != new.page_id || old.assignee != new.assignee {
                let k = page_assignee(&old.page_id, &old.assignee);
                self.dbs.by_assignee.delete(&mut self.txn, &k).map_err(err)?;
            }
            if old.source_permission_id != new.source_permission_id {
                if let Some(s) = old.source_permission_id {
                    self.dbs.by_source.del(&mut self.txn, &s, &old.id)?;
                }
            }
        }
        if let Some(s) = new.source_permission_id {
            self.dbs.by_source.put(&mut self.txn, &s, &new.id)?;
        }
        let k = page_assignee(&new.page_id, &new.assignee);
        self.dbs.by_assignee.put(&mut self.txn, &k, new.id.as_bytes()).map_err(err)?;
        self.dbs.permissions.put(&mut self.txn, new.id.as_bytes(), new).map_err(err)
    }
}
