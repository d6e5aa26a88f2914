//! Database types and the store handle

use std::path::Path;

use heed::types::{Bytes, SerdeJson, Unit};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::debug;
use uuid::Uuid;

use crate::error::{err, Result};
use crate::keys::{pair, pair_tail};
use crate::model::{Page, PagePermission};
use crate::read::View;
use crate::tx::Tx;

pub const DEFAULT_MAP_SIZE: usize = 1 << 30;
pub const DEFAULT_MAX_DEPTH: usize = 256;
const MAX_DBS: u32 = 6;

// Database type aliases
pub type DbPages = Database<Bytes, SerdeJson<Page>>;
pub type DbPermissions = Database<Bytes, SerdeJson<PagePermission>>;
pub type DbIds = Database<Bytes, Bytes>;
pub type DbSet = Database<Bytes, Unit>;

/// Set index over (a, b) id pairs, scanned by `a`
#[derive(Clone, Copy)]
pub struct Link {
    pub db: DbSet,
}

impl Link {
    #[inline]
    pub fn put(&self, tx: &mut RwTxn, a: &Uuid, b: &Uuid) -> Result<()> {
        self.db.put(tx, &pair(a, b), &()).map_err(err)
    }

    #[inline]
    pub fn del(&self, tx: &mut RwTxn, a: &Uuid, b: &Uuid) -> Result<bool> {
        self.db.delete(tx, &pair(a, b)).map_err(err)
    }

    pub fn list(&self, tx: &RoTxn, a: &Uuid) -> Result<Vec<Uuid>> {
        let mut r = Vec::new();
        for item in self.db.prefix_iter(tx, a.as_bytes()).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            if let Some(b) = pair_tail(k) {
                r.push(b);
            }
        }
        Ok(r)
    }
}

/// All database handles
pub struct Dbs {
    pub pages: DbPages,
    /// parent ++ child
    pub children: Link,
    /// space ++ page
    pub space_pages: Link,
    pub permissions: DbPermissions,
    /// page ++ assignee key -> permission id; the per-page uniqueness constraint
    pub by_assignee: DbIds,
    /// source ++ inheritor
    pub by_source: Link,
}

/// An open permission store
pub struct Store {
    env: Env,
    dbs: Dbs,
    max_depth: usize,
}

impl Store {
    /// Open (or create) a store at `path`
    pub fn open(path: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            pages: env.create_database(&mut tx, Some("pages")).map_err(err)?,
            children: Link { db: env.create_database(&mut tx, Some("page_children")).map_err(err)? },
            space_pages: Link { db: env.create_database(&mut tx, Some("space_pages")).map_err(err)? },
            permissions: env.create_database(&mut tx, Some("permissions")).map_err(err)?,
            by_assignee: env.create_database(&mut tx, Some("by_assignee")).map_err(err)?,
            by_source: Link { db: env.create_database(&mut tx, Some("by_source")).map_err(err)? },
        };
        tx.commit().map_err(err)?;
        debug!(path = %path.display(), map_size, "opened permission store");
        Ok(Store { env, dbs, max_depth: DEFAULT_MAX_DEPTH })
    }

    /// Cap on parent walks before a tree is reported as corrupt
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Execute a read-only operation
    #[inline]
    pub fn read<T, F: FnOnce(&View) -> Result<T>>(&self, f: F) -> Result<T> {
        let txn = self.env.read_txn().map_err(err)?;
        f(&View::new(&self.dbs, &txn, self.max_depth))
    }

    /// Run multiple operations in a single transaction, committed only on `Ok`
    #[inline]
    pub fn transact<T, F: FnOnce(&mut Tx) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = Tx::new(self.env.write_txn().map_err(err)?, &self.dbs, self.max_depth);
        let r = f(&mut tx)?;
        tx.commit()?;
        Ok(r)
    }
}
