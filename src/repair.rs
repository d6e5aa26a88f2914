//! Illegal-inheritance repair engine
//!
//! A record is in an illegal state when its source is not held by any of its
//! page's ancestors, which happens after a page moves to a different parent.
//! The planner walks the target and its subtree in breadth-first order over a
//! working copy of the arena, so each fix is visible to the pages planned after it.
//! For every illegal source it either re-attaches the pointer to an equal grant
//! on the nearest legal ancestor, or detaches the topmost contaminated record and
//! makes it the new source for everything below it.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compare::has_same_or_more_permissions;
use crate::error::Result;
use crate::model::PagePermission;
use crate::tree::{resolve_tree, ResolveOptions, ResolvedTree, TreeNode};
use crate::tx::{PermissionPatch, Tx};

/// One set-based update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOp {
    /// Clear the source pointer of these records, making them authoritative
    Detach { permission_ids: Vec<Uuid> },
    /// Records on these pages pointing at `old_source` now point at `new_source`
    Repoint { old_source: Uuid, new_source: Uuid, page_ids: Vec<Uuid> },
}

/// Ordered updates that heal a subtree. Detach always comes first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairPlan {
    pub ops: Vec<RepairOp>,
}

impl RepairPlan {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn detached(&self) -> Vec<Uuid> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RepairOp::Detach { permission_ids } => Some(permission_ids.clone()),
                RepairOp::Repoint { .. } => None,
            })
            .flatten()
            .collect()
    }

    /// (old source, new source) pairs in application order
    pub fn repoints(&self) -> Vec<(Uuid, Uuid)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RepairOp::Repoint { old_source, new_source, .. } => Some((*old_source, *new_source)),
                RepairOp::Detach { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub page_id: Uuid,
    pub plan: RepairPlan,
    /// Records written while applying the plan
    pub updated: usize,
}

/// A record whose source lies outside its page's ancestor chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalReference {
    pub page_id: Uuid,
    pub permission_id: Uuid,
    pub source_permission_id: Uuid,
}

// ============================================================================
// Detection
// ============================================================================

#[inline]
fn is_legal(tree: &ResolvedTree, chain: &[usize], source: &Uuid) -> bool {
    tree.owner_of(source).is_some_and(|o| chain.contains(&o))
}

/// Every illegal reference held by the target or its loaded descendants
pub fn find_illegal_references(tree: &ResolvedTree) -> Vec<IllegalReference> {
    let mut r = Vec::new();
    for n in tree.processing_order() {
        let chain = tree.chain_of(n);
        let node = tree.node(n);
        for p in &node.permissions {
            if let Some(s) = p.source_permission_id {
                if !is_legal(tree, &chain, &s) {
                    r.push(IllegalReference {
                        page_id: node.id(),
                        permission_id: p.id,
                        source_permission_id: s,
                    });
                }
            }
        }
    }
    r
}

// ============================================================================
// Planning
// ============================================================================

enum Step {
    /// Detach `record` and move everything pointing at `source` onto it
    Detach { record: Uuid, source: Uuid },
    /// Move everything pointing at `source` onto `target`
    Reattach { source: Uuid, target: Uuid },
}

/// The record on `node` pointing at `source`, if any
#[inline]
fn inheritor_on(node: &TreeNode, source: &Uuid) -> Option<Uuid> {
    node.permissions
        .iter()
        .find(|q| q.source_permission_id.as_ref() == Some(source))
        .map(|q| q.id)
}

/// A record on `node` with the same assignee and an identical grant
fn equal_grant<'a>(node: &'a TreeNode, p: &PagePermission) -> Option<&'a PagePermission> {
    node.permissions
        .iter()
        .find(|q| q.assignee == p.assignee && q.grant() == p.grant())
}

fn plan_source(work: &ResolvedTree, n: usize, chain: &[usize], p: &PagePermission, source: Uuid) -> Step {
    for (i, &a) in chain.iter().enumerate() {
        let ancestor = work.node(a);
        if !ancestor.inherits_from(&source) {
            // first clean ancestor: compare it with the node right below it
            let below = if i == 0 { n } else { chain[i - 1] };
            let below_node = work.node(below);
            if has_same_or_more_permissions(&ancestor.permissions, &below_node.permissions) {
                if let Some(r) = equal_grant(ancestor, p) {
                    let a_chain = work.chain_of(a);
                    let target = r
                        .source_permission_id
                        .filter(|s| is_legal(work, &a_chain, s))
                        .unwrap_or(r.id);
                    return Step::Reattach { source, target };
                }
            }
            let record = if i == 0 { p.id } else { inheritor_on(below_node, &source).unwrap_or(p.id) };
            return Step::Detach { record, source };
        }
        if i == chain.len() - 1 {
            // every ancestor up to the root inherits the bad source
            let record = inheritor_on(ancestor, &source).unwrap_or(p.id);
            return Step::Detach { record, source };
        }
    }
    // roots have nothing to re-attach to
    Step::Detach { record: p.id, source }
}

/// Repoint `old` to `new` on every page below the owner of `new`. Returns touched pages.
fn repoint(work: &mut ResolvedTree, old: &Uuid, new: &Uuid) -> Vec<Uuid> {
    let Some(owner) = work.owner_of(new) else {
        return Vec::new();
    };
    let mut pages = Vec::new();
    for x in 0..work.len() {
        if !work.is_strict_ancestor(owner, x) {
            continue;
        }
        let node = work.node_mut(x);
        let mut touched = false;
        for q in node.permissions.iter_mut() {
            if q.source_permission_id.as_ref() == Some(old) && &q.id != new {
                q.source_permission_id = Some(*new);
                touched = true;
            }
        }
        if touched {
            pages.push(node.page.id);
        }
    }
    pages
}

fn detach(work: &mut ResolvedTree, record: &Uuid) {
    if let Some(owner) = work.owner_of(record) {
        for q in work.node_mut(owner).permissions.iter_mut() {
            if &q.id == record {
                q.source_permission_id = None;
            }
        }
    }
}

/// Plan the updates that remove every illegal reference from the target and its subtree
pub fn detect_illegal_inheritance(tree: &ResolvedTree) -> RepairPlan {
    let mut work = tree.clone();
    let mut detached: Vec<Uuid> = Vec::new();
    let mut repoints: Vec<RepairOp> = Vec::new();

    for n in tree.processing_order() {
        let chain = work.chain_of(n);
        let mut seen = HashSet::new();
        let illegal: Vec<(Uuid, Uuid)> = work
            .node(n)
            .permissions
            .iter()
            .filter_map(|p| p.source_permission_id.map(|s| (p.id, s)))
            .filter(|(_, s)| !is_legal(&work, &chain, s) && seen.insert(*s))
            .collect();

        for (pid, source) in illegal {
            let Some(p) = work.node(n).permissions.iter().find(|q| q.id == pid).cloned() else {
                continue;
            };
            // an earlier step may already have fixed it
            if p.source_permission_id != Some(source) {
                continue;
            }
            let (old, new) = match plan_source(&work, n, &chain, &p, source) {
                Step::Detach { record, source } => {
                    detach(&mut work, &record);
                    detached.push(record);
                    (source, record)
                }
                Step::Reattach { source, target } => (source, target),
            };
            let page_ids = repoint(&mut work, &old, &new);
            debug!(page_id = %work.node(n).id(), old_source = %old, new_source = %new, pages = page_ids.len(), "planned repair");
            if !page_ids.is_empty() {
                repoints.push(RepairOp::Repoint { old_source: old, new_source: new, page_ids });
            }
        }
    }

    let mut ops = Vec::with_capacity(1 + repoints.len());
    if !detached.is_empty() {
        ops.push(RepairOp::Detach { permission_ids: detached });
    }
    ops.extend(repoints);
    RepairPlan { ops }
}

// ============================================================================
// Applying
// ============================================================================

/// Apply a plan in order, one set-based update per op. Returns records written.
pub fn apply_plan(tx: &mut Tx, plan: &RepairPlan) -> Result<usize> {
    let mut updated = 0;
    for op in &plan.ops {
        match op {
            RepairOp::Detach { permission_ids } => {
                let patch = PermissionPatch::default().with_source(None);
                updated += tx.update_permissions(permission_ids, &patch)?;
            }
            RepairOp::Repoint { old_source, new_source, page_ids } => {
                let scope: HashSet<Uuid> = page_ids.iter().copied().collect();
                let patch = PermissionPatch::default().with_source(Some(*new_source));
                let n = tx.update_where_source(old_source, Some(&scope), &patch)?.len();
                if n == 0 {
                    warn!(old_source = %old_source, new_source = %new_source, "repoint matched no records");
                }
                updated += n;
            }
        }
    }
    Ok(updated)
}

/// Resolve the page's tree, plan, and apply the repair in one transaction
pub fn repair_illegal_permissions(tx: &mut Tx, page_id: &Uuid) -> Result<RepairReport> {
    let tree = resolve_tree(&tx.view(), page_id, ResolveOptions::whole_subtree())?;
    let plan = detect_illegal_inheritance(&tree);
    let updated = apply_plan(tx, &plan)?;
    if !plan.is_empty() {
        info!(
            page_id = %page_id,
            detached = plan.detached().len(),
            repointed = plan.repoints().len(),
            updated,
            "repaired illegal inheritance"
        );
    }
    Ok(RepairReport { page_id: *page_id, plan, updated })
}
