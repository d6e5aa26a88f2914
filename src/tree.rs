//! Tree resolver: a request-scoped arena of a page, its ancestors and its subtree

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;
use uuid::Uuid;

use crate::error::{CanopyError, Result};
use crate::model::{Page, PagePermission};
use crate::read::View;

/// One page in a resolved tree with its permission records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub page: Page,
    pub permissions: Vec<PagePermission>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl TreeNode {
    #[inline]
    pub fn id(&self) -> Uuid {
        self.page.id
    }

    /// Whether this node holds the permission record `id`
    #[inline]
    pub fn holds(&self, permission_id: &Uuid) -> bool {
        self.permissions.iter().any(|p| &p.id == permission_id)
    }

    /// Whether any record on this node inherits from `source`
    #[inline]
    pub fn inherits_from(&self, source: &Uuid) -> bool {
        self.permissions.iter().any(|p| p.source_permission_id.as_ref() == Some(source))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub flatten_descendants: bool,
    /// Load archived pages in the subtree too; the target is always loaded
    pub include_deleted: bool,
    /// Overrides the store's depth cap
    pub max_depth: Option<usize>,
}

impl ResolveOptions {
    pub fn with_descendants() -> Self {
        ResolveOptions { flatten_descendants: true, ..Default::default() }
    }

    /// Descendants including archived pages, for writes that must keep every pointer legal
    pub fn whole_subtree() -> Self {
        ResolveOptions { flatten_descendants: true, include_deleted: true, ..Default::default() }
    }
}

/// Arena of nodes linked by index. Ancestors are stored nearest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTree {
    nodes: Vec<TreeNode>,
    index: HashMap<Uuid, usize>,
    owners: HashMap<Uuid, usize>,
    target: usize,
    ancestors: Vec<usize>,
    descendants: Vec<usize>,
    flattened: bool,
}

type Row = (Page, Vec<PagePermission>);

impl ResolvedTree {
    /// `ancestors` nearest first, `descendants` in breadth-first order
    fn build(target: Row, ancestors: Vec<Row>, descendants: Vec<Row>, flattened: bool) -> Self {
        let mut nodes = Vec::with_capacity(1 + ancestors.len() + descendants.len());
        let mut index = HashMap::new();
        let mut push = |row: Row, nodes: &mut Vec<TreeNode>| {
            let i = nodes.len();
            index.insert(row.0.id, i);
            nodes.push(TreeNode { page: row.0, permissions: row.1, parent: None, children: Vec::new() });
            i
        };
        let target = push(target, &mut nodes);
        let ancestors: Vec<usize> = ancestors.into_iter().map(|r| push(r, &mut nodes)).collect();
        let descendants: Vec<usize> = descendants.into_iter().map(|r| push(r, &mut nodes)).collect();

        for i in 0..nodes.len() {
            let parent = nodes[i].page.parent_id.and_then(|p| index.get(&p).copied());
            nodes[i].parent = parent;
            if let Some(p) = parent {
                nodes[p].children.push(i);
            }
        }
        let mut owners = HashMap::new();
        for (i, n) in nodes.iter().enumerate() {
            for p in &n.permissions {
                owners.insert(p.id, i);
            }
        }
        ResolvedTree { nodes, index, owners, target, ancestors, descendants, flattened }
    }

    /// Build a tree from in-memory rows, no storage involved.
    /// Rows not connected to `target_id` by parent links are ignored.
    pub fn from_pages(target_id: Uuid, rows: Vec<Row>) -> Result<Self> {
        let mut by_id: HashMap<Uuid, Row> = rows.into_iter().map(|r| (r.0.id, r)).collect();
        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (id, (page, _)) in &by_id {
            if let Some(p) = page.parent_id {
                children.entry(p).or_default().push(*id);
            }
        }
        for list in children.values_mut() {
            list.sort_by_key(|id| by_id.get(id).map(|r| (r.0.index, *id)));
        }

        let target = by_id.remove(&target_id).ok_or(CanopyError::PageNotFound(target_id))?;
        let mut seen = HashSet::from([target_id]);
        let mut ancestors = Vec::new();
        let mut cur = target.0.parent_id;
        while let Some(pid) = cur {
            if !seen.insert(pid) {
                return Err(CanopyError::CorruptTree(format!("cycle through page {}", pid)));
            }
            match by_id.remove(&pid) {
                Some(row) => {
                    cur = row.0.parent_id;
                    ancestors.push(row);
                }
                None => break,
            }
        }

        let mut descendants = Vec::new();
        let mut queue = VecDeque::from([target_id]);
        while let Some(id) = queue.pop_front() {
            for child in children.get(&id).into_iter().flatten() {
                if let Some(row) = by_id.remove(child) {
                    queue.push_back(*child);
                    descendants.push(row);
                }
            }
        }
        Ok(Self::build(target, ancestors, descendants, true))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn target(&self) -> &TreeNode {
        &self.nodes[self.target]
    }

    #[inline]
    pub fn target_index(&self) -> usize {
        self.target
    }

    #[inline]
    pub fn node(&self, i: usize) -> &TreeNode {
        &self.nodes[i]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, i: usize) -> &mut TreeNode {
        &mut self.nodes[i]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn index_of(&self, page_id: &Uuid) -> Option<usize> {
        self.index.get(page_id).copied()
    }

    #[inline]
    pub fn get(&self, page_id: &Uuid) -> Option<&TreeNode> {
        self.index_of(page_id).map(|i| &self.nodes[i])
    }

    /// Ancestors of the target, immediate parent first
    pub fn ancestors(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.ancestors.iter().map(|&i| &self.nodes[i])
    }

    #[inline]
    pub fn ancestor_indices(&self) -> &[usize] {
        &self.ancestors
    }

    /// Ancestors of the target, root first
    pub fn parents(&self) -> Vec<&TreeNode> {
        self.ancestors.iter().rev().map(|&i| &self.nodes[i]).collect()
    }

    #[inline]
    pub fn immediate_parent(&self) -> Option<&TreeNode> {
        self.ancestors.first().map(|&i| &self.nodes[i])
    }

    /// Descendants of the target in breadth-first order, empty unless flattened
    pub fn descendants(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.descendants.iter().map(|&i| &self.nodes[i])
    }

    #[inline]
    pub fn descendant_indices(&self) -> &[usize] {
        &self.descendants
    }

    #[inline]
    pub fn is_flattened(&self) -> bool {
        self.flattened
    }

    pub fn descendant_page_ids(&self) -> HashSet<Uuid> {
        self.descendants().map(TreeNode::id).collect()
    }

    /// Every page in the arena
    pub fn page_ids(&self) -> HashSet<Uuid> {
        self.index.keys().copied().collect()
    }

    /// Node holding the permission record `id`, if it is in the arena
    #[inline]
    pub fn owner_of(&self, permission_id: &Uuid) -> Option<usize> {
        self.owners.get(permission_id).copied()
    }

    /// Ancestor chain of any node by arena links, nearest first
    pub fn chain_of(&self, i: usize) -> Vec<usize> {
        let mut r = Vec::new();
        let mut cur = self.nodes[i].parent;
        while let Some(p) = cur {
            if r.contains(&p) || p == i {
                break;
            }
            r.push(p);
            cur = self.nodes[p].parent;
        }
        r
    }

    /// Whether `ancestor` is strictly above `node` in the arena
    pub fn is_strict_ancestor(&self, ancestor: usize, node: usize) -> bool {
        self.chain_of(node).contains(&ancestor)
    }

    /// The target followed by its descendants in breadth-first order
    pub(crate) fn processing_order(&self) -> Vec<usize> {
        let mut r = Vec::with_capacity(1 + self.descendants.len());
        r.push(self.target);
        r.extend_from_slice(&self.descendants);
        r
    }
}

// ============================================================================
// Resolver
// ============================================================================

fn load_row(view: &View, page: Page) -> Result<Row> {
    let perms = view.permissions_for_page(&page.id)?;
    Ok((page, perms))
}

/// Load a page with its ancestor chain and, optionally, its full subtree
pub fn resolve_tree(view: &View, page_id: &Uuid, opts: ResolveOptions) -> Result<ResolvedTree> {
    let max_depth = opts.max_depth.unwrap_or_else(|| view.max_depth());
    let target = view.require_page(page_id)?;
    let mut seen = HashSet::from([target.id]);

    let mut ancestors = Vec::new();
    let mut cur = target.parent_id;
    while let Some(pid) = cur {
        if ancestors.len() >= max_depth {
            return Err(CanopyError::CorruptTree(format!(
                "ancestor chain of page {} exceeds {} levels",
                page_id, max_depth
            )));
        }
        if !seen.insert(pid) {
            return Err(CanopyError::CorruptTree(format!("cycle through page {}", pid)));
        }
        match view.page(&pid)? {
            Some(p) => {
                cur = p.parent_id;
                ancestors.push(load_row(view, p)?);
            }
            None => {
                debug!(page_id = %page_id, missing = %pid, "ancestor chain ends at a missing page");
                break;
            }
        }
    }

    let mut descendants = Vec::new();
    if opts.flatten_descendants {
        let mut queue = VecDeque::from([(target.id, 0usize)]);
        while let Some((id, depth)) = queue.pop_front() {
            for child in view.children(&id)? {
                if child.deleted && !opts.include_deleted {
                    continue;
                }
                if depth + 1 > max_depth {
                    return Err(CanopyError::CorruptTree(format!(
                        "subtree of page {} exceeds {} levels",
                        page_id, max_depth
                    )));
                }
                if !seen.insert(child.id) {
                    return Err(CanopyError::CorruptTree(format!("cycle through page {}", child.id)));
                }
                queue.push_back((child.id, depth + 1));
                descendants.push(load_row(view, child)?);
            }
        }
    }

    let target = load_row(view, target)?;
    Ok(ResolvedTree::build(target, ancestors, descendants, opts.flatten_descendants))
}

/// Resolve several pages of one space in one snapshot.
/// Pages that fail to resolve map to `None`.
pub fn resolve_trees(
    view: &View,
    page_ids: &[Uuid],
    opts: ResolveOptions,
) -> Result<HashMap<Uuid, Option<ResolvedTree>>> {
    let mut spaces = HashSet::new();
    for id in page_ids {
        if let Some(p) = view.page(id)? {
            spaces.insert(p.space_id);
        }
    }
    if spaces.len() > 1 {
        return Err(CanopyError::invalid("pages to resolve must all belong to the same space"));
    }
    let mut r = HashMap::with_capacity(page_ids.len());
    for id in page_ids {
        let tree = match resolve_tree(view, id, opts) {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(page_id = %id, error = %e, "page tree not resolved");
                None
            }
        };
        r.insert(*id, tree);
    }
    Ok(r)
}
