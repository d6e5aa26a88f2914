//! Effective-permission compute engine
//!
//! Inheritance is materialized at write time, so only a page's own records are read.
//! Member grants are tiered: a user record beats role records, which beat the space
//! record. Records in the winning tier are OR-ed, and the public grant is always
//! OR-ed on top.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::assignee::Assignee;
use crate::directory::Directory;
use crate::error::Result;
use crate::levels::{Operation, OperationSet, VIEW};
use crate::model::{Page, PagePermission, SpaceOverrides, SpaceRole};
use crate::read::View;

/// Operations a locked page refuses to everyone
pub const LOCKED_OPERATIONS: OperationSet = OperationSet::of(&[
    Operation::EditContent,
    Operation::EditPath,
    Operation::CreatePoll,
    Operation::Delete,
    Operation::DeleteAttachedBounty,
]);

/// Who is asking, resolved once against the directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: Option<Uuid>,
    pub space_id: Uuid,
    /// `None` for anonymous callers and non-members
    pub membership: Option<SpaceRole>,
    pub roles: Vec<Uuid>,
    pub overrides: SpaceOverrides,
}

impl UserContext {
    pub fn anonymous(space_id: Uuid) -> Self {
        UserContext { space_id, ..Default::default() }
    }

    pub fn load(dir: &dyn Directory, space_id: &Uuid, user_id: Option<&Uuid>) -> Result<Self> {
        let Some(user) = user_id else {
            return Ok(Self::anonymous(*space_id));
        };
        let Some(membership) = dir.space_role(space_id, user)? else {
            return Ok(UserContext { user_id: Some(*user), ..Self::anonymous(*space_id) });
        };
        Ok(UserContext {
            user_id: Some(*user),
            space_id: *space_id,
            membership: Some(membership),
            roles: dir.roles_for_user(space_id, user)?,
            overrides: dir.space_overrides(space_id, user)?,
        })
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.membership.is_some_and(|m| m.is_admin)
    }

    #[inline]
    pub fn is_guest(&self) -> bool {
        self.membership.is_some_and(|m| m.is_guest)
    }

    #[inline]
    pub fn is_member(&self) -> bool {
        self.membership.is_some()
    }
}

/// Final per-operation answer for one page and one caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionFlags(OperationSet);

impl PermissionFlags {
    #[inline]
    pub fn allows(&self, op: Operation) -> bool {
        self.0.contains(op)
    }

    #[inline]
    pub fn operations(&self) -> OperationSet {
        self.0
    }

    /// Every operation with its flag
    pub fn to_map(&self) -> BTreeMap<Operation, bool> {
        Operation::ALL.iter().map(|op| (*op, self.0.contains(*op))).collect()
    }
}

impl Serialize for PermissionFlags {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_map().serialize(s)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Union of the public records' grants
pub fn public_operations(records: &[PagePermission]) -> OperationSet {
    records
        .iter()
        .filter(|p| p.assignee.is_public())
        .fold(OperationSet::EMPTY, |acc, p| acc | p.grant())
}

/// Operations granted through membership: user tier, else role tier, else space tier.
/// Guests only see the user tier; non-members see nothing.
pub fn member_operations(records: &[PagePermission], ctx: &UserContext) -> OperationSet {
    let (Some(membership), Some(user)) = (ctx.membership, ctx.user_id) else {
        return OperationSet::EMPTY;
    };
    let tier = |pred: &dyn Fn(&Assignee) -> bool| -> Option<OperationSet> {
        let mut hit = false;
        let mut ops = OperationSet::EMPTY;
        for p in records.iter().filter(|p| pred(&p.assignee)) {
            hit = true;
            ops |= p.grant();
        }
        hit.then_some(ops)
    };

    let user_tier = tier(&|a: &Assignee| *a == Assignee::User(user));
    if membership.is_guest {
        return user_tier.unwrap_or(OperationSet::EMPTY);
    }
    user_tier
        .or_else(|| tier(&|a: &Assignee| matches!(a, Assignee::Role(r) if ctx.roles.contains(r))))
        .or_else(|| tier(&|a: &Assignee| *a == Assignee::Space(ctx.space_id)))
        .unwrap_or(OperationSet::EMPTY)
}

/// Combine records, overrides and page state into the final flags
pub fn evaluate(page: &Page, records: &[PagePermission], ctx: &UserContext) -> PermissionFlags {
    let mut ops = if ctx.is_admin() {
        OperationSet::ALL
    } else {
        public_operations(records) | member_operations(records, ctx)
    };
    if ctx.overrides.can_delete_any(page) {
        ops.insert(Operation::Delete);
    }
    if page.converted_proposal_id.is_some() && !ctx.is_admin() {
        ops = ops & VIEW;
    }
    if page.is_locked {
        ops = ops & !LOCKED_OPERATIONS;
    }
    PermissionFlags(ops)
}

/// Effective flags of `user_id` on one page; `None` evaluates as an anonymous visitor
pub fn compute_page_permissions(
    view: &View,
    dir: &dyn Directory,
    page_id: &Uuid,
    user_id: Option<&Uuid>,
) -> Result<PermissionFlags> {
    let page = view.require_page(page_id)?;
    let records = view.permissions_for_page(page_id)?;
    let ctx = UserContext::load(dir, &page.space_id, user_id)?;
    Ok(evaluate(&page, &records, &ctx))
}

/// Flags of `user_id` on many pages in one snapshot. Pages may span spaces; the
/// caller is resolved once per space. Unknown pages are left out of the result.
pub fn compute_page_permissions_bulk(
    view: &View,
    dir: &dyn Directory,
    page_ids: &[Uuid],
    user_id: Option<&Uuid>,
) -> Result<HashMap<Uuid, PermissionFlags>> {
    let mut contexts: HashMap<Uuid, UserContext> = HashMap::new();
    let mut r = HashMap::with_capacity(page_ids.len());
    for id in page_ids {
        let Some(page) = view.page(id)? else {
            debug!(page_id = %id, "skipping unknown page");
            continue;
        };
        let ctx = match contexts.entry(page.space_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(UserContext::load(dir, &page.space_id, user_id)?),
        };
        let records = view.permissions_for_page(id)?;
        r.insert(*id, evaluate(&page, &records, ctx));
    }
    Ok(r)
}
