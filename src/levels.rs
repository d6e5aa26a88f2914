//! Permission level catalog: operations, operation sets and named levels

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CanopyError, Result};

// ============================================================================
// Operations
// ============================================================================

/// A single operation a permission can grant on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Comment,
    EditContent,
    EditPosition,
    EditLock,
    EditPath,
    CreatePoll,
    DeleteAttachedBounty,
    Delete,
    GrantPermissions,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Read,
        Operation::Comment,
        Operation::EditContent,
        Operation::EditPosition,
        Operation::EditLock,
        Operation::EditPath,
        Operation::CreatePoll,
        Operation::DeleteAttachedBounty,
        Operation::Delete,
        Operation::GrantPermissions,
    ];

    #[inline]
    pub const fn bit(self) -> u64 {
        1u64 << self as u64
    }

    pub const fn name(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Comment => "comment",
            Operation::EditContent => "edit_content",
            Operation::EditPosition => "edit_position",
            Operation::EditLock => "edit_lock",
            Operation::EditPath => "edit_path",
            Operation::CreatePoll => "create_poll",
            Operation::DeleteAttachedBounty => "delete_attached_bounty",
            Operation::Delete => "delete",
            Operation::GrantPermissions => "grant_permissions",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| CanopyError::invalid(format!("unknown operation '{}'", s)))
    }
}

// ============================================================================
// Operation sets
// ============================================================================

/// A set of operations packed into a bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationSet(u64);

impl OperationSet {
    pub const EMPTY: OperationSet = OperationSet(0);
    pub const ALL: OperationSet = OperationSet((1u64 << Operation::ALL.len()) - 1);

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        OperationSet(bits & Self::ALL.0)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn of(ops: &[Operation]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < ops.len() {
            bits |= ops[i].bit();
            i += 1;
        }
        OperationSet(bits)
    }

    #[inline]
    pub const fn contains(self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every operation in `other` is also in `self`
    #[inline]
    pub const fn is_superset(self, other: OperationSet) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, op: Operation) {
        self.0 |= op.bit();
    }

    #[inline]
    pub fn remove(&mut self, op: Operation) {
        self.0 &= !op.bit();
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL.into_iter().filter(move |op| self.contains(*op))
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }
}

impl BitOr for OperationSet {
    type Output = OperationSet;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        OperationSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for OperationSet {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for OperationSet {
    type Output = OperationSet;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        OperationSet(self.0 & rhs.0)
    }
}

impl Not for OperationSet {
    type Output = OperationSet;
    #[inline]
    fn not(self) -> Self {
        OperationSet(!self.0 & Self::ALL.0)
    }
}

impl FromIterator<Operation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        let mut s = OperationSet::EMPTY;
        for op in iter {
            s.insert(op);
        }
        s
    }
}

/// Convert an operation set to a list of operation names
pub fn ops_to_names(ops: OperationSet) -> Vec<&'static str> {
    ops.iter().map(Operation::name).collect()
}

/// Convert operation names to an operation set
pub fn names_to_ops(names: &[&str]) -> Result<OperationSet> {
    names.iter().map(|n| n.parse::<Operation>()).collect()
}

// ============================================================================
// Levels
// ============================================================================

use Operation::*;

pub const VIEW: OperationSet = OperationSet::of(&[Read]);
pub const VIEW_COMMENT: OperationSet = OperationSet::of(&[Read, Comment]);
pub const EDITOR: OperationSet = OperationSet::of(&[
    Read,
    Comment,
    EditContent,
    EditPosition,
    CreatePoll,
    Delete,
    DeleteAttachedBounty,
]);
pub const FULL_ACCESS: OperationSet = OperationSet::ALL;

/// A named bundle of operations, or `Custom` for an explicit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    View,
    ViewComment,
    Editor,
    FullAccess,
    Custom,
}

impl PermissionLevel {
    pub const fn name(self) -> &'static str {
        match self {
            PermissionLevel::View => "view",
            PermissionLevel::ViewComment => "view_comment",
            PermissionLevel::Editor => "editor",
            PermissionLevel::FullAccess => "full_access",
            PermissionLevel::Custom => "custom",
        }
    }

    /// Template operations for a named level, `None` for `Custom`
    pub const fn template(self) -> Option<OperationSet> {
        match self {
            PermissionLevel::View => Some(VIEW),
            PermissionLevel::ViewComment => Some(VIEW_COMMENT),
            PermissionLevel::Editor => Some(EDITOR),
            PermissionLevel::FullAccess => Some(FULL_ACCESS),
            PermissionLevel::Custom => None,
        }
    }

    /// Expand a level into its operation set; `custom` uses the stored set
    #[inline]
    pub fn expand(self, custom: OperationSet) -> OperationSet {
        self.template().unwrap_or(custom)
    }

    /// Normalize a (level, operations) pair into what gets stored.
    /// Named levels drop any explicit set; custom requires a non-empty one.
    pub fn normalize(self, ops: OperationSet) -> Result<OperationSet> {
        match self {
            PermissionLevel::Custom if ops.is_empty() => Err(CanopyError::invalid(
                "custom permission level requires at least one operation",
            )),
            PermissionLevel::Custom => Ok(ops),
            _ => Ok(OperationSet::EMPTY),
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PermissionLevel {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "view" => Ok(PermissionLevel::View),
            "view_comment" => Ok(PermissionLevel::ViewComment),
            "editor" => Ok(PermissionLevel::Editor),
            "full_access" => Ok(PermissionLevel::FullAccess),
            "custom" => Ok(PermissionLevel::Custom),
            _ => Err(CanopyError::invalid(format!("unknown permission level '{}'", s))),
        }
    }
}
