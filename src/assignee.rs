//! Assignee: the target of a permission grant

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CanopyError, Result};

/// Discriminant of an assignee, also the first byte of its storage key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeGroup {
    User,
    Role,
    Space,
    Public,
}

impl AssigneeGroup {
    #[inline]
    pub const fn tag(self) -> u8 {
        match self {
            AssigneeGroup::User => 1,
            AssigneeGroup::Role => 2,
            AssigneeGroup::Space => 3,
            AssigneeGroup::Public => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AssigneeGroup::User => "user",
            AssigneeGroup::Role => "role",
            AssigneeGroup::Space => "space",
            AssigneeGroup::Public => "public",
        }
    }
}

impl FromStr for AssigneeGroup {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(AssigneeGroup::User),
            "role" => Ok(AssigneeGroup::Role),
            "space" => Ok(AssigneeGroup::Space),
            "public" => Ok(AssigneeGroup::Public),
            _ => Err(CanopyError::invalid(format!("unknown assignee group '{}'", s))),
        }
    }
}

/// Who a permission is granted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "group", content = "id", rename_all = "snake_case")]
pub enum Assignee {
    User(Uuid),
    Role(Uuid),
    Space(Uuid),
    Public,
}

impl Assignee {
    /// Build an assignee from a group name and an optional textual id.
    /// Public takes no id; every other group requires a UUID.
    pub fn from_parts(group: &str, id: Option<&str>) -> Result<Self> {
        let group: AssigneeGroup = group.parse()?;
        if group == AssigneeGroup::Public {
            return Ok(Assignee::Public);
        }
        let raw = id.ok_or_else(|| {
            CanopyError::invalid(format!("assignee group '{}' requires an id", group.name()))
        })?;
        let id = Uuid::parse_str(raw)
            .map_err(|_| CanopyError::invalid(format!("'{}' is not a valid UUID", raw)))?;
        Ok(match group {
            AssigneeGroup::User => Assignee::User(id),
            AssigneeGroup::Role => Assignee::Role(id),
            AssigneeGroup::Space => Assignee::Space(id),
            AssigneeGroup::Public => Assignee::Public,
        })
    }

    #[inline]
    pub fn group(&self) -> AssigneeGroup {
        match self {
            Assignee::User(_) => AssigneeGroup::User,
            Assignee::Role(_) => AssigneeGroup::Role,
            Assignee::Space(_) => AssigneeGroup::Space,
            Assignee::Public => AssigneeGroup::Public,
        }
    }

    #[inline]
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Assignee::User(id) | Assignee::Role(id) | Assignee::Space(id) => Some(*id),
            Assignee::Public => None,
        }
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        matches!(self, Assignee::Public)
    }

    /// 17-byte storage key: group tag followed by the id (zeroes for public)
    #[inline]
    pub fn key_bytes(&self) -> [u8; 17] {
        let mut k = [0u8; 17];
        k[0] = self.group().tag();
        if let Some(id) = self.id() {
            k[1..].copy_from_slice(id.as_bytes());
        }
        k
    }
}

impl fmt::Display for Assignee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}:{}", self.group().name(), id),
            None => f.write_str(self.group().name()),
        }
    }
}
