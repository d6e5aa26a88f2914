//! Pages, permission records and the inputs that create them

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assignee::Assignee;
use crate::error::Result;
use crate::levels::{OperationSet, PermissionLevel};

// ============================================================================
// Pages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Page,
    Board,
    InlineBoard,
    LinkedBoard,
    InlineLinkedBoard,
    BoardTemplate,
    Card,
    CardTemplate,
    PageTemplate,
    Bounty,
    BountyTemplate,
    Proposal,
    ProposalTemplate,
}

impl PageType {
    /// Boards whose permission edits propagate verbatim to their cards
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(
            self,
            PageType::Board
                | PageType::InlineBoard
                | PageType::LinkedBoard
                | PageType::InlineLinkedBoard
                | PageType::BoardTemplate
        )
    }

    /// Listed to the public without an explicit discovery flag
    #[inline]
    pub fn always_discoverable(self) -> bool {
        matches!(
            self,
            PageType::Card | PageType::CardTemplate | PageType::Bounty | PageType::BountyTemplate
        )
    }

    #[inline]
    pub fn is_card(self) -> bool {
        matches!(self, PageType::Card | PageType::CardTemplate)
    }

    #[inline]
    pub fn is_bounty(self) -> bool {
        matches!(self, PageType::Bounty | PageType::BountyTemplate)
    }

    #[inline]
    pub fn is_proposal(self) -> bool {
        matches!(self, PageType::Proposal | PageType::ProposalTemplate)
    }
}

/// A node in the permission tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub space_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub page_type: PageType,
    pub created_by: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content_text: String,
    /// Position among siblings
    #[serde(default)]
    pub index: i64,
    /// Archived pages stay in the tree but are hidden from normal listings
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub converted_proposal_id: Option<Uuid>,
    #[serde(default)]
    pub has_bounty: bool,
}

impl Page {
    pub fn new(space_id: Uuid, parent_id: Option<Uuid>, page_type: PageType, created_by: Uuid) -> Self {
        Page {
            id: Uuid::new_v4(),
            space_id,
            parent_id,
            page_type,
            created_by,
            title: String::new(),
            content_text: String::new(),
            index: 0,
            deleted: false,
            is_locked: false,
            converted_proposal_id: None,
            has_bounty: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = index;
        self
    }
}

// ============================================================================
// Permission records
// ============================================================================

/// A stored grant of operations on one page to one assignee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePermission {
    pub id: Uuid,
    pub page_id: Uuid,
    pub level: PermissionLevel,
    /// Only meaningful for `custom`
    #[serde(default)]
    pub operations: OperationSet,
    pub assignee: Assignee,
    /// The record this one inherits from, if any
    #[serde(default)]
    pub source_permission_id: Option<Uuid>,
    /// Public records only: surfaced in browse listings
    #[serde(default)]
    pub allow_discovery: bool,
}

impl PagePermission {
    /// Operations this record grants
    #[inline]
    pub fn grant(&self) -> OperationSet {
        self.level.expand(self.operations)
    }

    #[inline]
    pub fn is_inherited(&self) -> bool {
        self.source_permission_id.is_some()
    }

    /// The record that holds the authoritative value: the source if inherited, else itself
    #[inline]
    pub fn source_of_truth(&self) -> Uuid {
        self.source_permission_id.unwrap_or(self.id)
    }
}

/// Explicit permission values supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionValues {
    pub level: PermissionLevel,
    #[serde(default)]
    pub operations: OperationSet,
    pub assignee: Assignee,
    #[serde(default)]
    pub allow_discovery: Option<bool>,
}

impl PermissionValues {
    pub fn new(level: PermissionLevel, assignee: Assignee) -> Self {
        PermissionValues {
            level,
            operations: OperationSet::EMPTY,
            assignee,
            allow_discovery: None,
        }
    }

    pub fn custom(operations: OperationSet, assignee: Assignee) -> Self {
        PermissionValues {
            level: PermissionLevel::Custom,
            operations,
            assignee,
            allow_discovery: None,
        }
    }

    pub fn discoverable(mut self, allow: bool) -> Self {
        self.allow_discovery = Some(allow);
        self
    }

    /// Operations these values grant once normalized
    pub fn grant(&self) -> Result<OperationSet> {
        let ops = self.level.normalize(self.operations)?;
        Ok(self.level.expand(ops))
    }
}

/// What an upsert writes: explicit values, or a reference to inherit from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionInput {
    Values(PermissionValues),
    InheritFrom { inherit_from: Uuid },
}

impl PermissionInput {
    #[inline]
    pub fn inherit(permission_id: Uuid) -> Self {
        PermissionInput::InheritFrom { inherit_from: permission_id }
    }
}

impl From<PermissionValues> for PermissionInput {
    fn from(v: PermissionValues) -> Self {
        PermissionInput::Values(v)
    }
}

// ============================================================================
// Space membership and overrides
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRole {
    pub is_admin: bool,
    pub is_guest: bool,
}

/// Space-wide delete grants that bypass page permissions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceOverrides {
    pub delete_any_page: bool,
    pub delete_any_bounty: bool,
    pub delete_any_proposal: bool,
}

impl SpaceOverrides {
    pub fn merge(self, other: SpaceOverrides) -> SpaceOverrides {
        SpaceOverrides {
            delete_any_page: self.delete_any_page || other.delete_any_page,
            delete_any_bounty: self.delete_any_bounty || other.delete_any_bounty,
            delete_any_proposal: self.delete_any_proposal || other.delete_any_proposal,
        }
    }

    pub fn can_delete_any(&self, page: &Page) -> bool {
        let t = page.page_type;
        if t.is_proposal() {
            return self.delete_any_proposal;
        }
        if t.is_bounty() {
            return self.delete_any_bounty;
        }
        self.delete_any_page || (page.has_bounty && self.delete_any_bounty)
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.delete_any_page || self.delete_any_bounty || self.delete_any_proposal
    }
}

/// Grants seeded on every new root page of a space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceDefaults {
    /// Level granted to the whole space, `None` for no space grant
    pub default_level: Option<PermissionLevel>,
    pub public_pages: bool,
}

impl Default for SpaceDefaults {
    fn default() -> Self {
        SpaceDefaults {
            default_level: Some(PermissionLevel::FullAccess),
            public_pages: false,
        }
    }
}
