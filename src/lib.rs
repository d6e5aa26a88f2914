//! Canopy - hierarchical page permissions with materialized inheritance
//!
//! Pages form a forest per space. Each page carries its own permission records;
//! a record may point at an ancestor's record it inherits from. Writes keep those
//! pointers legal and cascade value changes, reads never walk the tree.

pub mod accessible;
pub mod assignee;
pub mod compare;
pub mod compute;
pub mod config;
pub mod db;
pub mod delete;
pub mod directory;
pub mod engine;
pub mod error;
pub mod keys;
pub mod levels;
pub mod lifecycle;
#[cfg(feature = "cli")]
pub mod logging;
pub mod model;
pub mod read;
pub mod repair;
pub mod tree;
pub mod tx;
pub mod upsert;

pub use accessible::{parse_limit, AccessQuery, PageFilter};
pub use assignee::{Assignee, AssigneeGroup};
pub use compare::{compare_levels, has_same_or_more_permissions, LevelComparison};
pub use compute::{PermissionFlags, UserContext};
pub use config::{ConfigError, EngineConfig};
pub use db::Store;
pub use directory::{Directory, MemoryDirectory};
pub use engine::PermissionEngine;
pub use error::{CanopyError, ErrorKind, Result};
pub use levels::{Operation, OperationSet, PermissionLevel};
pub use lifecycle::{LifecycleEvent, LifecycleOutcome};
pub use model::{
    Page, PagePermission, PageType, PermissionInput, PermissionValues, SpaceDefaults, SpaceOverrides, SpaceRole,
};
pub use read::View;
pub use repair::{IllegalReference, RepairOp, RepairPlan, RepairReport};
pub use tree::{ResolveOptions, ResolvedTree, TreeNode};
pub use tx::{PermissionPatch, Tx};
