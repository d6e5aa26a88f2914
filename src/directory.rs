//! Membership, role and space-override lookups consumed by the engine

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::error::Result;
use crate::model::{SpaceDefaults, SpaceOverrides, SpaceRole};

/// Read-only view of who belongs where. Implemented by the host application.
pub trait Directory: Send + Sync {
    /// Membership of a user in a space, `None` if not a member
    fn space_role(&self, space_id: &Uuid, user_id: &Uuid) -> Result<Option<SpaceRole>>;

    /// Roles the user holds in the space
    fn roles_for_user(&self, space_id: &Uuid, user_id: &Uuid) -> Result<Vec<Uuid>>;

    /// The space a role belongs to, `None` if the role does not exist
    fn role_space(&self, role_id: &Uuid) -> Result<Option<Uuid>>;

    /// Space-wide delete overrides held by the user, directly or through roles
    fn space_overrides(&self, space_id: &Uuid, user_id: &Uuid) -> Result<SpaceOverrides>;

    /// Grants seeded on new root pages of the space
    fn space_defaults(&self, space_id: &Uuid) -> Result<SpaceDefaults>;

    /// Bots and integrations that create pages without being granted access to them
    fn is_service_account(&self, user_id: &Uuid) -> Result<bool>;
}

// ============================================================================
// In-memory directory
// ============================================================================

#[derive(Debug, Default)]
struct State {
    members: HashMap<(Uuid, Uuid), SpaceRole>,
    roles: HashMap<Uuid, Uuid>,
    assignments: HashMap<(Uuid, Uuid), HashSet<Uuid>>,
    user_overrides: HashMap<(Uuid, Uuid), SpaceOverrides>,
    role_overrides: HashMap<Uuid, SpaceOverrides>,
    defaults: HashMap<Uuid, SpaceDefaults>,
    service_accounts: HashSet<Uuid>,
}

/// Directory kept in process memory
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: RwLock<State>,
    fallback: SpaceDefaults,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults used for spaces without explicit defaults
    pub fn with_fallback_defaults(mut self, defaults: SpaceDefaults) -> Self {
        self.fallback = defaults;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_member(&self, space_id: Uuid, user_id: Uuid) -> &Self {
        self.write().members.insert((space_id, user_id), SpaceRole::default());
        self
    }

    pub fn add_admin(&self, space_id: Uuid, user_id: Uuid) -> &Self {
        self.write().members.insert((space_id, user_id), SpaceRole { is_admin: true, is_guest: false });
        self
    }

    pub fn add_guest(&self, space_id: Uuid, user_id: Uuid) -> &Self {
        self.write().members.insert((space_id, user_id), SpaceRole { is_admin: false, is_guest: true });
        self
    }

    pub fn remove_member(&self, space_id: Uuid, user_id: Uuid) -> &Self {
        let mut s = self.write();
        s.members.remove(&(space_id, user_id));
        s.assignments.remove(&(space_id, user_id));
        self
    }

    /// Register a role and return its id
    pub fn create_role(&self, space_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.write().roles.insert(id, space_id);
        id
    }

    pub fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> &Self {
        let mut s = self.write();
        if let Some(space_id) = s.roles.get(&role_id).copied() {
            s.assignments.entry((space_id, user_id)).or_default().insert(role_id);
        }
        self
    }

    pub fn set_overrides(&self, space_id: Uuid, user_id: Uuid, overrides: SpaceOverrides) -> &Self {
        self.write().user_overrides.insert((space_id, user_id), overrides);
        self
    }

    pub fn set_role_overrides(&self, role_id: Uuid, overrides: SpaceOverrides) -> &Self {
        self.write().role_overrides.insert(role_id, overrides);
        self
    }

    pub fn set_defaults(&self, space_id: Uuid, defaults: SpaceDefaults) -> &Self {
        self.write().defaults.insert(space_id, defaults);
        self
    }

    pub fn mark_service_account(&self, user_id: Uuid) -> &Self {
        self.write().service_accounts.insert(user_id);
        self
    }
}

impl Directory for MemoryDirectory {
    fn space_role(&self, space_id: &Uuid, user_id: &Uuid) -> Result<Option<SpaceRole>> {
        Ok(self.read().members.get(&(*space_id, *user_id)).copied())
    }

    fn roles_for_user(&self, space_id: &Uuid, user_id: &Uuid) -> Result<Vec<Uuid>> {
        let s = self.read();
        let mut r: Vec<Uuid> = s
            .assignments
            .get(&(*space_id, *user_id))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        r.sort();
        Ok(r)
    }

    fn role_space(&self, role_id: &Uuid) -> Result<Option<Uuid>> {
        Ok(self.read().roles.get(role_id).copied())
    }

    fn space_overrides(&self, space_id: &Uuid, user_id: &Uuid) -> Result<SpaceOverrides> {
        let s = self.read();
        let mut o = s.user_overrides.get(&(*space_id, *user_id)).copied().unwrap_or_default();
        if let Some(roles) = s.assignments.get(&(*space_id, *user_id)) {
            for role in roles {
                if let Some(ro) = s.role_overrides.get(role) {
                    o = o.merge(*ro);
                }
            }
        }
        Ok(o)
    }

    fn space_defaults(&self, space_id: &Uuid) -> Result<SpaceDefaults> {
        Ok(self.read().defaults.get(space_id).copied().unwrap_or(self.fallback))
    }

    fn is_service_account(&self, user_id: &Uuid) -> Result<bool> {
        Ok(self.read().service_accounts.contains(user_id))
    }
}
