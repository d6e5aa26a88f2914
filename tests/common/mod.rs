//! Shared fixture: a fresh store in a temp dir and one space with an owner

#![allow(dead_code)]

use canopy::{
    Assignee, MemoryDirectory, Page, PagePermission, PageType, PermissionEngine, PermissionInput, PermissionLevel,
    PermissionValues, SpaceDefaults, Store,
};
use tempfile::TempDir;
use uuid::Uuid;

pub struct Fixture {
    pub engine: PermissionEngine<MemoryDirectory>,
    pub space: Uuid,
    /// Plain member creating most pages
    pub owner: Uuid,
    _dir: TempDir,
}

pub fn setup() -> Fixture {
    setup_with(SpaceDefaults { default_level: None, public_pages: false })
}

pub fn setup_with(defaults: SpaceDefaults) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), 16 << 20).unwrap();
    let space = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let directory = MemoryDirectory::new();
    directory.add_member(space, owner).set_defaults(space, defaults);
    Fixture { engine: PermissionEngine::new(store, directory), space, owner, _dir: dir }
}

impl Fixture {
    pub fn dir(&self) -> &MemoryDirectory {
        self.engine.directory()
    }

    pub fn member(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.dir().add_member(self.space, id);
        id
    }

    pub fn role(&self) -> Uuid {
        self.dir().create_role(self.space)
    }

    pub fn page(&self, parent: Option<&Page>, page_type: PageType) -> Page {
        let page = Page::new(self.space, parent.map(|p| p.id), page_type, self.owner);
        self.engine.create_page(&page).unwrap();
        self.engine.page(&page.id).unwrap()
    }

    pub fn root(&self) -> Page {
        self.page(None, PageType::Page)
    }

    pub fn child(&self, parent: &Page) -> Page {
        self.page(Some(parent), PageType::Page)
    }

    pub fn grant(&self, page: &Page, level: PermissionLevel, assignee: Assignee) -> PagePermission {
        let input = PermissionInput::Values(PermissionValues::new(level, assignee));
        self.engine.upsert_permission(&page.id, &input).unwrap()
    }

    pub fn perms(&self, page: &Page) -> Vec<PagePermission> {
        self.engine.list_permissions(&page.id).unwrap()
    }

    pub fn perm_for(&self, page: &Page, assignee: Assignee) -> PagePermission {
        self.find(page, assignee).unwrap_or_else(|| panic!("no {} record on page {}", assignee, page.id))
    }

    pub fn find(&self, page: &Page, assignee: Assignee) -> Option<PagePermission> {
        self.perms(page).into_iter().find(|p| p.assignee == assignee)
    }

    pub fn owner_assignee(&self) -> Assignee {
        Assignee::User(self.owner)
    }
}
