//! Accessibility query engine: which pages of a space may a caller act on

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::compute::{member_operations, UserContext};
use crate::directory::Directory;
use crate::error::{CanopyError, Result};
use crate::levels::Operation;
use crate::model::{Page, PageType};
use crate::read::View;

/// Page type filter applied before permission checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFilter {
    #[default]
    All,
    /// Bounties only
    Reward,
    NotCard,
    /// What the sidebar shows: no proposals, no cards
    SidebarView,
}

impl PageFilter {
    #[inline]
    pub fn keeps(self, t: PageType) -> bool {
        match self {
            PageFilter::All => true,
            PageFilter::Reward => t.is_bounty(),
            PageFilter::NotCard => !t.is_card(),
            PageFilter::SidebarView => !t.is_card() && !t.is_proposal(),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PageFilter::All => "all",
            PageFilter::Reward => "reward",
            PageFilter::NotCard => "not_card",
            PageFilter::SidebarView => "sidebar_view",
        }
    }
}

impl fmt::Display for PageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PageFilter {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(PageFilter::All),
            "reward" => Ok(PageFilter::Reward),
            "not_card" => Ok(PageFilter::NotCard),
            "sidebar_view" => Ok(PageFilter::SidebarView),
            other => Err(CanopyError::invalid(format!("unknown page filter: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessQuery {
    pub space_id: Uuid,
    pub user_id: Option<Uuid>,
    pub operation: Operation,
    pub filter: PageFilter,
    /// Whitespace separated terms, each must occur in the title or the content
    pub search: Option<String>,
    /// `true` lists archived pages only, `false` live pages only
    pub archived: bool,
    pub limit: Option<usize>,
}

impl AccessQuery {
    pub fn new(space_id: Uuid, operation: Operation) -> Self {
        AccessQuery {
            space_id,
            user_id: None,
            operation,
            filter: PageFilter::All,
            search: None,
            archived: false,
            limit: None,
        }
    }

    pub fn for_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_filter(mut self, filter: PageFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Lenient limit parsing: empty or non-numeric input means no limit
#[inline]
pub fn parse_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse().ok())
}

fn search_terms(search: Option<&str>) -> Vec<String> {
    search
        .map(|s| s.split_whitespace().map(str::to_lowercase).collect())
        .unwrap_or_default()
}

fn matches_search(page: &Page, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let title = page.title.to_lowercase();
    let content = page.content_text.to_lowercase();
    terms.iter().all(|t| title.contains(t.as_str()) || content.contains(t.as_str()))
}

/// Storage-level filters: archived state, type and search
fn candidates(view: &View, q: &AccessQuery) -> Result<Vec<Page>> {
    let terms = search_terms(q.search.as_deref());
    let mut pages: Vec<Page> = view
        .space_pages(&q.space_id)?
        .into_iter()
        .filter(|p| p.deleted == q.archived && q.filter.keeps(p.page_type) && matches_search(p, &terms))
        .collect();
    pages.sort_by(|a, b| a.index.cmp(&b.index).then(a.id.cmp(&b.id)));
    Ok(pages)
}

fn page_accessible(view: &View, page: &Page, ctx: &UserContext, op: Operation) -> Result<bool> {
    if op == Operation::Delete && ctx.overrides.can_delete_any(page) {
        return Ok(true);
    }
    let records = view.permissions_for_page(&page.id)?;
    let public = records.iter().any(|p| {
        p.assignee.is_public()
            && p.grant().contains(op)
            && (p.allow_discovery || page.page_type.always_discoverable())
    });
    Ok(public || member_operations(&records, ctx).contains(op))
}

/// Ids of the pages the caller may perform `q.operation` on, in sibling order
pub fn list_accessible_ids(view: &View, dir: &dyn Directory, q: &AccessQuery) -> Result<Vec<Uuid>> {
    let ctx = UserContext::load(dir, &q.space_id, q.user_id.as_ref())?;
    let pages = candidates(view, q)?;
    let total = pages.len();

    let mut r = Vec::new();
    for page in pages {
        if q.limit.is_some_and(|l| r.len() >= l) {
            break;
        }
        if ctx.is_admin() || page_accessible(view, &page, &ctx, q.operation)? {
            r.push(page.id);
        }
    }
    debug!(
        space_id = %q.space_id,
        operation = %q.operation,
        candidates = total,
        accessible = r.len(),
        "listed accessible pages"
    );
    Ok(r)
}
