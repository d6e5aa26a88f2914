//! Accessibility query tests

mod common;

use std::collections::HashSet;

use canopy::{
    parse_limit, AccessQuery, Assignee, Operation, PageFilter, PageType, PermissionLevel, PermissionValues,
    SpaceDefaults, SpaceOverrides,
};
use common::{setup, setup_with, Fixture};
use uuid::Uuid;

fn ids(f: &Fixture, q: &AccessQuery) -> HashSet<Uuid> {
    f.engine.list_accessible_ids(q).unwrap().into_iter().collect()
}

fn publish(f: &Fixture, page: &canopy::Page, discoverable: bool) {
    let values = PermissionValues::new(PermissionLevel::View, Assignee::Public).discoverable(discoverable);
    f.engine.upsert_permission(&page.id, &values.into()).unwrap();
}

#[test]
fn member_sees_granted_and_discoverable_pages() {
    let f = setup();
    let granted = f.root();
    let listed = f.root();
    let hidden = f.root();
    let private = f.root();
    let member = f.member();
    f.grant(&granted, PermissionLevel::View, Assignee::User(member));
    publish(&f, &listed, true);
    publish(&f, &hidden, false);

    let q = AccessQuery::new(f.space, Operation::Read).for_user(member);
    assert_eq!(ids(&f, &q), HashSet::from([granted.id, listed.id]));
    assert!(!ids(&f, &q).contains(&private.id));

    let anon = AccessQuery::new(f.space, Operation::Read);
    assert_eq!(ids(&f, &anon), HashSet::from([listed.id]));
}

#[test]
fn always_discoverable_types_ignore_the_flag() {
    let f = setup();
    let board = f.page(None, PageType::Board);
    let card = f.page(Some(&board), PageType::Card);
    publish(&f, &card, false);
    publish(&f, &board, false);

    let anon = AccessQuery::new(f.space, Operation::Read);
    assert_eq!(ids(&f, &anon), HashSet::from([card.id]));
}

#[test]
fn admin_sees_every_live_page() {
    let f = setup();
    let a = f.root();
    let b = f.child(&a);
    let admin = Uuid::new_v4();
    f.dir().add_admin(f.space, admin);

    let q = AccessQuery::new(f.space, Operation::Delete).for_user(admin);
    assert_eq!(ids(&f, &q), HashSet::from([a.id, b.id]));
}

#[test]
fn operation_must_be_covered() {
    let f = setup_with(SpaceDefaults { default_level: Some(PermissionLevel::View), public_pages: false });
    let a = f.root();
    let member = f.member();

    let read = AccessQuery::new(f.space, Operation::Read).for_user(member);
    assert_eq!(ids(&f, &read), HashSet::from([a.id]));
    let edit = AccessQuery::new(f.space, Operation::EditContent).for_user(member);
    assert!(ids(&f, &edit).is_empty());
    let owner_edit = AccessQuery::new(f.space, Operation::EditContent).for_user(f.owner);
    assert_eq!(ids(&f, &owner_edit), HashSet::from([a.id]));
}

#[test]
fn guests_skip_space_and_role_grants() {
    let f = setup_with(SpaceDefaults { default_level: Some(PermissionLevel::View), public_pages: false });
    let a = f.root();
    let b = f.root();
    let listed = f.root();
    publish(&f, &listed, true);
    let guest = Uuid::new_v4();
    f.dir().add_guest(f.space, guest);
    f.grant(&b, PermissionLevel::View, Assignee::User(guest));

    let q = AccessQuery::new(f.space, Operation::Read).for_user(guest);
    let got = ids(&f, &q);
    assert_eq!(got, HashSet::from([b.id, listed.id]));
    assert!(!got.contains(&a.id));
}

#[test]
fn delete_override_short_circuits_by_type() {
    let f = setup();
    let page = f.root();
    let bounty = f.page(None, PageType::Bounty);
    let proposal = f.page(None, PageType::Proposal);
    let member = f.member();
    f.dir().set_overrides(f.space, member, SpaceOverrides { delete_any_proposal: true, ..Default::default() });

    let q = AccessQuery::new(f.space, Operation::Delete).for_user(member);
    assert_eq!(ids(&f, &q), HashSet::from([proposal.id]));
    assert!(!ids(&f, &q).contains(&page.id));
    assert!(!ids(&f, &q).contains(&bounty.id));
}

#[test]
fn filters_apply_before_permissions() {
    let f = setup();
    let page = f.root();
    let bounty = f.page(None, PageType::Bounty);
    let board = f.page(None, PageType::Board);
    let card = f.page(Some(&board), PageType::Card);
    let proposal = f.page(None, PageType::Proposal);
    let owner = f.owner;

    let q = |filter| AccessQuery::new(f.space, Operation::Read).for_user(owner).with_filter(filter);
    assert_eq!(ids(&f, &q(PageFilter::All)).len(), 5);
    assert_eq!(ids(&f, &q(PageFilter::Reward)), HashSet::from([bounty.id]));
    assert_eq!(ids(&f, &q(PageFilter::NotCard)), HashSet::from([page.id, bounty.id, board.id, proposal.id]));
    assert_eq!(ids(&f, &q(PageFilter::SidebarView)), HashSet::from([page.id, bounty.id, board.id]));
    assert!(!ids(&f, &q(PageFilter::SidebarView)).contains(&card.id));
}

#[test]
fn archived_pages_are_listed_separately() {
    let f = setup();
    let live = f.root();
    let mut gone = f.root();
    gone.deleted = true;
    f.engine.update_page(&gone).unwrap();

    let q = AccessQuery::new(f.space, Operation::Read).for_user(f.owner);
    assert_eq!(ids(&f, &q), HashSet::from([live.id]));
    assert_eq!(ids(&f, &q.clone().archived(true)), HashSet::from([gone.id]));
}

#[test]
fn search_matches_title_or_content() {
    let f = setup();
    let mut roadmap = f.root();
    roadmap.title = "Product Roadmap".into();
    f.engine.update_page(&roadmap).unwrap();
    let mut notes = f.root();
    notes.title = "Meeting notes".into();
    notes.content_text = "we discussed the roadmap for q3".into();
    f.engine.update_page(&notes).unwrap();
    f.root();

    let q = AccessQuery::new(f.space, Operation::Read).for_user(f.owner);
    assert_eq!(ids(&f, &q.clone().with_search("ROADMAP")), HashSet::from([roadmap.id, notes.id]));
    assert_eq!(ids(&f, &q.clone().with_search("roadmap q3")), HashSet::from([notes.id]));
    assert!(ids(&f, &q.with_search("budget")).is_empty());
}

#[test]
fn limit_counts_accessible_pages_in_order() {
    let f = setup();
    let mut pages = Vec::new();
    for i in 0..4 {
        let mut p = f.root();
        p.index = i;
        f.engine.update_page(&p).unwrap();
        pages.push(p);
    }
    let member = f.member();
    f.grant(&pages[1], PermissionLevel::View, Assignee::User(member));
    f.grant(&pages[2], PermissionLevel::View, Assignee::User(member));
    f.grant(&pages[3], PermissionLevel::View, Assignee::User(member));

    let q = AccessQuery::new(f.space, Operation::Read).for_user(member).with_limit(parse_limit(Some("2")));
    assert_eq!(f.engine.list_accessible_ids(&q).unwrap(), vec![pages[1].id, pages[2].id]);

    let all = q.with_limit(parse_limit(Some("lots")));
    assert_eq!(f.engine.list_accessible_ids(&all).unwrap().len(), 3);
}
