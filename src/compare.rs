//! Permission comparator

use crate::assignee::Assignee;
use crate::levels::OperationSet;
use crate::model::PagePermission;

/// How a comparison grant relates to a base grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelComparison {
    /// Comparison is a strict superset of base
    More,
    /// Comparison is a strict subset of base
    Less,
    Equal,
    /// Partial overlap or disjoint
    Different,
}

/// Compare two expanded grants
#[inline]
pub fn compare_levels(base: OperationSet, comparison: OperationSet) -> LevelComparison {
    if base == comparison {
        LevelComparison::Equal
    } else if comparison.is_superset(base) {
        LevelComparison::More
    } else if base.is_superset(comparison) {
        LevelComparison::Less
    } else {
        LevelComparison::Different
    }
}

/// True when, for every assignee in `base`, some record in `comparison` for the
/// same assignee grants the same or more. Empty `base` is trivially satisfied.
pub fn has_same_or_more_permissions<'a, B, C>(base: B, comparison: C) -> bool
where
    B: IntoIterator<Item = &'a PagePermission>,
    C: IntoIterator<Item = &'a PagePermission>,
{
    let comparison: Vec<&PagePermission> = comparison.into_iter().collect();
    base.into_iter().all(|b| {
        let want = b.grant();
        comparison.iter().any(|c| {
            c.assignee == b.assignee
                && matches!(compare_levels(want, c.grant()), LevelComparison::Equal | LevelComparison::More)
        })
    })
}

/// The record for `assignee` among `records`, if present
#[inline]
pub fn find_existing_permission_for_assignee<'a>(
    records: &'a [PagePermission],
    assignee: &Assignee,
) -> Option<&'a PagePermission> {
    records.iter().find(|p| &p.assignee == assignee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{Operation, PermissionLevel, EDITOR, FULL_ACCESS, VIEW, VIEW_COMMENT};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn perm(level: PermissionLevel, assignee: Assignee) -> PagePermission {
        PagePermission {
            id: Uuid::new_v4(),
            page_id: Uuid::new_v4(),
            level,
            operations: OperationSet::EMPTY,
            assignee,
            source_permission_id: None,
            allow_discovery: false,
        }
    }

    #[test]
    fn compare_named_levels() {
        assert_eq!(compare_levels(VIEW, EDITOR), LevelComparison::More);
        assert_eq!(compare_levels(FULL_ACCESS, VIEW_COMMENT), LevelComparison::Less);
        assert_eq!(compare_levels(EDITOR, EDITOR), LevelComparison::Equal);
    }

    #[test]
    fn disjoint_custom_sets_are_different() {
        let a = OperationSet::of(&[Operation::Comment]);
        let b = OperationSet::of(&[Operation::EditLock]);
        assert_eq!(compare_levels(a, b), LevelComparison::Different);
        let c = OperationSet::of(&[Operation::Comment, Operation::Read]);
        let d = OperationSet::of(&[Operation::Comment, Operation::EditLock]);
        assert_eq!(compare_levels(c, d), LevelComparison::Different);
    }

    #[test]
    fn empty_base_is_vacuously_covered() {
        let none: Vec<PagePermission> = Vec::new();
        let c = vec![perm(PermissionLevel::View, Assignee::Public)];
        assert!(has_same_or_more_permissions(&none, &c));
        assert!(has_same_or_more_permissions(&none, &none));
    }

    #[test]
    fn comparison_must_match_assignee() {
        let space = Assignee::Space(Uuid::new_v4());
        let user = Assignee::User(Uuid::new_v4());
        let base = vec![perm(PermissionLevel::View, user)];
        // a broader space grant does not cover an individual user grant
        let cmp = vec![perm(PermissionLevel::FullAccess, space)];
        assert!(!has_same_or_more_permissions(&base, &cmp));

        let cmp = vec![perm(PermissionLevel::Editor, user), perm(PermissionLevel::View, space)];
        assert!(has_same_or_more_permissions(&base, &cmp));
    }

    #[test]
    fn every_base_assignee_needs_coverage() {
        let a = Assignee::User(Uuid::new_v4());
        let b = Assignee::Role(Uuid::new_v4());
        let base = vec![perm(PermissionLevel::View, a), perm(PermissionLevel::Editor, b)];
        let cmp = vec![perm(PermissionLevel::FullAccess, a), perm(PermissionLevel::View, b)];
        assert!(!has_same_or_more_permissions(&base, &cmp));
    }

    #[test]
    fn finds_record_by_assignee() {
        let a = Assignee::User(Uuid::new_v4());
        let records = vec![perm(PermissionLevel::View, Assignee::Public), perm(PermissionLevel::Editor, a)];
        assert_eq!(find_existing_permission_for_assignee(&records, &a).map(|p| p.level), Some(PermissionLevel::Editor));
        assert!(find_existing_permission_for_assignee(&records, &Assignee::Role(Uuid::new_v4())).is_none());
    }

    fn any_set() -> impl Strategy<Value = OperationSet> {
        (0u64..(1 << Operation::ALL.len())).prop_map(OperationSet::from_bits)
    }

    proptest! {
        #[test]
        fn compare_is_reflexive(a in any_set()) {
            prop_assert_eq!(compare_levels(a, a), LevelComparison::Equal);
        }

        #[test]
        fn compare_is_antisymmetric(a in any_set(), b in any_set()) {
            let expected = match compare_levels(a, b) {
                LevelComparison::More => LevelComparison::Less,
                LevelComparison::Less => LevelComparison::More,
                other => other,
            };
            prop_assert_eq!(compare_levels(b, a), expected);
        }
    }
}
