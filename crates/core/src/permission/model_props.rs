//! Property-based tests for PermissionModel.

use proptest::prelude::*;

use keyhold_shared::types::UserId;

use crate::permission::model::PermissionModel;
use crate::permission::types::Subject;

/// Strategy for generating `module:action` permission strings.
fn arb_permission() -> impl Strategy<Value = String> {
    "[a-z]{1,8}:[a-z]{1,8}"
}

fn arb_permission_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_permission(), 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Non-owners can manage a level only when theirs is strictly lower.
    #[test]
    fn prop_can_manage_level_strict_for_non_owner(
        role_level in -20i32..20,
        target_level in -20i32..20,
    ) {
        let model = PermissionModel::default();
        let subject = Subject::new(UserId::new(), role_level, Vec::<String>::new());
        prop_assert_eq!(
            model.can_manage_level(&subject, target_level),
            role_level < target_level
        );
    }

    /// Owners can manage every level regardless of their own.
    #[test]
    fn prop_owner_manages_any_level(
        role_level in -20i32..20,
        target_level in -20i32..20,
    ) {
        let model = PermissionModel::default();
        let mut owner = Subject::owner(UserId::new());
        owner.role_level = role_level;
        prop_assert!(model.can_manage_level(&owner, target_level));
    }

    /// check_permission is set membership for non-owners.
    #[test]
    fn prop_check_permission_is_membership(
        held in arb_permission_set(),
        probe in arb_permission(),
    ) {
        let model = PermissionModel::default();
        let subject = Subject::new(UserId::new(), 3, held.clone());
        prop_assert_eq!(model.check_permission(&subject, &probe), held.contains(&probe));
    }

    /// any/all are the OR/AND of the single check.
    #[test]
    fn prop_any_all_compose_single_check(
        held in arb_permission_set(),
        probes in arb_permission_set(),
    ) {
        let model = PermissionModel::default();
        let subject = Subject::new(UserId::new(), 3, held);
        let refs: Vec<&str> = probes.iter().map(String::as_str).collect();

        let any = refs.iter().any(|p| model.check_permission(&subject, p));
        let all = refs.iter().all(|p| model.check_permission(&subject, p));

        prop_assert_eq!(model.check_any_permission(&subject, &refs), any);
        prop_assert_eq!(model.check_all_permissions(&subject, &refs), all);
    }
}
