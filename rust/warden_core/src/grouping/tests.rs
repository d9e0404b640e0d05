//! Contract tests run against both grouping engines, plus agreement
//! properties between them.

use ahash::AHashSet;
use proptest::prelude::*;

use super::*;
use crate::error::AuthzError;
use crate::types::{Role, Subject, User};

// ============================================================================
// Helper builders
// ============================================================================

fn user(id: &str) -> Subject {
    Entity::Individual(User::new(id))
}

fn role(id: &str) -> Role {
    Role::new(id)
}

fn nested(id: &str) -> Subject {
    Entity::Group(Role::new(id))
}

fn roles(ids: &[&str]) -> AHashSet<Role> {
    ids.iter().map(|id| Role::new(*id)).collect()
}

fn users(ids: &[&str]) -> AHashSet<User> {
    ids.iter().map(|id| User::new(*id)).collect()
}

/// Runs each contract test against both implementations.
macro_rules! contract_tests {
    ($($name:ident),* $(,)?) => {
        mod direct_contract {
            use super::*;
            $(
                #[test]
                fn $name() {
                    super::$name(DirectGrouping::<User, Role>::new());
                }
            )*
        }

        mod memoized_contract {
            use super::*;
            $(
                #[test]
                fn $name() {
                    super::$name(MemoizedGrouping::<User, Role>::new());
                }
            )*
        }
    };
}

contract_tests!(
    join_and_transitive_membership,
    join_is_idempotent,
    leave_missing_edge_is_not_found,
    leave_cuts_only_that_path,
    remove_group_drops_all_edges,
    remove_member_drops_all_edges,
    cycles_terminate,
    immediate_views_are_one_hop,
    join_under_existing_hierarchy_propagates,
);

// ============================================================================
// Contract
// ============================================================================

fn join_and_transitive_membership<T: Grouping<User, Role>>(mut g: T) {
    g.join(&user("4"), &role("2_0")).unwrap();
    g.join(&nested("2_0"), &role("even")).unwrap();

    assert!(g.is_in(&user("4"), &role("2_0")).unwrap());
    assert!(g.is_in(&user("4"), &role("even")).unwrap());
    assert!(g.is_in(&nested("2_0"), &role("even")).unwrap());
    assert!(!g.is_in(&nested("even"), &role("2_0")).unwrap());

    assert_eq!(g.groups_of(&user("4")).unwrap(), roles(&["2_0", "even"]));
    assert_eq!(g.members_in(&role("even")).unwrap(), users(&["4"]));
}

fn join_is_idempotent<T: Grouping<User, Role>>(mut g: T) {
    g.join(&user("1"), &role("admins")).unwrap();
    g.join(&user("1"), &role("admins")).unwrap();

    assert_eq!(g.immediate_entities_in(&role("admins")).unwrap().len(), 1);
    g.leave(&user("1"), &role("admins")).unwrap();
    assert!(!g.is_in(&user("1"), &role("admins")).unwrap());
}

fn leave_missing_edge_is_not_found<T: Grouping<User, Role>>(mut g: T) {
    let err = g.leave(&user("1"), &role("admins")).unwrap_err();
    assert!(matches!(err, AuthzError::NotFound(_)));

    // Reachable transitively is not an immediate edge.
    g.join(&user("1"), &role("a")).unwrap();
    g.join(&nested("a"), &role("b")).unwrap();
    assert!(g.leave(&user("1"), &role("b")).is_err());
}

fn leave_cuts_only_that_path<T: Grouping<User, Role>>(mut g: T) {
    // user:1 -> a -> top, user:1 -> b -> top
    g.join(&user("1"), &role("a")).unwrap();
    g.join(&user("1"), &role("b")).unwrap();
    g.join(&nested("a"), &role("top")).unwrap();
    g.join(&nested("b"), &role("top")).unwrap();

    g.leave(&nested("a"), &role("top")).unwrap();
    assert!(g.is_in(&user("1"), &role("top")).unwrap());

    g.leave(&nested("b"), &role("top")).unwrap();
    assert!(!g.is_in(&user("1"), &role("top")).unwrap());
    assert!(g.members_in(&role("top")).unwrap().is_empty());
    assert_eq!(g.groups_of(&user("1")).unwrap(), roles(&["a", "b"]));
}

fn remove_group_drops_all_edges<T: Grouping<User, Role>>(mut g: T) {
    g.join(&user("4"), &role("2_0")).unwrap();
    g.join(&nested("2_0"), &role("even")).unwrap();
    g.join(&nested("even"), &role("numbers")).unwrap();
    assert!(g.is_in(&user("4"), &role("even")).unwrap());

    g.remove_group(&role("even")).unwrap();

    assert!(!g.is_in(&user("4"), &role("even")).unwrap());
    assert!(!g.is_in(&user("4"), &role("numbers")).unwrap());
    assert!(g.is_in(&user("4"), &role("2_0")).unwrap());
    assert!(g.members_in(&role("even")).unwrap().is_empty());
    assert!(g.immediate_entities_in(&role("numbers")).unwrap().is_empty());

    // Removing an unknown group is a no-op.
    g.remove_group(&role("ghost")).unwrap();
}

fn remove_member_drops_all_edges<T: Grouping<User, Role>>(mut g: T) {
    g.join(&user("1"), &role("a")).unwrap();
    g.join(&user("1"), &role("b")).unwrap();
    g.join(&user("2"), &role("a")).unwrap();

    g.remove_member(&User::new("1")).unwrap();

    assert!(g.groups_of(&user("1")).unwrap().is_empty());
    assert_eq!(g.members_in(&role("a")).unwrap(), users(&["2"]));
    assert!(g.members_in(&role("b")).unwrap().is_empty());
}

fn cycles_terminate<T: Grouping<User, Role>>(mut g: T) {
    g.join(&user("1"), &role("a")).unwrap();
    g.join(&nested("a"), &role("b")).unwrap();
    g.join(&nested("b"), &role("c")).unwrap();
    g.join(&nested("c"), &role("a")).unwrap();
    g.join(&nested("c"), &role("c")).unwrap();

    assert_eq!(g.groups_of(&user("1")).unwrap(), roles(&["a", "b", "c"]));
    assert!(g.is_in(&nested("a"), &role("a")).unwrap());
    assert_eq!(g.members_in(&role("b")).unwrap(), users(&["1"]));

    g.leave(&nested("c"), &role("a")).unwrap();
    assert!(!g.is_in(&nested("a"), &role("a")).unwrap());
    assert!(g.is_in(&nested("c"), &role("c")).unwrap());
    assert_eq!(g.groups_of(&user("1")).unwrap(), roles(&["a", "b", "c"]));
}

fn immediate_views_are_one_hop<T: Grouping<User, Role>>(mut g: T) {
    g.join(&user("1"), &role("a")).unwrap();
    g.join(&nested("a"), &role("b")).unwrap();

    assert_eq!(g.immediate_groups_of(&user("1")).unwrap(), roles(&["a"]));
    let inside: AHashSet<Subject> = [nested("a")].into_iter().collect();
    assert_eq!(g.immediate_entities_in(&role("b")).unwrap(), inside);
}

fn join_under_existing_hierarchy_propagates<T: Grouping<User, Role>>(mut g: T) {
    // Build bottom-up so the last join must reach two levels down.
    g.join(&user("1"), &role("leaf")).unwrap();
    g.join(&nested("leaf"), &role("mid")).unwrap();
    g.join(&nested("top"), &role("root")).unwrap();
    g.join(&nested("mid"), &role("top")).unwrap();

    assert_eq!(
        g.groups_of(&user("1")).unwrap(),
        roles(&["leaf", "mid", "top", "root"])
    );
    assert_eq!(g.members_in(&role("root")).unwrap(), users(&["1"]));
}

// ============================================================================
// Depth bound
// ============================================================================

fn chain<T: Grouping<User, Role>>(g: &mut T, len: usize) {
    g.join(&user("u"), &role("r0")).unwrap();
    for i in 1..len {
        g.join(&nested(&format!("r{}", i - 1)), &role(&format!("r{i}")))
            .unwrap();
    }
}

#[test]
fn unbounded_walk_resolves_deep_chains() {
    let mut direct = DirectGrouping::<User, Role>::new();
    let mut memo = MemoizedGrouping::<User, Role>::new();
    chain(&mut direct, 25);
    chain(&mut memo, 25);

    assert!(direct.is_in(&user("u"), &role("r24")).unwrap());
    assert!(memo.is_in(&user("u"), &role("r24")).unwrap());
    assert_eq!(direct.groups_of(&user("u")).unwrap().len(), 25);
}

#[test]
fn depth_bound_truncates_both_engines_alike() {
    let mut direct = DirectGrouping::<User, Role>::with_max_depth(Some(DEFAULT_MAX_DEPTH));
    let mut memo = MemoizedGrouping::<User, Role>::with_max_depth(Some(DEFAULT_MAX_DEPTH));
    chain(&mut direct, 15);
    chain(&mut memo, 15);

    // r0 is one hop away, r9 is ten.
    assert!(direct.is_in(&user("u"), &role("r9")).unwrap());
    assert!(!direct.is_in(&user("u"), &role("r10")).unwrap());
    assert_eq!(
        direct.groups_of(&user("u")).unwrap(),
        memo.groups_of(&user("u")).unwrap()
    );
    assert_eq!(
        direct.members_in(&role("r12")).unwrap(),
        memo.members_in(&role("r12")).unwrap()
    );
}

#[test]
fn any_grouping_dispatches_by_kind() {
    let mut g = AnyGrouping::<User, Role>::new(GroupingKind::Direct, None);
    assert_eq!(g.kind(), GroupingKind::Direct);
    g.join(&user("1"), &role("a")).unwrap();
    assert!(g.is_in(&user("1"), &role("a")).unwrap());

    let g = AnyGrouping::<User, Role>::new(GroupingKind::Memoized, Some(3));
    assert_eq!(g.kind(), GroupingKind::Memoized);
}

// ============================================================================
// Agreement between engines
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Join(Subject, Role),
    Leave(Subject, Role),
    RemoveGroup(Role),
    RemoveMember(User),
}

fn arb_subject() -> impl Strategy<Value = Subject> {
    prop_oneof![
        (0..4u8).prop_map(|i| user(&i.to_string())),
        (0..6u8).prop_map(|i| nested(&i.to_string())),
    ]
}

fn arb_role() -> impl Strategy<Value = Role> {
    (0..6u8).prop_map(|i| role(&i.to_string()))
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (arb_subject(), arb_role()).prop_map(|(s, r)| Op::Join(s, r)),
        3 => (arb_subject(), arb_role()).prop_map(|(s, r)| Op::Leave(s, r)),
        1 => arb_role().prop_map(Op::RemoveGroup),
        1 => (0..4u8).prop_map(|i| Op::RemoveMember(User::new(i.to_string()))),
    ]
}

fn apply<T: Grouping<User, Role>>(g: &mut T, op: &Op) -> bool {
    match op {
        Op::Join(s, r) => g.join(s, r).is_ok(),
        Op::Leave(s, r) => g.leave(s, r).is_ok(),
        Op::RemoveGroup(r) => g.remove_group(r).is_ok(),
        Op::RemoveMember(u) => g.remove_member(u).is_ok(),
    }
}

fn assert_agree<A, B>(a: &A, b: &B) -> std::result::Result<(), TestCaseError>
where
    A: GroupingReader<User, Role>,
    B: GroupingReader<User, Role>,
{
    let nodes: Vec<Subject> = (0..4u8)
        .map(|i| user(&i.to_string()))
        .chain((0..6u8).map(|i| nested(&i.to_string())))
        .collect();
    for node in &nodes {
        prop_assert_eq!(a.groups_of(node).unwrap(), b.groups_of(node).unwrap());
        for i in 0..6u8 {
            let r = role(&i.to_string());
            prop_assert_eq!(a.is_in(node, &r).unwrap(), b.is_in(node, &r).unwrap());
        }
    }
    for i in 0..6u8 {
        let r = role(&i.to_string());
        prop_assert_eq!(a.members_in(&r).unwrap(), b.members_in(&r).unwrap());
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_memoized_agrees_with_direct(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut direct = DirectGrouping::<User, Role>::new();
        let mut memo = MemoizedGrouping::<User, Role>::new();
        for op in &ops {
            prop_assert_eq!(apply(&mut direct, op), apply(&mut memo, op));
        }
        assert_agree(&direct, &memo)?;
    }

    #[test]
    fn prop_bounded_engines_agree(
        ops in prop::collection::vec(arb_op(), 0..40),
        depth in 1..4usize,
    ) {
        let mut direct = DirectGrouping::<User, Role>::with_max_depth(Some(depth));
        let mut memo = MemoizedGrouping::<User, Role>::with_max_depth(Some(depth));
        for op in &ops {
            prop_assert_eq!(apply(&mut direct, op), apply(&mut memo, op));
        }
        assert_agree(&direct, &memo)?;
    }

    #[test]
    fn prop_repeated_join_changes_nothing(
        ops in prop::collection::vec(arb_op(), 0..20),
        s in arb_subject(),
        r in arb_role(),
    ) {
        let mut once = MemoizedGrouping::<User, Role>::new();
        for op in &ops {
            apply(&mut once, op);
        }
        once.join(&s, &r).unwrap();
        let mut twice = once.clone();
        twice.join(&s, &r).unwrap();
        assert_agree(&once, &twice)?;
        prop_assert_eq!(
            once.immediate_entities_in(&r).unwrap(),
            twice.immediate_entities_in(&r).unwrap()
        );
    }
}
