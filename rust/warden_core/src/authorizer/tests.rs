//! Authorizer behavior and the cache invariant: after any sequence of
//! writes, every cached cell equals full resolution.

use proptest::prelude::*;

use super::*;
use crate::grouping::DirectGrouping;

// ============================================================================
// Helper builders
// ============================================================================

fn user(id: &str) -> Subject {
    Entity::Individual(User::new(id))
}

fn role(id: &str) -> Subject {
    Entity::Group(Role::new(id))
}

fn article(id: &str) -> Object {
    Entity::Individual(Article::new(id))
}

fn category(id: &str) -> Object {
    Entity::Group(Category::new(id))
}

fn r(id: &str) -> Role {
    Role::new(id)
}

fn c(id: &str) -> Category {
    Category::new(id)
}

/// No groupings on either side.
fn flat() -> Authorizer {
    Authorizer::builder().build().unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn role_grant_reaches_joined_user_until_revoked() {
    let mut a = Authorizer::new();
    a.permit(
        &role("2_1"),
        &article("project apollo"),
        ActionSet::READ_WRITE_EXEC,
    )
    .unwrap();
    a.subject_join(&user("5"), &r("2_1")).unwrap();

    assert!(a
        .shall(&user("5"), &article("project apollo"), ActionSet::EXEC)
        .unwrap());

    a.revoke(&role("2_1"), &article("project apollo"), ActionSet::EXEC)
        .unwrap();
    assert!(!a
        .shall(&user("5"), &article("project apollo"), ActionSet::EXEC)
        .unwrap());
    assert!(a
        .shall(&user("5"), &article("project apollo"), ActionSet::READ_WRITE)
        .unwrap());
}

#[test]
fn removing_category_drops_its_grants() {
    let mut a = Authorizer::new();
    a.object_join(&article("manhattan project"), &c("war"))
        .unwrap();
    a.permit(&user("karman"), &category("war"), ActionSet::READ)
        .unwrap();

    assert!(a
        .shall(&user("karman"), &article("manhattan project"), ActionSet::READ)
        .unwrap());

    a.remove_category(&c("war")).unwrap();
    assert!(!a
        .shall(&user("karman"), &article("manhattan project"), ActionSet::READ)
        .unwrap());
    assert!(a.grants().unwrap().is_empty());
    assert!(a.cache().is_empty());
}

#[test]
fn removing_outer_role_ends_nested_membership() {
    let mut a = Authorizer::new();
    a.subject_join(&role("2_0"), &r("even")).unwrap();
    a.subject_join(&user("4"), &r("2_0")).unwrap();

    assert!(a.is_in_role(&user("4"), &r("even")).unwrap());

    a.remove_role(&r("even")).unwrap();
    assert!(!a.is_in_role(&user("4"), &r("even")).unwrap());
    assert!(a.is_in_role(&user("4"), &r("2_0")).unwrap());
}

// ============================================================================
// Cache repair
// ============================================================================

#[test]
fn join_order_does_not_matter() {
    let mut before = Authorizer::new();
    before.subject_join(&user("1"), &r("staff")).unwrap();
    before.object_join(&article("a"), &c("docs")).unwrap();
    before
        .permit(&role("staff"), &category("docs"), ActionSet::READ)
        .unwrap();

    let mut after = Authorizer::new();
    after
        .permit(&role("staff"), &category("docs"), ActionSet::READ)
        .unwrap();
    after.subject_join(&user("1"), &r("staff")).unwrap();
    after.object_join(&article("a"), &c("docs")).unwrap();

    assert_eq!(before.cache(), after.cache());
    assert_eq!(
        after.cache().get(&User::new("1"), &Article::new("a")),
        ActionSet::READ
    );
}

#[test]
fn leave_keeps_actions_granted_by_another_path() {
    let mut a = Authorizer::new();
    a.permit(&role("r1"), &article("x"), ActionSet::READ).unwrap();
    a.permit(&role("r2"), &article("x"), ActionSet::READ_WRITE)
        .unwrap();
    a.subject_join(&user("1"), &r("r1")).unwrap();
    a.subject_join(&user("1"), &r("r2")).unwrap();

    a.subject_leave(&user("1"), &r("r2")).unwrap();
    assert_eq!(
        a.permitted_actions(&user("1"), &article("x")).unwrap(),
        ActionSet::READ
    );

    a.subject_leave(&user("1"), &r("r1")).unwrap();
    assert!(a.cache().row(&User::new("1")).is_none());
}

#[test]
fn object_leave_recomputes_holders() {
    let mut a = Authorizer::new();
    a.object_join(&article("x"), &c("inner")).unwrap();
    a.object_join(&category("inner"), &c("outer")).unwrap();
    a.permit(&user("1"), &category("outer"), ActionSet::EXEC)
        .unwrap();
    a.permit(&user("2"), &article("x"), ActionSet::READ).unwrap();
    assert_eq!(a.cache().len(), 2);

    a.object_leave(&category("inner"), &c("outer")).unwrap();
    assert!(a
        .permitted_actions(&user("1"), &article("x"))
        .unwrap()
        .is_empty());
    assert_eq!(
        a.permitted_actions(&user("2"), &article("x")).unwrap(),
        ActionSet::READ
    );
}

#[test]
fn cyclic_roles_resolve() {
    let mut a = Authorizer::new();
    a.subject_join(&role("a"), &r("b")).unwrap();
    a.subject_join(&role("b"), &r("a")).unwrap();
    a.subject_join(&user("1"), &r("a")).unwrap();
    a.permit(&role("b"), &article("x"), ActionSet::WRITE).unwrap();

    assert!(a.shall(&user("1"), &article("x"), ActionSet::WRITE).unwrap());
    assert!(a.shall(&role("a"), &article("x"), ActionSet::WRITE).unwrap());
}

#[test]
fn set_permission_replaces_the_grant() {
    let mut a = Authorizer::new();
    a.subject_join(&user("1"), &r("staff")).unwrap();
    a.permit(&role("staff"), &article("x"), ActionSet::READ_WRITE)
        .unwrap();

    a.set_permission(&role("staff"), &article("x"), ActionSet::EXEC)
        .unwrap();
    assert_eq!(
        a.direct_actions(&role("staff"), &article("x")).unwrap(),
        ActionSet::EXEC
    );
    assert_eq!(
        a.permitted_actions(&user("1"), &article("x")).unwrap(),
        ActionSet::EXEC
    );

    a.set_permission(&role("staff"), &article("x"), ActionSet::EMPTY)
        .unwrap();
    assert!(a.grants().unwrap().is_empty());
    assert!(a.cache().is_empty());
}

#[test]
fn remove_user_and_article_drop_everything_they_touch() {
    let mut a = Authorizer::new();
    a.subject_join(&user("1"), &r("staff")).unwrap();
    a.object_join(&article("x"), &c("docs")).unwrap();
    a.permit(&user("1"), &article("y"), ActionSet::READ).unwrap();
    a.permit(&user("2"), &article("x"), ActionSet::READ).unwrap();

    a.remove_user(&User::new("1")).unwrap();
    assert!(a.users_in(&r("staff")).unwrap().is_empty());
    assert!(a.cache().row(&User::new("1")).is_none());

    a.remove_article(&Article::new("x")).unwrap();
    assert!(a.articles_in(&c("docs")).unwrap().is_empty());
    assert!(a.grants().unwrap().is_empty());
    assert!(a.cache().is_empty());
}

#[test]
fn group_queries_fall_through_to_resolution() {
    let mut a = Authorizer::new();
    a.subject_join(&role("junior"), &r("staff")).unwrap();
    a.object_join(&category("drafts"), &c("docs")).unwrap();
    a.permit(&role("staff"), &category("docs"), ActionSet::READ)
        .unwrap();

    assert!(a
        .shall(&role("junior"), &category("drafts"), ActionSet::READ)
        .unwrap());
    let on = a.permissions_on(&category("drafts")).unwrap();
    assert_eq!(on[&role("staff")], ActionSet::READ);
    let held = a.permissions_for(&role("junior")).unwrap();
    assert_eq!(held[&category("docs")], ActionSet::READ);
}

#[test]
fn build_computes_cache_from_prepopulated_engines() {
    let mut roles = MemoizedGrouping::<User, Role>::new();
    roles.join(&user("1"), &r("staff")).unwrap();
    let mut permissions = DirectPermissions::new();
    permissions
        .permit(&role("staff"), &article("x"), ActionSet::READ)
        .unwrap();

    let a = Authorizer::builder()
        .with_subject_grouping(roles)
        .with_object_grouping(MemoizedGrouping::new())
        .with_permissions(permissions)
        .build()
        .unwrap();

    assert_eq!(
        a.cache().get(&User::new("1"), &Article::new("x")),
        ActionSet::READ
    );
}

#[test]
fn custom_vocabulary_is_owned_by_the_instance() {
    let vocab = ActionVocabulary::new(["view", "edit", "publish", "archive"]).unwrap();
    let mut a = Authorizer::builder()
        .with_subject_grouping(MemoizedGrouping::new())
        .with_object_grouping(MemoizedGrouping::new())
        .with_vocabulary(vocab)
        .build()
        .unwrap();
    let all = a.vocabulary().all();
    let publish = a.vocabulary().parse(&["publish"]).unwrap();

    a.permit(&user("1"), &article("x"), all).unwrap();
    assert!(a.shall(&user("1"), &article("x"), publish).unwrap());
    assert_eq!(Authorizer::new().vocabulary().all(), ActionSet::READ_WRITE_EXEC);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn group_arguments_need_a_configured_grouping() {
    let mut a = flat();
    let no_roles = AuthzError::GroupingNotConfigured(Side::Subject);
    let no_categories = AuthzError::GroupingNotConfigured(Side::Object);

    assert_eq!(
        a.permit(&role("r"), &article("x"), ActionSet::READ),
        Err(no_roles.clone())
    );
    assert_eq!(
        a.shall(&user("1"), &category("c"), ActionSet::READ),
        Err(no_categories.clone())
    );
    assert_eq!(a.is_in_role(&user("1"), &r("r")), Err(no_roles.clone()));
    assert_eq!(a.subject_join(&user("1"), &r("r")), Err(no_roles));
    assert_eq!(a.remove_category(&c("c")), Err(no_categories));

    // Individuals still work without any grouping.
    a.permit(&user("1"), &article("x"), ActionSet::READ).unwrap();
    assert!(a.shall(&user("1"), &article("x"), ActionSet::READ).unwrap());
    a.remove_user(&User::new("1")).unwrap();
    assert!(a.cache().is_empty());
}

#[test]
fn build_rejects_group_grants_without_grouping() {
    let mut permissions = DirectPermissions::new();
    permissions
        .permit(&user("1"), &category("c"), ActionSet::READ)
        .unwrap();

    let result = Authorizer::builder()
        .with_subject_grouping(MemoizedGrouping::new())
        .with_permissions(permissions)
        .build();
    assert_eq!(
        result.err(),
        Some(AuthzError::GroupingNotConfigured(Side::Object))
    );
}

#[test]
fn leaving_a_missing_edge_is_not_found() {
    let mut a = Authorizer::new();
    assert!(matches!(
        a.subject_leave(&user("1"), &r("r")),
        Err(AuthzError::NotFound(_))
    ));
    assert!(matches!(
        a.object_leave(&article("x"), &c("c")),
        Err(AuthzError::NotFound(_))
    ));
}

#[test]
fn revoking_absent_actions_changes_nothing() {
    let mut a = Authorizer::new();
    a.permit(&user("1"), &article("x"), ActionSet::READ).unwrap();
    let before = a.cache().clone();

    a.revoke(&user("1"), &article("x"), ActionSet::EXEC).unwrap();
    a.revoke(&user("2"), &article("y"), ActionSet::READ).unwrap();
    assert_eq!(a.cache(), &before);
    assert_eq!(a.grants().unwrap().len(), 1);
}

// ============================================================================
// Cache invariant
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Permit(Subject, Object, ActionSet),
    Revoke(Subject, Object, ActionSet),
    Set(Subject, Object, ActionSet),
    SubjectJoin(Subject, Role),
    SubjectLeave(Subject, Role),
    ObjectJoin(Object, Category),
    ObjectLeave(Object, Category),
    RemoveUser(User),
    RemoveRole(Role),
    RemoveArticle(Article),
    RemoveCategory(Category),
}

const USERS: u8 = 4;
const ARTICLES: u8 = 4;

fn arb_subject() -> impl Strategy<Value = Subject> {
    prop_oneof![
        (0..USERS).prop_map(|i| user(&i.to_string())),
        (0u8..3).prop_map(|i| role(&i.to_string())),
    ]
}

fn arb_object() -> impl Strategy<Value = Object> {
    prop_oneof![
        (0..ARTICLES).prop_map(|i| article(&i.to_string())),
        (0u8..3).prop_map(|i| category(&i.to_string())),
    ]
}

fn arb_actions() -> impl Strategy<Value = ActionSet> {
    (0u32..8).prop_map(ActionSet::from_bits)
}

fn arb_op() -> impl Strategy<Value = Op> {
    let role = (0u8..3).prop_map(|i| r(&i.to_string()));
    let cat = (0u8..3).prop_map(|i| c(&i.to_string()));
    prop_oneof![
        4 => (arb_subject(), arb_object(), arb_actions()).prop_map(|(s, o, a)| Op::Permit(s, o, a)),
        2 => (arb_subject(), arb_object(), arb_actions()).prop_map(|(s, o, a)| Op::Revoke(s, o, a)),
        1 => (arb_subject(), arb_object(), arb_actions()).prop_map(|(s, o, a)| Op::Set(s, o, a)),
        3 => (arb_subject(), role.clone()).prop_map(|(s, g)| Op::SubjectJoin(s, g)),
        1 => (arb_subject(), role.clone()).prop_map(|(s, g)| Op::SubjectLeave(s, g)),
        3 => (arb_object(), cat.clone()).prop_map(|(o, g)| Op::ObjectJoin(o, g)),
        1 => (arb_object(), cat.clone()).prop_map(|(o, g)| Op::ObjectLeave(o, g)),
        1 => (0..USERS).prop_map(|i| Op::RemoveUser(User::new(i.to_string()))),
        1 => role.prop_map(Op::RemoveRole),
        1 => (0..ARTICLES).prop_map(|i| Op::RemoveArticle(Article::new(i.to_string()))),
        1 => cat.prop_map(Op::RemoveCategory),
    ]
}

fn apply<S, O>(a: &mut Authorizer<S, O>, op: &Op)
where
    S: Grouping<User, Role>,
    O: Grouping<Article, Category>,
{
    // Leaving a missing edge is an expected NotFound; nothing else may fail.
    let result = match op {
        Op::Permit(s, o, act) => a.permit(s, o, *act),
        Op::Revoke(s, o, act) => a.revoke(s, o, *act),
        Op::Set(s, o, act) => a.set_permission(s, o, *act),
        Op::SubjectJoin(s, g) => a.subject_join(s, g),
        Op::SubjectLeave(s, g) => a.subject_leave(s, g),
        Op::ObjectJoin(o, g) => a.object_join(o, g),
        Op::ObjectLeave(o, g) => a.object_leave(o, g),
        Op::RemoveUser(u) => a.remove_user(u),
        Op::RemoveRole(g) => a.remove_role(g),
        Op::RemoveArticle(x) => a.remove_article(x),
        Op::RemoveCategory(g) => a.remove_category(g),
    };
    if let Err(err) = result {
        assert!(matches!(err, AuthzError::NotFound(_)), "unexpected {err:?} for {op:?}");
    }
}

fn assert_cache_matches_resolution<S, O>(a: &Authorizer<S, O>) -> std::result::Result<(), TestCaseError>
where
    S: Grouping<User, Role> + Clone,
    O: Grouping<Article, Category> + Clone,
{
    for u in 0..USERS {
        for x in 0..ARTICLES {
            let (user, article) = (User::new(u.to_string()), Article::new(x.to_string()));
            let resolved = a
                .resolver()
                .permitted_actions(&Entity::Individual(user.clone()), &Entity::Individual(article.clone()))
                .unwrap();
            prop_assert_eq!(a.cache().get(&user, &article), resolved, "{} on {}", user, article);
        }
    }

    let mut rebuilt = a.clone();
    rebuilt.rebuild_cache().unwrap();
    prop_assert_eq!(rebuilt.cache(), a.cache());
    Ok(())
}

proptest! {
    #[test]
    fn prop_cache_matches_resolution(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut a = Authorizer::new();
        for op in &ops {
            apply(&mut a, op);
        }
        assert_cache_matches_resolution(&a)?;
    }

    #[test]
    fn prop_cache_matches_resolution_with_direct_groupings(
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut a = Authorizer::builder()
            .with_subject_grouping(DirectGrouping::new())
            .with_object_grouping(DirectGrouping::new())
            .build()
            .unwrap();
        for op in &ops {
            apply(&mut a, op);
        }
        assert_cache_matches_resolution(&a)?;
    }

    #[test]
    fn prop_cache_matches_resolution_under_depth_bound(
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut a = Authorizer::builder()
            .with_subject_grouping(MemoizedGrouping::with_max_depth(Some(2)))
            .with_object_grouping(MemoizedGrouping::with_max_depth(Some(2)))
            .build()
            .unwrap();
        for op in &ops {
            apply(&mut a, op);
        }
        assert_cache_matches_resolution(&a)?;
    }
}
