use crate::configs::{configuration_names_match, ConfigurationReconciler};
use crate::error::StoreError;
use crate::identity::IdentityTranslator;
use crate::model::IdAndName;
use crate::reflected::{ReflectedLink, ReflectedLinkRegistry};
use crate::test_support::FakeProject;
use crate::{ConfigurationId, StoreId, WorkItemId};

fn reconciler(source: &[(&str, &str)], target: &[(&str, &str)]) -> ConfigurationReconciler {
    let source: Vec<IdAndName> = source
        .iter()
        .map(|(id, name)| IdAndName::new(*id, *name))
        .collect();
    let target: Vec<IdAndName> = target
        .iter()
        .map(|(id, name)| IdAndName::new(*id, *name))
        .collect();
    ConfigurationReconciler::new(&source, &target)
}

#[test]
fn resolved_set_is_a_subset_of_the_source_names() {
    let reconciler = reconciler(
        &[("s1", "Chrome"), ("s2", "Firefox"), ("s3", "Edge")],
        &[("t1", "Chrome"), ("t2", "Edge")],
    );
    let source_set = vec![
        IdAndName::new("s1", "Chrome"),
        IdAndName::new("s2", "Firefox"),
        IdAndName::new("s3", "Edge"),
    ];
    let outcome = reconciler.resolve_set(&source_set);

    let resolved_names: Vec<&str> = outcome.resolved.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(resolved_names, vec!["Chrome", "Edge"]);
    assert_eq!(outcome.dropped, vec!["Firefox".to_owned()]);
    // Target ids, not source ids.
    assert_eq!(outcome.resolved[0].id, ConfigurationId::new("t1"));
}

#[test]
fn translate_id_goes_through_the_shared_name() {
    let reconciler = reconciler(&[("s1", "Chrome")], &[("t9", "Chrome")]);
    let translated = reconciler
        .translate_id(&ConfigurationId::new("s1"))
        .expect("translate");
    assert_eq!(translated, IdAndName::new("t9", "Chrome"));
    assert!(reconciler.translate_id(&ConfigurationId::new("s404")).is_none());
}

#[test]
fn name_matching_is_exact_and_case_sensitive() {
    let reconciler = reconciler(&[("s1", "chrome")], &[("t1", "Chrome")]);
    assert!(reconciler.resolve_name("chrome").is_none());
    assert!(reconciler.resolve_name("Chrome").is_some());
}

#[test]
fn first_catalog_entry_wins_on_duplicate_names() {
    let reconciler = reconciler(&[], &[("t1", "Chrome"), ("t2", "Chrome")]);
    assert_eq!(
        reconciler.resolve_name("Chrome"),
        Some(IdAndName::new("t1", "Chrome"))
    );
}

#[test]
fn configuration_name_sets_compare_by_name_only() {
    let left = vec![IdAndName::new("a", "Chrome"), IdAndName::new("b", "Edge")];
    let right = vec![IdAndName::new("x", "Edge"), IdAndName::new("y", "Chrome")];
    assert!(configuration_names_match(&left, &right));
    assert!(!configuration_names_match(&left, &right[..1].to_vec()));
    assert!(configuration_names_match(&[], &[]));
}

#[test]
fn reflected_link_encoding_is_deterministic() {
    let link = ReflectedLink::encode(&StoreId::new("source-store"), &WorkItemId::new("42"));
    assert_eq!(link.as_str(), "source-store/42");
    assert_eq!(
        link,
        ReflectedLink::encode(&StoreId::new("source-store"), &WorkItemId::new("42"))
    );
}

#[tokio::test]
async fn find_returns_none_before_any_stamp() {
    let target = FakeProject::new("target-store", "Proj1-New");
    let registry = ReflectedLinkRegistry::new(StoreId::new("source-store"), &target);
    assert!(registry
        .find(&WorkItemId::new("42"))
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn stamp_persists_and_find_locates_the_entity() {
    let target = FakeProject::new("target-store", "Proj1-New");
    let registry = ReflectedLinkRegistry::new(StoreId::new("source-store"), &target);

    let source_id = WorkItemId::new("42");
    let mut plain = crate::model::WorkItem {
        id: WorkItemId::new("901"),
        item_type: "Test Case".to_owned(),
        title: "case".to_owned(),
        area_path: "Proj1-New".to_owned(),
        iteration_path: "Proj1-New".to_owned(),
        assigned_to: None,
        tags: Vec::new(),
        links: Vec::new(),
        reflected_link: None,
    };
    target.insert_work_item(plain.clone());

    registry.stamp(&mut plain, &source_id).await.expect("stamp");

    let found = registry
        .find(&source_id)
        .await
        .expect("lookup")
        .expect("stamped entity is findable");
    assert_eq!(found.id, WorkItemId::new("901"));
    assert_eq!(
        found.reflected_link,
        Some(ReflectedLink::encode(
            &StoreId::new("source-store"),
            &source_id
        ))
    );
}

#[tokio::test]
async fn stamping_twice_is_rejected() {
    let target = FakeProject::new("target-store", "Proj1-New");
    let registry = ReflectedLinkRegistry::new(StoreId::new("source-store"), &target);

    let mut work_item = crate::model::WorkItem {
        id: WorkItemId::new("901"),
        item_type: "Test Suite".to_owned(),
        title: "suite".to_owned(),
        area_path: "Proj1-New".to_owned(),
        iteration_path: "Proj1-New".to_owned(),
        assigned_to: None,
        tags: Vec::new(),
        links: Vec::new(),
        reflected_link: None,
    };
    target.insert_work_item(work_item.clone());

    registry
        .stamp(&mut work_item, &WorkItemId::new("42"))
        .await
        .expect("first stamp");
    let error = registry
        .stamp(&mut work_item, &WorkItemId::new("43"))
        .await
        .expect_err("second stamp must be rejected");
    assert!(matches!(error, StoreError::InvalidRequest(_)));
}

#[tokio::test]
async fn identity_translates_via_email() {
    let (source, target) = super::source_target();
    let descriptor = source.add_identity("alice-src", "Alice", "alice", Some("alice@co.com"));
    target.add_identity("alice-tgt", "Alice", "alice.target", Some("alice@co.com"));

    let translator = IdentityTranslator::new(&source, &target);
    let identity = translator
        .translate(&descriptor)
        .await
        .expect("lookup")
        .expect("identity resolves");
    assert_eq!(identity.email.as_deref(), Some("alice@co.com"));
    assert_eq!(identity.account_name, "alice.target");
}

#[tokio::test]
async fn identity_refresh_recovers_a_missing_email() {
    let (source, target) = super::source_target();
    let descriptor =
        source.add_identity_needing_refresh("bob-src", "Bob", "bob", "bob@co.com");
    target.add_identity("bob-tgt", "Bob", "bob.target", Some("bob@co.com"));

    let translator = IdentityTranslator::new(&source, &target);
    let identity = translator
        .translate(&descriptor)
        .await
        .expect("lookup")
        .expect("identity resolves after refresh");
    assert_eq!(identity.account_name, "bob.target");
}

#[tokio::test]
async fn identity_falls_back_to_account_name_lookup() {
    let (source, target) = super::source_target();
    let descriptor = source.add_identity("carol-src", "Carol", "carol", Some("carol@co.com"));
    // Target account is keyed by the email string but carries no email
    // attribute, so the email lookup misses.
    target.add_identity("carol-tgt", "Carol", "carol@co.com", None);

    let translator = IdentityTranslator::new(&source, &target);
    let identity = translator
        .translate(&descriptor)
        .await
        .expect("lookup")
        .expect("identity resolves via account name");
    assert_eq!(identity.account_name, "carol@co.com");
}

#[tokio::test]
async fn identity_without_email_translates_to_none() {
    let (source, target) = super::source_target();
    let descriptor = source.add_identity("dave-src", "Dave", "dave", None);
    target.add_identity("dave-tgt", "Dave", "dave", Some("dave@co.com"));

    let translator = IdentityTranslator::new(&source, &target);
    assert!(translator
        .translate(&descriptor)
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn unknown_target_identity_translates_to_none() {
    let (source, target) = super::source_target();
    let descriptor = source.add_identity("erin-src", "Erin", "erin", Some("erin@co.com"));

    let translator = IdentityTranslator::new(&source, &target);
    assert!(translator
        .translate(&descriptor)
        .await
        .expect("lookup")
        .is_none());
}
