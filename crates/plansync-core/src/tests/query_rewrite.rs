use crate::query::{
    repair_missing_iteration_path, rewrite_project_paths, rewrite_work_item_ids,
};
use crate::reflected::ReflectedLinkRegistry;
use crate::test_support::FakeProject;
use crate::{StoreId, WorkItemId};

fn target_with_mirror(source_id: &str, target_id: &str) -> FakeProject {
    let target = FakeProject::new("target-store", "Proj1-New");
    target.add_mirrored_work_item(
        target_id,
        &StoreId::new("source-store"),
        &WorkItemId::new(source_id),
        "Test Case",
        "mirrored",
    );
    target
}

#[test]
fn project_rename_replaces_quoted_path_literals() {
    let rewritten = rewrite_project_paths(
        "SELECT * FROM WorkItems WHERE [System.AreaPath] UNDER 'Proj1\\Web'",
        "Proj1",
        "Proj1-New",
        false,
    );
    assert_eq!(
        rewritten,
        "SELECT * FROM WorkItems WHERE [System.AreaPath] UNDER 'Proj1-New\\Web'"
    );
}

#[test]
fn project_rename_is_a_noop_when_names_match() {
    let query = "[System.AreaPath] UNDER 'Proj1\\Web'";
    assert_eq!(rewrite_project_paths(query, "Proj1", "Proj1", false), query);
}

#[test]
fn project_rename_prefixes_when_configured() {
    let rewritten = rewrite_project_paths(
        "[System.IterationPath] UNDER 'Proj1\\Sprint 3'",
        "Proj1",
        "Proj1-New",
        true,
    );
    assert_eq!(
        rewritten,
        "[System.IterationPath] UNDER 'Proj1-New\\Proj1\\Sprint 3'"
    );
}

#[test]
fn project_rename_does_not_touch_unquoted_occurrences() {
    let rewritten = rewrite_project_paths("[System.Title] CONTAINS 'x Proj1'", "Proj1", "New", false);
    assert_eq!(rewritten, "[System.Title] CONTAINS 'x Proj1'");
}

#[tokio::test]
async fn equality_clause_is_rewritten_to_the_migrated_id() {
    let target = target_with_mirror("55", "900");
    let registry = ReflectedLinkRegistry::new(StoreId::new("source-store"), &target);

    let renamed = rewrite_project_paths(
        "[System.Id] = 55 AND [System.TeamProject] = 'Proj1'",
        "Proj1",
        "Proj1-New",
        false,
    );
    let outcome = rewrite_work_item_ids(&renamed, &registry)
        .await
        .expect("rewrite ids");

    assert_eq!(
        outcome.query,
        "[System.Id] = 900 AND [System.TeamProject] = 'Proj1-New'"
    );
    assert!(outcome.unresolved.is_empty());
}

#[tokio::test]
async fn unresolved_id_is_left_as_is_and_reported() {
    let target = FakeProject::new("target-store", "Proj1-New");
    let registry = ReflectedLinkRegistry::new(StoreId::new("source-store"), &target);

    let outcome = rewrite_work_item_ids("[System.Id] = 55", &registry)
        .await
        .expect("rewrite ids");

    assert_eq!(outcome.query, "[System.Id] = 55");
    assert_eq!(outcome.unresolved, vec![WorkItemId::new("55")]);
}

#[tokio::test]
async fn in_list_rewrites_only_resolved_ids() {
    let target = target_with_mirror("55", "900");
    let registry = ReflectedLinkRegistry::new(StoreId::new("source-store"), &target);

    let outcome = rewrite_work_item_ids("[System.Id] IN (55, 77)", &registry)
        .await
        .expect("rewrite ids");

    assert_eq!(outcome.query, "[System.Id] IN (900, 77)");
    assert_eq!(outcome.unresolved, vec![WorkItemId::new("77")]);
}

#[tokio::test]
async fn id_matching_is_case_insensitive() {
    let target = target_with_mirror("55", "900");
    let registry = ReflectedLinkRegistry::new(StoreId::new("source-store"), &target);

    let outcome = rewrite_work_item_ids("[system.id] = 55", &registry)
        .await
        .expect("rewrite ids");
    assert_eq!(outcome.query, "[system.id] = 900");
}

#[test]
fn iteration_path_repair_replaces_the_missing_segment() {
    let repaired = repair_missing_iteration_path(
        "[System.IterationPath] UNDER 'Proj1\\Sprint 9'",
        "The specified iteration path does not exist: 'Proj1\\Sprint 9'",
        "Proj1",
        "Proj1-New",
    )
    .expect("repair applies");
    assert_eq!(repaired, "[System.IterationPath] UNDER 'Proj1-New'");
}

#[test]
fn iteration_path_repair_handles_already_renamed_paths() {
    let repaired = repair_missing_iteration_path(
        "[System.IterationPath] UNDER 'Proj1-New\\Sprint 9'",
        "The specified iteration path does not exist: 'Proj1-New\\Sprint 9'",
        "Proj1",
        "Proj1-New",
    )
    .expect("repair applies");
    assert_eq!(repaired, "[System.IterationPath] UNDER 'Proj1-New'");
}

#[test]
fn unrelated_errors_do_not_trigger_the_repair() {
    assert!(repair_missing_iteration_path(
        "[System.Id] = 1",
        "some other failure",
        "Proj1",
        "Proj1-New",
    )
    .is_none());
}
