use plansync_core::test_support::{FakeProject, NullFieldMapper};
use plansync_core::{
    MigrationEngine, MigrationOptions, ProcessingStatus, RunReport, StoreContext, SuiteKind,
    WorkItemId,
};

fn store_context(project: &FakeProject) -> StoreContext<'_> {
    StoreContext {
        store_id: project.store_id.clone(),
        project: project.project.clone(),
        test_store: project,
        work_items: project,
        identities: project,
    }
}

async fn synchronize(source: &FakeProject, target: &FakeProject) -> RunReport {
    let mapper = NullFieldMapper;
    let engine = MigrationEngine::new(
        store_context(source),
        store_context(target),
        MigrationOptions::default(),
        &mapper,
    );
    engine.synchronize().await
}

fn seed_tree(source: &FakeProject, target: &FakeProject) {
    let plan = source.add_plan("Release1", &[]);
    let smoke = source.add_suite(&plan, None, SuiteKind::Static, "Smoke", &[]);
    let deep = source.add_suite(&plan, Some(&smoke), SuiteKind::Static, "Deep", &[]);
    source.add_suite(&plan, None, SuiteKind::Static, "Regression", &[]);
    source.add_case(&smoke, "101", "Login works", &[]);
    source.add_case(&deep, "102", "Logout works", &[]);
    target.add_mirrored_test_case("901", &source.store_id, &WorkItemId::new("101"), "Login works");
    target.add_mirrored_test_case("902", &source.store_id, &WorkItemId::new("102"), "Logout works");
}

#[tokio::test]
async fn second_run_against_unchanged_source_creates_nothing() {
    let source = FakeProject::new("source-store", "Proj1");
    let target = FakeProject::new("target-store", "Proj1-New");
    seed_tree(&source, &target);

    let first = synchronize(&source, &target).await;
    assert_eq!(first.plans.created, 1);
    assert_eq!(first.suites.created, 3);
    assert_eq!(first.test_case_links.created, 2);

    let second = synchronize(&source, &target).await;
    assert_eq!(second.plans.created, 0);
    assert_eq!(second.suites.created, 0);
    assert_eq!(second.test_case_links.created, 0);
    assert_eq!(second.plans.matched, 1);
    assert_eq!(second.suites.matched, 3);
    assert_eq!(second.test_case_links.matched, 2);
}

#[tokio::test]
async fn adding_one_source_case_adds_exactly_one_target_entry() {
    let source = FakeProject::new("source-store", "Proj1");
    let target = FakeProject::new("target-store", "Proj1-New");
    seed_tree(&source, &target);
    synchronize(&source, &target).await;

    let migrated = target.plan_by_name("Release1").expect("plan migrated");
    let smoke_key = migrated
        .suites
        .child_by_title(migrated.root, "Smoke")
        .expect("smoke");
    let before: Vec<WorkItemId> = migrated
        .suites
        .node(smoke_key)
        .test_cases
        .iter()
        .map(|entry| entry.work_item.clone())
        .collect();

    let source_smoke_suite = {
        let plan = source.plan_by_name("Release1").expect("source plan");
        let smoke_key = plan
            .suites
            .child_by_title(plan.root, "Smoke")
            .expect("source smoke");
        plan.suites.node(smoke_key).suite_id.clone()
    };
    source.add_case(&source_smoke_suite, "103", "Password reset", &[]);
    target.add_mirrored_test_case("903", &source.store_id, &WorkItemId::new("103"), "Password reset");

    let report = synchronize(&source, &target).await;
    assert_eq!(report.test_case_links.created, 1);
    assert_eq!(report.test_case_links.matched, 2);

    let migrated = target.plan_by_name("Release1").expect("plan migrated");
    let smoke_key = migrated
        .suites
        .child_by_title(migrated.root, "Smoke")
        .expect("smoke");
    let after: Vec<WorkItemId> = migrated
        .suites
        .node(smoke_key)
        .test_cases
        .iter()
        .map(|entry| entry.work_item.clone())
        .collect();

    assert_eq!(after.len(), before.len() + 1);
    assert!(after.starts_with(&before), "existing entries untouched");
    assert_eq!(after.last(), Some(&WorkItemId::new("903")));
}

#[tokio::test]
async fn target_topology_mirrors_source_topology() {
    let source = FakeProject::new("source-store", "Proj1");
    let target = FakeProject::new("target-store", "Proj1-New");
    seed_tree(&source, &target);
    synchronize(&source, &target).await;

    let source_plan = source.plan_by_name("Release1").expect("source plan");
    let target_plan = target.plan_by_name("Release1").expect("target plan");

    fn shape(plan: &plansync_core::TestPlan, key: plansync_core::SuiteKey) -> Vec<(String, usize)> {
        let node = plan.suites.node(key);
        let mut out = vec![(node.title.clone(), node.children.len())];
        for &child in &node.children {
            out.extend(shape(plan, child));
        }
        out
    }

    let source_shape: Vec<(String, usize)> = source_plan
        .suites
        .node(source_plan.root)
        .children
        .iter()
        .flat_map(|&child| shape(&source_plan, child))
        .collect();
    let target_shape: Vec<(String, usize)> = target_plan
        .suites
        .node(target_plan.root)
        .children
        .iter()
        .flat_map(|&child| shape(&target_plan, child))
        .collect();
    assert_eq!(source_shape, target_shape);
}

#[tokio::test]
async fn run_report_serializes_and_round_trips() {
    let source = FakeProject::new("source-store", "Proj1");
    let target = FakeProject::new("target-store", "Proj1-New");
    seed_tree(&source, &target);

    let report = synchronize(&source, &target).await;
    assert_eq!(report.status, ProcessingStatus::Complete);

    let json = serde_json::to_string(&report).expect("serialize report");
    let parsed: RunReport = serde_json::from_str(&json).expect("deserialize report");
    assert_eq!(parsed, report);
}
