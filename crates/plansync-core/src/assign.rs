use tracing::{debug, warn};

use crate::adapters::TestStore;
use crate::configs::{configuration_names_match, ConfigurationReconciler};
use crate::error::StoreError;
use crate::identity::IdentityTranslator;
use crate::model::{SuiteKey, TestPlan, TestPointAssignment};
use crate::reflected::ReflectedLinkRegistry;
use crate::report::{EntityKind, RunReporter};

/// Traversal context for pass 2. By this pass the target tree exists, so
/// source/target nodes are paired via reflected links, never by title.
pub(crate) struct AssignContext<'a> {
    pub target_store: &'a dyn TestStore,
    pub registry: &'a ReflectedLinkRegistry<'a>,
    pub reconciler: &'a ConfigurationReconciler,
    pub translator: IdentityTranslator<'a>,
    pub reporter: &'a mut RunReporter,
}

/// Pass 2: walk the synchronized pair of trees, reconcile entry-level
/// configuration sets, and apply (configuration, tester) assignments per test
/// case, batched into one store write per suite.
pub(crate) async fn apply_assignments(
    ctx: &mut AssignContext<'_>,
    source_plan: &TestPlan,
    target_plan: &TestPlan,
) -> Result<(), StoreError> {
    let mut stack: Vec<(SuiteKey, SuiteKey)> = vec![(source_plan.root, target_plan.root)];
    while let Some((source_key, target_key)) = stack.pop() {
        apply_suite_assignments(ctx, source_plan, source_key, target_plan, target_key).await?;

        // Child suites of any container kind participate; each source child is
        // matched to its migrated counterpart through the reflected link on
        // its work item.
        for &child in &source_plan.suites.node(source_key).children {
            let child_node = source_plan.suites.node(child);
            let Some(linked) = ctx.registry.find(&child_node.work_item).await? else {
                ctx.reporter.skipped(
                    EntityKind::Suite,
                    &child_node.title,
                    "suite cannot be found in the target store; has it been migrated?",
                );
                continue;
            };
            let Some(target_child) = target_plan.suites.child_by_work_item(target_key, &linked.id)
            else {
                ctx.reporter.skipped(
                    EntityKind::Suite,
                    &child_node.title,
                    "migrated suite is not a child of the expected target parent",
                );
                continue;
            };
            stack.push((child, target_child));
        }
    }
    Ok(())
}

async fn apply_suite_assignments(
    ctx: &mut AssignContext<'_>,
    source_plan: &TestPlan,
    source_key: SuiteKey,
    target_plan: &TestPlan,
    target_key: SuiteKey,
) -> Result<(), StoreError> {
    let source_node = source_plan.suites.node(source_key);
    let target_node = target_plan.suites.node(target_key);
    debug!(title = %source_node.title, "applying configurations and tester assignments");

    let mut batch: Vec<TestPointAssignment> = Vec::new();
    for entry in &source_node.test_cases {
        let Some(target_work_item) = ctx.registry.find(&entry.work_item).await? else {
            ctx.reporter.skipped(
                EntityKind::TestCaseLink,
                &entry.title,
                "work item cannot be found in the target store; has it been migrated?",
            );
            continue;
        };
        let Some(target_entry) = target_node.entry(&target_work_item.id) else {
            ctx.reporter.skipped(
                EntityKind::TestCaseLink,
                &entry.title,
                "test case is not a member of the target suite; cannot apply configurations",
            );
            continue;
        };

        // Entry-level configuration sets (distinct from the suite default
        // set): recomputed and reapplied wholesale when the name sets differ.
        if !entry.configurations.is_empty()
            && !configuration_names_match(&entry.configurations, &target_entry.configurations)
        {
            let resolved = ctx.reconciler.resolve_set(&entry.configurations);
            for dropped in &resolved.dropped {
                ctx.reporter.warning(
                    EntityKind::Configuration,
                    dropped.clone(),
                    "no configuration with this name in the target store; dropped from entry set",
                );
            }
            if let Err(err) = ctx
                .target_store
                .set_entry_configurations(
                    &target_node.suite_id,
                    &target_work_item.id,
                    &resolved.resolved,
                )
                .await
            {
                if err.is_fatal() {
                    return Err(err);
                }
                warn!(case = %entry.title, error = %err, "failed to apply entry configurations");
            }
        }

        for point in &entry.point_assignments {
            let Some(configuration) = ctx.reconciler.translate_id(&point.configuration) else {
                let name = ctx
                    .reconciler
                    .source_name(&point.configuration)
                    .unwrap_or("<unknown>");
                ctx.reporter.skipped(
                    EntityKind::PointAssignment,
                    &entry.title,
                    format!("cannot find configuration [{name}] in the target store; cannot assign tester to it"),
                );
                continue;
            };

            let tester = match &point.tester {
                Some(descriptor) => match ctx.translator.translate(descriptor).await {
                    Ok(Some(identity)) => Some(identity.user_id),
                    Ok(None) => {
                        // Unresolvable identities still produce a point; it is
                        // submitted unassigned.
                        ctx.reporter.warning(
                            EntityKind::Identity,
                            descriptor.as_str(),
                            "tester could not be translated; point will be unassigned",
                        );
                        None
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!(descriptor = %descriptor, error = %err, "identity lookup failed; point will be unassigned");
                        None
                    }
                },
                None => None,
            };

            batch.push(TestPointAssignment {
                test_case: target_work_item.id.clone(),
                configuration,
                tester,
            });
        }
    }

    if batch.is_empty() {
        return Ok(());
    }
    let submitted = batch.len();
    match ctx
        .target_store
        .assign_test_points(&target_node.suite_id, batch)
        .await
    {
        Ok(()) => {
            ctx.reporter.created(
                EntityKind::PointAssignment,
                format!("{} ({submitted} points)", source_node.title),
            );
        }
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            ctx.reporter.failed(
                EntityKind::PointAssignment,
                &source_node.title,
                err.to_string(),
            );
        }
    }
    Ok(())
}
