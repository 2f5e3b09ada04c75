use tracing::{debug, warn};

use crate::adapters::{FieldMapper, WorkItemStore};
use crate::configs::{configuration_names_match, ConfigurationReconciler};
use crate::engine::{MigrationOptions, StoreContext};
use crate::error::StoreError;
use crate::model::{SuiteHandle, SuiteKey, SuiteKind, SuiteNode, TestCaseEntry, TestPlan};
use crate::query;
use crate::reflected::ReflectedLinkRegistry;
use crate::report::{EntityKind, RunReporter};
use crate::{TestCaseId, WorkItemId};

/// Everything one pass-1 traversal needs, passed explicitly instead of being
/// closed over. The reporter is the only mutable piece.
pub(crate) struct SyncContext<'a> {
    pub source: &'a StoreContext<'a>,
    pub target: &'a StoreContext<'a>,
    pub options: &'a MigrationOptions,
    pub field_mapper: &'a dyn FieldMapper,
    pub registry: &'a ReflectedLinkRegistry<'a>,
    pub reconciler: &'a ConfigurationReconciler,
    pub reporter: &'a mut RunReporter,
}

/// True when a tag filter is configured and the work item does not carry the
/// required tag. Exclusion is deliberate and silent: no trace event.
pub(crate) async fn excluded_by_tag_filter(
    work_items: &dyn WorkItemStore,
    options: &MigrationOptions,
    id: &WorkItemId,
) -> Result<bool, StoreError> {
    let Some(required) = &options.required_tag else {
        return Ok(false);
    };
    let work_item = work_items.get(id).await?;
    Ok(!work_item.has_tag(required))
}

pub(crate) fn translate_path(
    path: &str,
    source_project: &str,
    target_project: &str,
    prefix_project_to_nodes: bool,
) -> String {
    if prefix_project_to_nodes {
        format!("{target_project}\\{path}")
    } else {
        path.replacen(source_project, target_project, 1)
    }
}

/// Pass 1: walk the source suite tree depth-first and produce or locate the
/// matching target tree. The plan is checkpoint-saved after each top-level
/// subtree so a crash leaves a valid prefix of the final tree.
pub(crate) async fn sync_suite_tree(
    ctx: &mut SyncContext<'_>,
    source_plan: &TestPlan,
    target_plan: &mut TestPlan,
    plan_created: bool,
) -> Result<(), StoreError> {
    let source_root = source_plan.root;
    let target_root = target_plan.root;

    apply_default_configurations(ctx, source_plan, source_root, target_plan, target_root).await?;
    let root_pair = (
        source_plan.suites.node(source_root).work_item.clone(),
        target_plan.suites.node(target_root).work_item.clone(),
    );
    if let Err(err) = reconcile_work_item_pair(ctx, &root_pair.0, &root_pair.1, plan_created).await {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(error = %err, "failed to reconcile root suite work item");
    }
    attach_test_cases(ctx, source_plan, source_root, target_plan, target_root).await?;

    let top_level: Vec<SuiteKey> = source_plan.suites.node(source_root).children.clone();
    for subtree_root in top_level {
        sync_subtree(ctx, source_plan, target_plan, subtree_root, target_root).await?;
        ctx.target.test_store.save_plan(&target_plan.id).await?;
    }
    Ok(())
}

async fn sync_subtree(
    ctx: &mut SyncContext<'_>,
    source_plan: &TestPlan,
    target_plan: &mut TestPlan,
    subtree_root: SuiteKey,
    target_parent: SuiteKey,
) -> Result<(), StoreError> {
    let mut stack: Vec<(SuiteKey, SuiteKey)> = vec![(subtree_root, target_parent)];
    while let Some((source_key, target_parent_key)) = stack.pop() {
        let title = source_plan.suites.node(source_key).title.clone();
        let target_key =
            match process_suite(ctx, source_plan, target_plan, source_key, target_parent_key).await
            {
                Ok(resolved) => resolved,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    ctx.reporter
                        .failed(EntityKind::Suite, &title, err.to_string());
                    None
                }
            };
        let Some(target_key) = target_key else {
            continue;
        };

        let source_node = source_plan.suites.node(source_key);
        if matches!(source_node.kind, SuiteKind::Static) {
            if let Err(err) =
                attach_test_cases(ctx, source_plan, source_key, target_plan, target_key).await
            {
                if err.is_fatal() {
                    return Err(err);
                }
                ctx.reporter
                    .failed(EntityKind::Suite, &title, err.to_string());
            }
            for &child in source_node.children.iter().rev() {
                stack.push((child, target_key));
            }
        }
    }
    Ok(())
}

/// Produce or locate the target counterpart of one source suite. Returns the
/// target arena key, or `None` when the node was filtered, skipped, or
/// replaced by a placeholder.
async fn process_suite(
    ctx: &mut SyncContext<'_>,
    source_plan: &TestPlan,
    target_plan: &mut TestPlan,
    source_key: SuiteKey,
    target_parent_key: SuiteKey,
) -> Result<Option<SuiteKey>, StoreError> {
    let source_node = source_plan.suites.node(source_key).clone();

    if excluded_by_tag_filter(ctx.source.work_items, ctx.options, &source_node.work_item).await? {
        debug!(title = %source_node.title, "suite excluded by tag filter");
        return Ok(None);
    }
    debug!(
        title = %source_node.title,
        kind = source_node.kind.label(),
        "processing suite"
    );

    // Title match first; reflected-link fallback covers suites renamed on the
    // source since the previous run.
    let mut existing = target_plan
        .suites
        .child_by_title(target_parent_key, &source_node.title);
    if existing.is_none() {
        if let Some(linked) = ctx.registry.find(&source_node.work_item).await? {
            existing = target_plan
                .suites
                .child_by_work_item(target_parent_key, &linked.id);
        }
    }

    if let Some(target_key) = existing {
        debug!(title = %source_node.title, "suite already present in target");
        apply_default_configurations(ctx, source_plan, source_key, target_plan, target_key)
            .await?;
        let target_work_item = target_plan.suites.node(target_key).work_item.clone();
        if let Err(err) =
            reconcile_work_item_pair(ctx, &source_node.work_item, &target_work_item, false).await
        {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(title = %source_node.title, error = %err, "failed to reconcile matched suite work item");
        }
        ctx.reporter.matched(EntityKind::Suite, &source_node.title);
        return Ok(Some(target_key));
    }

    let created = match &source_node.kind {
        SuiteKind::Static => {
            ctx.target
                .test_store
                .create_static_suite(&source_node.title)
                .await
        }
        SuiteKind::Dynamic { query } => {
            create_dynamic_suite(ctx, &source_node.title, query).await
        }
        SuiteKind::RequirementBased { requirement } => {
            let source_requirement = match ctx.source.work_items.get(requirement).await {
                Ok(work_item) => work_item,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    ctx.reporter.skipped(
                        EntityKind::Suite,
                        &source_node.title,
                        format!("source requirement cannot be loaded: {err}"),
                    );
                    return Ok(None);
                }
            };
            let Some(target_requirement) = ctx.registry.find(&source_requirement.id).await? else {
                ctx.reporter.skipped(
                    EntityKind::Suite,
                    &source_node.title,
                    "requirement has no migrated counterpart in the target store",
                );
                return Ok(None);
            };
            ctx.target
                .test_store
                .create_requirement_suite(&target_requirement, &source_node.title)
                .await
        }
    };

    let handle = match created {
        Ok(handle) => handle,
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            return insert_placeholder(ctx, target_plan, target_parent_key, &source_node.title, &err)
                .await;
        }
    };

    let parent_suite_id = target_plan.suites.node(target_parent_key).suite_id.clone();
    if let Err(err) = ctx
        .target
        .test_store
        .attach_child_suite(&target_plan.id, &parent_suite_id, &handle.suite_id)
        .await
    {
        if err.is_fatal() {
            return Err(err);
        }
        return insert_placeholder(ctx, target_plan, target_parent_key, &source_node.title, &err)
            .await;
    }
    ctx.target.test_store.save_plan(&target_plan.id).await?;

    let target_key = target_plan.suites.insert_child(
        target_parent_key,
        SuiteNode {
            suite_id: handle.suite_id,
            work_item: handle.work_item.clone(),
            title: source_node.title.clone(),
            kind: handle.kind,
            parent: None,
            children: Vec::new(),
            test_cases: Vec::new(),
            default_configurations: None,
        },
    );

    apply_default_configurations(ctx, source_plan, source_key, target_plan, target_key).await?;
    if let Err(err) =
        reconcile_work_item_pair(ctx, &source_node.work_item, &handle.work_item, true).await
    {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(title = %source_node.title, error = %err, "failed to reconcile created suite work item");
    }
    ctx.reporter.created(EntityKind::Suite, &source_node.title);
    Ok(Some(target_key))
}

/// Create the dynamic suite with the source query, then rewrite the copy: the
/// verbatim text is certain to reference source-side paths and ids.
async fn create_dynamic_suite(
    ctx: &mut SyncContext<'_>,
    title: &str,
    source_query: &str,
) -> Result<SuiteHandle, StoreError> {
    let mut handle = ctx
        .target
        .test_store
        .create_dynamic_suite(title, source_query)
        .await?;

    let renamed = query::rewrite_project_paths(
        source_query,
        &ctx.source.project,
        &ctx.target.project,
        ctx.options.prefix_project_to_nodes,
    );
    let rewrite = query::rewrite_work_item_ids(&renamed, ctx.registry).await?;
    for unresolved in &rewrite.unresolved {
        ctx.reporter.warning(
            EntityKind::Query,
            title,
            format!("query references unmigrated work item {unresolved}; id left as-is"),
        );
    }
    let mut final_query = rewrite.query;

    if final_query != source_query {
        if let Err(err) = ctx
            .target
            .test_store
            .update_suite_query(&handle.suite_id, &final_query)
            .await
        {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(title, error = %err, "failed to store rewritten suite query");
        }
    }

    if ctx.options.validate_rewritten_queries {
        if let Err(err) = ctx.target.test_store.execute_query(&final_query).await {
            if err.is_fatal() {
                return Err(err);
            }
            match query::repair_missing_iteration_path(
                &final_query,
                &err.to_string(),
                &ctx.source.project,
                &ctx.target.project,
            ) {
                Some(repaired) if repaired != final_query => {
                    if let Err(err) = ctx
                        .target
                        .test_store
                        .update_suite_query(&handle.suite_id, &repaired)
                        .await
                    {
                        if err.is_fatal() {
                            return Err(err);
                        }
                        warn!(title, error = %err, "failed to store repaired suite query");
                    }
                    final_query = repaired;
                }
                _ => {
                    warn!(title, error = %err, "rewritten suite query failed validation");
                }
            }
        }
    }

    handle.kind = SuiteKind::Dynamic { query: final_query };
    Ok(handle)
}

/// The store rejected the intended node; insert a clearly labeled static
/// placeholder so the run continues and the gap stays visible. The placeholder
/// gets no children.
async fn insert_placeholder(
    ctx: &mut SyncContext<'_>,
    target_plan: &mut TestPlan,
    target_parent_key: SuiteKey,
    title: &str,
    cause: &StoreError,
) -> Result<Option<SuiteKey>, StoreError> {
    ctx.reporter
        .failed(EntityKind::Suite, title, cause.to_string());

    let broken_title = format!("BROKEN: {title} | {cause}");
    let handle = match ctx.target.test_store.create_static_suite(&broken_title).await {
        Ok(handle) => handle,
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            warn!(title, error = %err, "placeholder suite creation failed as well");
            return Ok(None);
        }
    };
    let parent_suite_id = target_plan.suites.node(target_parent_key).suite_id.clone();
    if let Err(err) = ctx
        .target
        .test_store
        .attach_child_suite(&target_plan.id, &parent_suite_id, &handle.suite_id)
        .await
    {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(title, error = %err, "placeholder suite could not be attached");
        return Ok(None);
    }
    ctx.target.test_store.save_plan(&target_plan.id).await?;

    target_plan.suites.insert_child(
        target_parent_key,
        SuiteNode {
            suite_id: handle.suite_id,
            work_item: handle.work_item,
            title: broken_title.clone(),
            kind: SuiteKind::Static,
            parent: None,
            children: Vec::new(),
            test_cases: Vec::new(),
            default_configurations: None,
        },
    );
    ctx.reporter.created(EntityKind::Suite, broken_title);
    Ok(None)
}

/// Wholesale default-configuration reconciliation (§4.3 context a). The store
/// is only called when the resolved set differs from what the target node
/// already carries; apply failures are logged, not propagated.
async fn apply_default_configurations(
    ctx: &mut SyncContext<'_>,
    source_plan: &TestPlan,
    source_key: SuiteKey,
    target_plan: &mut TestPlan,
    target_key: SuiteKey,
) -> Result<(), StoreError> {
    let suite_id = target_plan.suites.node(target_key).suite_id.clone();
    let source_defaults = source_plan
        .suites
        .node(source_key)
        .default_configurations
        .clone();

    match source_defaults {
        Some(source_set) => {
            let resolved = ctx.reconciler.resolve_set(&source_set);
            for dropped in &resolved.dropped {
                ctx.reporter.warning(
                    EntityKind::Configuration,
                    dropped.clone(),
                    "no configuration with this name in the target store; dropped from default set",
                );
            }
            let current = target_plan.suites.node(target_key);
            let dirty = !configuration_names_match(
                current.default_configurations.as_deref().unwrap_or(&[]),
                &resolved.resolved,
            );
            if !dirty {
                return Ok(());
            }
            match ctx
                .target
                .test_store
                .set_default_configurations(&suite_id, &resolved.resolved)
                .await
            {
                Ok(()) => {
                    target_plan.suites.node_mut(target_key).default_configurations =
                        Some(resolved.resolved);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(suite = %suite_id, error = %err, "failed to apply default configurations");
                }
            }
        }
        None => {
            let has_defaults = target_plan
                .suites
                .node(target_key)
                .default_configurations
                .as_ref()
                .is_some_and(|set| !set.is_empty());
            if !has_defaults {
                return Ok(());
            }
            match ctx
                .target
                .test_store
                .clear_default_configurations(&suite_id)
                .await
            {
                Ok(()) => {
                    target_plan.suites.node_mut(target_key).default_configurations = None;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(suite = %suite_id, error = %err, "failed to clear default configurations");
                }
            }
        }
    }
    Ok(())
}

/// Area/iteration translation, the injected field map, the verbatim
/// assigned-to copy, and (for nodes created this run) the reflected-link
/// stamp.
pub(crate) async fn reconcile_work_item_pair(
    ctx: &mut SyncContext<'_>,
    source_id: &WorkItemId,
    target_id: &WorkItemId,
    stamp: bool,
) -> Result<(), StoreError> {
    let source_work_item = ctx.source.work_items.get(source_id).await?;
    let mut target_work_item = ctx.target.work_items.get(target_id).await?;

    target_work_item.area_path = translate_path(
        &source_work_item.area_path,
        &ctx.source.project,
        &ctx.target.project,
        ctx.options.prefix_project_to_nodes,
    );
    target_work_item.iteration_path = translate_path(
        &source_work_item.iteration_path,
        &ctx.source.project,
        &ctx.target.project,
        ctx.options.prefix_project_to_nodes,
    );
    ctx.field_mapper.apply(&source_work_item, &mut target_work_item);
    target_work_item.assigned_to = source_work_item.assigned_to.clone();
    ctx.target.work_items.save(&target_work_item).await?;

    if stamp {
        ctx.registry
            .stamp(&mut target_work_item, &source_work_item.id)
            .await?;
    }
    Ok(())
}

/// Attach the direct test-case entries of a static suite, batched into one
/// store write per suite. An entry whose work item has no migrated
/// counterpart stops the remaining entries of this suite: the upstream
/// migration has not caught up yet, and later entries would hit the same
/// wall.
async fn attach_test_cases(
    ctx: &mut SyncContext<'_>,
    source_plan: &TestPlan,
    source_key: SuiteKey,
    target_plan: &mut TestPlan,
    target_key: SuiteKey,
) -> Result<(), StoreError> {
    let source_node = source_plan.suites.node(source_key).clone();
    if excluded_by_tag_filter(ctx.source.work_items, ctx.options, &source_node.work_item).await? {
        return Ok(());
    }
    debug!(
        title = %source_node.title,
        cases = source_node.test_cases.len(),
        "attaching test cases"
    );

    let mut additions: Vec<(TestCaseId, WorkItemId, String)> = Vec::new();
    for entry in &source_node.test_cases {
        if excluded_by_tag_filter(ctx.source.work_items, ctx.options, &entry.work_item).await? {
            debug!(case = %entry.title, "test case excluded by tag filter");
            continue;
        }
        let Some(target_work_item) = ctx.registry.find(&entry.work_item).await? else {
            ctx.reporter.skipped(
                EntityKind::TestCaseLink,
                &entry.title,
                "work item has not been migrated yet; stopping test case processing for this suite",
            );
            break;
        };
        if target_plan.suites.node(target_key).has_entry(&target_work_item.id) {
            ctx.reporter.matched(EntityKind::TestCaseLink, &entry.title);
            continue;
        }
        let Some(test_case) = ctx.target.test_store.find_test_case(&target_work_item.id).await?
        else {
            ctx.reporter.failed(
                EntityKind::TestCaseLink,
                &entry.title,
                "migrated work item is not a test case in the target store",
            );
            continue;
        };
        additions.push((test_case, target_work_item.id, entry.title.clone()));
    }

    if additions.is_empty() {
        return Ok(());
    }

    let suite_id = target_plan.suites.node(target_key).suite_id.clone();
    let case_ids: Vec<TestCaseId> = additions.iter().map(|(id, _, _)| id.clone()).collect();
    match ctx.target.test_store.add_test_cases(&suite_id, &case_ids).await {
        Ok(()) => {
            ctx.target.test_store.save_plan(&target_plan.id).await?;
            for (_, work_item, title) in additions {
                target_plan
                    .suites
                    .node_mut(target_key)
                    .test_cases
                    .push(TestCaseEntry {
                        work_item,
                        title: title.clone(),
                        configurations: Vec::new(),
                        point_assignments: Vec::new(),
                    });
                ctx.reporter.created(EntityKind::TestCaseLink, title);
            }
        }
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            for (_, _, title) in additions {
                ctx.reporter
                    .failed(EntityKind::TestCaseLink, title, err.to_string());
            }
        }
    }
    Ok(())
}
