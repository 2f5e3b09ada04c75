use tracing::{debug, error, info, warn};

use crate::adapters::{FieldMapper, IdentityService, TestStore, WorkItemStore};
use crate::assign::{self, AssignContext};
use crate::configs::ConfigurationReconciler;
use crate::error::StoreError;
use crate::identity::IdentityTranslator;
use crate::links::{scrub_links, InvalidLinkPolicy};
use crate::model::{TestPlan, TestPlanDraft};
use crate::reflected::ReflectedLinkRegistry;
use crate::report::{EntityKind, RunReport, RunReporter};
use crate::sync::{self, SyncContext};
use crate::{StoreId, WorkItemId};

/// Behavior switches for one migration run. Connection handles live in the
/// [`StoreContext`]s; everything here is policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Only migrate subtrees whose root work item carries this tag.
    pub required_tag: Option<String>,
    /// Prefix target plan names and area/iteration paths with the source
    /// project name instead of replacing it.
    pub prefix_project_to_nodes: bool,
    pub invalid_link_policy: InvalidLinkPolicy,
    /// Execute rewritten dynamic-suite queries against the target and repair
    /// missing iteration paths.
    pub validate_rewritten_queries: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            required_tag: None,
            prefix_project_to_nodes: false,
            invalid_link_policy: InvalidLinkPolicy::Warn,
            validate_rewritten_queries: false,
        }
    }
}

/// One side of the migration: store handles plus the project identity the
/// path and name rewriting needs. Construction (sessions, credentials) is the
/// caller's business.
pub struct StoreContext<'a> {
    pub store_id: StoreId,
    pub project: String,
    pub test_store: &'a dyn TestStore,
    pub work_items: &'a dyn WorkItemStore,
    pub identities: &'a dyn IdentityService,
}

/// Top-level driver: one plan at a time, tree synchronization first, then the
/// assignment pass over a freshly re-read target plan.
pub struct MigrationEngine<'a> {
    source: StoreContext<'a>,
    target: StoreContext<'a>,
    options: MigrationOptions,
    field_mapper: &'a dyn FieldMapper,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(
        source: StoreContext<'a>,
        target: StoreContext<'a>,
        options: MigrationOptions,
        field_mapper: &'a dyn FieldMapper,
    ) -> Self {
        Self {
            source,
            target,
            options,
            field_mapper,
        }
    }

    /// Migrate every plan the source store lists. Node-level faults are
    /// recovered and show up in the report; only an unreachable store fails
    /// the run.
    pub async fn synchronize(&self) -> RunReport {
        let plans = match self.source.test_store.list_plans().await {
            Ok(plans) => plans,
            Err(err) => {
                error!(error = %err, "unable to list source plans");
                return RunReporter::new().finish(Some(err.to_string()));
            }
        };
        self.synchronize_plans(&plans).await
    }

    /// Migrate the given source plans, in order, one at a time.
    pub async fn synchronize_plans(&self, plans: &[TestPlan]) -> RunReport {
        let mut reporter = RunReporter::new();
        match self.run(plans, &mut reporter).await {
            Ok(()) => reporter.finish(None),
            Err(err) => {
                error!(error = %err, "migration run failed");
                reporter.finish(Some(err.to_string()))
            }
        }
    }

    async fn run(&self, plans: &[TestPlan], reporter: &mut RunReporter) -> Result<(), StoreError> {
        info!(plans = plans.len(), "plans to copy");

        let source_configurations = self.source.test_store.list_configurations().await?;
        let target_configurations = self.target.test_store.list_configurations().await?;
        let reconciler =
            ConfigurationReconciler::new(&source_configurations, &target_configurations);
        let registry =
            ReflectedLinkRegistry::new(self.source.store_id.clone(), self.target.work_items);

        for source_plan in plans {
            match self
                .process_plan(source_plan, &registry, &reconciler, reporter)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    reporter.failed(EntityKind::Plan, &source_plan.name, err.to_string());
                }
            }
        }
        Ok(())
    }

    async fn process_plan(
        &self,
        source_plan: &TestPlan,
        registry: &ReflectedLinkRegistry<'_>,
        reconciler: &ConfigurationReconciler,
        reporter: &mut RunReporter,
    ) -> Result<(), StoreError> {
        if sync::excluded_by_tag_filter(
            self.source.work_items,
            &self.options,
            &source_plan.work_item,
        )
        .await?
        {
            debug!(plan = %source_plan.name, "plan excluded by tag filter");
            return Ok(());
        }

        let target_name = if self.options.prefix_project_to_nodes {
            format!("{}-{}", self.source.project, source_plan.name)
        } else {
            source_plan.name.clone()
        };
        info!(plan = %target_name, "processing plan");

        let located = self
            .find_target_plan(&target_name, &source_plan.work_item, registry)
            .await?;
        let plan_created = located.is_none();

        let mut ctx = SyncContext {
            source: &self.source,
            target: &self.target,
            options: &self.options,
            field_mapper: self.field_mapper,
            registry,
            reconciler,
            reporter: &mut *reporter,
        };

        let mut target_plan = match located {
            Some(plan) => {
                debug!(plan = %target_name, "plan already found, not creating");
                ctx.reporter.matched(EntityKind::Plan, &target_name);
                plan
            }
            None => {
                debug!(plan = %target_name, "plan missing, creating");
                let created = self
                    .create_target_plan(&mut ctx, source_plan, &target_name)
                    .await?;
                if let Err(err) = sync::reconcile_work_item_pair(
                    &mut ctx,
                    &source_plan.work_item,
                    &created.work_item,
                    true,
                )
                .await
                {
                    if err.is_fatal() {
                        return Err(err);
                    }
                    warn!(plan = %target_name, error = %err, "failed to reconcile plan work item");
                }
                ctx.reporter.created(EntityKind::Plan, &target_name);
                created
            }
        };

        sync::sync_suite_tree(&mut ctx, source_plan, &mut target_plan, plan_created).await?;
        self.target.test_store.save_plan(&target_plan.id).await?;

        // Pass 2 runs against a fresh read of the plan rather than the handle
        // mutated above; matching is by reflected link, so the re-read is
        // position-independent.
        let Some(reloaded) = self
            .find_target_plan(&target_name, &source_plan.work_item, registry)
            .await?
        else {
            reporter.failed(
                EntityKind::Plan,
                &target_name,
                "plan cannot be re-read from the target store between passes",
            );
            return Ok(());
        };

        let mut assign_ctx = AssignContext {
            target_store: self.target.test_store,
            registry,
            reconciler,
            translator: IdentityTranslator::new(self.source.identities, self.target.identities),
            reporter: &mut *reporter,
        };
        assign::apply_assignments(&mut assign_ctx, source_plan, &reloaded).await?;
        Ok(())
    }

    /// Name match first; the reflected link on the source plan's work item is
    /// the fallback for plans renamed on the source since a previous run.
    async fn find_target_plan(
        &self,
        name: &str,
        source_work_item: &WorkItemId,
        registry: &ReflectedLinkRegistry<'_>,
    ) -> Result<Option<TestPlan>, StoreError> {
        let plans = self.target.test_store.list_plans().await?;
        if let Some(found) = plans.iter().find(|plan| plan.name == name) {
            return Ok(Some(found.clone()));
        }
        if let Some(linked) = registry.find(source_work_item).await? {
            return Ok(plans.into_iter().find(|plan| plan.work_item == linked.id));
        }
        Ok(None)
    }

    async fn create_target_plan(
        &self,
        ctx: &mut SyncContext<'_>,
        source_plan: &TestPlan,
        target_name: &str,
    ) -> Result<TestPlan, StoreError> {
        if source_plan.manual_test_settings.is_some()
            || source_plan.automated_test_settings.is_some()
        {
            warn!(plan = %target_name, "ignoring migration of test settings; this artifact type is not supported");
            ctx.reporter.warning(
                EntityKind::Artifact,
                target_name,
                "test settings reference dropped",
            );
        }
        if let Some(build) = &source_plan.build_uri {
            warn!(plan = %target_name, build = %build, "ignoring migration of assigned build artifact; this artifact type is not supported");
            ctx.reporter.warning(
                EntityKind::Artifact,
                target_name,
                format!("build artifact {build} dropped"),
            );
        }

        let scrub = scrub_links(source_plan.links.clone(), self.options.invalid_link_policy);
        for removed in &scrub.removed {
            ctx.reporter.warning(
                EntityKind::Link,
                &removed.description,
                "link removed: unparsable URI",
            );
        }

        let draft = TestPlanDraft {
            name: target_name.to_owned(),
            description: source_plan.description.clone(),
            start_date: source_plan.start_date.clone(),
            end_date: source_plan.end_date.clone(),
            // Area and iteration start at the project root; the field-mapping
            // step sets the real values once the work item exists.
            area_path: self.target.project.clone(),
            iteration_path: self.target.project.clone(),
            links: scrub.kept,
        };
        let created = self.target.test_store.create_plan(draft).await?;
        self.target.test_store.save_plan(&created.id).await?;
        Ok(created)
    }
}
