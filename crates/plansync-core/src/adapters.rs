use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    IdAndName, Identity, SuiteHandle, TestPlan, TestPlanDraft, TestPointAssignment, WorkItem,
};
use crate::reflected::ReflectedLink;
use crate::{IdentityDescriptor, PlanId, SuiteId, TestCaseId, WorkItemId};

/// Work-item access for one store. The source side is only ever read; the
/// target side is also written.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    async fn get(&self, id: &WorkItemId) -> Result<WorkItem, StoreError>;

    /// Store-side lookup by the reflected-link value stamped on migrated
    /// entities. Returns `None` when nothing carries the value.
    async fn find_by_reflected_link(
        &self,
        link: &ReflectedLink,
    ) -> Result<Option<WorkItem>, StoreError>;

    async fn save(&self, work_item: &WorkItem) -> Result<(), StoreError>;
}

/// Test-management surface of one store. Reads return fully loaded plan
/// trees; every mutation is an individual remote call the engine sequences
/// itself (§5: no retries, checkpointed saves).
#[async_trait]
pub trait TestStore: Send + Sync {
    async fn list_plans(&self) -> Result<Vec<TestPlan>, StoreError>;

    async fn create_plan(&self, draft: TestPlanDraft) -> Result<TestPlan, StoreError>;

    /// Checkpoint save of everything pending on the plan.
    async fn save_plan(&self, plan: &PlanId) -> Result<(), StoreError>;

    async fn list_configurations(&self) -> Result<Vec<IdAndName>, StoreError>;

    async fn create_static_suite(&self, title: &str) -> Result<SuiteHandle, StoreError>;

    async fn create_dynamic_suite(&self, title: &str, query: &str)
        -> Result<SuiteHandle, StoreError>;

    async fn create_requirement_suite(
        &self,
        requirement: &WorkItem,
        title: &str,
    ) -> Result<SuiteHandle, StoreError>;

    async fn attach_child_suite(
        &self,
        plan: &PlanId,
        parent: &SuiteId,
        child: &SuiteId,
    ) -> Result<(), StoreError>;

    async fn find_test_case(&self, work_item: &WorkItemId)
        -> Result<Option<TestCaseId>, StoreError>;

    /// Batched once per suite; callers collect additions first.
    async fn add_test_cases(&self, suite: &SuiteId, cases: &[TestCaseId])
        -> Result<(), StoreError>;

    async fn set_default_configurations(
        &self,
        suite: &SuiteId,
        configurations: &[IdAndName],
    ) -> Result<(), StoreError>;

    async fn clear_default_configurations(&self, suite: &SuiteId) -> Result<(), StoreError>;

    /// Entry-level configuration set, distinct from the suite default set.
    async fn set_entry_configurations(
        &self,
        suite: &SuiteId,
        case: &WorkItemId,
        configurations: &[IdAndName],
    ) -> Result<(), StoreError>;

    /// Batched once per suite.
    async fn assign_test_points(
        &self,
        suite: &SuiteId,
        assignments: Vec<TestPointAssignment>,
    ) -> Result<(), StoreError>;

    async fn update_suite_query(&self, suite: &SuiteId, query: &str) -> Result<(), StoreError>;

    /// Dry-run a query against the store. Only used by the optional
    /// rewritten-query validation pass.
    async fn execute_query(&self, query: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn read_by_descriptor(
        &self,
        descriptor: &IdentityDescriptor,
    ) -> Result<Identity, StoreError>;

    async fn read_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn read_by_account_name(&self, name: &str) -> Result<Option<Identity>, StoreError>;

    /// Force the store to refresh its view of the identity record.
    async fn refresh(&self, descriptor: &IdentityDescriptor) -> Result<(), StoreError>;
}

/// Injected per-field transformation policy, invoked once per newly
/// reconciled node after the engine has translated area and iteration paths.
pub trait FieldMapper: Send + Sync {
    fn apply(&self, source: &WorkItem, target: &mut WorkItem);
}
