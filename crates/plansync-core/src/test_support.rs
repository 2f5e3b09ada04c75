//! In-memory fakes for exercising the migration engine without a real store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::adapters::{FieldMapper, IdentityService, TestStore, WorkItemStore};
use crate::error::StoreError;
use crate::model::{
    IdAndName, Identity, PointAssignment, SuiteHandle, SuiteKind, SuiteNode, SuiteTree,
    TestCaseEntry, TestPlan, TestPlanDraft, TestPointAssignment, WorkItem, WorkItemLink,
};
use crate::reflected::ReflectedLink;
use crate::{
    ConfigurationId, IdentityDescriptor, IdentityId, PlanId, StoreId, SuiteId, TestCaseId,
    WorkItemId,
};

#[derive(Debug, Clone)]
struct PlanRecord {
    id: PlanId,
    work_item: WorkItemId,
    name: String,
    description: String,
    start_date: Option<String>,
    end_date: Option<String>,
    area_path: String,
    iteration_path: String,
    links: Vec<WorkItemLink>,
    manual_test_settings: Option<String>,
    automated_test_settings: Option<String>,
    build_uri: Option<String>,
    root: SuiteId,
}

#[derive(Debug, Clone)]
struct CaseRecord {
    work_item: WorkItemId,
    title: String,
    configurations: Vec<IdAndName>,
    point_assignments: Vec<PointAssignment>,
}

#[derive(Debug, Clone)]
struct SuiteRecord {
    id: SuiteId,
    work_item: WorkItemId,
    title: String,
    kind: SuiteKind,
    children: Vec<SuiteId>,
    cases: Vec<CaseRecord>,
    default_configurations: Option<Vec<IdAndName>>,
}

#[derive(Debug, Clone)]
struct IdentityRecord {
    identity: Identity,
    email_after_refresh: Option<String>,
}

#[derive(Debug, Default)]
struct ProjectState {
    counter: u64,
    plans: Vec<PlanRecord>,
    suites: HashMap<SuiteId, SuiteRecord>,
    work_items: HashMap<WorkItemId, WorkItem>,
    configurations: Vec<IdAndName>,
    identities: Vec<IdentityRecord>,
    test_cases: HashMap<WorkItemId, TestCaseId>,
    assigned_points: HashMap<SuiteId, Vec<TestPointAssignment>>,
    executed_queries: Vec<String>,
    query_failures: HashMap<String, StoreError>,
    suite_creation_failures: HashMap<String, StoreError>,
    attach_failures: HashMap<String, StoreError>,
    configuration_apply_failure: Option<StoreError>,
    unavailable: Option<StoreError>,
    saved_plans: u64,
}

/// One fake project-tracking store: work items, test management, and an
/// identity service behind a single mutex-guarded state.
pub struct FakeProject {
    pub store_id: StoreId,
    pub project: String,
    state: Mutex<ProjectState>,
}

impl FakeProject {
    pub fn new(store_id: impl Into<StoreId>, project: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            project: project.into(),
            state: Mutex::new(ProjectState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProjectState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next(state: &mut ProjectState) -> u64 {
        state.counter += 1;
        state.counter
    }

    // -- fixture builders -------------------------------------------------

    pub fn add_configuration(&self, name: &str) -> IdAndName {
        let mut state = self.lock();
        let id = ConfigurationId::new(format!("cfg-{}", Self::next(&mut state)));
        let configuration = IdAndName::new(id, name);
        state.configurations.push(configuration.clone());
        configuration
    }

    pub fn add_identity(
        &self,
        descriptor: &str,
        display_name: &str,
        account_name: &str,
        email: Option<&str>,
    ) -> IdentityDescriptor {
        let mut state = self.lock();
        let user_id = IdentityId::new(format!("uid-{}", Self::next(&mut state)));
        let descriptor = IdentityDescriptor::new(descriptor);
        state.identities.push(IdentityRecord {
            identity: Identity {
                descriptor: descriptor.clone(),
                user_id,
                display_name: display_name.to_owned(),
                account_name: account_name.to_owned(),
                email: email.map(str::to_owned),
            },
            email_after_refresh: None,
        });
        descriptor
    }

    /// An identity whose email only becomes visible after a forced refresh.
    pub fn add_identity_needing_refresh(
        &self,
        descriptor: &str,
        display_name: &str,
        account_name: &str,
        email_after_refresh: &str,
    ) -> IdentityDescriptor {
        let descriptor = self.add_identity(descriptor, display_name, account_name, None);
        let mut state = self.lock();
        if let Some(record) = state
            .identities
            .iter_mut()
            .find(|record| record.identity.descriptor == descriptor)
        {
            record.email_after_refresh = Some(email_after_refresh.to_owned());
        }
        descriptor
    }

    fn new_work_item(
        state: &mut ProjectState,
        project: &str,
        id: WorkItemId,
        item_type: &str,
        title: &str,
        tags: &[&str],
    ) -> WorkItemId {
        let work_item = WorkItem {
            id: id.clone(),
            item_type: item_type.to_owned(),
            title: title.to_owned(),
            area_path: project.to_owned(),
            iteration_path: project.to_owned(),
            assigned_to: None,
            tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
            links: Vec::new(),
            reflected_link: None,
        };
        state.work_items.insert(id.clone(), work_item);
        id
    }

    pub fn insert_work_item(&self, work_item: WorkItem) -> WorkItemId {
        let mut state = self.lock();
        let id = work_item.id.clone();
        state.work_items.insert(id.clone(), work_item);
        id
    }

    pub fn add_plan(&self, name: &str, tags: &[&str]) -> PlanId {
        let mut state = self.lock();
        let sequence = Self::next(&mut state);
        let plan_id = PlanId::new(format!("plan-{sequence}"));
        let plan_work_item = WorkItemId::new(format!("{}", Self::next(&mut state)));
        Self::new_work_item(
            &mut state,
            &self.project,
            plan_work_item.clone(),
            "Test Plan",
            name,
            tags,
        );
        let root_id = SuiteId::new(format!("suite-{}", Self::next(&mut state)));
        let root_work_item = WorkItemId::new(format!("{}", Self::next(&mut state)));
        Self::new_work_item(
            &mut state,
            &self.project,
            root_work_item.clone(),
            "Test Suite",
            name,
            tags,
        );
        state.suites.insert(
            root_id.clone(),
            SuiteRecord {
                id: root_id.clone(),
                work_item: root_work_item,
                title: name.to_owned(),
                kind: SuiteKind::Static,
                children: Vec::new(),
                cases: Vec::new(),
                default_configurations: None,
            },
        );
        state.plans.push(PlanRecord {
            id: plan_id.clone(),
            work_item: plan_work_item,
            name: name.to_owned(),
            description: String::new(),
            start_date: None,
            end_date: None,
            area_path: self.project.clone(),
            iteration_path: self.project.clone(),
            links: Vec::new(),
            manual_test_settings: None,
            automated_test_settings: None,
            build_uri: None,
            root: root_id,
        });
        plan_id
    }

    pub fn plan_work_item(&self, plan: &PlanId) -> WorkItemId {
        let state = self.lock();
        state
            .plans
            .iter()
            .find(|record| &record.id == plan)
            .map(|record| record.work_item.clone())
            .expect("plan exists")
    }

    pub fn plan_root(&self, plan: &PlanId) -> SuiteId {
        let state = self.lock();
        state
            .plans
            .iter()
            .find(|record| &record.id == plan)
            .map(|record| record.root.clone())
            .expect("plan exists")
    }

    pub fn set_plan_artifacts(
        &self,
        plan: &PlanId,
        manual_test_settings: Option<&str>,
        build_uri: Option<&str>,
    ) {
        let mut state = self.lock();
        if let Some(record) = state.plans.iter_mut().find(|record| &record.id == plan) {
            record.manual_test_settings = manual_test_settings.map(str::to_owned);
            record.build_uri = build_uri.map(str::to_owned);
        }
    }

    pub fn add_plan_link(&self, plan: &PlanId, description: &str, uri: &str) {
        let mut state = self.lock();
        if let Some(record) = state.plans.iter_mut().find(|record| &record.id == plan) {
            record.links.push(WorkItemLink {
                description: description.to_owned(),
                uri: uri.to_owned(),
            });
        }
    }

    /// Add a suite under `parent` (or the plan root when `parent` is `None`).
    pub fn add_suite(
        &self,
        plan: &PlanId,
        parent: Option<&SuiteId>,
        kind: SuiteKind,
        title: &str,
        tags: &[&str],
    ) -> SuiteId {
        let mut state = self.lock();
        let parent_id = match parent {
            Some(id) => id.clone(),
            None => state
                .plans
                .iter()
                .find(|record| &record.id == plan)
                .map(|record| record.root.clone())
                .expect("plan exists"),
        };
        let suite_id = SuiteId::new(format!("suite-{}", Self::next(&mut state)));
        let work_item = WorkItemId::new(format!("{}", Self::next(&mut state)));
        Self::new_work_item(
            &mut state,
            &self.project,
            work_item.clone(),
            "Test Suite",
            title,
            tags,
        );
        state.suites.insert(
            suite_id.clone(),
            SuiteRecord {
                id: suite_id.clone(),
                work_item,
                title: title.to_owned(),
                kind,
                children: Vec::new(),
                cases: Vec::new(),
                default_configurations: None,
            },
        );
        if let Some(parent_record) = state.suites.get_mut(&parent_id) {
            parent_record.children.push(suite_id.clone());
        }
        suite_id
    }

    pub fn suite_work_item(&self, suite: &SuiteId) -> WorkItemId {
        let state = self.lock();
        state.suites.get(suite).map(|s| s.work_item.clone()).expect("suite exists")
    }

    pub fn set_suite_default_configurations(&self, suite: &SuiteId, configurations: &[IdAndName]) {
        let mut state = self.lock();
        if let Some(record) = state.suites.get_mut(suite) {
            record.default_configurations = Some(configurations.to_vec());
        }
    }

    /// Register a test case with an explicit work-item id and attach it to a
    /// suite.
    pub fn add_case(
        &self,
        suite: &SuiteId,
        work_item: impl Into<WorkItemId>,
        title: &str,
        tags: &[&str],
    ) -> WorkItemId {
        let mut state = self.lock();
        let id: WorkItemId = work_item.into();
        Self::new_work_item(&mut state, &self.project, id.clone(), "Test Case", title, tags);
        let case_sequence = Self::next(&mut state);
        state
            .test_cases
            .insert(id.clone(), TestCaseId::new(format!("tc-{case_sequence}")));
        if let Some(record) = state.suites.get_mut(suite) {
            record.cases.push(CaseRecord {
                work_item: id.clone(),
                title: title.to_owned(),
                configurations: Vec::new(),
                point_assignments: Vec::new(),
            });
        }
        id
    }

    pub fn set_case_configurations(
        &self,
        suite: &SuiteId,
        case: &WorkItemId,
        configurations: &[IdAndName],
    ) {
        let mut state = self.lock();
        if let Some(record) = state.suites.get_mut(suite) {
            if let Some(entry) = record.cases.iter_mut().find(|c| &c.work_item == case) {
                entry.configurations = configurations.to_vec();
            }
        }
    }

    pub fn add_point_assignment(
        &self,
        suite: &SuiteId,
        case: &WorkItemId,
        configuration: &ConfigurationId,
        tester: Option<&IdentityDescriptor>,
    ) {
        let mut state = self.lock();
        if let Some(record) = state.suites.get_mut(suite) {
            if let Some(entry) = record.cases.iter_mut().find(|c| &c.work_item == case) {
                entry.point_assignments.push(PointAssignment {
                    configuration: configuration.clone(),
                    tester: tester.cloned(),
                });
            }
        }
    }

    /// A work item carrying the reflected link for an already migrated source
    /// entity, as the upstream work-item migration would have left it.
    pub fn add_mirrored_work_item(
        &self,
        id: impl Into<WorkItemId>,
        source_store: &StoreId,
        source_id: &WorkItemId,
        item_type: &str,
        title: &str,
    ) -> WorkItemId {
        let mut state = self.lock();
        let id: WorkItemId = id.into();
        Self::new_work_item(&mut state, &self.project, id.clone(), item_type, title, &[]);
        if let Some(work_item) = state.work_items.get_mut(&id) {
            work_item.reflected_link = Some(ReflectedLink::encode(source_store, source_id));
        }
        id
    }

    /// Mirrored work item registered as a test case in this store.
    pub fn add_mirrored_test_case(
        &self,
        id: impl Into<WorkItemId>,
        source_store: &StoreId,
        source_id: &WorkItemId,
        title: &str,
    ) -> WorkItemId {
        let id = self.add_mirrored_work_item(id, source_store, source_id, "Test Case", title);
        let mut state = self.lock();
        let case_sequence = Self::next(&mut state);
        state
            .test_cases
            .insert(id.clone(), TestCaseId::new(format!("tc-{case_sequence}")));
        id
    }

    // -- failure injection ------------------------------------------------

    pub fn fail_suite_creation(&self, title: &str, error: StoreError) {
        self.lock()
            .suite_creation_failures
            .insert(title.to_owned(), error);
    }

    /// Fail the next attach of a suite with this title.
    pub fn fail_attach_of(&self, title: &str, error: StoreError) {
        self.lock().attach_failures.insert(title.to_owned(), error);
    }

    pub fn fail_configuration_applies(&self, error: StoreError) {
        self.lock().configuration_apply_failure = Some(error);
    }

    pub fn fail_query(&self, query: &str, error: StoreError) {
        self.lock().query_failures.insert(query.to_owned(), error);
    }

    /// Every subsequent plan listing fails with `error`, simulating a store
    /// that became unreachable mid-run.
    pub fn set_unavailable(&self, error: StoreError) {
        self.lock().unavailable = Some(error);
    }

    // -- assertions helpers -----------------------------------------------

    pub fn plan_by_name(&self, name: &str) -> Option<TestPlan> {
        let state = self.lock();
        state
            .plans
            .iter()
            .find(|record| record.name == name)
            .map(|record| Self::assemble_plan(&state, record))
    }

    pub fn plan_names(&self) -> Vec<String> {
        self.lock().plans.iter().map(|p| p.name.clone()).collect()
    }

    pub fn work_item(&self, id: &WorkItemId) -> Option<WorkItem> {
        self.lock().work_items.get(id).cloned()
    }

    pub fn assigned_points(&self, suite: &SuiteId) -> Vec<TestPointAssignment> {
        self.lock()
            .assigned_points
            .get(suite)
            .cloned()
            .unwrap_or_default()
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.lock().executed_queries.clone()
    }

    pub fn suite_query(&self, suite: &SuiteId) -> Option<String> {
        let state = self.lock();
        state.suites.get(suite).and_then(|record| match &record.kind {
            SuiteKind::Dynamic { query } => Some(query.clone()),
            _ => None,
        })
    }

    pub fn saved_plan_count(&self) -> u64 {
        self.lock().saved_plans
    }

    fn assemble_plan(state: &ProjectState, record: &PlanRecord) -> TestPlan {
        let mut suites = SuiteTree::new();
        let root = Self::assemble_suite(state, &record.root, None, &mut suites);
        TestPlan {
            id: record.id.clone(),
            work_item: record.work_item.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            start_date: record.start_date.clone(),
            end_date: record.end_date.clone(),
            area_path: record.area_path.clone(),
            iteration_path: record.iteration_path.clone(),
            links: record.links.clone(),
            manual_test_settings: record.manual_test_settings.clone(),
            automated_test_settings: record.automated_test_settings.clone(),
            build_uri: record.build_uri.clone(),
            root,
            suites,
        }
    }

    fn assemble_suite(
        state: &ProjectState,
        suite_id: &SuiteId,
        parent: Option<crate::model::SuiteKey>,
        tree: &mut SuiteTree,
    ) -> crate::model::SuiteKey {
        let record = state.suites.get(suite_id).expect("suite record exists");
        let node = SuiteNode {
            suite_id: record.id.clone(),
            work_item: record.work_item.clone(),
            title: record.title.clone(),
            kind: record.kind.clone(),
            parent: None,
            children: Vec::new(),
            test_cases: record
                .cases
                .iter()
                .map(|case| TestCaseEntry {
                    work_item: case.work_item.clone(),
                    title: case.title.clone(),
                    configurations: case.configurations.clone(),
                    point_assignments: case.point_assignments.clone(),
                })
                .collect(),
            default_configurations: record.default_configurations.clone(),
        };
        let key = match parent {
            Some(parent_key) => tree.insert_child(parent_key, node),
            None => tree.insert_root(node),
        };
        for child in &record.children {
            Self::assemble_suite(state, child, Some(key), tree);
        }
        key
    }
}

#[async_trait]
impl WorkItemStore for FakeProject {
    async fn get(&self, id: &WorkItemId) -> Result<WorkItem, StoreError> {
        self.lock()
            .work_items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("work item {id}")))
    }

    async fn find_by_reflected_link(
        &self,
        link: &ReflectedLink,
    ) -> Result<Option<WorkItem>, StoreError> {
        Ok(self
            .lock()
            .work_items
            .values()
            .find(|work_item| work_item.reflected_link.as_ref() == Some(link))
            .cloned())
    }

    async fn save(&self, work_item: &WorkItem) -> Result<(), StoreError> {
        self.lock()
            .work_items
            .insert(work_item.id.clone(), work_item.clone());
        Ok(())
    }
}

#[async_trait]
impl TestStore for FakeProject {
    async fn list_plans(&self) -> Result<Vec<TestPlan>, StoreError> {
        let state = self.lock();
        if let Some(error) = &state.unavailable {
            return Err(error.clone());
        }
        Ok(state
            .plans
            .iter()
            .map(|record| Self::assemble_plan(&state, record))
            .collect())
    }

    async fn create_plan(&self, draft: TestPlanDraft) -> Result<TestPlan, StoreError> {
        let mut state = self.lock();
        let sequence = Self::next(&mut state);
        let plan_id = PlanId::new(format!("plan-{sequence}"));
        let plan_work_item = WorkItemId::new(format!("{}", Self::next(&mut state)));
        Self::new_work_item(
            &mut state,
            &self.project,
            plan_work_item.clone(),
            "Test Plan",
            &draft.name,
            &[],
        );
        let root_id = SuiteId::new(format!("suite-{}", Self::next(&mut state)));
        let root_work_item = WorkItemId::new(format!("{}", Self::next(&mut state)));
        Self::new_work_item(
            &mut state,
            &self.project,
            root_work_item.clone(),
            "Test Suite",
            &draft.name,
            &[],
        );
        state.suites.insert(
            root_id.clone(),
            SuiteRecord {
                id: root_id.clone(),
                work_item: root_work_item,
                title: draft.name.clone(),
                kind: SuiteKind::Static,
                children: Vec::new(),
                cases: Vec::new(),
                default_configurations: None,
            },
        );
        let record = PlanRecord {
            id: plan_id,
            work_item: plan_work_item,
            name: draft.name,
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            area_path: draft.area_path,
            iteration_path: draft.iteration_path,
            links: draft.links,
            manual_test_settings: None,
            automated_test_settings: None,
            build_uri: None,
            root: root_id,
        };
        let plan = Self::assemble_plan(&state, &record);
        state.plans.push(record);
        Ok(plan)
    }

    async fn save_plan(&self, plan: &PlanId) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.plans.iter().any(|record| &record.id == plan) {
            return Err(StoreError::NotFound(format!("plan {plan}")));
        }
        state.saved_plans += 1;
        Ok(())
    }

    async fn list_configurations(&self) -> Result<Vec<IdAndName>, StoreError> {
        Ok(self.lock().configurations.clone())
    }

    async fn create_static_suite(&self, title: &str) -> Result<SuiteHandle, StoreError> {
        self.create_suite(title, SuiteKind::Static)
    }

    async fn create_dynamic_suite(
        &self,
        title: &str,
        query: &str,
    ) -> Result<SuiteHandle, StoreError> {
        self.create_suite(
            title,
            SuiteKind::Dynamic {
                query: query.to_owned(),
            },
        )
    }

    async fn create_requirement_suite(
        &self,
        requirement: &WorkItem,
        title: &str,
    ) -> Result<SuiteHandle, StoreError> {
        if !self.lock().work_items.contains_key(&requirement.id) {
            return Err(StoreError::InvalidRequest(format!(
                "requirement {} does not exist in this store",
                requirement.id
            )));
        }
        self.create_suite(
            title,
            SuiteKind::RequirementBased {
                requirement: requirement.id.clone(),
            },
        )
    }

    async fn attach_child_suite(
        &self,
        plan: &PlanId,
        parent: &SuiteId,
        child: &SuiteId,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.plans.iter().any(|record| &record.id == plan) {
            return Err(StoreError::NotFound(format!("plan {plan}")));
        }
        let child_title = state
            .suites
            .get(child)
            .map(|record| record.title.clone())
            .ok_or_else(|| StoreError::NotFound(format!("suite {child}")))?;
        if let Some(error) = state.attach_failures.remove(&child_title) {
            return Err(error);
        }
        let parent_record = state
            .suites
            .get_mut(parent)
            .ok_or_else(|| StoreError::NotFound(format!("suite {parent}")))?;
        parent_record.children.push(child.clone());
        Ok(())
    }

    async fn find_test_case(
        &self,
        work_item: &WorkItemId,
    ) -> Result<Option<TestCaseId>, StoreError> {
        Ok(self.lock().test_cases.get(work_item).cloned())
    }

    async fn add_test_cases(
        &self,
        suite: &SuiteId,
        cases: &[TestCaseId],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let additions: Vec<CaseRecord> = cases
            .iter()
            .map(|case| {
                let work_item = state
                    .test_cases
                    .iter()
                    .find(|(_, tc)| *tc == case)
                    .map(|(wi, _)| wi.clone())
                    .ok_or_else(|| StoreError::NotFound(format!("test case {case}")))?;
                let title = state
                    .work_items
                    .get(&work_item)
                    .map(|wi| wi.title.clone())
                    .unwrap_or_default();
                Ok(CaseRecord {
                    work_item,
                    title,
                    configurations: Vec::new(),
                    point_assignments: Vec::new(),
                })
            })
            .collect::<Result<_, StoreError>>()?;
        let record = state
            .suites
            .get_mut(suite)
            .ok_or_else(|| StoreError::NotFound(format!("suite {suite}")))?;
        for addition in additions {
            if !record.cases.iter().any(|c| c.work_item == addition.work_item) {
                record.cases.push(addition);
            }
        }
        Ok(())
    }

    async fn set_default_configurations(
        &self,
        suite: &SuiteId,
        configurations: &[IdAndName],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(error) = state.configuration_apply_failure.clone() {
            return Err(error);
        }
        let record = state
            .suites
            .get_mut(suite)
            .ok_or_else(|| StoreError::NotFound(format!("suite {suite}")))?;
        record.default_configurations = Some(configurations.to_vec());
        Ok(())
    }

    async fn clear_default_configurations(&self, suite: &SuiteId) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(error) = state.configuration_apply_failure.clone() {
            return Err(error);
        }
        let record = state
            .suites
            .get_mut(suite)
            .ok_or_else(|| StoreError::NotFound(format!("suite {suite}")))?;
        record.default_configurations = None;
        Ok(())
    }

    async fn set_entry_configurations(
        &self,
        suite: &SuiteId,
        case: &WorkItemId,
        configurations: &[IdAndName],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(error) = state.configuration_apply_failure.clone() {
            return Err(error);
        }
        let record = state
            .suites
            .get_mut(suite)
            .ok_or_else(|| StoreError::NotFound(format!("suite {suite}")))?;
        let entry = record
            .cases
            .iter_mut()
            .find(|c| &c.work_item == case)
            .ok_or_else(|| StoreError::NotFound(format!("entry {case} in suite {suite}")))?;
        entry.configurations = configurations.to_vec();
        Ok(())
    }

    async fn assign_test_points(
        &self,
        suite: &SuiteId,
        assignments: Vec<TestPointAssignment>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.suites.contains_key(suite) {
            return Err(StoreError::NotFound(format!("suite {suite}")));
        }
        state
            .assigned_points
            .entry(suite.clone())
            .or_default()
            .extend(assignments);
        Ok(())
    }

    async fn update_suite_query(&self, suite: &SuiteId, query: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .suites
            .get_mut(suite)
            .ok_or_else(|| StoreError::NotFound(format!("suite {suite}")))?;
        match &mut record.kind {
            SuiteKind::Dynamic { query: existing } => {
                *existing = query.to_owned();
                Ok(())
            }
            _ => Err(StoreError::InvalidRequest(format!(
                "suite {suite} is not query-based"
            ))),
        }
    }

    async fn execute_query(&self, query: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.executed_queries.push(query.to_owned());
        match state.query_failures.get(query) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl FakeProject {
    fn create_suite(&self, title: &str, kind: SuiteKind) -> Result<SuiteHandle, StoreError> {
        let mut state = self.lock();
        if let Some(error) = state.suite_creation_failures.remove(title) {
            return Err(error);
        }
        let suite_id = SuiteId::new(format!("suite-{}", Self::next(&mut state)));
        let work_item = WorkItemId::new(format!("{}", Self::next(&mut state)));
        Self::new_work_item(
            &mut state,
            &self.project,
            work_item.clone(),
            "Test Suite",
            title,
            &[],
        );
        state.suites.insert(
            suite_id.clone(),
            SuiteRecord {
                id: suite_id.clone(),
                work_item: work_item.clone(),
                title: title.to_owned(),
                kind: kind.clone(),
                children: Vec::new(),
                cases: Vec::new(),
                default_configurations: None,
            },
        );
        Ok(SuiteHandle {
            suite_id,
            work_item,
            title: title.to_owned(),
            kind,
        })
    }
}

#[async_trait]
impl IdentityService for FakeProject {
    async fn read_by_descriptor(
        &self,
        descriptor: &IdentityDescriptor,
    ) -> Result<Identity, StoreError> {
        self.lock()
            .identities
            .iter()
            .find(|record| &record.identity.descriptor == descriptor)
            .map(|record| record.identity.clone())
            .ok_or_else(|| StoreError::NotFound(format!("identity {descriptor}")))
    }

    async fn read_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()
            .identities
            .iter()
            .find(|record| record.identity.email.as_deref() == Some(email))
            .map(|record| record.identity.clone()))
    }

    async fn read_by_account_name(&self, name: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()
            .identities
            .iter()
            .find(|record| record.identity.account_name == name)
            .map(|record| record.identity.clone()))
    }

    async fn refresh(&self, descriptor: &IdentityDescriptor) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(record) = state
            .identities
            .iter_mut()
            .find(|record| &record.identity.descriptor == descriptor)
        {
            if let Some(email) = record.email_after_refresh.take() {
                record.identity.email = Some(email);
            }
        }
        Ok(())
    }
}

/// Field mapper that does nothing; most tests only need the hook to exist.
pub struct NullFieldMapper;

impl FieldMapper for NullFieldMapper {
    fn apply(&self, _source: &WorkItem, _target: &mut WorkItem) {}
}

/// Field mapper that records every invocation for assertions.
#[derive(Default)]
pub struct RecordingFieldMapper {
    applied: Mutex<Vec<(WorkItemId, WorkItemId)>>,
}

impl RecordingFieldMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<(WorkItemId, WorkItemId)> {
        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl FieldMapper for RecordingFieldMapper {
    fn apply(&self, source: &WorkItem, target: &mut WorkItem) {
        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((source.id.clone(), target.id.clone()));
    }
}
