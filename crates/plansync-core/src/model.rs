use serde::{Deserialize, Serialize};

use crate::reflected::ReflectedLink;
use crate::{ConfigurationId, IdentityDescriptor, IdentityId, PlanId, SuiteId, WorkItemId};

/// A configuration as each store identifies it: an internally scoped id plus
/// the name that establishes identity across stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAndName {
    pub id: ConfigurationId,
    pub name: String,
}

impl IdAndName {
    pub fn new(id: impl Into<ConfigurationId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemLink {
    pub description: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub item_type: String,
    pub title: String,
    pub area_path: String,
    pub iteration_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub links: Vec<WorkItemLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflected_link: Option<ReflectedLink>,
}

impl WorkItem {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub descriptor: IdentityDescriptor,
    pub user_id: IdentityId,
    pub display_name: String,
    pub account_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One executable test point observed on a source suite entry: which
/// configuration it runs under and who, if anyone, is assigned to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointAssignment {
    pub configuration: ConfigurationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tester: Option<IdentityDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseEntry {
    pub work_item: WorkItemId,
    pub title: String,
    #[serde(default)]
    pub configurations: Vec<IdAndName>,
    #[serde(default)]
    pub point_assignments: Vec<PointAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuiteKind {
    Static,
    Dynamic { query: String },
    RequirementBased { requirement: WorkItemId },
}

impl SuiteKind {
    pub fn label(&self) -> &'static str {
        match self {
            SuiteKind::Static => "static",
            SuiteKind::Dynamic { .. } => "dynamic",
            SuiteKind::RequirementBased { .. } => "requirement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteNode {
    pub suite_id: SuiteId,
    pub work_item: WorkItemId,
    pub title: String,
    pub kind: SuiteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<SuiteKey>,
    #[serde(default)]
    pub children: Vec<SuiteKey>,
    #[serde(default)]
    pub test_cases: Vec<TestCaseEntry>,
    /// `None` means the source never set a default configuration set, which is
    /// distinct from an empty set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_configurations: Option<Vec<IdAndName>>,
}

impl SuiteNode {
    pub fn entry(&self, work_item: &WorkItemId) -> Option<&TestCaseEntry> {
        self.test_cases.iter().find(|entry| &entry.work_item == work_item)
    }

    pub fn has_entry(&self, work_item: &WorkItemId) -> bool {
        self.entry(work_item).is_some()
    }
}

/// Index of a node within its plan's [`SuiteTree`]. Keys are stable for the
/// lifetime of the tree handle; nodes are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuiteKey(usize);

/// Arena of suite nodes addressed by [`SuiteKey`]. The traversal passes keys
/// around instead of borrowing nodes, so creation during a walk never fights
/// the borrow checker over parent references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteTree {
    nodes: Vec<SuiteNode>,
}

impl SuiteTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn insert_root(&mut self, mut node: SuiteNode) -> SuiteKey {
        node.parent = None;
        let key = SuiteKey(self.nodes.len());
        self.nodes.push(node);
        key
    }

    pub fn insert_child(&mut self, parent: SuiteKey, mut node: SuiteNode) -> SuiteKey {
        node.parent = Some(parent);
        let key = SuiteKey(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].children.push(key);
        key
    }

    pub fn node(&self, key: SuiteKey) -> &SuiteNode {
        &self.nodes[key.0]
    }

    pub fn node_mut(&mut self, key: SuiteKey) -> &mut SuiteNode {
        &mut self.nodes[key.0]
    }

    /// Exact, case-sensitive title match among the direct children of
    /// `parent`. First match wins when duplicates exist.
    pub fn child_by_title(&self, parent: SuiteKey, title: &str) -> Option<SuiteKey> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|key| self.nodes[key.0].title == title)
    }

    pub fn child_by_work_item(&self, parent: SuiteKey, work_item: &WorkItemId) -> Option<SuiteKey> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|key| &self.nodes[key.0].work_item == work_item)
    }

    pub fn keys(&self) -> impl Iterator<Item = SuiteKey> + '_ {
        (0..self.nodes.len()).map(SuiteKey)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub id: PlanId,
    pub work_item: WorkItemId,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub area_path: String,
    pub iteration_path: String,
    #[serde(default)]
    pub links: Vec<WorkItemLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_test_settings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automated_test_settings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_uri: Option<String>,
    pub root: SuiteKey,
    pub suites: SuiteTree,
}

/// Everything the target store needs to create a plan. Settings and build
/// references never appear here; the driver drops them before drafting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlanDraft {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub area_path: String,
    pub iteration_path: String,
    #[serde(default)]
    pub links: Vec<WorkItemLink>,
}

/// Store handle for a suite created during this run, before it is attached to
/// a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteHandle {
    pub suite_id: SuiteId,
    pub work_item: WorkItemId,
    pub title: String,
    pub kind: SuiteKind,
}

/// The (test case, configuration, tester) triple submitted to the target
/// store. `tester: None` is an explicit unassigned point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPointAssignment {
    pub test_case: WorkItemId,
    pub configuration: IdAndName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tester: Option<IdentityId>,
}
