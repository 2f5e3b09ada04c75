use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(StoreId);
string_id!(PlanId);
string_id!(SuiteId);
string_id!(WorkItemId);
string_id!(TestCaseId);
string_id!(ConfigurationId);
string_id!(IdentityId);
string_id!(IdentityDescriptor);

pub mod adapters;
pub mod assign;
pub mod configs;
pub mod engine;
pub mod error;
pub mod identity;
pub mod links;
pub mod model;
pub mod query;
pub mod reflected;
pub mod report;
pub mod sync;
pub mod test_support;


pub use adapters::{FieldMapper, IdentityService, TestStore, WorkItemStore};
pub use configs::{ConfigurationReconciler, ResolvedConfigurations};
pub use engine::{MigrationEngine, MigrationOptions, StoreContext};
pub use error::StoreError;
pub use identity::IdentityTranslator;
pub use links::{scrub_links, InvalidLinkPolicy, LinkScrub};
pub use model::{
    IdAndName, Identity, PointAssignment, SuiteHandle, SuiteKey, SuiteKind, SuiteNode, SuiteTree,
    TestCaseEntry, TestPlan, TestPlanDraft, TestPointAssignment, WorkItem, WorkItemLink,
};
pub use reflected::{ReflectedLink, ReflectedLinkRegistry};
pub use report::{
    EntityCounts, EntityKind, NodeOutcome, ProcessingStatus, RunReport, RunReporter, TraceEvent,
};
