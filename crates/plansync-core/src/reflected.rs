use serde::{Deserialize, Serialize};

use crate::adapters::WorkItemStore;
use crate::error::StoreError;
use crate::model::WorkItem;
use crate::{StoreId, WorkItemId};

/// Persistent back-reference from a target entity to the source entity it was
/// created from. The value is deterministic for a (store, work item) pair, so
/// re-runs can find previously migrated entities without any local state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReflectedLink(String);

impl ReflectedLink {
    pub fn encode(store: &StoreId, work_item: &WorkItemId) -> Self {
        Self(format!("{}/{}", store.as_str(), work_item.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReflectedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup and stamping of reflected links against the target work-item store.
pub struct ReflectedLinkRegistry<'a> {
    source_store: StoreId,
    target_work_items: &'a dyn WorkItemStore,
}

impl<'a> ReflectedLinkRegistry<'a> {
    pub fn new(source_store: StoreId, target_work_items: &'a dyn WorkItemStore) -> Self {
        Self {
            source_store,
            target_work_items,
        }
    }

    pub fn link_for(&self, source: &WorkItemId) -> ReflectedLink {
        ReflectedLink::encode(&self.source_store, source)
    }

    /// Find the target work item migrated from `source`, if any. Before any
    /// stamp for that source id this returns `None`, never a partial value.
    pub async fn find(&self, source: &WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        self.target_work_items
            .find_by_reflected_link(&self.link_for(source))
            .await
    }

    /// Stamp `target` as the migrated counterpart of `source` and persist.
    /// A link is written at most once per target entity; stamping an already
    /// linked entity is an error, not an overwrite.
    pub async fn stamp(
        &self,
        target: &mut WorkItem,
        source: &WorkItemId,
    ) -> Result<(), StoreError> {
        if let Some(existing) = &target.reflected_link {
            return Err(StoreError::InvalidRequest(format!(
                "work item {} already carries reflected link {existing}",
                target.id
            )));
        }
        target.reflected_link = Some(self.link_for(source));
        self.target_work_items.save(target).await
    }
}
