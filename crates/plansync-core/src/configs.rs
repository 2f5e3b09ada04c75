use std::collections::HashMap;

use crate::model::IdAndName;
use crate::ConfigurationId;

/// Outcome of resolving a source configuration-name set against the target
/// catalog. `resolved` is always a subset of the source names; `dropped`
/// records the names with no target counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedConfigurations {
    pub resolved: Vec<IdAndName>,
    pub dropped: Vec<String>,
}

/// Maps configurations across the two stores. Identity is exact name match
/// only; source-side ids are translated via their name.
pub struct ConfigurationReconciler {
    source_names: HashMap<ConfigurationId, String>,
    target_by_name: HashMap<String, ConfigurationId>,
}

impl ConfigurationReconciler {
    /// Builds the catalogs. First entry wins on duplicate names or ids.
    pub fn new(source: &[IdAndName], target: &[IdAndName]) -> Self {
        let mut source_names = HashMap::new();
        for configuration in source {
            source_names
                .entry(configuration.id.clone())
                .or_insert_with(|| configuration.name.clone());
        }
        let mut target_by_name = HashMap::new();
        for configuration in target {
            target_by_name
                .entry(configuration.name.clone())
                .or_insert_with(|| configuration.id.clone());
        }
        Self {
            source_names,
            target_by_name,
        }
    }

    /// Target configuration with exactly this name, if one exists.
    pub fn resolve_name(&self, name: &str) -> Option<IdAndName> {
        self.target_by_name
            .get(name)
            .map(|id| IdAndName::new(id.clone(), name))
    }

    /// Translate a source configuration id to its target counterpart via the
    /// shared name.
    pub fn translate_id(&self, id: &ConfigurationId) -> Option<IdAndName> {
        let name = self.source_names.get(id)?;
        self.resolve_name(name)
    }

    pub fn source_name(&self, id: &ConfigurationId) -> Option<&str> {
        self.source_names.get(id).map(String::as_str)
    }

    /// Resolve a whole source set; names without a target counterpart are
    /// dropped, never fabricated.
    pub fn resolve_set(&self, source: &[IdAndName]) -> ResolvedConfigurations {
        let mut outcome = ResolvedConfigurations::default();
        for configuration in source {
            match self.resolve_name(&configuration.name) {
                Some(found) => outcome.resolved.push(found),
                None => outcome.dropped.push(configuration.name.clone()),
            }
        }
        outcome
    }
}

/// Whether two configuration sets agree by name, ignoring order and ids.
pub fn configuration_names_match(left: &[IdAndName], right: &[IdAndName]) -> bool {
    let mut left_names: Vec<&str> = left.iter().map(|c| c.name.as_str()).collect();
    let mut right_names: Vec<&str> = right.iter().map(|c| c.name.as_str()).collect();
    left_names.sort_unstable();
    left_names.dedup();
    right_names.sort_unstable();
    right_names.dedup();
    left_names == right_names
}
