use regex::Regex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::reflected::ReflectedLinkRegistry;
use crate::WorkItemId;

const MISSING_ITERATION_MARKER: &str = "The specified iteration path does not exist";

/// Result of the work-item-id rewriting pass. `unresolved` lists source ids
/// that have no migrated counterpart; their clauses are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryRewrite {
    pub query: String,
    pub unresolved: Vec<WorkItemId>,
}

/// Replace the source project name as it appears in quoted path literals.
///
/// Path literals open with a quote directly followed by the project name, so
/// the quote is kept in the needle to avoid touching the project name inside
/// unrelated text.
pub fn rewrite_project_paths(
    query: &str,
    source_project: &str,
    target_project: &str,
    prefix_project_to_nodes: bool,
) -> String {
    if source_project == target_project {
        return query.to_owned();
    }
    let needle = format!("'{source_project}");
    let replacement = if prefix_project_to_nodes {
        format!("'{target_project}\\{source_project}")
    } else {
        format!("'{target_project}")
    };
    query.replace(&needle, &replacement)
}

/// Rewrite `[System.Id] = <n>` and `[System.Id] IN (…)` clauses so they
/// reference the migrated counterparts of the source work items. Ids without
/// a counterpart stay as they are; a dangling reference is preferable to a
/// silently wrong one.
pub async fn rewrite_work_item_ids(
    query: &str,
    registry: &ReflectedLinkRegistry<'_>,
) -> Result<QueryRewrite, StoreError> {
    let equality = Regex::new(r"(?i)\[System\.Id\]\s*=\s*(\d+)").expect("valid regex");
    let in_list = Regex::new(r"(?i)\[System\.Id\]\s+IN\s*\(([^)]*)\)").expect("valid regex");

    // Collect the spans first; the resolutions are store calls and cannot run
    // inside the regex iteration.
    let mut spans: Vec<(std::ops::Range<usize>, Vec<String>)> = Vec::new();
    for captures in equality.captures_iter(query) {
        let group = captures.get(1).expect("capture group");
        spans.push((group.range(), vec![group.as_str().to_owned()]));
    }
    for captures in in_list.captures_iter(query) {
        let group = captures.get(1).expect("capture group");
        let ids = group
            .as_str()
            .split(',')
            .map(|token| token.trim().to_owned())
            .collect();
        spans.push((group.range(), ids));
    }

    let mut outcome = QueryRewrite {
        query: query.to_owned(),
        unresolved: Vec::new(),
    };

    let mut replacements: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    for (range, tokens) in spans {
        let mut changed = false;
        let mut rewritten_tokens = Vec::with_capacity(tokens.len());
        for token in tokens {
            if token.is_empty() || !token.chars().all(|ch| ch.is_ascii_digit()) {
                rewritten_tokens.push(token);
                continue;
            }
            let source_id = WorkItemId::new(token.clone());
            match registry.find(&source_id).await? {
                Some(target) => {
                    debug!(source = %source_id, target = %target.id, "rewriting work item id in suite query");
                    changed = true;
                    rewritten_tokens.push(target.id.as_str().to_owned());
                }
                None => {
                    warn!(source = %source_id, "work item referenced by suite query has no migrated counterpart; leaving id as-is");
                    outcome.unresolved.push(source_id);
                    rewritten_tokens.push(token);
                }
            }
        }
        if changed {
            replacements.push((range, rewritten_tokens.join(", ")));
        }
    }

    // Apply back to front so earlier spans keep their byte offsets.
    replacements.sort_by_key(|(range, _)| range.start);
    for (range, text) in replacements.into_iter().rev() {
        outcome.query.replace_range(range, &text);
    }

    Ok(outcome)
}

/// Repair pass for a rewritten query the target store rejected because of a
/// missing iteration path: the offending path segment is replaced with the
/// target project root. Returns `None` when the error is something else.
pub fn repair_missing_iteration_path(
    query: &str,
    error_message: &str,
    source_project: &str,
    target_project: &str,
) -> Option<String> {
    if !error_message.contains(MISSING_ITERATION_MARKER) {
        return None;
    }

    let quoted = Regex::new(r"'([^']*)'").expect("valid regex");
    let full_path = quoted.captures(error_message)?.get(1)?.as_str();
    let missing = full_path
        .split_once('\\')
        .map(|(_, rest)| rest)
        .unwrap_or(full_path);

    warn!(
        path = %missing,
        "suite query references an iteration path missing on the target; replacing it with the project root"
    );

    let repaired = query
        .replace(
            &format!("'{source_project}\\{missing}'"),
            &format!("'{target_project}'"),
        )
        .replace(
            &format!("'{target_project}\\{missing}'"),
            &format!("'{target_project}'"),
        );
    Some(repaired)
}
