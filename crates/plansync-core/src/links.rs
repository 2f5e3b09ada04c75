use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::WorkItemLink;

/// What to do with a migrated hyperlink whose URI scheme the target store
/// would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidLinkPolicy {
    /// Keep the link and log a warning; the target store may refuse the save.
    Warn,
    /// Drop the link and continue.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkScrub {
    pub kept: Vec<WorkItemLink>,
    pub removed: Vec<WorkItemLink>,
}

/// Partition `links` by URI validity under the configured policy. With
/// [`InvalidLinkPolicy::Warn`] every link is kept; invalid ones are only
/// logged.
pub fn scrub_links(links: Vec<WorkItemLink>, policy: InvalidLinkPolicy) -> LinkScrub {
    let mut scrub = LinkScrub::default();
    for link in links {
        if has_valid_scheme(&link.uri) {
            scrub.kept.push(link);
            continue;
        }
        match policy {
            InvalidLinkPolicy::Warn => {
                warn!(
                    description = %link.description,
                    uri = %link.uri,
                    "link has an unsafe or unparsable URI scheme and may be rejected by the target store"
                );
                scrub.kept.push(link);
            }
            InvalidLinkPolicy::Remove => {
                warn!(
                    description = %link.description,
                    uri = %link.uri,
                    "removing link with unparsable URI scheme"
                );
                scrub.removed.push(link);
            }
        }
    }
    scrub
}

/// RFC 3986 scheme check: one letter followed by letters, digits, `+`, `-`
/// or `.`, terminated by a colon.
fn has_valid_scheme(uri: &str) -> bool {
    let Some((scheme, rest)) = uri.split_once(':') else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}
