use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Plan,
    Suite,
    TestCaseLink,
    PointAssignment,
    Configuration,
    Identity,
    Query,
    Link,
    Artifact,
}

/// Per-node outcome of one synchronization decision. Recovery policy lives at
/// the call site that records the outcome, not in catch blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeOutcome {
    Created,
    Matched,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: EntityKind,
    pub outcome: NodeOutcome,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityCounts {
    pub created: u64,
    pub matched: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl EntityCounts {
    fn bump(&mut self, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Created => self.created += 1,
            NodeOutcome::Matched => self.matched += 1,
            NodeOutcome::Skipped => self.skipped += 1,
            NodeOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Complete,
    CompleteWithWarnings,
    Failed,
}

/// Externally observable output of one `synchronize` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: ProcessingStatus,
    pub plans: EntityCounts,
    pub suites: EntityCounts,
    pub test_case_links: EntityCounts,
    pub point_assignments: EntityCounts,
    pub events: Vec<TraceEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Collector threaded through the traversal contexts. One reporter lives for
/// exactly one `synchronize` call.
#[derive(Debug, Default)]
pub struct RunReporter {
    plans: EntityCounts,
    suites: EntityCounts,
    test_case_links: EntityCounts,
    point_assignments: EntityCounts,
    events: Vec<TraceEvent>,
    warnings: u64,
}

impl RunReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        kind: EntityKind,
        outcome: NodeOutcome,
        subject: impl Into<String>,
        detail: Option<String>,
    ) {
        match kind {
            EntityKind::Plan => self.plans.bump(outcome),
            EntityKind::Suite => self.suites.bump(outcome),
            EntityKind::TestCaseLink => self.test_case_links.bump(outcome),
            EntityKind::PointAssignment => self.point_assignments.bump(outcome),
            _ => {}
        }
        if matches!(outcome, NodeOutcome::Skipped | NodeOutcome::Failed) {
            self.warnings += 1;
        }
        self.events.push(TraceEvent {
            kind,
            outcome,
            subject: subject.into(),
            detail,
        });
    }

    pub fn created(&mut self, kind: EntityKind, subject: impl Into<String>) {
        self.record(kind, NodeOutcome::Created, subject, None);
    }

    pub fn matched(&mut self, kind: EntityKind, subject: impl Into<String>) {
        self.record(kind, NodeOutcome::Matched, subject, None);
    }

    pub fn skipped(&mut self, kind: EntityKind, subject: impl Into<String>, reason: impl Into<String>) {
        self.record(kind, NodeOutcome::Skipped, subject, Some(reason.into()));
    }

    pub fn failed(&mut self, kind: EntityKind, subject: impl Into<String>, reason: impl Into<String>) {
        self.record(kind, NodeOutcome::Failed, subject, Some(reason.into()));
    }

    /// A warning that is not tied to a node outcome, e.g. a dropped
    /// configuration name. Recorded as a skipped trace event.
    pub fn warning(&mut self, kind: EntityKind, subject: impl Into<String>, detail: impl Into<String>) {
        self.skipped(kind, subject, detail);
    }

    pub fn finish(self, failure: Option<String>) -> RunReport {
        let status = if failure.is_some() {
            ProcessingStatus::Failed
        } else if self.warnings > 0 {
            ProcessingStatus::CompleteWithWarnings
        } else {
            ProcessingStatus::Complete
        };
        RunReport {
            status,
            plans: self.plans,
            suites: self.suites,
            test_case_links: self.test_case_links,
            point_assignments: self.point_assignments,
            events: self.events,
            failure,
        }
    }
}
