use std::path::PathBuf;

use crate::frame::ProductKind;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    ReadingHeaders,
    Grouping,
    LoadingCorrections,
    Combining,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadingHeaders => write!(f, "Reading headers"),
            Self::Grouping => write!(f, "Grouping frames"),
            Self::LoadingCorrections => write!(f, "Loading masters"),
            Self::Combining => write!(f, "Combining groups"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (e.g., group count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Outcome of one group.
#[derive(Clone, Debug)]
pub struct GroupReport {
    /// `KEY=value` pairs of the group.
    pub label: String,
    pub frame_count: usize,
    pub written: Vec<PathBuf>,
    /// Inputs dropped by strip validation.
    pub rejected: Vec<String>,
    /// Errors that prevented an output from being written.
    pub errors: Vec<String>,
}

impl GroupReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of a whole run, groups in first-seen order.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub product: ProductKind,
    pub groups: Vec<GroupReport>,
    /// Inputs that could not be read or grouped, with the reason.
    pub unassigned: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub fn written(&self) -> Vec<PathBuf> {
        self.groups
            .iter()
            .flat_map(|g| g.written.iter().cloned())
            .collect()
    }

    pub fn failures(&self) -> Vec<&GroupReport> {
        self.groups.iter().filter(|g| !g.is_ok()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.unassigned.is_empty() && self.groups.iter().all(GroupReport::is_ok)
    }
}
