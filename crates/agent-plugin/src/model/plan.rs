use std::path::{Path, PathBuf};

/// Everything one pass needs to know about where a plugin goes.
///
/// Rebuilt from declared inputs and observed state on every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
    pub target_dir: PathBuf,
    pub target_path: PathBuf,
    pub requires_directory_creation: bool,
    /// True when `target_dir` is not on the agent's plugin search path.
    pub requires_reload_warning: bool,
}

impl ResolvedPlan {
    pub fn new(name: &str, target_dir: PathBuf, in_search_path: bool) -> Self {
        Self {
            target_path: target_path_for(&target_dir, name),
            requires_directory_creation: !target_dir.exists(),
            requires_reload_warning: !in_search_path,
            target_dir,
        }
    }
}

/// `<target_dir>/<name>`.
pub fn target_path_for(target_dir: &Path, name: &str) -> PathBuf {
    target_dir.join(name)
}

/// Result of the file ensure step, by content only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Changed,
    Unchanged,
}

impl ChangeOutcome {
    pub fn is_changed(self) -> bool {
        matches!(self, ChangeOutcome::Changed)
    }
}

impl std::fmt::Display for ChangeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOutcome::Changed => f.write_str("changed"),
            ChangeOutcome::Unchanged => f.write_str("unchanged"),
        }
    }
}
