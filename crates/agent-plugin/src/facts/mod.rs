//! Agent facts and the version-gated plugin search path lookup.

pub mod reader;
pub mod version;

use std::path::Path;

use serde_json::Value as JsonValue;

use crate::error::{DeployError, Result};

pub use reader::*;
pub use version::*;

/// Field path of the agent integration version inside collected facts.
pub const VERSION_FIELD: &[&str] = &["packages", "agent", "version"];

/// System facts as collected by the monitoring agent.
#[derive(Debug, Clone)]
pub struct AgentFacts {
    raw: JsonValue,
}

impl AgentFacts {
    pub fn new(raw: JsonValue) -> Self {
        Self { raw }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw = serde_json::from_str(s).map_err(|e| DeployError::Facts(e.to_string()))?;
        Ok(Self::new(raw))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeployError::Facts(format!("reading {}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Walk a dotted field path; `None` when any segment is missing.
    pub fn lookup(&self, path: &[&str]) -> Option<&JsonValue> {
        path.iter().try_fold(&self.raw, |v, key| v.get(*key))
    }

    pub fn agent_version(&self) -> Result<AgentVersion> {
        let value = self.lookup(VERSION_FIELD).ok_or_else(|| {
            DeployError::Facts(format!("missing field '{}'", VERSION_FIELD.join(".")))
        })?;
        let text = match value {
            JsonValue::String(s) => s.clone(),
            // 8.10 as a JSON number reads back as 8.1.
            JsonValue::Number(n) => {
                return Err(DeployError::Facts(format!(
                    "'{}' must be a string, got the number {n}",
                    VERSION_FIELD.join(".")
                )));
            }
            other => {
                return Err(DeployError::Facts(format!(
                    "'{}' is not a version: {other}",
                    VERSION_FIELD.join(".")
                )));
            }
        };
        text.parse()
    }
}

/// Whether `target_dir` is exactly one of the agent's plugin search paths.
pub fn is_known(target_dir: &Path, facts: &AgentFacts) -> Result<bool> {
    let version = facts.agent_version()?;
    let reader = reader_for(version);
    tracing::debug!(
        "reading plugin search path from '{}' (agent version {})",
        reader.field_path().join("."),
        version
    );
    let entries = reader.read(facts)?;
    Ok(contains_exact(&entries, target_dir))
}

/// Exact string match; parents and descendants do not count.
pub fn contains_exact(entries: &[String], target_dir: &Path) -> bool {
    entries
        .iter()
        .any(|entry| Path::new(entry).as_os_str() == target_dir.as_os_str())
}
