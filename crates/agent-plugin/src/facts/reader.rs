use serde_json::Value as JsonValue;

use super::{AgentFacts, AgentVersion};
use crate::error::{DeployError, Result};

/// Reads the agent's plugin search path from one facts layout.
pub trait PluginSearchPathReader {
    fn field_path(&self) -> &'static [&'static str];

    fn read(&self, facts: &AgentFacts) -> Result<Vec<String>> {
        let field = self.field_path();
        let value = facts.lookup(field).ok_or_else(|| {
            DeployError::Facts(format!("missing field '{}'", field.join(".")))
        })?;
        search_path_entries(value).ok_or_else(|| {
            DeployError::Facts(format!(
                "'{}' is neither a string nor a list of strings",
                field.join(".")
            ))
        })
    }
}

/// Agent versions up to and including 8.6: `agent_config.plugin_path`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySearchPathReader;

impl PluginSearchPathReader for LegacySearchPathReader {
    fn field_path(&self) -> &'static [&'static str] {
        &["agent_config", "plugin_path"]
    }
}

/// Agent versions after 8.6: `agent_config.agent.plugin_path`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NestedSearchPathReader;

impl PluginSearchPathReader for NestedSearchPathReader {
    fn field_path(&self) -> &'static [&'static str] {
        &["agent_config", "agent", "plugin_path"]
    }
}

pub fn reader_for(version: AgentVersion) -> Box<dyn PluginSearchPathReader> {
    if version.uses_legacy_layout() {
        Box::new(LegacySearchPathReader)
    } else {
        Box::new(NestedSearchPathReader)
    }
}

fn search_path_entries(value: &JsonValue) -> Option<Vec<String>> {
    match value {
        JsonValue::String(s) => Some(vec![s.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}
