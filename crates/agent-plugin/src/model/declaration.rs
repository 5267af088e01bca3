//! Plugin declarations and the declarations file format.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::{DeployError, Result};

/// Actions a declared unit can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginAction {
    /// Deploy the plugin file and fire a reload on change.
    Create,
    /// Declared but inert until something else acts on it.
    Nothing,
}

/// One declared plugin unit. Immutable once declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDeclaration {
    pub name: String,
    pub path: Option<PathBuf>,
    pub source: Option<String>,
    pub compile_time: bool,
    pub actions: Vec<PluginAction>,
}

impl PluginDeclaration {
    /// A `create` declaration with every optional input left unset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            source: None,
            compile_time: true,
            actions: vec![PluginAction::Create],
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_compile_time(mut self, compile_time: bool) -> Self {
        self.compile_time = compile_time;
        self
    }

    pub fn with_actions(mut self, actions: Vec<PluginAction>) -> Self {
        self.actions = actions;
        self
    }

    /// The source reference to deploy, falling back to `<name>.rb`.
    pub fn source_reference(&self) -> String {
        source_reference_for(&self.name, self.source.as_deref())
    }
}

pub fn source_reference_for(name: &str, source: Option<&str>) -> String {
    match source {
        Some(s) => s.to_string(),
        None => format!("{name}.rb"),
    }
}

/// A plugin name must be a single plain file name so `<target_dir>/<name>`
/// stays inside `target_dir`.
pub fn validate_plugin_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DeployError::Declaration("plugin name is empty".to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(DeployError::Declaration(format!(
            "plugin name '{name}' must be a single file name"
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActionSpec {
    One(PluginAction),
    Many(Vec<PluginAction>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDeclaration {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default = "default_compile_time")]
    compile_time: bool,
    #[serde(default)]
    action: Option<ActionSpec>,
}

fn default_compile_time() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawDeclarationsFile {
    #[serde(default)]
    plugins: Vec<RawDeclaration>,
}

/// Parse a declarations TOML document (`[[plugins]]` tables).
pub fn declarations_from_toml_str(s: &str) -> Result<Vec<PluginDeclaration>> {
    let raw: RawDeclarationsFile =
        toml::from_str(s).map_err(|e| DeployError::Declaration(e.to_string()))?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.plugins.len());
    for rd in raw.plugins {
        validate_plugin_name(&rd.name)?;
        if !seen.insert(rd.name.clone()) {
            return Err(DeployError::Declaration(format!(
                "plugin '{}' is declared more than once",
                rd.name
            )));
        }
        let actions = match rd.action {
            None => vec![PluginAction::Create],
            Some(ActionSpec::One(a)) => vec![a],
            Some(ActionSpec::Many(list)) => list,
        };
        out.push(PluginDeclaration {
            name: rd.name,
            path: rd.path.as_deref().map(crate::config::expand_home),
            source: rd.source,
            compile_time: rd.compile_time,
            actions,
        });
    }
    Ok(out)
}

pub fn load_declarations(path: &Path) -> anyhow::Result<Vec<PluginDeclaration>> {
    use anyhow::Context as _;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading declarations {}", path.display()))?;
    Ok(declarations_from_toml_str(&content)?)
}
