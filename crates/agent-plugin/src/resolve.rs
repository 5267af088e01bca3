//! Desired plugin directory resolution.

use std::path::{Path, PathBuf};

use crate::error::{DeployError, Result};

/// Default directory, relative to the client config directory, that plugins
/// are deployed into.
pub const DEFAULT_PLUGIN_SUBDIR: &str = "agent/plugins";

/// Source of the active configuration engine's config file location.
pub trait ConfigDirectoryProvider {
    /// `None` when running without a persisted config file (standalone/solo).
    fn current_config_file_path(&self) -> Option<PathBuf>;
}

/// Provider backed by a known (or unknown) client config file path.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigFile {
    pub path: Option<PathBuf>,
}

impl ClientConfigFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ConfigDirectoryProvider for ClientConfigFile {
    fn current_config_file_path(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}

/// Resolves plugin directories for declared units.
#[derive(Debug, Clone)]
pub struct PathResolver<P> {
    provider: P,
    subdir: PathBuf,
}

impl<P: ConfigDirectoryProvider> PathResolver<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            subdir: PathBuf::from(DEFAULT_PLUGIN_SUBDIR),
        }
    }

    pub fn with_subdir(mut self, subdir: impl Into<PathBuf>) -> Self {
        self.subdir = subdir.into();
        self
    }

    /// Explicit path wins verbatim; otherwise `<config dir>/<subdir>`.
    pub fn resolve(&self, name: &str, explicit_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(p) = explicit_path {
            return Ok(p.to_path_buf());
        }
        let dir = self.config_directory(name)?;
        Ok(dir.join(&self.subdir))
    }

    fn config_directory(&self, name: &str) -> Result<PathBuf> {
        let unresolvable = || DeployError::ConfigDirectoryUnresolvable {
            name: name.to_string(),
        };
        let file = self
            .provider
            .current_config_file_path()
            .ok_or_else(unresolvable)?;
        // A bare file name has an empty parent; treat it as the working dir.
        match file.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Ok(PathBuf::from(".")),
            Some(parent) => Ok(parent.to_path_buf()),
            None => Err(unresolvable()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn resolver(config: Option<&str>) -> PathResolver<ClientConfigFile> {
        PathResolver::new(ClientConfigFile::new(config.map(PathBuf::from)))
    }

    #[test]
    fn explicit_path_is_returned_verbatim() {
        let r = resolver(None);
        let dir = r
            .resolve("net_monitor", Some(Path::new("relative/../odd//dir")))
            .unwrap();
        assert_eq!(dir, PathBuf::from("relative/../odd//dir"));
    }

    #[test]
    fn derived_path_uses_config_dir() {
        let r = resolver(Some("/etc/app/config/client.rb"));
        let dir = r.resolve("net_monitor", None).unwrap();
        assert_eq!(dir, PathBuf::from("/etc/app/config/agent/plugins"));
    }

    #[test]
    fn custom_subdir_replaces_default_suffix() {
        let r = resolver(Some("/etc/app/client.rb")).with_subdir("collector/plugins");
        assert_eq!(
            r.resolve("x", None).unwrap(),
            PathBuf::from("/etc/app/collector/plugins")
        );
    }

    #[test]
    fn missing_config_file_is_fatal() {
        let err = resolver(None).resolve("net_monitor", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigDirectoryUnresolvable);
    }

    proptest! {
        #[test]
        fn resolve_is_deterministic(
            dir in "/[a-z]{1,8}(/[a-z]{1,8}){0,3}",
            name in "[a-z_]{1,12}",
        ) {
            let r = resolver(Some(&format!("{dir}/client.rb")));
            let first = r.resolve(&name, None).unwrap();
            let second = r.resolve(&name, None).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first, PathBuf::from(&dir).join("agent/plugins"));
        }
    }
}
