//! Plugin file placement with content change detection.

use std::io::Write as _;
use std::path::Path;

use crate::error::{DeployError, Result};
use crate::model::ChangeOutcome;
use crate::notify::{ReloadEvent, ReloadTrigger};
use crate::source::SourceStore;

/// Mode applied to deployed plugin files (rw-r--r--).
pub const PLUGIN_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwnership {
    pub uid: u32,
    pub gid: u32,
}

/// root:root
pub const ADMIN_OWNERSHIP: FileOwnership = FileOwnership { uid: 0, gid: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploySettings {
    /// `None` leaves ownership as created (unprivileged runs).
    pub ownership: Option<FileOwnership>,
    pub mode: u32,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            ownership: Some(ADMIN_OWNERSHIP),
            mode: PLUGIN_FILE_MODE,
        }
    }
}

/// Places plugin files and fires the reload trigger on content change.
#[derive(Debug, Clone)]
pub struct Deployer<S> {
    source: S,
    settings: DeploySettings,
}

impl<S: SourceStore> Deployer<S> {
    pub fn new(source: S, settings: DeploySettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Full deployment of one plugin: source, directory, file, notification.
    ///
    /// The source is read before anything touches the filesystem, and the
    /// reload fires only after the file landed with new content.
    pub fn converge(
        &self,
        name: &str,
        target_dir: &Path,
        target_path: &Path,
        source_reference: &str,
        reload: &mut ReloadTrigger,
    ) -> Result<ChangeOutcome> {
        let content = self
            .source
            .read(source_reference)
            .map_err(|source| DeployError::SourceUnavailable {
                name: name.to_string(),
                reference: source_reference.to_string(),
                source,
            })?;

        self.ensure_directory(target_dir)?;
        let outcome = self.ensure_file(target_dir, target_path, &content)?;

        if outcome.is_changed() {
            reload.fire(ReloadEvent {
                name: name.to_string(),
                target_path: target_path.to_path_buf(),
            });
        }
        Ok(outcome)
    }

    /// Create `dir` (recursively) when missing. Existing directories are left
    /// alone, ownership and mode included. Returns whether it was created.
    pub fn ensure_directory(&self, dir: &Path) -> Result<bool> {
        if dir.exists() {
            tracing::debug!("plugin directory {} already present", dir.display());
            return Ok(false);
        }
        std::fs::create_dir_all(dir).map_err(|e| DeployError::write_failure(dir, e))?;
        tracing::info!("created plugin directory {}", dir.display());
        Ok(true)
    }

    /// Make `target_path` hold exactly `content` with the configured mode and
    /// ownership. Only a content difference counts as a change.
    pub fn ensure_file(
        &self,
        target_dir: &Path,
        target_path: &Path,
        content: &[u8],
    ) -> Result<ChangeOutcome> {
        let outcome = match std::fs::read(target_path) {
            Ok(current) if current == content => ChangeOutcome::Unchanged,
            Ok(_) => ChangeOutcome::Changed,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ChangeOutcome::Changed,
            Err(e) => return Err(DeployError::write_failure(target_path, e)),
        };

        if outcome.is_changed() {
            // Mode and owner are set on the temp file before the rename.
            self.replace_atomically(target_dir, target_path, content)?;
            tracing::info!(
                "wrote plugin {} ({} bytes)",
                target_path.display(),
                content.len()
            );
        } else {
            tracing::debug!("plugin {} is up to date", target_path.display());
            self.apply_attributes(target_path)?;
        }
        Ok(outcome)
    }

    fn replace_atomically(&self, target_dir: &Path, target_path: &Path, content: &[u8]) -> Result<()> {
        let fail = |e: std::io::Error| DeployError::write_failure(target_path, e);

        // Same directory as the target so the final rename never crosses devices.
        let mut tmp = tempfile::Builder::new()
            .prefix(".agent-plugin-")
            .tempfile_in(target_dir)
            .map_err(fail)?;
        tmp.write_all(content).map_err(fail)?;
        tmp.as_file().sync_all().map_err(fail)?;
        self.apply_attributes(tmp.path())?;
        tmp.persist(target_path).map_err(|e| fail(e.error))?;
        Ok(())
    }

    #[cfg(unix)]
    fn apply_attributes(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let fail = |e: std::io::Error| DeployError::write_failure(path, e);
        let meta = std::fs::metadata(path).map_err(fail)?;

        if meta.permissions().mode() & 0o7777 != self.settings.mode {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.settings.mode))
                .map_err(fail)?;
            tracing::debug!("set mode {:o} on {}", self.settings.mode, path.display());
        }

        if let Some(owner) = self.settings.ownership
            && (meta.uid() != owner.uid || meta.gid() != owner.gid)
        {
            std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid)).map_err(fail)?;
            tracing::debug!(
                "set owner {}:{} on {}",
                owner.uid,
                owner.gid,
                path.display()
            );
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn apply_attributes(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::MemorySource;

    fn unprivileged() -> DeploySettings {
        DeploySettings {
            ownership: None,
            mode: PLUGIN_FILE_MODE,
        }
    }

    fn deployer(content: &str) -> Deployer<MemorySource> {
        let mut src = MemorySource::new();
        src.insert("net_monitor.rb", content);
        Deployer::new(src, unprivileged())
    }

    #[test]
    fn first_run_creates_dir_and_file_then_second_run_is_noop() {
        let tmp = tempfile::tempdir().expect("tmp");
        let dir = tmp.path().join("config/agent/plugins");
        let path = dir.join("net_monitor");
        let d = deployer("Agent.plugin(:Net) {}");
        let mut reload = ReloadTrigger::new();

        let first = d
            .converge("net_monitor", &dir, &path, "net_monitor.rb", &mut reload)
            .unwrap();
        assert_eq!(first, ChangeOutcome::Changed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Agent.plugin(:Net) {}");
        assert_eq!(reload.fired_for("net_monitor"), 1);

        let second = d
            .converge("net_monitor", &dir, &path, "net_monitor.rb", &mut reload)
            .unwrap();
        assert_eq!(second, ChangeOutcome::Unchanged);
        assert_eq!(reload.fired_for("net_monitor"), 1);
    }

    #[test]
    fn differing_content_is_replaced_and_reload_fires_once() {
        let tmp = tempfile::tempdir().expect("tmp");
        let dir = tmp.path().to_path_buf();
        let path = dir.join("net_monitor");
        std::fs::write(&path, "old").unwrap();
        let mut reload = ReloadTrigger::new();

        let outcome = deployer("new")
            .converge("net_monitor", &dir, &path, "net_monitor.rb", &mut reload)
            .unwrap();
        assert_eq!(outcome, ChangeOutcome::Changed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(reload.fired().len(), 1);
    }

    #[test]
    fn missing_source_fails_before_touching_disk() {
        let tmp = tempfile::tempdir().expect("tmp");
        let dir = tmp.path().join("agent/plugins");
        let path = dir.join("net_monitor");
        let mut reload = ReloadTrigger::new();

        let err = deployer("x")
            .converge("net_monitor", &dir, &path, "other.rb", &mut reload)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert!(!dir.exists());
        assert!(reload.fired().is_empty());
    }

    #[test]
    fn existing_directory_mode_is_left_alone() {
        let tmp = tempfile::tempdir().expect("tmp");
        let dir = tmp.path().join("plugins");
        std::fs::create_dir(&dir).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)).unwrap();
        }
        let created = deployer("x").ensure_directory(&dir).unwrap();
        assert!(!created);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[cfg(unix)]
    #[test]
    fn mode_is_enforced_without_counting_as_change() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tmp");
        let dir = tmp.path().to_path_buf();
        let path = dir.join("net_monitor");
        std::fs::write(&path, "same").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let outcome = deployer("same").ensure_file(&dir, &path, b"same").unwrap();
        assert_eq!(outcome, ChangeOutcome::Unchanged);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, PLUGIN_FILE_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn new_file_gets_plugin_mode_and_requested_owner() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let tmp = tempfile::tempdir().expect("tmp");
        let dir_meta = std::fs::metadata(tmp.path()).unwrap();
        // Chown to ourselves succeeds without privileges.
        let settings = DeploySettings {
            ownership: Some(FileOwnership {
                uid: dir_meta.uid(),
                gid: dir_meta.gid(),
            }),
            mode: PLUGIN_FILE_MODE,
        };
        let d = Deployer::new(MemorySource::new(), settings);
        let path = tmp.path().join("p");
        d.ensure_file(tmp.path(), &path, b"content").unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);
        assert_eq!(meta.uid(), dir_meta.uid());
    }

    #[test]
    fn unwritable_destination_is_write_failure_without_reload() {
        let tmp = tempfile::tempdir().expect("tmp");
        // A regular file where the directory should be.
        let blocker = tmp.path().join("plugins");
        std::fs::write(&blocker, "not a dir").unwrap();
        let dir = blocker.join("nested");
        let path = dir.join("net_monitor");
        let mut reload = ReloadTrigger::new();

        let err = deployer("x")
            .converge("net_monitor", &dir, &path, "net_monitor.rb", &mut reload)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert!(reload.fired().is_empty());
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn failed_replace_keeps_previous_plugin() {
        let tmp = tempfile::tempdir().expect("tmp");
        let plugins = tmp.path().join("plugins");
        std::fs::create_dir(&plugins).unwrap();
        let path = plugins.join("net_monitor");
        std::fs::write(&path, "old").unwrap();
        // Temp files cannot be created inside a regular file.
        let not_a_dir = tmp.path().join("staging");
        std::fs::write(&not_a_dir, "").unwrap();
        let mut reload = ReloadTrigger::new();

        let err = deployer("new")
            .converge("net_monitor", &not_a_dir, &path, "net_monitor.rb", &mut reload)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
        assert_eq!(entries(&plugins), vec!["net_monitor".to_string()]);
        assert_eq!(
            entries(tmp.path()),
            vec!["plugins".to_string(), "staging".to_string()]
        );
        assert!(reload.fired().is_empty());
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let tmp = tempfile::tempdir().expect("tmp");
        let dir = tmp.path().join("plugins");
        std::fs::create_dir(&dir).unwrap();
        // Rename target whose parent does not exist.
        let path = tmp.path().join("missing/net_monitor");
        let mut reload = ReloadTrigger::new();

        let err = deployer("new")
            .converge("net_monitor", &dir, &path, "net_monitor.rb", &mut reload)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert!(entries(&dir).is_empty(), "{:?}", entries(&dir));
        assert!(!path.exists());
        assert!(reload.fired().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn replaced_file_gets_plugin_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tmp");
        let path = tmp.path().join("net_monitor");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let outcome = deployer("new").ensure_file(tmp.path(), &path, b"new").unwrap();
        assert_eq!(outcome, ChangeOutcome::Changed);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, PLUGIN_FILE_MODE);
    }

    #[test]
    fn no_temp_files_are_left_behind() {
        let tmp = tempfile::tempdir().expect("tmp");
        let dir = tmp.path().to_path_buf();
        let path = dir.join("net_monitor");
        deployer("x").ensure_file(&dir, &path, b"x").unwrap();
        assert_eq!(entries(&dir), vec!["net_monitor".to_string()]);
    }
}
