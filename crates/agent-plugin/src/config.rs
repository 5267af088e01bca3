use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct UserConfig {
    pub logging: Option<LoggingCfg>,
    pub deploy: Option<DeployCfg>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingCfg {
    pub to_file: Option<bool>,
    pub dir: Option<String>,
    pub json: Option<bool>,
    pub compact: Option<bool>,
    pub pretty: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeployCfg {
    /// Client config file whose directory hosts `agent/plugins`.
    pub client_config_file: Option<String>,
    /// Replaces the `agent/plugins` suffix under the config directory.
    pub plugin_subdir: Option<String>,
    /// JSON facts collected by the agent.
    pub facts_file: Option<String>,
    /// Root that source references are looked up under.
    pub source_dir: Option<String>,
    pub declarations_file: Option<String>,

    pub owner_uid: Option<u32>,
    pub owner_gid: Option<u32>,
    /// Skip chown entirely (unprivileged runs).
    pub skip_ownership: Option<bool>,

    /// Program run once per fired reload, e.g. the agent's collector.
    pub reload_command: Option<Vec<String>>,
}

pub fn load_user_config(home: &Path) -> anyhow::Result<Option<UserConfig>> {
    let path = home.join("config.toml");
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path)?;
    let cfg: UserConfig = toml::from_str(&s)?;
    Ok(Some(cfg))
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_none() {
        let tmp = tempfile::tempdir().expect("tmp");
        assert!(load_user_config(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn parses_logging_and_deploy_tables() {
        let tmp = tempfile::tempdir().expect("tmp");
        std::fs::write(
            tmp.path().join("config.toml"),
            r#"
[logging]
level = "debug"
json = true

[deploy]
client_config_file = "/etc/app/config/client.rb"
owner_uid = 0
owner_gid = 0
reload_command = ["agent", "--collect"]
"#,
        )
        .unwrap();
        let cfg = load_user_config(tmp.path()).unwrap().expect("config present");
        let logging = cfg.logging.expect("logging");
        assert_eq!(logging.level.as_deref(), Some("debug"));
        assert_eq!(logging.json, Some(true));
        let deploy = cfg.deploy.expect("deploy");
        assert_eq!(
            deploy.client_config_file.as_deref(),
            Some("/etc/app/config/client.rb")
        );
        assert_eq!(deploy.owner_uid, Some(0));
        assert_eq!(
            deploy.reload_command,
            Some(vec!["agent".to_string(), "--collect".to_string()])
        );
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/etc/app"), PathBuf::from("/etc/app"));
    }
}
