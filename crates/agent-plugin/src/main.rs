use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use env_flags::env_flags;

use agent_plugin::config::{self, DeployCfg, expand_home};
use agent_plugin::deploy::{ADMIN_OWNERSHIP, DeploySettings, Deployer, FileOwnership, PLUGIN_FILE_MODE};
use agent_plugin::facts::AgentFacts;
use agent_plugin::logging::init_tracing;
use agent_plugin::model::{PluginDeclaration, load_declarations};
use agent_plugin::notify::{ReloadTrigger, command_subscriber};
use agent_plugin::reconcile::Reconciler;
use agent_plugin::resolve::{ClientConfigFile, PathResolver};
use agent_plugin::schedule::Scheduler;
use agent_plugin::source::DirectorySource;

/// Inputs for one run after env flags and the user config are merged.
struct RunSettings {
    client_config_file: Option<PathBuf>,
    plugin_subdir: Option<PathBuf>,
    facts_file: PathBuf,
    source_dir: PathBuf,
    declarations: Vec<PluginDeclaration>,
    deploy: DeploySettings,
    reload_command: Option<Vec<String>>,
}

fn agent_plugin_home() -> PathBuf {
    env_flags! {
        /// Home for config.toml, facts, sources and logs. Defaults to $HOME/.agent-plugin
        AGENT_PLUGIN_HOME: &str = "";
    }
    if !(*AGENT_PLUGIN_HOME).is_empty() {
        return PathBuf::from((*AGENT_PLUGIN_HOME).to_string());
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".agent-plugin");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".agent-plugin")
}

/// Non-empty env value, else the user config value.
fn pick(env: &str, cfg: Option<&String>) -> Option<PathBuf> {
    if !env.is_empty() {
        return Some(expand_home(env));
    }
    cfg.map(|s| expand_home(s))
}

fn resolve_settings(home: &Path, cfg: Option<&DeployCfg>) -> anyhow::Result<RunSettings> {
    env_flags! {
        /// Client config file; its directory hosts agent/plugins. Empty means standalone.
        CLIENT_CONFIG_FILE: &str = "";
        /// Replaces the agent/plugins suffix under the config directory.
        PLUGIN_SUBDIR: &str = "";
        /// Agent facts JSON. Defaults to <home>/facts.json
        AGENT_FACTS_FILE: &str = "";
        /// Directory source references resolve under. Defaults to <home>/files
        PLUGIN_SOURCE_DIR: &str = "";
        /// Declarations TOML. Defaults to <home>/plugins.toml
        PLUGIN_DECLARATIONS: &str = "";
        /// Declare a single plugin instead of reading a declarations file.
        PLUGIN_NAME: &str = "";
        PLUGIN_PATH: &str = "";
        PLUGIN_SOURCE: &str = "";
        PLUGIN_COMPILE_TIME: bool = true;
        /// Leave ownership alone (unprivileged runs).
        PLUGIN_SKIP_OWNERSHIP: bool = false;
    }

    let client_config_file = pick(*CLIENT_CONFIG_FILE, cfg.and_then(|c| c.client_config_file.as_ref()));
    let plugin_subdir = pick(*PLUGIN_SUBDIR, cfg.and_then(|c| c.plugin_subdir.as_ref()));
    let facts_file = pick(*AGENT_FACTS_FILE, cfg.and_then(|c| c.facts_file.as_ref()))
        .unwrap_or_else(|| home.join("facts.json"));
    let source_dir = pick(*PLUGIN_SOURCE_DIR, cfg.and_then(|c| c.source_dir.as_ref()))
        .unwrap_or_else(|| home.join("files"));

    let declarations = if !(*PLUGIN_NAME).is_empty() {
        let mut decl =
            PluginDeclaration::new((*PLUGIN_NAME).to_string()).with_compile_time(*PLUGIN_COMPILE_TIME);
        if !(*PLUGIN_PATH).is_empty() {
            decl = decl.with_path(expand_home(*PLUGIN_PATH));
        }
        if !(*PLUGIN_SOURCE).is_empty() {
            decl = decl.with_source((*PLUGIN_SOURCE).to_string());
        }
        vec![decl]
    } else {
        let path = pick(*PLUGIN_DECLARATIONS, cfg.and_then(|c| c.declarations_file.as_ref()))
            .unwrap_or_else(|| home.join("plugins.toml"));
        load_declarations(&path)?
    };

    let skip_ownership = *PLUGIN_SKIP_OWNERSHIP || cfg.and_then(|c| c.skip_ownership).unwrap_or(false);
    let ownership = if skip_ownership {
        None
    } else {
        Some(FileOwnership {
            uid: cfg.and_then(|c| c.owner_uid).unwrap_or(ADMIN_OWNERSHIP.uid),
            gid: cfg.and_then(|c| c.owner_gid).unwrap_or(ADMIN_OWNERSHIP.gid),
        })
    };

    Ok(RunSettings {
        client_config_file,
        plugin_subdir,
        facts_file,
        source_dir,
        declarations,
        deploy: DeploySettings {
            ownership,
            mode: PLUGIN_FILE_MODE,
        },
        reload_command: cfg.and_then(|c| c.reload_command.clone()),
    })
}

/// Declare every unit, then sweep the deferred ones. Returns whether all
/// declared units converged.
fn run(settings: RunSettings) -> anyhow::Result<bool> {
    let facts = AgentFacts::load(&settings.facts_file)
        .with_context(|| format!("loading agent facts from {}", settings.facts_file.display()))?;

    let mut resolver = PathResolver::new(ClientConfigFile::new(settings.client_config_file.clone()));
    if let Some(subdir) = settings.plugin_subdir {
        resolver = resolver.with_subdir(subdir);
    }
    tracing::debug!("plugin sources under {}", settings.source_dir.display());
    let deployer = Deployer::new(DirectorySource::new(&settings.source_dir), settings.deploy);
    let reconciler = Reconciler::new(resolver, deployer, facts);

    let mut reload = ReloadTrigger::new();
    if let Some(argv) = settings.reload_command {
        reload.on_any(command_subscriber(argv));
    }
    let mut scheduler = Scheduler::new(reconciler, reload);

    tracing::info!(
        "declaring {} plugin unit(s) (client config: {})",
        settings.declarations.len(),
        settings
            .client_config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    // An immediate unit failing aborts the run, like any other fatal error
    // during declaration; deferred units never get their sweep.
    let mut aborted = false;
    for decl in settings.declarations {
        if scheduler.declare(decl).is_err() {
            aborted = true;
            break;
        }
    }
    if !aborted && scheduler.converge_deferred().is_err() {
        aborted = true;
    }

    for unit in scheduler.units() {
        let target = unit
            .plan
            .as_ref()
            .map(|p| p.target_path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        match unit.error.as_deref() {
            Some(err) => println!("{}\t{}\t{}\t{}", unit.declaration.name, unit.state, target, err),
            None => println!("{}\t{}\t{}", unit.declaration.name, unit.state, target),
        }
    }
    println!("reloads fired: {}", scheduler.reload().fired().len());

    Ok(!aborted && !scheduler.has_failures())
}

fn main() -> ExitCode {
    let home = agent_plugin_home();
    let user_cfg = config::load_user_config(&home);

    let logging_cfg = user_cfg
        .as_ref()
        .ok()
        .and_then(|c| c.as_ref())
        .and_then(|c| c.logging.as_ref());
    init_tracing(&home, logging_cfg);
    tracing::info!("agent-plugin starting (home={})", home.display());

    let user_cfg = match user_cfg {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("failed to read {}: {:#}", home.join("config.toml").display(), e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = resolve_settings(&home, user_cfg.as_ref().and_then(|c| c.deploy.as_ref()))
        .and_then(run);
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
