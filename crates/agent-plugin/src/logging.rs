//! Tracing setup: env flags first, then the `[logging]` table of the user
//! config, then defaults.

use std::path::{Path, PathBuf};

use env_flags::env_flags;
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingCfg;

const LOG_FILE_NAME: &str = "agent-plugin.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    Json,
    Compact,
    Pretty,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub filter: String,
    pub json: bool,
    pub compact: bool,
    pub pretty: bool,
    pub to_file: bool,
    pub dir: Option<PathBuf>,
}

impl LoggingOptions {
    pub fn from_env() -> Self {
        env_flags! {
            /// Tracing filter, e.g. "info", "debug", or targets format.
            RUST_LOG: &str = "info";
            /// Preferred filter env (alias). If set, overrides RUST_LOG.
            TRACING_FILTER: &str = "";
            /// Pretty formatting for logs (ignored if TRACING_JSON=true).
            TRACING_PRETTY: bool = false;
            /// Compact single-line formatting (ignored if TRACING_JSON=true).
            TRACING_COMPACT: bool = true;
            /// JSON formatting for logs
            TRACING_JSON: bool = false;
            /// Also log to a daily file under <AGENT_PLUGIN_HOME>/logs or LOG_DIR
            LOG_TO_FILE: bool = false;
            /// Optional explicit log directory (absolute).
            LOG_DIR: &str = "";
        }

        let filter = if !(*TRACING_FILTER).is_empty() {
            (*TRACING_FILTER).to_string()
        } else {
            (*RUST_LOG).to_string()
        };
        Self {
            filter,
            json: *TRACING_JSON,
            compact: *TRACING_COMPACT,
            pretty: *TRACING_PRETTY,
            to_file: *LOG_TO_FILE,
            dir: (!(*LOG_DIR).is_empty()).then(|| PathBuf::from((*LOG_DIR).to_string())),
        }
    }

    /// Fill in from the user config wherever the environment said nothing.
    pub fn with_user_config(mut self, cfg: &LoggingCfg, env_set: impl Fn(&str) -> bool) -> Self {
        if !(env_set("TRACING_FILTER") || env_set("RUST_LOG"))
            && let Some(level) = cfg.level.as_ref()
        {
            self.filter = level.clone();
        }
        if !env_set("TRACING_JSON")
            && let Some(v) = cfg.json
        {
            self.json = v;
        }
        if !env_set("TRACING_COMPACT")
            && let Some(v) = cfg.compact
        {
            self.compact = v;
        }
        if !env_set("TRACING_PRETTY")
            && let Some(v) = cfg.pretty
        {
            self.pretty = v;
        }
        if !env_set("LOG_TO_FILE")
            && let Some(v) = cfg.to_file
        {
            self.to_file = v;
        }
        if !env_set("LOG_DIR")
            && let Some(dir) = cfg.dir.as_ref()
        {
            self.dir = Some(crate::config::expand_home(dir));
        }
        self
    }

    pub fn style(&self) -> LogStyle {
        if self.json {
            LogStyle::Json
        } else if self.compact {
            LogStyle::Compact
        } else if self.pretty {
            LogStyle::Pretty
        } else {
            LogStyle::Full
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(style: LogStyle, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);
    match style {
        LogStyle::Json => base.json().boxed(),
        LogStyle::Compact => base.compact().boxed(),
        LogStyle::Pretty => base.pretty().boxed(),
        LogStyle::Full => base.boxed(),
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries the run
/// report.
pub fn init_tracing(home: &Path, user_cfg: Option<&LoggingCfg>) {
    let env_set = |k: &str| std::env::var_os(k).is_some();
    let mut opts = LoggingOptions::from_env();
    if let Some(cfg) = user_cfg {
        opts = opts.with_user_config(cfg, env_set);
    }

    static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

    let filter = EnvFilter::try_new(&opts.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let style = opts.style();
    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(style, std::io::stderr, true)];

    let mut dir_error = None;
    if opts.to_file {
        let dir = opts.dir.clone().unwrap_or_else(|| home.join("logs"));
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_NAME);
                let (nb, guard) = tracing_appender::non_blocking(appender);
                let _ = FILE_GUARD.set(guard);
                layers.push(fmt_layer(style, nb, false));
            }
            Err(e) => dir_error = Some((dir, e)),
        }
    }

    if let Err(e) = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
    {
        tracing::debug!("tracing already set: {:?}", e);
    }
    if let Some((dir, e)) = dir_error {
        tracing::warn!("failed to create log dir {}: {}", dir.display(), e);
    }
}
