//! Reload trigger fired when a plugin's content changes.
//!
//! The trigger does no work of its own; it records each firing and hands it
//! to whatever subscribed, synchronously and in subscription order.

use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    /// Plugin name the reload is keyed by.
    pub name: String,
    pub target_path: PathBuf,
}

type Subscriber = Box<dyn FnMut(&ReloadEvent)>;

struct Subscription {
    /// `None` receives every plugin's reloads.
    name: Option<String>,
    callback: Subscriber,
}

#[derive(Default)]
pub struct ReloadTrigger {
    subscriptions: Vec<Subscription>,
    fired: Vec<ReloadEvent>,
}

impl std::fmt::Debug for ReloadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadTrigger")
            .field("subscriptions", &self.subscriptions.len())
            .field("fired", &self.fired)
            .finish()
    }
}

impl ReloadTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to reloads of one plugin.
    pub fn on(&mut self, name: impl Into<String>, callback: impl FnMut(&ReloadEvent) + 'static) {
        self.subscriptions.push(Subscription {
            name: Some(name.into()),
            callback: Box::new(callback),
        });
    }

    /// Subscribe to reloads of every plugin.
    pub fn on_any(&mut self, callback: impl FnMut(&ReloadEvent) + 'static) {
        self.subscriptions.push(Subscription {
            name: None,
            callback: Box::new(callback),
        });
    }

    pub fn fire(&mut self, event: ReloadEvent) {
        tracing::info!(
            "reload triggered for plugin '{}' ({})",
            event.name,
            event.target_path.display()
        );
        for sub in self.subscriptions.iter_mut() {
            let wanted = sub.name.as_deref().is_none_or(|n| n == event.name);
            if wanted {
                (sub.callback)(&event);
            }
        }
        self.fired.push(event);
    }

    pub fn fired(&self) -> &[ReloadEvent] {
        &self.fired
    }

    pub fn fired_for(&self, name: &str) -> usize {
        self.fired.iter().filter(|e| e.name == name).count()
    }
}

/// Subscriber that runs `argv` once per reload, with the plugin name and path
/// exported as `AGENT_PLUGIN_NAME` / `AGENT_PLUGIN_PATH`.
pub fn command_subscriber(argv: Vec<String>) -> impl FnMut(&ReloadEvent) + 'static {
    move |event: &ReloadEvent| {
        let Some((program, args)) = argv.split_first() else {
            tracing::warn!("reload command is empty; nothing to run for '{}'", event.name);
            return;
        };
        let status = Command::new(program)
            .args(args)
            .env("AGENT_PLUGIN_NAME", &event.name)
            .env("AGENT_PLUGIN_PATH", &event.target_path)
            .status();
        match status {
            Ok(s) if s.success() => {
                tracing::debug!("reload command '{}' finished for '{}'", program, event.name)
            }
            Ok(s) => tracing::warn!(
                "reload command '{}' for '{}' exited with {}",
                program,
                event.name,
                s
            ),
            Err(e) => tracing::warn!(
                "reload command '{}' for '{}' failed to start: {}",
                program,
                event.name,
                e
            ),
        }
    }
}
