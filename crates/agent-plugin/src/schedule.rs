//! Immediate vs deferred execution of declared plugin units.
//!
//! Units declared with `compile_time = true` converge synchronously inside
//! [`Scheduler::declare`], so later declarations (or anything re-collecting
//! facts) can rely on the plugin already being in place. Everything else
//! waits for [`Scheduler::converge_deferred`], which runs in declaration order.

use std::collections::HashSet;

use crate::error::{DeployError, ErrorKind, Result};
use crate::model::{
    ChangeOutcome, PluginAction, PluginDeclaration, ResolvedPlan, validate_plugin_name,
};
use crate::notify::ReloadTrigger;
use crate::reconcile::Reconciler;
use crate::resolve::ConfigDirectoryProvider;
use crate::source::SourceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Immediate,
    Deferred,
}

impl Schedule {
    pub fn for_declaration(decl: &PluginDeclaration) -> Self {
        if decl.compile_time {
            Schedule::Immediate
        } else {
            Schedule::Deferred
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Declared,
    Deferred,
    RunningNow,
    Converged(ChangeOutcome),
    Failed(ErrorKind),
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Converged(_) | UnitState::Failed(_))
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitState::Declared => f.write_str("declared"),
            UnitState::Deferred => f.write_str("deferred"),
            UnitState::RunningNow => f.write_str("running"),
            UnitState::Converged(outcome) => write!(f, "converged ({outcome})"),
            UnitState::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnitRecord {
    pub declaration: PluginDeclaration,
    pub state: UnitState,
    pub plan: Option<ResolvedPlan>,
    pub error: Option<String>,
}

pub struct Scheduler<P, S> {
    reconciler: Reconciler<P, S>,
    reload: ReloadTrigger,
    units: Vec<UnitRecord>,
    names: HashSet<String>,
}

impl<P: ConfigDirectoryProvider, S: SourceStore> Scheduler<P, S> {
    pub fn new(reconciler: Reconciler<P, S>, reload: ReloadTrigger) -> Self {
        Self {
            reconciler,
            reload,
            units: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Declare a unit. Immediate units converge before this returns and their
    /// failure is returned here; deferred units are only queued.
    pub fn declare(&mut self, decl: PluginDeclaration) -> Result<UnitState> {
        validate_plugin_name(&decl.name)?;
        if !self.names.insert(decl.name.clone()) {
            return Err(DeployError::Declaration(format!(
                "plugin '{}' is declared more than once",
                decl.name
            )));
        }
        let schedule = Schedule::for_declaration(&decl);
        self.units.push(UnitRecord {
            declaration: decl,
            state: UnitState::Declared,
            plan: None,
            error: None,
        });
        let idx = self.units.len() - 1;

        match schedule {
            Schedule::Immediate => {
                self.run_unit(idx)?;
            }
            Schedule::Deferred => {
                tracing::debug!(
                    "plugin '{}' deferred to the convergence sweep",
                    self.units[idx].declaration.name
                );
                self.units[idx].state = UnitState::Deferred;
            }
        }
        Ok(self.units[idx].state)
    }

    /// Run every deferred unit in declaration order, stopping at the first
    /// failure. Units after a failure stay `Deferred`.
    pub fn converge_deferred(&mut self) -> Result<()> {
        let pending: Vec<usize> = self
            .units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.state == UnitState::Deferred)
            .map(|(i, _)| i)
            .collect();
        tracing::info!("converging {} deferred plugin unit(s)", pending.len());
        for idx in pending {
            self.run_unit(idx)?;
        }
        Ok(())
    }

    pub fn units(&self) -> &[UnitRecord] {
        &self.units
    }

    pub fn reload(&self) -> &ReloadTrigger {
        &self.reload
    }

    pub fn has_failures(&self) -> bool {
        self.units
            .iter()
            .any(|u| matches!(u.state, UnitState::Failed(_)))
    }

    fn run_unit(&mut self, idx: usize) -> Result<()> {
        self.units[idx].state = UnitState::RunningNow;
        let decl = self.units[idx].declaration.clone();
        match self.run_actions(&decl) {
            Ok((plan, outcome)) => {
                let unit = &mut self.units[idx];
                unit.plan = plan;
                unit.state = UnitState::Converged(outcome);
                Ok(())
            }
            Err(e) => {
                tracing::error!("plugin '{}' failed: {}", decl.name, e);
                let unit = &mut self.units[idx];
                unit.state = UnitState::Failed(e.kind());
                unit.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn run_actions(
        &mut self,
        decl: &PluginDeclaration,
    ) -> Result<(Option<ResolvedPlan>, ChangeOutcome)> {
        let mut plan = None;
        let mut outcome = ChangeOutcome::Unchanged;
        for action in &decl.actions {
            match action {
                PluginAction::Create => {
                    let report = self.reconciler.reconcile(decl, &mut self.reload)?;
                    if report.outcome.is_changed() {
                        outcome = ChangeOutcome::Changed;
                    }
                    plan = Some(report.plan);
                }
                PluginAction::Nothing => {
                    tracing::debug!("plugin '{}': nothing to do", decl.name);
                }
            }
        }
        Ok((plan, outcome))
    }
}
