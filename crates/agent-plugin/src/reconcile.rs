//! One reconciliation pass for a declared plugin.
//!
//! resolve → check search path → warn → ensure directory → ensure file →
//! reload on change. Every pass re-derives the plan from the declaration and
//! what is currently on disk; nothing carries over between passes.

use crate::deploy::Deployer;
use crate::error::Result;
use crate::facts::{AgentFacts, is_known};
use crate::model::{ChangeOutcome, PluginDeclaration, ResolvedPlan, validate_plugin_name};
use crate::notify::ReloadTrigger;
use crate::resolve::{ConfigDirectoryProvider, PathResolver};
use crate::source::SourceStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub plan: ResolvedPlan,
    pub outcome: ChangeOutcome,
}

pub struct Reconciler<P, S> {
    resolver: PathResolver<P>,
    deployer: Deployer<S>,
    facts: AgentFacts,
}

impl<P: ConfigDirectoryProvider, S: SourceStore> Reconciler<P, S> {
    pub fn new(resolver: PathResolver<P>, deployer: Deployer<S>, facts: AgentFacts) -> Self {
        Self {
            resolver,
            deployer,
            facts,
        }
    }

    /// Resolve where `decl` goes and whether the agent already scans there.
    /// Emits the search-path warning; touches nothing on disk.
    pub fn plan(&self, decl: &PluginDeclaration) -> Result<ResolvedPlan> {
        validate_plugin_name(&decl.name)?;
        let target_dir = self.resolver.resolve(&decl.name, decl.path.as_deref())?;
        let in_search_path = is_known(&target_dir, &self.facts)?;
        let plan = ResolvedPlan::new(&decl.name, target_dir, in_search_path);
        if plan.requires_reload_warning {
            warn_not_in_search_path(&plan);
        }
        Ok(plan)
    }

    pub fn reconcile(
        &self,
        decl: &PluginDeclaration,
        reload: &mut ReloadTrigger,
    ) -> Result<PassReport> {
        let plan = self.plan(decl)?;
        tracing::debug!(
            "plugin '{}' → {} (create dir: {})",
            decl.name,
            plan.target_path.display(),
            plan.requires_directory_creation
        );
        let outcome = self.deployer.converge(
            &decl.name,
            &plan.target_dir,
            &plan.target_path,
            &decl.source_reference(),
            reload,
        )?;
        tracing::info!("plugin '{}' converged: {}", decl.name, outcome);
        Ok(PassReport { plan, outcome })
    }
}

fn warn_not_in_search_path(plan: &ResolvedPlan) {
    tracing::warn!(
        "The agent plugin_path does not include {}. The agent will reload on each run in \
         order to add this directory to the path unless you modify your client configuration \
         to add this directory to plugin_path.",
        plan.target_dir.display()
    );
}
