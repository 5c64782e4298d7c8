pub mod case_tree;
pub mod declarations;
pub mod diagnostics;
pub mod elaborator;
pub mod error;
pub mod meta;
pub mod pattern;
pub mod scheduler;
pub mod surface;
pub mod unify;

#[cfg(test)]
mod test_support;

pub use diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticHandler, DiagnosticKind, Severity};
pub use error::{ElabError, ElabResult};
pub use scheduler::DeclStatus;
pub use surface::*;

use crate::elaborator::Elaborator;
use crate::meta::MetaStore;
use crate::scheduler::Scheduler;
use kernel::config::ReductionConfig;
use kernel::{Context, Env, Normalizer, Rules, Term};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Knobs of one elaboration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElabOptions {
    /// Reduction budget per query; `None` falls back to `TYCK_FUEL` or the
    /// built-in default.
    pub fuel: Option<usize>,
    /// Worker threads for independent batches. `0` lets the pool decide,
    /// `1` elaborates sequentially.
    pub jobs: usize,
}

impl ElabOptions {
    pub fn reduction(&self) -> ReductionConfig {
        ReductionConfig::resolve(self.fuel)
    }
}

#[derive(Debug, Clone)]
pub struct ElabOutput {
    pub diagnostics: Vec<Diagnostic>,
    /// Outcome of every declaration, in source order.
    pub statuses: Vec<(String, DeclStatus)>,
}

impl ElabOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn status(&self, name: &str) -> Option<&DeclStatus> {
        self.statuses.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }
}

/// A compilation session: the global environment grows with every module
/// elaborated through it.
pub struct Session {
    env: Env,
    options: ElabOptions,
    cancel: Arc<AtomicBool>,
}

impl Session {
    pub fn new(options: ElabOptions) -> Self {
        Self::with_env(Env::new(), options)
    }

    pub fn with_env(env: Env, options: ElabOptions) -> Self {
        Session {
            env,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag stops elaboration at the next batch.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn options(&self) -> ElabOptions {
        self.options
    }

    pub fn elaborate_module(&mut self, module: &Module) -> ElabOutput {
        let mut collector = DiagnosticCollector::new();
        let statuses = self.elaborate_module_with(module, &mut collector);
        ElabOutput {
            diagnostics: collector.diagnostics,
            statuses,
        }
    }

    /// Like `elaborate_module`, handing diagnostics to `handler` in
    /// deterministic order.
    pub fn elaborate_module_with(
        &mut self,
        module: &Module,
        handler: &mut dyn DiagnosticHandler,
    ) -> Vec<(String, DeclStatus)> {
        let store = MetaStore::new();
        let scheduler = Scheduler::new(self.options.reduction(), self.options.jobs);
        let output = scheduler.run(module, self.env.clone(), &store, &self.cancel);
        self.env = output.env;
        let failed = output
            .statuses
            .iter()
            .filter(|(_, status)| *status != DeclStatus::Elaborated)
            .count();
        info!(
            decls = output.statuses.len(),
            failed,
            metas = store.len(),
            cancelled = self.cancel.load(Ordering::Relaxed),
            "module elaborated"
        );
        for diagnostic in output.diagnostics {
            handler.handle(diagnostic);
        }
        output.statuses
    }

    /// Elaborate a closed expression against the session's environment,
    /// returning the core term and its type.
    pub fn elaborate_term(&self, term: &SurfaceTerm) -> Result<(Arc<Term>, Arc<Term>), Diagnostic> {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(self.env.clone(), &store, self.options.reduction());
        let ctx = Context::new();
        let (core, ty) = elab.infer(term, &ctx).map_err(|err| err.to_diagnostic())?;
        elab.finish().map_err(|err| err.to_diagnostic())?;
        Ok((elab.zonk(&core), elab.zonk(&ty)))
    }

    /// Full normal form of a closed core term.
    pub fn normalize(&self, term: &Arc<Term>) -> Result<Arc<Term>, Diagnostic> {
        let mut normalizer = Normalizer::new(&self.env, &kernel::NoMetas, Rules::all(), self.options.reduction());
        normalizer
            .nf(term, &Context::new())
            .map_err(|err| ElabError::reduction(err, Span::UNKNOWN).to_diagnostic())
    }
}
