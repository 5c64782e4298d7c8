//! Metavariable store shared by the workers of one elaboration session.
//!
//! Every solution is written at most once, so readers never need to hold a
//! lock while they walk a term: entries are handed out as `Arc`s and the
//! solution cell is a `OnceLock`.

use crate::surface::Span;
use kernel::level::LevelMetaId;
use kernel::{Context, Level, MetaId, MetaLookup, MetaSolution, Term};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

/// Why a metavariable was created; used to word diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaOrigin {
    /// A `_` written by the user.
    Hole,
    /// An implicit argument inserted by the elaborator.
    Implicit,
    /// A type the elaborator had to guess, e.g. an unannotated binder.
    Inferred,
}

#[derive(Debug)]
pub struct MetaEntry {
    pub id: MetaId,
    /// Expected type, in `scope`.
    pub ty: Arc<Term>,
    /// Variables the solution may mention.
    pub scope: Context,
    pub span: Span,
    pub origin: MetaOrigin,
    solution: OnceLock<MetaSolution>,
}

impl MetaEntry {
    pub fn solution(&self) -> Option<&MetaSolution> {
        self.solution.get()
    }

    pub fn is_solved(&self) -> bool {
        self.solution.get().is_some()
    }
}

#[derive(Debug, Default)]
pub struct MetaStore {
    terms: RwLock<Vec<Arc<MetaEntry>>>,
    levels: RwLock<Vec<Arc<OnceLock<Level>>>>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self, ty: Arc<Term>, scope: Context, span: Span, origin: MetaOrigin) -> MetaId {
        let mut terms = self.terms.write();
        let id = MetaId(terms.len() as u32);
        terms.push(Arc::new(MetaEntry {
            id,
            ty,
            scope,
            span,
            origin,
            solution: OnceLock::new(),
        }));
        id
    }

    pub fn fresh_level(&self) -> LevelMetaId {
        let mut levels = self.levels.write();
        let id = LevelMetaId(levels.len() as u32);
        levels.push(Arc::new(OnceLock::new()));
        id
    }

    pub fn entry(&self, id: MetaId) -> Option<Arc<MetaEntry>> {
        self.terms.read().get(id.0 as usize).cloned()
    }

    pub fn is_solved(&self, id: MetaId) -> bool {
        self.entry(id).is_some_and(|entry| entry.is_solved())
    }

    /// Record a solution. Returns `false` if the metavariable was already
    /// solved or does not exist.
    pub fn solve(&self, id: MetaId, solution: MetaSolution) -> bool {
        match self.entry(id) {
            Some(entry) => entry.solution.set(solution).is_ok(),
            None => false,
        }
    }

    pub fn solve_level(&self, id: LevelMetaId, level: Level) -> bool {
        let cell = self.levels.read().get(id.0 as usize).cloned();
        match cell {
            Some(cell) => cell.set(level).is_ok(),
            None => false,
        }
    }

    pub fn is_level_solved(&self, id: LevelMetaId) -> bool {
        self.levels
            .read()
            .get(id.0 as usize)
            .is_some_and(|cell| cell.get().is_some())
    }

    pub fn len(&self) -> usize {
        self.terms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.read().is_empty()
    }

    /// Metavariables among `ids` that are still open.
    pub fn unsolved(&self, ids: &[MetaId]) -> Vec<Arc<MetaEntry>> {
        ids.iter()
            .filter_map(|id| self.entry(*id))
            .filter(|entry| !entry.is_solved())
            .collect()
    }
}

impl MetaLookup for MetaStore {
    fn term_solution(&self, id: MetaId) -> Option<MetaSolution> {
        self.entry(id).and_then(|entry| entry.solution().cloned())
    }

    fn level_solution(&self, id: LevelMetaId) -> Option<Level> {
        let cell = self.levels.read().get(id.0 as usize).cloned();
        cell.and_then(|cell| cell.get().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solutions_are_write_once() {
        let store = MetaStore::new();
        let id = store.fresh(Term::sort(Level::Zero), Context::new(), Span(0), MetaOrigin::Hole);
        let first = MetaSolution {
            arity: 0,
            body: Term::sort(Level::Zero),
        };
        assert!(store.solve(id, first.clone()));
        assert!(!store.solve(
            id,
            MetaSolution {
                arity: 0,
                body: Term::sort(Level::of(1)),
            }
        ));
        assert_eq!(store.term_solution(id), Some(first));
    }

    #[test]
    fn zonking_applies_solutions_to_the_spine() {
        let store = MetaStore::new();
        let ctx = Context::new().extend("A", Term::sort(Level::Zero));
        let id = store.fresh(Term::sort(Level::Zero), ctx.clone(), Span(0), MetaOrigin::Implicit);
        store.solve(
            id,
            MetaSolution {
                arity: 1,
                body: Term::var(0),
            },
        );
        let term = Term::meta(id, ctx.vars());
        assert_eq!(term.instantiate_metas(&store), Term::var(0));
    }

    #[test]
    fn level_metas_resolve_through_the_store() {
        let store = MetaStore::new();
        let u = store.fresh_level();
        assert!(!store.is_level_solved(u));
        store.solve_level(u, Level::of(2));
        let sort = Term::sort(Level::Meta(u).succ());
        assert_eq!(sort.instantiate_metas(&store), Term::sort(Level::of(3)));
    }
}
