//! Pattern unification with postponement.
//!
//! A flexible side whose spine is a list of distinct variables is solved by
//! renaming the other side into the metavariable's scope. Anything outside
//! that fragment is parked on the worklist together with the metavariables
//! blocking it, and retried as soon as one of them is solved.

use crate::error::{ElabError, ElabResult};
use crate::meta::{MetaEntry, MetaStore};
use crate::surface::Span;
use kernel::config::ReductionConfig;
use kernel::level::{level_eq, level_leq, LevelMetaId};
use kernel::{
    Context, Env, Field, Level, MetaId, MetaLookup, MetaSolution, Normalizer, ReduceError, Rules, Term,
    Transparency,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Rounds of level raising before a system is declared unsatisfiable.
const LEVEL_ROUNDS: usize = 64;

#[derive(Debug, Clone)]
pub enum Mismatch {
    /// Rigid heads disagree.
    Head {
        left: Arc<Term>,
        right: Arc<Term>,
        ctx: Context,
    },
    ScopeEscape {
        meta: MetaId,
        term: Arc<Term>,
        ctx: Context,
    },
    Universe { found: Level, bound: Level },
    Reduction(ReduceError),
}

impl Mismatch {
    pub fn into_error(self, span: Span) -> ElabError {
        match self {
            Mismatch::Head { left, right, ctx } => ElabError::HeadMismatch {
                left,
                right,
                ctx,
                span,
            },
            Mismatch::ScopeEscape { meta, term, ctx } => ElabError::ScopeEscape {
                meta,
                term,
                ctx,
                span,
            },
            Mismatch::Universe { found, bound } => ElabError::UniverseError { found, bound, span },
            Mismatch::Reduction(source) => ElabError::reduction(source, span),
        }
    }
}

impl From<ReduceError> for Mismatch {
    fn from(err: ReduceError) -> Self {
        Mismatch::Reduction(err)
    }
}

#[derive(Debug, Clone)]
pub enum UnifyOutcome {
    Solved,
    Deferred,
    Fails(Mismatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Solved,
    Deferred,
}

impl Progress {
    fn and(self, other: Progress) -> Progress {
        if self == Progress::Solved && other == Progress::Solved {
            Progress::Solved
        } else {
            Progress::Deferred
        }
    }
}

/// A postponed equation.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub left: Arc<Term>,
    pub right: Arc<Term>,
    pub ctx: Context,
    pub span: Span,
    /// Unsolved metavariables whose solution may unblock the equation.
    pub blockers: Vec<MetaId>,
}

/// `lower <= upper`, kept until the end of a declaration.
#[derive(Debug, Clone)]
struct LevelConstraint {
    lower: Level,
    upper: Level,
    span: Span,
}

enum Rename {
    /// A variable outside the scope, in rigid position.
    Escape,
    /// A variable outside the scope, under another metavariable.
    Blocked,
    Occurs,
}

pub struct Unifier<'s> {
    env: Env,
    store: &'s MetaStore,
    config: ReductionConfig,
    worklist: Vec<Constraint>,
    levels: Vec<LevelConstraint>,
    woken: Vec<MetaId>,
    solved: usize,
    span: Span,
}

impl<'s> Unifier<'s> {
    pub fn new(env: Env, store: &'s MetaStore, config: ReductionConfig) -> Self {
        Unifier {
            env,
            store,
            config,
            worklist: Vec::new(),
            levels: Vec::new(),
            woken: Vec::new(),
            solved: 0,
            span: Span::UNKNOWN,
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    pub fn store(&self) -> &'s MetaStore {
        self.store
    }

    pub fn config(&self) -> ReductionConfig {
        self.config
    }

    fn normalizer(&self, delta: Transparency) -> Normalizer<'_> {
        Normalizer::new(&self.env, self.store, Rules::all().with_delta(delta), self.config)
    }

    /// Weak-head normal form, unfolding only reducible definitions.
    pub fn whnf(&self, term: &Arc<Term>, ctx: &Context) -> Result<Arc<Term>, ReduceError> {
        self.normalizer(Transparency::Reducible).whnf(term, ctx)
    }

    pub fn whnf_all(&self, term: &Arc<Term>, ctx: &Context) -> Result<Arc<Term>, ReduceError> {
        self.normalizer(Transparency::All).whnf(term, ctx)
    }

    pub fn nf(&self, term: &Arc<Term>, ctx: &Context) -> Result<Arc<Term>, ReduceError> {
        self.normalizer(Transparency::All).nf(term, ctx)
    }

    pub fn zonk(&self, term: &Arc<Term>) -> Arc<Term> {
        term.instantiate_metas(self.store)
    }

    pub fn zonk_level(&self, level: &Level) -> Level {
        level.instantiate_metas(&|id| self.store.level_solution(id))
    }

    pub fn pending(&self) -> &[Constraint] {
        &self.worklist
    }

    /// Drop every postponed equation, e.g. after a declaration failed.
    pub fn reset(&mut self) {
        self.worklist.clear();
        self.levels.clear();
        self.woken.clear();
    }

    pub fn unify(&mut self, left: &Arc<Term>, right: &Arc<Term>, ctx: &Context, span: Span) -> UnifyOutcome {
        let saved = std::mem::replace(&mut self.span, span);
        let result = self.unify_terms(left, right, ctx).and_then(|progress| {
            self.wake().map_err(|(mismatch, _)| mismatch)?;
            Ok(progress)
        });
        self.span = saved;
        match result {
            Ok(Progress::Solved) => UnifyOutcome::Solved,
            Ok(Progress::Deferred) => UnifyOutcome::Deferred,
            Err(mismatch) => UnifyOutcome::Fails(mismatch),
        }
    }

    /// Record `lower <= upper`, failing right away when both sides are closed.
    pub fn require_leq(&mut self, lower: &Level, upper: &Level, span: Span) -> ElabResult<()> {
        let lower = self.zonk_level(lower);
        let upper = self.zonk_level(upper);
        match level_leq(&lower, &upper) {
            Some(true) => Ok(()),
            Some(false) => Err(ElabError::UniverseError {
                found: lower,
                bound: upper,
                span,
            }),
            None => {
                self.levels.push(LevelConstraint { lower, upper, span });
                Ok(())
            }
        }
    }

    /// Retry postponed equations, oldest first, until a full pass makes no
    /// progress. Whatever is left stays in `pending`.
    pub fn solve_constraints(&mut self) -> ElabResult<()> {
        self.drain().map_err(|(mismatch, span)| mismatch.into_error(span))
    }

    /// Unify, then settle the equations this produced on their own. Older
    /// postponed equations are left as they were. `Deferred` means some of
    /// the new equations are still stuck; they stay in `pending`.
    pub fn unify_settled(&mut self, left: &Arc<Term>, right: &Arc<Term>, ctx: &Context, span: Span) -> UnifyOutcome {
        let outer = std::mem::take(&mut self.worklist);
        let outcome = match self.unify(left, right, ctx, span) {
            UnifyOutcome::Deferred => match self.drain() {
                Ok(()) if self.worklist.is_empty() => UnifyOutcome::Solved,
                Ok(()) => UnifyOutcome::Deferred,
                Err((mismatch, _)) => UnifyOutcome::Fails(mismatch),
            },
            other => other,
        };
        let local = std::mem::replace(&mut self.worklist, outer);
        self.worklist.extend(local);
        outcome
    }

    fn drain(&mut self) -> Result<(), (Mismatch, Span)> {
        self.wake()?;
        loop {
            let pending = std::mem::take(&mut self.worklist);
            if pending.is_empty() {
                return Ok(());
            }
            let (solved_before, count) = (self.solved, pending.len());
            for constraint in pending {
                self.retry(constraint)?;
            }
            self.wake()?;
            if self.solved == solved_before && self.worklist.len() >= count {
                debug!(remaining = self.worklist.len(), "constraint worklist reached a fixed point");
                return Ok(());
            }
        }
    }

    /// Assign every universe variable mentioned in a pending level
    /// constraint the least value satisfying all of them.
    pub fn solve_levels(&mut self) -> ElabResult<()> {
        let constraints: Vec<LevelConstraint> = std::mem::take(&mut self.levels)
            .into_iter()
            .map(|c| LevelConstraint {
                lower: self.zonk_level(&c.lower),
                upper: self.zonk_level(&c.upper),
                span: c.span,
            })
            .collect();
        let mut assignment: HashMap<LevelMetaId, u32> = HashMap::new();
        for _ in 0..LEVEL_ROUNDS {
            let mut changed = false;
            for constraint in &constraints {
                let value = |id: LevelMetaId| assignment.get(&id).copied().unwrap_or(0);
                let lower = constraint.lower.evaluate(&value);
                let upper = constraint.upper.evaluate(&value);
                if lower <= upper {
                    continue;
                }
                match raise_target(&constraint.upper, lower) {
                    Some((meta, target)) => {
                        assignment.insert(meta, target);
                        changed = true;
                    }
                    None => {
                        return Err(ElabError::UniverseError {
                            found: constraint.lower.clone(),
                            bound: constraint.upper.clone(),
                            span: constraint.span,
                        })
                    }
                }
            }
            if !changed {
                for (meta, value) in assignment {
                    self.store.solve_level(meta, Level::of(value));
                }
                return Ok(());
            }
        }
        match constraints.into_iter().next() {
            Some(constraint) => Err(ElabError::UniverseError {
                found: constraint.lower,
                bound: constraint.upper,
                span: constraint.span,
            }),
            None => Ok(()),
        }
    }

    fn retry(&mut self, constraint: Constraint) -> Result<(), (Mismatch, Span)> {
        let saved = std::mem::replace(&mut self.span, constraint.span);
        let result = self.unify_terms(&constraint.left, &constraint.right, &constraint.ctx);
        self.span = saved;
        result.map(|_| ()).map_err(|mismatch| (mismatch, constraint.span))
    }

    /// Re-run the equations blocked on freshly solved metavariables.
    fn wake(&mut self) -> Result<(), (Mismatch, Span)> {
        while !self.woken.is_empty() {
            let solved = std::mem::take(&mut self.woken);
            let (ready, waiting): (Vec<Constraint>, Vec<Constraint>) = std::mem::take(&mut self.worklist)
                .into_iter()
                .partition(|c| c.blockers.iter().any(|m| solved.contains(m)));
            self.worklist = waiting;
            for constraint in ready {
                self.retry(constraint)?;
            }
        }
        Ok(())
    }

    fn defer(&mut self, left: &Arc<Term>, right: &Arc<Term>, ctx: &Context) -> Progress {
        let left = self.zonk(left);
        let right = self.zonk(right);
        let mut blockers = Vec::new();
        left.collect_metas(&mut blockers);
        right.collect_metas(&mut blockers);
        blockers.retain(|meta| !self.store.is_solved(*meta));
        trace!(%left, %right, "postponed");
        self.worklist.push(Constraint {
            left,
            right,
            ctx: ctx.clone(),
            span: self.span,
            blockers,
        });
        Progress::Deferred
    }

    fn unify_terms(&mut self, left: &Arc<Term>, right: &Arc<Term>, ctx: &Context) -> Result<Progress, Mismatch> {
        if left.alpha_eq(right) {
            return Ok(Progress::Solved);
        }
        let left = self.whnf(left, ctx)?;
        let right = self.whnf(right, ctx)?;
        if left.alpha_eq(&right) {
            return Ok(Progress::Solved);
        }
        trace!(%left, %right, "unify");
        match (self.flex(&left), self.flex(&right)) {
            (Some((m1, _)), Some((m2, _))) if m1 == m2 => Ok(self.defer(&left, &right, ctx)),
            (Some((m1, s1)), Some((m2, s2))) => {
                if let Some(progress) = self.try_solve(m1, &s1, &right, ctx)? {
                    return Ok(progress);
                }
                if let Some(progress) = self.try_solve(m2, &s2, &left, ctx)? {
                    return Ok(progress);
                }
                Ok(self.defer(&left, &right, ctx))
            }
            (Some((meta, spine)), None) => match self.try_solve(meta, &spine, &right, ctx)? {
                Some(progress) => Ok(progress),
                None => Ok(self.defer(&left, &right, ctx)),
            },
            (None, Some((meta, spine))) => match self.try_solve(meta, &spine, &left, ctx)? {
                Some(progress) => Ok(progress),
                None => Ok(self.defer(&left, &right, ctx)),
            },
            (None, None) => self.unify_rigid(&left, &right, ctx),
        }
    }

    /// An unsolved metavariable head with its full spine.
    fn flex(&self, term: &Arc<Term>) -> Option<(MetaId, Vec<Arc<Term>>)> {
        let (head, args) = term.unapply();
        match &*head {
            Term::Meta(id, spine) if !self.store.is_solved(*id) => {
                let mut full = spine.clone();
                full.extend(args);
                Some((*id, full))
            }
            _ => None,
        }
    }

    /// Solve `meta spine := other` if the spine is a pattern. `None` means
    /// the equation is outside the fragment for now.
    fn try_solve(
        &mut self,
        meta: MetaId,
        spine: &[Arc<Term>],
        other: &Arc<Term>,
        ctx: &Context,
    ) -> Result<Option<Progress>, Mismatch> {
        let Some(entry) = self.store.entry(meta) else {
            return Ok(None);
        };
        let arity = entry.scope.len();
        if spine.len() < arity {
            return Ok(None);
        }
        let Some(vars) = self.pattern_vars(spine, ctx)? else {
            return Ok(None);
        };
        let candidate = self.zonk(other);
        let body = match rename(&candidate, 0, &vars, meta, false) {
            Ok(body) => body,
            Err(Rename::Blocked) => return Ok(None),
            Err(Rename::Escape | Rename::Occurs) => {
                // unfolding may drop the offending variable
                let unfolded = self.nf(&candidate, ctx)?;
                match rename(&unfolded, 0, &vars, meta, false) {
                    Ok(body) => body,
                    Err(Rename::Blocked) => return Ok(None),
                    Err(Rename::Escape | Rename::Occurs) => {
                        return Err(Mismatch::ScopeEscape {
                            meta,
                            term: candidate,
                            ctx: ctx.clone(),
                        })
                    }
                }
            }
        };
        let Some(body) = self.abstract_extra(&entry, spine.len() - arity, body)? else {
            return Ok(None);
        };
        if !self.store.solve(meta, MetaSolution { arity, body }) {
            return Ok(None);
        }
        debug!(meta = meta.0, "solved metavariable");
        self.woken.push(meta);
        self.solved += 1;
        Ok(Some(Progress::Solved))
    }

    /// Distinct variables, or `None` if the spine is not a pattern.
    fn pattern_vars(&self, spine: &[Arc<Term>], ctx: &Context) -> Result<Option<Vec<usize>>, Mismatch> {
        let mut vars = Vec::with_capacity(spine.len());
        for arg in spine {
            let arg = match &**arg {
                Term::Var(_) => arg.clone(),
                _ => self.whnf(arg, ctx)?,
            };
            match &*arg {
                Term::Var(idx) if !vars.contains(idx) => vars.push(*idx),
                _ => return Ok(None),
            }
        }
        Ok(Some(vars))
    }

    /// Wrap `body` in lambdas for spine entries beyond the creation scope,
    /// reading their domains off the metavariable's type.
    fn abstract_extra(
        &self,
        entry: &MetaEntry,
        extra: usize,
        body: Arc<Term>,
    ) -> Result<Option<Arc<Term>>, Mismatch> {
        let mut ty = entry.ty.clone();
        let mut scope = entry.scope.clone();
        let mut binders = Vec::with_capacity(extra);
        for _ in 0..extra {
            let whnf = self.whnf(&ty, &scope)?;
            let Term::Pi(binder, dom, cod) = &*whnf else {
                return Ok(None);
            };
            let dom = self.zonk(dom);
            scope = scope.extend_binder(binder, dom.clone());
            binders.push((binder.clone(), dom));
            ty = cod.clone();
        }
        Ok(Some(
            binders
                .into_iter()
                .rev()
                .fold(body, |body, (binder, dom)| Term::lam(binder, dom, body)),
        ))
    }

    fn unify_rigid(&mut self, left: &Arc<Term>, right: &Arc<Term>, ctx: &Context) -> Result<Progress, Mismatch> {
        match (&**left, &**right) {
            (Term::Sort(l1), Term::Sort(l2)) => self.unify_levels(l1, l2),
            (Term::Pi(b1, d1, c1), Term::Pi(b2, d2, c2)) | (Term::Sigma(b1, d1, c1), Term::Sigma(b2, d2, c2))
                if b1.info == b2.info =>
            {
                let dom = self.unify_terms(d1, d2, ctx)?;
                let inner = ctx.extend_binder(b1, d1.clone());
                let cod = self.unify_terms(c1, c2, &inner)?;
                Ok(dom.and(cod))
            }
            (Term::Lam(b1, d1, x), Term::Lam(_, _, y)) => {
                let inner = ctx.extend_binder(b1, d1.clone());
                self.unify_terms(x, y, &inner)
            }
            (Term::Lam(binder, dom, body), _) => {
                let inner = ctx.extend_binder(binder, dom.clone());
                let expanded = Term::app(right.shift(0, 1), Term::var(0));
                self.unify_terms(body, &expanded, &inner)
            }
            (_, Term::Lam(binder, dom, body)) => {
                let inner = ctx.extend_binder(binder, dom.clone());
                let expanded = Term::app(left.shift(0, 1), Term::var(0));
                self.unify_terms(&expanded, body, &inner)
            }
            (Term::Pair(a1, b1), Term::Pair(a2, b2)) => {
                let first = self.unify_terms(a1, a2, ctx)?;
                let second = self.unify_terms(b1, b2, ctx)?;
                Ok(first.and(second))
            }
            (Term::Pair(a, b), _) => {
                let first = self.unify_terms(a, &Term::proj(Field::First, right.clone()), ctx)?;
                let second = self.unify_terms(b, &Term::proj(Field::Second, right.clone()), ctx)?;
                Ok(first.and(second))
            }
            (_, Term::Pair(a, b)) => {
                let first = self.unify_terms(&Term::proj(Field::First, left.clone()), a, ctx)?;
                let second = self.unify_terms(&Term::proj(Field::Second, left.clone()), b, ctx)?;
                Ok(first.and(second))
            }
            _ => self.unify_spines(left, right, ctx),
        }
    }

    fn unify_spines(&mut self, left: &Arc<Term>, right: &Arc<Term>, ctx: &Context) -> Result<Progress, Mismatch> {
        let (lh, largs) = left.unapply();
        let (rh, rargs) = right.unapply();
        let attempt = if largs.len() == rargs.len() {
            match self.unify_heads(&lh, &rh, ctx) {
                Ok(Some(head)) => {
                    let mut progress = head;
                    let mut failure = None;
                    for (a, b) in largs.iter().zip(rargs.iter()) {
                        match self.unify_terms(a, b, ctx) {
                            Ok(p) => progress = progress.and(p),
                            Err(mismatch) => {
                                failure = Some(mismatch);
                                break;
                            }
                        }
                    }
                    match failure {
                        None => return Ok(progress),
                        Some(mismatch) => Some(mismatch),
                    }
                }
                Ok(None) => None,
                Err(mismatch) => Some(mismatch),
            }
        } else {
            None
        };
        // lazy delta: definitions that are not reducible still count
        let unfolded_left = self.whnf_all(left, ctx)?;
        let unfolded_right = self.whnf_all(right, ctx)?;
        if !unfolded_left.alpha_eq(left) || !unfolded_right.alpha_eq(right) {
            return self.unify_terms(&unfolded_left, &unfolded_right, ctx);
        }
        Err(attempt.unwrap_or_else(|| Mismatch::Head {
            left: self.zonk(left),
            right: self.zonk(right),
            ctx: ctx.clone(),
        }))
    }

    /// `Some` when both heads are the same rigid symbol.
    fn unify_heads(&mut self, left: &Arc<Term>, right: &Arc<Term>, ctx: &Context) -> Result<Option<Progress>, Mismatch> {
        let same = match (&**left, &**right) {
            (Term::Var(a), Term::Var(b)) => a == b,
            (Term::Ind(a), Term::Ind(b)) | (Term::Const(a), Term::Const(b)) => a.id == b.id,
            (Term::Ctor(a), Term::Ctor(b)) => a.data.id == b.data.id && a.idx == b.idx,
            (Term::Proj(f1, t1), Term::Proj(f2, t2)) if f1 == f2 => {
                return self.unify_terms(t1, t2, ctx).map(Some);
            }
            (Term::Case(c1), Term::Case(c2))
                if c1.scrutinees.len() == c2.scrutinees.len() && c1.tree.alpha_eq(&c2.tree) =>
            {
                let mut progress = Progress::Solved;
                for (a, b) in c1.scrutinees.iter().zip(c2.scrutinees.iter()) {
                    progress = progress.and(self.unify_terms(a, b, ctx)?);
                }
                return Ok(Some(progress));
            }
            _ => false,
        };
        Ok(same.then_some(Progress::Solved))
    }

    fn unify_levels(&mut self, l1: &Level, l2: &Level) -> Result<Progress, Mismatch> {
        let l1 = self.zonk_level(l1);
        let l2 = self.zonk_level(l2);
        if level_eq(&l1, &l2) {
            return Ok(Progress::Solved);
        }
        if self.assign_level(&l1, &l2) || self.assign_level(&l2, &l1) {
            return Ok(Progress::Solved);
        }
        if !l1.has_metas() && !l2.has_metas() {
            return Err(Mismatch::Universe { found: l1, bound: l2 });
        }
        let span = self.span;
        self.levels.push(LevelConstraint {
            lower: l1.clone(),
            upper: l2.clone(),
            span,
        });
        self.levels.push(LevelConstraint {
            lower: l2,
            upper: l1,
            span,
        });
        Ok(Progress::Solved)
    }

    /// `succ^k ?u = other` solved as `?u := other - k` when that is a level.
    fn assign_level(&self, flex: &Level, other: &Level) -> bool {
        let (base, offset) = flex.peel_succ();
        let Level::Meta(id) = base else {
            return false;
        };
        let mut mentioned = Vec::new();
        other.collect_metas(&mut mentioned);
        if mentioned.contains(id) {
            return false;
        }
        match lower_level(other, offset) {
            Some(value) => self.store.solve_level(*id, value),
            None => false,
        }
    }
}

/// `level - k`, if it exists syntactically.
fn lower_level(level: &Level, k: u32) -> Option<Level> {
    if let Some(n) = level.to_nat() {
        return n.checked_sub(k).map(Level::of);
    }
    let (base, offset) = level.peel_succ();
    (offset >= k).then(|| (0..offset - k).fold(base.clone(), |acc, _| acc.succ()))
}

/// A universe variable in `level` and the value it needs for `level` to
/// reach `needed`.
fn raise_target(level: &Level, needed: u32) -> Option<(LevelMetaId, u32)> {
    match level {
        Level::Zero => None,
        Level::Succ(inner) => raise_target(inner, needed.saturating_sub(1)),
        Level::Max(a, b) => raise_target(a, needed).or_else(|| raise_target(b, needed)),
        Level::Meta(id) => Some((*id, needed)),
    }
}

/// Rename the free variables of `term` into the positions of `vars`, the
/// pattern spine of `meta`, the last spine entry becoming index 0.
fn rename(term: &Arc<Term>, depth: usize, vars: &[usize], meta: MetaId, flex: bool) -> Result<Arc<Term>, Rename> {
    match &**term {
        Term::Var(idx) if *idx < depth => Ok(term.clone()),
        Term::Var(idx) => match vars.iter().rposition(|v| *v == idx - depth) {
            Some(pos) => Ok(Term::var(vars.len() - 1 - pos + depth)),
            None if flex => Err(Rename::Blocked),
            None => Err(Rename::Escape),
        },
        Term::Meta(id, _) if *id == meta => Err(Rename::Occurs),
        Term::Meta(..) => term.try_map_children(&mut |child, binders| rename(child, depth + binders, vars, meta, true)),
        Term::App(..) if matches!(term.head(), Term::Meta(..)) => {
            let (head, args) = term.unapply();
            let head = rename(&head, depth, vars, meta, true)?;
            let args = args
                .iter()
                .map(|arg| rename(arg, depth, vars, meta, true))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Term::apps(head, args))
        }
        _ => term.try_map_children(&mut |child, binders| rename(child, depth + binders, vars, meta, flex)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaOrigin;
    use crate::test_support::{nat, nat_env, succ, two_ref, zero};
    use kernel::Binder;

    fn unifier(store: &MetaStore) -> Unifier<'_> {
        Unifier::new(nat_env(), store, ReductionConfig::resolve(Some(10_000)))
    }

    fn fresh(store: &MetaStore, ty: Arc<Term>, ctx: &Context) -> Arc<Term> {
        let id = store.fresh(ty, ctx.clone(), Span(0), MetaOrigin::Implicit);
        Term::meta(id, ctx.vars())
    }

    #[test]
    fn identical_terms_unify() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let outcome = u.unify(&nat(), &nat(), &Context::new(), Span(0));
        assert!(matches!(outcome, UnifyOutcome::Solved));

        let ctx = Context::new().extend("x", nat());
        let meta = fresh(&store, nat(), &ctx);
        let open = Term::lam(
            Binder::explicit("y"),
            nat(),
            Term::app(Term::lam(Binder::explicit("z"), nat(), succ(Term::var(0))), meta.shift(0, 1)),
        );
        let outcome = u.unify(&open, &open, &ctx, Span(0));
        assert!(matches!(outcome, UnifyOutcome::Solved));
        assert!(u.pending().is_empty());
        let Term::Meta(id, _) = &*meta else { unreachable!() };
        assert!(!store.is_solved(*id));
    }

    #[test]
    fn settled_unification_reports_equations_left_stuck() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let ctx = Context::new().extend("x", nat());
        let outer = fresh(&store, Term::arrow(nat(), nat()), &ctx);
        u.unify(&Term::app(outer.clone(), zero()), &Term::app(outer, succ(zero())), &ctx, Span(0));
        assert_eq!(u.pending().len(), 1);

        let id = store.fresh(Term::arrow(nat(), nat()), Context::new(), Span(0), MetaOrigin::Implicit);
        let flex = |arg| Term::meta(id, vec![arg]);
        let outcome = u.unify_settled(&flex(zero()), &flex(succ(zero())), &ctx, Span(1));
        assert!(matches!(outcome, UnifyOutcome::Deferred));
        assert_eq!(u.pending().len(), 2);
        assert_eq!(u.pending()[0].span, Span(0));

        let outcome = u.unify_settled(&flex(zero()), &flex(zero()), &ctx, Span(2));
        assert!(matches!(outcome, UnifyOutcome::Solved));
    }

    #[test]
    fn pattern_spine_is_solved_by_renaming() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let ctx = Context::new().extend("x", nat()).extend("y", nat());
        let meta = fresh(&store, nat(), &ctx);
        let outcome = u.unify(&meta, &succ(Term::var(1)), &ctx, Span(0));
        assert!(matches!(outcome, UnifyOutcome::Solved));
        assert_eq!(u.zonk(&meta), succ(Term::var(1)));
    }

    #[test]
    fn out_of_scope_variable_escapes() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let meta = fresh(&store, nat(), &Context::new());
        let ctx = Context::new().extend("x", nat());
        let outcome = u.unify(&meta.shift(0, 1), &Term::var(0), &ctx, Span(0));
        assert!(matches!(outcome, UnifyOutcome::Fails(Mismatch::ScopeEscape { .. })));
    }

    #[test]
    fn occurs_check_rejects_cyclic_solution() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let meta = fresh(&store, nat(), &Context::new());
        let outcome = u.unify(&meta, &succ(meta.clone()), &Context::new(), Span(0));
        assert!(matches!(outcome, UnifyOutcome::Fails(Mismatch::ScopeEscape { .. })));
    }

    #[test]
    fn distinct_constructors_are_a_head_mismatch() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let outcome = u.unify(&zero(), &succ(zero()), &Context::new(), Span(0));
        assert!(matches!(outcome, UnifyOutcome::Fails(Mismatch::Head { .. })));
    }

    #[test]
    fn non_pattern_equation_waits_for_its_metavariable() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let ctx = Context::new().extend("n", nat());
        let id = store.fresh(nat(), ctx.clone(), Span(0), MetaOrigin::Hole);
        // ?f zero = zero is outside the pattern fragment
        let stuck = Term::meta(id, vec![zero()]);
        let outcome = u.unify(&stuck, &zero(), &Context::new(), Span(1));
        assert!(matches!(outcome, UnifyOutcome::Deferred));
        assert_eq!(u.pending().len(), 1);
        // ?f n = n solves it and wakes the postponed equation, which then fails
        let outcome = u.unify(&Term::meta(id, ctx.vars()), &succ(Term::var(0)), &ctx, Span(2));
        assert!(matches!(outcome, UnifyOutcome::Fails(Mismatch::Head { .. })));
    }

    #[test]
    fn woken_equation_that_holds_is_discharged() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let ctx = Context::new().extend("n", nat());
        let id = store.fresh(nat(), ctx.clone(), Span(0), MetaOrigin::Hole);
        let stuck = Term::meta(id, vec![zero()]);
        assert!(matches!(
            u.unify(&stuck, &zero(), &Context::new(), Span(1)),
            UnifyOutcome::Deferred
        ));
        assert!(matches!(
            u.unify(&Term::meta(id, ctx.vars()), &Term::var(0), &ctx, Span(2)),
            UnifyOutcome::Solved
        ));
        assert!(u.pending().is_empty());
        assert!(u.solve_constraints().is_ok());
    }

    #[test]
    fn lambdas_are_eta_expanded() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let ctx = Context::new().extend("f", Term::arrow(nat(), nat()));
        let eta = Term::lam(Binder::explicit("x"), nat(), Term::app(Term::var(1), Term::var(0)));
        let outcome = u.unify(&eta, &Term::var(0), &ctx, Span(0));
        assert!(matches!(outcome, UnifyOutcome::Solved));
    }

    #[test]
    fn opaque_definitions_unfold_lazily() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let two = Term::constant(two_ref());
        let outcome = u.unify(&two, &succ(succ(zero())), &Context::new(), Span(0));
        assert!(matches!(outcome, UnifyOutcome::Solved));
        let outcome = u.unify(&two, &succ(zero()), &Context::new(), Span(0));
        assert!(matches!(outcome, UnifyOutcome::Fails(Mismatch::Head { .. })));
    }

    #[test]
    fn extra_spine_entries_become_lambdas() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let id = store.fresh(Term::arrow(nat(), nat()), Context::new(), Span(0), MetaOrigin::Hole);
        let ctx = Context::new().extend("n", nat());
        let applied = Term::app(Term::meta(id, vec![]), Term::var(0));
        let outcome = u.unify(&applied, &succ(Term::var(0)), &ctx, Span(0));
        assert!(matches!(outcome, UnifyOutcome::Solved));
        let solved = u.zonk(&Term::app(Term::meta(id, vec![]), zero()));
        assert_eq!(solved, succ(zero()));
    }

    #[test]
    fn level_variables_take_their_least_value() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let level = store.fresh_level();
        u.require_leq(&Level::of(2), &Level::Meta(level), Span(0)).unwrap();
        u.require_leq(&Level::of(1), &Level::Meta(level), Span(0)).unwrap();
        u.solve_levels().unwrap();
        assert_eq!(store.level_solution(level), Some(Level::of(2)));
    }

    #[test]
    fn closed_level_violation_is_reported_immediately() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let err = u.require_leq(&Level::of(1), &Level::Zero, Span(3)).unwrap_err();
        assert!(matches!(err, ElabError::UniverseError { span: Span(3), .. }));
    }

    #[test]
    fn sort_equation_solves_level_variable() {
        let store = MetaStore::new();
        let mut u = unifier(&store);
        let level = store.fresh_level();
        let outcome = u.unify(
            &Term::sort(Level::Meta(level).succ()),
            &Term::sort(Level::of(2)),
            &Context::new(),
            Span(0),
        );
        assert!(matches!(outcome, UnifyOutcome::Solved));
        assert_eq!(store.level_solution(level), Some(Level::of(1)));
    }
}
