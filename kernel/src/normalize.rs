//! Weak-head and full normalization.
//!
//! Rules are tried in a fixed priority order: beta, projection, iota, delta,
//! zeta. A solved metavariable is replaced by its solution before any rule is
//! considered, so terms are always reduced against the current store.

use crate::ast::{CaseTerm, CaseTree, Field, MetaLookup, NoMetas, Term};
use crate::config::ReductionConfig;
use crate::context::Context;
use crate::env::{Env, Transparency};
use crate::level::Level;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("reduction exceeded its budget of {0} steps")]
    FuelExhausted(usize),
}

/// Which rewrite rules the normalizer may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    pub beta: bool,
    pub proj: bool,
    pub iota: bool,
    pub delta: Transparency,
    pub zeta: bool,
}

impl Rules {
    pub fn all() -> Self {
        Rules {
            beta: true,
            proj: true,
            iota: true,
            delta: Transparency::All,
            zeta: true,
        }
    }

    /// Everything except unfolding of definitions not marked reducible.
    pub fn reducible() -> Self {
        Rules::all().with_delta(Transparency::Reducible)
    }

    pub fn with_delta(mut self, delta: Transparency) -> Self {
        self.delta = delta;
        self
    }
}

impl Default for Rules {
    fn default() -> Self {
        Rules::reducible()
    }
}

pub struct Normalizer<'a> {
    env: &'a Env,
    metas: &'a dyn MetaLookup,
    rules: Rules,
    budget: usize,
    remaining: usize,
}

impl<'a> Normalizer<'a> {
    pub fn new(env: &'a Env, metas: &'a dyn MetaLookup, rules: Rules, config: ReductionConfig) -> Self {
        Normalizer {
            env,
            metas,
            rules,
            budget: config.fuel,
            remaining: config.fuel,
        }
    }

    pub fn rules(&self) -> Rules {
        self.rules
    }

    fn tick(&mut self) -> Result<(), ReduceError> {
        if self.remaining == 0 {
            return Err(ReduceError::FuelExhausted(self.budget));
        }
        self.remaining -= 1;
        Ok(())
    }

    /// Reduce until the head is neither a redex nor a solved metavariable.
    pub fn whnf(&mut self, term: &Arc<Term>, ctx: &Context) -> Result<Arc<Term>, ReduceError> {
        let mut current = term.clone();
        loop {
            self.tick()?;
            match self.step(&current, ctx)? {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
    }

    /// One head reduction step, if any rule applies.
    fn step(&mut self, term: &Arc<Term>, ctx: &Context) -> Result<Option<Arc<Term>>, ReduceError> {
        match &**term {
            Term::Meta(id, spine) => Ok(self
                .metas
                .term_solution(*id)
                .and_then(|solution| solution.apply(spine))),
            Term::App(fun, arg) => {
                if self.rules.beta {
                    if let Term::Lam(_, _, body) = &**fun {
                        return Ok(Some(body.instantiate(arg)));
                    }
                }
                if let Some(fun) = self.step(fun, ctx)? {
                    return Ok(Some(Term::app(fun, arg.clone())));
                }
                self.delta(term, ctx)
            }
            Term::Proj(field, inner) => {
                if self.rules.proj {
                    if let Term::Pair(first, second) = &**inner {
                        return Ok(Some(match field {
                            Field::First => first.clone(),
                            Field::Second => second.clone(),
                        }));
                    }
                }
                Ok(self.step(inner, ctx)?.map(|inner| Term::proj(*field, inner)))
            }
            Term::Case(case) if self.rules.iota => self.match_case(case, ctx),
            Term::Const(_) => self.delta(term, ctx),
            Term::Let(_, _, value, body) if self.rules.zeta => Ok(Some(body.instantiate(value))),
            Term::Var(idx) if self.rules.zeta => Ok(ctx.value_of(*idx)),
            _ => Ok(None),
        }
    }

    /// Unfold a definition applied to `term`'s arguments.
    ///
    /// Pattern-matching definitions unfold only when their match fires.
    /// A recursive definition additionally needs the match to have split on
    /// a constructor, so it stays stuck on neutral arguments.
    fn delta(&mut self, term: &Arc<Term>, ctx: &Context) -> Result<Option<Arc<Term>>, ReduceError> {
        let (head, args) = term.unapply();
        let Term::Const(def) = &*head else {
            return Ok(None);
        };
        let env = self.env;
        let Some(decl) = env.get_fn(def.id) else {
            return Ok(None);
        };
        if !decl.unfolds_under(self.rules.delta) {
            return Ok(None);
        }
        let Some(body) = &decl.body else {
            return Ok(None);
        };
        let inner = peel_lambdas(body, decl.arity);
        if matches!(&*inner, Term::Case(_)) {
            if !self.rules.iota || args.len() < decl.arity {
                return Ok(None);
            }
            let (now, rest) = args.split_at(decl.arity);
            let instantiated = inner.instantiate_many(now);
            let Term::Case(case) = &*instantiated else {
                return Ok(None);
            };
            return Ok(match self.walk_case(case, ctx)? {
                Some((_, false)) if decl.recursive => None,
                Some((rhs, _)) => Some(Term::apps(rhs, rest.iter().cloned())),
                None => None,
            });
        }
        if decl.recursive {
            return Ok(None);
        }
        Ok(Some(Term::apps(body.clone(), args)))
    }

    /// Iota: walk the case tree while scrutinees are in constructor form.
    pub fn match_case(&mut self, case: &CaseTerm, ctx: &Context) -> Result<Option<Arc<Term>>, ReduceError> {
        Ok(self.walk_case(case, ctx)?.map(|(rhs, _)| rhs))
    }

    /// The selected right-hand side, and whether any split was taken on
    /// the way to it.
    fn walk_case(&mut self, case: &CaseTerm, ctx: &Context) -> Result<Option<(Arc<Term>, bool)>, ReduceError> {
        let mut slots = case.scrutinees.clone();
        let mut node = &case.tree;
        let mut split = false;
        loop {
            match node {
                CaseTree::Leaf { rhs, .. } => return Ok(Some((rhs.instantiate_many(&slots), split))),
                CaseTree::Split {
                    slot,
                    data,
                    params,
                    arms,
                } => {
                    let Some(scrutinee) = slots.get(*slot) else {
                        return Ok(None);
                    };
                    let value = self.whnf(scrutinee, ctx)?;
                    let (head, args) = value.unapply();
                    let Term::Ctor(ctor) = &*head else {
                        return Ok(None);
                    };
                    if ctor.data.id != data.id {
                        return Ok(None);
                    }
                    let Some(arm) = arms.iter().find(|arm| arm.ctor.idx == ctor.idx) else {
                        return Ok(None);
                    };
                    if args.len() != params + arm.fields {
                        return Ok(None);
                    }
                    let mut next = slots[..*slot].to_vec();
                    next.extend_from_slice(&args[*params..]);
                    next.extend_from_slice(&slots[*slot + 1..]);
                    slots = next;
                    node = &arm.tree;
                    split = true;
                }
            }
        }
    }

    /// Full normal form: whnf, then normalize every subterm.
    pub fn nf(&mut self, term: &Arc<Term>, ctx: &Context) -> Result<Arc<Term>, ReduceError> {
        let term = self.whnf(term, ctx)?;
        match &*term {
            Term::Pi(binder, dom, cod) => {
                let dom = self.nf(dom, ctx)?;
                let cod = self.nf(cod, &ctx.extend_binder(binder, dom.clone()))?;
                Ok(Term::pi(binder.clone(), dom, cod))
            }
            Term::Lam(binder, dom, body) => {
                let dom = self.nf(dom, ctx)?;
                let body = self.nf(body, &ctx.extend_binder(binder, dom.clone()))?;
                Ok(Term::lam(binder.clone(), dom, body))
            }
            Term::Sigma(binder, fst, snd) => {
                let fst = self.nf(fst, ctx)?;
                let snd = self.nf(snd, &ctx.extend_binder(binder, fst.clone()))?;
                Ok(Term::sigma(binder.clone(), fst, snd))
            }
            Term::Let(binder, ty, value, body) => {
                let ty = self.nf(ty, ctx)?;
                let value = self.nf(value, ctx)?;
                let body = self.nf(body, &ctx.define(binder.name.clone(), ty.clone(), value.clone()))?;
                Ok(Term::let_in(binder.clone(), ty, value, body))
            }
            Term::App(..) => {
                let (head, args) = term.unapply();
                let head = self.nf(&head, ctx)?;
                let mut normal = Vec::with_capacity(args.len());
                for arg in &args {
                    normal.push(self.nf(arg, ctx)?);
                }
                Ok(Term::apps(head, normal))
            }
            Term::Pair(first, second) => Ok(Term::pair(self.nf(first, ctx)?, self.nf(second, ctx)?)),
            Term::Proj(field, inner) => Ok(Term::proj(*field, self.nf(inner, ctx)?)),
            Term::Case(case) => {
                let mut scrutinees = Vec::with_capacity(case.scrutinees.len());
                for scrutinee in &case.scrutinees {
                    scrutinees.push(self.nf(scrutinee, ctx)?);
                }
                let tree = case
                    .tree
                    .try_map_leaves(&mut |rhs, slots| self.nf(rhs, &opaque_slots(ctx, slots)))?;
                Ok(Term::case(scrutinees, tree))
            }
            Term::Meta(id, spine) => {
                let mut normal = Vec::with_capacity(spine.len());
                for entry in spine {
                    normal.push(self.nf(entry, ctx)?);
                }
                Ok(Term::meta(*id, normal))
            }
            Term::Var(_) | Term::Sort(_) | Term::Ind(_) | Term::Ctor(_) | Term::Const(_) => Ok(term),
        }
    }
}

fn peel_lambdas(body: &Arc<Term>, count: usize) -> Arc<Term> {
    let mut inner = body.clone();
    for _ in 0..count {
        let next = match &*inner {
            Term::Lam(_, _, next) => next.clone(),
            _ => break,
        };
        inner = next;
    }
    inner
}

/// Case leaves are normalized under their slots; the normalizer only ever
/// consults local definitions, so the slot types are irrelevant.
fn opaque_slots(ctx: &Context, slots: usize) -> Context {
    (0..slots).fold(ctx.clone(), |ctx, _| ctx.extend("_", Term::sort(Level::Zero)))
}

/// Weak-head normal form of a metavariable-free term with every rule enabled.
pub fn whnf(env: &Env, term: &Arc<Term>) -> Result<Arc<Term>, ReduceError> {
    Normalizer::new(env, &NoMetas, Rules::all(), ReductionConfig::default()).whnf(term, &Context::new())
}

/// Normal form of a metavariable-free term with every rule enabled.
pub fn nf(env: &Env, term: &Arc<Term>) -> Result<Arc<Term>, ReduceError> {
    Normalizer::new(env, &NoMetas, Rules::all(), ReductionConfig::default()).nf(term, &Context::new())
}
