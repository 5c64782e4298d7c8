//! Bidirectional elaboration of surface terms into core terms.

use crate::diagnostics::Diagnostic;
use crate::error::{ElabError, ElabResult};
use crate::meta::{MetaOrigin, MetaStore};
use crate::surface::{Plicity, Projection, Span, SurfaceTerm, SurfaceTermKind};
use crate::unify::{Mismatch, Unifier, UnifyOutcome};
use kernel::config::ReductionConfig;
use kernel::level::LevelMetaId;
use kernel::{Binder, BinderInfo, Context, Env, Field, GlobalName, Level, MetaId, Term};
use std::sync::Arc;

pub struct Elaborator<'s> {
    pub(crate) unifier: Unifier<'s>,
    /// Metavariables created since the last `finish`.
    metas: Vec<MetaId>,
    levels: Vec<LevelMetaId>,
    warnings: Vec<Diagnostic>,
}

pub(crate) fn binder(name: &str, plicity: Plicity) -> Binder {
    match plicity {
        Plicity::Explicit => Binder::explicit(name),
        Plicity::Implicit => Binder::implicit(name),
    }
}

fn info(plicity: Plicity) -> BinderInfo {
    match plicity {
        Plicity::Explicit => BinderInfo::Default,
        Plicity::Implicit => BinderInfo::Implicit,
    }
}

/// Unsolved metavariable at the head after weak-head normalization.
fn is_flex(term: &Term) -> bool {
    matches!(term.head(), Term::Meta(..))
}

impl<'s> Elaborator<'s> {
    pub fn new(env: Env, store: &'s MetaStore, config: ReductionConfig) -> Self {
        Elaborator {
            unifier: Unifier::new(env, store, config),
            metas: Vec::new(),
            levels: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn env(&self) -> &Env {
        self.unifier.env()
    }

    pub fn env_mut(&mut self) -> &mut Env {
        self.unifier.env_mut()
    }

    pub fn warn(&mut self, diagnostic: Diagnostic) {
        self.warnings.push(diagnostic);
    }

    pub fn take_warnings(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.warnings)
    }

    pub fn zonk(&self, term: &Arc<Term>) -> Arc<Term> {
        self.unifier.zonk(term)
    }

    pub fn whnf(&self, term: &Arc<Term>, ctx: &Context, span: Span) -> ElabResult<Arc<Term>> {
        self.unifier
            .whnf(term, ctx)
            .map_err(|err| ElabError::reduction(err, span))
    }

    pub fn fresh_meta(&mut self, ty: Arc<Term>, ctx: &Context, span: Span, origin: MetaOrigin) -> Arc<Term> {
        let id = self.unifier.store().fresh(ty, ctx.clone(), span, origin);
        self.metas.push(id);
        Term::meta(id, ctx.vars())
    }

    pub fn fresh_level(&mut self) -> Level {
        let id = self.unifier.store().fresh_level();
        self.levels.push(id);
        Level::Meta(id)
    }

    /// Hand the universe variables of `level` to a later phase; `finish`
    /// leaves them alone until they are adopted again.
    pub fn release_levels(&mut self, level: &Level) -> Vec<LevelMetaId> {
        let mut ids = Vec::new();
        level.collect_metas(&mut ids);
        self.levels.retain(|id| !ids.contains(id));
        ids
    }

    pub fn adopt_levels(&mut self, ids: &[LevelMetaId]) {
        self.levels.extend_from_slice(ids);
    }

    /// A metavariable standing for an unknown type.
    pub fn fresh_type(&mut self, ctx: &Context, span: Span) -> Arc<Term> {
        let level = self.fresh_level();
        self.fresh_meta(Term::sort(level), ctx, span, MetaOrigin::Inferred)
    }

    /// Close the current declaration: settle postponed equations, fix
    /// universe variables and make sure no metavariable is left open.
    pub fn finish(&mut self) -> ElabResult<()> {
        let result = self.settle();
        self.reset();
        result
    }

    /// Forget the metavariables and postponed equations of the current
    /// declaration, e.g. after it failed.
    pub fn reset(&mut self) {
        self.metas.clear();
        self.levels.clear();
        self.unifier.reset();
    }

    fn settle(&mut self) -> ElabResult<()> {
        self.unifier.solve_constraints()?;
        self.unifier.solve_levels()?;
        let store = self.unifier.store();
        for level in &self.levels {
            if !store.is_level_solved(*level) {
                store.solve_level(*level, Level::Zero);
            }
        }
        let open = store
            .unsolved(&self.metas)
            .into_iter()
            .min_by_key(|entry| (entry.origin != MetaOrigin::Hole, entry.id));
        if let Some(entry) = open {
            return Err(ElabError::UnresolvedMetavariable {
                meta: entry.id,
                ty: self.zonk(&entry.ty),
                ctx: entry.scope.clone(),
                span: entry.span,
            });
        }
        if let Some(constraint) = self.unifier.pending().first() {
            return Err(ElabError::StuckConstraint {
                left: self.zonk(&constraint.left),
                right: self.zonk(&constraint.right),
                ctx: constraint.ctx.clone(),
                span: constraint.span,
            });
        }
        Ok(())
    }

    /// `found` must be convertible to `expected`.
    pub fn expect_equal(&mut self, found: &Arc<Term>, expected: &Arc<Term>, ctx: &Context, span: Span) -> ElabResult<()> {
        match self.unifier.unify(found, expected, ctx, span) {
            UnifyOutcome::Solved | UnifyOutcome::Deferred => Ok(()),
            UnifyOutcome::Fails(Mismatch::Head { .. }) => Err(ElabError::TypeMismatch {
                expected: self.zonk(expected),
                found: self.zonk(found),
                ctx: ctx.clone(),
                span,
            }),
            UnifyOutcome::Fails(other) => Err(other.into_error(span)),
        }
    }

    /// Like `expect_equal`, but a sort may be used where a larger one is expected.
    fn subsume(&mut self, found: &Arc<Term>, expected: &Arc<Term>, ctx: &Context, span: Span) -> ElabResult<()> {
        let lower = self.whnf(found, ctx, span)?;
        let upper = self.whnf(expected, ctx, span)?;
        if let (Term::Sort(lo), Term::Sort(hi)) = (&*lower, &*upper) {
            return self.unifier.require_leq(lo, hi, span);
        }
        self.expect_equal(found, expected, ctx, span)
    }

    /// Elaborate a term that must be a type, returning its universe.
    pub fn check_type(&mut self, term: &SurfaceTerm, ctx: &Context) -> ElabResult<(Arc<Term>, Level)> {
        let (core, ty) = self.infer(term, ctx)?;
        let whnf = self.whnf(&ty, ctx, term.span)?;
        match &*whnf {
            Term::Sort(level) => Ok((core, level.clone())),
            _ if is_flex(&whnf) => {
                let level = self.fresh_level();
                self.expect_equal(&ty, &Term::sort(level.clone()), ctx, term.span)?;
                Ok((core, level))
            }
            _ => Err(ElabError::NotAType {
                term: self.zonk(&core),
                ty: self.zonk(&ty),
                ctx: ctx.clone(),
                span: term.span,
            }),
        }
    }

    /// Infer a type, instantiating leading implicit parameters of variables
    /// and applications.
    pub fn infer(&mut self, term: &SurfaceTerm, ctx: &Context) -> ElabResult<(Arc<Term>, Arc<Term>)> {
        let (core, ty) = self.infer_head(term, ctx)?;
        match term.kind {
            SurfaceTermKind::Var(_) | SurfaceTermKind::App(..) => self.insert_implicits(core, ty, ctx, term.span),
            _ => Ok((core, ty)),
        }
    }

    fn insert_implicits(
        &mut self,
        mut core: Arc<Term>,
        mut ty: Arc<Term>,
        ctx: &Context,
        span: Span,
    ) -> ElabResult<(Arc<Term>, Arc<Term>)> {
        loop {
            let whnf = self.whnf(&ty, ctx, span)?;
            match &*whnf {
                Term::Pi(binder, dom, cod) if binder.is_implicit() => {
                    let arg = self.fresh_meta(dom.clone(), ctx, span, MetaOrigin::Implicit);
                    core = Term::app(core, arg.clone());
                    ty = cod.instantiate(&arg);
                }
                _ => return Ok((core, ty)),
            }
        }
    }

    fn resolve(&self, name: &str, ctx: &Context, span: Span) -> ElabResult<(Arc<Term>, Arc<Term>)> {
        if let Some((idx, decl)) = ctx.lookup_name(name) {
            return Ok((Term::var(idx), decl.ty));
        }
        let env = self.env();
        let resolved = match env.resolve(name) {
            Some(GlobalName::Fn(def)) => Some(Term::constant(def.clone())),
            Some(GlobalName::Data(def)) => Some(Term::ind(def.clone())),
            Some(GlobalName::Ctor(ctor)) => Some(Term::ctor(ctor.clone())),
            None => None,
        };
        resolved
            .and_then(|term| env.type_of(&term).map(|ty| (term, ty)))
            .ok_or_else(|| ElabError::UnresolvedName {
                name: name.to_string(),
                span,
            })
    }

    fn infer_head(&mut self, term: &SurfaceTerm, ctx: &Context) -> ElabResult<(Arc<Term>, Arc<Term>)> {
        let span = term.span;
        match &term.kind {
            SurfaceTermKind::Var(name) => self.resolve(name, ctx, span),
            SurfaceTermKind::Sort(level) => {
                let level = match level {
                    Some(n) => Level::of(*n),
                    None => self.fresh_level(),
                };
                Ok((Term::sort(level.clone()), Term::sort(level.succ())))
            }
            SurfaceTermKind::Pi(name, plicity, dom, cod) => {
                let (dom, l1) = self.check_type(dom, ctx)?;
                let binder = binder(name, *plicity);
                let (cod, l2) = self.check_type(cod, &ctx.extend_binder(&binder, dom.clone()))?;
                Ok((Term::pi(binder, dom, cod), Term::sort(l1.max(l2))))
            }
            SurfaceTermKind::Sigma(name, fst, snd) => {
                let (fst, l1) = self.check_type(fst, ctx)?;
                let binder = Binder::explicit(name.as_str());
                let (snd, l2) = self.check_type(snd, &ctx.extend_binder(&binder, fst.clone()))?;
                Ok((Term::sigma(binder, fst, snd), Term::sort(l1.max(l2))))
            }
            SurfaceTermKind::Lam(name, plicity, ann, body) => {
                let dom = match ann {
                    Some(ann) => self.check_type(ann, ctx)?.0,
                    None => self.fresh_type(ctx, span),
                };
                let binder = binder(name, *plicity);
                let (body, body_ty) = self.infer(body, &ctx.extend_binder(&binder, dom.clone()))?;
                Ok((
                    Term::lam(binder.clone(), dom.clone(), body),
                    Term::pi(binder, dom, body_ty),
                ))
            }
            SurfaceTermKind::App(..) => self.infer_app(term, ctx),
            SurfaceTermKind::Pair(a, b) => {
                let (a, a_ty) = self.infer(a, ctx)?;
                let (b, b_ty) = self.infer(b, ctx)?;
                Ok((Term::pair(a, b), Term::sigma(Binder::anonymous(), a_ty, b_ty.shift(0, 1))))
            }
            SurfaceTermKind::Proj(inner, which) => {
                let (core, ty) = self.infer(inner, ctx)?;
                let whnf = self.whnf(&ty, ctx, span)?;
                let (fst, snd) = match &*whnf {
                    Term::Sigma(_, fst, snd) => (fst.clone(), snd.clone()),
                    _ => {
                        let fst = self.fresh_type(ctx, span);
                        let snd = self.fresh_type(&ctx.extend("x", fst.clone()), span);
                        let sigma = Term::sigma(Binder::explicit("x"), fst.clone(), snd.clone());
                        self.expect_equal(&ty, &sigma, ctx, span)?;
                        (fst, snd)
                    }
                };
                Ok(match which {
                    Projection::First => (Term::proj(Field::First, core), fst),
                    Projection::Second => {
                        let first = Term::proj(Field::First, core.clone());
                        (Term::proj(Field::Second, core), snd.instantiate(&first))
                    }
                })
            }
            SurfaceTermKind::Let(name, ty, value, body) => {
                let (ty, value) = self.let_value(ty.as_deref(), value, ctx)?;
                let inner = ctx.define(name.as_str(), ty.clone(), value.clone());
                let (body, body_ty) = self.infer(body, &inner)?;
                Ok((
                    Term::let_in(Binder::explicit(name.as_str()), ty, value.clone(), body),
                    body_ty.instantiate(&value),
                ))
            }
            SurfaceTermKind::Ann(inner, ty) => {
                let (ty, _) = self.check_type(ty, ctx)?;
                let core = self.check(inner, &ty, ctx)?;
                Ok((core, ty))
            }
            SurfaceTermKind::NatLit(n) => self.nat_literal(*n, span),
            SurfaceTermKind::Hole => {
                let ty = self.fresh_type(ctx, span);
                let hole = self.fresh_meta(ty.clone(), ctx, span, MetaOrigin::Hole);
                Ok((hole, ty))
            }
        }
    }

    fn let_value(
        &mut self,
        ty: Option<&SurfaceTerm>,
        value: &SurfaceTerm,
        ctx: &Context,
    ) -> ElabResult<(Arc<Term>, Arc<Term>)> {
        match ty {
            Some(ty) => {
                let (ty, _) = self.check_type(ty, ctx)?;
                let value = self.check(value, &ty, ctx)?;
                Ok((ty, value))
            }
            None => {
                let (value, ty) = self.infer(value, ctx)?;
                Ok((ty, value))
            }
        }
    }

    fn infer_app(&mut self, term: &SurfaceTerm, ctx: &Context) -> ElabResult<(Arc<Term>, Arc<Term>)> {
        let mut spine = Vec::new();
        let mut head = term;
        while let SurfaceTermKind::App(fun, arg, plicity) = &head.kind {
            spine.push((arg.as_ref(), *plicity));
            head = fun;
        }
        spine.reverse();
        let (mut core, mut ty) = self.infer_head(head, ctx)?;
        for (arg, plicity) in spine {
            loop {
                let fun_ty = self.whnf(&ty, ctx, arg.span)?;
                match &*fun_ty {
                    Term::Pi(binder, dom, cod) if binder.is_implicit() && plicity == Plicity::Explicit => {
                        let inserted = self.fresh_meta(dom.clone(), ctx, arg.span, MetaOrigin::Implicit);
                        core = Term::app(core, inserted.clone());
                        ty = cod.instantiate(&inserted);
                    }
                    Term::Pi(binder, dom, cod) if binder.info == info(plicity) => {
                        let arg = self.check(arg, dom, ctx)?;
                        core = Term::app(core, arg.clone());
                        ty = cod.instantiate(&arg);
                        break;
                    }
                    _ if is_flex(&fun_ty) => {
                        let binder = binder("x", plicity);
                        let dom = self.fresh_type(ctx, arg.span);
                        let cod = self.fresh_type(&ctx.extend_binder(&binder, dom.clone()), arg.span);
                        let pi = Term::pi(binder, dom, cod);
                        self.expect_equal(&fun_ty, &pi, ctx, arg.span)?;
                        ty = pi;
                    }
                    _ => {
                        return Err(ElabError::NotAFunction {
                            term: self.zonk(&core),
                            ty: self.zonk(&ty),
                            ctx: ctx.clone(),
                            span: arg.span.or(term.span),
                        })
                    }
                }
            }
        }
        Ok((core, ty))
    }

    fn nat_literal(&self, n: u64, span: Span) -> ElabResult<(Arc<Term>, Arc<Term>)> {
        let unresolved = |name: &str| ElabError::UnresolvedName {
            name: name.to_string(),
            span,
        };
        let Some(GlobalName::Data(def)) = self.env().resolve("Nat") else {
            return Err(unresolved("Nat"));
        };
        let data = self.env().get_data(def.id).ok_or_else(|| unresolved("Nat"))?;
        let position = |name: &str, fields: usize| {
            data.ctors
                .iter()
                .position(|ctor| &*ctor.name == name && ctor.fields.len() == fields)
                .and_then(|idx| data.ctor_ref(idx))
        };
        let zero = position("zero", 0).ok_or_else(|| unresolved("Nat.zero"))?;
        let succ = position("succ", 1).ok_or_else(|| unresolved("Nat.succ"))?;
        let term = (0..n).fold(Term::ctor(zero), |acc, _| Term::app(Term::ctor(succ.clone()), acc));
        Ok((term, Term::ind(data.def.clone())))
    }

    pub fn check(&mut self, term: &SurfaceTerm, expected: &Arc<Term>, ctx: &Context) -> ElabResult<Arc<Term>> {
        let span = term.span;
        let whnf = self.whnf(expected, ctx, span)?;
        match (&term.kind, &*whnf) {
            (SurfaceTermKind::Lam(name, plicity, ann, body), Term::Pi(pi_binder, dom, cod))
                if info(*plicity) == pi_binder.info =>
            {
                if let Some(ann) = ann {
                    let (ann_ty, _) = self.check_type(ann, ctx)?;
                    self.expect_equal(&ann_ty, dom, ctx, ann.span)?;
                }
                let binder = binder(name, *plicity);
                let body = self.check(body, cod, &ctx.extend_binder(&binder, dom.clone()))?;
                Ok(Term::lam(binder, dom.clone(), body))
            }
            (_, Term::Pi(pi_binder, dom, cod)) if pi_binder.is_implicit() => {
                // the inserted binder must not capture names used by `term`
                let hidden = Binder::implicit(format!("{}✝", pi_binder.name));
                let body = self.check(term, cod, &ctx.extend_binder(&hidden, dom.clone()))?;
                Ok(Term::lam(pi_binder.clone(), dom.clone(), body))
            }
            (SurfaceTermKind::Pair(a, b), Term::Sigma(_, fst, snd)) => {
                let a = self.check(a, fst, ctx)?;
                let b = self.check(b, &snd.instantiate(&a), ctx)?;
                Ok(Term::pair(a, b))
            }
            (SurfaceTermKind::Hole, _) => Ok(self.fresh_meta(expected.clone(), ctx, span, MetaOrigin::Hole)),
            (SurfaceTermKind::Let(name, ty, value, body), _) => {
                let (ty, value) = self.let_value(ty.as_deref(), value, ctx)?;
                let inner = ctx.define(name.as_str(), ty.clone(), value.clone());
                let body = self.check(body, &expected.shift(0, 1), &inner)?;
                Ok(Term::let_in(Binder::explicit(name.as_str()), ty, value, body))
            }
            _ => {
                let (core, found) = self.infer(term, ctx)?;
                self.subsume(&found, expected, ctx, span)?;
                Ok(core)
            }
        }
    }
}
