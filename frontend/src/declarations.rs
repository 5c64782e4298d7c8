//! Elaboration of top-level declarations.
//!
//! A declaration is elaborated in two phases. The signature phase produces
//! everything other declarations may depend on (the parameter telescope and
//! the result type or sort) and registers a placeholder in the environment.
//! The body phase elaborates expression bodies, clauses, constructors and
//! structure fields. Members of a mutually recursive batch see each other's
//! placeholders while their bodies are elaborated.

use crate::elaborator::{binder, Elaborator};
use crate::error::{ElabError, ElabResult};
use crate::surface::{self, Decl, DeclKind, FnBody, Span};
use kernel::env::{CtorDecl, DataDecl, FnDecl, Param};
use kernel::level::LevelMetaId;
use kernel::{Binder, CaseArm, CaseTree, Context, DefRef, GlobalDecl, Level, Term};
use std::sync::Arc;
use tracing::{debug, instrument};

pub fn pi_telescope(params: &[Param], body: Arc<Term>) -> Arc<Term> {
    params
        .iter()
        .rev()
        .fold(body, |acc, p| Term::pi(p.binder.clone(), p.ty.clone(), acc))
}

pub fn lam_telescope(params: &[Param], body: Arc<Term>) -> Arc<Term> {
    params
        .iter()
        .rev()
        .fold(body, |acc, p| Term::lam(p.binder.clone(), p.ty.clone(), acc))
}

pub fn telescope_context(params: &[Param]) -> Context {
    params
        .iter()
        .fold(Context::new(), |ctx, p| ctx.extend_binder(&p.binder, p.ty.clone()))
}

fn implicit(params: &[Param]) -> Vec<Param> {
    params
        .iter()
        .map(|p| Param {
            binder: Binder::implicit(p.binder.name.clone()),
            ty: p.ty.clone(),
        })
        .collect()
}

/// The part of a declaration visible to its dependents.
#[derive(Debug, Clone)]
pub struct Signature {
    pub def: DefRef,
    pub params: Vec<Param>,
    /// Result type of a function, or the sort of a data type.
    pub result: Arc<Term>,
    /// Universe variables of a data sort, settled by the constructors.
    open_levels: Vec<LevelMetaId>,
}

impl Signature {
    pub fn ty(&self) -> Arc<Term> {
        pi_telescope(&self.params, self.result.clone())
    }

    pub fn sort(&self) -> Option<Level> {
        match &*self.result {
            Term::Sort(level) => Some(level.clone()),
            _ => None,
        }
    }

    /// Environment entry standing in for `decl` until its body is done.
    pub fn placeholder(&self, decl: &Decl) -> GlobalDecl {
        match (&decl.kind, self.sort()) {
            (DeclKind::Data { .. } | DeclKind::Struct { .. }, Some(sort)) => GlobalDecl::Data(DataDecl {
                def: self.def.clone(),
                params: self.params.clone(),
                sort,
                ty: self.ty(),
                ctors: vec![],
                projections: vec![],
            }),
            _ => GlobalDecl::Fn(FnDecl {
                def: self.def.clone(),
                ty: self.ty(),
                body: None,
                arity: self.params.len(),
                recursive: false,
                reducible: false,
            }),
        }
    }
}

/// One declaration of a batch, with the identities assigned to it.
#[derive(Debug, Clone)]
pub struct BatchMember<'m> {
    pub decl: &'m Decl,
    pub def: DefRef,
    /// Projection functions, for structures.
    pub projections: Vec<DefRef>,
}

#[derive(Debug, Clone)]
pub enum MemberOutcome {
    Elaborated(Vec<GlobalDecl>),
    Failed(ElabError),
    /// Another member of the same batch failed.
    DependencyFailed { root: String },
}

/// Fail the whole batch: members that did not fail themselves depend on the
/// first one that did.
fn fail_together(members: &[BatchMember<'_>], mut errors: Vec<(usize, ElabError)>) -> Vec<MemberOutcome> {
    errors.sort_by_key(|(idx, _)| *idx);
    let root = errors
        .first()
        .map(|(idx, _)| members[*idx].decl.name.clone())
        .unwrap_or_default();
    let mut outcomes: Vec<MemberOutcome> = members
        .iter()
        .map(|_| MemberOutcome::DependencyFailed { root: root.clone() })
        .collect();
    for (idx, err) in errors {
        outcomes[idx] = MemberOutcome::Failed(err);
    }
    outcomes
}

impl<'s> Elaborator<'s> {
    fn elab_telescope(&mut self, params: &[surface::Param], ctx: &Context) -> ElabResult<(Vec<Param>, Context)> {
        let mut ctx = ctx.clone();
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            let (ty, _) = self.check_type(&param.ty, &ctx)?;
            let binder = binder(&param.name, param.plicity);
            ctx = ctx.extend_binder(&binder, ty.clone());
            out.push(Param { binder, ty });
        }
        Ok((out, ctx))
    }

    fn zonk_params(&self, params: &[Param]) -> Vec<Param> {
        params
            .iter()
            .map(|p| Param {
                binder: p.binder.clone(),
                ty: self.zonk(&p.ty),
            })
            .collect()
    }

    /// Run `phase`, dropping the declaration's metavariables if it fails.
    fn phase<T>(&mut self, phase: impl FnOnce(&mut Self) -> ElabResult<T>) -> ElabResult<T> {
        let result = phase(self);
        if result.is_err() {
            self.reset();
        }
        result
    }

    pub fn elab_signature(&mut self, decl: &Decl, def: DefRef) -> ElabResult<Signature> {
        self.phase(|elab| {
            let (params, ctx) = elab.elab_telescope(decl.params(), &Context::new())?;
            let (result, open_levels) = match &decl.kind {
                DeclKind::Fn { result, .. } => (elab.check_type(result, &ctx)?.0, vec![]),
                DeclKind::Data { sort, .. } | DeclKind::Struct { sort, .. } => {
                    let (sort_term, level) = elab.check_type(sort, &ctx)?;
                    let whnf = elab.whnf(&sort_term, &ctx, sort.span)?;
                    let Term::Sort(inner) = &*whnf else {
                        return Err(ElabError::NotAType {
                            term: elab.zonk(&sort_term),
                            ty: Term::sort(level),
                            ctx,
                            span: sort.span.or(decl.span),
                        });
                    };
                    let open = elab.release_levels(inner);
                    (whnf.clone(), open)
                }
            };
            elab.finish()?;
            Ok(Signature {
                def,
                params: elab.zonk_params(&params),
                result: elab.zonk(&result),
                open_levels,
            })
        })
    }

    /// Elaborate the body of `decl`, returning the finished environment
    /// entries: the declaration itself plus any structure projections.
    pub fn elab_body(
        &mut self,
        decl: &Decl,
        sig: &Signature,
        projections: &[DefRef],
        recursive: bool,
    ) -> ElabResult<Vec<GlobalDecl>> {
        self.phase(|elab| match &decl.kind {
            DeclKind::Fn { body, reducible, .. } => {
                let decl = elab.elab_fn_body(decl, sig, body, *reducible, recursive)?;
                Ok(vec![GlobalDecl::Fn(decl)])
            }
            DeclKind::Data { ctors, .. } => {
                let ctors: Vec<(&str, &[surface::Param], Span)> = ctors
                    .iter()
                    .map(|ctor| (ctor.name.as_str(), ctor.fields.as_slice(), ctor.span))
                    .collect();
                let data = elab.elab_data_body(decl, sig, &ctors, vec![])?;
                Ok(vec![GlobalDecl::Data(data)])
            }
            DeclKind::Struct { fields, .. } => {
                let fields: Vec<surface::Param> = fields
                    .iter()
                    .map(|field| {
                        let mut param = surface::Param::explicit(field.name.clone(), field.ty.clone());
                        param.span = field.span;
                        param
                    })
                    .collect();
                let data = elab.elab_data_body(decl, sig, &[("mk", fields.as_slice(), decl.span)], projections.to_vec())?;
                let mut out = projection_decls(&data);
                out.insert(0, GlobalDecl::Data(data));
                Ok(out)
            }
        })
    }

    fn elab_fn_body(
        &mut self,
        decl: &Decl,
        sig: &Signature,
        body: &FnBody,
        reducible: bool,
        recursive: bool,
    ) -> ElabResult<FnDecl> {
        let ctx = telescope_context(&sig.params);
        let inner = match body {
            FnBody::Expr(expr) => self.check(expr, &sig.result, &ctx)?,
            FnBody::Clauses(clauses) => {
                let mut checked = Vec::with_capacity(clauses.len());
                for (index, clause) in clauses.iter().enumerate() {
                    checked.push(self.check_clause(index, clause, &sig.params, &sig.result)?);
                }
                let tree = self.compile_clauses(&sig.params, &checked, decl.span)?;
                Term::case(ctx.vars(), tree)
            }
        };
        self.finish()?;
        Ok(FnDecl {
            def: sig.def.clone(),
            ty: sig.ty(),
            body: Some(lam_telescope(&sig.params, self.zonk(&inner))),
            arity: sig.params.len(),
            recursive,
            reducible,
        })
    }

    fn elab_data_body(
        &mut self,
        decl: &Decl,
        sig: &Signature,
        ctors: &[(&str, &[surface::Param], Span)],
        projections: Vec<DefRef>,
    ) -> ElabResult<DataDecl> {
        self.adopt_levels(&sig.open_levels);
        let sort = sig.sort().unwrap_or(Level::Zero);
        let ctx = telescope_context(&sig.params);
        let mut elaborated = Vec::with_capacity(ctors.len());
        for (name, fields, span) in ctors {
            let mut field_ctx = ctx.clone();
            let mut params = Vec::with_capacity(fields.len());
            for field in fields.iter() {
                let (ty, level) = self.check_type(&field.ty, &field_ctx)?;
                self.unifier
                    .require_leq(&level, &sort, field.span.or(*span).or(decl.span))?;
                let binder = Binder::explicit(field.name.as_str());
                field_ctx = field_ctx.extend_binder(&binder, ty.clone());
                params.push(Param { binder, ty });
            }
            elaborated.push((*name, params));
        }
        self.finish()?;

        let sort = self.unifier.zonk_level(&sort);
        let np = sig.params.len();
        let ctor_params = implicit(&sig.params);
        let ctors = elaborated
            .into_iter()
            .map(|(name, fields)| {
                let fields = self.zonk_params(&fields);
                let nf = fields.len();
                let result = Term::apps(
                    Term::ind(sig.def.clone()),
                    (0..np).map(|j| Term::var(nf + np - 1 - j)),
                );
                CtorDecl {
                    name: name.into(),
                    ty: pi_telescope(&ctor_params, pi_telescope(&fields, result)),
                    fields,
                }
            })
            .collect();
        debug!(data = %sig.def.name, %sort, "data type elaborated");
        Ok(DataDecl {
            def: sig.def.clone(),
            params: sig.params.clone(),
            ty: pi_telescope(&sig.params, Term::sort(sort.clone())),
            sort,
            ctors,
            projections,
        })
    }

    /// Elaborate one batch of declarations: every signature first, then the
    /// bodies, data types before functions. A failure anywhere fails the
    /// whole batch.
    #[instrument(level = "debug", skip_all, fields(size = members.len(), recursive = recursive))]
    pub fn elaborate_batch(&mut self, members: &[BatchMember<'_>], recursive: bool) -> Vec<MemberOutcome> {
        let mut signatures = Vec::with_capacity(members.len());
        let mut errors = Vec::new();
        for (idx, member) in members.iter().enumerate() {
            match self.elab_signature(member.decl, member.def.clone()) {
                Ok(sig) => {
                    let placeholder = sig.placeholder(member.decl);
                    self.env_mut().add(placeholder);
                    signatures.push(Some(sig));
                }
                Err(err) => {
                    errors.push((idx, err.or_span(member.decl.span)));
                    signatures.push(None);
                }
            }
        }
        if !errors.is_empty() {
            return fail_together(members, errors);
        }

        let mut order: Vec<usize> = (0..members.len()).collect();
        order.sort_by_key(|idx| matches!(members[*idx].decl.kind, DeclKind::Fn { .. }));
        let mut done: Vec<Vec<GlobalDecl>> = vec![Vec::new(); members.len()];
        let mut warnings = Vec::new();
        for idx in order {
            let member = &members[idx];
            let Some(sig) = &signatures[idx] else {
                continue;
            };
            match self.elab_body(member.decl, sig, &member.projections, recursive) {
                Ok(decls) => {
                    for decl in &decls {
                        self.env_mut().add(decl.clone());
                    }
                    debug!(name = %member.decl.name, "declaration elaborated");
                    done[idx] = decls;
                }
                Err(err) => errors.push((idx, err.or_span(member.decl.span))),
            }
            let name = &member.decl.name;
            warnings.extend(self.take_warnings().into_iter().map(|w| w.in_decl(name)));
        }
        for warning in warnings {
            self.warn(warning);
        }
        if !errors.is_empty() {
            return fail_together(members, errors);
        }
        done.into_iter().map(MemberOutcome::Elaborated).collect()
    }
}

/// Reducible projection functions of a structure. Each one matches on the
/// single constructor and returns the field; later field types mention
/// earlier fields through the projections applied to the same value.
fn projection_decls(data: &DataDecl) -> Vec<GlobalDecl> {
    let Some(mk) = data.ctor_ref(0) else {
        return vec![];
    };
    let np = data.params.len();
    let fields = &data.ctors[0].fields;
    let n = fields.len();
    let params = implicit(&data.params);
    let self_ty = Term::apps(Term::ind(data.def.clone()), (0..np).map(|p| Term::var(np - 1 - p)));
    let mut earlier: Vec<Arc<Term>> = Vec::with_capacity(n);
    let mut out = Vec::with_capacity(n);
    for (j, (field, def)) in fields.iter().zip(&data.projections).enumerate() {
        let field_ty = field.ty.shift(j, 1).instantiate_many(&earlier);
        let ty = pi_telescope(&params, Term::pi(Binder::explicit("self"), self_ty.clone(), field_ty));
        let tree = CaseTree::Split {
            slot: np,
            data: data.def.clone(),
            params: np,
            arms: vec![CaseArm {
                ctor: mk.clone(),
                fields: n,
                tree: CaseTree::Leaf {
                    slots: np + n,
                    rhs: Term::var(n - 1 - j),
                },
            }],
        };
        let scrutinees = (0..=np).map(|i| Term::var(np - i)).collect();
        let body = lam_telescope(
            &params,
            Term::lam(Binder::explicit("self"), self_ty.clone(), Term::case(scrutinees, tree)),
        );
        out.push(GlobalDecl::Fn(FnDecl {
            def: def.clone(),
            ty,
            body: Some(body),
            arity: np + 1,
            recursive: false,
            reducible: true,
        }));
        earlier.push(Term::apps(
            Term::constant(def.clone()),
            (0..np).map(|p| Term::var(np - p)).chain([Term::var(0)]),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaStore;
    use crate::surface::{Clause, CtorDecl as SurfaceCtor, FieldDecl, Param as SurfaceParam, Pattern, SurfaceTerm};
    use crate::test_support::{nat_env, succ, zero};
    use kernel::config::ReductionConfig;
    use kernel::normalize::nf;
    use kernel::DefId;

    fn elaborate(env: kernel::Env, decl: &Decl, id: u32, projections: Vec<DefRef>) -> (Vec<MemberOutcome>, kernel::Env) {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(env, &store, ReductionConfig::resolve(Some(10_000)));
        let member = BatchMember {
            decl,
            def: DefRef::new(DefId(id), decl.name.as_str()),
            projections,
        };
        let outcomes = elab.elaborate_batch(&[member], false);
        (outcomes, elab.env().clone())
    }

    #[test]
    fn clause_function_unfolds_on_constructors() {
        let pred = Decl::clauses(
            "pred",
            vec![SurfaceParam::explicit("m", SurfaceTerm::var("Nat"))],
            SurfaceTerm::var("Nat"),
            vec![
                Clause::new(vec![Pattern::bind("zero")], SurfaceTerm::nat(0)),
                Clause::new(
                    vec![Pattern::ctor("succ", vec![Pattern::bind("n")])],
                    SurfaceTerm::var("n"),
                ),
            ],
        );
        let (outcomes, env) = elaborate(nat_env(), &pred, 10, vec![]);
        assert!(matches!(&outcomes[0], MemberOutcome::Elaborated(decls) if decls.len() == 1));
        let call = Term::app(Term::constant(DefRef::new(DefId(10), "pred")), succ(succ(zero())));
        assert_eq!(nf(&env, &call).unwrap(), succ(zero()));
    }

    #[test]
    fn constructor_types_take_parameters_implicitly() {
        let list = Decl::data(
            "List",
            vec![SurfaceParam::explicit("A", SurfaceTerm::sort(0))],
            SurfaceTerm::sort(0),
            vec![
                SurfaceCtor::new("nil", vec![]),
                SurfaceCtor::new(
                    "cons",
                    vec![
                        SurfaceParam::explicit("head", SurfaceTerm::var("A")),
                        SurfaceParam::explicit(
                            "tail",
                            SurfaceTerm::app(SurfaceTerm::var("List"), SurfaceTerm::var("A")),
                        ),
                    ],
                ),
            ],
        );
        let (outcomes, env) = elaborate(nat_env(), &list, 10, vec![]);
        let MemberOutcome::Elaborated(decls) = &outcomes[0] else {
            panic!("unexpected outcome: {:?}", outcomes[0]);
        };
        let GlobalDecl::Data(data) = &decls[0] else {
            panic!("expected a data declaration");
        };
        assert_eq!(data.ctors[1].fields.len(), 2);
        assert_eq!(
            data.ctors[1].ty.to_string(),
            "{A : Type} -> A -> List A -> List A"
        );
        assert!(env.resolve("cons").is_some());
    }

    #[test]
    fn field_in_a_larger_universe_is_rejected() {
        let boxed = Decl::data(
            "Box",
            vec![],
            SurfaceTerm::sort(0),
            vec![SurfaceCtor::new(
                "box",
                vec![SurfaceParam::explicit("T", SurfaceTerm::sort(0))],
            )],
        );
        let (outcomes, _) = elaborate(nat_env(), &boxed, 10, vec![]);
        assert!(matches!(
            &outcomes[0],
            MemberOutcome::Failed(ElabError::UniverseError { .. })
        ));
    }

    #[test]
    fn inferred_sort_is_the_least_fitting_universe() {
        let boxed = Decl::data(
            "Box",
            vec![],
            SurfaceTerm::universe(),
            vec![SurfaceCtor::new(
                "box",
                vec![SurfaceParam::explicit("T", SurfaceTerm::sort(0))],
            )],
        );
        let (outcomes, _) = elaborate(nat_env(), &boxed, 10, vec![]);
        let MemberOutcome::Elaborated(decls) = &outcomes[0] else {
            panic!("unexpected outcome: {:?}", outcomes[0]);
        };
        let GlobalDecl::Data(data) = &decls[0] else {
            panic!("expected a data declaration");
        };
        assert_eq!(data.sort, Level::of(1));
    }

    #[test]
    fn structure_projections_compute() {
        let pair = Decl::structure(
            "Point",
            vec![],
            SurfaceTerm::sort(0),
            vec![
                FieldDecl::new("x", SurfaceTerm::var("Nat")),
                FieldDecl::new("y", SurfaceTerm::var("Nat")),
            ],
        );
        let projections = vec![DefRef::new(DefId(11), "Point.x"), DefRef::new(DefId(12), "Point.y")];
        let (outcomes, env) = elaborate(nat_env(), &pair, 10, projections);
        assert!(matches!(&outcomes[0], MemberOutcome::Elaborated(decls) if decls.len() == 3));
        let Some(kernel::GlobalName::Ctor(mk)) = env.resolve("Point.mk").cloned() else {
            panic!("constructor not registered");
        };
        let point = Term::apps(Term::ctor(mk), [zero(), succ(zero())]);
        let second = Term::app(Term::constant(DefRef::new(DefId(12), "Point.y")), point);
        assert_eq!(nf(&env, &second).unwrap(), succ(zero()));
        assert!(env.resolve("mk").is_none());
    }

    #[test]
    fn signature_failure_is_reported_for_the_member() {
        let bad = Decl::function(
            "bad",
            vec![],
            SurfaceTerm::var("Missing"),
            SurfaceTerm::nat(0),
        );
        let (outcomes, _) = elaborate(nat_env(), &bad, 10, vec![]);
        assert!(matches!(
            &outcomes[0],
            MemberOutcome::Failed(ElabError::UnresolvedName { name, .. }) if name == "Missing"
        ));
    }

    #[test]
    fn expression_body_is_wrapped_in_parameter_lambdas() {
        let double = Decl::function(
            "double",
            vec![SurfaceParam::explicit("n", SurfaceTerm::var("Nat"))],
            SurfaceTerm::var("Nat"),
            SurfaceTerm::app(
                SurfaceTerm::var("succ"),
                SurfaceTerm::app(SurfaceTerm::var("succ"), SurfaceTerm::var("n")),
            ),
        );
        let (_, env) = elaborate(nat_env(), &double, 10, vec![]);
        let call = Term::app(Term::constant(DefRef::new(DefId(10), "double")), zero());
        assert_eq!(nf(&env, &call).unwrap(), succ(succ(zero())));
        assert_eq!(env.get_fn(DefId(10)).map(|f| f.arity), Some(1));
    }
}
