//! Checking clause patterns against a function's parameter telescope.
//!
//! Each clause gets its own context holding exactly the variables bound by
//! its patterns, in left-to-right order. Patterns are turned into terms as
//! they are checked so later parameter types can mention earlier patterns.

use crate::elaborator::Elaborator;
use crate::error::{ElabError, ElabResult};
use crate::surface::{Clause, Pattern, PatternKind, Plicity, Span};
use kernel::env::{DataDecl, Param};
use kernel::pretty::term_doc;
use kernel::{Context, CtorRef, Term};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pat {
    /// Binds clause variable `k`; also used for user wildcards.
    Var(usize),
    /// Matches anything and binds nothing.
    Wild,
    Ctor {
        ctor: CtorRef,
        args: Vec<Pat>,
        /// Clause variable bound to the whole value.
        alias: Option<usize>,
    },
    /// Binds clause variable `k`, whose type has no constructors.
    Absurd(usize),
}

impl Pat {
    pub fn demands_split(&self) -> bool {
        matches!(self, Pat::Ctor { .. } | Pat::Absurd(_))
    }

    fn contains_absurd(&self) -> bool {
        match self {
            Pat::Absurd(_) => true,
            Pat::Ctor { args, .. } => args.iter().any(Pat::contains_absurd),
            Pat::Var(_) | Pat::Wild => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckedClause {
    pub index: usize,
    /// One pattern per parameter, implicit ones included.
    pub pats: Vec<Pat>,
    /// The clause's pattern variables.
    pub ctx: Context,
    /// Absent for absurd clauses.
    pub rhs: Option<Arc<Term>>,
    pub span: Span,
}

/// Variables bound so far, plus terms living in their context that must be
/// weakened whenever another variable is bound.
#[derive(Default)]
struct PatternScope {
    ctx: Context,
    live: Vec<Arc<Term>>,
}

impl PatternScope {
    fn weaken(&mut self) {
        for term in &mut self.live {
            *term = term.shift(0, 1);
        }
    }

    fn bind(&mut self, name: &str, ty: Arc<Term>) -> usize {
        let k = self.ctx.len();
        self.ctx = self.ctx.extend(name, ty);
        self.weaken();
        k
    }

    fn define(&mut self, name: &str, ty: Arc<Term>, value: Arc<Term>) -> usize {
        let k = self.ctx.len();
        self.ctx = self.ctx.define(name, ty, value);
        self.weaken();
        k
    }
}

fn invalid(reason: impl Into<String>, span: Span) -> ElabError {
    ElabError::InvalidPattern {
        reason: reason.into(),
        span,
    }
}

fn ctor_index(data: &DataDecl, name: &str) -> Option<usize> {
    data.ctors.iter().position(|ctor| {
        &*ctor.name == name || format!("{}.{}", data.def.name, ctor.name) == name
    })
}

impl<'s> Elaborator<'s> {
    pub fn check_clause(
        &mut self,
        index: usize,
        clause: &Clause,
        params: &[Param],
        result: &Arc<Term>,
    ) -> ElabResult<CheckedClause> {
        let mut scope = PatternScope::default();
        let mut pats = Vec::with_capacity(params.len());
        let mut cursor = 0;
        for param in params {
            let implicit = param.binder.is_implicit();
            let wanted = if implicit { Plicity::Implicit } else { Plicity::Explicit };
            let pattern = match clause.patterns.get(cursor) {
                Some(given) if given.plicity == wanted => {
                    cursor += 1;
                    given.clone()
                }
                Some(given) if implicit => Pattern::wildcard().implicit().at(given.span),
                None if implicit => Pattern::wildcard().implicit().at(clause.span),
                Some(given) => return Err(invalid("unexpected implicit pattern", given.span)),
                None => {
                    let expected = params.iter().filter(|p| !p.binder.is_implicit()).count();
                    return Err(invalid(
                        format!("expected {} explicit patterns", expected),
                        clause.span,
                    ));
                }
            };
            let expected = param.ty.instantiate_many(&scope.live);
            let (pat, term) = self.check_pattern(&pattern, &expected, &mut scope)?;
            scope.live.push(term);
            pats.push(pat);
        }
        if let Some(extra) = clause.patterns.get(cursor) {
            return Err(invalid("too many patterns", extra.span.or(clause.span)));
        }
        let result_ty = result.instantiate_many(&scope.live);
        let absurd = pats.iter().any(Pat::contains_absurd);
        let rhs = match (&clause.rhs, absurd) {
            (Some(rhs), false) => Some(self.check(rhs, &result_ty, &scope.ctx)?),
            (None, true) => None,
            (Some(rhs), true) => {
                return Err(invalid(
                    "a clause with an absurd pattern has no right-hand side",
                    rhs.span.or(clause.span),
                ))
            }
            (None, false) => return Err(invalid("missing right-hand side", clause.span)),
        };
        Ok(CheckedClause {
            index,
            pats,
            ctx: scope.ctx,
            rhs,
            span: clause.span,
        })
    }

    /// The data declaration `expected` reduces to, with its parameters.
    fn pattern_data(
        &self,
        expected: &Arc<Term>,
        ctx: &Context,
        span: Span,
    ) -> ElabResult<Option<(DataDecl, Vec<Arc<Term>>)>> {
        let whnf = self.whnf(expected, ctx, span)?;
        let (head, params) = whnf.unapply();
        Ok(match &*head {
            Term::Ind(def) => self.env().get_data(def.id).cloned().map(|data| (data, params)),
            _ => None,
        })
    }

    fn check_pattern(
        &mut self,
        pattern: &Pattern,
        expected: &Arc<Term>,
        scope: &mut PatternScope,
    ) -> ElabResult<(Pat, Arc<Term>)> {
        let span = pattern.span;
        match &pattern.kind {
            PatternKind::Wildcard => {
                let k = scope.bind("_", expected.clone());
                Ok((Pat::Var(k), Term::var(0)))
            }
            PatternKind::Bind(name) => {
                if let Some((data, params)) = self.pattern_data(expected, &scope.ctx, span)? {
                    if let Some(idx) = ctor_index(&data, name).filter(|idx| data.ctors[*idx].fields.is_empty()) {
                        return self.check_ctor_pattern(&data, idx, params, &[], None, expected, scope, span);
                    }
                }
                let k = scope.bind(name, expected.clone());
                Ok((Pat::Var(k), Term::var(0)))
            }
            PatternKind::Ctor(name, args, alias) => {
                let Some((data, params)) = self.pattern_data(expected, &scope.ctx, span)? else {
                    let shown = term_doc(&self.zonk(expected), &scope.ctx.names()).render();
                    return Err(invalid(
                        format!("constructor pattern `{}` for a value of type {}", name, shown),
                        span,
                    ));
                };
                let Some(idx) = ctor_index(&data, name) else {
                    return Err(invalid(
                        format!("`{}` is not a constructor of `{}`", name, data.def.name),
                        span,
                    ));
                };
                self.check_ctor_pattern(&data, idx, params, args, alias.as_deref(), expected, scope, span)
            }
            PatternKind::Absurd => match self.pattern_data(expected, &scope.ctx, span)? {
                Some((data, _)) if data.ctors.is_empty() => {
                    let k = scope.bind("()", expected.clone());
                    Ok((Pat::Absurd(k), Term::var(0)))
                }
                _ => {
                    let shown = term_doc(&self.zonk(expected), &scope.ctx.names()).render();
                    Err(invalid(format!("type {} is not empty", shown), span))
                }
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_ctor_pattern(
        &mut self,
        data: &DataDecl,
        idx: usize,
        params: Vec<Arc<Term>>,
        args: &[Pattern],
        alias: Option<&str>,
        expected: &Arc<Term>,
        scope: &mut PatternScope,
        span: Span,
    ) -> ElabResult<(Pat, Arc<Term>)> {
        let ctor = &data.ctors[idx];
        let Some(ctor_ref) = data.ctor_ref(idx) else {
            return Err(invalid(format!("unknown constructor of `{}`", data.def.name), span));
        };
        if args.len() != ctor.fields.len() {
            return Err(invalid(
                format!(
                    "constructor `{}` expects {} arguments, got {}",
                    ctor.name,
                    ctor.fields.len(),
                    args.len()
                ),
                span,
            ));
        }
        let depth = scope.ctx.len();
        let base = scope.live.len();
        scope.live.extend(params);
        let mut sub = Vec::with_capacity(args.len());
        for (field, arg) in ctor.fields.iter().zip(args) {
            let field_ty = field.ty.instantiate_many(&scope.live[base..]);
            let (pat, term) = self.check_pattern(arg, &field_ty, scope)?;
            sub.push(pat);
            scope.live.push(term);
        }
        let values = scope.live.split_off(base);
        let term = Term::apps(Term::ctor(ctor_ref.clone()), values);
        let alias = match alias {
            Some(name) => {
                let ty = expected.shift(0, scope.ctx.len() - depth);
                Some(scope.define(name, ty, term.clone()))
            }
            None => None,
        };
        let term = if alias.is_some() { term.shift(0, 1) } else { term };
        Ok((
            Pat::Ctor {
                ctor: ctor_ref,
                args: sub,
                alias,
            },
            term,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaStore;
    use crate::surface::SurfaceTerm;
    use crate::test_support::{nat, nat_env};
    use kernel::config::ReductionConfig;
    use kernel::Binder;

    fn nat_param(name: &str) -> Param {
        Param {
            binder: Binder::explicit(name),
            ty: nat(),
        }
    }

    #[test]
    fn constructor_patterns_bind_their_fields() {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(nat_env(), &store, ReductionConfig::resolve(Some(1_000)));
        let clause = Clause::new(
            vec![Pattern::ctor("succ", vec![Pattern::bind("n")])],
            SurfaceTerm::var("n"),
        );
        let checked = elab.check_clause(0, &clause, &[nat_param("m")], &nat()).unwrap();
        assert_eq!(checked.ctx.names(), vec![Arc::<str>::from("n")]);
        assert!(matches!(&checked.pats[0], Pat::Ctor { args, .. } if args == &[Pat::Var(0)]));
        assert_eq!(checked.rhs, Some(Term::var(0)));
    }

    #[test]
    fn bare_nullary_constructor_is_a_constructor_pattern() {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(nat_env(), &store, ReductionConfig::resolve(Some(1_000)));
        let clause = Clause::new(vec![Pattern::bind("zero")], SurfaceTerm::nat(0));
        let checked = elab.check_clause(0, &clause, &[nat_param("m")], &nat()).unwrap();
        assert!(checked.ctx.is_empty());
        assert!(checked.pats[0].demands_split());
    }

    #[test]
    fn as_pattern_is_a_local_definition() {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(nat_env(), &store, ReductionConfig::resolve(Some(1_000)));
        let clause = Clause::new(
            vec![Pattern::ctor("succ", vec![Pattern::wildcard()]).with_as("whole")],
            SurfaceTerm::var("whole"),
        );
        let checked = elab.check_clause(0, &clause, &[nat_param("m")], &nat()).unwrap();
        assert_eq!(checked.ctx.len(), 2);
        assert!(checked.ctx.value_of(0).is_some());
    }

    #[test]
    fn arity_errors_are_invalid_patterns() {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(nat_env(), &store, ReductionConfig::resolve(Some(1_000)));
        let clause = Clause::new(vec![Pattern::ctor("succ", vec![])], SurfaceTerm::nat(0));
        let err = elab.check_clause(0, &clause, &[nat_param("m")], &nat()).unwrap_err();
        assert!(matches!(err, ElabError::InvalidPattern { .. }));
        let clause = Clause::new(vec![Pattern::bind("a"), Pattern::bind("b")], SurfaceTerm::nat(0));
        let err = elab.check_clause(0, &clause, &[nat_param("m")], &nat()).unwrap_err();
        assert!(matches!(err, ElabError::InvalidPattern { .. }));
    }

    #[test]
    fn absurd_pattern_requires_an_empty_type() {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(nat_env(), &store, ReductionConfig::resolve(Some(1_000)));
        let clause = Clause::absurd(vec![Pattern::absurd()]);
        let err = elab.check_clause(0, &clause, &[nat_param("m")], &nat()).unwrap_err();
        assert!(matches!(err, ElabError::InvalidPattern { .. }));
    }

    #[test]
    fn implicit_parameters_get_wildcards() {
        let store = MetaStore::new();
        let mut elab = Elaborator::new(nat_env(), &store, ReductionConfig::resolve(Some(1_000)));
        let params = vec![
            Param {
                binder: Binder::implicit("k"),
                ty: nat(),
            },
            nat_param("m"),
        ];
        let clause = Clause::new(vec![Pattern::bind("x")], SurfaceTerm::var("x"));
        let checked = elab.check_clause(0, &clause, &params, &nat()).unwrap();
        assert_eq!(checked.pats, vec![Pat::Var(0), Pat::Var(1)]);
        assert_eq!(checked.rhs, Some(Term::var(0)));
    }
}
