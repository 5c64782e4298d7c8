//! Compilation of checked clauses into a case tree.
//!
//! Rows are specialized slot by slot. A subproblem with no rows left is a
//! coverage gap unless one of its slots has an empty type; a subproblem with
//! no constructor patterns left becomes a leaf, where the first row wins and
//! every other row still alive must agree with it. A clause that never wins
//! a leaf is reported as unreachable.

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::elaborator::Elaborator;
use crate::error::{ElabError, ElabResult};
use crate::pattern::{CheckedClause, Pat};
use crate::surface::Span;
use crate::unify::UnifyOutcome;
use kernel::env::Param;
use kernel::{CaseArm, CaseTree, Context, Name, Term};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone)]
struct Row {
    clause: usize,
    pats: Vec<Pat>,
    /// Value of each clause variable in the slot context, once known.
    bindings: Vec<Option<Arc<Term>>>,
}

/// How the value of one original parameter has been refined so far.
#[derive(Debug, Clone)]
enum Shape {
    Hole(usize),
    Ctor(Name, Vec<Shape>),
}

impl Shape {
    fn refine(&self, hole: usize, ctor: &Name, fields: &[usize]) -> Shape {
        match self {
            Shape::Hole(id) if *id == hole => {
                Shape::Ctor(ctor.clone(), fields.iter().map(|id| Shape::Hole(*id)).collect())
            }
            Shape::Hole(id) => Shape::Hole(*id),
            Shape::Ctor(name, args) => {
                Shape::Ctor(name.clone(), args.iter().map(|a| a.refine(hole, ctor, fields)).collect())
            }
        }
    }

    fn render(&self, atomic: bool) -> String {
        match self {
            Shape::Hole(_) => "_".to_string(),
            Shape::Ctor(name, args) if args.is_empty() => name.to_string(),
            Shape::Ctor(name, args) => {
                let inner: Vec<String> = args.iter().map(|a| a.render(true)).collect();
                let shown = format!("{} {}", name, inner.join(" "));
                if atomic {
                    format!("({})", shown)
                } else {
                    shown
                }
            }
        }
    }
}

fn render_shapes(shapes: &[Shape]) -> Vec<String> {
    match shapes {
        [single] => vec![single.render(false)],
        _ => shapes.iter().map(|s| s.render(true)).collect(),
    }
}

struct Problem {
    /// Slot names and types, each in the context of the slots before it.
    tele: Vec<(Name, Arc<Term>)>,
    /// Hole id of each slot.
    ids: Vec<usize>,
    rows: Vec<Row>,
    shapes: Vec<Shape>,
}

fn tele_context(tele: &[(Name, Arc<Term>)]) -> Context {
    tele.iter()
        .fold(Context::new(), |ctx, (name, ty)| ctx.extend(name.clone(), ty.clone()))
}

/// Replace the split slot, sitting `depth` binders below the term's
/// context boundary, by `value` over `fields` new variables.
fn specialize(term: &Arc<Term>, depth: usize, fields: usize, value: &Arc<Term>) -> Arc<Term> {
    term.shift(depth + 1, fields).subst(depth, &value.shift(0, depth))
}

struct CaseCompiler<'c> {
    clauses: &'c [CheckedClause],
    reached: Vec<bool>,
    next_hole: usize,
    span: Span,
}

impl<'c> CaseCompiler<'c> {
    fn fresh_holes(&mut self, count: usize) -> Vec<usize> {
        let start = self.next_hole;
        self.next_hole += count;
        (start..self.next_hole).collect()
    }

    fn compile(&mut self, elab: &mut Elaborator<'_>, problem: Problem) -> ElabResult<CaseTree> {
        if problem.rows.is_empty() {
            return match self.empty_slot(elab, &problem)? {
                Some(tree) => Ok(tree),
                None => Err(ElabError::CoverageGap {
                    missing: render_shapes(&problem.shapes),
                    span: self.span,
                }),
            };
        }
        let split = problem
            .rows
            .iter()
            .find_map(|row| row.pats.iter().position(Pat::demands_split));
        match split {
            Some(slot) => self.split(elab, problem, slot),
            None => self.leaf(elab, problem),
        }
    }

    /// An arm-less split on the first slot whose type has no constructors.
    fn empty_slot(&self, elab: &Elaborator<'_>, problem: &Problem) -> ElabResult<Option<CaseTree>> {
        for slot in 0..problem.tele.len() {
            let prefix = tele_context(&problem.tele[..slot]);
            let ty = elab.whnf(&problem.tele[slot].1, &prefix, self.span)?;
            let (head, params) = ty.unapply();
            if let Term::Ind(def) = &*head {
                if elab.env().get_data(def.id).is_some_and(|data| data.ctors.is_empty()) {
                    return Ok(Some(CaseTree::Split {
                        slot,
                        data: def.clone(),
                        params: params.len(),
                        arms: vec![],
                    }));
                }
            }
        }
        Ok(None)
    }

    fn split(&mut self, elab: &mut Elaborator<'_>, problem: Problem, slot: usize) -> ElabResult<CaseTree> {
        let Problem {
            tele,
            ids,
            rows,
            shapes,
        } = problem;
        let n = tele.len();
        let prefix = tele_context(&tele[..slot]);
        let ty = elab.whnf(&tele[slot].1, &prefix, self.span)?;
        let (head, params) = ty.unapply();
        let data = match &*head {
            Term::Ind(def) => elab.env().get_data(def.id).cloned(),
            _ => None,
        };
        let Some(data) = data else {
            return Err(ElabError::InvalidPattern {
                reason: format!("cannot match on a value of type {}", elab.zonk(&ty)),
                span: self.span,
            });
        };
        trace!(data = %data.def.name, slot, rows = rows.len(), "splitting");
        if data.ctors.is_empty() {
            for row in &rows {
                if matches!(row.pats[slot], Pat::Absurd(_)) {
                    self.reached[row.clause] = true;
                }
            }
            return Ok(CaseTree::Split {
                slot,
                data: data.def.clone(),
                params: params.len(),
                arms: vec![],
            });
        }

        let after = n - 1 - slot;
        let mut arms = Vec::with_capacity(data.ctors.len());
        for (idx, ctor) in data.ctors.iter().enumerate() {
            let Some(ctor_ref) = data.ctor_ref(idx) else {
                continue;
            };
            let k = ctor.fields.len();
            let value = Term::apps(
                Term::ctor(ctor_ref.clone()),
                params
                    .iter()
                    .map(|p| p.shift(0, k))
                    .chain((0..k).map(|j| Term::var(k - 1 - j))),
            );

            let mut sub_tele: Vec<(Name, Arc<Term>)> = tele[..slot].to_vec();
            for (j, field) in ctor.fields.iter().enumerate() {
                sub_tele.push((field.binder.name.clone(), field.ty.instantiate_many_at(j, &params)));
            }
            for (j, (name, ty)) in tele.iter().enumerate().skip(slot + 1) {
                sub_tele.push((name.clone(), specialize(ty, j - 1 - slot, k, &value)));
            }

            let holes = self.fresh_holes(k);
            let mut sub_ids = ids[..slot].to_vec();
            sub_ids.extend_from_slice(&holes);
            sub_ids.extend_from_slice(&ids[slot + 1..]);
            let sub_shapes = shapes
                .iter()
                .map(|shape| shape.refine(ids[slot], &ctor.name, &holes))
                .collect();

            let whole = value.shift(0, after);
            let mut sub_rows = Vec::new();
            for row in &rows {
                let mut bindings: Vec<Option<Arc<Term>>> = row
                    .bindings
                    .iter()
                    .map(|b| b.as_ref().map(|t| specialize(t, after, k, &value)))
                    .collect();
                let mut pats = row.pats[..slot].to_vec();
                match &row.pats[slot] {
                    Pat::Ctor { ctor: c, args, alias } if c.idx == idx => {
                        pats.extend(args.iter().cloned());
                        if let Some(alias) = alias {
                            bindings[*alias] = Some(whole.clone());
                        }
                    }
                    Pat::Ctor { .. } | Pat::Absurd(_) => continue,
                    Pat::Var(var) => {
                        bindings[*var] = Some(whole.clone());
                        pats.extend(std::iter::repeat(Pat::Wild).take(k));
                    }
                    Pat::Wild => pats.extend(std::iter::repeat(Pat::Wild).take(k)),
                }
                pats.extend(row.pats[slot + 1..].iter().cloned());
                sub_rows.push(Row {
                    clause: row.clause,
                    pats,
                    bindings,
                });
            }

            let tree = self.compile(
                elab,
                Problem {
                    tele: sub_tele,
                    ids: sub_ids,
                    rows: sub_rows,
                    shapes: sub_shapes,
                },
            )?;
            arms.push(CaseArm {
                ctor: ctor_ref,
                fields: k,
                tree,
            });
        }
        Ok(CaseTree::Split {
            slot,
            data: data.def.clone(),
            params: params.len(),
            arms,
        })
    }

    /// The right-hand side of `row` in the slot context.
    fn instantiate(&self, row: Row, slots: usize) -> ElabResult<(usize, Option<Arc<Term>>)> {
        let clause = &self.clauses[row.clause];
        let mut bindings = row.bindings;
        for (s, pat) in row.pats.iter().enumerate() {
            if let Pat::Var(var) = pat {
                bindings[*var] = Some(Term::var(slots - 1 - s));
            }
        }
        let values: Option<Vec<Arc<Term>>> = bindings.into_iter().collect();
        let Some(values) = values else {
            return Err(ElabError::InvalidPattern {
                reason: "pattern variable is never bound".to_string(),
                span: clause.span,
            });
        };
        Ok((row.clause, clause.rhs.as_ref().map(|rhs| rhs.instantiate_many(&values))))
    }

    fn leaf(&mut self, elab: &mut Elaborator<'_>, problem: Problem) -> ElabResult<CaseTree> {
        let slots = problem.tele.len();
        let ctx = tele_context(&problem.tele);
        let mut rows = problem.rows.into_iter();
        let Some(first) = rows.next() else {
            return Err(ElabError::CoverageGap {
                missing: render_shapes(&problem.shapes),
                span: self.span,
            });
        };
        let (winner, rhs) = self.instantiate(first, slots)?;
        self.reached[winner] = true;
        let Some(rhs) = rhs else {
            return Err(ElabError::InvalidPattern {
                reason: "absurd clause matches a possible value".to_string(),
                span: self.clauses[winner].span,
            });
        };
        for row in rows {
            let (other, other_rhs) = self.instantiate(row, slots)?;
            let Some(other_rhs) = other_rhs else {
                continue;
            };
            let span = self.clauses[other].span.or(self.span);
            let outcome = elab.unifier.unify_settled(&rhs, &other_rhs, &ctx, span);
            if matches!(outcome, UnifyOutcome::Fails(_) | UnifyOutcome::Deferred) {
                return Err(ElabError::ConfluenceConflict {
                    first: winner,
                    second: other,
                    path: render_shapes(&problem.shapes),
                    left: elab.zonk(&rhs),
                    right: elab.zonk(&other_rhs),
                    ctx,
                    span,
                });
            }
        }
        Ok(CaseTree::Leaf { slots, rhs })
    }
}

impl<'s> Elaborator<'s> {
    /// Build the case tree of a clause-defined function over `params`.
    ///
    /// The tree's slots start out as the parameters, outermost first.
    pub fn compile_clauses(
        &mut self,
        params: &[Param],
        clauses: &[CheckedClause],
        span: Span,
    ) -> ElabResult<CaseTree> {
        let n = params.len();
        let mut compiler = CaseCompiler {
            clauses,
            reached: vec![false; clauses.len()],
            next_hole: n,
            span,
        };
        let problem = Problem {
            tele: params.iter().map(|p| (p.binder.name.clone(), p.ty.clone())).collect(),
            ids: (0..n).collect(),
            rows: clauses
                .iter()
                .enumerate()
                .map(|(clause, checked)| Row {
                    clause,
                    pats: checked.pats.clone(),
                    bindings: vec![None; checked.ctx.len()],
                })
                .collect(),
            shapes: (0..n).map(Shape::Hole).collect(),
        };
        let tree = compiler.compile(self, problem)?;
        for (clause, reached) in clauses.iter().zip(&compiler.reached) {
            if !reached {
                self.warn(
                    Diagnostic::warning(
                        DiagnosticKind::UnreachableClause,
                        format!("clause {} is unreachable", clause.index + 1),
                    )
                    .with_span(clause.span),
                );
            }
        }
        Ok(tree)
    }
}
