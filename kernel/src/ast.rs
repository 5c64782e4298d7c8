use crate::level::{Level, LevelMetaId};
use std::convert::Infallible;
use std::sync::Arc;

/// Display name carried by binders and global references.
pub type Name = Arc<str>;

/// Identity assigned to a top-level declaration at scheduling time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaId(pub u32);

/// Qualified name plus identity of a global declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefRef {
    pub id: DefId,
    pub name: Name,
}

impl DefRef {
    pub fn new(id: DefId, name: impl Into<Name>) -> Self {
        DefRef {
            id,
            name: name.into(),
        }
    }
}

/// Reference to the `idx`-th constructor of a data type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CtorRef {
    pub data: DefRef,
    pub idx: usize,
    pub name: Name,
}

/// Binder information (explicit, implicit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinderInfo {
    Default,
    Implicit,
}

/// A binder's display hint. Names never influence equality of terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binder {
    pub name: Name,
    pub info: BinderInfo,
}

impl Binder {
    pub fn explicit(name: impl Into<Name>) -> Self {
        Binder {
            name: name.into(),
            info: BinderInfo::Default,
        }
    }

    pub fn implicit(name: impl Into<Name>) -> Self {
        Binder {
            name: name.into(),
            info: BinderInfo::Implicit,
        }
    }

    pub fn anonymous() -> Self {
        Binder::explicit("_")
    }

    pub fn is_implicit(&self) -> bool {
        self.info == BinderInfo::Implicit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    First,
    Second,
}

/// The core terms of the calculus, using de Bruijn indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Bound variable (de Bruijn index)
    Var(usize),
    /// Universe
    Sort(Level),
    /// Dependent function type: (x : A) -> B
    Pi(Binder, Arc<Term>, Arc<Term>),
    /// Lambda abstraction: \x:A. b
    Lam(Binder, Arc<Term>, Arc<Term>),
    /// Application: (f a)
    App(Arc<Term>, Arc<Term>),
    /// Dependent pair type: (x : A) * B
    Sigma(Binder, Arc<Term>, Arc<Term>),
    Pair(Arc<Term>, Arc<Term>),
    Proj(Field, Arc<Term>),
    /// Let binding: let x:A = v in b
    Let(Binder, Arc<Term>, Arc<Term>, Arc<Term>),
    /// Inductive type former; parameters are applied with `App`.
    Ind(DefRef),
    /// Constructor; parameters and fields are applied with `App`.
    Ctor(CtorRef),
    /// Top-level function, possibly recursive.
    Const(DefRef),
    /// Pattern match over a case tree.
    Case(Arc<CaseTerm>),
    /// Metavariable applied to the variables visible where it was created.
    Meta(MetaId, Vec<Arc<Term>>),
}

/// A compiled pattern match.
///
/// The tree operates on a stack of slots which starts out as `scrutinees`.
/// Splitting a slot on a constructor replaces that slot by the constructor's
/// fields, so each leaf sees the slots of its own branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseTerm {
    pub scrutinees: Vec<Arc<Term>>,
    pub tree: CaseTree,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaseTree {
    /// `rhs` lives in the enclosing context extended by `slots` variables,
    /// the last slot being de Bruijn index 0.
    Leaf { slots: usize, rhs: Arc<Term> },
    /// Inspect `slot`, whose type is `data` applied to `params` arguments.
    /// No arms means the slot's type has no constructors.
    Split {
        slot: usize,
        data: DefRef,
        params: usize,
        arms: Vec<CaseArm>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseArm {
    pub ctor: CtorRef,
    pub fields: usize,
    pub tree: CaseTree,
}

impl CaseTree {
    pub fn try_map_leaves<E>(
        &self,
        f: &mut dyn FnMut(&Arc<Term>, usize) -> Result<Arc<Term>, E>,
    ) -> Result<CaseTree, E> {
        Ok(match self {
            CaseTree::Leaf { slots, rhs } => CaseTree::Leaf {
                slots: *slots,
                rhs: f(rhs, *slots)?,
            },
            CaseTree::Split {
                slot,
                data,
                params,
                arms,
            } => {
                let mut mapped = Vec::with_capacity(arms.len());
                for arm in arms {
                    mapped.push(CaseArm {
                        ctor: arm.ctor.clone(),
                        fields: arm.fields,
                        tree: arm.tree.try_map_leaves(f)?,
                    });
                }
                CaseTree::Split {
                    slot: *slot,
                    data: data.clone(),
                    params: *params,
                    arms: mapped,
                }
            }
        })
    }

    pub fn for_each_leaf(&self, f: &mut dyn FnMut(&Arc<Term>, usize)) {
        match self {
            CaseTree::Leaf { slots, rhs } => f(rhs, *slots),
            CaseTree::Split { arms, .. } => {
                for arm in arms {
                    arm.tree.for_each_leaf(f);
                }
            }
        }
    }

    pub fn alpha_eq(&self, other: &CaseTree) -> bool {
        match (self, other) {
            (CaseTree::Leaf { slots: s1, rhs: r1 }, CaseTree::Leaf { slots: s2, rhs: r2 }) => {
                s1 == s2 && r1.alpha_eq(r2)
            }
            (
                CaseTree::Split {
                    slot: s1,
                    data: d1,
                    arms: a1,
                    ..
                },
                CaseTree::Split {
                    slot: s2,
                    data: d2,
                    arms: a2,
                    ..
                },
            ) => {
                s1 == s2
                    && d1.id == d2.id
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2.iter()).all(|(x, y)| {
                        x.ctor.idx == y.ctor.idx && x.fields == y.fields && x.tree.alpha_eq(&y.tree)
                    })
            }
            _ => false,
        }
    }
}

/// A metavariable solution: `body` abstracted over the first `arity` spine entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaSolution {
    pub arity: usize,
    pub body: Arc<Term>,
}

impl MetaSolution {
    /// Plug a spine into the solution. Spines shorter than the arity stay stuck.
    pub fn apply(&self, spine: &[Arc<Term>]) -> Option<Arc<Term>> {
        if spine.len() < self.arity {
            return None;
        }
        let (scope, rest) = spine.split_at(self.arity);
        Some(Term::apps(self.body.instantiate_many(scope), rest.iter().cloned()))
    }
}

/// Read access to metavariable solutions, implemented by the elaborator's store.
pub trait MetaLookup: Sync {
    fn term_solution(&self, id: MetaId) -> Option<MetaSolution>;
    fn level_solution(&self, id: LevelMetaId) -> Option<Level>;
}

/// Lookup for terms that never contain metavariables.
pub struct NoMetas;

impl MetaLookup for NoMetas {
    fn term_solution(&self, _id: MetaId) -> Option<MetaSolution> {
        None
    }

    fn level_solution(&self, _id: LevelMetaId) -> Option<Level> {
        None
    }
}

// Helper constructors for convenience
impl Term {
    pub fn var(n: usize) -> Arc<Self> {
        Arc::new(Term::Var(n))
    }

    pub fn sort(l: Level) -> Arc<Self> {
        Arc::new(Term::Sort(l))
    }

    pub fn pi(binder: Binder, dom: Arc<Term>, cod: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Pi(binder, dom, cod))
    }

    /// Non-dependent function type; `cod` is given in the outer context.
    pub fn arrow(dom: Arc<Term>, cod: Arc<Term>) -> Arc<Self> {
        Term::pi(Binder::anonymous(), dom, cod.shift(0, 1))
    }

    pub fn lam(binder: Binder, dom: Arc<Term>, body: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Lam(binder, dom, body))
    }

    pub fn app(f: Arc<Term>, a: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::App(f, a))
    }

    pub fn apps(head: Arc<Term>, args: impl IntoIterator<Item = Arc<Term>>) -> Arc<Self> {
        args.into_iter().fold(head, Term::app)
    }

    pub fn sigma(binder: Binder, fst: Arc<Term>, snd: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Sigma(binder, fst, snd))
    }

    pub fn pair(a: Arc<Term>, b: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Pair(a, b))
    }

    pub fn proj(field: Field, t: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Proj(field, t))
    }

    pub fn let_in(binder: Binder, ty: Arc<Term>, val: Arc<Term>, body: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Let(binder, ty, val, body))
    }

    pub fn ind(def: DefRef) -> Arc<Self> {
        Arc::new(Term::Ind(def))
    }

    pub fn ctor(ctor: CtorRef) -> Arc<Self> {
        Arc::new(Term::Ctor(ctor))
    }

    pub fn constant(def: DefRef) -> Arc<Self> {
        Arc::new(Term::Const(def))
    }

    pub fn meta(id: MetaId, spine: Vec<Arc<Term>>) -> Arc<Self> {
        Arc::new(Term::Meta(id, spine))
    }

    pub fn case(scrutinees: Vec<Arc<Term>>, tree: CaseTree) -> Arc<Self> {
        Arc::new(Term::Case(Arc::new(CaseTerm { scrutinees, tree })))
    }

    /// Rebuild this node with `f` applied to each immediate subterm.
    /// `f` also receives how many binders separate the child from this node.
    pub fn try_map_children<E>(
        self: &Arc<Self>,
        f: &mut dyn FnMut(&Arc<Term>, usize) -> Result<Arc<Term>, E>,
    ) -> Result<Arc<Term>, E> {
        Ok(match &**self {
            Term::Var(_) | Term::Sort(_) | Term::Ind(_) | Term::Ctor(_) | Term::Const(_) => {
                self.clone()
            }
            Term::Pi(binder, dom, cod) => Term::pi(binder.clone(), f(dom, 0)?, f(cod, 1)?),
            Term::Lam(binder, dom, body) => Term::lam(binder.clone(), f(dom, 0)?, f(body, 1)?),
            Term::Sigma(binder, fst, snd) => Term::sigma(binder.clone(), f(fst, 0)?, f(snd, 1)?),
            Term::App(fun, arg) => Term::app(f(fun, 0)?, f(arg, 0)?),
            Term::Pair(a, b) => Term::pair(f(a, 0)?, f(b, 0)?),
            Term::Proj(field, t) => Term::proj(*field, f(t, 0)?),
            Term::Let(binder, ty, val, body) => {
                Term::let_in(binder.clone(), f(ty, 0)?, f(val, 0)?, f(body, 1)?)
            }
            Term::Case(case) => {
                let mut scrutinees = Vec::with_capacity(case.scrutinees.len());
                for scrutinee in &case.scrutinees {
                    scrutinees.push(f(scrutinee, 0)?);
                }
                let tree = case.tree.try_map_leaves(f)?;
                Term::case(scrutinees, tree)
            }
            Term::Meta(id, spine) => {
                if spine.is_empty() {
                    return Ok(self.clone());
                }
                let mut mapped = Vec::with_capacity(spine.len());
                for entry in spine {
                    mapped.push(f(entry, 0)?);
                }
                Term::meta(*id, mapped)
            }
        })
    }

    pub fn map_children(self: &Arc<Self>, f: &mut dyn FnMut(&Arc<Term>, usize) -> Arc<Term>) -> Arc<Term> {
        let result: Result<_, Infallible> = self.try_map_children(&mut |child, binders| Ok(f(child, binders)));
        match result {
            Ok(term) => term,
            Err(never) => match never {},
        }
    }

    /// Visit each immediate subterm with the number of binders entered.
    pub fn for_each_child(&self, f: &mut dyn FnMut(&Arc<Term>, usize)) {
        match self {
            Term::Var(_) | Term::Sort(_) | Term::Ind(_) | Term::Ctor(_) | Term::Const(_) => {}
            Term::Pi(_, a, b) | Term::Lam(_, a, b) | Term::Sigma(_, a, b) => {
                f(a, 0);
                f(b, 1);
            }
            Term::App(a, b) | Term::Pair(a, b) => {
                f(a, 0);
                f(b, 0);
            }
            Term::Proj(_, t) => f(t, 0),
            Term::Let(_, ty, val, body) => {
                f(ty, 0);
                f(val, 0);
                f(body, 1);
            }
            Term::Case(case) => {
                for scrutinee in &case.scrutinees {
                    f(scrutinee, 0);
                }
                case.tree.for_each_leaf(f);
            }
            Term::Meta(_, spine) => {
                for entry in spine {
                    f(entry, 0);
                }
            }
        }
    }

    /// Replace every loose variable, `on_var` receiving the index and the
    /// number of binders entered so far.
    pub fn try_replace_vars<E>(
        self: &Arc<Self>,
        depth: usize,
        on_var: &mut dyn FnMut(usize, usize) -> Result<Arc<Term>, E>,
    ) -> Result<Arc<Term>, E> {
        match &**self {
            Term::Var(idx) => on_var(*idx, depth),
            _ => self.try_map_children(&mut |child, binders| {
                child.try_replace_vars(depth + binders, &mut *on_var)
            }),
        }
    }

    fn replace_vars(self: &Arc<Self>, on_var: &mut dyn FnMut(usize, usize) -> Arc<Term>) -> Arc<Term> {
        let result: Result<_, Infallible> = self.try_replace_vars(0, &mut |idx, depth| Ok(on_var(idx, depth)));
        match result {
            Ok(term) => term,
            Err(never) => match never {},
        }
    }

    /// Shift indices in a term by `d` above cutoff `c`.
    pub fn shift(self: &Arc<Self>, c: usize, d: usize) -> Arc<Term> {
        if d == 0 {
            return self.clone();
        }
        self.replace_vars(&mut |k, depth| {
            if k < c + depth {
                Term::var(k)
            } else {
                Term::var(k + d)
            }
        })
    }

    /// Substitute `s` for variable `k`; variables above `k` move down by one.
    pub fn subst(self: &Arc<Self>, k: usize, s: &Arc<Term>) -> Arc<Term> {
        self.replace_vars(&mut |i, depth| {
            if i == k + depth {
                s.shift(0, depth)
            } else if i > k + depth {
                Term::var(i - 1)
            } else {
                Term::var(i)
            }
        })
    }

    /// Instantiate the innermost bound variable with `value`.
    pub fn instantiate(self: &Arc<Self>, value: &Arc<Term>) -> Arc<Term> {
        self.subst(0, value)
    }

    /// Instantiate the innermost `values.len()` variables; `values[0]` replaces
    /// the outermost of them.
    pub fn instantiate_many(self: &Arc<Self>, values: &[Arc<Term>]) -> Arc<Term> {
        self.instantiate_many_at(0, values)
    }

    /// Like `instantiate_many`, but leaves the innermost `skip` variables alone.
    /// Used for telescopes whose later entries see earlier ones.
    pub fn instantiate_many_at(self: &Arc<Self>, skip: usize, values: &[Arc<Term>]) -> Arc<Term> {
        let n = values.len();
        if n == 0 {
            return self.clone();
        }
        self.replace_vars(&mut |i, depth| {
            let depth = depth + skip;
            if i < depth {
                Term::var(i)
            } else if i - depth < n {
                values[n - 1 - (i - depth)].shift(0, depth)
            } else {
                Term::var(i - n)
            }
        })
    }

    /// Does variable `idx` (relative to this term) occur?
    pub fn has_loose_var(&self, idx: usize) -> bool {
        match self {
            Term::Var(k) => *k == idx,
            _ => {
                let mut found = false;
                self.for_each_child(&mut |child, binders| {
                    found = found || child.has_loose_var(idx + binders);
                });
                found
            }
        }
    }

    pub fn mentions_meta(&self, id: MetaId) -> bool {
        if let Term::Meta(other, _) = self {
            if *other == id {
                return true;
            }
        }
        let mut found = false;
        self.for_each_child(&mut |child, _| found = found || child.mentions_meta(id));
        found
    }

    pub fn collect_metas(&self, out: &mut Vec<MetaId>) {
        if let Term::Meta(id, _) = self {
            if !out.contains(id) {
                out.push(*id);
            }
        }
        self.for_each_child(&mut |child, _| child.collect_metas(out));
    }

    /// Split an application spine into its head and arguments.
    pub fn unapply(self: &Arc<Self>) -> (Arc<Term>, Vec<Arc<Term>>) {
        let mut args = Vec::new();
        let mut head = self.clone();
        while let Term::App(fun, arg) = &*head {
            args.push(arg.clone());
            let next = fun.clone();
            head = next;
        }
        args.reverse();
        (head, args)
    }

    pub fn head(&self) -> &Term {
        match self {
            Term::App(fun, _) => fun.head(),
            other => other,
        }
    }

    /// Structural equality ignoring binder names.
    pub fn alpha_eq(&self, other: &Term) -> bool {
        match (self, other) {
            (Term::Var(a), Term::Var(b)) => a == b,
            (Term::Sort(a), Term::Sort(b)) => crate::level::level_eq(a, b),
            (Term::Pi(b1, a1, c1), Term::Pi(b2, a2, c2))
            | (Term::Lam(b1, a1, c1), Term::Lam(b2, a2, c2))
            | (Term::Sigma(b1, a1, c1), Term::Sigma(b2, a2, c2)) => {
                b1.info == b2.info && a1.alpha_eq(a2) && c1.alpha_eq(c2)
            }
            (Term::App(f1, a1), Term::App(f2, a2)) | (Term::Pair(f1, a1), Term::Pair(f2, a2)) => {
                f1.alpha_eq(f2) && a1.alpha_eq(a2)
            }
            (Term::Proj(f1, t1), Term::Proj(f2, t2)) => f1 == f2 && t1.alpha_eq(t2),
            (Term::Let(_, t1, v1, b1), Term::Let(_, t2, v2, b2)) => {
                t1.alpha_eq(t2) && v1.alpha_eq(v2) && b1.alpha_eq(b2)
            }
            (Term::Ind(a), Term::Ind(b)) | (Term::Const(a), Term::Const(b)) => a.id == b.id,
            (Term::Ctor(a), Term::Ctor(b)) => a.data.id == b.data.id && a.idx == b.idx,
            (Term::Case(c1), Term::Case(c2)) => {
                c1.scrutinees.len() == c2.scrutinees.len()
                    && c1
                        .scrutinees
                        .iter()
                        .zip(c2.scrutinees.iter())
                        .all(|(a, b)| a.alpha_eq(b))
                    && c1.tree.alpha_eq(&c2.tree)
            }
            (Term::Meta(m1, s1), Term::Meta(m2, s2)) => {
                m1 == m2 && s1.len() == s2.len() && s1.iter().zip(s2.iter()).all(|(a, b)| a.alpha_eq(b))
            }
            _ => false,
        }
    }

    /// Replace solved metavariables (term and universe) by their solutions.
    pub fn instantiate_metas(self: &Arc<Self>, metas: &dyn MetaLookup) -> Arc<Term> {
        match &**self {
            Term::Sort(level) if level.has_metas() => {
                Term::sort(level.instantiate_metas(&|id| metas.level_solution(id)))
            }
            Term::Meta(id, spine) => {
                let spine: Vec<_> = spine.iter().map(|t| t.instantiate_metas(metas)).collect();
                match metas.term_solution(*id).and_then(|sol| sol.apply(&spine)) {
                    Some(solved) => solved.instantiate_metas(metas),
                    None => Term::meta(*id, spine),
                }
            }
            Term::App(fun, arg) if matches!(fun.head(), Term::Meta(..)) => {
                let fun = fun.instantiate_metas(metas);
                let arg = arg.instantiate_metas(metas);
                match &*fun {
                    Term::Lam(_, _, body) => body.instantiate(&arg),
                    _ => Term::app(fun, arg),
                }
            }
            _ => self.map_children(&mut |child, _| child.instantiate_metas(metas)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nat() -> Arc<Term> {
        Term::ind(DefRef::new(DefId(0), "Nat"))
    }

    #[test]
    fn alpha_eq_ignores_binder_names() {
        let id_x = Term::lam(Binder::explicit("x"), nat(), Term::var(0));
        let id_y = Term::lam(Binder::explicit("y"), nat(), Term::var(0));
        assert!(id_x.alpha_eq(&id_y));
        assert_ne!(id_x, id_y);
    }

    #[test]
    fn alpha_eq_respects_implicitness() {
        let explicit = Term::pi(Binder::explicit("x"), nat(), nat());
        let implicit = Term::pi(Binder::implicit("x"), nat(), nat());
        assert!(!explicit.alpha_eq(&implicit));
    }

    #[test]
    fn instantiate_under_binder_shifts_value() {
        // \y. x y  with x := z (free variable 3 outside)
        let body = Term::lam(
            Binder::explicit("y"),
            nat(),
            Term::app(Term::var(1), Term::var(0)),
        );
        let result = body.instantiate(&Term::var(3));
        let expected = Term::lam(
            Binder::explicit("y"),
            nat(),
            Term::app(Term::var(4), Term::var(0)),
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn instantiate_many_orders_outermost_first() {
        // context [a, b], term = (b a)
        let term = Term::app(Term::var(0), Term::var(1));
        let a = Term::constant(DefRef::new(DefId(1), "a"));
        let b = Term::constant(DefRef::new(DefId(2), "b"));
        let result = term.instantiate_many(&[a.clone(), b.clone()]);
        assert_eq!(result, Term::app(b, a));
    }

    #[test]
    fn instantiate_many_lowers_outer_variables() {
        let term = Term::app(Term::var(2), Term::var(0));
        let result = term.instantiate_many(&[nat(), nat()]);
        assert_eq!(result, Term::app(Term::var(0), nat()));
    }

    #[test]
    fn instantiate_many_at_skips_inner_binders() {
        // telescope entry (y : P x) under [params = x], with one earlier field z
        let term = Term::app(Term::var(1), Term::var(0));
        let result = term.instantiate_many_at(1, &[nat()]);
        assert_eq!(result, Term::app(nat(), Term::var(0)));
    }

    #[test]
    fn case_leaves_are_shifted_past_their_slots() {
        let tree = CaseTree::Leaf {
            slots: 2,
            rhs: Term::app(Term::var(0), Term::var(2)),
        };
        let case = Term::case(vec![Term::var(0), Term::var(1)], tree);
        let shifted = case.shift(0, 1);
        let Term::Case(inner) = &*shifted else {
            panic!("expected case");
        };
        assert_eq!(inner.scrutinees, vec![Term::var(1), Term::var(2)]);
        match &inner.tree {
            CaseTree::Leaf { rhs, .. } => {
                assert_eq!(rhs, &Term::app(Term::var(0), Term::var(3)));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn unapply_returns_arguments_in_order() {
        let f = Term::constant(DefRef::new(DefId(7), "f"));
        let term = Term::apps(f.clone(), vec![Term::var(0), Term::var(1)]);
        let (head, args) = term.unapply();
        assert_eq!(head, f);
        assert_eq!(args, vec![Term::var(0), Term::var(1)]);
    }

    struct OneSolution;

    impl MetaLookup for OneSolution {
        fn term_solution(&self, id: MetaId) -> Option<MetaSolution> {
            (id == MetaId(0)).then(|| MetaSolution {
                arity: 1,
                body: Term::lam(Binder::explicit("y"), nat(), Term::var(1)),
            })
        }

        fn level_solution(&self, _id: LevelMetaId) -> Option<Level> {
            Some(Level::of(1))
        }
    }

    #[test]
    fn instantiate_metas_beta_reduces_extra_arguments() {
        let applied = Term::app(Term::meta(MetaId(0), vec![Term::var(5)]), Term::var(2));
        assert_eq!(applied.instantiate_metas(&OneSolution), Term::var(5));
        let sort = Term::sort(Level::Meta(LevelMetaId(0)));
        assert_eq!(sort.instantiate_metas(&OneSolution), Term::sort(Level::of(1)));
    }

    #[test]
    fn loose_variable_queries() {
        let term = Term::lam(Binder::explicit("x"), nat(), Term::var(1));
        assert!(term.has_loose_var(0));
        assert!(!term.has_loose_var(1));
    }
}
