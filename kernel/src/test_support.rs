//! Hand-built signatures shared by the unit tests.

use crate::ast::{Binder, CaseArm, CaseTree, CtorRef, DefId, DefRef, Term};
use crate::env::{CtorDecl, DataDecl, Env, FnDecl, GlobalDecl, Param};
use crate::level::Level;
use std::sync::Arc;

pub fn nat_ref() -> DefRef {
    DefRef::new(DefId(0), "Nat")
}

pub fn add_ref() -> DefRef {
    DefRef::new(DefId(1), "add")
}

pub fn nat() -> Arc<Term> {
    Term::ind(nat_ref())
}

pub fn zero_ref() -> CtorRef {
    CtorRef {
        data: nat_ref(),
        idx: 0,
        name: "zero".into(),
    }
}

pub fn succ_ref() -> CtorRef {
    CtorRef {
        data: nat_ref(),
        idx: 1,
        name: "succ".into(),
    }
}

pub fn zero() -> Arc<Term> {
    Term::ctor(zero_ref())
}

pub fn succ(n: Arc<Term>) -> Arc<Term> {
    Term::app(Term::ctor(succ_ref()), n)
}

pub fn numeral(n: u32) -> Arc<Term> {
    (0..n).fold(zero(), |acc, _| succ(acc))
}

/// `Nat` plus `add` defined by recursion on its first argument.
pub fn nat_env() -> Env {
    let mut env = Env::new();
    env.add(GlobalDecl::Data(DataDecl {
        def: nat_ref(),
        params: vec![],
        sort: Level::Zero,
        ty: Term::sort(Level::Zero),
        ctors: vec![
            CtorDecl {
                name: "zero".into(),
                fields: vec![],
                ty: nat(),
            },
            CtorDecl {
                name: "succ".into(),
                fields: vec![Param {
                    binder: Binder::explicit("n"),
                    ty: nat(),
                }],
                ty: Term::arrow(nat(), nat()),
            },
        ],
        projections: vec![],
    }));

    let tree = CaseTree::Split {
        slot: 0,
        data: nat_ref(),
        params: 0,
        arms: vec![
            CaseArm {
                ctor: zero_ref(),
                fields: 0,
                tree: CaseTree::Leaf {
                    slots: 1,
                    rhs: Term::var(0),
                },
            },
            CaseArm {
                ctor: succ_ref(),
                fields: 1,
                tree: CaseTree::Leaf {
                    slots: 2,
                    rhs: succ(Term::apps(
                        Term::constant(add_ref()),
                        vec![Term::var(1), Term::var(0)],
                    )),
                },
            },
        ],
    };
    let body = Term::lam(
        Binder::explicit("m"),
        nat(),
        Term::lam(
            Binder::explicit("n"),
            nat(),
            Term::case(vec![Term::var(1), Term::var(0)], tree),
        ),
    );
    env.add(GlobalDecl::Fn(FnDecl {
        def: add_ref(),
        ty: Term::arrow(nat(), Term::arrow(nat(), nat())),
        body: Some(body),
        arity: 2,
        recursive: true,
        reducible: false,
    }));
    env
}
