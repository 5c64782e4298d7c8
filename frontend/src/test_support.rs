use kernel::env::{CtorDecl, DataDecl, FnDecl, Param};
use kernel::{Binder, CtorRef, DefId, DefRef, Env, GlobalDecl, Level, Term};
use std::sync::Arc;

pub fn nat_ref() -> DefRef {
    DefRef::new(DefId(0), "Nat")
}

pub fn two_ref() -> DefRef {
    DefRef::new(DefId(1), "two")
}

pub fn nat() -> Arc<Term> {
    Term::ind(nat_ref())
}

pub fn zero() -> Arc<Term> {
    Term::ctor(CtorRef {
        data: nat_ref(),
        idx: 0,
        name: "zero".into(),
    })
}

pub fn succ(n: Arc<Term>) -> Arc<Term> {
    Term::app(
        Term::ctor(CtorRef {
            data: nat_ref(),
            idx: 1,
            name: "succ".into(),
        }),
        n,
    )
}

/// `Nat` plus an opaque `two := succ (succ zero)`.
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
    env.add(GlobalDecl::Fn(FnDecl {
        def: two_ref(),
        ty: nat(),
        body: Some(succ(succ(zero()))),
        arity: 0,
        recursive: false,
        reducible: false,
    }));
    env
}
