//! Normalizer properties checked against a small Nat environment.

use kernel::config::ReductionConfig;
use kernel::env::{CtorDecl, DataDecl, FnDecl, Param};
use kernel::{
    Binder, CaseArm, CaseTree, Context, CtorRef, DefId, DefRef, Env, GlobalDecl, Level, NoMetas, Normalizer,
    ReduceError, Rules, Term,
};
use std::sync::Arc;

fn nat_ref() -> DefRef {
    DefRef::new(DefId(0), "Nat")
}

fn add_ref() -> DefRef {
    DefRef::new(DefId(1), "add")
}

fn unguarded_ref() -> DefRef {
    DefRef::new(DefId(2), "unguarded")
}

fn stall_ref() -> DefRef {
    DefRef::new(DefId(3), "stall")
}

fn nat() -> Arc<Term> {
    Term::ind(nat_ref())
}

fn ctor(idx: usize, name: &str) -> CtorRef {
    CtorRef {
        data: nat_ref(),
        idx,
        name: name.into(),
    }
}

fn succ(n: Arc<Term>) -> Arc<Term> {
    Term::app(Term::ctor(ctor(1, "succ")), n)
}

fn num(n: u64) -> Arc<Term> {
    (0..n).fold(Term::ctor(ctor(0, "zero")), |acc, _| succ(acc))
}

fn add(a: Arc<Term>, b: Arc<Term>) -> Arc<Term> {
    Term::apps(Term::constant(add_ref()), [a, b])
}

/// `add m n` by recursion on `n`; `unguarded`, a definition wrongly left
/// unmarked as recursive that unfolds to itself; and `stall x = stall x`,
/// a recursive clause definition that never inspects its argument.
fn env() -> Env {
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
        slot: 1,
        data: nat_ref(),
        params: 0,
        arms: vec![
            CaseArm {
                ctor: ctor(0, "zero"),
                fields: 0,
                tree: CaseTree::Leaf {
                    slots: 1,
                    rhs: Term::var(0),
                },
            },
            CaseArm {
                ctor: ctor(1, "succ"),
                fields: 1,
                tree: CaseTree::Leaf {
                    slots: 2,
                    rhs: succ(add(Term::var(1), Term::var(0))),
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
    env.add(GlobalDecl::Fn(FnDecl {
        def: unguarded_ref(),
        ty: nat(),
        body: Some(Term::constant(unguarded_ref())),
        arity: 0,
        recursive: false,
        reducible: false,
    }));
    let stall = Term::lam(
        Binder::explicit("x"),
        nat(),
        Term::case(
            vec![Term::var(0)],
            CaseTree::Leaf {
                slots: 1,
                rhs: Term::app(Term::constant(stall_ref()), Term::var(0)),
            },
        ),
    );
    env.add(GlobalDecl::Fn(FnDecl {
        def: stall_ref(),
        ty: Term::arrow(nat(), nat()),
        body: Some(stall),
        arity: 1,
        recursive: true,
        reducible: false,
    }));
    env
}

fn normalizer(env: &Env, rules: Rules, fuel: usize) -> Normalizer<'_> {
    Normalizer::new(env, &NoMetas, rules, ReductionConfig::resolve(Some(fuel)))
}

#[test]
fn alpha_equivalence_ignores_binder_names() {
    let x = Term::lam(Binder::explicit("x"), nat(), Term::var(0));
    let y = Term::lam(Binder::explicit("y"), nat(), Term::var(0));
    assert!(x.alpha_eq(&y));
    let implicit = Term::lam(Binder::implicit("x"), nat(), Term::var(0));
    assert!(!x.alpha_eq(&implicit));
}

#[test]
fn addition_computes_by_recursion() {
    let env = env();
    let mut norm = normalizer(&env, Rules::all(), 10_000);
    let sum = norm.nf(&add(num(2), num(3)), &Context::new()).unwrap();
    assert_eq!(sum, num(5));
    assert_eq!(sum.to_string(), "5");
}

#[test]
fn whnf_exposes_a_constructor_head() {
    let env = env();
    let mut norm = normalizer(&env, Rules::all(), 10_000);
    let term = add(num(1), num(1));
    let head = norm.whnf(&term, &Context::new()).unwrap();
    assert!(matches!(head.head(), Term::Ctor(c) if c.idx == 1));
    let via_whnf = norm.nf(&head, &Context::new()).unwrap();
    let direct = norm.nf(&term, &Context::new()).unwrap();
    assert!(via_whnf.alpha_eq(&direct));
}

#[test]
fn normal_forms_are_fixed_points() {
    let env = env();
    let mut norm = normalizer(&env, Rules::all(), 10_000);
    let ctx = Context::new();
    let open = Term::lam(Binder::explicit("x"), nat(), add(Term::var(0), num(2)));
    let once = norm.nf(&open, &ctx).unwrap();
    let twice = norm.nf(&once, &ctx).unwrap();
    assert!(once.alpha_eq(&twice));
    insta::assert_snapshot!(once.to_string(), @r"\x => succ (succ x)");
}

#[test]
fn opaque_definitions_stay_folded_under_reducible_rules() {
    let env = env();
    let mut norm = normalizer(&env, Rules::reducible(), 10_000);
    let term = add(num(1), num(1));
    assert_eq!(norm.whnf(&term, &Context::new()).unwrap(), term);
}

#[test]
fn divergence_exhausts_the_budget() {
    let env = env();
    let mut norm = normalizer(&env, Rules::all(), 50);
    assert_eq!(
        norm.whnf(&Term::constant(unguarded_ref()), &Context::new()),
        Err(ReduceError::FuelExhausted(50))
    );
}

#[test]
fn recursion_without_a_split_stays_stuck() {
    let env = env();
    let mut norm = normalizer(&env, Rules::all(), 10_000);
    let closed = Term::app(Term::constant(stall_ref()), num(0));
    assert_eq!(norm.whnf(&closed, &Context::new()).unwrap(), closed);
    assert_eq!(norm.nf(&closed, &Context::new()).unwrap(), closed);

    let ctx = Context::new().extend("n", nat());
    let open = Term::app(Term::constant(stall_ref()), Term::var(0));
    assert_eq!(norm.whnf(&open, &ctx).unwrap(), open);
}
