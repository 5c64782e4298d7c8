//! Surface syntax handed over by the parser.
//!
//! Spans are opaque identifiers owned by the parser; the elaborator only
//! copies them into diagnostics. The whole tree is serde-serializable so a
//! host can exchange modules as JSON.

use serde::{Deserialize, Serialize};

/// Opaque source location handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span(pub u32);

impl Span {
    pub const UNKNOWN: Span = Span(u32::MAX);

    pub fn is_unknown(self) -> bool {
        self == Span::UNKNOWN
    }

    pub fn or(self, fallback: Span) -> Span {
        if self.is_unknown() {
            fallback
        } else {
            self
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::UNKNOWN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Plicity {
    #[default]
    Explicit,
    Implicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    First,
    Second,
}

/// High-level Surface Term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceTerm {
    pub kind: SurfaceTermKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceTermKind {
    Var(String),
    /// `Type n`; `None` leaves the level to inference.
    Sort(Option<u32>),
    Pi(String, Plicity, Box<SurfaceTerm>, Box<SurfaceTerm>), // Name, Plicity, Domain, Codomain
    Lam(String, Plicity, Option<Box<SurfaceTerm>>, Box<SurfaceTerm>), // Name, Plicity, Annotation, Body
    App(Box<SurfaceTerm>, Box<SurfaceTerm>, Plicity),
    Sigma(String, Box<SurfaceTerm>, Box<SurfaceTerm>),
    Pair(Box<SurfaceTerm>, Box<SurfaceTerm>),
    Proj(Box<SurfaceTerm>, Projection),
    Let(String, Option<Box<SurfaceTerm>>, Box<SurfaceTerm>, Box<SurfaceTerm>), // Name, Type, Val, Body
    Ann(Box<SurfaceTerm>, Box<SurfaceTerm>),
    NatLit(u64),
    Hole,
}

impl SurfaceTerm {
    pub fn new(kind: SurfaceTermKind) -> Self {
        SurfaceTerm {
            kind,
            span: Span::UNKNOWN,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::new(SurfaceTermKind::Var(name.into()))
    }

    pub fn sort(level: u32) -> Self {
        Self::new(SurfaceTermKind::Sort(Some(level)))
    }

    /// `Type` with an inferred level.
    pub fn universe() -> Self {
        Self::new(SurfaceTermKind::Sort(None))
    }

    pub fn pi(name: impl Into<String>, dom: SurfaceTerm, cod: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Pi(name.into(), Plicity::Explicit, Box::new(dom), Box::new(cod)))
    }

    pub fn implicit_pi(name: impl Into<String>, dom: SurfaceTerm, cod: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Pi(name.into(), Plicity::Implicit, Box::new(dom), Box::new(cod)))
    }

    pub fn arrow(dom: SurfaceTerm, cod: SurfaceTerm) -> Self {
        Self::pi("_", dom, cod)
    }

    pub fn lam(name: impl Into<String>, body: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Lam(name.into(), Plicity::Explicit, None, Box::new(body)))
    }

    pub fn lam_ann(name: impl Into<String>, ty: SurfaceTerm, body: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Lam(
            name.into(),
            Plicity::Explicit,
            Some(Box::new(ty)),
            Box::new(body),
        ))
    }

    pub fn implicit_lam(name: impl Into<String>, body: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Lam(name.into(), Plicity::Implicit, None, Box::new(body)))
    }

    pub fn app(fun: SurfaceTerm, arg: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::App(Box::new(fun), Box::new(arg), Plicity::Explicit))
    }

    /// Application supplying an implicit argument, `f {a}`.
    pub fn implicit_app(fun: SurfaceTerm, arg: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::App(Box::new(fun), Box::new(arg), Plicity::Implicit))
    }

    pub fn apps(fun: SurfaceTerm, args: impl IntoIterator<Item = SurfaceTerm>) -> Self {
        args.into_iter().fold(fun, SurfaceTerm::app)
    }

    pub fn sigma(name: impl Into<String>, fst: SurfaceTerm, snd: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Sigma(name.into(), Box::new(fst), Box::new(snd)))
    }

    pub fn pair(a: SurfaceTerm, b: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Pair(Box::new(a), Box::new(b)))
    }

    pub fn fst(t: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Proj(Box::new(t), Projection::First))
    }

    pub fn snd(t: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Proj(Box::new(t), Projection::Second))
    }

    pub fn let_in(name: impl Into<String>, ty: Option<SurfaceTerm>, val: SurfaceTerm, body: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Let(
            name.into(),
            ty.map(Box::new),
            Box::new(val),
            Box::new(body),
        ))
    }

    pub fn ann(term: SurfaceTerm, ty: SurfaceTerm) -> Self {
        Self::new(SurfaceTermKind::Ann(Box::new(term), Box::new(ty)))
    }

    pub fn nat(n: u64) -> Self {
        Self::new(SurfaceTermKind::NatLit(n))
    }

    pub fn hole() -> Self {
        Self::new(SurfaceTermKind::Hole)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub plicity: Plicity,
    pub ty: SurfaceTerm,
    #[serde(default)]
    pub span: Span,
}

impl Param {
    pub fn explicit(name: impl Into<String>, ty: SurfaceTerm) -> Self {
        Param {
            name: name.into(),
            plicity: Plicity::Explicit,
            ty,
            span: Span::UNKNOWN,
        }
    }

    pub fn implicit(name: impl Into<String>, ty: SurfaceTerm) -> Self {
        Param {
            name: name.into(),
            plicity: Plicity::Implicit,
            ty,
            span: Span::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    #[serde(default)]
    pub plicity: Plicity,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// A variable, or a nullary constructor of the expected type.
    Bind(String),
    Wildcard,
    Ctor(String, Vec<Pattern>, Option<String>), // Name, Args, As-binding
    /// `()`: the expected type has no constructors.
    Absurd,
}

impl Pattern {
    fn new(kind: PatternKind) -> Self {
        Pattern {
            kind,
            plicity: Plicity::Explicit,
            span: Span::UNKNOWN,
        }
    }

    pub fn bind(name: impl Into<String>) -> Self {
        Self::new(PatternKind::Bind(name.into()))
    }

    pub fn wildcard() -> Self {
        Self::new(PatternKind::Wildcard)
    }

    pub fn ctor(name: impl Into<String>, args: Vec<Pattern>) -> Self {
        Self::new(PatternKind::Ctor(name.into(), args, None))
    }

    pub fn absurd() -> Self {
        Self::new(PatternKind::Absurd)
    }

    /// Bind the whole matched value as well, `name@(c args)`.
    pub fn with_as(mut self, name: impl Into<String>) -> Self {
        if let PatternKind::Ctor(_, _, binding) = &mut self.kind {
            *binding = Some(name.into());
        }
        self
    }

    pub fn implicit(mut self) -> Self {
        self.plicity = Plicity::Implicit;
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub patterns: Vec<Pattern>,
    /// Absent for absurd clauses.
    pub rhs: Option<SurfaceTerm>,
    #[serde(default)]
    pub span: Span,
}

impl Clause {
    pub fn new(patterns: Vec<Pattern>, rhs: SurfaceTerm) -> Self {
        Clause {
            patterns,
            rhs: Some(rhs),
            span: Span::UNKNOWN,
        }
    }

    pub fn absurd(patterns: Vec<Pattern>) -> Self {
        Clause {
            patterns,
            rhs: None,
            span: Span::UNKNOWN,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FnBody {
    Expr(SurfaceTerm),
    Clauses(Vec<Clause>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtorDecl {
    pub name: String,
    pub fields: Vec<Param>,
    #[serde(default)]
    pub span: Span,
}

impl CtorDecl {
    pub fn new(name: impl Into<String>, fields: Vec<Param>) -> Self {
        CtorDecl {
            name: name.into(),
            fields,
            span: Span::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: SurfaceTerm,
    #[serde(default)]
    pub span: Span,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: SurfaceTerm) -> Self {
        FieldDecl {
            name: name.into(),
            ty,
            span: Span::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    Fn {
        params: Vec<Param>,
        result: SurfaceTerm,
        body: FnBody,
        #[serde(default)]
        reducible: bool,
    },
    Data {
        params: Vec<Param>,
        sort: SurfaceTerm,
        ctors: Vec<CtorDecl>,
    },
    Struct {
        params: Vec<Param>,
        sort: SurfaceTerm,
        fields: Vec<FieldDecl>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decl {
    pub name: String,
    pub kind: DeclKind,
    #[serde(default)]
    pub span: Span,
}

impl Decl {
    pub fn function(name: impl Into<String>, params: Vec<Param>, result: SurfaceTerm, body: SurfaceTerm) -> Self {
        Decl {
            name: name.into(),
            kind: DeclKind::Fn {
                params,
                result,
                body: FnBody::Expr(body),
                reducible: false,
            },
            span: Span::UNKNOWN,
        }
    }

    pub fn clauses(name: impl Into<String>, params: Vec<Param>, result: SurfaceTerm, clauses: Vec<Clause>) -> Self {
        Decl {
            name: name.into(),
            kind: DeclKind::Fn {
                params,
                result,
                body: FnBody::Clauses(clauses),
                reducible: false,
            },
            span: Span::UNKNOWN,
        }
    }

    pub fn data(name: impl Into<String>, params: Vec<Param>, sort: SurfaceTerm, ctors: Vec<CtorDecl>) -> Self {
        Decl {
            name: name.into(),
            kind: DeclKind::Data { params, sort, ctors },
            span: Span::UNKNOWN,
        }
    }

    pub fn structure(name: impl Into<String>, params: Vec<Param>, sort: SurfaceTerm, fields: Vec<FieldDecl>) -> Self {
        Decl {
            name: name.into(),
            kind: DeclKind::Struct { params, sort, fields },
            span: Span::UNKNOWN,
        }
    }

    /// Mark a function as eagerly unfoldable.
    pub fn reducible(mut self) -> Self {
        if let DeclKind::Fn { reducible, .. } = &mut self.kind {
            *reducible = true;
        }
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn params(&self) -> &[Param] {
        match &self.kind {
            DeclKind::Fn { params, .. } | DeclKind::Data { params, .. } | DeclKind::Struct { params, .. } => params,
        }
    }

    /// Names this declaration brings into scope besides its own.
    pub fn defined_names(&self) -> Vec<String> {
        match &self.kind {
            DeclKind::Fn { .. } => vec![],
            DeclKind::Data { ctors, .. } => ctors
                .iter()
                .flat_map(|ctor| [ctor.name.clone(), format!("{}.{}", self.name, ctor.name)])
                .collect(),
            DeclKind::Struct { fields, .. } => {
                let mut names = vec![format!("{}.mk", self.name)];
                names.extend(fields.iter().map(|field| format!("{}.{}", self.name, field.name)));
                names
            }
        }
    }
}

/// One compilation unit as produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Module {
    pub decls: Vec<Decl>,
}

impl Module {
    pub fn new(decls: Vec<Decl>) -> Self {
        Module { decls }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_spans_default_to_unknown() {
        let json = r#"{"kind":{"Var":"x"}}"#;
        let term: SurfaceTerm = serde_json::from_str(json).expect("valid term");
        assert_eq!(term, SurfaceTerm::var("x"));
        assert!(term.span.is_unknown());
    }

    #[test]
    fn module_survives_json() {
        let module = Module::new(vec![Decl::data(
            "Nat",
            vec![],
            SurfaceTerm::sort(0),
            vec![
                CtorDecl::new("zero", vec![]),
                CtorDecl::new("succ", vec![Param::explicit("n", SurfaceTerm::var("Nat"))]),
            ],
        )
        .at(Span(3))]);
        let json = serde_json::to_string(&module).expect("serializes");
        let back: Module = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, module);
    }

    #[test]
    fn structures_define_constructor_and_projections() {
        let decl = Decl::structure(
            "Point",
            vec![],
            SurfaceTerm::sort(0),
            vec![
                FieldDecl::new("x", SurfaceTerm::var("Nat")),
                FieldDecl::new("y", SurfaceTerm::var("Nat")),
            ],
        );
        assert_eq!(decl.defined_names(), vec!["Point.mk", "Point.x", "Point.y"]);
    }
}
