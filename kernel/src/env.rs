use crate::ast::{Binder, CtorRef, DefId, DefRef, Name, Term};
use crate::level::Level;
use std::sync::Arc;

/// Transparency levels for reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transparency {
    None,      // Opaque
    Reducible, // Only definitions marked reducible
    All,       // Unfold everything with a body
}

/// One entry of a telescope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub binder: Binder,
    pub ty: Arc<Term>,
}

/// A top-level function. `body` is absent while the function is only
/// declared, e.g. for siblings of a mutually recursive batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnDecl {
    pub def: DefRef,
    pub ty: Arc<Term>,
    pub body: Option<Arc<Term>>,
    /// Leading lambdas of `body`.
    pub arity: usize,
    pub recursive: bool,
    pub reducible: bool,
}

impl FnDecl {
    pub fn unfolds_under(&self, transparency: Transparency) -> bool {
        match transparency {
            Transparency::None => false,
            Transparency::Reducible => self.reducible,
            Transparency::All => true,
        }
    }
}

/// A single constructor of a data type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtorDecl {
    pub name: Name,
    /// Field telescope, relative to the data type's parameters.
    pub fields: Vec<Param>,
    /// Full type, taking the data parameters implicitly.
    pub ty: Arc<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDecl {
    pub def: DefRef,
    pub params: Vec<Param>,
    pub sort: Level,
    /// `params -> Sort sort`
    pub ty: Arc<Term>,
    pub ctors: Vec<CtorDecl>,
    /// Projection functions when declared as a structure.
    pub projections: Vec<DefRef>,
}

impl DataDecl {
    pub fn ctor_ref(&self, idx: usize) -> Option<CtorRef> {
        self.ctors.get(idx).map(|ctor| CtorRef {
            data: self.def.clone(),
            idx,
            name: ctor.name.clone(),
        })
    }

    pub fn is_structure(&self) -> bool {
        !self.projections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalDecl {
    Fn(FnDecl),
    Data(DataDecl),
}

impl GlobalDecl {
    pub fn def(&self) -> &DefRef {
        match self {
            GlobalDecl::Fn(decl) => &decl.def,
            GlobalDecl::Data(decl) => &decl.def,
        }
    }

    pub fn ty(&self) -> &Arc<Term> {
        match self {
            GlobalDecl::Fn(decl) => &decl.ty,
            GlobalDecl::Data(decl) => &decl.ty,
        }
    }
}

/// What a global name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalName {
    Fn(DefRef),
    Data(DefRef),
    Ctor(CtorRef),
}

/// The global signature of elaborated declarations.
///
/// Both maps are persistent, so cloning an environment to hand a snapshot to
/// a worker is constant time.
#[derive(Debug, Clone, Default)]
pub struct Env {
    decls: im::HashMap<DefId, GlobalDecl>,
    names: im::HashMap<Name, GlobalName>,
    /// Bare constructor names that stay qualified-only.
    hidden: im::HashSet<Name>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `name` from ever resolving to a constructor by its bare name.
    pub fn hide(&mut self, name: impl Into<Name>) {
        let name = name.into();
        if let Some(GlobalName::Ctor(_)) = self.names.get(&name) {
            self.names.remove(&name);
        }
        self.hidden.insert(name);
    }

    /// Register or replace a declaration together with the names it defines:
    /// the declaration itself, `Data.ctor` and the bare constructor name
    /// unless that is taken or hidden. Structure constructors are only
    /// reachable qualified.
    pub fn add(&mut self, decl: GlobalDecl) {
        match &decl {
            GlobalDecl::Fn(f) => {
                self.names.insert(f.def.name.clone(), GlobalName::Fn(f.def.clone()));
            }
            GlobalDecl::Data(d) => {
                self.names.insert(d.def.name.clone(), GlobalName::Data(d.def.clone()));
                for idx in 0..d.ctors.len() {
                    if let Some(ctor) = d.ctor_ref(idx) {
                        let qualified: Name = format!("{}.{}", d.def.name, ctor.name).into();
                        self.names.insert(qualified, GlobalName::Ctor(ctor.clone()));
                        if d.is_structure() || self.hidden.contains(&ctor.name) {
                            continue;
                        }
                        let bare_free = match self.names.get(&*ctor.name) {
                            None => true,
                            Some(GlobalName::Ctor(existing)) => existing.data.id == d.def.id,
                            Some(_) => false,
                        };
                        if bare_free {
                            self.names.insert(ctor.name.clone(), GlobalName::Ctor(ctor));
                        }
                    }
                }
            }
        }
        self.decls.insert(decl.def().id, decl);
    }

    pub fn get(&self, id: DefId) -> Option<&GlobalDecl> {
        self.decls.get(&id)
    }

    pub fn get_fn(&self, id: DefId) -> Option<&FnDecl> {
        match self.decls.get(&id)? {
            GlobalDecl::Fn(decl) => Some(decl),
            GlobalDecl::Data(_) => None,
        }
    }

    pub fn get_data(&self, id: DefId) -> Option<&DataDecl> {
        match self.decls.get(&id)? {
            GlobalDecl::Data(decl) => Some(decl),
            GlobalDecl::Fn(_) => None,
        }
    }

    pub fn get_ctor(&self, ctor: &CtorRef) -> Option<&CtorDecl> {
        self.get_data(ctor.data.id)?.ctors.get(ctor.idx)
    }

    pub fn resolve(&self, name: &str) -> Option<&GlobalName> {
        self.names.get(name)
    }

    pub fn contains(&self, id: DefId) -> bool {
        self.decls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Declarations ordered by identity.
    pub fn decls(&self) -> Vec<&GlobalDecl> {
        let mut decls: Vec<&GlobalDecl> = self.decls.values().collect();
        decls.sort_by_key(|decl| decl.def().id);
        decls
    }

    /// Type of a constructor reference.
    pub fn ctor_type(&self, ctor: &CtorRef) -> Option<Arc<Term>> {
        self.get_ctor(ctor).map(|decl| decl.ty.clone())
    }

    /// Type of a global term former.
    pub fn type_of(&self, term: &Term) -> Option<Arc<Term>> {
        match term {
            Term::Ind(def) | Term::Const(def) => self.get(def.id).map(|decl| decl.ty().clone()),
            Term::Ctor(ctor) => self.ctor_type(ctor),
            _ => None,
        }
    }
}
