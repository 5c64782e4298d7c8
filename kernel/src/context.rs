use crate::ast::{Binder, BinderInfo, Name, Term};
use std::sync::Arc;

/// A local binding. `ty` and `value` are stored relative to the bindings
/// that precede this one.
#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub name: Name,
    pub info: BinderInfo,
    pub ty: Arc<Term>,
    pub value: Option<Arc<Term>>,
}

/// Persistent typing context. Extending returns a new context that shares
/// structure with the receiver, which is left untouched.
#[derive(Debug, Clone, Default)]
pub struct Context {
    decls: im::Vector<LocalDecl>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    fn push(&self, decl: LocalDecl) -> Self {
        let mut decls = self.decls.clone();
        decls.push_back(decl);
        Context { decls }
    }

    pub fn extend(&self, name: impl Into<Name>, ty: Arc<Term>) -> Self {
        self.push(LocalDecl {
            name: name.into(),
            info: BinderInfo::Default,
            ty,
            value: None,
        })
    }

    pub fn extend_binder(&self, binder: &Binder, ty: Arc<Term>) -> Self {
        self.push(LocalDecl {
            name: binder.name.clone(),
            info: binder.info,
            ty,
            value: None,
        })
    }

    /// Let-bound local: `value` is unfolded by zeta reduction.
    pub fn define(&self, name: impl Into<Name>, ty: Arc<Term>, value: Arc<Term>) -> Self {
        self.push(LocalDecl {
            name: name.into(),
            info: BinderInfo::Default,
            ty,
            value: Some(value),
        })
    }

    /// The binding for de Bruijn index `idx`, weakened into this context.
    pub fn lookup(&self, idx: usize) -> Option<LocalDecl> {
        let pos = self.decls.len().checked_sub(idx + 1)?;
        let decl = self.decls.get(pos)?;
        Some(LocalDecl {
            name: decl.name.clone(),
            info: decl.info,
            ty: decl.ty.shift(0, idx + 1),
            value: decl.value.as_ref().map(|v| v.shift(0, idx + 1)),
        })
    }

    pub fn type_of(&self, idx: usize) -> Option<Arc<Term>> {
        self.lookup(idx).map(|decl| decl.ty)
    }

    pub fn value_of(&self, idx: usize) -> Option<Arc<Term>> {
        let pos = self.decls.len().checked_sub(idx + 1)?;
        let value = self.decls.get(pos)?.value.as_ref()?;
        Some(value.shift(0, idx + 1))
    }

    /// Innermost binding named `name`, with its de Bruijn index.
    pub fn lookup_name(&self, name: &str) -> Option<(usize, LocalDecl)> {
        let idx = self
            .decls
            .iter()
            .rev()
            .position(|decl| &*decl.name == name)?;
        self.lookup(idx).map(|decl| (idx, decl))
    }

    /// Bindings outermost first, as stored.
    pub fn to_list(&self) -> Vec<LocalDecl> {
        self.decls.iter().cloned().collect()
    }

    pub fn names(&self) -> Vec<Name> {
        self.decls.iter().map(|decl| decl.name.clone()).collect()
    }

    /// Variables of this context as terms, outermost first.
    pub fn vars(&self) -> Vec<Arc<Term>> {
        let n = self.decls.len();
        (0..n).map(|pos| Term::var(n - 1 - pos)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;

    #[test]
    fn extension_does_not_affect_the_original() {
        let base = Context::new().extend("A", Term::sort(Level::Zero));
        let left = base.extend("x", Term::var(0));
        let right = base.extend("y", Term::var(0)).extend("z", Term::var(1));
        assert_eq!(base.len(), 1);
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 3);
        assert!(left.lookup_name("y").is_none());
        assert_eq!(right.lookup_name("y").map(|(idx, _)| idx), Some(1));
    }

    #[test]
    fn lookup_weakens_types() {
        let ctx = Context::new()
            .extend("A", Term::sort(Level::Zero))
            .extend("x", Term::var(0))
            .extend("y", Term::var(1));
        // both x and y have type A, which is index 2 from the end
        assert_eq!(ctx.type_of(1), Some(Term::var(2)));
        assert_eq!(ctx.type_of(0), Some(Term::var(2)));
    }

    #[test]
    fn innermost_binding_shadows() {
        let ctx = Context::new()
            .extend("x", Term::sort(Level::Zero))
            .extend("x", Term::sort(Level::of(1)));
        let (idx, decl) = ctx.lookup_name("x").expect("bound");
        assert_eq!(idx, 0);
        assert_eq!(decl.ty, Term::sort(Level::of(1)));
    }

    #[test]
    fn let_values_are_weakened() {
        let ctx = Context::new()
            .extend("n", Term::sort(Level::Zero))
            .define("m", Term::var(0), Term::var(0))
            .extend("k", Term::var(1));
        assert_eq!(ctx.value_of(1), Some(Term::var(2)));
        assert_eq!(ctx.value_of(0), None);
        assert_eq!(ctx.vars(), vec![Term::var(2), Term::var(1), Term::var(0)]);
    }
}
