use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::surface::Span;
use kernel::doc::Doc;
use kernel::level::Level;
use kernel::normalize::ReduceError;
use kernel::pretty::term_doc;
use kernel::{Context, MetaId, Term};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ElabError {
    #[error("type mismatch")]
    TypeMismatch {
        expected: Arc<Term>,
        found: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("cannot unify terms with different heads")]
    HeadMismatch {
        left: Arc<Term>,
        right: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("solution for ?{} would escape its scope", .meta.0)]
    ScopeEscape {
        meta: MetaId,
        term: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("unsolved metavariable ?{}", .meta.0)]
    UnresolvedMetavariable {
        meta: MetaId,
        ty: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("unification problem left unsolved")]
    StuckConstraint {
        left: Arc<Term>,
        right: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("patterns do not cover: {}", .missing.join(" "))]
    CoverageGap { missing: Vec<String>, span: Span },
    #[error("clauses {} and {} overlap but disagree", .first + 1, .second + 1)]
    ConfluenceConflict {
        first: usize,
        second: usize,
        path: Vec<String>,
        left: Arc<Term>,
        right: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("`{name}` is part of a cycle through a type signature: {}", .cycle.join(" -> "))]
    IllegalCycle {
        name: String,
        cycle: Vec<String>,
        span: Span,
    },
    #[error("universe level {found} exceeds bound {bound}")]
    UniverseError { found: Level, bound: Level, span: Span },
    #[error("`{name}` depends on `{root}`, which failed")]
    DependencyFailed { name: String, root: String, span: Span },
    #[error("unresolved name `{name}`")]
    UnresolvedName { name: String, span: Span },
    #[error("expected a function")]
    NotAFunction {
        term: Arc<Term>,
        ty: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("expected a type")]
    NotAType {
        term: Arc<Term>,
        ty: Arc<Term>,
        ctx: Context,
        span: Span,
    },
    #[error("invalid pattern: {reason}")]
    InvalidPattern { reason: String, span: Span },
    #[error("`{name}` is already defined")]
    DuplicateDefinition { name: String, span: Span },
    #[error("{source}")]
    Reduction { source: ReduceError, span: Span },
    #[error("elaboration cancelled")]
    Cancelled { span: Span },
}

impl ElabError {
    pub fn reduction(source: ReduceError, span: Span) -> Self {
        ElabError::Reduction { source, span }
    }

    pub fn span(&self) -> Span {
        match self {
            ElabError::TypeMismatch { span, .. }
            | ElabError::HeadMismatch { span, .. }
            | ElabError::ScopeEscape { span, .. }
            | ElabError::UnresolvedMetavariable { span, .. }
            | ElabError::StuckConstraint { span, .. }
            | ElabError::CoverageGap { span, .. }
            | ElabError::ConfluenceConflict { span, .. }
            | ElabError::IllegalCycle { span, .. }
            | ElabError::UniverseError { span, .. }
            | ElabError::DependencyFailed { span, .. }
            | ElabError::UnresolvedName { span, .. }
            | ElabError::NotAFunction { span, .. }
            | ElabError::NotAType { span, .. }
            | ElabError::InvalidPattern { span, .. }
            | ElabError::DuplicateDefinition { span, .. }
            | ElabError::Reduction { span, .. }
            | ElabError::Cancelled { span } => *span,
        }
    }

    /// Attach a span if the error does not carry one yet.
    pub fn or_span(mut self, fallback: Span) -> Self {
        if self.span().is_unknown() {
            match &mut self {
                ElabError::TypeMismatch { span, .. }
                | ElabError::HeadMismatch { span, .. }
                | ElabError::ScopeEscape { span, .. }
                | ElabError::UnresolvedMetavariable { span, .. }
                | ElabError::StuckConstraint { span, .. }
                | ElabError::CoverageGap { span, .. }
                | ElabError::ConfluenceConflict { span, .. }
                | ElabError::IllegalCycle { span, .. }
                | ElabError::UniverseError { span, .. }
                | ElabError::DependencyFailed { span, .. }
                | ElabError::UnresolvedName { span, .. }
                | ElabError::NotAFunction { span, .. }
                | ElabError::NotAType { span, .. }
                | ElabError::InvalidPattern { span, .. }
                | ElabError::DuplicateDefinition { span, .. }
                | ElabError::Reduction { span, .. }
                | ElabError::Cancelled { span } => *span = fallback,
            }
        }
        self
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            ElabError::TypeMismatch { .. } => DiagnosticKind::TypeMismatch,
            ElabError::HeadMismatch { .. } => DiagnosticKind::HeadMismatch,
            ElabError::ScopeEscape { .. } => DiagnosticKind::ScopeEscape,
            ElabError::UnresolvedMetavariable { .. } | ElabError::StuckConstraint { .. } => {
                DiagnosticKind::UnresolvedMetavariable
            }
            ElabError::CoverageGap { .. } => DiagnosticKind::CoverageGap,
            ElabError::ConfluenceConflict { .. } => DiagnosticKind::ConfluenceConflict,
            ElabError::IllegalCycle { .. } => DiagnosticKind::IllegalCycle,
            ElabError::UniverseError { .. } => DiagnosticKind::UniverseError,
            ElabError::DependencyFailed { .. } => DiagnosticKind::DependencyFailed,
            ElabError::UnresolvedName { .. } => DiagnosticKind::UnresolvedName,
            ElabError::NotAFunction { .. } => DiagnosticKind::NotAFunction,
            ElabError::NotAType { .. } => DiagnosticKind::NotAType,
            ElabError::InvalidPattern { .. } => DiagnosticKind::InvalidPattern,
            ElabError::DuplicateDefinition { .. } => DiagnosticKind::DuplicateDefinition,
            ElabError::Reduction { .. } => DiagnosticKind::Reduction,
            ElabError::Cancelled { .. } => DiagnosticKind::Cancelled,
        }
    }

    fn docs(&self) -> Vec<Doc> {
        fn labelled(label: &str, term: &Term, ctx: &Context) -> Doc {
            Doc::hsep([Doc::text(label), term_doc(term, &ctx.names())])
        }
        match self {
            ElabError::TypeMismatch {
                expected,
                found,
                ctx,
                ..
            } => vec![
                labelled("expected:", expected, ctx),
                labelled("found:", found, ctx),
            ],
            ElabError::HeadMismatch { left, right, ctx, .. }
            | ElabError::StuckConstraint { left, right, ctx, .. } => vec![
                labelled("left:", left, ctx),
                labelled("right:", right, ctx),
            ],
            ElabError::ScopeEscape { term, ctx, .. } => vec![labelled("candidate:", term, ctx)],
            ElabError::UnresolvedMetavariable { ty, ctx, .. } => vec![labelled("type:", ty, ctx)],
            ElabError::CoverageGap { missing, .. } => vec![Doc::hsep([
                Doc::text("missing:"),
                Doc::text(missing.join(" ")),
            ])],
            ElabError::ConfluenceConflict {
                path,
                left,
                right,
                ctx,
                ..
            } => vec![
                Doc::hsep([Doc::text("case:"), Doc::text(path.join(" "))]),
                labelled("first:", left, ctx),
                labelled("second:", right, ctx),
            ],
            ElabError::NotAFunction { term, ty, ctx, .. } | ElabError::NotAType { term, ty, ctx, .. } => vec![
                labelled("term:", term, ctx),
                labelled("type:", ty, ctx),
            ],
            _ => vec![],
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        self.docs().into_iter().fold(
            Diagnostic::error(self.kind(), self.to_string()).with_span(self.span()),
            Diagnostic::with_doc,
        )
    }
}

impl From<ElabError> for Diagnostic {
    fn from(err: ElabError) -> Self {
        err.to_diagnostic()
    }
}

pub type ElabResult<T> = Result<T, ElabError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{Binder, DefId, DefRef};

    #[test]
    fn mismatch_documents_use_context_names() {
        let nat = Term::ind(DefRef::new(DefId(0), "Nat"));
        let ctx = Context::new().extend("A", Term::sort(Level::Zero));
        let err = ElabError::TypeMismatch {
            expected: nat.clone(),
            found: Term::pi(Binder::explicit("x"), Term::var(0), Term::var(1)),
            ctx,
            span: Span(4),
        };
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.kind, DiagnosticKind::TypeMismatch);
        assert_eq!(diagnostic.span, Some(Span(4)));
        assert_eq!(diagnostic.docs[1].render(), "found: A -> A");
    }

    #[test]
    fn or_span_keeps_existing_span() {
        let err = ElabError::UnresolvedName {
            name: "odd".into(),
            span: Span(2),
        };
        assert_eq!(err.or_span(Span(9)).span(), Span(2));
        let err = ElabError::UnresolvedName {
            name: "odd".into(),
            span: Span::UNKNOWN,
        };
        assert_eq!(err.or_span(Span(9)).span(), Span(9));
    }
}
