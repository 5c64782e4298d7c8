use crate::surface::Span;
use kernel::doc::Doc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Structured classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    HeadMismatch,
    ScopeEscape,
    UnresolvedMetavariable,
    CoverageGap,
    ConfluenceConflict,
    IllegalCycle,
    UniverseError,
    TypeMismatch,
    DependencyFailed,
    UnresolvedName,
    NotAFunction,
    NotAType,
    InvalidPattern,
    DuplicateDefinition,
    Reduction,
    Cancelled,
    UnreachableClause,
    AmbiguousName,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<Span>,
    /// Declaration being elaborated when the diagnostic was raised.
    pub decl: Option<String>,
    /// Supporting documents, e.g. the two sides of a mismatch.
    pub docs: Vec<Doc>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, message: String) -> Self {
        Self {
            severity,
            kind,
            message,
            span: None,
            decl: None,
            docs: Vec::new(),
        }
    }

    pub fn error(kind: DiagnosticKind, message: String) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    pub fn warning(kind: DiagnosticKind, message: String) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        if !span.is_unknown() {
            self.span = Some(span);
        }
        self
    }

    pub fn with_doc(mut self, doc: Doc) -> Self {
        self.docs.push(doc);
        self
    }

    pub fn in_decl(mut self, name: impl Into<String>) -> Self {
        self.decl = Some(name.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Plain rendering without layout, for logs and tests.
    pub fn to_doc(&self) -> Doc {
        let mut header = format!("{}[{}]", self.severity, self.kind);
        if let Some(decl) = &self.decl {
            header.push_str(&format!(" in `{}`", decl));
        }
        if let Some(span) = self.span {
            header.push_str(&format!(" at #{}", span.0));
        }
        header.push_str(": ");
        header.push_str(&self.message);
        let mut lines = vec![Doc::text(header)];
        lines.extend(self.docs.iter().cloned());
        Doc::nest(2, Doc::vcat(lines))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_doc())
    }
}

pub trait DiagnosticHandler {
    fn handle(&mut self, diagnostic: Diagnostic);
}

// Simple vector collector
pub struct DiagnosticCollector {
    pub diagnostics: Vec<Diagnostic>,
}

impl Default for DiagnosticCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}

impl DiagnosticHandler for DiagnosticCollector {
    fn handle(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_span_ignores_unknown_sentinel_span() {
        let diagnostic =
            Diagnostic::error(DiagnosticKind::TypeMismatch, "test".to_string()).with_span(Span::UNKNOWN);
        assert!(diagnostic.span.is_none());
    }

    #[test]
    fn with_span_keeps_real_zero_span() {
        let diagnostic =
            Diagnostic::error(DiagnosticKind::TypeMismatch, "test".to_string()).with_span(Span(0));
        assert_eq!(diagnostic.span, Some(Span(0)));
    }

    #[test]
    fn rendering_lists_documents_below_the_header() {
        let diagnostic = Diagnostic::error(DiagnosticKind::CoverageGap, "missing case".to_string())
            .in_decl("pred")
            .with_span(Span(7))
            .with_doc(Doc::text("succ _"));
        assert_eq!(
            diagnostic.to_string(),
            "error[CoverageGap] in `pred` at #7: missing case\n  succ _"
        );
    }

    #[test]
    fn collector_tracks_errors_and_warnings() {
        let mut collector = DiagnosticCollector::new();
        collector.handle(Diagnostic::warning(DiagnosticKind::UnreachableClause, "w".into()));
        assert!(!collector.has_errors());
        collector.handle(Diagnostic::error(DiagnosticKind::IllegalCycle, "e".into()));
        assert!(collector.has_errors());
        assert_eq!(collector.errors().count(), 1);
        assert_eq!(collector.warnings().count(), 1);
        assert_eq!(collector.of_kind(DiagnosticKind::IllegalCycle).count(), 1);
    }
}
