// diag.rs — Unified diagnostics model
//
// Provides the diagnostic types shared by the frontend (parse, lower) and
// the CLI. Core compilation errors are `GenError`s; lowering wraps them in
// a `Diagnostic` so they carry a source span.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `W0001`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Syntax
    pub const E0001: DiagCode = DiagCode("E0001"); // lex or parse error

    // Lookup
    pub const E0100: DiagCode = DiagCode("E0100"); // undeclared name
    pub const E0101: DiagCode = DiagCode("E0101"); // duplicate name
    pub const E0102: DiagCode = DiagCode("E0102"); // unknown function
    pub const E0103: DiagCode = DiagCode("E0103"); // wrong arity
    pub const E0104: DiagCode = DiagCode("E0104"); // uncoercible operand

    // Types
    pub const E0200: DiagCode = DiagCode("E0200"); // conditional branch mismatch

    // Structure
    pub const E0300: DiagCode = DiagCode("E0300"); // state without recurrence
    pub const E0301: DiagCode = DiagCode("E0301"); // not a state
    pub const E0302: DiagCode = DiagCode("E0302"); // not a parameter
    pub const E0303: DiagCode = DiagCode("E0303"); // recurrence redefined
    pub const E0304: DiagCode = DiagCode("E0304"); // missing or repeated `out`
    pub const E0305: DiagCode = DiagCode("E0305"); // empty rate set
    pub const E0306: DiagCode = DiagCode("E0306"); // commutative arity
    pub const E0307: DiagCode = DiagCode("E0307"); // duplicate unit name

    // Rates and emission
    pub const E0400: DiagCode = DiagCode("E0400"); // rate conflict
    pub const E0401: DiagCode = DiagCode("E0401"); // parameter type not passable at rate
    pub const E0402: DiagCode = DiagCode("E0402"); // state init reads a run() local
    pub const E0403: DiagCode = DiagCode("E0403"); // setter reads a run() local

    // Internal verification
    pub const E0600: DiagCode = DiagCode("E0600");

    // Warnings
    pub const W0001: DiagCode = DiagCode("W0001"); // unit has no variants
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message)
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message)
    }

    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Byte offset to 1-based (line, column).
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let prefix = &source[..offset.min(source.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.len() - prefix.rfind('\n').map_or(0, |i| i + 1) + 1;
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::error(dummy_span(), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_hint() {
        let d = Diagnostic::warning(dummy_span(), "unit 'Add' has no variants")
            .with_code(codes::W0001)
            .with_hint("give a parameter a block or audio rate");
        assert_eq!(
            format!("{d}"),
            "warning[W0001]: unit 'Add' has no variants\n  hint: give a parameter a block or audio rate"
        );
        assert!(!d.is_error());
    }

    #[test]
    fn related_spans_accumulate() {
        let d = Diagnostic::error(dummy_span(), "duplicate name")
            .with_code(codes::E0101)
            .with_related(dummy_span(), "first declared here");
        assert_eq!(d.code, Some(codes::E0101));
        assert_eq!(d.related_spans.len(), 1);
    }

    #[test]
    fn line_col_counts_from_one() {
        let src = "unit A filter {\n    out x\n}";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 20), (2, 5));
    }
}
