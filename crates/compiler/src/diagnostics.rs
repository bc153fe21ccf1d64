//! Structured compile diagnostics
//!
//! Every pipeline instance owns one [`Diagnostics`] sink; passes append to
//! it and never share sinks across compiles. Severity levels and the LSP
//! mapping follow the conventions used by editor tooling (1 = error,
//! 2 = warning, 3 = info).

use crate::source::SourceSpan;
use serde::Serialize;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Convert to LSP DiagnosticSeverity number
    pub fn to_lsp_severity(&self) -> u32 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Stable machine-readable code for a diagnostic.
///
/// The code set is closed; message text may be reworded between releases
/// but codes are stable and safe to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Lexical
    UnterminatedString,
    UnterminatedComment,
    InvalidEscape,
    MalformedNumber,
    // Syntactic
    UnexpectedToken,
    ExpectedToken,
    DuplicateParameter,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    ReturnOutsideFunction,
    // Semantic
    UnknownType,
    UnknownSymbol,
    DuplicateSymbol,
    TypeMismatch,
    WrongArgumentCount,
    NotCallable,
    NotIndexable,
    NotAssignable,
    VoidValueUsed,
    LiteralOutOfRange,
    EmptyArrayLiteral,
    MixedArrayLiteral,
    InvalidArraySize,
    CyclicAlias,
    DivisionByZero,
    // Data flow
    UnreachableCode,
    UsedBeforeAssigned,
    PossiblyUnassigned,
    UnusedVariable,
    UnusedParameter,
    RecursionDetected,
    // Cross-module
    UnknownModule,
    SymbolNotFound,
    SymbolNotExported,
    EmptyExportModule,
    // IL construction
    ZeroPageOverflow,
    // Internal consistency
    SsaViolation,
}

impl DiagnosticCode {
    /// SCREAMING_SNAKE_CASE rendering used in machine-readable output.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::UnterminatedString => "UNTERMINATED_STRING",
            DiagnosticCode::UnterminatedComment => "UNTERMINATED_COMMENT",
            DiagnosticCode::InvalidEscape => "INVALID_ESCAPE",
            DiagnosticCode::MalformedNumber => "MALFORMED_NUMBER",
            DiagnosticCode::UnexpectedToken => "UNEXPECTED_TOKEN",
            DiagnosticCode::ExpectedToken => "EXPECTED_TOKEN",
            DiagnosticCode::DuplicateParameter => "DUPLICATE_PARAMETER",
            DiagnosticCode::BreakOutsideLoop => "BREAK_OUTSIDE_LOOP",
            DiagnosticCode::ContinueOutsideLoop => "CONTINUE_OUTSIDE_LOOP",
            DiagnosticCode::ReturnOutsideFunction => "RETURN_OUTSIDE_FUNCTION",
            DiagnosticCode::UnknownType => "UNKNOWN_TYPE",
            DiagnosticCode::UnknownSymbol => "UNKNOWN_SYMBOL",
            DiagnosticCode::DuplicateSymbol => "DUPLICATE_SYMBOL",
            DiagnosticCode::TypeMismatch => "TYPE_MISMATCH",
            DiagnosticCode::WrongArgumentCount => "WRONG_ARGUMENT_COUNT",
            DiagnosticCode::NotCallable => "NOT_CALLABLE",
            DiagnosticCode::NotIndexable => "NOT_INDEXABLE",
            DiagnosticCode::NotAssignable => "NOT_ASSIGNABLE",
            DiagnosticCode::VoidValueUsed => "VOID_VALUE_USED",
            DiagnosticCode::LiteralOutOfRange => "LITERAL_OUT_OF_RANGE",
            DiagnosticCode::EmptyArrayLiteral => "EMPTY_ARRAY_LITERAL",
            DiagnosticCode::MixedArrayLiteral => "MIXED_ARRAY_LITERAL",
            DiagnosticCode::InvalidArraySize => "INVALID_ARRAY_SIZE",
            DiagnosticCode::CyclicAlias => "CYCLIC_ALIAS",
            DiagnosticCode::DivisionByZero => "DIVISION_BY_ZERO",
            DiagnosticCode::UnreachableCode => "UNREACHABLE_CODE",
            DiagnosticCode::UsedBeforeAssigned => "DA_USED_BEFORE_ASSIGNED",
            DiagnosticCode::PossiblyUnassigned => "DA_POSSIBLY_UNASSIGNED",
            DiagnosticCode::UnusedVariable => "UNUSED_VARIABLE",
            DiagnosticCode::UnusedParameter => "UNUSED_PARAMETER",
            DiagnosticCode::RecursionDetected => "RECURSION_DETECTED",
            DiagnosticCode::UnknownModule => "UNKNOWN_MODULE",
            DiagnosticCode::SymbolNotFound => "SYMBOL_NOT_FOUND",
            DiagnosticCode::SymbolNotExported => "SYMBOL_NOT_EXPORTED",
            DiagnosticCode::EmptyExportModule => "EMPTY_EXPORT_MODULE",
            DiagnosticCode::ZeroPageOverflow => "ZERO_PAGE_OVERFLOW",
            DiagnosticCode::SsaViolation => "SSA_VIOLATION",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secondary span attached to a diagnostic, with an explanatory note.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedInfo {
    pub span: SourceSpan,
    pub note: String,
}

/// A single compile diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: SourceSpan,
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: SourceSpan,
    ) -> Self {
        Diagnostic {
            severity,
            code,
            message: message.into(),
            span,
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, span: SourceSpan, note: impl Into<String>) -> Self {
        self.related.push(RelatedInfo {
            span,
            note: note.into(),
        });
        self
    }

    /// Convert to an LSP `Diagnostic` JSON value. Positions become
    /// 0-indexed as the protocol requires; unknown spans collapse to 0:0.
    pub fn to_lsp_value(&self) -> serde_json::Value {
        let position = |pos: &crate::source::SourcePos| {
            serde_json::json!({
                "line": pos.line.saturating_sub(1),
                "character": pos.column.saturating_sub(1),
            })
        };
        serde_json::json!({
            "range": {
                "start": position(&self.span.start),
                "end": position(&self.span.end),
            },
            "severity": self.severity.to_lsp_severity(),
            "code": self.code.as_str(),
            "source": "vicc",
            "message": self.message,
        })
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] at {}: {}",
            self.severity, self.code, self.span, self.message
        )?;
        for rel in &self.related {
            write!(f, "\n  note at {}: {}", rel.span, rel.note)?;
        }
        Ok(())
    }
}

/// Append-only diagnostic sink for one pipeline instance.
///
/// Enforces the `max_errors` soft cap: errors past the cap are counted but
/// not stored, so a pathological input cannot balloon memory.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    error_count: usize,
    dropped_errors: usize,
    max_errors: Option<usize>,
    /// Nominal file name, prefixed when rendering.
    source_name: Option<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn with_max_errors(max_errors: usize) -> Self {
        Diagnostics {
            max_errors: Some(max_errors),
            ..Diagnostics::default()
        }
    }

    pub fn set_source_name(&mut self, name: impl Into<String>) {
        self.source_name = Some(name.into());
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Render one diagnostic with the source name prefix.
    pub fn render(&self, diag: &Diagnostic) -> String {
        match &self.source_name {
            Some(name) => format!("{name}:{diag}"),
            None => diag.to_string(),
        }
    }

    pub fn push(&mut self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.error_count += 1;
            if let Some(cap) = self.max_errors {
                if self.error_count > cap {
                    self.dropped_errors += 1;
                    return;
                }
            }
        }
        self.items.push(diag);
    }

    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: SourceSpan) {
        self.push(Diagnostic::new(Severity::Error, code, message, span));
    }

    pub fn warning(&mut self, code: DiagnosticCode, message: impl Into<String>, span: SourceSpan) {
        self.push(Diagnostic::new(Severity::Warning, code, message, span));
    }

    pub fn info(&mut self, code: DiagnosticCode, message: impl Into<String>, span: SourceSpan) {
        self.push(Diagnostic::new(Severity::Info, code, message, span));
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total errors seen, including any dropped past the `max_errors` cap.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// True if the error cap has been reached and passes should wind down.
    pub fn at_error_limit(&self) -> bool {
        self.max_errors
            .map(|cap| self.error_count >= cap)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Move all collected diagnostics out of the sink.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourcePos, SourceSpan};

    fn span() -> SourceSpan {
        SourceSpan::new(SourcePos::new(1, 1, 0), SourcePos::new(1, 5, 4))
    }

    #[test]
    fn test_severity_lsp_mapping() {
        assert_eq!(Severity::Error.to_lsp_severity(), 1);
        assert_eq!(Severity::Warning.to_lsp_severity(), 2);
        assert_eq!(Severity::Info.to_lsp_severity(), 3);
    }

    #[test]
    fn test_code_rendering() {
        assert_eq!(DiagnosticCode::UnknownType.as_str(), "UNKNOWN_TYPE");
        assert_eq!(
            DiagnosticCode::UsedBeforeAssigned.as_str(),
            "DA_USED_BEFORE_ASSIGNED"
        );
    }

    #[test]
    fn test_display_format() {
        let diag = Diagnostic::new(
            Severity::Error,
            DiagnosticCode::UnknownType,
            "Unknown type 'sprite'",
            span(),
        );
        assert_eq!(
            diag.to_string(),
            "error[UNKNOWN_TYPE] at 1:1: Unknown type 'sprite'"
        );
    }

    #[test]
    fn test_sink_counts_by_severity() {
        let mut diags = Diagnostics::new();
        diags.error(DiagnosticCode::TypeMismatch, "mismatch", span());
        diags.warning(DiagnosticCode::UnusedVariable, "unused", span());
        diags.warning(DiagnosticCode::UnreachableCode, "unreachable", span());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 2);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_max_errors_soft_cap() {
        let mut diags = Diagnostics::with_max_errors(2);
        for _ in 0..5 {
            diags.error(DiagnosticCode::TypeMismatch, "mismatch", span());
        }
        // Count keeps going, storage stops at the cap
        assert_eq!(diags.error_count(), 5);
        assert_eq!(diags.len(), 2);
        assert!(diags.at_error_limit());
    }

    #[test]
    fn test_warnings_not_capped() {
        let mut diags = Diagnostics::with_max_errors(1);
        diags.error(DiagnosticCode::TypeMismatch, "mismatch", span());
        diags.warning(DiagnosticCode::UnusedVariable, "unused", span());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_lsp_conversion() {
        let diag = Diagnostic::new(
            Severity::Warning,
            DiagnosticCode::UnreachableCode,
            "Unreachable code",
            span(),
        );
        let value = diag.to_lsp_value();
        assert_eq!(value["severity"], 2);
        assert_eq!(value["code"], "UNREACHABLE_CODE");
        // LSP positions are 0-indexed
        assert_eq!(value["range"]["start"]["line"], 0);
        assert_eq!(value["range"]["start"]["character"], 0);
    }

    #[test]
    fn test_related_spans() {
        let diag = Diagnostic::new(
            Severity::Error,
            DiagnosticCode::DuplicateSymbol,
            "Duplicate declaration of 'x'",
            span(),
        )
        .with_related(span(), "previous declaration here");
        assert_eq!(diag.related.len(), 1);
        assert!(diag.to_string().contains("previous declaration here"));
    }
}
