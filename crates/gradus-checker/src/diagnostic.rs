//! Diagnostic infrastructure for error reporting
//!
//! Check errors become serializable [`Diagnostic`]s with stable codes.
//! They can be written as JSON for editor integration or rendered with
//! source context through `codespan-reporting`.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use serde::{Deserialize, Serialize};
use termcolor::WriteColor;

use crate::ast::Span;
use crate::error::CheckError;

/// Category of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    TypeMismatch,
    NonExhaustiveMatch,
    UnresolvedGenericConstraint,
    UnknownProperty,
    RecursiveExpansionDepth,
    UndefinedName,
    UndefinedType,
    NotCallable,
    ArgumentCount,
    InvalidTypeArguments,
    CircularReference,
}

impl DiagnosticKind {
    /// Stable error code
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::TypeMismatch => "E2001",
            DiagnosticKind::UndefinedName => "E2002",
            DiagnosticKind::UndefinedType => "E2003",
            DiagnosticKind::NotCallable => "E2004",
            DiagnosticKind::ArgumentCount => "E2005",
            DiagnosticKind::UnknownProperty => "E2006",
            DiagnosticKind::NonExhaustiveMatch => "E2007",
            DiagnosticKind::UnresolvedGenericConstraint => "E2008",
            DiagnosticKind::InvalidTypeArguments => "E2009",
            DiagnosticKind::CircularReference => "E2010",
            DiagnosticKind::RecursiveExpansionDepth => "E2011",
        }
    }
}

/// A reported problem with its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Error code (e.g., "E2001")
    pub code: String,
    pub message: String,
    pub span: Span,
    /// Text attached to the primary label
    pub label: String,
    /// Additional notes and help
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, message: String, span: Span, label: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            code: kind.code().to_string(),
            message,
            span,
            label: label.into(),
            notes: Vec::new(),
        }
    }

    /// Add a note (additional context)
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add a help suggestion
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.notes.push(format!("help: {}", help.into()));
        self
    }

    /// Create diagnostic from a CheckError
    pub fn from_check_error(error: &CheckError) -> Self {
        use CheckError::*;

        let message = error.to_string();
        match error {
            TypeMismatch {
                expected,
                actual,
                span,
                note,
            } => {
                let mut diag = Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    message,
                    *span,
                    format!("expected '{}', found '{}'", expected, actual),
                );
                if let Some(note) = note {
                    diag = diag.with_note(note.clone());
                }
                if actual.contains('|') && !expected.contains('|') {
                    diag = diag.with_help("narrow the union with a type guard before using it here");
                }
                diag
            }

            NonExhaustiveMatch { missing, span } => {
                let mut diag = Diagnostic::new(
                    DiagnosticKind::NonExhaustiveMatch,
                    message,
                    *span,
                    "missing cases",
                );
                if !missing.is_empty() {
                    diag = diag
                        .with_note(format!("Unhandled: {}", missing.join(", ")))
                        .with_help("add a case for every member or a default branch");
                }
                diag
            }

            UnresolvedGenericConstraint {
                param, constraint, span, ..
            } => Diagnostic::new(
                DiagnosticKind::UnresolvedGenericConstraint,
                message,
                *span,
                format!("'{}' must satisfy '{}'", param, constraint),
            ),

            UnknownProperty { ty, span, .. } => {
                let diag = Diagnostic::new(
                    DiagnosticKind::UnknownProperty,
                    message,
                    *span,
                    "property not found",
                );
                if ty == "unknown" {
                    diag.with_help("narrow the value with typeof or instanceof first")
                } else {
                    diag
                }
            }

            RecursiveExpansionDepth { limit, span, .. } => Diagnostic::new(
                DiagnosticKind::RecursiveExpansionDepth,
                message,
                *span,
                "checking of this unit stopped here",
            )
            .with_note(format!("recursion limit is {}", limit)),

            UndefinedName { span, .. } => Diagnostic::new(
                DiagnosticKind::UndefinedName,
                message,
                *span,
                "not found in this scope",
            ),

            UndefinedType { span, .. } => Diagnostic::new(
                DiagnosticKind::UndefinedType,
                message,
                *span,
                "type not found",
            ),

            NotCallable { span, .. } => Diagnostic::new(
                DiagnosticKind::NotCallable,
                message,
                *span,
                "cannot be called",
            ),

            ArgumentCount { span, .. } => Diagnostic::new(
                DiagnosticKind::ArgumentCount,
                message,
                *span,
                "incorrect number of arguments",
            ),

            InvalidTypeArguments { span, .. } => Diagnostic::new(
                DiagnosticKind::InvalidTypeArguments,
                message,
                *span,
                "wrong number of type arguments",
            ),

            CircularReference { span, .. } => Diagnostic::new(
                DiagnosticKind::CircularReference,
                message,
                *span,
                "alias refers to itself",
            ),
        }
    }

    /// Codespan form for terminal rendering
    pub fn to_codespan(&self, file_id: usize) -> CsDiagnostic<usize> {
        CsDiagnostic::error()
            .with_message(&self.message)
            .with_code(&self.code)
            .with_labels(vec![
                Label::primary(file_id, self.span.start..self.span.end).with_message(&self.label)
            ])
            .with_notes(self.notes.clone())
    }
}

/// Serialize diagnostics for IDE integration
pub fn to_json(diagnostics: &[Diagnostic]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(diagnostics)
}

/// Helper to create a SimpleFiles instance from source code
pub fn create_files(path: impl Into<String>, source: impl Into<String>) -> (SimpleFiles<String, String>, usize) {
    let mut files = SimpleFiles::new();
    let id = files.add(path.into(), source.into());
    (files, id)
}

/// Render diagnostics with source context
pub fn render_diagnostics(
    writer: &mut dyn WriteColor,
    path: &str,
    source: &str,
    diagnostics: &[Diagnostic],
) -> Result<(), codespan_reporting::files::Error> {
    let (files, file_id) = create_files(path, source);
    let config = term::Config::default();
    for diag in diagnostics {
        term::emit(writer, &config, &files, &diag.to_codespan(file_id))?;
    }
    Ok(())
}
