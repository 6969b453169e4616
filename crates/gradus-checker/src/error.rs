//! Error types for type checking
//!
//! Every error carries the span it is reported at. Types are rendered to
//! strings when the error is created so errors outlive their type graph.

use crate::ast::Span;
use gradus_types::TypeError;
use thiserror::Error;

/// Errors that can occur during type checking
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CheckError {
    /// Assignability failed at an assignment, argument or return position
    #[error("Type '{actual}' is not assignable to type '{expected}'")]
    TypeMismatch {
        /// Expected type (human-readable)
        expected: String,
        /// Actual type (human-readable)
        actual: String,
        /// Location of the offending value
        span: Span,
        /// Optional note with additional context
        note: Option<String>,
    },

    /// Residual of a discriminating switch or `never` check is not empty
    #[error("Non-exhaustive match: missing cases {}", missing.join(", "))]
    NonExhaustiveMatch {
        /// Unhandled members
        missing: Vec<String>,
        /// Location of the switch or the `never` assignment
        span: Span,
    },

    /// An inferred or explicit type argument violates its bound
    #[error("Type '{inferred}' does not satisfy the constraint '{constraint}' of type parameter '{param}'")]
    UnresolvedGenericConstraint {
        /// Type parameter name
        param: String,
        /// Solved type
        inferred: String,
        /// Declared bound after substitution
        constraint: String,
        /// Location of the call or type reference
        span: Span,
    },

    /// Member access on `unknown` or on a type without that member
    #[error("Property '{property}' does not exist on type '{ty}'")]
    UnknownProperty {
        /// Property name
        property: String,
        /// Receiver type
        ty: String,
        /// Location of the access
        span: Span,
    },

    /// The recursion guard tripped; the unit is abandoned
    #[error("Type instantiation is excessively deep and possibly infinite: {chain}")]
    RecursiveExpansionDepth {
        /// Alias chain being expanded, outermost first
        chain: String,
        /// Configured limit
        limit: u32,
        /// Statement being checked when the guard tripped
        span: Span,
    },

    /// Value name not in scope
    #[error("Cannot find name '{name}'")]
    UndefinedName {
        /// Name
        name: String,
        /// Location of the reference
        span: Span,
    },

    /// Type name not in scope
    #[error("Cannot find type '{name}'")]
    UndefinedType {
        /// Name
        name: String,
        /// Location of the annotation
        span: Span,
    },

    /// Call or `new` on something without a matching signature
    #[error("Type '{ty}' is not callable")]
    NotCallable {
        /// Callee type
        ty: String,
        /// Location of the call
        span: Span,
    },

    /// Wrong number of arguments
    #[error("Expected {expected} arguments, but got {actual}")]
    ArgumentCount {
        /// Number of declared parameters (or "N or more")
        expected: String,
        /// Number of supplied arguments
        actual: usize,
        /// Location of the call
        span: Span,
    },

    /// Wrong number of explicit type arguments
    #[error("Type '{name}' expects {expected} type argument(s), got {actual}")]
    InvalidTypeArguments {
        /// Generic name
        name: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
        /// Location of the reference
        span: Span,
    },

    /// Alias body is a bare reference to itself
    #[error("Type alias '{name}' circularly references itself")]
    CircularReference {
        /// Alias name
        name: String,
        /// Location of the alias
        span: Span,
    },
}

impl CheckError {
    /// Location the error is reported at
    pub fn span(&self) -> Span {
        match self {
            CheckError::TypeMismatch { span, .. }
            | CheckError::NonExhaustiveMatch { span, .. }
            | CheckError::UnresolvedGenericConstraint { span, .. }
            | CheckError::UnknownProperty { span, .. }
            | CheckError::RecursiveExpansionDepth { span, .. }
            | CheckError::UndefinedName { span, .. }
            | CheckError::UndefinedType { span, .. }
            | CheckError::NotCallable { span, .. }
            | CheckError::ArgumentCount { span, .. }
            | CheckError::InvalidTypeArguments { span, .. }
            | CheckError::CircularReference { span, .. } => *span,
        }
    }

    /// Attach a location to a type-level error
    pub fn from_type_error(error: TypeError, span: Span) -> Self {
        match error {
            TypeError::DepthExceeded { chain, limit } => {
                CheckError::RecursiveExpansionDepth { chain, limit, span }
            }
            TypeError::UndefinedType { name } => CheckError::UndefinedType { name, span },
            TypeError::InvalidTypeArgCount {
                name,
                expected,
                actual,
            } => CheckError::InvalidTypeArguments {
                name,
                expected,
                actual,
                span,
            },
            TypeError::ConstraintViolation {
                param,
                actual,
                constraint,
            } => CheckError::UnresolvedGenericConstraint {
                param,
                inferred: actual,
                constraint,
                span,
            },
            TypeError::CircularReference { name } => CheckError::CircularReference { name, span },
        }
    }
}
