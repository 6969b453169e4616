//! Type system errors

use thiserror::Error;

/// Errors raised by type operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    /// Recursion guard tripped while expanding or comparing types
    #[error("Type instantiation is excessively deep and possibly infinite: {chain}")]
    DepthExceeded {
        /// Alias names being expanded when the guard tripped, outermost first
        chain: String,
        /// Configured limit
        limit: u32,
    },

    /// Undefined type reference
    #[error("Undefined type: {name}")]
    UndefinedType {
        /// Type name that was not found
        name: String,
    },

    /// Alias applied to the wrong number of arguments
    #[error("Type '{name}' expects {expected} type argument(s), got {actual}")]
    InvalidTypeArgCount {
        /// Alias name
        name: String,
        /// Expected count
        expected: usize,
        /// Actual count
        actual: usize,
    },

    /// Explicit type argument outside its parameter's bound
    #[error("Type '{actual}' does not satisfy the constraint '{constraint}' of '{param}'")]
    ConstraintViolation {
        /// Generic parameter name
        param: String,
        /// Rendered argument
        actual: String,
        /// Rendered bound
        constraint: String,
    },

    /// Alias body refers back to itself without any structure in between
    #[error("Type alias '{name}' circularly references itself")]
    CircularReference {
        /// Alias name
        name: String,
    },
}
