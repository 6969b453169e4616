//! Checker configuration
//!
//! Options can be built in code or loaded from a TOML table:
//!
//! ```toml
//! max_depth = 64
//! field_variance = "covariant"
//! require_exhaustive_switch = true
//! jobs = 4
//! ```

use gradus_types::{FieldVariance, TypeLimits};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Failed to read the options file
    #[error("Failed to read options file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid option: {0}")]
    Invalid(String),
}

/// Settings for one checking session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerOptions {
    /// Recursion guard for alias expansion and structural comparison
    pub max_depth: u32,
    /// Whether mutable object fields compare invariantly
    pub field_variance: FieldVariance,
    /// A `switch` with no `default` over a finite union must cover every member
    pub require_exhaustive_switch: bool,
    /// Worker threads for [`crate::driver::check_units`]
    pub jobs: usize,
    /// Template literal cross products above this widen to `string`
    pub template_literal_limit: usize,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        let limits = TypeLimits::default();
        Self {
            max_depth: limits.max_depth,
            field_variance: limits.field_variance,
            require_exhaustive_switch: true,
            jobs: num_cpus::get(),
            template_literal_limit: limits.template_literal_limit,
        }
    }
}

impl CheckerOptions {
    /// Parse options from TOML text; missing keys keep their defaults
    pub fn from_toml(text: &str) -> Result<Self, OptionsError> {
        let options: CheckerOptions = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), OptionsError> {
        if self.max_depth == 0 {
            return Err(OptionsError::Invalid("max_depth must be at least 1".into()));
        }
        if self.jobs == 0 {
            return Err(OptionsError::Invalid("jobs must be at least 1".into()));
        }
        Ok(())
    }

    /// Type-level subset handed to each unit's type graph
    pub fn limits(&self) -> TypeLimits {
        TypeLimits {
            max_depth: self.max_depth,
            template_literal_limit: self.template_literal_limit,
            field_variance: self.field_variance,
        }
    }
}
