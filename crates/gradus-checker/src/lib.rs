//! Gradus Type Checker
//!
//! Type checking and control flow analysis for Gradus.
//!
//! This crate provides:
//! - Lowering of type annotations into the type graph
//! - Type checking for expressions and statements
//! - Control flow-based type narrowing
//! - Exhaustiveness checking for discriminated unions
//! - Diagnostics for terminals and IDEs
//! - Parallel checking of independent units

pub mod ast;
pub mod checker;
pub mod diagnostic;
pub mod driver;
pub mod error;
pub mod exhaustiveness;
pub mod flow;
pub mod lower;
pub mod narrowing;
pub mod options;
pub mod type_guards;

// Re-export main types
pub use checker::{CheckResult, TypeChecker};
pub use diagnostic::{create_files, render_diagnostics, to_json, Diagnostic, DiagnosticKind};
pub use driver::{check_unit, check_units, SharedDeclarations, UnitResult};
pub use error::CheckError;
pub use exhaustiveness::ExhaustivenessResult;
pub use flow::{FlowGraph, FlowNode, FlowNodeId, FlowNodeKind};
pub use narrowing::TypeEnv;
pub use options::{CheckerOptions, OptionsError};
pub use type_guards::TypeGuard;
