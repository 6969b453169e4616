//! Gradus Type System
//!
//! Type representation, structural subtyping, type-level evaluation and
//! generic inference for Gradus.
//!
//! This crate provides:
//! - An interned type graph with canonical unions and intersections
//! - Coinductive structural subtyping over recursive aliases
//! - Evaluation of conditional, mapped, indexed, keyof and template types
//! - Generic argument inference with row polymorphism
//! - Promise normalization
//!
//! # Usage
//!
//! ```
//! use gradus_types::{PropertySignature, SubtypingContext, TypeContext, TypeId};
//!
//! let mut ctx = TypeContext::new();
//! let point = ctx.object_type(
//!     vec![
//!         PropertySignature::new("x", TypeId::NUMBER),
//!         PropertySignature::new("y", TypeId::NUMBER),
//!     ],
//!     None,
//! );
//! let has_x = ctx.object_type(vec![PropertySignature::new("x", TypeId::NUMBER)], None);
//!
//! assert!(SubtypingContext::new(&mut ctx).is_subtype(point, has_x));
//! ```

pub mod apparent;
pub mod context;
pub mod error;
pub mod evaluate;
pub mod infer;
pub mod promise;
pub mod substitute;
pub mod subtyping;
pub mod ty;

pub use apparent::apparent_member;
pub use context::{AliasDef, FieldVariance, TypeContext, TypeLimits};
pub use error::TypeError;
pub use evaluate::{builtin_arity, evaluate, Evaluator};
pub use infer::{infer_call, ConstraintFailure, InferenceContext, RowCapture, Solution};
pub use promise::{awaited, declared_async_result, unwrap_once, wrap_async_return};
pub use substitute::{substitute, Substitution};
pub use subtyping::{check_subtype, SubtypingContext};
pub use ty::*;
