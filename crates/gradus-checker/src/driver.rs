//! Parallel checking of independent units
//!
//! Declarations every unit may use are registered once into a shared type
//! graph, which is frozen behind an [`Arc`]. Each unit is then checked on
//! its own fork of that graph by a pool of scoped worker threads, so a
//! unit that trips the recursion guard never affects the others.

use crate::ast::Unit;
use crate::checker::{CheckResult, TypeChecker};
use crate::diagnostic::{render_diagnostics, Diagnostic};
use crate::error::CheckError;
use crate::options::CheckerOptions;
use gradus_types::{TypeContext, TypeId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use termcolor::WriteColor;

/// Declarations shared read-only by every checked unit
#[derive(Debug, Clone)]
pub struct SharedDeclarations {
    ctx: TypeContext,
    values: FxHashMap<String, TypeId>,
    errors: Vec<CheckError>,
}

impl SharedDeclarations {
    /// No shared declarations
    pub fn new(options: &CheckerOptions) -> Self {
        Self {
            ctx: TypeContext::with_limits(options.limits()),
            values: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    /// Register the declarations of `units`, in order, into one graph
    pub fn from_units(units: &[Unit], options: &CheckerOptions) -> Self {
        let mut shared = Self::new(options);
        for unit in units {
            let result = TypeChecker::new(&mut shared.ctx, options.clone())
                .with_globals(shared.values.clone())
                .check_unit(unit);
            shared.values.extend(result.declarations);
            shared.errors.extend(result.errors);
        }
        tracing::debug!(
            units = units.len(),
            types = shared.ctx.len(),
            values = shared.values.len(),
            "registered shared declarations"
        );
        shared
    }

    pub fn context(&self) -> &TypeContext {
        &self.ctx
    }

    pub fn values(&self) -> &FxHashMap<String, TypeId> {
        &self.values
    }

    /// Errors found while registering the declarations
    pub fn errors(&self) -> &[CheckError] {
        &self.errors
    }

    /// Freeze for sharing across workers
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Outcome of checking one unit
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub path: String,
    pub result: CheckResult,
    /// The unit's fork of the shared graph; every [`TypeId`] in `result`
    /// points into it
    pub ctx: TypeContext,
}

impl UnitResult {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.result.diagnostics
    }

    pub fn display(&self, id: TypeId) -> String {
        self.ctx.display(id)
    }

    /// Render the diagnostics of this unit against its source
    pub fn render(
        &self,
        writer: &mut dyn WriteColor,
        source: &str,
    ) -> Result<(), codespan_reporting::files::Error> {
        render_diagnostics(writer, &self.path, source, &self.result.diagnostics)
    }
}

/// Check one unit against a fork of the shared declarations
pub fn check_unit(shared: &SharedDeclarations, unit: &Unit, options: &CheckerOptions) -> UnitResult {
    let mut ctx = shared.ctx.fork();
    let result = TypeChecker::new(&mut ctx, options.clone())
        .with_globals(shared.values.clone())
        .check_unit(unit);
    UnitResult {
        path: unit.path.clone(),
        result,
        ctx,
    }
}

/// Check `units` on `options.jobs` worker threads. Results come back in
/// input order.
#[tracing::instrument(level = "debug", skip_all, fields(units = units.len(), jobs = options.jobs))]
pub fn check_units(
    shared: &Arc<SharedDeclarations>,
    units: &[Unit],
    options: &CheckerOptions,
) -> Vec<UnitResult> {
    if units.is_empty() {
        return Vec::new();
    }
    let jobs = options.jobs.clamp(1, units.len());
    let (tx, rx) = crossbeam::channel::unbounded();
    for job in units.iter().enumerate() {
        // The receiver is alive until the scope below ends
        let _ = tx.send(job);
    }
    drop(tx);

    let results: Mutex<Vec<Option<UnitResult>>> = Mutex::new((0..units.len()).map(|_| None).collect());
    let shared: &SharedDeclarations = shared;
    let outcome = crossbeam::scope(|scope| {
        for worker in 0..jobs {
            let rx = rx.clone();
            let results = &results;
            scope.spawn(move |_| {
                for (index, unit) in rx.iter() {
                    let checked = check_unit(shared, unit, options);
                    tracing::debug!(
                        worker,
                        path = %checked.path,
                        errors = checked.result.errors.len(),
                        "checked unit"
                    );
                    results.lock()[index] = Some(checked);
                }
            });
        }
    });
    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }

    results.into_inner().into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ExprId, ExprKind, Span, Stmt, StmtKind, TypeExpr, VarKind};

    fn unit(path: &str, statements: Vec<Stmt>) -> Unit {
        Unit {
            path: path.into(),
            source: String::new(),
            statements,
        }
    }

    fn alias(name: &str, body: TypeExpr) -> Stmt {
        Stmt::new(
            StmtKind::TypeAlias {
                name: name.into(),
                type_params: vec![],
                body,
            },
            Span::default(),
        )
    }

    fn let_number(name: &str, ty: TypeExpr) -> Stmt {
        Stmt::new(
            StmtKind::Var {
                var_kind: VarKind::Let,
                name: name.into(),
                ty: Some(ty),
                init: Some(Expr::new(ExprId(1), ExprKind::Number { value: 1.0 }, Span::default())),
            },
            Span::default(),
        )
    }

    #[test]
    fn test_results_in_input_order() {
        let options = CheckerOptions {
            jobs: 3,
            ..CheckerOptions::default()
        };
        let shared = SharedDeclarations::from_units(
            &[unit("decls.gd", vec![alias("Id", TypeExpr::named("number"))])],
            &options,
        )
        .freeze();
        let units: Vec<Unit> = (0..8)
            .map(|i| {
                let ty = if i % 2 == 0 { "Id" } else { "string" };
                unit(&format!("u{}.gd", i), vec![let_number("x", TypeExpr::named(ty))])
            })
            .collect();

        let results = check_units(&shared, &units, &options);
        assert_eq!(results.len(), 8);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.path, format!("u{}.gd", i));
            assert_eq!(r.result.has_errors(), i % 2 == 1);
        }
    }

    #[test]
    fn test_empty_input() {
        let options = CheckerOptions::default();
        let shared = SharedDeclarations::new(&options).freeze();
        assert!(check_units(&shared, &[], &options).is_empty());
    }
}
