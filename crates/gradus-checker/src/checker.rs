//! Type checker - validates types for expressions and statements
//!
//! Walks one compilation unit. The declarations of every block are
//! registered before its statements run, then statements are checked in
//! order while a [`TypeEnv`] follows the control flow and is refined by
//! the guards it passes through.

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::error::CheckError;
use crate::exhaustiveness::{
    check_switch_exhaustiveness, clause_guard, describe_members, group_cases, switch_subject,
    ExhaustivenessResult,
};
use crate::flow::{FlowGraph, FlowNodeId, FlowNodeKind};
use crate::lower::{Lowerer, TypeScope};
use crate::narrowing::{
    apply_guard, narrow_by_assignment, narrow_type, union_members_named, TypeEnv,
};
use crate::options::CheckerOptions;
use crate::type_guards::{
    extract_assertion, extract_type_guard, GuardContext, NullKind, TypeGuard,
};
use gradus_types::{
    apparent_member, awaited, declared_async_result, evaluate, infer_call, substitute,
    unwrap_once, wrap_async_return, FunctionKind, FunctionType, InferenceContext, LiteralValue,
    ParamSignature, PrimitiveType, PropertySignature, SubtypingContext, Substitution,
    TupleElement, Type, TypeContext, TypeId, TypeParam, TypePredicate,
};
use rustc_hash::FxHashMap;

/// Member lookups through type parameter bounds stop at this depth
const MAX_PROPERTY_DEPTH: u32 = 16;

/// Everything the checker learned about one unit
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Type of every checked expression
    pub expr_types: FxHashMap<ExprId, TypeId>,
    pub errors: Vec<CheckError>,
    pub diagnostics: Vec<Diagnostic>,
    pub flow: FlowGraph,
    /// Value declarations at the top level of the unit
    pub declarations: FxHashMap<String, TypeId>,
}

impl CheckResult {
    pub fn type_of(&self, id: ExprId) -> Option<TypeId> {
        self.expr_types.get(&id).copied()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    declared: TypeId,
    mutable: bool,
}

/// One lexical value scope. `shadowed` remembers the refined types of
/// outer variables hidden by this scope.
#[derive(Debug, Default)]
struct Scope {
    bindings: FxHashMap<String, Binding>,
    shadowed: Vec<(String, Option<TypeId>)>,
}

struct FunctionContext {
    /// Declared return type, unwrapped for async functions
    expected_return: Option<TypeId>,
    /// Return type offered by the call site, for literal preservation only
    contextual_return: Option<TypeId>,
    is_async: bool,
    returns: Vec<TypeId>,
}

#[derive(Clone, Copy)]
enum Body<'b> {
    Block(&'b [Stmt]),
    Expr(&'b Expr),
}

/// Type checker for a single unit
pub struct TypeChecker<'a> {
    ctx: &'a mut TypeContext,
    options: CheckerOptions,
    /// Values declared outside the unit
    globals: FxHashMap<String, TypeId>,
    scopes: Vec<Scope>,
    type_scopes: Vec<TypeScope>,
    env: TypeEnv,
    flow: FlowGraph,
    current: FlowNodeId,
    expr_types: FxHashMap<ExprId, TypeId>,
    /// Instantiated predicates of generic calls, keyed by callee
    call_predicates: FxHashMap<ExprId, TypePredicate>,
    errors: Vec<CheckError>,
    functions: Vec<FunctionContext>,
    /// Environments at `break`, one frame per enclosing loop or switch
    break_envs: Vec<Vec<TypeEnv>>,
    this_type: Option<TypeId>,
    aborted: bool,
}

impl<'a> TypeChecker<'a> {
    pub fn new(ctx: &'a mut TypeContext, options: CheckerOptions) -> Self {
        let globals = builtin_values(ctx);
        Self {
            ctx,
            options,
            globals,
            scopes: vec![Scope::default()],
            type_scopes: Vec::new(),
            env: TypeEnv::new(),
            flow: FlowGraph::new(),
            current: FlowNodeId(0),
            expr_types: FxHashMap::default(),
            call_predicates: FxHashMap::default(),
            errors: Vec::new(),
            functions: Vec::new(),
            break_envs: Vec::new(),
            this_type: None,
            aborted: false,
        }
    }

    /// Make values declared by other units visible
    pub fn with_globals(mut self, values: impl IntoIterator<Item = (String, TypeId)>) -> Self {
        self.globals.extend(values);
        self
    }

    /// Check a unit and collect the results
    #[tracing::instrument(level = "debug", skip_all, fields(path = %unit.path))]
    pub fn check_unit(mut self, unit: &Unit) -> CheckResult {
        self.current = self
            .flow
            .add_node(FlowNodeKind::Entry, Vec::new(), self.env.clone(), Span::default());
        self.check_statements(&unit.statements);

        let declarations = self
            .scopes
            .first()
            .map(|scope| {
                scope
                    .bindings
                    .iter()
                    .map(|(name, b)| (name.clone(), b.declared))
                    .collect()
            })
            .unwrap_or_default();
        let diagnostics = self.errors.iter().map(Diagnostic::from_check_error).collect();
        tracing::debug!(
            errors = self.errors.len(),
            nodes = self.flow.len(),
            aborted = self.aborted,
            "checked unit"
        );
        CheckResult {
            expr_types: self.expr_types,
            errors: self.errors,
            diagnostics,
            flow: self.flow,
            declarations,
        }
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            for (name, previous) in scope.shadowed.into_iter().rev() {
                match previous {
                    Some(ty) => self.env.set(name, ty),
                    None => self.env.remove(&name),
                }
            }
        }
    }

    fn bind(&mut self, name: String, ty: TypeId, mutable: bool) {
        let previous = self.env.get(&name);
        if let Some(scope) = self.scopes.last_mut() {
            if !scope.bindings.contains_key(&name) {
                scope.shadowed.push((name.clone(), previous));
            }
            scope.bindings.insert(
                name.clone(),
                Binding {
                    declared: ty,
                    mutable,
                },
            );
        }
        self.env.set(name, ty);
    }

    /// Replace the declared type of an existing binding
    fn rebind(&mut self, name: &str, ty: TypeId) {
        if let Some(binding) = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.bindings.get_mut(name))
        {
            binding.declared = ty;
            self.env.set(name, ty);
        }
    }

    fn lookup_binding(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name).copied())
    }

    /// Refined type of a value at the current program point
    fn value_type(&self, name: &str) -> Option<TypeId> {
        match self.lookup_binding(name) {
            Some(binding) => Some(self.env.get(name).unwrap_or(binding.declared)),
            None => self.globals.get(name).copied(),
        }
    }

    /// Captured mutable variables may change before a nested function runs
    fn reset_mutable_narrowing(&mut self) {
        for scope in &self.scopes {
            for (name, binding) in &scope.bindings {
                if binding.mutable {
                    self.env.set(name.clone(), binding.declared);
                }
            }
        }
    }

    fn record(&mut self, kind: FlowNodeKind, preds: Vec<FlowNodeId>, span: Span) -> FlowNodeId {
        self.current = self.flow.add_node(kind, preds, self.env.clone(), span);
        self.current
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    fn lower(&mut self, ty: &TypeExpr, span: Span) -> TypeId {
        let scopes = &self.scopes;
        let globals = &self.globals;
        let lookup = |name: &str| declared_value(scopes, globals, name);
        Lowerer::new(&mut *self.ctx, &self.type_scopes, &lookup, &mut self.errors, span)
            .lower(ty)
    }

    fn declare(&mut self, stmts: &[Stmt], span: Span) {
        let values = {
            let scopes = &self.scopes;
            let globals = &self.globals;
            let lookup = |name: &str| declared_value(scopes, globals, name);
            Lowerer::new(&mut *self.ctx, &self.type_scopes, &lookup, &mut self.errors, span)
                .declare_block(stmts)
        };
        for (name, ty) in values {
            self.bind(name, ty, false);
        }
    }

    /// Declare generic parameters into the innermost type scope
    fn declare_type_params(&mut self, decls: &[TypeParamDecl], span: Span) -> Vec<TypeId> {
        if decls.is_empty() {
            return Vec::new();
        }
        let ids = {
            let scopes = &self.scopes;
            let globals = &self.globals;
            let lookup = |name: &str| declared_value(scopes, globals, name);
            Lowerer::new(&mut *self.ctx, &self.type_scopes, &lookup, &mut self.errors, span)
                .declare_type_params(decls)
        };
        if let Some(scope) = self.type_scopes.last_mut() {
            for (decl, &id) in decls.iter().zip(&ids) {
                scope.insert(decl.name.clone(), id);
            }
        }
        ids
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn check_block(&mut self, stmts: &[Stmt]) {
        self.push_scope();
        self.check_statements(stmts);
        self.pop_scope();
    }

    fn check_statements(&mut self, stmts: &[Stmt]) {
        let span = stmts.first().map(|s| s.span).unwrap_or_default();
        let mark = self.errors.len();
        self.declare(stmts, span);
        if self.check_depth(mark, span) {
            return;
        }
        for stmt in stmts {
            let mark = self.errors.len();
            self.check_stmt(stmt);
            if self.check_depth(mark, stmt.span) {
                return;
            }
            self.record(FlowNodeKind::Statement, vec![self.current], stmt.span);
        }
    }

    /// Abandon the unit once the recursion guard has tripped. Errors
    /// produced by the statement after the guard tripped are dropped.
    fn check_depth(&mut self, mark: usize, span: Span) -> bool {
        if self.aborted {
            return true;
        }
        match self.ctx.take_depth_error() {
            Some(err) => {
                tracing::debug!(error = %err, "recursion guard tripped, abandoning unit");
                self.errors.truncate(mark);
                self.errors.push(CheckError::from_type_error(err, span));
                self.aborted = true;
                true
            }
            None => false,
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::TypeAlias { .. } | StmtKind::Interface { .. } => {}
            StmtKind::Class(class) => self.check_class(class, stmt.span),
            StmtKind::Function(decl) => self.check_function_decl(decl, stmt.span),
            StmtKind::Var {
                var_kind,
                name,
                ty,
                init,
            } => self.check_var(*var_kind, name, ty.as_ref(), init.as_ref(), stmt.span),
            StmtKind::Expr { expr } => {
                self.check_expr(expr, None);
                if let Some(guard) = extract_assertion(expr, self) {
                    self.env = apply_guard(self.ctx, &self.env, &guard);
                }
            }
            StmtKind::Return { value } => self.check_return(value.as_ref(), stmt.span),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.check_if(cond, then_branch, else_branch.as_deref(), stmt.span),
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.check_switch(discriminant, cases, stmt.span),
            StmtKind::While { cond, body } => self.check_while(cond, body, stmt.span),
            StmtKind::Block { body } => self.check_block(body),
            StmtKind::Throw { value } => {
                self.check_expr(value, None);
                self.env.mark_unreachable();
            }
            StmtKind::Break => {
                let env = self.env.clone();
                if let Some(frame) = self.break_envs.last_mut() {
                    frame.push(env);
                }
                self.env.mark_unreachable();
            }
        }
    }

    fn check_var(
        &mut self,
        kind: VarKind,
        name: &str,
        annotation: Option<&TypeExpr>,
        init: Option<&Expr>,
        span: Span,
    ) {
        let declared = annotation.map(|t| self.lower(t, span));
        let init_ty = init.map(|e| (e, self.check_expr(e, declared)));

        let (binding_ty, current) = match (declared, init_ty) {
            (Some(TypeId::NEVER), Some((expr, actual))) => {
                self.check_never_assignment(expr, actual);
                (TypeId::NEVER, TypeId::NEVER)
            }
            (Some(declared), Some((expr, actual))) => {
                let current = if self.check_expr_assignable(expr, actual, declared) {
                    narrow_by_assignment(self.ctx, declared, actual)
                } else {
                    declared
                };
                (declared, current)
            }
            (Some(declared), None) => (declared, declared),
            (None, Some((_, actual))) => {
                let ty = match kind {
                    VarKind::Const => actual,
                    VarKind::Let => self.ctx.widen_literals(actual),
                };
                (ty, ty)
            }
            (None, None) => (TypeId::ANY, TypeId::ANY),
        };
        self.bind(name.to_string(), binding_ty, kind == VarKind::Let);
        self.env.set(name, current);
    }

    /// `const _: never = x` reports what is left of `x`
    fn check_never_assignment(&mut self, expr: &Expr, actual: TypeId) {
        let residual = evaluate(self.ctx, actual);
        if matches!(self.ctx.resolve(residual), Type::Never | Type::Any) {
            return;
        }
        let missing = describe_members(self.ctx, actual);
        self.errors.push(CheckError::NonExhaustiveMatch {
            missing,
            span: expr.span,
        });
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) {
        let (expected, contextual, is_async) = match self.functions.last() {
            Some(f) => (f.expected_return, f.contextual_return, f.is_async),
            None => (None, None, false),
        };
        let actual = match value {
            Some(expr) => {
                let ty = self.check_expr(expr, expected.or(contextual));
                let ty = if is_async {
                    unwrap_once(self.ctx, ty)
                } else {
                    ty
                };
                if let Some(expected) = expected {
                    self.check_expr_assignable(expr, ty, expected);
                }
                ty
            }
            None => {
                if let Some(expected) = expected {
                    self.check_assignable(TypeId::VOID, expected, span);
                }
                TypeId::VOID
            }
        };
        if let Some(f) = self.functions.last_mut() {
            f.returns.push(actual);
        }
        self.env.mark_unreachable();
    }

    fn check_if(&mut self, cond: &Expr, then_branch: &[Stmt], else_branch: Option<&[Stmt]>, span: Span) {
        self.check_expr(cond, None);
        let guard = extract_type_guard(cond, self).unwrap_or(TypeGuard::Opaque);
        let before = self.current;
        let entry = self.env.clone();
        let mut then_env = apply_guard(self.ctx, &entry, &guard);
        let mut else_env = apply_guard(self.ctx, &entry, &guard.negate());
        match cond.kind {
            ExprKind::Bool { value: true } => else_env.mark_unreachable(),
            ExprKind::Bool { value: false } => then_env.mark_unreachable(),
            _ => {}
        }

        self.env = then_env;
        self.record(FlowNodeKind::BranchTrue, vec![before], cond.span);
        self.check_block(then_branch);
        let then_end = self.current;
        let then_exit = std::mem::take(&mut self.env);

        self.env = else_env;
        self.record(FlowNodeKind::BranchFalse, vec![before], cond.span);
        if let Some(else_branch) = else_branch {
            self.check_block(else_branch);
        }
        let else_end = self.current;

        self.env = then_exit.merge(&self.env, self.ctx);
        self.record(FlowNodeKind::Join, vec![then_end, else_end], span);
    }

    fn check_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], span: Span) {
        self.check_expr(discriminant, None);
        let subject = switch_subject(discriminant);
        let declared = subject.as_ref().and_then(|s| self.value_type(s.var()));
        let before = self.current;
        let mut residual = self.env.clone();
        let mut exits: Vec<TypeEnv> = Vec::new();
        let mut ends: Vec<FlowNodeId> = Vec::new();
        let mut has_default = false;

        for group in group_cases(cases) {
            let mut tests: Vec<&Expr> = Vec::new();
            let mut is_default = false;
            for case in &group {
                match &case.test {
                    Some(test) => {
                        self.check_expr(test, None);
                        tests.push(test);
                    }
                    None => is_default = true,
                }
            }
            let clause_env = if is_default {
                has_default = true;
                residual.clone()
            } else {
                let guard = match &subject {
                    Some(subject) => clause_guard(subject, &tests, self),
                    None => TypeGuard::Opaque,
                };
                let entry = apply_guard(self.ctx, &residual, &guard);
                residual = apply_guard(self.ctx, &residual, &guard.negate());
                entry
            };

            self.env = clause_env;
            let clause_span = group.first().map(|c| c.span).unwrap_or(span);
            self.record(FlowNodeKind::CaseClause, vec![before], clause_span);
            self.break_envs.push(Vec::new());
            if let Some(last) = group.last() {
                self.check_block(&last.body);
            }
            exits.extend(self.break_envs.pop().unwrap_or_default());
            exits.push(std::mem::take(&mut self.env));
            ends.push(self.current);
        }

        if !has_default {
            let residual_ty = subject.as_ref().and_then(|s| residual.get(s.var()));
            if let (Some(subject), Some(declared), Some(residual_ty)) = (&subject, declared, residual_ty) {
                if self.options.require_exhaustive_switch {
                    if let ExhaustivenessResult::NonExhaustive(missing) =
                        check_switch_exhaustiveness(self.ctx, subject, declared, residual_ty, false)
                    {
                        self.errors.push(CheckError::NonExhaustiveMatch { missing, span });
                    }
                }
            }
            // No clause matched; impossible once every member is handled
            if residual_ty != Some(TypeId::NEVER) {
                exits.push(residual);
                ends.push(before);
            }
        }

        self.env = TypeEnv::join(&exits, self.ctx);
        self.record(FlowNodeKind::Join, ends, span);
    }

    fn check_while(&mut self, cond: &Expr, body: &[Stmt], span: Span) {
        // The header is re-entered with whatever the body assigned
        let mut assigned = Vec::new();
        collect_assigned(body, &mut assigned);
        for name in &assigned {
            if let Some(binding) = self.lookup_binding(name) {
                self.env.set(name.clone(), binding.declared);
            }
        }
        let header = self.record(FlowNodeKind::LoopHeader, vec![self.current], span);

        self.check_expr(cond, None);
        let guard = extract_type_guard(cond, self).unwrap_or(TypeGuard::Opaque);
        let entry = self.env.clone();
        let body_env = apply_guard(self.ctx, &entry, &guard);
        let mut exit_env = apply_guard(self.ctx, &entry, &guard.negate());
        if matches!(cond.kind, ExprKind::Bool { value: true }) {
            exit_env.mark_unreachable();
        }

        self.env = body_env;
        self.record(FlowNodeKind::BranchTrue, vec![header], cond.span);
        self.break_envs.push(Vec::new());
        self.check_block(body);
        let body_end = self.current;

        let mut exits = vec![exit_env];
        exits.extend(self.break_envs.pop().unwrap_or_default());
        self.env = TypeEnv::join(&exits, self.ctx);
        self.record(FlowNodeKind::Join, vec![header, body_end], span);
    }

    // ========================================================================
    // Functions and classes
    // ========================================================================

    fn function_of(&mut self, ty: TypeId) -> Option<FunctionType> {
        let evaluated = evaluate(self.ctx, ty);
        self.ctx.resolve(evaluated).as_function().cloned()
    }

    fn check_function_decl(&mut self, decl: &FunctionDecl, span: Span) {
        let Some(body) = &decl.body else {
            return;
        };
        let Some(func) = self
            .lookup_binding(&decl.name)
            .and_then(|b| self.function_of(b.declared))
        else {
            return;
        };
        let annotated = decl.return_type.is_some() || decl.predicate.is_some();
        let ret = self.check_function_body(
            &func,
            &decl.params,
            decl.rest.as_ref(),
            Body::Block(body),
            decl.is_async,
            annotated,
            None,
            span,
        );
        if !annotated {
            let inferred = self.ctx.function_type(FunctionType {
                return_type: ret,
                ..func
            });
            tracing::trace!(name = %decl.name, ret = %self.ctx.display(ret), "inferred return type");
            self.rebind(&decl.name, inferred);
        }
    }

    /// Check a body against its lowered signature and return the final
    /// return type
    #[allow(clippy::too_many_arguments)]
    fn check_function_body(
        &mut self,
        func: &FunctionType,
        params: &[Param],
        rest: Option<&Param>,
        body: Body<'_>,
        is_async: bool,
        annotated: bool,
        contextual_return: Option<TypeId>,
        span: Span,
    ) -> TypeId {
        let outer_env = self.env.clone();
        let outer_node = self.current;
        self.reset_mutable_narrowing();
        self.type_scopes.push(type_param_scope(self.ctx, &func.type_params));
        self.push_scope();
        for (param, sig) in params.iter().zip(&func.params) {
            let ty = if sig.optional {
                self.ctx.union_type(vec![sig.ty, TypeId::UNDEFINED])
            } else {
                sig.ty
            };
            self.bind(param.name.clone(), ty, true);
        }
        if let (Some(rest), Some(element)) = (rest, func.rest) {
            let ty = self.ctx.array_type(element);
            self.bind(rest.name.clone(), ty, true);
        }

        let expected_return = if !annotated {
            None
        } else if is_async {
            match declared_async_result(self.ctx, func.return_type) {
                Some(inner) => Some(inner),
                None => {
                    let declared = self.ctx.display(func.return_type);
                    self.errors.push(CheckError::TypeMismatch {
                        expected: format!("Promise<{}>", declared),
                        actual: declared,
                        span,
                        note: Some("the return type of an async function must be a promise".into()),
                    });
                    Some(TypeId::ANY)
                }
            }
        } else {
            Some(func.return_type)
        };
        self.functions.push(FunctionContext {
            expected_return,
            contextual_return,
            is_async,
            returns: Vec::new(),
        });
        self.record(FlowNodeKind::Entry, vec![outer_node], span);

        let fell_off = match body {
            Body::Block(stmts) => {
                self.check_block(stmts);
                self.env.is_reachable()
            }
            Body::Expr(expr) => {
                let ty = self.check_expr(expr, expected_return.or(contextual_return));
                let ty = if is_async {
                    unwrap_once(self.ctx, ty)
                } else {
                    ty
                };
                if let Some(expected) = expected_return {
                    self.check_expr_assignable(expr, ty, expected);
                }
                if let Some(f) = self.functions.last_mut() {
                    f.returns.push(ty);
                }
                false
            }
        };

        let mut returns = self.functions.pop().map(|f| f.returns).unwrap_or_default();
        self.pop_scope();
        self.type_scopes.pop();
        self.env = outer_env;
        self.current = outer_node;

        if annotated {
            return func.return_type;
        }
        if fell_off && !returns.is_empty() {
            returns.push(TypeId::UNDEFINED);
        }
        let inferred = if returns.is_empty() {
            TypeId::VOID
        } else {
            self.ctx.union_type(returns)
        };
        let inferred = self.widen_for(inferred, contextual_return);
        if is_async {
            wrap_async_return(self.ctx, inferred)
        } else {
            inferred
        }
    }

    fn check_function_expr(&mut self, func: &FunctionExpr, expected: Option<TypeId>, span: Span) -> TypeId {
        let contextual = expected.and_then(|e| self.function_of(e));
        self.type_scopes.push(TypeScope::default());
        let type_params = self.declare_type_params(&func.type_params, span);

        let mut params = Vec::with_capacity(func.params.len());
        for (i, param) in func.params.iter().enumerate() {
            let ty = match &param.ty {
                Some(annotation) => self.lower(annotation, param.span),
                None => contextual
                    .as_ref()
                    .and_then(|c| c.param_type_at(i))
                    .unwrap_or(TypeId::ANY),
            };
            params.push(ParamSignature {
                name: param.name.clone(),
                ty,
                optional: param.optional,
            });
        }
        let annotated_return = func.return_type.as_ref().map(|t| self.lower(t, span));
        let contextual_return = contextual
            .as_ref()
            .map(|c| c.return_type)
            .filter(|&r| !self.ctx.has_free_type_params(r));

        let sig = FunctionType {
            type_params,
            params,
            rest: None,
            return_type: annotated_return.unwrap_or(TypeId::ANY),
            kind: FunctionKind::Call,
            predicate: None,
        };
        let body = match &func.body {
            FunctionBody::Block { body } => Body::Block(body),
            FunctionBody::Expr { expr } => Body::Expr(&**expr),
        };
        let return_type = self.check_function_body(
            &sig,
            &func.params,
            None,
            body,
            func.is_async,
            annotated_return.is_some(),
            contextual_return,
            span,
        );
        self.type_scopes.pop();
        self.ctx.function_type(FunctionType { return_type, ..sig })
    }

    fn check_class(&mut self, class: &ClassDecl, span: Span) {
        let Some(def) = self.ctx.alias(&class.name) else {
            return;
        };
        let instance = def
            .body
            .and_then(|body| self.ctx.resolve(body).as_object().cloned());
        let constructor = self
            .lookup_binding(&class.name)
            .and_then(|b| self.function_of(b.declared));
        self.type_scopes.push(type_param_scope(self.ctx, &def.params));
        let this_type = self.ctx.reference(class.name.clone(), def.params.clone());
        let previous_this = self.this_type.replace(this_type);

        for field in &class.fields {
            let Some(init) = &field.init else {
                continue;
            };
            let expected = instance
                .as_ref()
                .and_then(|o| o.property(&field.name))
                .map(|p| p.ty);
            let ty = self.check_expr(init, expected);
            if let Some(expected) = expected {
                self.check_expr_assignable(init, ty, expected);
            }
        }

        if let (Some(ctor), Some(ctor_ty)) = (&class.constructor, &constructor) {
            let sig = FunctionType {
                type_params: Vec::new(),
                params: ctor_ty.params.clone(),
                rest: None,
                return_type: TypeId::VOID,
                kind: FunctionKind::Call,
                predicate: None,
            };
            self.check_function_body(&sig, &ctor.params, None, Body::Block(&ctor.body), false, false, None, span);
        }

        for method in &class.methods {
            let Some(body) = &method.body else {
                continue;
            };
            let method_ty = instance
                .as_ref()
                .and_then(|o| o.property(&method.name))
                .map(|p| p.ty);
            let Some(func) = method_ty.and_then(|ty| self.ctx.resolve(ty).as_function().cloned()) else {
                continue;
            };
            let annotated = method.return_type.is_some() || method.predicate.is_some();
            self.check_function_body(
                &func,
                &method.params,
                method.rest.as_ref(),
                Body::Block(body),
                method.is_async,
                annotated,
                None,
                span,
            );
        }

        self.this_type = previous_this;
        self.type_scopes.pop();
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Check an expression, optionally against a contextual type, and
    /// record its type
    pub fn check_expr(&mut self, expr: &Expr, expected: Option<TypeId>) -> TypeId {
        let ty = self.check_expr_kind(expr, expected);
        self.expr_types.insert(expr.id, ty);
        ty
    }

    fn check_expr_kind(&mut self, expr: &Expr, expected: Option<TypeId>) -> TypeId {
        match &expr.kind {
            ExprKind::String { value } => self.ctx.string_literal(value.clone()),
            ExprKind::Number { value } => self.ctx.number_literal(*value),
            ExprKind::Bool { value } => self.ctx.boolean_literal(*value),
            ExprKind::BigInt { digits } => self.ctx.literal(LiteralValue::BigInt(digits.clone())),
            ExprKind::Null => TypeId::NULL,
            ExprKind::Undefined => TypeId::UNDEFINED,
            ExprKind::Template { parts } => {
                for part in parts {
                    if let TemplatePart::Expr { expr } = part {
                        self.check_expr(expr, None);
                    }
                }
                TypeId::STRING
            }
            ExprKind::Ident { name } => match self.value_type(name) {
                Some(ty) => ty,
                None => {
                    self.errors.push(CheckError::UndefinedName {
                        name: name.clone(),
                        span: expr.span,
                    });
                    TypeId::ANY
                }
            },
            ExprKind::This => self.this_type.unwrap_or(TypeId::ANY),
            ExprKind::Object { members } => self.check_object(members, expected),
            ExprKind::Array { elements } => self.check_array(elements, expected),
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.check_call(callee, type_args, args, FunctionKind::Call, expr.span),
            ExprKind::New {
                callee,
                type_args,
                args,
            } => self.check_call(callee, type_args, args, FunctionKind::Construct, expr.span),
            ExprKind::Member { object, property } => {
                let object_ty = self.check_expr(object, None);
                self.property_type(object_ty, property, expr.span)
            }
            ExprKind::Index { object, index } => self.check_index(object, index, expr.span),
            ExprKind::Function(func) => self.check_function_expr(func, expected, expr.span),
            ExprKind::Binary { op, left, right } => self.check_binary(*op, left, right),
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.check_expr(operand, None);
                match op {
                    UnaryOp::Not => TypeId::BOOLEAN,
                    UnaryOp::Neg => {
                        let evaluated = evaluate(self.ctx, operand_ty);
                        if self.ctx.resolve(evaluated).primitive_base() == Some(PrimitiveType::BigInt) {
                            TypeId::BIGINT
                        } else {
                            TypeId::NUMBER
                        }
                    }
                    UnaryOp::TypeOf => self.typeof_result(),
                }
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.check_expr(cond, None);
                let guard = extract_type_guard(cond, self).unwrap_or(TypeGuard::Opaque);
                let saved = self.env.clone();
                self.env = apply_guard(self.ctx, &saved, &guard);
                let then_ty = self.check_expr(then_expr, expected);
                self.env = apply_guard(self.ctx, &saved, &guard.negate());
                let else_ty = self.check_expr(else_expr, expected);
                self.env = saved;
                self.ctx.union_type(vec![then_ty, else_ty])
            }
            ExprKind::Await { value } => {
                let ty = self.check_expr(value, None);
                awaited(self.ctx, ty)
            }
            ExprKind::As { value, ty } => self.check_as(value, ty, expr.span),
            ExprKind::NonNull { value } => {
                let ty = self.check_expr(value, None);
                narrow_type(self.ctx, ty, &non_nullish())
            }
            ExprKind::Assign { target, value } => self.check_assign(target, value, expr.span),
        }
    }

    fn typeof_result(&mut self) -> TypeId {
        let tags = [
            "string",
            "number",
            "bigint",
            "boolean",
            "symbol",
            "undefined",
            "object",
            "function",
        ];
        let members = tags.iter().map(|t| self.ctx.string_literal(*t)).collect();
        self.ctx.union_type(members)
    }

    fn check_object(&mut self, members: &[ObjectMember], expected: Option<TypeId>) -> TypeId {
        let mut props: Vec<PropertySignature> = Vec::new();
        for member in members {
            match member {
                ObjectMember::Property { name, value } => {
                    let field_expected = expected.and_then(|e| self.expected_field(e, name));
                    let ty = self.check_expr(value, field_expected);
                    let ty = self.widen_for(ty, field_expected);
                    props.retain(|p| &p.name != name);
                    props.push(PropertySignature::new(name.clone(), ty));
                }
                ObjectMember::Spread { value } => {
                    let ty = self.check_expr(value, None);
                    let evaluated = evaluate(self.ctx, ty);
                    let spread = self
                        .ctx
                        .resolve(evaluated)
                        .as_object()
                        .map(|o| o.properties.clone())
                        .unwrap_or_default();
                    for prop in spread {
                        props.retain(|p| p.name != prop.name);
                        props.push(PropertySignature {
                            readonly: false,
                            ..prop
                        });
                    }
                }
            }
        }
        self.ctx.object_type(props, None)
    }

    fn check_array(&mut self, elements: &[Expr], expected: Option<TypeId>) -> TypeId {
        let evaluated = expected.map(|e| evaluate(self.ctx, e));
        let (tuple, element_expected) = match evaluated.map(|e| self.ctx.resolve(e)) {
            Some(Type::Tuple(t)) => (Some(t.clone()), None),
            Some(Type::Array(a)) => (None, Some(a.element)),
            _ => (None, None),
        };

        if let Some(tuple) = tuple {
            let mut out = Vec::with_capacity(elements.len());
            for (i, element) in elements.iter().enumerate() {
                let element_expected = tuple.element_at(i);
                let ty = self.check_expr(element, element_expected);
                out.push(TupleElement {
                    ty: self.widen_for(ty, element_expected),
                    optional: false,
                });
            }
            return self.ctx.tuple_type(out, None);
        }

        if elements.is_empty() {
            return self.ctx.array_type(element_expected.unwrap_or(TypeId::ANY));
        }
        let types: Vec<TypeId> = elements
            .iter()
            .map(|e| self.check_expr(e, element_expected))
            .collect();
        let joined = self.ctx.union_type(types);
        let joined = self.widen_for(joined, element_expected);
        self.ctx.array_type(joined)
    }

    /// Field type a fresh object literal is checked against
    fn expected_field(&mut self, expected: TypeId, name: &str) -> Option<TypeId> {
        let mut found = Vec::new();
        for member in union_members_named(self.ctx, expected) {
            let evaluated = evaluate(self.ctx, member);
            let constraint = match self.ctx.resolve(evaluated) {
                Type::TypeParam(tp) => tp.constraint,
                _ => None,
            };
            let evaluated = match constraint {
                Some(c) => evaluate(self.ctx, c),
                None => evaluated,
            };
            if let Some(ty) = self
                .ctx
                .resolve(evaluated)
                .as_object()
                .and_then(|o| o.read_type(name))
            {
                found.push(ty);
            }
        }
        (!found.is_empty()).then(|| self.ctx.union_type(found))
    }

    fn contains_literal(&mut self, ty: TypeId) -> bool {
        union_members_named(self.ctx, ty).into_iter().any(|m| {
            let evaluated = evaluate(self.ctx, m);
            matches!(self.ctx.resolve(evaluated), Type::Literal(_))
        })
    }

    /// Widen literal types unless the context asks for literals
    fn widen_for(&mut self, ty: TypeId, expected: Option<TypeId>) -> TypeId {
        match expected {
            Some(e) if self.contains_literal(e) => ty,
            _ => self.ctx.widen_literals(ty),
        }
    }

    fn check_call(
        &mut self,
        callee: &Expr,
        type_args: &[TypeExpr],
        args: &[Expr],
        kind: FunctionKind,
        span: Span,
    ) -> TypeId {
        let callee_ty = self.check_expr(callee, None);
        let evaluated = evaluate(self.ctx, callee_ty);
        let (is_any, func) = match self.ctx.resolve(evaluated) {
            Type::Any => (true, None),
            Type::Function(f) if f.kind == kind => (false, Some(f.clone())),
            _ => (false, None),
        };
        if is_any {
            for arg in args {
                self.check_expr(arg, None);
            }
            return TypeId::ANY;
        }
        let Some(func) = func else {
            self.errors.push(CheckError::NotCallable {
                ty: self.ctx.display(callee_ty),
                span,
            });
            for arg in args {
                self.check_expr(arg, None);
            }
            return TypeId::ANY;
        };

        let min = func.min_params();
        let max = func.rest.is_none().then_some(func.params.len());
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            let expected = match max {
                None => format!("at least {}", min),
                Some(m) if m == min => m.to_string(),
                Some(m) => format!("{}-{}", min, m),
            };
            self.errors.push(CheckError::ArgumentCount {
                expected,
                actual: args.len(),
                span,
            });
        }

        let mut arg_types: Vec<Option<TypeId>> = vec![None; args.len()];
        let instantiated = if func.type_params.is_empty() {
            func
        } else if !type_args.is_empty() {
            let explicit: Vec<TypeId> = type_args.iter().map(|t| self.lower(t, span)).collect();
            self.instantiate_explicit(&func, explicit, callee, span)
        } else {
            self.infer_type_args(&func, args, &mut arg_types, span)
        };

        for (i, arg) in args.iter().enumerate() {
            let param_ty = instantiated.param_type_at(i);
            let arg_ty = match arg_types[i] {
                Some(ty) => ty,
                None => self.check_expr(arg, param_ty),
            };
            if let Some(param_ty) = param_ty {
                self.check_expr_assignable(arg, arg_ty, param_ty);
            }
        }
        if let Some(predicate) = &instantiated.predicate {
            self.call_predicates.insert(callee.id, predicate.clone());
        }
        instantiated.return_type
    }

    /// Infer type arguments in two rounds: arguments that need no context
    /// first, then function expressions typed by the partial solution
    fn infer_type_args(
        &mut self,
        func: &FunctionType,
        args: &[Expr],
        arg_types: &mut [Option<TypeId>],
        span: Span,
    ) -> FunctionType {
        for (i, arg) in args.iter().enumerate() {
            if !arg.is_context_sensitive() {
                arg_types[i] = Some(self.check_expr(arg, func.param_type_at(i)));
            }
        }

        if args.iter().any(Expr::is_context_sensitive) {
            let partial = {
                let mut inference = InferenceContext::new(self.ctx, &func.type_params);
                for (i, ty) in arg_types.iter().enumerate() {
                    if let (Some(ty), Some(param)) = (ty, func.param_type_at(i)) {
                        inference.infer(param, *ty);
                    }
                }
                inference.partial_substitution()
            };
            for (i, arg) in args.iter().enumerate() {
                if arg.is_context_sensitive() {
                    let contextual = func
                        .param_type_at(i)
                        .map(|p| substitute(self.ctx, p, &partial));
                    arg_types[i] = Some(self.check_expr(arg, contextual));
                }
            }
        }

        let known: Vec<TypeId> = arg_types.iter().map(|t| t.unwrap_or(TypeId::ANY)).collect();
        let solution = infer_call(self.ctx, func, &known);
        for failure in &solution.failures {
            self.errors.push(CheckError::UnresolvedGenericConstraint {
                param: failure.name.clone(),
                inferred: self.ctx.display(failure.inferred),
                constraint: self.ctx.display(failure.constraint),
                span,
            });
        }
        tracing::trace!(
            params = func.type_params.len(),
            failures = solution.failures.len(),
            "inferred type arguments"
        );
        self.instantiate(func, &solution.substitution)
    }

    fn instantiate_explicit(
        &mut self,
        func: &FunctionType,
        explicit: Vec<TypeId>,
        callee: &Expr,
        span: Span,
    ) -> FunctionType {
        let params: Vec<(TypeId, String, Option<TypeId>, Option<TypeId>)> = func
            .type_params
            .iter()
            .map(|&p| match self.ctx.resolve(p) {
                Type::TypeParam(tp) => (p, tp.name.clone(), tp.constraint, tp.default),
                _ => (p, String::new(), None, None),
            })
            .collect();
        let required = params.iter().take_while(|(_, _, _, d)| d.is_none()).count();
        if explicit.len() < required || explicit.len() > params.len() {
            self.errors.push(CheckError::InvalidTypeArguments {
                name: callee.as_ident().unwrap_or("function").to_string(),
                expected: params.len(),
                actual: explicit.len(),
                span,
            });
            let erased: Substitution = params.iter().map(|(p, ..)| (*p, TypeId::ANY)).collect();
            return self.instantiate(func, &erased);
        }

        let mut subst = Substitution::new();
        for (i, (param, _, _, default)) in params.iter().enumerate() {
            let arg = match explicit.get(i) {
                Some(&arg) => arg,
                None => {
                    let default = default.unwrap_or(TypeId::UNKNOWN);
                    substitute(self.ctx, default, &subst)
                }
            };
            subst.insert(*param, arg);
        }
        for (param, name, constraint, _) in &params {
            let (Some(constraint), Some(arg)) = (constraint, subst.get(*param)) else {
                continue;
            };
            let bound = substitute(self.ctx, *constraint, &subst);
            if !SubtypingContext::new(self.ctx).is_subtype(arg, bound) {
                self.errors.push(CheckError::UnresolvedGenericConstraint {
                    param: name.clone(),
                    inferred: self.ctx.display(arg),
                    constraint: self.ctx.display(bound),
                    span,
                });
            }
        }
        self.instantiate(func, &subst)
    }

    fn instantiate(&mut self, func: &FunctionType, subst: &Substitution) -> FunctionType {
        FunctionType {
            type_params: Vec::new(),
            params: func
                .params
                .iter()
                .map(|p| ParamSignature {
                    ty: substitute(self.ctx, p.ty, subst),
                    ..p.clone()
                })
                .collect(),
            rest: func.rest.map(|r| substitute(self.ctx, r, subst)),
            return_type: substitute(self.ctx, func.return_type, subst),
            kind: func.kind,
            predicate: func.predicate.as_ref().map(|p| TypePredicate {
                ty: substitute(self.ctx, p.ty, subst),
                ..p.clone()
            }),
        }
    }

    fn property_type(&mut self, ty: TypeId, name: &str, span: Span) -> TypeId {
        match self.lookup_property(ty, name, 0) {
            Some(found) => found,
            None => {
                self.errors.push(CheckError::UnknownProperty {
                    property: name.to_string(),
                    ty: self.ctx.display(ty),
                    span,
                });
                TypeId::ANY
            }
        }
    }

    fn lookup_property(&mut self, ty: TypeId, name: &str, depth: u32) -> Option<TypeId> {
        if depth > MAX_PROPERTY_DEPTH {
            return None;
        }
        let evaluated = evaluate(self.ctx, ty);
        let resolved = self.ctx.resolve(evaluated).clone();
        match resolved {
            Type::Any => Some(TypeId::ANY),
            Type::Unknown => None,
            Type::Never => Some(TypeId::NEVER),
            Type::Union(_) => {
                let mut found = Vec::new();
                for member in union_members_named(self.ctx, ty) {
                    found.push(self.lookup_property(member, name, depth + 1)?);
                }
                Some(self.ctx.union_type(found))
            }
            Type::Intersection(inter) => inter
                .members
                .iter()
                .find_map(|&m| self.lookup_property(m, name, depth + 1)),
            Type::TypeParam(tp) => self.lookup_property(tp.constraint?, name, depth + 1),
            Type::Object(obj) => match obj.property(name) {
                Some(prop) if prop.optional => {
                    Some(self.ctx.union_type(vec![prop.ty, TypeId::UNDEFINED]))
                }
                Some(prop) => Some(prop.ty),
                None => obj
                    .index_signature
                    .or_else(|| apparent_member(self.ctx, evaluated, name)),
            },
            _ => apparent_member(self.ctx, evaluated, name),
        }
    }

    fn check_index(&mut self, object: &Expr, index: &Expr, span: Span) -> TypeId {
        let object_ty = self.check_expr(object, None);
        let index_ty = self.check_expr(index, None);
        let evaluated = evaluate(self.ctx, object_ty);
        let key = self.ctx.resolve(index_ty).as_literal().cloned();
        let tuple = match self.ctx.resolve(evaluated) {
            Type::Any => return TypeId::ANY,
            Type::Array(arr) => return arr.element,
            Type::Tuple(t) => Some(t.clone()),
            _ => None,
        };
        if let Some(tuple) = tuple {
            return match key {
                Some(LiteralValue::Number(n)) if n.value() >= 0.0 => tuple
                    .element_at(n.value() as usize)
                    .unwrap_or(TypeId::UNDEFINED),
                _ => {
                    let mut all: Vec<TypeId> = tuple.elements.iter().map(|e| e.ty).collect();
                    all.extend(tuple.rest);
                    self.ctx.union_type(all)
                }
            };
        }
        match key {
            Some(LiteralValue::String(name)) => self.property_type(object_ty, &name, span),
            _ => self
                .ctx
                .resolve(evaluated)
                .as_object()
                .and_then(|o| o.index_signature)
                .unwrap_or(TypeId::ANY),
        }
    }

    fn check_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> TypeId {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let left_ty = self.check_expr(left, None);
                let guard = extract_type_guard(left, self).unwrap_or(TypeGuard::Opaque);
                let saved = self.env.clone();
                let edge = if op == BinaryOp::And {
                    guard
                } else {
                    guard.negate()
                };
                self.env = apply_guard(self.ctx, &saved, &edge);
                let right_ty = self.check_expr(right, None);
                self.env = saved;
                // `a && b` yields `a` when it is falsy, `a || b` when truthy
                let short_circuit = TypeGuard::Truthy {
                    var: String::new(),
                    negated: op == BinaryOp::And,
                };
                let left_part = narrow_type(self.ctx, left_ty, &short_circuit);
                self.ctx.union_type(vec![left_part, right_ty])
            }
            BinaryOp::Nullish => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                let present = narrow_type(self.ctx, left_ty, &non_nullish());
                self.ctx.union_type(vec![present, right_ty])
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let left_ty = self.check_expr(left, None);
                let right_ty = self.check_expr(right, None);
                self.arithmetic_result(left_ty, right_ty, op == BinaryOp::Add)
            }
            _ => {
                self.check_expr(left, None);
                self.check_expr(right, None);
                TypeId::BOOLEAN
            }
        }
    }

    fn arithmetic_result(&mut self, left: TypeId, right: TypeId, is_add: bool) -> TypeId {
        let left = evaluate(self.ctx, left);
        let right = evaluate(self.ctx, right);
        let (l, r) = (self.ctx.resolve(left), self.ctx.resolve(right));
        if l.is_any() || r.is_any() {
            return TypeId::ANY;
        }
        let is_string = |t: &Type| {
            t.primitive_base() == Some(PrimitiveType::String)
                || matches!(t, Type::TemplateLiteral(_) | Type::StringMapping(_))
        };
        if is_add && (is_string(l) || is_string(r)) {
            return TypeId::STRING;
        }
        if l.primitive_base() == Some(PrimitiveType::BigInt)
            && r.primitive_base() == Some(PrimitiveType::BigInt)
        {
            return TypeId::BIGINT;
        }
        TypeId::NUMBER
    }

    fn check_as(&mut self, value: &Expr, ty: &TypeExpr, span: Span) -> TypeId {
        let target = self.lower(ty, span);
        let source = self.check_expr(value, Some(target));
        let is_top = |ctx: &mut TypeContext, t: TypeId| {
            let t = evaluate(ctx, t);
            matches!(ctx.resolve(t), Type::Any | Type::Unknown)
        };
        let allowed = is_top(&mut *self.ctx, source)
            || is_top(&mut *self.ctx, target)
            || SubtypingContext::new(self.ctx).is_assignable(source, target)
            || SubtypingContext::new(self.ctx).is_assignable(target, source);
        if !allowed {
            self.errors.push(CheckError::TypeMismatch {
                expected: self.ctx.display(target),
                actual: self.ctx.display(source),
                span,
                note: Some("neither type sufficiently overlaps with the other".into()),
            });
        }
        target
    }

    fn check_assign(&mut self, target: &Expr, value: &Expr, span: Span) -> TypeId {
        let Some(name) = target.as_ident() else {
            let target_ty = self.check_expr(target, None);
            let value_ty = self.check_expr(value, Some(target_ty));
            self.check_expr_assignable(value, value_ty, target_ty);
            return value_ty;
        };
        let binding = self.lookup_binding(name);
        let Some(declared) = binding
            .map(|b| b.declared)
            .or_else(|| self.globals.get(name).copied())
        else {
            self.errors.push(CheckError::UndefinedName {
                name: name.to_string(),
                span,
            });
            return self.check_expr(value, None);
        };
        self.expr_types.insert(target.id, declared);
        let value_ty = self.check_expr(value, Some(declared));
        if self.check_expr_assignable(value, value_ty, declared) && binding.is_some() {
            let narrowed = narrow_by_assignment(self.ctx, declared, value_ty);
            self.env.set(name, narrowed);
        }
        value_ty
    }

    // ========================================================================
    // Assignability
    // ========================================================================

    fn check_assignable(&mut self, source: TypeId, target: TypeId, span: Span) -> bool {
        let ok = SubtypingContext::new(self.ctx).is_assignable(source, target);
        if !ok && !self.ctx.depth_exceeded() {
            self.errors.push(CheckError::TypeMismatch {
                expected: self.ctx.display(target),
                actual: self.ctx.display(source),
                span,
                note: None,
            });
        }
        ok
    }

    /// Assignability of an expression's value. Fresh literals are compared
    /// against a read-only view of the target since nothing else can see
    /// their fields.
    fn check_expr_assignable(&mut self, expr: &Expr, source: TypeId, target: TypeId) -> bool {
        let view = if expr.is_fresh_literal() {
            self.fresh_view(target)
        } else {
            target
        };
        let ok = SubtypingContext::new(self.ctx).is_assignable(source, view);
        if !ok && !self.ctx.depth_exceeded() {
            self.errors.push(CheckError::TypeMismatch {
                expected: self.ctx.display(target),
                actual: self.ctx.display(source),
                span: expr.span,
                note: None,
            });
        }
        ok
    }

    fn fresh_view(&mut self, target: TypeId) -> TypeId {
        let members = union_members_named(self.ctx, target);
        let mut changed = false;
        let mut out = Vec::with_capacity(members.len());
        for member in members {
            let evaluated = evaluate(self.ctx, member);
            match self.ctx.resolve(evaluated).as_object().cloned() {
                Some(obj) => {
                    let props = obj
                        .properties
                        .into_iter()
                        .map(|p| PropertySignature { readonly: true, ..p })
                        .collect();
                    out.push(self.ctx.object_type(props, obj.index_signature));
                    changed = true;
                }
                None => out.push(member),
            }
        }
        if changed {
            self.ctx.union_type(out)
        } else {
            target
        }
    }
}

impl GuardContext for TypeChecker<'_> {
    fn literal_type(&mut self, expr: &Expr) -> Option<TypeId> {
        Some(match &expr.kind {
            ExprKind::String { value } => self.ctx.string_literal(value.clone()),
            ExprKind::Number { value } => self.ctx.number_literal(*value),
            ExprKind::Bool { value } => self.ctx.boolean_literal(*value),
            ExprKind::BigInt { digits } => self.ctx.literal(LiteralValue::BigInt(digits.clone())),
            ExprKind::Null => TypeId::NULL,
            ExprKind::Undefined => TypeId::UNDEFINED,
            _ => return None,
        })
    }

    fn instance_type(&mut self, constructor: &Expr) -> Option<TypeId> {
        let ty = self.expr_types.get(&constructor.id).copied()?;
        let func = self.function_of(ty)?;
        if func.kind != FunctionKind::Construct {
            return None;
        }
        // `x instanceof Box` matches every instantiation of `Box`
        let erased: Substitution = func.type_params.iter().map(|&p| (p, TypeId::ANY)).collect();
        Some(substitute(self.ctx, func.return_type, &erased))
    }

    fn call_predicate(&mut self, callee: &Expr) -> Option<TypePredicate> {
        if let Some(predicate) = self.call_predicates.get(&callee.id) {
            return Some(predicate.clone());
        }
        let ty = self.expr_types.get(&callee.id).copied()?;
        self.function_of(ty)?.predicate
    }
}

fn non_nullish() -> TypeGuard {
    TypeGuard::Nullish {
        var: String::new(),
        kind: NullKind::Both,
        negated: true,
    }
}

fn declared_value(scopes: &[Scope], globals: &FxHashMap<String, TypeId>, name: &str) -> Option<TypeId> {
    scopes
        .iter()
        .rev()
        .find_map(|scope| scope.bindings.get(name).map(|b| b.declared))
        .or_else(|| globals.get(name).copied())
}

fn type_param_scope(ctx: &TypeContext, params: &[TypeId]) -> TypeScope {
    params
        .iter()
        .filter_map(|&id| match ctx.resolve(id) {
            Type::TypeParam(TypeParam { name, .. }) => Some((name.clone(), id)),
            _ => None,
        })
        .collect()
}

/// Values every unit can see
fn builtin_values(ctx: &mut TypeContext) -> FxHashMap<String, TypeId> {
    let mut values = FxHashMap::default();

    // Array.isArray(value): value is any[]
    let any_array = ctx.array_type(TypeId::ANY);
    let is_array = ctx.function_type(FunctionType {
        type_params: Vec::new(),
        params: vec![ParamSignature {
            name: "value".into(),
            ty: TypeId::UNKNOWN,
            optional: false,
        }],
        rest: None,
        return_type: TypeId::BOOLEAN,
        kind: FunctionKind::Call,
        predicate: Some(TypePredicate {
            param: 0,
            ty: any_array,
            asserts: false,
        }),
    });
    let array = ctx.object_type(vec![PropertySignature::new("isArray", is_array).readonly()], None);
    values.insert("Array".to_string(), array);

    // Promise.resolve<T>(value: T): Promise<T>
    let scope = ctx.fresh_scope();
    let t = ctx.type_param(TypeParam {
        name: "T".into(),
        constraint: None,
        default: None,
        variance: None,
        scope,
    });
    let promise_t = ctx.promise_type(t);
    let mut resolve = FunctionType::new(
        vec![ParamSignature {
            name: "value".into(),
            ty: t,
            optional: false,
        }],
        promise_t,
    );
    resolve.type_params = vec![t];
    let resolve = ctx.function_type(resolve);
    let promise = ctx.object_type(vec![PropertySignature::new("resolve", resolve).readonly()], None);
    values.insert("Promise".to_string(), promise);

    // console.log(...data: any[]): void
    let mut log = FunctionType::new(Vec::new(), TypeId::VOID);
    log.rest = Some(TypeId::ANY);
    let log = ctx.function_type(log);
    let console = ctx.object_type(vec![PropertySignature::new("log", log).readonly()], None);
    values.insert("console".to_string(), console);

    values
}

/// Variables assigned anywhere in `stmts`
fn collect_assigned(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Var { init: Some(e), .. }
            | StmtKind::Expr { expr: e }
            | StmtKind::Throw { value: e }
            | StmtKind::Return { value: Some(e) } => assigned_in_expr(e, out),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                assigned_in_expr(cond, out);
                collect_assigned(then_branch, out);
                if let Some(else_branch) = else_branch {
                    collect_assigned(else_branch, out);
                }
            }
            StmtKind::While { cond, body } => {
                assigned_in_expr(cond, out);
                collect_assigned(body, out);
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                assigned_in_expr(discriminant, out);
                for case in cases {
                    collect_assigned(&case.body, out);
                }
            }
            StmtKind::Block { body } => collect_assigned(body, out),
            _ => {}
        }
    }
}

fn assigned_in_expr(expr: &Expr, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Assign { target, value } => {
            if let Some(name) = target.as_ident() {
                if !out.iter().any(|o| o == name) {
                    out.push(name.to_string());
                }
            }
            assigned_in_expr(value, out);
        }
        ExprKind::Binary { left, right, .. } => {
            assigned_in_expr(left, out);
            assigned_in_expr(right, out);
        }
        ExprKind::Unary { operand: inner, .. }
        | ExprKind::Await { value: inner }
        | ExprKind::NonNull { value: inner }
        | ExprKind::As { value: inner, .. }
        | ExprKind::Member { object: inner, .. } => assigned_in_expr(inner, out),
        ExprKind::Index { object, index } => {
            assigned_in_expr(object, out);
            assigned_in_expr(index, out);
        }
        ExprKind::Call { callee, args, .. } | ExprKind::New { callee, args, .. } => {
            assigned_in_expr(callee, out);
            for arg in args {
                assigned_in_expr(arg, out);
            }
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            assigned_in_expr(cond, out);
            assigned_in_expr(then_expr, out);
            assigned_in_expr(else_expr, out);
        }
        ExprKind::Array { elements } => {
            for element in elements {
                assigned_in_expr(element, out);
            }
        }
        ExprKind::Object { members } => {
            for member in members {
                match member {
                    ObjectMember::Property { value, .. } | ObjectMember::Spread { value } => {
                        assigned_in_expr(value, out)
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ir {
        next: u32,
    }

    impl Ir {
        fn new() -> Self {
            Self { next: 0 }
        }

        fn expr(&mut self, kind: ExprKind) -> Expr {
            self.next += 1;
            Expr::new(ExprId(self.next), kind, Span::default())
        }

        fn ident(&mut self, name: &str) -> Expr {
            self.expr(ExprKind::Ident { name: name.into() })
        }

        fn string(&mut self, value: &str) -> Expr {
            self.expr(ExprKind::String {
                value: value.into(),
            })
        }

        fn number(&mut self, value: f64) -> Expr {
            self.expr(ExprKind::Number { value })
        }
    }

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, Span::default())
    }

    fn var(kind: VarKind, name: &str, ty: Option<TypeExpr>, init: Expr) -> Stmt {
        stmt(StmtKind::Var {
            var_kind: kind,
            name: name.into(),
            ty,
            init: Some(init),
        })
    }

    fn run(statements: Vec<Stmt>) -> (TypeContext, CheckResult) {
        let mut ctx = TypeContext::new();
        let unit = Unit {
            path: "test.gd".into(),
            source: String::new(),
            statements,
        };
        let result = TypeChecker::new(&mut ctx, CheckerOptions::default()).check_unit(&unit);
        (ctx, result)
    }

    #[test]
    fn test_const_keeps_literal_let_widens() {
        let mut ir = Ir::new();
        let a = ir.string("a");
        let b = ir.string("b");
        let (ctx, result) = run(vec![
            var(VarKind::Const, "c", None, a),
            var(VarKind::Let, "l", None, b),
        ]);
        assert!(result.errors.is_empty());
        assert_eq!(ctx.display(result.declarations["c"]), "\"a\"");
        assert_eq!(result.declarations["l"], TypeId::STRING);
    }

    #[test]
    fn test_annotation_mismatch_reported() {
        let mut ir = Ir::new();
        let n = ir.number(1.0);
        let (_, result) = run(vec![var(VarKind::Let, "s", Some(TypeExpr::named("string")), n)]);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            &result.errors[0],
            CheckError::TypeMismatch { expected, actual, .. } if expected == "string" && actual == "1"
        ));
    }

    #[test]
    fn test_undefined_name() {
        let mut ir = Ir::new();
        let missing = ir.ident("nope");
        let (_, result) = run(vec![stmt(StmtKind::Expr { expr: missing })]);
        assert!(matches!(
            &result.errors[..],
            [CheckError::UndefinedName { name, .. }] if name == "nope"
        ));
    }

    #[test]
    fn test_member_access_on_unknown() {
        let mut ir = Ir::new();
        let object = ir.ident("u");
        let access = ir.expr(ExprKind::Member {
            object: Box::new(object),
            property: "length".into(),
        });
        let init = ir.number(1.0);
        let (_, result) = run(vec![
            var(VarKind::Let, "u", Some(TypeExpr::named("unknown")), init),
            stmt(StmtKind::Expr { expr: access }),
        ]);
        assert!(matches!(
            &result.errors[..],
            [CheckError::UnknownProperty { property, ty, .. }] if property == "length" && ty == "unknown"
        ));
    }

    #[test]
    fn test_inferred_return_updates_binding() {
        let mut ir = Ir::new();
        let x = ir.ident("x");
        let f = FunctionDecl {
            name: "id".into(),
            type_params: vec![],
            params: vec![Param::new("x", TypeExpr::named("number"))],
            rest: None,
            return_type: None,
            predicate: None,
            is_async: false,
            body: Some(vec![stmt(StmtKind::Return { value: Some(x) })]),
        };
        let (ctx, result) = run(vec![stmt(StmtKind::Function(f))]);
        assert!(result.errors.is_empty());
        assert_eq!(ctx.display(result.declarations["id"]), "(x: number) => number");
    }

    #[test]
    fn test_assigned_collects_nested() {
        let mut ir = Ir::new();
        let target = ir.ident("i");
        let value = ir.number(1.0);
        let assign = ir.expr(ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        });
        let cond = ir.expr(ExprKind::Bool { value: true });
        let body = vec![stmt(StmtKind::If {
            cond,
            then_branch: vec![stmt(StmtKind::Expr { expr: assign })],
            else_branch: None,
        })];
        let mut out = Vec::new();
        collect_assigned(&body, &mut out);
        assert_eq!(out, vec!["i".to_string()]);
    }
}
