//! Lowering of type annotations into the type graph
//!
//! Resolves names against type parameters in scope, declared aliases,
//! interfaces and classes, and the built-in utility names. Declarations of
//! a block are registered in two phases so that bodies may refer to any
//! name declared in the same block, including themselves.

use crate::ast::*;
use crate::error::CheckError;
use gradus_types::{
    builtin_arity, FunctionKind, FunctionType, MappedModifier, MappedType, ParamSignature,
    PropertySignature, TemplateSpan, TupleElement, Type, TypeContext, TypeId, TypeParam,
    TypePredicate,
};
use rustc_hash::FxHashMap;

/// Type parameters visible at one nesting level
pub type TypeScope = FxHashMap<String, TypeId>;

/// Resolves `typeof name` queries against the value scope
pub type ValueLookup<'a> = &'a dyn Fn(&str) -> Option<TypeId>;

/// Lowered function signature
#[derive(Debug, Clone)]
pub struct Signature {
    pub func: FunctionType,
    /// False when the return type must be inferred from the body
    pub annotated_return: bool,
}

/// Translates [`TypeExpr`] trees into [`TypeId`]s
pub struct Lowerer<'a> {
    ctx: &'a mut TypeContext,
    outer: &'a [TypeScope],
    inner: Vec<TypeScope>,
    values: ValueLookup<'a>,
    /// Values declared by the block being registered
    local_values: FxHashMap<String, TypeId>,
    errors: &'a mut Vec<CheckError>,
    span: Span,
}

impl<'a> Lowerer<'a> {
    pub fn new(
        ctx: &'a mut TypeContext,
        outer: &'a [TypeScope],
        values: ValueLookup<'a>,
        errors: &'a mut Vec<CheckError>,
        span: Span,
    ) -> Self {
        Self {
            ctx,
            outer,
            inner: Vec::new(),
            values,
            local_values: FxHashMap::default(),
            errors,
            span,
        }
    }

    pub fn push_scope(&mut self) {
        self.inner.push(TypeScope::default());
    }

    pub fn pop_scope(&mut self) {
        self.inner.pop();
    }

    fn bind(&mut self, name: &str, id: TypeId) {
        if self.inner.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.inner.last_mut() {
            scope.insert(name.to_string(), id);
        }
    }

    fn lookup_type_name(&self, name: &str) -> Option<TypeId> {
        self.inner
            .iter()
            .rev()
            .chain(self.outer.iter().rev())
            .find_map(|scope| scope.get(name).copied())
    }

    fn error(&mut self, error: CheckError) {
        self.errors.push(error);
    }

    /// Lower one annotation
    pub fn lower(&mut self, expr: &TypeExpr) -> TypeId {
        match expr {
            TypeExpr::Named { name, args } => self.lower_named(name, args),
            TypeExpr::StringLit { value } => self.ctx.string_literal(value.clone()),
            TypeExpr::NumberLit { value } => self.ctx.number_literal(*value),
            TypeExpr::BoolLit { value } => self.ctx.boolean_literal(*value),
            TypeExpr::Object { properties, index } => {
                let props = properties.iter().map(|p| self.lower_property(p)).collect();
                let index = index.as_ref().map(|i| self.lower(i));
                self.ctx.object_type(props, index)
            }
            TypeExpr::Array { element } => {
                let element = self.lower(element);
                self.ctx.array_type(element)
            }
            TypeExpr::Tuple { elements, rest } => {
                let elements = elements
                    .iter()
                    .map(|e| TupleElement {
                        ty: self.lower(&e.ty),
                        optional: e.optional,
                    })
                    .collect();
                let rest = rest.as_ref().map(|r| self.lower(r));
                self.ctx.tuple_type(elements, rest)
            }
            TypeExpr::Function(func) => self.lower_function_type(func),
            TypeExpr::Union { members } => {
                let members = members.iter().map(|m| self.lower(m)).collect();
                self.ctx.union_type(members)
            }
            TypeExpr::Intersection { members } => {
                let members = members.iter().map(|m| self.lower(m)).collect();
                self.ctx.intersection_type(members)
            }
            TypeExpr::Conditional {
                check,
                extends,
                true_type,
                false_type,
            } => self.lower_conditional(check, extends, true_type, false_type),
            TypeExpr::Infer { name } => self.ctx.infer_placeholder(name.clone()),
            TypeExpr::Mapped {
                param,
                constraint,
                template,
                readonly,
                optional,
            } => {
                let constraint = self.lower(constraint);
                let scope = self.ctx.fresh_scope();
                let param_id = self.ctx.type_param(TypeParam {
                    name: param.clone(),
                    constraint: None,
                    default: None,
                    variance: None,
                    scope,
                });
                self.push_scope();
                self.bind(param, param_id);
                let template = self.lower(template);
                self.pop_scope();
                self.ctx.mapped_type(MappedType {
                    param: param_id,
                    constraint,
                    template,
                    readonly: modifier(*readonly),
                    optional: modifier(*optional),
                })
            }
            TypeExpr::KeyOf { operand } => {
                let operand = self.lower(operand);
                self.ctx.keyof_type(operand)
            }
            TypeExpr::IndexedAccess { object, index } => {
                let object = self.lower(object);
                let index = self.lower(index);
                self.ctx.indexed_access(object, index)
            }
            TypeExpr::TemplateLiteral { parts } => {
                let spans = parts
                    .iter()
                    .map(|part| match part {
                        TemplateTypePart::Text { text } => TemplateSpan::Text(text.clone()),
                        TemplateTypePart::Type { ty } => TemplateSpan::Hole(self.lower(ty)),
                    })
                    .collect();
                self.ctx.template_literal(spans)
            }
            TypeExpr::TypeQuery { name } => match self
                .local_values
                .get(name)
                .copied()
                .or_else(|| (self.values)(name))
            {
                Some(ty) => ty,
                None => {
                    self.error(CheckError::UndefinedName {
                        name: name.clone(),
                        span: self.span,
                    });
                    TypeId::ANY
                }
            },
        }
    }

    fn lower_property(&mut self, prop: &PropertyDecl) -> PropertySignature {
        PropertySignature {
            name: prop.name.clone(),
            ty: self.lower(&prop.ty),
            optional: prop.optional,
            readonly: prop.readonly,
        }
    }

    fn lower_named(&mut self, name: &str, args: &[TypeExpr]) -> TypeId {
        if args.is_empty() {
            if let Some(id) = self.lookup_type_name(name) {
                return id;
            }
            if let Some(id) = primitive_by_name(name) {
                return id;
            }
            if name == "object" {
                return self.ctx.object_type(Vec::new(), None);
            }
        }

        let lowered: Vec<TypeId> = args.iter().map(|a| self.lower(a)).collect();

        if self.ctx.has_alias(name) {
            return match self.ctx.instantiate_alias(name, lowered) {
                Ok(id) => id,
                Err(err) => {
                    self.error(CheckError::from_type_error(err, self.span));
                    TypeId::ANY
                }
            };
        }

        match name {
            "Promise" | "Array" | "ReadonlyArray" => {
                if lowered.len() != 1 {
                    self.error(CheckError::InvalidTypeArguments {
                        name: name.to_string(),
                        expected: 1,
                        actual: lowered.len(),
                        span: self.span,
                    });
                    return TypeId::ANY;
                }
                return if name == "Promise" {
                    self.ctx.promise_type(lowered[0])
                } else {
                    self.ctx.array_type(lowered[0])
                };
            }
            _ => {}
        }

        match builtin_arity(name) {
            Some(arity) if arity == lowered.len() => self.ctx.reference(name, lowered),
            Some(arity) => {
                self.error(CheckError::InvalidTypeArguments {
                    name: name.to_string(),
                    expected: arity,
                    actual: lowered.len(),
                    span: self.span,
                });
                TypeId::ANY
            }
            None => {
                self.error(CheckError::UndefinedType {
                    name: name.to_string(),
                    span: self.span,
                });
                TypeId::ANY
            }
        }
    }

    fn lower_conditional(
        &mut self,
        check: &TypeExpr,
        extends: &TypeExpr,
        true_type: &TypeExpr,
        false_type: &TypeExpr,
    ) -> TypeId {
        let check_id = self.lower(check);
        // Only a bare type parameter distributes; `[T] extends [U]` does not
        let distributive = matches!(check, TypeExpr::Named { args, .. } if args.is_empty())
            && matches!(self.ctx.resolve(check_id), Type::TypeParam(_));

        let mut infer_names = Vec::new();
        collect_infer_names(extends, &mut infer_names);

        self.push_scope();
        for name in &infer_names {
            let placeholder = self.ctx.infer_placeholder(name.clone());
            self.bind(name, placeholder);
        }
        let extends_id = self.lower(extends);
        let true_id = self.lower(true_type);
        self.pop_scope();
        let false_id = self.lower(false_type);

        self.ctx
            .conditional(check_id, extends_id, true_id, false_id, distributive)
    }

    /// Create the parameters of a generic declaration in the current scope.
    /// Each bound may mention the parameters declared before it.
    pub fn declare_type_params(&mut self, decls: &[TypeParamDecl]) -> Vec<TypeId> {
        if decls.is_empty() {
            return Vec::new();
        }
        let scope = self.ctx.fresh_scope();
        let mut ids = Vec::with_capacity(decls.len());
        for decl in decls {
            let constraint = decl.constraint.as_ref().map(|c| self.lower(c));
            let default = decl.default.as_ref().map(|d| self.lower(d));
            let id = self.ctx.type_param(TypeParam {
                name: decl.name.clone(),
                constraint,
                default,
                variance: decl.variance,
                scope,
            });
            self.bind(&decl.name, id);
            ids.push(id);
        }
        ids
    }

    fn lower_param(&mut self, param: &Param) -> ParamSignature {
        ParamSignature {
            name: param.name.clone(),
            ty: param
                .ty
                .as_ref()
                .map(|t| self.lower(t))
                .unwrap_or(TypeId::ANY),
            optional: param.optional,
        }
    }

    /// Element type of a `...rest` parameter
    fn lower_rest(&mut self, param: &Param) -> TypeId {
        let Some(annotation) = &param.ty else {
            return TypeId::ANY;
        };
        let ty = self.lower(annotation);
        match self.ctx.resolve(ty) {
            Type::Array(arr) => arr.element,
            Type::Any => TypeId::ANY,
            // `...args: P` with P a tuple parameter or `infer P`
            _ => self.ctx.indexed_access(ty, TypeId::NUMBER),
        }
    }

    fn lower_predicate(&mut self, predicate: &PredicateExpr, params: &[Param]) -> Option<TypePredicate> {
        let index = params.iter().position(|p| p.name == predicate.param)?;
        Some(TypePredicate {
            param: index,
            ty: self.lower(&predicate.ty),
            asserts: predicate.asserts,
        })
    }

    pub fn lower_function_type(&mut self, func: &FunctionTypeExpr) -> TypeId {
        self.push_scope();
        let type_params = self.declare_type_params(&func.type_params);
        let params = func.params.iter().map(|p| self.lower_param(p)).collect();
        let rest = func.rest.as_ref().map(|r| self.lower_rest(r));
        let return_type = self.lower(&func.return_type);
        let predicate = func
            .predicate
            .as_ref()
            .and_then(|p| self.lower_predicate(p, &func.params));
        self.pop_scope();

        self.ctx.function_type(FunctionType {
            type_params,
            params,
            rest,
            return_type,
            kind: if func.construct {
                FunctionKind::Construct
            } else {
                FunctionKind::Call
            },
            predicate,
        })
    }

    /// Signature of a function declaration. Type parameters stay bound in a
    /// scope the caller must pop.
    pub fn lower_signature(&mut self, decl: &FunctionDecl) -> Signature {
        self.push_scope();
        let type_params = self.declare_type_params(&decl.type_params);
        let params = decl.params.iter().map(|p| self.lower_param(p)).collect();
        let rest = decl.rest.as_ref().map(|r| self.lower_rest(r));
        let predicate = decl
            .predicate
            .as_ref()
            .and_then(|p| self.lower_predicate(p, &decl.params));
        let (return_type, annotated_return) = match (&decl.return_type, &predicate) {
            (Some(ty), _) => (self.lower(ty), true),
            (None, Some(p)) if p.asserts => (TypeId::VOID, true),
            (None, Some(_)) => (TypeId::BOOLEAN, true),
            (None, None) => (TypeId::ANY, false),
        };
        self.pop_scope();

        Signature {
            func: FunctionType {
                type_params,
                params,
                rest,
                return_type,
                kind: FunctionKind::Call,
                predicate,
            },
            annotated_return,
        }
    }

    /// Register every type, class and function declared directly in
    /// `stmts`. Returns the value bindings introduced (functions and class
    /// constructors).
    #[tracing::instrument(level = "debug", skip_all, fields(statements = stmts.len()))]
    pub fn declare_block(&mut self, stmts: &[Stmt]) -> Vec<(String, TypeId)> {
        // Phase 1: names and arities, so any body or bound can refer to them
        for stmt in stmts {
            if let Some((name, decls)) = type_declaration(stmt) {
                let scope = self.ctx.fresh_scope();
                let params = decls
                    .iter()
                    .map(|d| {
                        self.ctx.type_param(TypeParam {
                            name: d.name.clone(),
                            constraint: None,
                            default: d.default.as_ref().map(|_| TypeId::UNKNOWN),
                            variance: d.variance,
                            scope,
                        })
                    })
                    .collect();
                self.ctx.declare_alias(name, params);
            }
        }

        // Phase 1b: real parameters with their bounds and defaults
        let mut params_of: FxHashMap<String, Vec<(String, TypeId)>> = FxHashMap::default();
        for stmt in stmts {
            if let Some((name, decls)) = type_declaration(stmt) {
                self.span = stmt.span;
                self.push_scope();
                let ids = self.declare_type_params(decls);
                self.pop_scope();
                self.ctx.declare_alias(name, ids.clone());
                let named = decls.iter().map(|d| d.name.clone()).zip(ids).collect();
                params_of.insert(name.to_string(), named);
            }
        }

        // Phase 2: function signatures, visible to `typeof` in type bodies
        let mut values = Vec::new();
        for stmt in stmts {
            if let StmtKind::Function(decl) = &stmt.kind {
                self.span = stmt.span;
                let sig = self.lower_signature(decl);
                let ty = self.ctx.function_type(sig.func);
                self.local_values.insert(decl.name.clone(), ty);
                values.push((decl.name.clone(), ty));
            }
        }

        // Phase 3: bodies
        for stmt in stmts {
            self.span = stmt.span;
            let Some((name, _)) = type_declaration(stmt) else {
                continue;
            };
            let params = params_of.get(name).cloned().unwrap_or_default();
            self.push_scope();
            for (param_name, id) in &params {
                self.bind(param_name, *id);
            }
            let body = match &stmt.kind {
                StmtKind::TypeAlias { body, .. } => self.lower(body),
                StmtKind::Interface {
                    extends, members, ..
                } => {
                    let mut parts: Vec<TypeId> = extends.iter().map(|e| self.lower(e)).collect();
                    let props = members.iter().map(|m| self.lower_property(m)).collect();
                    parts.push(self.ctx.object_type(props, None));
                    self.ctx.intersection_type(parts)
                }
                StmtKind::Class(class) => {
                    let (instance, constructor) = self.lower_class(class, &params);
                    self.local_values.insert(class.name.clone(), constructor);
                    values.push((class.name.clone(), constructor));
                    instance
                }
                _ => TypeId::ANY,
            };
            self.pop_scope();
            if let Err(err) = self.ctx.define_alias(name, body) {
                self.error(CheckError::from_type_error(err, stmt.span));
            }
        }

        values
    }

    fn lower_class(&mut self, class: &ClassDecl, params: &[(String, TypeId)]) -> (TypeId, TypeId) {
        let mut props: Vec<PropertySignature> = class
            .fields
            .iter()
            .map(|f| PropertySignature {
                name: f.name.clone(),
                ty: self.lower(&f.ty),
                optional: f.optional,
                readonly: f.readonly,
            })
            .collect();
        for method in &class.methods {
            let sig = self.lower_signature(method);
            props.push(PropertySignature::new(
                method.name.clone(),
                self.ctx.function_type(sig.func),
            ));
        }
        let instance = self.ctx.object_type(props, None);

        let param_ids: Vec<TypeId> = params.iter().map(|(_, id)| *id).collect();
        let ctor_params = class
            .constructor
            .as_ref()
            .map(|c| c.params.iter().map(|p| self.lower_param(p)).collect())
            .unwrap_or_default();
        let instance_ref = self.ctx.reference(class.name.clone(), param_ids.clone());
        let constructor = self.ctx.function_type(FunctionType {
            type_params: param_ids,
            params: ctor_params,
            rest: None,
            return_type: instance_ref,
            kind: FunctionKind::Construct,
            predicate: None,
        });
        (instance, constructor)
    }
}

fn modifier(m: ModifierExpr) -> MappedModifier {
    match m {
        ModifierExpr::Preserve => MappedModifier::Preserve,
        ModifierExpr::Add => MappedModifier::Add,
        ModifierExpr::Remove => MappedModifier::Remove,
    }
}

/// Well-known type for a keyword
pub fn primitive_by_name(name: &str) -> Option<TypeId> {
    Some(match name {
        "string" => TypeId::STRING,
        "number" => TypeId::NUMBER,
        "boolean" => TypeId::BOOLEAN,
        "null" => TypeId::NULL,
        "undefined" => TypeId::UNDEFINED,
        "void" => TypeId::VOID,
        "symbol" => TypeId::SYMBOL,
        "bigint" => TypeId::BIGINT,
        "any" => TypeId::ANY,
        "unknown" => TypeId::UNKNOWN,
        "never" => TypeId::NEVER,
        _ => return None,
    })
}

fn type_declaration(stmt: &Stmt) -> Option<(&str, &[TypeParamDecl])> {
    match &stmt.kind {
        StmtKind::TypeAlias {
            name, type_params, ..
        }
        | StmtKind::Interface {
            name, type_params, ..
        } => Some((name, type_params)),
        StmtKind::Class(class) => Some((&class.name, &class.type_params)),
        _ => None,
    }
}

fn collect_infer_names(expr: &TypeExpr, out: &mut Vec<String>) {
    let mut visit = |e: &TypeExpr| collect_infer_names(e, out);
    match expr {
        TypeExpr::Infer { name } => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        TypeExpr::Named { args, .. } => args.iter().for_each(&mut visit),
        TypeExpr::Object { properties, index } => {
            properties.iter().for_each(|p| visit(&p.ty));
            if let Some(index) = index {
                visit(index);
            }
        }
        TypeExpr::Array { element } => visit(element),
        TypeExpr::Tuple { elements, rest } => {
            elements.iter().for_each(|e| visit(&e.ty));
            if let Some(rest) = rest {
                visit(rest);
            }
        }
        TypeExpr::Function(func) => {
            func.params
                .iter()
                .chain(func.rest.iter())
                .filter_map(|p| p.ty.as_ref())
                .for_each(&mut visit);
            visit(&func.return_type);
        }
        TypeExpr::Union { members } | TypeExpr::Intersection { members } => {
            members.iter().for_each(&mut visit)
        }
        TypeExpr::KeyOf { operand } => visit(operand),
        TypeExpr::IndexedAccess { object, index } => {
            visit(object);
            visit(index);
        }
        TypeExpr::TemplateLiteral { parts } => {
            for part in parts {
                if let TemplateTypePart::Type { ty } = part {
                    visit(ty);
                }
            }
        }
        // Nested conditionals bind their own `infer` names
        TypeExpr::Conditional { .. }
        | TypeExpr::Mapped { .. }
        | TypeExpr::StringLit { .. }
        | TypeExpr::NumberLit { .. }
        | TypeExpr::BoolLit { .. }
        | TypeExpr::TypeQuery { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradus_types::evaluate;

    fn no_values(_: &str) -> Option<TypeId> {
        None
    }

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, Span::default())
    }

    #[test]
    fn test_primitives_and_unions() {
        let mut ctx = TypeContext::new();
        let mut errors = Vec::new();
        let mut lowerer = Lowerer::new(&mut ctx, &[], &no_values, &mut errors, Span::default());
        let ty = lowerer.lower(&TypeExpr::union(vec![
            TypeExpr::named("string"),
            TypeExpr::named("null"),
        ]));
        assert_eq!(ctx.display(ty), "string | null");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_undefined_type_reported() {
        let mut ctx = TypeContext::new();
        let mut errors = Vec::new();
        let ty = Lowerer::new(&mut ctx, &[], &no_values, &mut errors, Span::default())
            .lower(&TypeExpr::named("Missing"));
        assert_eq!(ty, TypeId::ANY);
        assert!(matches!(&errors[0], CheckError::UndefinedType { name, .. } if name == "Missing"));
    }

    #[test]
    fn test_builtin_arity_checked() {
        let mut ctx = TypeContext::new();
        let mut errors = Vec::new();
        Lowerer::new(&mut ctx, &[], &no_values, &mut errors, Span::default())
            .lower(&TypeExpr::generic("Pick", vec![TypeExpr::named("string")]));
        assert!(matches!(
            &errors[0],
            CheckError::InvalidTypeArguments { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_mutually_recursive_declarations() {
        // interface A { b: B | null }  interface B { a: A }
        let mut ctx = TypeContext::new();
        let mut errors = Vec::new();
        let stmts = vec![
            stmt(StmtKind::Interface {
                name: "A".into(),
                type_params: vec![],
                extends: vec![],
                members: vec![PropertyDecl::new(
                    "b",
                    TypeExpr::union(vec![TypeExpr::named("B"), TypeExpr::named("null")]),
                )],
            }),
            stmt(StmtKind::Interface {
                name: "B".into(),
                type_params: vec![],
                extends: vec![],
                members: vec![PropertyDecl::new("a", TypeExpr::named("A"))],
            }),
        ];
        Lowerer::new(&mut ctx, &[], &no_values, &mut errors, Span::default()).declare_block(&stmts);
        assert!(errors.is_empty());
        let a = ctx.reference("A", vec![]);
        let body = evaluate(&mut ctx, a);
        assert_eq!(ctx.display(body), "{ b: null | B; }");
    }

    #[test]
    fn test_distributive_only_for_naked_parameter() {
        // type D<T> = T extends string ? 1 : 0; type N<T> = [T] extends [string] ? 1 : 0
        let mut ctx = TypeContext::new();
        let mut errors = Vec::new();
        let t = TypeExpr::named("T");
        let one = TypeExpr::NumberLit { value: 1.0 };
        let zero = TypeExpr::NumberLit { value: 0.0 };
        let wrap = |e: TypeExpr| TypeExpr::Tuple {
            elements: vec![TupleElementExpr { ty: e, optional: false }],
            rest: None,
        };
        let stmts = vec![
            stmt(StmtKind::TypeAlias {
                name: "D".into(),
                type_params: vec![TypeParamDecl::new("T")],
                body: TypeExpr::Conditional {
                    check: Box::new(t.clone()),
                    extends: Box::new(TypeExpr::named("string")),
                    true_type: Box::new(one.clone()),
                    false_type: Box::new(zero.clone()),
                },
            }),
            stmt(StmtKind::TypeAlias {
                name: "N".into(),
                type_params: vec![TypeParamDecl::new("T")],
                body: TypeExpr::Conditional {
                    check: Box::new(wrap(t)),
                    extends: Box::new(wrap(TypeExpr::named("string"))),
                    true_type: Box::new(one),
                    false_type: Box::new(zero),
                },
            }),
        ];
        Lowerer::new(&mut ctx, &[], &no_values, &mut errors, Span::default()).declare_block(&stmts);
        let mixed = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER]);
        let d = ctx.reference("D", vec![mixed]);
        let n = ctx.reference("N", vec![mixed]);
        let d = evaluate(&mut ctx, d);
        let n = evaluate(&mut ctx, n);
        let one = ctx.number_literal(1.0);
        let zero = ctx.number_literal(0.0);
        let mut members = ctx.union_members(d);
        members.sort();
        let mut expected = vec![one, zero];
        expected.sort();
        assert_eq!(members, expected);
        assert_eq!(n, zero);
    }

    #[test]
    fn test_infer_binds_in_true_branch() {
        // type Unwrap<T> = T extends Promise<infer U> ? U : T
        let mut ctx = TypeContext::new();
        let mut errors = Vec::new();
        let stmts = vec![stmt(StmtKind::TypeAlias {
            name: "Unwrap".into(),
            type_params: vec![TypeParamDecl::new("T")],
            body: TypeExpr::Conditional {
                check: Box::new(TypeExpr::named("T")),
                extends: Box::new(TypeExpr::generic(
                    "Promise",
                    vec![TypeExpr::Infer { name: "U".into() }],
                )),
                true_type: Box::new(TypeExpr::named("U")),
                false_type: Box::new(TypeExpr::named("T")),
            },
        })];
        Lowerer::new(&mut ctx, &[], &no_values, &mut errors, Span::default()).declare_block(&stmts);
        assert!(errors.is_empty());
        let p = ctx.promise_type(TypeId::BOOLEAN);
        let r = ctx.reference("Unwrap", vec![p]);
        assert_eq!(evaluate(&mut ctx, r), TypeId::BOOLEAN);
    }

    #[test]
    fn test_class_declares_constructor_value() {
        let mut ctx = TypeContext::new();
        let mut errors = Vec::new();
        let stmts = vec![stmt(StmtKind::Class(ClassDecl {
            name: "Point".into(),
            type_params: vec![],
            fields: vec![ClassField {
                name: "x".into(),
                ty: TypeExpr::named("number"),
                optional: false,
                readonly: true,
                init: None,
            }],
            constructor: Some(Constructor {
                params: vec![Param::new("x", TypeExpr::named("number"))],
                body: vec![],
            }),
            methods: vec![],
        }))];
        let values = Lowerer::new(&mut ctx, &[], &no_values, &mut errors, Span::default())
            .declare_block(&stmts);
        assert_eq!(values.len(), 1);
        assert_eq!(ctx.display(values[0].1), "new (x: number) => Point");
    }
}
