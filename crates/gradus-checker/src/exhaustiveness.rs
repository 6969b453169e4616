//! Exhaustiveness checking for discriminated unions
//!
//! A `switch` narrows its subject case by case. Whatever survives every
//! case is the residual; a switch without `default` over a finite union
//! must leave an empty residual.

use crate::ast::{Expr, ExprKind, SwitchCase, UnaryOp};
use crate::narrowing::{typeof_tag, union_members_named};
use crate::type_guards::{GuardContext, NullKind, TypeGuard};
use gradus_types::{evaluate, PrimitiveType, Type, TypeContext, TypeId};

/// Result of exhaustiveness checking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExhaustivenessResult {
    /// All variants are covered
    Exhaustive,
    /// Unhandled members, rendered for the diagnostic
    NonExhaustive(Vec<String>),
    /// Has a default case, so exhaustive by definition
    HasDefault,
    /// Subject is not a finite union
    NotApplicable,
}

/// What a `switch` discriminates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchSubject {
    /// `switch (x)`
    Var(String),
    /// `switch (x.tag)`
    Field { var: String, field: String },
    /// `switch (typeof x)`
    TypeOf(String),
}

impl SwitchSubject {
    pub fn var(&self) -> &str {
        match self {
            SwitchSubject::Var(var)
            | SwitchSubject::Field { var, .. }
            | SwitchSubject::TypeOf(var) => var,
        }
    }
}

/// Recognize a narrowable switch discriminant
pub fn switch_subject(discriminant: &Expr) -> Option<SwitchSubject> {
    match &discriminant.kind {
        ExprKind::Ident { name } => Some(SwitchSubject::Var(name.clone())),
        ExprKind::Member { object, property } => Some(SwitchSubject::Field {
            var: object.as_ident()?.to_string(),
            field: property.clone(),
        }),
        ExprKind::Unary {
            op: UnaryOp::TypeOf,
            operand,
        } => Some(SwitchSubject::TypeOf(operand.as_ident()?.to_string())),
        _ => None,
    }
}

/// Guard that holds on entry to a clause group, given its `case` tests
pub fn clause_guard(
    subject: &SwitchSubject,
    tests: &[&Expr],
    cx: &mut dyn GuardContext,
) -> TypeGuard {
    tests
        .iter()
        .map(|test| case_guard(subject, test, cx))
        .reduce(|acc, g| {
            if acc.is_opaque() || g.is_opaque() {
                TypeGuard::Opaque
            } else {
                TypeGuard::Or(Box::new(acc), Box::new(g))
            }
        })
        .unwrap_or(TypeGuard::Opaque)
}

fn case_guard(subject: &SwitchSubject, test: &Expr, cx: &mut dyn GuardContext) -> TypeGuard {
    let var = subject.var().to_string();
    match subject {
        SwitchSubject::TypeOf(_) => match &test.kind {
            ExprKind::String { value } => TypeGuard::TypeOf {
                var,
                type_name: value.clone(),
                negated: false,
            },
            _ => TypeGuard::Opaque,
        },
        SwitchSubject::Field { field, .. } => match cx.literal_type(test) {
            Some(value) => TypeGuard::Discriminant {
                var,
                field: field.clone(),
                value,
                negated: false,
            },
            None => TypeGuard::Opaque,
        },
        SwitchSubject::Var(_) => match &test.kind {
            ExprKind::Null => TypeGuard::Nullish {
                var,
                kind: NullKind::Null,
                negated: false,
            },
            ExprKind::Undefined => TypeGuard::Nullish {
                var,
                kind: NullKind::Undefined,
                negated: false,
            },
            _ => match cx.literal_type(test) {
                Some(value) => TypeGuard::Literal {
                    var,
                    value,
                    negated: false,
                },
                None => TypeGuard::Opaque,
            },
        },
    }
}

/// Case clauses grouped so that empty bodies share the next body
pub fn group_cases(cases: &[SwitchCase]) -> Vec<Vec<&SwitchCase>> {
    let mut groups = Vec::new();
    let mut pending = Vec::new();
    for case in cases {
        pending.push(case);
        if !case.body.is_empty() {
            groups.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        groups.push(pending);
    }
    groups
}

/// Check the residual of a `switch` against its subject's declared type
pub fn check_switch_exhaustiveness(
    ctx: &mut TypeContext,
    subject: &SwitchSubject,
    declared: TypeId,
    residual: TypeId,
    has_default: bool,
) -> ExhaustivenessResult {
    if has_default {
        return ExhaustivenessResult::HasDefault;
    }
    if !is_finite(ctx, subject, declared) {
        return ExhaustivenessResult::NotApplicable;
    }
    let missing = describe_residual(ctx, subject, residual);
    if missing.is_empty() {
        ExhaustivenessResult::Exhaustive
    } else {
        ExhaustivenessResult::NonExhaustive(missing)
    }
}

fn is_unit(ctx: &TypeContext, ty: TypeId) -> bool {
    match ctx.resolve(ty) {
        Type::Literal(_) => true,
        Type::Primitive(p) => p.is_nullish() || *p == PrimitiveType::Boolean,
        _ => false,
    }
}

/// Whether enumerating the cases of `declared` can cover it
fn is_finite(ctx: &mut TypeContext, subject: &SwitchSubject, declared: TypeId) -> bool {
    let members = union_members_named(ctx, declared);
    if members.is_empty() {
        return false;
    }
    match subject {
        SwitchSubject::Var(_) => members.iter().all(|&m| {
            let m = evaluate(ctx, m);
            is_unit(ctx, m)
        }),
        SwitchSubject::Field { field, .. } => members
            .iter()
            .all(|&m| discriminant_of(ctx, m, field).is_some()),
        SwitchSubject::TypeOf(_) => members.iter().all(|&m| {
            let m = evaluate(ctx, m);
            typeof_tag(ctx, m).is_some()
        }),
    }
}

/// Literal type of `field` on an object member, if it is a unit type
fn discriminant_of(ctx: &mut TypeContext, member: TypeId, field: &str) -> Option<TypeId> {
    let evaluated = evaluate(ctx, member);
    let field_ty = ctx.resolve(evaluated).as_object()?.read_type(field)?;
    let field_ty = evaluate(ctx, field_ty);
    is_unit(ctx, field_ty).then_some(field_ty)
}

/// Render what is left of a subject after its cases
pub fn describe_residual(ctx: &mut TypeContext, subject: &SwitchSubject, residual: TypeId) -> Vec<String> {
    let members = union_members_named(ctx, residual);
    let mut out: Vec<String> = Vec::new();
    for m in members {
        let text = match subject {
            SwitchSubject::Field { field, .. } => match discriminant_of(ctx, m, field) {
                Some(tag) => ctx.display(tag),
                None => ctx.display(m),
            },
            SwitchSubject::TypeOf(_) => {
                let evaluated = evaluate(ctx, m);
                match typeof_tag(ctx, evaluated) {
                    Some(tag) => format!("\"{}\"", tag),
                    None => ctx.display(m),
                }
            }
            SwitchSubject::Var(_) => ctx.display(m),
        };
        if !out.contains(&text) {
            out.push(text);
        }
    }
    out
}

/// Members left in a value assigned to `never`, named by their shared
/// discriminant when they have one
pub fn describe_members(ctx: &mut TypeContext, ty: TypeId) -> Vec<String> {
    let members = union_members_named(ctx, ty);
    let field = common_discriminant(ctx, &members);
    let subject = match field {
        Some(field) => SwitchSubject::Field {
            var: String::new(),
            field,
        },
        None => SwitchSubject::Var(String::new()),
    };
    describe_residual(ctx, &subject, ty)
}

fn common_discriminant(ctx: &mut TypeContext, members: &[TypeId]) -> Option<String> {
    let first = *members.first()?;
    let first = evaluate(ctx, first);
    let candidates: Vec<String> = ctx
        .resolve(first)
        .as_object()?
        .properties
        .iter()
        .map(|p| p.name.clone())
        .collect();
    candidates
        .into_iter()
        .find(|field| members.iter().all(|&m| discriminant_of(ctx, m, field).is_some()))
}
