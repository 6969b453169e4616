//! Type narrowing engine for control flow analysis
//!
//! Refines the types of variables along the true and false edges of a
//! condition and merges environments at join points.

use crate::type_guards::{NullKind, TypeGuard};
use gradus_types::{
    evaluate, PrimitiveType, PropertySignature, SubtypingContext, Type, TypeContext, TypeId,
};
use rustc_hash::FxHashMap;

/// Type environment at one point of the control flow graph
///
/// Holds the current type of every variable in scope. An unreachable
/// environment (after `return`, `throw` or `break`) contributes nothing at
/// a join.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEnv {
    bindings: FxHashMap<String, TypeId>,
    reachable: bool,
}

impl TypeEnv {
    /// Create a new empty, reachable environment
    pub fn new() -> Self {
        TypeEnv {
            bindings: FxHashMap::default(),
            reachable: true,
        }
    }

    /// Environment of code that cannot execute
    pub fn unreachable() -> Self {
        TypeEnv {
            bindings: FxHashMap::default(),
            reachable: false,
        }
    }

    pub fn get(&self, var: &str) -> Option<TypeId> {
        self.bindings.get(var).copied()
    }

    pub fn set(&mut self, var: impl Into<String>, ty: TypeId) {
        self.bindings.insert(var.into(), ty);
    }

    pub fn remove(&mut self, var: &str) {
        self.bindings.remove(var);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn mark_unreachable(&mut self) {
        self.reachable = false;
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, TypeId)> + '_ {
        self.bindings.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Merge two type environments at a control flow join point
    ///
    /// Each variable gets the union of its types on both sides. A variable
    /// bound on only one side keeps that side's type.
    pub fn merge(&self, other: &TypeEnv, ctx: &mut TypeContext) -> TypeEnv {
        if !other.reachable {
            return self.clone();
        }
        if !self.reachable {
            return other.clone();
        }

        let mut merged = self.clone();
        for (var, &ty) in &other.bindings {
            let joined = match self.bindings.get(var) {
                Some(&mine) if mine == ty => ty,
                Some(&mine) => ctx.union_type(vec![mine, ty]),
                None => ty,
            };
            merged.bindings.insert(var.clone(), joined);
        }
        merged
    }

    /// Merge any number of incoming edges
    pub fn join(envs: &[TypeEnv], ctx: &mut TypeContext) -> TypeEnv {
        envs.iter()
            .fold(TypeEnv::unreachable(), |acc, env| acc.merge(env, ctx))
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment that holds when `guard` is true
pub fn apply_guard(ctx: &mut TypeContext, env: &TypeEnv, guard: &TypeGuard) -> TypeEnv {
    if !env.is_reachable() {
        return env.clone();
    }
    match guard {
        TypeGuard::Opaque => env.clone(),
        TypeGuard::And(a, b) => {
            let first = apply_guard(ctx, env, a);
            apply_guard(ctx, &first, b)
        }
        TypeGuard::Or(a, b) => {
            let left = apply_guard(ctx, env, a);
            let not_a = apply_guard(ctx, env, &a.negate());
            let right = apply_guard(ctx, &not_a, b);
            left.merge(&right, ctx)
        }
        simple => {
            let Some(var) = simple.var() else {
                return env.clone();
            };
            let Some(current) = env.get(var) else {
                return env.clone();
            };
            let narrowed = narrow_type(ctx, current, simple);
            tracing::trace!(
                var,
                from = %ctx.display(current),
                to = %ctx.display(narrowed),
                "applied guard"
            );
            let mut out = env.clone();
            out.set(var, narrowed);
            out
        }
    }
}

/// Refine one type by a single-variable guard
pub fn narrow_type(ctx: &mut TypeContext, ty: TypeId, guard: &TypeGuard) -> TypeId {
    match guard {
        TypeGuard::TypeOf {
            type_name, negated, ..
        } => narrow_typeof(ctx, ty, type_name, *negated),
        TypeGuard::Truthy { negated, .. } => narrow_truthy(ctx, ty, *negated),
        TypeGuard::Nullish { kind, negated, .. } => narrow_nullish(ctx, ty, *kind, *negated),
        TypeGuard::Literal { value, negated, .. } => narrow_literal(ctx, ty, *value, *negated),
        TypeGuard::Discriminant {
            field,
            value,
            negated,
            ..
        } => narrow_discriminant(ctx, ty, field, *value, *negated),
        TypeGuard::In { key, negated, .. } => narrow_in(ctx, ty, key, *negated),
        TypeGuard::InstanceOf {
            instance: target,
            negated,
            ..
        }
        | TypeGuard::Predicate {
            ty: target,
            negated,
            ..
        } => narrow_to_subtype(ctx, ty, *target, *negated),
        TypeGuard::And(..) | TypeGuard::Or(..) | TypeGuard::Opaque => ty,
    }
}

/// Narrowed type of a variable after assigning a value of type `assigned`
///
/// A union declaration narrows to the members the value inhabits; literal
/// members keep the literal, wider members keep the declared member.
pub fn narrow_by_assignment(ctx: &mut TypeContext, declared: TypeId, assigned: TypeId) -> TypeId {
    let declared_members = union_members_named(ctx, declared);
    if declared_members.len() < 2 {
        return declared;
    }
    let mut result = Vec::new();
    for a in ctx.union_members(assigned) {
        let mut sub = SubtypingContext::new(ctx);
        match declared_members.iter().find(|&&d| sub.is_subtype(a, d)) {
            Some(&d) if d == a => result.push(a),
            Some(&d) => result.push(d),
            None => return declared,
        }
    }
    ctx.union_type(result)
}

/// Union members of `ty`, looking through argument-free aliases so member
/// names survive narrowing
pub fn union_members_named(ctx: &mut TypeContext, ty: TypeId) -> Vec<TypeId> {
    let mut out = Vec::new();
    unfold(ctx, ty, &mut out, 0);
    out
}

fn unfold(ctx: &mut TypeContext, ty: TypeId, out: &mut Vec<TypeId>, depth: u32) {
    let body = match ctx.resolve(ty) {
        Type::Union(u) => {
            for m in u.members.clone() {
                unfold(ctx, m, out, depth + 1);
            }
            return;
        }
        Type::Never => return,
        Type::Ref(r) if r.args.is_empty() && depth < ctx.limits().max_depth => {
            ctx.alias(&r.name).and_then(|def| def.body)
        }
        _ => None,
    };
    match body {
        Some(body) if matches!(ctx.resolve(body), Type::Union(_) | Type::Ref(_)) => {
            unfold(ctx, body, out, depth + 1)
        }
        _ => {
            let evaluated = evaluate(ctx, ty);
            match ctx.resolve(evaluated) {
                Type::Union(u) => out.extend(u.members.iter().copied()),
                Type::Never => {}
                _ => out.push(ty),
            }
        }
    }
    out.dedup();
}

/// Members of a union paired with their evaluated form
fn members(ctx: &mut TypeContext, ty: TypeId) -> Vec<(TypeId, TypeId)> {
    union_members_named(ctx, ty)
        .into_iter()
        .map(|m| (m, evaluate(ctx, m)))
        .collect()
}

fn filter(
    ctx: &mut TypeContext,
    ty: TypeId,
    mut keep: impl FnMut(&mut TypeContext, TypeId) -> Option<TypeId>,
) -> TypeId {
    let mut out = Vec::new();
    for (original, evaluated) in members(ctx, ty) {
        if let Some(kept) = keep(ctx, evaluated) {
            out.push(if kept == evaluated { original } else { kept });
        }
    }
    ctx.union_type(out)
}

fn is_top(ctx: &mut TypeContext, ty: TypeId) -> bool {
    let evaluated = evaluate(ctx, ty);
    matches!(ctx.resolve(evaluated), Type::Any | Type::Unknown)
}

/// What a runtime `typeof` reports for values of a member, if it is fixed
pub fn typeof_tag(ctx: &TypeContext, member: TypeId) -> Option<&'static str> {
    match ctx.resolve(member) {
        Type::Primitive(p) => Some(p.typeof_tag()),
        Type::Literal(lit) => Some(lit.base().typeof_tag()),
        Type::TemplateLiteral(_) | Type::StringMapping(_) => Some("string"),
        Type::Function(_) => Some("function"),
        Type::Object(_) | Type::Array(_) | Type::Tuple(_) | Type::Promise(_) => Some("object"),
        _ => None,
    }
}

fn primitive_for_tag(ctx: &mut TypeContext, tag: &str) -> Option<TypeId> {
    Some(match tag {
        "string" => TypeId::STRING,
        "number" => TypeId::NUMBER,
        "boolean" => TypeId::BOOLEAN,
        "bigint" => TypeId::BIGINT,
        "symbol" => TypeId::SYMBOL,
        "undefined" => TypeId::UNDEFINED,
        "object" => {
            let object = ctx.object_type(Vec::new(), None);
            ctx.union_type(vec![object, TypeId::NULL])
        }
        _ => return None,
    })
}

fn narrow_typeof(ctx: &mut TypeContext, ty: TypeId, tag: &str, negated: bool) -> TypeId {
    if is_top(ctx, ty) {
        if negated {
            return ty;
        }
        return primitive_for_tag(ctx, tag).unwrap_or(ty);
    }
    filter(ctx, ty, |ctx, m| match typeof_tag(ctx, m) {
        Some(found) if (found == tag) != negated => Some(m),
        Some(_) => None,
        // Type parameters and other opaque members survive on both edges
        None => Some(m),
    })
}

/// Whether every value of `member` is falsy, some are, or none are
fn falsiness(ctx: &TypeContext, member: TypeId) -> (bool, bool) {
    // (may be truthy, may be falsy)
    match ctx.resolve(member) {
        Type::Primitive(p) if p.is_nullish() => (false, true),
        Type::Primitive(
            PrimitiveType::String | PrimitiveType::Number | PrimitiveType::BigInt | PrimitiveType::Boolean,
        ) => (true, true),
        Type::Primitive(PrimitiveType::Symbol) => (true, false),
        Type::Literal(lit) => (!lit.is_falsy(), lit.is_falsy()),
        Type::Object(_)
        | Type::Array(_)
        | Type::Tuple(_)
        | Type::Function(_)
        | Type::Promise(_) => (true, false),
        _ => (true, true),
    }
}

fn narrow_truthy(ctx: &mut TypeContext, ty: TypeId, negated: bool) -> TypeId {
    if is_top(ctx, ty) {
        return ty;
    }
    filter(ctx, ty, |ctx, m| {
        if m == TypeId::BOOLEAN {
            return Some(if negated { TypeId::FALSE } else { TypeId::TRUE });
        }
        let (truthy, falsy) = falsiness(ctx, m);
        let keep = if negated { falsy } else { truthy };
        keep.then_some(m)
    })
}

fn null_matches(ctx: &TypeContext, member: TypeId, kind: NullKind) -> bool {
    match ctx.resolve(member) {
        Type::Primitive(PrimitiveType::Null) => matches!(kind, NullKind::Null | NullKind::Both),
        Type::Primitive(PrimitiveType::Undefined | PrimitiveType::Void) => {
            matches!(kind, NullKind::Undefined | NullKind::Both)
        }
        _ => false,
    }
}

fn narrow_nullish(ctx: &mut TypeContext, ty: TypeId, kind: NullKind, negated: bool) -> TypeId {
    if is_top(ctx, ty) {
        if negated {
            return ty;
        }
        return match kind {
            NullKind::Null => TypeId::NULL,
            NullKind::Undefined => TypeId::UNDEFINED,
            NullKind::Both => ctx.union_type(vec![TypeId::NULL, TypeId::UNDEFINED]),
        };
    }
    filter(ctx, ty, |ctx, m| {
        let matched = null_matches(ctx, m, kind);
        if matched != negated {
            Some(m)
        } else if !negated && matches!(ctx.resolve(m), Type::TypeParam(_)) {
            Some(m)
        } else {
            None
        }
    })
}

/// `x === value` for a unit type `value`
fn narrow_literal(ctx: &mut TypeContext, ty: TypeId, value: TypeId, negated: bool) -> TypeId {
    if is_top(ctx, ty) {
        return if negated { ty } else { value };
    }
    let value_base = ctx.resolve(value).primitive_base();
    filter(ctx, ty, |ctx, m| {
        if m == value {
            return (!negated).then_some(m);
        }
        if m == TypeId::BOOLEAN && (value == TypeId::TRUE || value == TypeId::FALSE) {
            let other = if value == TypeId::TRUE {
                TypeId::FALSE
            } else {
                TypeId::TRUE
            };
            return Some(if negated { other } else { value });
        }
        let member_type = ctx.resolve(m);
        let widens_value = matches!(member_type, Type::Primitive(_))
            && member_type.primitive_base() == value_base;
        if negated {
            Some(m)
        } else if widens_value {
            Some(value)
        } else if matches!(member_type, Type::TypeParam(_)) {
            Some(m)
        } else {
            None
        }
    })
}

fn narrow_discriminant(
    ctx: &mut TypeContext,
    ty: TypeId,
    field: &str,
    value: TypeId,
    negated: bool,
) -> TypeId {
    if is_top(ctx, ty) {
        return ty;
    }
    filter(ctx, ty, |ctx, m| {
        let field_ty = match ctx.resolve(m) {
            Type::Object(obj) => obj.read_type(field),
            _ => None,
        };
        let Some(field_ty) = field_ty else {
            return negated.then_some(m);
        };
        let field_ty = evaluate(ctx, field_ty);
        if negated {
            // Only a field fixed to exactly `value` is excluded
            (field_ty != value).then_some(m)
        } else {
            SubtypingContext::new(ctx).is_subtype(value, field_ty).then_some(m)
        }
    })
}

fn narrow_in(ctx: &mut TypeContext, ty: TypeId, key: &str, negated: bool) -> TypeId {
    if is_top(ctx, ty) {
        return ty;
    }
    let declared_somewhere = members(ctx, ty).iter().any(|&(_, m)| {
        matches!(ctx.resolve(m), Type::Object(obj) if obj.property(key).is_some())
    });
    if !negated && !declared_somewhere {
        // Nothing names the key, so every object-like member gains it
        let with_key = ctx.object_type(vec![PropertySignature::new(key, TypeId::UNKNOWN)], None);
        return filter(ctx, ty, |ctx, m| {
            let widen = match ctx.resolve(m) {
                Type::Object(obj) => obj.index_signature.is_none(),
                Type::Promise(_) => true,
                Type::Array(_) | Type::Tuple(_) | Type::Function(_) | Type::TypeParam(_) => false,
                _ => return None,
            };
            Some(if widen {
                ctx.intersection_type(vec![m, with_key])
            } else {
                m
            })
        });
    }
    filter(ctx, ty, |ctx, m| match ctx.resolve(m) {
        Type::Object(obj) => {
            let keep = match obj.property(key) {
                Some(prop) if prop.optional => true,
                Some(_) => !negated,
                None => obj.index_signature.is_some() || negated,
            };
            keep.then_some(m)
        }
        Type::Array(_) | Type::Tuple(_) | Type::Function(_) | Type::TypeParam(_) => Some(m),
        _ => negated.then_some(m),
    })
}

/// `instanceof` and user-defined predicates: keep the members that are
/// the target, replace supertypes of the target by the target
fn narrow_to_subtype(ctx: &mut TypeContext, ty: TypeId, target: TypeId, negated: bool) -> TypeId {
    if is_top(ctx, ty) {
        return if negated { ty } else { target };
    }
    filter(ctx, ty, |ctx, m| {
        let mut sub = SubtypingContext::new(ctx);
        let within = sub.is_subtype(m, target);
        if negated {
            return (!within).then_some(m);
        }
        if within {
            Some(m)
        } else if sub.is_subtype(target, m) {
            Some(target)
        } else {
            None
        }
    })
}
