//! Promise normalization
//!
//! `Promise<Promise<T>>` never exists: construction already flattens one
//! level. The helpers here see through aliases and unions.

use crate::context::TypeContext;
use crate::evaluate::evaluate;
use crate::ty::{Type, TypeId};

/// Recursively unwrap promises, through aliases and across union members
pub fn awaited(ctx: &mut TypeContext, id: TypeId) -> TypeId {
    if !ctx.enter_recursion() {
        return id;
    }
    let evaluated = evaluate(ctx, id);
    let result = match ctx.resolve(evaluated) {
        Type::Promise(inner) => {
            let inner = *inner;
            awaited(ctx, inner)
        }
        Type::Union(u) => {
            let members = u.members.clone();
            let unwrapped: Vec<TypeId> = members.iter().map(|&m| awaited(ctx, m)).collect();
            if unwrapped == members {
                id
            } else {
                ctx.union_type(unwrapped)
            }
        }
        _ => id,
    };
    ctx.leave_recursion();
    result
}

/// Strip exactly one promise layer, per union member
pub fn unwrap_once(ctx: &mut TypeContext, id: TypeId) -> TypeId {
    let evaluated = evaluate(ctx, id);
    match ctx.resolve(evaluated) {
        Type::Promise(inner) => *inner,
        Type::Union(u) => {
            let members = u.members.clone();
            let unwrapped: Vec<TypeId> = members
                .iter()
                .map(|&m| match ctx.resolve(m) {
                    Type::Promise(inner) => *inner,
                    _ => m,
                })
                .collect();
            if unwrapped == members {
                id
            } else {
                ctx.union_type(unwrapped)
            }
        }
        _ => id,
    }
}

/// Return type of an async function whose body produces `body`
pub fn wrap_async_return(ctx: &mut TypeContext, body: TypeId) -> TypeId {
    let inner = unwrap_once(ctx, body);
    ctx.promise_type(inner)
}

/// The `T` in an async function's declared `Promise<T>`. `None` when the
/// declaration is not a promise.
pub fn declared_async_result(ctx: &mut TypeContext, declared: TypeId) -> Option<TypeId> {
    let evaluated = evaluate(ctx, declared);
    match ctx.resolve(evaluated) {
        Type::Promise(inner) => Some(*inner),
        Type::Any => Some(TypeId::ANY),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awaited_unwraps_nested_alias() {
        // type P = Promise<string>; Awaited<Promise<P>>
        let mut ctx = TypeContext::new();
        ctx.declare_alias("P", vec![]);
        let body = ctx.promise_type(TypeId::STRING);
        ctx.define_alias("P", body).expect("define");
        let p = ctx.reference("P", vec![]);
        let outer = ctx.promise_type(p);
        assert_eq!(awaited(&mut ctx, outer), TypeId::STRING);
    }

    #[test]
    fn test_awaited_over_union() {
        let mut ctx = TypeContext::new();
        let p = ctx.promise_type(TypeId::NUMBER);
        let u = ctx.union_type(vec![p, TypeId::STRING]);
        let expected = ctx.union_type(vec![TypeId::NUMBER, TypeId::STRING]);
        assert_eq!(awaited(&mut ctx, u), expected);
    }

    #[test]
    fn test_awaited_of_plain_type_is_identity() {
        let mut ctx = TypeContext::new();
        assert_eq!(awaited(&mut ctx, TypeId::NUMBER), TypeId::NUMBER);
    }

    #[test]
    fn test_async_return_wraps_once() {
        let mut ctx = TypeContext::new();
        let p = ctx.promise_type(TypeId::NUMBER);
        assert_eq!(wrap_async_return(&mut ctx, TypeId::NUMBER), p);
        assert_eq!(wrap_async_return(&mut ctx, p), p);
    }

    #[test]
    fn test_declared_async_result() {
        let mut ctx = TypeContext::new();
        let p = ctx.promise_type(TypeId::STRING);
        assert_eq!(declared_async_result(&mut ctx, p), Some(TypeId::STRING));
        assert_eq!(declared_async_result(&mut ctx, TypeId::STRING), None);
    }
}
