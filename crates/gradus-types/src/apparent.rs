//! Built-in members of primitives and arrays
//!
//! Only the common surface is modelled; anything else reads as missing.

use crate::context::TypeContext;
use crate::evaluate::evaluate;
use crate::ty::*;

/// Scope reserved for the generic parameters of built-in methods
const BUILTIN_SCOPE: u32 = u32::MAX;

/// Type of `name` read from a value of type `ty`, if `ty` has such a
/// built-in member
pub fn apparent_member(ctx: &mut TypeContext, ty: TypeId, name: &str) -> Option<TypeId> {
    let evaluated = evaluate(ctx, ty);
    let target = ctx.shared(evaluated);
    match target.as_ref() {
        Type::Primitive(PrimitiveType::String)
        | Type::Literal(LiteralValue::String(_))
        | Type::TemplateLiteral(_)
        | Type::StringMapping(_) => string_member(ctx, name),
        Type::Primitive(PrimitiveType::Number) | Type::Literal(LiteralValue::Number(_)) => {
            number_member(ctx, name)
        }
        Type::Primitive(PrimitiveType::Boolean | PrimitiveType::BigInt)
        | Type::Literal(LiteralValue::Boolean(_) | LiteralValue::BigInt(_)) => match name {
            "toString" => Some(method(ctx, &[], TypeId::STRING)),
            _ => None,
        },
        Type::Array(arr) => array_member(ctx, arr.element, name),
        Type::Tuple(tuple) => {
            let mut all: Vec<TypeId> = tuple.elements.iter().map(|e| e.ty).collect();
            all.extend(tuple.rest);
            let element = ctx.union_type(all);
            array_member(ctx, element, name)
        }
        _ => None,
    }
}

fn param(name: &str, ty: TypeId) -> ParamSignature {
    ParamSignature {
        name: name.to_string(),
        ty,
        optional: false,
    }
}

fn optional(name: &str, ty: TypeId) -> ParamSignature {
    ParamSignature {
        name: name.to_string(),
        ty,
        optional: true,
    }
}

fn method(ctx: &mut TypeContext, params: &[ParamSignature], ret: TypeId) -> TypeId {
    ctx.function_type(FunctionType::new(params.to_vec(), ret))
}

fn string_member(ctx: &mut TypeContext, name: &str) -> Option<TypeId> {
    let ty = match name {
        "length" => TypeId::NUMBER,
        "toUpperCase" | "toLowerCase" | "trim" | "toString" => method(ctx, &[], TypeId::STRING),
        "charAt" => method(ctx, &[param("pos", TypeId::NUMBER)], TypeId::STRING),
        "includes" | "startsWith" | "endsWith" => {
            method(ctx, &[param("search", TypeId::STRING)], TypeId::BOOLEAN)
        }
        "indexOf" => method(ctx, &[param("search", TypeId::STRING)], TypeId::NUMBER),
        "slice" => method(
            ctx,
            &[optional("start", TypeId::NUMBER), optional("end", TypeId::NUMBER)],
            TypeId::STRING,
        ),
        "split" => {
            let parts = ctx.array_type(TypeId::STRING);
            method(ctx, &[param("separator", TypeId::STRING)], parts)
        }
        _ => return None,
    };
    Some(ty)
}

fn number_member(ctx: &mut TypeContext, name: &str) -> Option<TypeId> {
    let ty = match name {
        "toFixed" => method(ctx, &[optional("digits", TypeId::NUMBER)], TypeId::STRING),
        "toString" => method(ctx, &[optional("radix", TypeId::NUMBER)], TypeId::STRING),
        _ => return None,
    };
    Some(ty)
}

fn array_member(ctx: &mut TypeContext, element: TypeId, name: &str) -> Option<TypeId> {
    let ty = match name {
        "length" => TypeId::NUMBER,
        "push" => {
            let mut f = FunctionType::new(Vec::new(), TypeId::NUMBER);
            f.rest = Some(element);
            ctx.function_type(f)
        }
        "pop" | "shift" => {
            let maybe = ctx.union_type(vec![element, TypeId::UNDEFINED]);
            method(ctx, &[], maybe)
        }
        "join" => method(ctx, &[optional("separator", TypeId::STRING)], TypeId::STRING),
        "includes" => method(ctx, &[param("value", element)], TypeId::BOOLEAN),
        "indexOf" => method(ctx, &[param("value", element)], TypeId::NUMBER),
        "slice" => {
            let arr = ctx.array_type(element);
            method(
                ctx,
                &[optional("start", TypeId::NUMBER), optional("end", TypeId::NUMBER)],
                arr,
            )
        }
        "concat" => {
            let arr = ctx.array_type(element);
            let mut f = FunctionType::new(Vec::new(), arr);
            f.rest = Some(element);
            ctx.function_type(f)
        }
        "forEach" => {
            let callback = method(
                ctx,
                &[param("value", element), param("index", TypeId::NUMBER)],
                TypeId::VOID,
            );
            method(ctx, &[param("callback", callback)], TypeId::VOID)
        }
        "filter" => {
            let predicate = method(
                ctx,
                &[param("value", element), param("index", TypeId::NUMBER)],
                TypeId::UNKNOWN,
            );
            let arr = ctx.array_type(element);
            method(ctx, &[param("predicate", predicate)], arr)
        }
        "find" => {
            let predicate = method(
                ctx,
                &[param("value", element), param("index", TypeId::NUMBER)],
                TypeId::UNKNOWN,
            );
            let maybe = ctx.union_type(vec![element, TypeId::UNDEFINED]);
            method(ctx, &[param("predicate", predicate)], maybe)
        }
        "some" | "every" => {
            let predicate = method(
                ctx,
                &[param("value", element), param("index", TypeId::NUMBER)],
                TypeId::UNKNOWN,
            );
            method(ctx, &[param("predicate", predicate)], TypeId::BOOLEAN)
        }
        "map" => {
            let u = ctx.type_param(TypeParam {
                name: "U".into(),
                constraint: None,
                default: None,
                variance: None,
                scope: BUILTIN_SCOPE,
            });
            let callback = method(
                ctx,
                &[param("value", element), param("index", TypeId::NUMBER)],
                u,
            );
            let mapped = ctx.array_type(u);
            let mut f = FunctionType::new(vec![param("callback", callback)], mapped);
            f.type_params = vec![u];
            ctx.function_type(f)
        }
        _ => return None,
    };
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_members() {
        let mut ctx = TypeContext::new();
        assert_eq!(apparent_member(&mut ctx, TypeId::STRING, "length"), Some(TypeId::NUMBER));
        let lit = ctx.string_literal("hi");
        let upper = apparent_member(&mut ctx, lit, "toUpperCase").expect("member");
        assert_eq!(ctx.display(upper), "() => string");
        assert!(apparent_member(&mut ctx, TypeId::STRING, "nope").is_none());
    }

    #[test]
    fn test_number_members() {
        let mut ctx = TypeContext::new();
        let fixed = apparent_member(&mut ctx, TypeId::NUMBER, "toFixed").expect("member");
        assert_eq!(ctx.display(fixed), "(digits?: number) => string");
        assert!(apparent_member(&mut ctx, TypeId::NUMBER, "length").is_none());
    }

    #[test]
    fn test_array_members_use_element_type() {
        let mut ctx = TypeContext::new();
        let arr = ctx.array_type(TypeId::STRING);
        let includes = apparent_member(&mut ctx, arr, "includes").expect("member");
        assert_eq!(ctx.display(includes), "(value: string) => boolean");
        let map = apparent_member(&mut ctx, arr, "map").expect("member");
        assert_eq!(
            ctx.display(map),
            "<U>(callback: (value: string, index: number) => U) => U[]"
        );
    }

    #[test]
    fn test_nullish_has_no_members() {
        let mut ctx = TypeContext::new();
        assert!(apparent_member(&mut ctx, TypeId::NULL, "length").is_none());
    }
}
