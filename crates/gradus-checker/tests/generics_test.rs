//! Integration tests for generic calls and type-level utilities

mod common;

use common::*;
use gradus_checker::ast::{
    BinaryOp, ExprKind, FunctionDecl, FunctionTypeExpr, Param, Stmt, StmtKind, TypeExpr, TypeParamDecl,
};
use gradus_checker::CheckError;

/// `declare function name<T...>(params): ret`
fn ambient(name: &str, type_params: Vec<TypeParamDecl>, params: Vec<Param>, ret: TypeExpr) -> FunctionDecl {
    let mut decl = function(name, params, Some(ret), vec![]);
    decl.type_params = type_params;
    decl.body = None;
    decl
}

fn function_type(params: Vec<Param>, ret: TypeExpr) -> TypeExpr {
    TypeExpr::Function(Box::new(FunctionTypeExpr {
        type_params: vec![],
        params,
        rest: None,
        return_type: ret,
        predicate: None,
        construct: false,
    }))
}

/// `function identity<T>(x: T): T { return x; }`
fn identity(ir: &mut Ir) -> Stmt {
    let x = ir.ident("x");
    let mut decl = function("identity", vec![Param::new("x", named("T"))], Some(named("T")), vec![ret(x)]);
    decl.type_params = vec![TypeParamDecl::new("T")];
    stmt(StmtKind::Function(decl))
}

#[test]
fn test_identity_infers_widened_argument() {
    let mut ir = Ir::new();
    let decl = identity(&mut ir);
    let arg = ir.number(42.0);
    let call = ir.call_named("identity", vec![arg]);
    let (ctx, result) = check(vec![decl, const_("a", None, call)]);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(ctx.display(result.declarations["a"]), "number");
}

#[test]
fn test_type_param_returned_into_union_containing_it() {
    let mut ir = Ir::new();
    let x = ir.ident("x");
    let mut or_null = function(
        "orNull",
        vec![Param::new("x", named("T"))],
        Some(TypeExpr::union(vec![named("T"), named("null")])),
        vec![ret(x)],
    );
    or_null.type_params = vec![TypeParamDecl::new("T")];
    let y = ir.ident("y");
    let mut settle = function(
        "settle",
        vec![Param::new("y", named("T"))],
        Some(TypeExpr::union(vec![TypeExpr::generic("Promise", vec![named("T")]), named("T")])),
        vec![ret(y)],
    );
    settle.type_params = vec![TypeParamDecl::new("T")];

    let (_, result) = check(vec![stmt(StmtKind::Function(or_null)), stmt(StmtKind::Function(settle))]);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
}

#[test]
fn test_constraint_failure_reported_once() {
    let mut ir = Ir::new();
    let a = ir.ident("a");
    let mut longest = function("longest", vec![Param::new("a", named("T"))], Some(named("T")), vec![ret(a)]);
    longest.type_params =
        vec![TypeParamDecl::new("T").with_constraint(object_type(vec![("length", named("number"))]))];

    let arg = ir.number(10.0);
    let call = ir.call_named("longest", vec![arg]);
    let (_, result) = check(vec![stmt(StmtKind::Function(longest)), expr_stmt(call)]);
    match &result.errors[..] {
        [CheckError::UnresolvedGenericConstraint {
            param, inferred, ..
        }] => {
            assert_eq!(param, "T");
            assert_eq!(inferred, "number");
        }
        other => panic!("expected one constraint failure, got {:?}", other),
    }
}

#[test]
fn test_constraint_satisfied_by_string() {
    let mut ir = Ir::new();
    let a = ir.ident("a");
    let mut longest = function("longest", vec![Param::new("a", named("T"))], Some(named("T")), vec![ret(a)]);
    longest.type_params =
        vec![TypeParamDecl::new("T").with_constraint(object_type(vec![("length", named("number"))]))];

    let arg = ir.string("abc");
    let call = ir.call_named("longest", vec![arg]);
    let (ctx, result) = check(vec![stmt(StmtKind::Function(longest)), const_("s", None, call)]);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(ctx.display(result.declarations["s"]), "string");
}

#[test]
fn test_row_parameter_preserves_extra_fields() {
    let mut ir = Ir::new();
    let point = || object_type(vec![("x", named("number")), ("y", named("number"))]);
    let with_row = || TypeExpr::Intersection {
        members: vec![point(), named("R")],
    };
    let p = ir.ident("p");
    let mut map_point = function(
        "mapPoint",
        vec![
            Param::new("p", with_row()),
            Param::new("f", function_type(vec![Param::new("n", named("number"))], named("number"))),
        ],
        Some(with_row()),
        vec![ret(p)],
    );
    map_point.type_params = vec![TypeParamDecl::new("R")];

    let (one, two, red) = (ir.number(1.0), ir.number(2.0), ir.string("red"));
    let colored = ir.object(vec![("x", one), ("y", two), ("color", red)]);
    let n = ir.ident("n");
    let factor = ir.number(2.0);
    let doubled = ir.binary(BinaryOp::Mul, n, factor);
    let callback = ir.arrow(vec![Param::untyped("n")], doubled);
    let call = ir.call_named("mapPoint", vec![colored, callback]);
    let moved = ir.ident("moved");
    let color = ir.member(moved, "color");
    let color_id = color.id;

    let (ctx, result) = check(vec![
        stmt(StmtKind::Function(map_point)),
        const_("moved", None, call),
        expr_stmt(color),
    ]);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(type_of(&ctx, &result, color_id), "string");
}

#[test]
fn test_callback_typed_from_earlier_argument() {
    let mut ir = Ir::new();
    let map = ambient(
        "map",
        vec![TypeParamDecl::new("T"), TypeParamDecl::new("U")],
        vec![
            Param::new("xs", TypeExpr::array(named("T"))),
            Param::new("f", function_type(vec![Param::new("x", named("T"))], named("U"))),
        ],
        TypeExpr::array(named("U")),
    );

    let (a, bb) = (ir.string("a"), ir.string("bb"));
    let words = ir.expr(ExprKind::Array { elements: vec![a, bb] });
    let s = ir.ident("s");
    let length = ir.member(s, "length");
    let callback = ir.arrow(vec![Param::untyped("s")], length);
    let callback_id = callback.id;
    let call = ir.call_named("map", vec![words, callback]);

    let (ctx, result) = check(vec![stmt(StmtKind::Function(map)), const_("lens", None, call)]);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(type_of(&ctx, &result, callback_id), "(s: string) => number");
    assert_eq!(ctx.display(result.declarations["lens"]), "number[]");
}

#[test]
fn test_explicit_type_arguments() {
    let mut ir = Ir::new();
    let decl = identity(&mut ir);

    let callee = ir.ident("identity");
    let arg = ir.number(1.0);
    let wrong_arg = ir.expr(ExprKind::Call {
        callee: Box::new(callee),
        type_args: vec![named("string")],
        args: vec![arg],
    });
    let callee = ir.ident("identity");
    let arg = ir.string("a");
    let too_many = ir.expr(ExprKind::Call {
        callee: Box::new(callee),
        type_args: vec![named("string"), named("number")],
        args: vec![arg],
    });

    let (_, result) = check(vec![decl, expr_stmt(wrong_arg), expr_stmt(too_many)]);
    assert_eq!(result.errors.len(), 2, "errors: {:?}", result.errors);
    assert!(matches!(
        &result.errors[0],
        CheckError::TypeMismatch { expected, actual, .. } if expected == "string" && actual == "1"
    ));
    assert!(matches!(
        &result.errors[1],
        CheckError::InvalidTypeArguments { expected: 1, actual: 2, .. }
    ));
}

#[test]
fn test_argument_count_checked() {
    let mut ir = Ir::new();
    let decl = identity(&mut ir);
    let call = ir.call_named("identity", vec![]);
    let (_, result) = check(vec![decl, expr_stmt(call)]);
    assert!(matches!(
        &result.errors[..],
        [CheckError::ArgumentCount { expected, actual: 0, .. }] if expected == "1"
    ));
}

fn user_alias() -> Stmt {
    alias(
        "User",
        vec![],
        object_type(vec![
            ("id", named("number")),
            ("name", named("string")),
            ("email", named("string")),
        ]),
    )
}

#[test]
fn test_pick_and_partial() {
    let mut ir = Ir::new();
    let preview = alias(
        "Preview",
        vec![],
        TypeExpr::generic(
            "Pick",
            vec![
                named("User"),
                TypeExpr::union(vec![TypeExpr::string_lit("id"), TypeExpr::string_lit("name")]),
            ],
        ),
    );
    let draft = alias("Draft", vec![], TypeExpr::generic("Partial", vec![named("User")]));

    let (one, ada) = (ir.number(1.0), ir.string("ada"));
    let complete = ir.object(vec![("id", one), ("name", ada)]);
    let two = ir.number(2.0);
    let missing_name = ir.object(vec![("id", two)]);
    let empty = ir.object(vec![]);

    let (_, result) = check(vec![
        user_alias(),
        preview,
        draft,
        const_("p", Some(named("Preview")), complete),
        const_("q", Some(named("Preview")), missing_name),
        const_("d", Some(named("Draft")), empty),
    ]);
    assert_eq!(result.errors.len(), 1, "errors: {:?}", result.errors);
    assert!(matches!(&result.errors[0], CheckError::TypeMismatch { .. }));
}

#[test]
fn test_return_type_of_function_query() {
    let mut ir = Ir::new();
    let make_user = ambient("makeUser", vec![], vec![], named("User"));
    let made = alias(
        "Made",
        vec![],
        TypeExpr::generic(
            "ReturnType",
            vec![TypeExpr::TypeQuery {
                name: "makeUser".into(),
            }],
        ),
    );
    let (id, name, email) = (ir.number(1.0), ir.string("ada"), ir.string("ada@example.com"));
    let value = ir.object(vec![("id", id), ("name", name), ("email", email)]);
    let wrong = ir.string("ada");

    let (_, result) = check(vec![
        user_alias(),
        stmt(StmtKind::Function(make_user)),
        made,
        const_("u", Some(named("Made")), value),
        const_("v", Some(named("Made")), wrong),
    ]);
    assert!(matches!(
        &result.errors[..],
        [CheckError::TypeMismatch { actual, .. }] if actual == "\"ada\""
    ));
}

#[test]
fn test_conditional_infer_alias() {
    let mut ir = Ir::new();
    let element_of = alias(
        "ElementOf",
        vec![TypeParamDecl::new("T")],
        TypeExpr::Conditional {
            check: Box::new(named("T")),
            extends: Box::new(TypeExpr::array(TypeExpr::Infer { name: "U".into() })),
            true_type: Box::new(named("U")),
            false_type: Box::new(named("never")),
        },
    );
    let strings = || TypeExpr::generic("ElementOf", vec![TypeExpr::array(named("string"))]);
    let ok = ir.string("a");
    let bad = ir.number(1.0);

    let (_, result) = check(vec![
        element_of,
        const_("e", Some(strings()), ok),
        const_("f", Some(strings()), bad),
    ]);
    assert!(matches!(
        &result.errors[..],
        [CheckError::TypeMismatch { actual, .. }] if actual == "1"
    ));
}
