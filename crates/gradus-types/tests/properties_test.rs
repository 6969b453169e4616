use gradus_types::{
    awaited, evaluate, infer_call, substitute, FunctionType, ParamSignature, PropertySignature,
    SubtypingContext, Type, TypeContext, TypeError, TypeId, TypeLimits, TypeParam,
};

fn user(ctx: &mut TypeContext) -> TypeId {
    ctx.object_type(
        vec![
            PropertySignature::new("id", TypeId::NUMBER),
            PropertySignature::new("name", TypeId::STRING),
            PropertySignature::new("email", TypeId::STRING),
        ],
        None,
    )
}

/// type Node = { value: number; children: Node[] }
fn node_alias(ctx: &mut TypeContext, name: &str) -> TypeId {
    let node = ctx.declare_alias(name, vec![]);
    let children = ctx.array_type(node);
    let body = ctx.object_type(
        vec![
            PropertySignature::new("value", TypeId::NUMBER),
            PropertySignature::new("children", children),
        ],
        None,
    );
    ctx.define_alias(name, body).unwrap();
    node
}

fn sample_types(ctx: &mut TypeContext) -> Vec<TypeId> {
    let lit = ctx.string_literal("a");
    let union = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER]);
    let arr = ctx.array_type(union);
    let u = user(ctx);
    let node = node_alias(ctx, "Node");
    let func = ctx.function_type(FunctionType::new(
        vec![ParamSignature {
            name: "x".into(),
            ty: TypeId::NUMBER,
            optional: false,
        }],
        TypeId::STRING,
    ));
    vec![
        TypeId::ANY,
        TypeId::UNKNOWN,
        TypeId::NEVER,
        TypeId::STRING,
        TypeId::NUMBER,
        TypeId::BOOLEAN,
        TypeId::NULL,
        TypeId::UNDEFINED,
        TypeId::VOID,
        lit,
        union,
        arr,
        u,
        node,
        func,
    ]
}

#[test]
fn test_subtyping_is_reflexive() {
    let mut ctx = TypeContext::new();
    for ty in sample_types(&mut ctx) {
        assert!(
            SubtypingContext::new(&mut ctx).is_subtype(ty, ty),
            "{} should be a subtype of itself",
            ctx.display(ty)
        );
    }
}

#[test]
fn test_mutual_subtypes_are_equal() {
    let mut ctx = TypeContext::new();
    let types = sample_types(&mut ctx);
    for &s in &types {
        for &t in &types {
            let mut sub = SubtypingContext::new(&mut ctx);
            if sub.is_subtype(s, t) && sub.is_subtype(t, s) {
                assert!(
                    sub.is_equal(s, t),
                    "{} and {} are mutual subtypes but not equal",
                    ctx.display(s),
                    ctx.display(t)
                );
            }
        }
    }
}

#[test]
fn test_width_subtyping() {
    let mut ctx = TypeContext::new();
    let xyz = ctx.object_type(
        vec![
            PropertySignature::new("x", TypeId::NUMBER),
            PropertySignature::new("y", TypeId::NUMBER),
            PropertySignature::new("z", TypeId::NUMBER),
        ],
        None,
    );
    let x = ctx.object_type(vec![PropertySignature::new("x", TypeId::NUMBER)], None);

    let mut sub = SubtypingContext::new(&mut ctx);
    assert!(sub.is_subtype(xyz, x));
    assert!(!sub.is_subtype(x, xyz));
}

#[test]
fn test_unknown_absorbs_in_union_and_vanishes_in_intersection() {
    let mut ctx = TypeContext::new();
    assert_eq!(
        ctx.union_type(vec![TypeId::UNKNOWN, TypeId::STRING]),
        TypeId::UNKNOWN
    );
    assert_eq!(
        ctx.intersection_type(vec![TypeId::UNKNOWN, TypeId::NUMBER]),
        TypeId::NUMBER
    );
}

#[test]
fn test_promise_flattening() {
    let mut ctx = TypeContext::new();
    let inner = ctx.promise_type(TypeId::NUMBER);
    let outer = ctx.promise_type(inner);
    assert_eq!(outer, inner);
    assert!(matches!(ctx.resolve(outer), Type::Promise(t) if *t == TypeId::NUMBER));

    assert_eq!(awaited(&mut ctx, outer), TypeId::NUMBER);
    let awaited_ref = ctx.reference("Awaited", vec![outer]);
    assert_eq!(evaluate(&mut ctx, awaited_ref), TypeId::NUMBER);
}

#[test]
fn test_row_polymorphic_call_keeps_extra_fields() {
    // function mapPoint<R>(p: { x: number; y: number } & R, f: (n: number) => number):
    //     { x: number; y: number } & R
    let mut ctx = TypeContext::new();
    let scope = ctx.fresh_scope();
    let r = ctx.type_param(TypeParam {
        name: "R".into(),
        constraint: None,
        default: None,
        variance: None,
        scope,
    });
    let point = ctx.object_type(
        vec![
            PropertySignature::new("x", TypeId::NUMBER),
            PropertySignature::new("y", TypeId::NUMBER),
        ],
        None,
    );
    let row = ctx.intersection_type(vec![point, r]);
    let mapper = ctx.function_type(FunctionType::new(
        vec![ParamSignature {
            name: "n".into(),
            ty: TypeId::NUMBER,
            optional: false,
        }],
        TypeId::NUMBER,
    ));
    let mut map_point = FunctionType::new(
        vec![
            ParamSignature {
                name: "p".into(),
                ty: row,
                optional: false,
            },
            ParamSignature {
                name: "f".into(),
                ty: mapper,
                optional: false,
            },
        ],
        row,
    );
    map_point.type_params = vec![r];

    let arg = ctx.object_type(
        vec![
            PropertySignature::new("x", TypeId::NUMBER),
            PropertySignature::new("y", TypeId::NUMBER),
            PropertySignature::new("color", TypeId::STRING),
        ],
        None,
    );
    let solution = infer_call(&mut ctx, &map_point, &[arg, mapper]);
    assert!(solution.failures.is_empty());

    let result = substitute(&mut ctx, map_point.return_type, &solution.substitution);
    let obj = ctx.resolve(result).as_object().cloned().expect("object result");
    let color = obj.property("color").expect("color survives");
    assert_eq!(color.ty, TypeId::STRING);
    assert!(obj.property("x").is_some());
}

#[test]
fn test_utility_type_identities() {
    let mut ctx = TypeContext::new();
    let u = user(&mut ctx);
    let id = ctx.string_literal("id");
    let name = ctx.string_literal("name");
    let email = ctx.string_literal("email");
    let id_or_name = ctx.union_type(vec![id, name]);

    let pick = ctx.reference("Pick", vec![u, id_or_name]);
    let expected_pick = ctx.object_type(
        vec![
            PropertySignature::new("id", TypeId::NUMBER),
            PropertySignature::new("name", TypeId::STRING),
        ],
        None,
    );
    assert_eq!(evaluate(&mut ctx, pick), expected_pick);

    let omit = ctx.reference("Omit", vec![u, email]);
    assert_eq!(evaluate(&mut ctx, omit), expected_pick);

    let a = ctx.string_literal("a");
    let b = ctx.string_literal("b");
    let ab = ctx.union_type(vec![a, b]);
    let record = ctx.reference("Record", vec![ab, TypeId::NUMBER]);
    let expected_record = ctx.object_type(
        vec![
            PropertySignature::new("a", TypeId::NUMBER),
            PropertySignature::new("b", TypeId::NUMBER),
        ],
        None,
    );
    assert_eq!(evaluate(&mut ctx, record), expected_record);
}

#[test]
fn test_cyclic_subtyping_terminates() {
    let mut ctx = TypeContext::new();
    let node = node_alias(&mut ctx, "Node");
    let mut sub = SubtypingContext::new(&mut ctx);
    assert_eq!(sub.check_subtype(node, node), Ok(true));

    let other = node_alias(&mut ctx, "TreeNode");
    let mut sub = SubtypingContext::new(&mut ctx);
    assert_eq!(sub.check_subtype(node, other), Ok(true));
    assert_eq!(sub.check_subtype(other, node), Ok(true));
}

#[test]
fn test_mutually_recursive_aliases() {
    // interface A { b: B | null }  interface B { a: A }
    let mut ctx = TypeContext::new();
    let a = ctx.declare_alias("A", vec![]);
    let b = ctx.declare_alias("B", vec![]);
    let maybe_b = ctx.union_type(vec![b, TypeId::NULL]);
    let a_body = ctx.object_type(vec![PropertySignature::new("b", maybe_b)], None);
    let b_body = ctx.object_type(vec![PropertySignature::new("a", a)], None);
    ctx.define_alias("A", a_body).unwrap();
    ctx.define_alias("B", b_body).unwrap();

    let mut sub = SubtypingContext::new(&mut ctx);
    assert_eq!(sub.check_subtype(a, a), Ok(true));
    assert_eq!(sub.check_subtype(a, b), Ok(false));
}

#[test]
fn test_runaway_expansion_reports_alias_chain() {
    let mut ctx = TypeContext::with_limits(TypeLimits {
        max_depth: 20,
        ..TypeLimits::default()
    });
    let scope = ctx.fresh_scope();
    let x = ctx.type_param(TypeParam {
        name: "X".into(),
        constraint: None,
        default: None,
        variance: None,
        scope,
    });
    ctx.declare_alias("Deep", vec![x]);
    let wrapped = ctx.array_type(x);
    let body = ctx.reference("Deep", vec![wrapped]);
    ctx.define_alias("Deep", body).unwrap();

    let deep = ctx.reference("Deep", vec![TypeId::STRING]);
    let mut sub = SubtypingContext::new(&mut ctx);
    match sub.check_subtype(deep, TypeId::NUMBER) {
        Err(TypeError::DepthExceeded { chain, limit }) => {
            assert_eq!(limit, 20);
            assert!(chain.contains("Deep"));
        }
        other => panic!("expected depth error, got {:?}", other),
    }
}
