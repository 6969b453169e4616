use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gradus_types::{PropertySignature, SubtypingContext, TypeContext, TypeId};

fn wide_object(ctx: &mut TypeContext, fields: usize) -> TypeId {
    let props = (0..fields)
        .map(|i| PropertySignature::new(format!("f{}", i), TypeId::NUMBER))
        .collect();
    ctx.object_type(props, None)
}

fn bench_width_subtyping(c: &mut Criterion) {
    let mut group = c.benchmark_group("width");

    for fields in [4usize, 32, 128] {
        let mut ctx = TypeContext::new();
        let wide = wide_object(&mut ctx, fields);
        let narrow = wide_object(&mut ctx, fields / 2);
        group.bench_with_input(BenchmarkId::new("object", fields), &fields, |b, _| {
            b.iter(|| SubtypingContext::new(&mut ctx).is_subtype(black_box(wide), black_box(narrow)));
        });
    }

    group.finish();
}

fn bench_recursive_alias(c: &mut Criterion) {
    // type List = { value: number; next: List | null }
    let mut ctx = TypeContext::new();
    let list = ctx.declare_alias("List", vec![]);
    let next = ctx.union_type(vec![list, TypeId::NULL]);
    let body = ctx.object_type(
        vec![
            PropertySignature::new("value", TypeId::NUMBER),
            PropertySignature::new("next", next),
        ],
        None,
    );
    ctx.define_alias("List", body).unwrap();

    ctx.declare_alias("Chain", vec![]);
    let chain = ctx.reference("Chain", vec![]);
    let chain_next = ctx.union_type(vec![chain, TypeId::NULL]);
    let chain_body = ctx.object_type(
        vec![
            PropertySignature::new("value", TypeId::NUMBER),
            PropertySignature::new("next", chain_next),
        ],
        None,
    );
    ctx.define_alias("Chain", chain_body).unwrap();

    c.bench_function("recursive_alias", |b| {
        b.iter(|| SubtypingContext::new(&mut ctx).is_subtype(black_box(list), black_box(chain)));
    });
}

fn bench_union_construction(c: &mut Criterion) {
    c.bench_function("union_of_literals", |b| {
        b.iter(|| {
            let mut ctx = TypeContext::new();
            let members: Vec<TypeId> = (0..64)
                .map(|i| ctx.string_literal(format!("k{}", i)))
                .collect();
            ctx.union_type(black_box(members))
        });
    });
}

criterion_group!(
    benches,
    bench_width_subtyping,
    bench_recursive_alias,
    bench_union_construction
);
criterion_main!(benches);
