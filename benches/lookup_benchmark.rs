// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::hint::black_box;

use query_profiles::*;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

/// A chain of `depth` profiles, each inheriting the next, with `width` values per profile.
fn registry(depth: usize, width: usize) -> QueryProfileRegistry {
    let mut registry = QueryProfileRegistry::new();
    let mut t = QueryProfileType::new("bench");
    t.add_field(FieldDescription::new("hits", FieldType::Integer).unwrap().with_alias("count"))
        .unwrap();
    registry.register_type(t).unwrap();

    for level in (0..depth).rev() {
        let mut profile = QueryProfile::new(&format!("level{level}"));
        profile.set_type("bench", &registry).unwrap();
        if level + 1 < depth {
            profile.add_inherited(&format!("level{}", level + 1));
        }
        for i in 0..width {
            profile
                .set(&format!("group{level}.key{i}"), i as i64, &registry)
                .unwrap();
        }
        registry.register(profile).unwrap();
    }
    registry
        .set(&format!("level{}", depth - 1), "hits", 10)
        .unwrap();
    registry
}

fn compile_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for depth in [1, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("inheritance depth", depth), depth, |b, &depth| {
            let registry = registry(depth, 32);
            b.iter(|| black_box(registry.compile().unwrap()))
        });
    }
    group.finish();
}

fn request_lookups(c: &mut Criterion) {
    let compiled = registry(16, 32).compile().unwrap();

    c.bench_function("compiled lookup through alias", |b| {
        let profile = compiled.get("level0").unwrap();
        b.iter(|| assert_eq!(profile.get(black_box("count")), Some(Value::from(10))))
    });

    c.bench_function("request override and read", |b| {
        b.iter(|| {
            let mut properties = compiled.properties("level0").unwrap();
            properties.set(black_box("hits"), 3).unwrap();
            assert_eq!(properties.get("count").unwrap(), Some(Value::from(3)));
            black_box(properties.get("group15.key7").unwrap())
        })
    });
}

criterion_group!(benches, compile_registry, request_lookups);
criterion_main!(benches);
