use criterion::{Criterion, black_box, criterion_group, criterion_main};

use passport_core::{RoleRef, guard};

fn bench_guard(c: &mut Criterion) {
    let mut group = c.benchmark_group("guard");

    group.bench_function("short_name", |b| {
        b.iter(|| guard(black_box("Admin")));
    });

    group.bench_function("messy_name", |b| {
        b.iter(|| guard(black_box("  Create $#% Contact -- v2  ")));
    });

    let long_name = "Regional Warehouse Operations Manager ".repeat(8);
    group.bench_function("long_name", |b| {
        b.iter(|| guard(black_box(&long_name)));
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_classify");

    let names = ["admin", "manager", "accountant", "warehouse"];
    group.bench_function("name_list", |b| {
        b.iter(|| RoleRef::classify(black_box(&names)));
    });

    let ids: Vec<String> = (0..4).map(|_| uuid::Uuid::now_v7().to_string()).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    group.bench_function("id_list", |b| {
        b.iter(|| RoleRef::classify(black_box(&id_refs)));
    });

    group.finish();
}

criterion_group!(benches, bench_guard, bench_classify);
criterion_main!(benches);
