//! Performance benchmarks for attendance transitions and live queries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rollcall::{
    Community, CommunityId, NewPerson, PersonId, Rollcall, RollcallConfig, StoreConfig,
};
use tempfile::TempDir;

fn seed(app: &Rollcall, people: usize) {
    let c1 = CommunityId::parse("C1").unwrap();
    app.store()
        .insert_community(Community::new(c1.clone(), "Launch"))
        .unwrap();
    for i in 0..people {
        app.store()
            .insert_person(NewPerson::new(
                PersonId::parse(format!("P{}", i)).unwrap(),
                c1.clone(),
                "Guest",
                format!("{}", i),
            ))
            .unwrap();
    }
}

/// Benchmark a check-in/check-out cycle with a varying number of live subscribers
fn bench_transition_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("transition_fan_out");

    for subscribers in [0, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let app = Rollcall::in_memory();
                seed(&app, 1);

                let handles: Vec<_> = (0..count)
                    .map(|_| app.subscribe_people(Some("C1")))
                    .collect();

                b.iter(|| {
                    black_box(app.check_in("P0").unwrap());
                    black_box(app.check_out("P0").unwrap());
                    for handle in &handles {
                        while handle.try_recv().is_ok() {}
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark initial snapshot delivery for communities of varying size
fn bench_subscribe_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscribe_snapshot");

    for people in [10, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("people", people), &people, |b, &count| {
            let app = Rollcall::in_memory();
            seed(&app, count);

            b.iter(|| {
                let handle = app.subscribe_people(Some("C1"));
                black_box(handle.recv().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark journaled check-ins on an on-disk store
fn bench_durable_check_in(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let app = Rollcall::open(RollcallConfig {
        store: StoreConfig {
            path: dir.path().join("store"),
            create_if_missing: true,
            sync_interval: 100,
        },
        ..Default::default()
    })
    .unwrap();
    seed(&app, 1);

    c.bench_function("durable_check_in", |b| {
        b.iter(|| black_box(app.check_in("P0").unwrap()));
    });
}

criterion_group!(
    benches,
    bench_transition_fan_out,
    bench_subscribe_snapshot,
    bench_durable_check_in
);
criterion_main!(benches);
