use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use std::sync::Arc;

use rlock_core::replica::{LocalReplica, StateTransfer};
use rlock_core::types::*;
use rlock_core::{LocalNetwork, ReplicatedLockServer};

fn primary() -> Arc<ReplicatedLockServer> {
    let replica = Arc::new(LocalReplica::new(true));
    ReplicatedLockServer::new(replica, Arc::new(LocalNetwork::new())).unwrap()
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_uncontended_grant_release(c: &mut Criterion) {
    let server = primary();
    let client = ClientId::new("bench:1");
    let lid = LockId(1);
    let mut xid = 0;

    c.bench_function("replicated_grant_release", |b| {
        b.iter(|| {
            xid += 1;
            black_box(server.acquire(lid, &client, xid));
            black_box(server.release(lid, &client, xid));
        })
    });
}

fn bench_duplicate_replay(c: &mut Criterion) {
    let server = primary();
    let client = ClientId::new("bench:1");
    server.acquire(LockId(1), &client, 1);

    c.bench_function("replicated_duplicate_replay", |b| {
        b.iter(|| black_box(server.acquire(LockId(1), &client, black_box(1))))
    });
}

fn bench_serialize_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize_state");

    for locks in [10, 100, 1000] {
        let server = primary();
        for i in 0..locks {
            server.acquire(LockId(i), &ClientId::new(format!("client-{i}")), 1);
        }

        group.bench_with_input(BenchmarkId::new("locks", locks), &locks, |b, _| {
            b.iter(|| black_box(server.serialize_state().unwrap().len()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_uncontended_grant_release,
    bench_duplicate_replay,
    bench_serialize_state
);
criterion_main!(benches);
