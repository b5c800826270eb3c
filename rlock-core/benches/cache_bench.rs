use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use std::sync::Arc;

use rlock_core::error::TransportError;
use rlock_core::local_table::LocalLockTable;
use rlock_core::transport::LockService;
use rlock_core::types::*;
use rlock_core::CachingLockClient;

/// Grants everything; lets the bench measure the client alone.
struct GrantAll;

impl LockService for GrantAll {
    fn acquire(&self, _lid: LockId, _client: &ClientId, _xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(LockStatus::Ok)
    }

    fn release(&self, _lid: LockId, _client: &ClientId, _xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(LockStatus::Ok)
    }

    fn stat(&self, _lid: LockId) -> Result<u64, TransportError> {
        Ok(0)
    }
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_cached_acquire_release(c: &mut Criterion) {
    let client = CachingLockClient::new("bench:1", Arc::new(GrantAll));
    let lid = LockId(1);
    // First acquire fetches the token; every later one is served locally.
    client.acquire(lid).unwrap();
    client.release(lid).unwrap();

    c.bench_function("cached_acquire_release", |b| {
        b.iter(|| {
            client.acquire(black_box(lid)).unwrap();
            client.release(black_box(lid)).unwrap();
        })
    });
}

fn bench_local_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_queue_drain");

    for callers in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(callers), &callers, |b, &callers| {
            b.iter(|| {
                let mut table = LocalLockTable::new();
                let lid = LockId(7);
                let tickets: Vec<_> = (0..callers).map(|_| table.enqueue(lid)).collect();

                table.admit(lid, tickets[0]);
                table.record_xid(lid, 1);
                table.granted(lid);
                for ticket in &tickets[1..] {
                    table.release(lid);
                    table.admit(lid, *ticket);
                }
                black_box(table.release(lid))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cached_acquire_release, bench_local_queue);
criterion_main!(benches);
