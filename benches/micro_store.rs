#![forbid(unsafe_code)]

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use elava::model::{Metadata, Resource, Tags};
use elava::store::MvccStore;
use tempfile::TempDir;
use time::OffsetDateTime;

const BATCH_SIZES: [usize; 3] = [1, 32, 256];

fn micro_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/store");
    group.sample_size(25);
    for batch_size in BATCH_SIZES {
        let mut harness = StoreHarness::new();
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("record_observation_batch", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| harness.observe_batch(batch_size));
            },
        );
    }
    group.finish();
}

fn micro_store_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/store_lookup");
    group.sample_size(25);
    let mut harness = StoreHarness::new();
    harness.observe_batch(1000);
    group.bench_function("get_resource_state", |b| {
        b.iter(|| harness.store.get_resource_state("i-500").expect("state"));
    });
    group.finish();
}

struct StoreHarness {
    _tmpdir: TempDir,
    store: Arc<MvccStore>,
    counter: u64,
}

impl StoreHarness {
    fn new() -> Self {
        let tmpdir = tempfile::tempdir().expect("tmpdir");
        let store = Arc::new(MvccStore::open(tmpdir.path()).expect("open store"));
        Self {
            _tmpdir: tmpdir,
            store,
            counter: 0,
        }
    }

    fn observe_batch(&mut self, count: usize) {
        let resources: Vec<Resource> = (0..count)
            .map(|i| {
                self.counter += 1;
                sample_resource(&format!("i-{}", self.counter + i as u64))
            })
            .collect();
        self.store.record_observation_batch(&resources).expect("record batch");
    }
}

fn sample_resource(id: &str) -> Resource {
    let now = OffsetDateTime::now_utc();
    Resource {
        id: id.to_string(),
        resource_type: "ec2".to_string(),
        provider: "aws".to_string(),
        region: "us-east-1".to_string(),
        account_id: "123456789012".to_string(),
        name: format!("{id}-name"),
        status: "running".to_string(),
        tags: Tags::default(),
        metadata: Metadata::default(),
        created_at: now,
        last_seen_at: now,
        is_orphaned: false,
    }
}

criterion_group!(benches, micro_store, micro_store_lookup);
criterion_main!(benches);
