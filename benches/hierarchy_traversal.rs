use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use uuid::Uuid;

use subseq_tags::hierarchy::{resolve_ancestors, resolve_descendants};
use subseq_tags::memory::MemoryTagStore;
use subseq_tags::models::{OrganizationId, Tag, TagId};

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// A single-root forest where every tag after the first hangs off a random
/// earlier tag, so parent links always point backwards and never cycle.
fn synthetic_forest(tag_count: usize) -> Vec<Tag> {
    let organization_id = OrganizationId(Uuid::from_u128(1));
    let mut state = 0x1234_5678_9abc_def0u64;
    let mut tags: Vec<Tag> = Vec::with_capacity(tag_count);
    for idx in 0..tag_count {
        let parent_tag_id = if idx == 0 {
            None
        } else {
            Some(tags[(lcg_next(&mut state) as usize) % idx].id)
        };
        tags.push(Tag {
            id: TagId(Uuid::from_u128((idx as u128) + 2)),
            organization_id,
            name: format!("tag-{idx}"),
            parent_tag_id,
        });
    }
    tags
}

fn bench_ancestors(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("resolve_ancestors");
    for tag_count in [1_000usize, 10_000usize] {
        let tags = synthetic_forest(tag_count);
        let store = MemoryTagStore::new();
        store.insert_tags(tags.iter().cloned());

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("random_leaf", format!("{tag_count}t")),
            &(store, tags),
            |b, (store, tags)| {
                let mut seed = 42u64;
                b.to_async(&runtime).iter(|| {
                    let tag = &tags[(lcg_next(&mut seed) as usize) % tags.len()];
                    async move { black_box(resolve_ancestors(store, tag).await) }
                });
            },
        );
    }
    group.finish();
}

fn bench_descendants(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("resolve_descendants");
    for tag_count in [1_000usize, 10_000usize] {
        let tags = synthetic_forest(tag_count);
        let store = MemoryTagStore::new();
        store.insert_tags(tags.iter().cloned());
        let roots = tags[..4].to_vec();

        group.throughput(Throughput::Elements(tag_count as u64));
        group.bench_with_input(
            BenchmarkId::new("from_top_tags", format!("{tag_count}t")),
            &(store, roots),
            |b, (store, roots)| {
                b.to_async(&runtime)
                    .iter(|| async move { black_box(resolve_descendants(store, roots).await) });
            },
        );
    }
    group.finish();
}

criterion_group!(hierarchy_traversal, bench_ancestors, bench_descendants);
criterion_main!(hierarchy_traversal);
