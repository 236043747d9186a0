//! Benchmarks for batch construction
//!
//! Benchmarks:
//! - Per-index nonce assignment, signing and encoding (`sign_batch`)
//! - Full construction graph against the scripted engine
//!
//! The graph benchmark drives the async pipeline on a current-thread
//! runtime so Criterion can time it synchronously.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use txflow::operation::OperationQueue;
use txflow::signer::Ed25519SigningWrapper;
use txflow::test_utils::{
    genesis_hash, recipient, scripted_substrate_engine, substrate_factory, test_account, test_coder,
    transfer_closure, MockSigner,
};
use txflow::tx_builder::{
    sign_batch, ExtrinsicBuilder, ExtrinsicSenderResolution, ImmortalEraOperationFactory, ResolvedBuilders,
};
use txflow::types::RuntimeCall;

fn resolved(count: usize) -> ResolvedBuilders {
    ResolvedBuilders {
        resolution: ExtrinsicSenderResolution::current(test_account()),
        builders: (0..count)
            .map(|i| ExtrinsicBuilder::new(100, 1, genesis_hash()).adding_call(RuntimeCall::transfer(&recipient(), i as u128)))
            .collect(),
    }
}

fn bench_sign_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("sign_batch");
    let coder = test_coder();
    let signer = MockSigner::new();

    for size in [1usize, 16, 128] {
        let indexes: Vec<usize> = (0..size).collect();
        group.bench_with_input(BenchmarkId::new("mock_signer", size), &size, |b, &size| {
            b.iter(|| {
                let result = sign_batch(resolved(size), &indexes, black_box(42), &signer, &coder);
                black_box(result.succeeded())
            })
        });
    }

    // Real ed25519 signatures; the sender must be the key's own account
    let key = Ed25519SigningWrapper::from_seed(&[9u8; 32]).unwrap();
    let indexes: Vec<usize> = (0..16).collect();
    group.bench_function("ed25519_16", |b| {
        b.iter(|| {
            let resolved = ResolvedBuilders {
                resolution: ExtrinsicSenderResolution::current(key.chain_account()),
                ..resolved(16)
            };
            black_box(sign_batch(resolved, &indexes, 0, &key, &coder).succeeded())
        })
    });

    group.finish();
}

fn bench_construction_graph(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let engine = scripted_substrate_engine(0);
    let factory = substrate_factory(engine, Arc::new(ImmortalEraOperationFactory));
    let queue = OperationQueue::with_handle(8, rt.handle().clone());
    let signer = Arc::new(MockSigner::new());

    c.bench_function("construction_graph_8", |b| {
        b.iter(|| {
            rt.block_on(async {
                let wrapper = factory.create_extrinsics_operation(transfer_closure(), (0..8).collect(), signer.clone());
                queue.add_compound(&wrapper).unwrap();
                black_box(wrapper.target().wait().await.unwrap().succeeded())
            })
        })
    });
}

criterion_group!(benches, bench_sign_batch, bench_construction_graph);
criterion_main!(benches);
