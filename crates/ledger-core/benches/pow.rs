use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::{CancelFlag, MiningJob};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn bench_pow(c: &mut Criterion) {
    c.bench_function("mine_block_difficulty_3", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let txs: Vec<String> = (0..10)
            .map(|i| format!("alice-{i} pays bob {}", rng.gen_range(1..10)))
            .collect();
        let cancel = CancelFlag::new();

        b.iter(|| {
            let job = MiningJob::new(txs.clone(), "", 3, 0);
            let _mined = job.run(&cancel);
        });
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
