use criterion::{criterion_group, criterion_main, Criterion};
use piecechain::{Config, PieceChain};

/// Builds a chain with `pieces` distinct pieces by inserting one chunk at a
/// time rather than in one call, so `iter`/`visit` have real chain-walking
/// work to do instead of degenerating to a single slice.
fn fragmented_chain(pieces: usize) -> PieceChain {
    let mut pc = PieceChain::open(None, Config::default()).unwrap();
    for i in 0..pieces {
        let chunk = format!("chunk-{i:06}-the-quick-brown-fox\n");
        let end = pc.size();
        pc.insert(end, chunk.as_bytes()).unwrap();
        pc.commit().unwrap();
    }
    pc
}

fn iter_next(c: &mut Criterion) {
    let pc = fragmented_chain(10_000);
    let size = pc.size();

    c.bench_function("iter_next", |bench| {
        let start = pc.iter(0, size);
        let mut it = start.clone();
        // Measures a single step; cloning resets to the start once exhausted.
        bench.iter(move || {
            if it.next().is_none() {
                it = start.clone();
            }
        });
    });
}

fn iter_clone(c: &mut Criterion) {
    let pc = fragmented_chain(10_000);
    let size = pc.size();
    let it = pc.iter(0, size);

    c.bench_function("iter_clone", |bench| {
        bench.iter(|| {
            let _clone = it.clone();
        });
    });
}

fn visit_whole_buffer(c: &mut Criterion) {
    let pc = fragmented_chain(10_000);
    let size = pc.size();

    c.bench_function("visit_whole_buffer", |bench| {
        bench.iter(|| {
            let mut total = 0usize;
            pc.visit(0, size, |_, slice| {
                total += slice.len();
                true
            });
            total
        });
    });
}

fn visit_small_window(c: &mut Criterion) {
    let pc = fragmented_chain(10_000);
    let mid = pc.size() / 2;

    c.bench_function("visit_small_window", |bench| {
        bench.iter(|| {
            let mut total = 0usize;
            pc.visit(mid, 64, |_, slice| {
                total += slice.len();
                true
            });
            total
        });
    });
}

fn create_iter(c: &mut Criterion) {
    let pc = fragmented_chain(10_000);
    let size = pc.size();

    c.bench_function("create_iter_10_000_pieces", |bench| {
        bench.iter(|| {
            let _it = pc.iter(0, size);
        });
    });
}

criterion_group!(
    benches,
    iter_next,
    iter_clone,
    visit_whole_buffer,
    visit_small_window,
    create_iter
);
criterion_main!(benches);
