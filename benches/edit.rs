use criterion::{criterion_group, criterion_main, Criterion};
use piecechain::{Config, PieceChain};

const CAP: u64 = 10_000_000;

fn chain() -> PieceChain {
    PieceChain::open(None, Config::default()).unwrap()
}

fn insert(c: &mut Criterion) {
    c.bench_function("insert_start", |bench| {
        let mut pc = chain();
        bench.iter(move || {
            if pc.size() >= CAP {
                pc = chain();
            }
            pc.insert(0, b"a").unwrap();
        });
    });

    c.bench_function("insert_middle", |bench| {
        let mut pc = chain();
        bench.iter(move || {
            if pc.size() >= CAP {
                pc = chain();
            }
            let mid = (pc.size() + 1) / 2;
            pc.insert(mid, b"a").unwrap();
        });
    });

    c.bench_function("insert_end", |bench| {
        let mut pc = chain();
        bench.iter(move || {
            if pc.size() >= CAP {
                pc = chain();
            }
            let end = pc.size();
            pc.insert(end, b"a").unwrap();
        });
    });
}

/// A chain pre-filled to `CAP` bytes by repeatedly inserting a fixed chunk at
/// the front, producing many small pieces the way `remove` benchmarks need.
fn full_chain() -> PieceChain {
    const CHUNK: &[u8] = b"the quick brown fox jumps over the lazy dog\n";
    let mut pc = chain();
    while pc.size() < CAP {
        pc.insert(0, CHUNK).unwrap();
    }
    pc
}

fn remove(c: &mut Criterion) {
    c.bench_function("remove_start", |bench| {
        let mut pc = full_chain();
        bench.iter(move || {
            if pc.is_empty() {
                pc = full_chain();
            }
            pc.delete(0, 1).unwrap();
        });
    });

    c.bench_function("remove_middle", |bench| {
        let mut pc = full_chain();
        bench.iter(move || {
            if pc.is_empty() {
                pc = full_chain();
            }
            let mid = (pc.size() + 1) / 2;
            pc.delete(mid, 1).unwrap();
        });
    });

    c.bench_function("remove_end", |bench| {
        let mut pc = full_chain();
        bench.iter(move || {
            if pc.is_empty() {
                pc = full_chain();
            }
            let end = pc.size();
            pc.delete(end.saturating_sub(1), 1).unwrap();
        });
    });
}

fn commit_undo_redo(c: &mut Criterion) {
    c.bench_function("commit_then_undo_then_redo", |bench| {
        let mut pc = chain();
        bench.iter(move || {
            pc.insert(pc.size(), b"some bytes to commit").unwrap();
            pc.commit().unwrap();
            pc.undo().unwrap();
            pc.redo().unwrap();
        });
    });
}

criterion_group!(benches, insert, remove, commit_undo_redo);
criterion_main!(benches);
