//! Micro-benchmarks for the B+-tree hot paths: append-heavy growth,
//! random point reads, and mid-tree insertion.

use colonnade_arena::Arena;
use colonnade_btree::bptree::{self, TreeInsertState};
use colonnade_btree::leaf_int;
use colonnade_types::Ref;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

struct Tree {
    root: Ref,
}

impl Tree {
    fn new(arena: &mut Arena) -> Self {
        Self {
            root: leaf_int::create_empty(arena).unwrap(),
        }
    }

    fn insert(&mut self, arena: &mut Arena, ndx: Option<usize>, v: i64) {
        let mut state = TreeInsertState::default();
        let sibling = if bptree::is_inner(arena, self.root).unwrap() {
            bptree::insert(arena, self.root, ndx, &mut state, &mut |a, leaf, i, st| {
                leaf_int::leaf_insert(a, leaf, i, v, st)
            })
            .unwrap()
        } else {
            leaf_int::leaf_insert(arena, self.root, ndx, v, &mut state).unwrap()
        };
        if let Some(sibling) = sibling {
            self.root = bptree::introduce_new_root(arena, self.root, sibling, &state).unwrap();
        }
    }

    fn get(&self, arena: &Arena, ndx: usize) -> i64 {
        let (leaf, rel) = bptree::get_leaf(arena, self.root, ndx).unwrap();
        leaf_int::get(arena, leaf, rel).unwrap()
    }
}

fn grown_tree(n: usize) -> (Arena, Tree) {
    let mut arena = Arena::new();
    let mut tree = Tree::new(&mut arena);
    for v in 0..n as i64 {
        tree.insert(&mut arena, None, v);
    }
    (arena, tree)
}

fn bench_append(c: &mut Criterion) {
    c.bench_function("append_10k", |b| {
        b.iter_batched(
            Arena::new,
            |mut arena| {
                let mut tree = Tree::new(&mut arena);
                for v in 0..10_000i64 {
                    tree.insert(&mut arena, None, v);
                }
                arena
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_point_reads(c: &mut Criterion) {
    let (arena, tree) = grown_tree(50_000);
    let mut ndx = 0usize;
    c.bench_function("point_read_50k", |b| {
        b.iter(|| {
            ndx = (ndx * 31 + 17) % 50_000;
            tree.get(&arena, ndx)
        });
    });
}

fn bench_mid_insert(c: &mut Criterion) {
    c.bench_function("mid_insert_5k", |b| {
        b.iter_batched(
            || grown_tree(5_000),
            |(mut arena, mut tree)| {
                for i in 0..1_000 {
                    tree.insert(&mut arena, Some(i * 3), -1);
                }
                arena
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_append, bench_point_reads, bench_mid_insert);
criterion_main!(benches);
