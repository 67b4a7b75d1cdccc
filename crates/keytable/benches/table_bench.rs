use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use keytable::{CursorOptions, DataType, Namespace, TableConfig};
use tempfile::tempdir;

const N: usize = 1_000;

fn table_add_in_memory(c: &mut Criterion) {
    c.bench_function("table_add_memory_1k", |b| {
        b.iter_batched(
            || {
                let ns = Namespace::new();
                let t = ns.create_table(TableConfig::new("Bench")).unwrap();
                (ns, t)
            },
            |(_ns, t)| {
                for i in 0..N {
                    t.add(format!("k{}", i)).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn table_add_journaled(c: &mut Criterion) {
    c.bench_function("table_add_journal_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let ns = Namespace::new();
                let t = ns
                    .create_table(TableConfig::new("Bench").dir(dir.path()))
                    .unwrap();
                (dir, ns, t)
            },
            |(_dir, _ns, t)| {
                for i in 0..N {
                    t.add(format!("k{}", i)).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn table_cursor(c: &mut Criterion) {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Bench")).unwrap();
    for i in 0..10_000 {
        t.add(format!("k{:05}", i)).unwrap();
    }
    c.bench_function("table_prefix_cursor_1k", |b| {
        b.iter(|| {
            t.open_prefix_cursor("k01", CursorOptions::new())
                .unwrap()
                .count()
        });
    });
}

fn table_defrag(c: &mut Criterion) {
    c.bench_function("table_defrag_1k_cells", |b| {
        b.iter_batched(
            || {
                let ns = Namespace::new();
                let t = ns.create_table(TableConfig::new("Bench")).unwrap();
                let col = t.define_column("body", DataType::Text).unwrap();
                for i in 0..N {
                    let id = t.add(format!("k{}", i)).unwrap().id();
                    col.set(id, "x".repeat(64)).unwrap();
                }
                for i in (0..N).step_by(2) {
                    let id = t.get(format!("k{}", i)).unwrap().unwrap().id;
                    col.set(id, "y".repeat(128)).unwrap();
                }
                (ns, t)
            },
            |(_ns, t)| t.defrag(None).unwrap(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    table_add_in_memory,
    table_add_journaled,
    table_cursor,
    table_defrag
);
criterion_main!(benches);
