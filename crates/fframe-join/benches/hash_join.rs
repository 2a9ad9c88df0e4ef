use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fframe_join::{
    ExecutorContext, HashJoinOperator, JoinDescriptor, JoinKind, PhysicalOperator, SingleProcess,
    asof_join,
};
use fframe_types::{Array, DataType, Field, StructArray};

#[derive(Clone, Debug)]
struct JoinFixture {
    left: StructArray,
    right: StructArray,
}

fn keyed(rows: usize, key_stride: i64, payload: &str) -> StructArray {
    let keys = (0..rows).map(|i| Some(i64::try_from(i).unwrap_or(i64::MAX) * key_stride));
    let values = (0..rows).map(|i| Some(i as f64 * 0.25));
    StructArray::from_fields(vec![
        (Field::new("k", DataType::Int64, false), Array::Int64(keys.collect())),
        (Field::new(payload, DataType::Float64, false), Array::Float64(values.collect())),
    ])
    .expect("fixture table should be well formed")
}

fn build_fixture(rows: usize) -> JoinFixture {
    // Every second probe key finds two build rows.
    JoinFixture {
        left: keyed(rows, 1, "a"),
        right: StructArray::concat(&[&keyed(rows / 2, 2, "b"), &keyed(rows / 2, 2, "b")])
            .expect("fixture halves share a schema"),
    }
}

fn bench_hash_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_join_build_probe");
    let ctx = ExecutorContext::default();

    for rows in [4_096_usize, 65_536_usize] {
        let fixture = build_fixture(rows);
        group.throughput(Throughput::Elements(u64::try_from(rows).unwrap_or(u64::MAX)));
        for kind in [JoinKind::Inner, JoinKind::Outer] {
            let desc = JoinDescriptor::new(kind).on(["k"]);
            let op = HashJoinOperator::try_new(&ctx, &desc, &fixture.left, &fixture.right)
                .expect("descriptor should bind");
            group.bench_with_input(BenchmarkId::new(kind.as_str(), rows), &op, |b, op| {
                b.iter(|| {
                    let result = op.execute(&ctx).expect("join should succeed");
                    criterion::black_box(result.table.num_rows());
                });
            });
        }
    }

    group.finish();
}

fn bench_asof_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("asof_merge");
    let ctx = ExecutorContext::default();
    let desc = JoinDescriptor::new(JoinKind::Asof).on(["k"]);

    for rows in [4_096_usize, 65_536_usize] {
        let left = keyed(rows, 3, "a");
        let right = keyed(rows, 2, "b");
        group.throughput(Throughput::Elements(u64::try_from(rows).unwrap_or(u64::MAX)));
        group.bench_function(BenchmarkId::from_parameter(rows), |b| {
            b.iter(|| {
                let result =
                    asof_join(&ctx, SingleProcess, &desc, &left, &right).expect("merge succeeds");
                criterion::black_box(result.stats.matches);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hash_join, bench_asof_merge);
criterion_main!(benches);
