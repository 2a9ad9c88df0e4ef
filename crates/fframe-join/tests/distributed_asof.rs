mod common;

use std::ops::Range;

use fframe_error::FrameError;
use fframe_join::{
    Communicator, ExecutorContext, JoinDescriptor, JoinKind, JoinResult, LocalCluster,
    SingleProcess, asof_join,
};
use fframe_types::{Scalar, StructArray};
use proptest::prelude::*;

use common::{init_tracing, numbered, rows, series};

const BEAD_ID: &str = "ff-distributed-asof";

fn descriptor() -> JoinDescriptor {
    JoinDescriptor::new(JoinKind::Asof).on(["t"]).parallel(true, true)
}

fn partition(len: usize, workers: usize, seeds: &[usize]) -> Vec<Range<usize>> {
    let mut points: Vec<usize> = seeds.iter().take(workers - 1).map(|s| s % (len + 1)).collect();
    points.sort_unstable();
    let mut bounds = Vec::with_capacity(workers + 1);
    bounds.push(0);
    bounds.extend(points);
    bounds.push(len);
    bounds.windows(2).map(|w| w[0]..w[1]).collect()
}

/// Run the as-of join on `workers` threads, rank `r` holding `left[r]` and
/// `right[r]`.
fn run_partitioned(
    left: &[StructArray],
    right: &[StructArray],
) -> Vec<Result<JoinResult, FrameError>> {
    let desc = descriptor();
    LocalCluster::run(left.len(), |worker| {
        let rank = worker.rank();
        let ctx = ExecutorContext::default();
        asof_join(&ctx, worker, &desc, &left[rank], &right[rank])
    })
    .unwrap()
}

fn single_worker(left: &StructArray, right: &StructArray) -> StructArray {
    let ctx = ExecutorContext::default();
    asof_join(&ctx, SingleProcess, &descriptor(), left, right).unwrap().table
}

fn sorted_keys() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-8_i64..8, 0..32).prop_map(|mut v| {
        v.sort_unstable();
        v
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_distributed_asof_equals_single_worker(
        left_keys in sorted_keys(),
        right_keys in sorted_keys(),
        workers in 1_usize..=4,
        left_seeds in prop::collection::vec(any::<usize>(), 3),
        right_seeds in prop::collection::vec(any::<usize>(), 3),
    ) {
        init_tracing();
        let left = numbered("a", &left_keys);
        let right = numbered("b", &right_keys);
        let expected = single_worker(&left, &right);

        let left_parts: Vec<StructArray> = partition(left_keys.len(), workers, &left_seeds)
            .into_iter()
            .map(|r| left.slice(r))
            .collect();
        let right_parts: Vec<StructArray> = partition(right_keys.len(), workers, &right_seeds)
            .into_iter()
            .map(|r| right.slice(r))
            .collect();

        let outputs: Vec<StructArray> = run_partitioned(&left_parts, &right_parts)
            .into_iter()
            .map(|r| r.map(|result| result.table))
            .collect::<Result<_, _>>()
            .unwrap();
        let refs: Vec<&StructArray> = outputs.iter().collect();
        let combined = StructArray::concat(&refs).unwrap();
        prop_assert_eq!(
            rows(&combined),
            rows(&expected),
            "bead_id={} case=distributed_equivalence workers={}",
            BEAD_ID,
            workers
        );
    }
}

#[test]
fn boundary_candidate_travels_from_previous_worker() {
    init_tracing();
    // Rank 1's first left key (5) is answered by rank 0's last right key (4).
    let left = [series("a", &[1, 3]), series("a", &[5, 7])];
    let right = [series("b", &[0, 2, 4]), series("b", &[6, 8])];
    let results: Vec<JoinResult> = run_partitioned(&left, &right)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let rank1 = rows(&results[1].table);
    assert_eq!(rank1[0][2], Scalar::Float(40.0), "bead_id={BEAD_ID} case=boundary");
    assert_eq!(rank1[1][2], Scalar::Float(60.0));
    // Rank 0 ships 4 to rank 1 and keeps 0 and 2; rank 1 ships nothing back.
    assert_eq!(results[0].stats.rows_sent, 1);
    assert_eq!(results[0].stats.rows_received, 2);
    assert_eq!(results[1].stats.rows_sent, 0);
    assert_eq!(results[1].stats.rows_received, 2);
}

#[test]
fn last_equal_right_row_wins_across_partitions() {
    init_tracing();
    // Global right rows: t = [1, 2, 2 | 2, 2, 5], ids 0..6; the run of 2s spans both ranks.
    let right = numbered("b", &[1, 2, 2, 2, 2, 5]);
    let left = numbered("a", &[2, 3]);
    let left_parts = [left.slice(0..1), left.slice(1..2)];
    let right_parts = [right.slice(0..3), right.slice(3..6)];
    let results: Vec<JoinResult> = run_partitioned(&left_parts, &right_parts)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    for (rank, result) in results.iter().enumerate() {
        let out = rows(&result.table);
        assert_eq!(
            out[0][2],
            Scalar::Int(4),
            "bead_id={BEAD_ID} case=duplicate_run_tie rank={rank}"
        );
    }
    let expected = single_worker(&left, &right);
    let refs: Vec<&StructArray> = results.iter().map(|r| &r.table).collect();
    assert_eq!(rows(&StructArray::concat(&refs).unwrap()), rows(&expected));
}

#[test]
fn empty_right_partition_leaves_early_rows_unmatched() {
    init_tracing();
    let left = [series("a", &[-3, 1]), series("a", &[4, 9])];
    let right = [series("b", &[]), series("b", &[2, 5])];
    let results: Vec<JoinResult> = run_partitioned(&left, &right)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let rank0 = rows(&results[0].table);
    assert_eq!(rank0[0][2], Scalar::Null, "bead_id={BEAD_ID} case=no_candidate");
    assert_eq!(rank0[1][2], Scalar::Null);
    let rank1 = rows(&results[1].table);
    assert_eq!(rank1[0][2], Scalar::Float(20.0));
    assert_eq!(rank1[1][2], Scalar::Float(50.0));
}

#[test]
fn worker_leaving_fails_the_collective_for_its_peers() {
    init_tracing();
    // Rank 1 rejects its unsorted right side before entering the exchange.
    let left = [series("a", &[1]), series("a", &[5]), series("a", &[9])];
    let right = [series("b", &[0]), series("b", &[7, 6]), series("b", &[8])];
    let results = run_partitioned(&left, &right);

    assert!(
        matches!(results[1], Err(FrameError::Configuration { .. })),
        "bead_id={BEAD_ID} case=rank1_config"
    );
    for rank in [0, 2] {
        assert!(
            matches!(results[rank], Err(FrameError::DistributedCollectiveFailure { .. })),
            "bead_id={BEAD_ID} case=peer_failure rank={rank} got={:?}",
            results[rank].as_ref().map(|r| r.table.num_rows())
        );
    }
}
