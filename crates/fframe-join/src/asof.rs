//! As-of merge: for every left row, the last right row whose ordering key
//! does not exceed it.
//!
//! Both inputs must be ascending on the single ordering key and free of
//! nulls there. One output row per left row, in left order. When the right
//! side is partitioned across workers, the right rows each worker needs are
//! first gathered through [`crate::shuffle`]; the local pass then runs over
//! the received, still ascending, table.

use std::borrow::Cow;
use std::cmp::Ordering;

use fframe_error::{FrameError, Result};
use fframe_types::{Array, NativeType, NullableArray, StructArray};

use crate::comm::Communicator;
use crate::context::ExecutorContext;
use crate::executor::{JoinResult, JoinStats, RowPairs, assemble, coerce_keys};
use crate::plan::BoundJoin;
use crate::reconcile::coerce_key_column;
use crate::shuffle::{alltoallv, plan_exchange};

/// Match positions for ascending `left` against ascending `right`.
///
/// `None` where no right key is `<=` the left key.
pub fn asof_match_indices<T: PartialOrd>(left: &[T], right: &[T]) -> Vec<Option<usize>> {
    let mut cursor = 0;
    left.iter()
        .map(|l| {
            while cursor < right.len() && right[cursor] <= *l {
                cursor += 1;
            }
            cursor.checked_sub(1)
        })
        .collect()
}

/// Run `$body` with both key arrays bound to the same numeric variant.
macro_rules! with_numeric_keys {
    ($left:expr, $right:expr, $key:expr, |$l:ident, $r:ident| $body:expr) => {
        match ($left, $right) {
            (Array::Int8($l), Array::Int8($r)) => $body,
            (Array::Int16($l), Array::Int16($r)) => $body,
            (Array::Int32($l), Array::Int32($r)) => $body,
            (Array::Int64($l), Array::Int64($r)) => $body,
            (Array::UInt8($l), Array::UInt8($r)) => $body,
            (Array::UInt16($l), Array::UInt16($r)) => $body,
            (Array::UInt32($l), Array::UInt32($r)) => $body,
            (Array::UInt64($l), Array::UInt64($r)) => $body,
            (Array::Float32($l), Array::Float32($r)) => $body,
            (Array::Float64($l), Array::Float64($r)) => $body,
            (l, r) => Err(FrameError::configuration(
                $key,
                format!(
                    "as-of ordering key must be numeric, found {} and {}",
                    l.data_type(),
                    r.data_type()
                ),
            )),
        }
    };
}

fn check_ordering_key<T: NativeType + PartialOrd>(
    key: &str,
    side: &str,
    keys: &NullableArray<T>,
) -> Result<()> {
    let nulls = keys.null_count();
    if nulls > 0 {
        return Err(FrameError::configuration(
            key,
            format!("{side} ordering key has {nulls} null values"),
        ));
    }
    let values = keys.values();
    let out_of_order = values
        .windows(2)
        .position(|w| matches!(w[0].partial_cmp(&w[1]), None | Some(Ordering::Greater)));
    if let Some(pos) = out_of_order {
        return Err(FrameError::configuration(
            key,
            format!(
                "{side} ordering key is not ascending at row {}: {:?} then {:?}",
                pos + 1,
                values[pos],
                values[pos + 1]
            ),
        ));
    }
    Ok(())
}

struct Exchanged {
    right: StructArray,
    rows_sent: usize,
    rows_received: usize,
}

fn exchange_right<T, C>(
    comm: &C,
    left_keys: &NullableArray<T>,
    right_keys: &NullableArray<T>,
    right: &StructArray,
) -> Result<Exchanged>
where
    T: NativeType + PartialOrd,
    C: Communicator,
{
    let values = left_keys.values();
    let window = values.first().zip(values.last()).map(|(lo, hi)| (lo.clone(), hi.clone()));
    let plan = plan_exchange(comm, window, right_keys.values())?;
    let merged = alltoallv(comm, right, &plan)?;
    Ok(Exchanged {
        right: merged,
        rows_sent: plan.sent_to_peers(comm.rank()),
        rows_received: plan.total_received(),
    })
}

/// Run a bound as-of join on this worker's partitions.
///
/// The right rows travel between workers only when the descriptor marks
/// the right side parallel and the group has more than one worker.
pub(crate) fn execute_asof<C: Communicator>(
    ctx: &ExecutorContext,
    comm: &C,
    bound: &BoundJoin,
    left: &StructArray,
    right: &StructArray,
) -> Result<JoinResult> {
    let descriptor = bound.descriptor();
    let left_key = descriptor.left_keys[0].as_str();
    let right_key = descriptor.right_keys[0].as_str();
    let _span = tracing::debug_span!(
        "asof",
        rank = comm.rank(),
        workers = comm.size(),
        left_rows = left.num_rows(),
        right_rows = right.num_rows(),
    )
    .entered();

    bound.check_inputs(left.schema(), right.schema())?;
    let (left_keys, right_keys) = coerce_keys(bound, left, right)?;
    with_numeric_keys!(&left_keys[0], &right_keys[0], left_key, |l, r| {
        check_ordering_key(left_key, "left", l)?;
        check_ordering_key(right_key, "right", r)
    })?;

    let mut stats = JoinStats::default();
    let (bound, right): (Cow<'_, BoundJoin>, Cow<'_, StructArray>) =
        if comm.size() > 1 && descriptor.right_parallel {
            let exchanged = with_numeric_keys!(&left_keys[0], &right_keys[0], left_key, |l, r| {
                exchange_right(comm, l, r, right)
            })?;
            stats.rows_sent = exchanged.rows_sent;
            stats.rows_received = exchanged.rows_received;
            let merged = exchanged.right;
            let bound = if merged.schema() == bound.right_schema() {
                Cow::Borrowed(bound)
            } else {
                Cow::Owned(ctx.bind(descriptor, left.schema(), merged.schema())?)
            };
            (bound, Cow::Owned(merged))
        } else {
            if comm.size() > 1 {
                tracing::debug!("right side is not partitioned; merging locally");
            }
            (Cow::Borrowed(bound), Cow::Borrowed(right))
        };

    let key_type = bound.key_types()[0].data_type;
    let right_keys = vec![coerce_key_column(right.column(bound.right_key_indices()[0]), key_type)?];
    let matches = with_numeric_keys!(&left_keys[0], &right_keys[0], left_key, |l, r| {
        check_ordering_key(right_key, "received right", r)?;
        Ok(asof_match_indices(l.values(), r.values()))
    })?;

    let pairs = RowPairs {
        left: (0..left.num_rows()).map(Some).collect(),
        right: matches,
    };
    let table = assemble(&bound, left, &right, &left_keys, &right_keys, &pairs)?;
    stats.build_rows = right.num_rows();
    stats.probe_rows = left.num_rows();
    stats.matches = pairs.right.iter().filter(|r| r.is_some()).count();
    stats.output_rows = table.num_rows();
    ctx.metrics().record(&stats);
    tracing::debug!(?stats, "as-of merge done");
    Ok(JoinResult {
        table,
        stats,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use fframe_types::{DataType, Field, Scalar};

    use super::*;
    use crate::comm::SingleProcess;
    use crate::descriptor::{JoinDescriptor, JoinKind};

    const BEAD_ASOF: &str = "ff-asof";

    #[test]
    fn match_indices_basic() {
        let got = asof_match_indices(&[1, 3, 5, 7], &[0, 2, 4, 6, 8]);
        assert_eq!(got, vec![Some(0), Some(1), Some(2), Some(3)], "bead_id={BEAD_ASOF} case=basic");
    }

    #[test]
    fn match_indices_edges() {
        assert_eq!(asof_match_indices(&[1, 2], &[5]), vec![None, None]);
        assert_eq!(asof_match_indices::<i32>(&[1, 2], &[]), vec![None, None]);
        // Ties pick the last equal right row.
        assert_eq!(asof_match_indices(&[2], &[1, 2, 2, 3]), vec![Some(2)]);
        assert!(asof_match_indices::<f64>(&[], &[1.0]).is_empty());
    }

    fn series(name: &str, keys: &[Option<i64>]) -> StructArray {
        StructArray::from_fields(vec![
            (
                Field::new("t", DataType::Int64, keys.iter().any(Option::is_none)),
                Array::Int64(keys.iter().copied().collect()),
            ),
            (
                Field::new(name, DataType::Float64, false),
                Array::Float64(keys.iter().map(|k| Some(k.unwrap_or(0) as f64 / 2.0)).collect()),
            ),
        ])
        .unwrap()
    }

    fn run(left: &StructArray, right: &StructArray) -> Result<JoinResult> {
        let ctx = ExecutorContext::default();
        let desc = JoinDescriptor::new(JoinKind::Asof).on(["t"]);
        let bound = ctx.bind(&desc, left.schema(), right.schema())?;
        execute_asof(&ctx, &SingleProcess, &bound, left, right)
    }

    #[test]
    fn local_merge_keeps_left_order() {
        let left = series("a", &[Some(1), Some(3), Some(5)]);
        let right = series("b", &[Some(2), Some(3)]);
        let result = run(&left, &right).unwrap();
        let rows: Vec<_> = (0..3).filter_map(|i| result.table.row(i)).collect();
        assert_eq!(rows[0], vec![Scalar::Int(1), Scalar::Float(0.5), Scalar::Null]);
        assert_eq!(rows[1][2], Scalar::Float(1.5), "bead_id={BEAD_ASOF} case=exact_tie");
        assert_eq!(rows[2][2], Scalar::Float(1.5));
        assert_eq!(result.stats.matches, 2);
        assert!(result.table.schema().fields()[2].is_nullable());
    }

    #[test]
    fn unsorted_or_null_keys_are_configuration_errors() {
        let sorted = series("a", &[Some(1), Some(2)]);
        let unsorted = series("b", &[Some(3), Some(1)]);
        let err = run(&sorted, &unsorted).unwrap_err();
        assert!(err.to_string().contains("not ascending"), "bead_id={BEAD_ASOF} case=unsorted");

        let with_null = series("b", &[Some(1), None]);
        let err = run(&sorted, &with_null).unwrap_err();
        assert!(matches!(err, FrameError::Configuration { .. }), "bead_id={BEAD_ASOF} case=null");
    }
}
