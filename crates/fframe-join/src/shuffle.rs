//! Range-driven all-to-all redistribution of sorted right rows.
//!
//! Every worker holds a contiguous, ascending slice of the right input.
//! After the left key ranges of all workers are gathered, each worker
//! decides which of its right rows every peer needs, the counts are
//! exchanged, and the rows themselves travel in one variable-size
//! all-to-all. Pieces are concatenated in source-rank order, so the
//! received table is itself ascending.

use std::ops::Range;

use fframe_error::{FrameError, Result};
use fframe_types::{Field, Schema, StructArray};

use crate::comm::Communicator;

/// Send and receive layout of one exchange.
///
/// `send_offsets[d]` is the first local row shipped to worker `d`;
/// `recv_displs[s]` is where the rows from worker `s` start in the
/// received table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlltoallvPlan {
    pub send_counts: Vec<usize>,
    pub send_offsets: Vec<usize>,
    pub recv_counts: Vec<usize>,
    pub recv_displs: Vec<usize>,
}

impl AlltoallvPlan {
    #[must_use]
    pub fn total_received(&self) -> usize {
        self.recv_counts.iter().sum()
    }

    /// Rows shipped to workers other than `rank`.
    #[must_use]
    pub fn sent_to_peers(&self, rank: usize) -> usize {
        self.send_counts
            .iter()
            .enumerate()
            .filter(|&(d, _)| d != rank)
            .map(|(_, c)| c)
            .sum()
    }
}

/// Exclusive prefix sum.
#[must_use]
pub fn calc_displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect()
}

/// `(below, within)`: keys strictly below `start`, then keys in `[start, end]`.
///
/// `keys` must be ascending.
pub fn count_overlap<T: PartialOrd>(keys: &[T], start: &T, end: &T) -> (usize, usize) {
    let below = keys.iter().take_while(|k| *k < start).count();
    let within = keys[below..]
        .iter()
        .take_while(|k| start <= *k && *k <= end)
        .count();
    (below, within)
}

/// Local rows a worker whose left keys span `window` needs from `keys`.
///
/// Besides the keys inside the window, the last key below it is included:
/// it is the as-of candidate for the window's smallest left keys. A window
/// entirely below the first local key needs nothing, and a window entirely
/// above the last local key needs only the last row.
pub fn send_range<T: PartialOrd>(keys: &[T], window: Option<&(T, T)>) -> Range<usize> {
    let Some((min, max)) = window else {
        return 0..0;
    };
    match keys.first() {
        Some(first) if max >= first => {}
        _ => return 0..0,
    }
    let (below, within) = count_overlap(keys, min, max);
    let start = below.saturating_sub(1);
    start..below + within
}

/// Gather left key ranges and agree on who sends what.
///
/// `left_range` is `None` for an empty left partition. `right_keys` are
/// this worker's ascending right keys.
pub fn plan_exchange<T, C>(
    comm: &C,
    left_range: Option<(T, T)>,
    right_keys: &[T],
) -> Result<AlltoallvPlan>
where
    T: PartialOrd + Clone + Send + 'static,
    C: Communicator,
{
    let ranges = comm.all_gather(left_range)?;
    let mut send_counts = Vec::with_capacity(ranges.len());
    let mut send_offsets = Vec::with_capacity(ranges.len());
    for window in &ranges {
        let range = send_range(right_keys, window.as_ref());
        send_offsets.push(range.start);
        send_counts.push(range.len());
    }
    let recv_counts = comm.all_to_all(send_counts.clone())?;
    let recv_displs = calc_displacements(&recv_counts);
    tracing::debug!(
        rank = comm.rank(),
        ?send_counts,
        ?recv_counts,
        "as-of exchange planned"
    );
    Ok(AlltoallvPlan {
        send_counts,
        send_offsets,
        recv_counts,
        recv_displs,
    })
}

/// Ship `table` rows per `plan` and concatenate what arrives in rank order.
///
/// Pieces whose schemas differ only in nullability are merged under the
/// nullable variant.
pub fn alltoallv<C: Communicator>(
    comm: &C,
    table: &StructArray,
    plan: &AlltoallvPlan,
) -> Result<StructArray> {
    let rank = comm.rank();
    let size = comm.size();
    if plan.send_counts.len() != size || plan.send_offsets.len() != size {
        return Err(FrameError::collective(
            "alltoallv",
            rank,
            format!("plan covers {} workers, group has {size}", plan.send_counts.len()),
        ));
    }
    let _span =
        tracing::debug_span!("asof.alltoallv", rank, rows = table.num_rows()).entered();
    let outgoing: Vec<StructArray> = plan
        .send_offsets
        .iter()
        .zip(&plan.send_counts)
        .map(|(&offset, &count)| table.slice(offset..offset + count))
        .collect();
    let received = comm.all_to_all(outgoing)?;
    for (src, (piece, &expected)) in received.iter().zip(&plan.recv_counts).enumerate() {
        if piece.num_rows() != expected {
            return Err(FrameError::collective(
                "alltoallv",
                rank,
                format!(
                    "worker {src} sent {} rows, announced {expected}",
                    piece.num_rows()
                ),
            ));
        }
    }
    let received = relax_nullability(received)?;
    let parts: Vec<&StructArray> = received.iter().collect();
    StructArray::concat(&parts)
}

fn relax_nullability(pieces: Vec<StructArray>) -> Result<Vec<StructArray>> {
    let Some(first) = pieces.first() else {
        return Ok(pieces);
    };
    if pieces.iter().all(|p| p.schema() == first.schema()) {
        return Ok(pieces);
    }
    let mut fields: Vec<Field> = first.schema().fields().to_vec();
    for piece in &pieces[1..] {
        let other = piece.schema().fields();
        if other.len() != fields.len() {
            return Err(FrameError::arity(format!(
                "exchanged pieces disagree: {} vs {}",
                piece.schema(),
                first.schema()
            )));
        }
        for (field, theirs) in fields.iter_mut().zip(other) {
            if field.name != theirs.name || field.data_type() != theirs.data_type() {
                return Err(FrameError::arity(format!(
                    "exchanged pieces disagree on field {}: {} vs {}",
                    field.name,
                    field.column_type,
                    theirs.column_type
                )));
            }
            if theirs.is_nullable() {
                field.column_type = field.column_type.to_nullable();
            }
        }
    }
    let schema = Schema::try_new(fields)?;
    pieces
        .into_iter()
        .map(|p| {
            if p.schema() == &schema {
                Ok(p)
            } else {
                p.with_schema(schema.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use fframe_types::{Array, DataType, Scalar};

    use super::*;
    use crate::comm::{LocalCluster, SingleProcess};

    const BEAD_SHUF: &str = "ff-asof-shuffle";

    #[test]
    fn displacements_are_exclusive_prefix_sums() {
        assert_eq!(calc_displacements(&[2, 0, 3, 1]), vec![0, 2, 2, 5]);
        assert!(calc_displacements(&[]).is_empty());
    }

    #[test]
    fn overlap_counts() {
        let keys = [1, 2, 2, 4, 6, 9];
        assert_eq!(count_overlap(&keys, &2, &5), (1, 3));
        assert_eq!(count_overlap(&keys, &10, &12), (6, 0));
        assert_eq!(count_overlap(&keys, &0, &0), (0, 0));
    }

    #[test]
    fn send_range_extends_one_below_the_window() {
        let keys = [1, 3, 5, 7];
        assert_eq!(send_range(&keys, Some(&(4, 6))), 1..3, "bead_id={BEAD_SHUF} case=extend");
        assert_eq!(send_range(&keys, Some(&(1, 3))), 0..2, "bead_id={BEAD_SHUF} case=at_start");
    }

    #[test]
    fn send_range_edges() {
        let keys = [10, 20, 30];
        // Entirely below the local keys: early exit.
        assert_eq!(send_range(&keys, Some(&(1, 9))), 0..0);
        // Entirely above: last row only.
        assert_eq!(send_range(&keys, Some(&(40, 50))), 2..3);
        assert_eq!(send_range(&keys, None), 0..0);
        assert_eq!(send_range::<i32>(&[], Some(&(1, 2))), 0..0);
    }

    fn keyed(keys: &[i64]) -> StructArray {
        StructArray::from_fields(vec![(
            Field::new("t", DataType::Int64, false),
            Array::Int64(keys.iter().map(|&k| Some(k)).collect()),
        )])
        .unwrap()
    }

    #[test]
    fn single_process_keeps_the_needed_rows() {
        let right = keyed(&[0, 2, 4, 6, 8]);
        let plan = plan_exchange(&SingleProcess, Some((3_i64, 5_i64)), &[0, 2, 4, 6, 8]).unwrap();
        assert_eq!(plan.send_counts, vec![2]);
        assert_eq!(plan.sent_to_peers(0), 0);
        let merged = alltoallv(&SingleProcess, &right, &plan).unwrap();
        assert_eq!(merged.num_rows(), 2);
        assert_eq!(merged.column(0).scalar_at(0), Scalar::Int(2));
    }

    #[test]
    fn exchange_across_workers_merges_in_rank_order() {
        // Rank 0 holds right keys [0, 2], rank 1 holds [4, 6, 8];
        // left ranges are (1, 3) and (5, 9).
        let out = LocalCluster::run(2, |w| {
            let (left, right): (Option<(i64, i64)>, Vec<i64>) = match w.rank() {
                0 => (Some((1, 3)), vec![0, 2]),
                _ => (Some((5, 9)), vec![4, 6, 8]),
            };
            let plan = plan_exchange(&w, left, &right).unwrap();
            let merged = alltoallv(&w, &keyed(&right), &plan).unwrap();
            let keys: Vec<_> = (0..merged.num_rows())
                .map(|i| merged.column(0).scalar_at(i))
                .collect();
            (plan, keys)
        })
        .unwrap();
        let (plan0, keys0) = &out[0];
        let (plan1, keys1) = &out[1];
        assert_eq!(plan0.send_counts, vec![2, 1], "bead_id={BEAD_SHUF} case=rank0_counts");
        assert_eq!(plan1.send_counts, vec![0, 3], "bead_id={BEAD_SHUF} case=rank1_counts");
        assert_eq!(plan1.recv_counts, vec![1, 3]);
        assert_eq!(plan1.recv_displs, vec![0, 1]);
        let ints = |v: &[i64]| v.iter().map(|&k| Scalar::Int(k)).collect::<Vec<_>>();
        assert_eq!(keys0, &ints(&[0, 2]));
        assert_eq!(keys1, &ints(&[2, 4, 6, 8]));
    }

    #[test]
    fn pieces_differing_in_nullability_are_relaxed() {
        let strict = keyed(&[1]);
        let loose = StructArray::from_fields(vec![(
            Field::new("t", DataType::Int64, true),
            Array::Int64(vec![Some(2)].into_iter().collect()),
        )])
        .unwrap();
        let relaxed = relax_nullability(vec![strict, loose]).unwrap();
        assert!(relaxed.iter().all(|p| p.schema().fields()[0].is_nullable()));
    }
}
