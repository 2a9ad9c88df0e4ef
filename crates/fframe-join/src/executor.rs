//! Hash join execution: `Build -> Probe -> Assemble -> Done`.
//!
//! The right input is always the build side. Key columns are coerced to
//! their reconciled types up front (copies only where the type changes),
//! hashed per column, and the per-column hashes of a key column shared by
//! both inputs are computed once. The probe walks left rows in order,
//! filters candidates through the NA policy and the optional condition, and
//! records `(left, right)` row pairs. Assembly gathers every output column
//! from those pairs.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use fframe_error::{FrameError, FrameWarning, Result};
use fframe_types::{Array, DictionaryArray, NullableArray, StructArray};

use crate::condition::RowRef;
use crate::context::ExecutorContext;
use crate::descriptor::{IndexColumn, NaEquality};
use crate::hash_table::{JoinHashTable, combine_hashes, extract_key, hash_column, key_has_null};
use crate::plan::{BoundJoin, OutputSource};
use crate::reconcile::coerce_key_column;

/// Counters for one join invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStats {
    pub build_rows: usize,
    pub probe_rows: usize,
    /// Build rows left out of the table because a key component was null.
    pub null_keys_skipped: usize,
    /// Key columns whose hashes were shared between probe and build.
    pub hash_columns_reused: usize,
    pub candidate_pairs: usize,
    pub condition_evaluations: usize,
    pub matches: usize,
    pub output_rows: usize,
    /// Right rows shipped to other workers by the as-of exchange.
    pub rows_sent: usize,
    /// Right rows received by the as-of exchange, own rows included.
    pub rows_received: usize,
}

/// Output table plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct JoinResult {
    pub table: StructArray,
    pub stats: JoinStats,
    pub warnings: Vec<FrameWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinPhase {
    Build,
    Probe,
    Assemble,
    Done,
}

impl fmt::Display for JoinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "build",
            Self::Probe => "probe",
            Self::Assemble => "assemble",
            Self::Done => "done",
        })
    }
}

/// Row pairs in output order; `None` marks the padded side.
#[derive(Debug, Default)]
pub(crate) struct RowPairs {
    pub(crate) left: Vec<Option<usize>>,
    pub(crate) right: Vec<Option<usize>>,
}

impl RowPairs {
    fn push(&mut self, left: Option<usize>, right: Option<usize>) {
        self.left.push(left);
        self.right.push(right);
    }

    pub(crate) fn len(&self) -> usize {
        self.left.len()
    }
}

/// Key columns of both inputs in their reconciled types.
pub(crate) fn coerce_keys(
    bound: &BoundJoin,
    left: &StructArray,
    right: &StructArray,
) -> Result<(Vec<Array>, Vec<Array>)> {
    let mut left_keys = Vec::with_capacity(bound.key_types().len());
    let mut right_keys = Vec::with_capacity(bound.key_types().len());
    for ((&l, &r), key_type) in bound
        .left_key_indices()
        .iter()
        .zip(bound.right_key_indices())
        .zip(bound.key_types())
    {
        left_keys.push(coerce_key_column(left.column(l), key_type.data_type)?);
        right_keys.push(coerce_key_column(right.column(r), key_type.data_type)?);
    }
    Ok((left_keys, right_keys))
}

struct HashJoinRun<'a> {
    bound: &'a BoundJoin,
    left: &'a StructArray,
    right: &'a StructArray,
    left_keys: Vec<Array>,
    right_keys: Vec<Array>,
    phase: JoinPhase,
    right_column_hashes: Vec<Vec<u64>>,
    table: Option<JoinHashTable>,
    pairs: RowPairs,
    stats: JoinStats,
}

impl<'a> HashJoinRun<'a> {
    fn new(bound: &'a BoundJoin, left: &'a StructArray, right: &'a StructArray) -> Result<Self> {
        bound.check_inputs(left.schema(), right.schema())?;
        let (left_keys, right_keys) = coerce_keys(bound, left, right)?;
        Ok(Self {
            bound,
            left,
            right,
            left_keys,
            right_keys,
            phase: JoinPhase::Build,
            right_column_hashes: Vec::new(),
            table: None,
            pairs: RowPairs::default(),
            stats: JoinStats::default(),
        })
    }

    fn expect_phase(&self, phase: JoinPhase) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(FrameError::internal(format!(
                "join is in phase {}, expected {phase}",
                self.phase
            )))
        }
    }

    fn build(&mut self, capacity_hint: usize) -> Result<()> {
        self.expect_phase(JoinPhase::Build)?;
        let rows = self.right.num_rows();
        let _span = tracing::debug_span!("join.build", build_rows = rows).entered();

        self.right_column_hashes = self.right_keys.iter().map(hash_column).collect();
        let refs: Vec<&[u64]> = self.right_column_hashes.iter().map(Vec::as_slice).collect();
        let row_hashes = combine_hashes(&refs, rows);
        let table = JoinHashTable::build(
            &self.right_keys,
            &row_hashes,
            self.bound.descriptor().na_equality,
            capacity_hint,
        );
        tracing::debug!(
            entries = table.len(),
            distinct_hashes = table.distinct_hashes(),
            null_keys_skipped = table.skipped_null_keys(),
            "hash table built"
        );
        self.stats.build_rows = rows;
        self.stats.null_keys_skipped = table.skipped_null_keys();
        self.table = Some(table);
        self.phase = JoinPhase::Probe;
        Ok(())
    }

    fn probe(&mut self) -> Result<()> {
        self.expect_phase(JoinPhase::Probe)?;
        let table = self
            .table
            .take()
            .ok_or_else(|| FrameError::internal("probe without a hash table"))?;
        let rows = self.left.num_rows();
        let kind = self.bound.kind();
        let strict = self.bound.descriptor().na_equality == NaEquality::Strict;
        let condition = self.bound.condition();
        let _span = tracing::debug_span!("join.probe", probe_rows = rows).entered();

        let mut own_hashes: Vec<Option<Vec<u64>>> = Vec::with_capacity(self.left_keys.len());
        for (l, r) in self.left_keys.iter().zip(&self.right_keys) {
            if l.ptr_eq(r) {
                self.stats.hash_columns_reused += 1;
                own_hashes.push(None);
            } else {
                own_hashes.push(Some(hash_column(l)));
            }
        }
        let refs: Vec<&[u64]> = own_hashes
            .iter()
            .zip(&self.right_column_hashes)
            .map(|(own, shared)| own.as_deref().unwrap_or(shared))
            .collect();
        let hashes = combine_hashes(&refs, rows);

        let mut right_matched = vec![false; self.right.num_rows()];
        for (l, &hash) in hashes.iter().enumerate() {
            let key = extract_key(&self.left_keys, l);
            let mut matched = false;
            if !(strict && key_has_null(&key)) {
                for r in table.probe(hash, &key) {
                    self.stats.candidate_pairs += 1;
                    if let Some(condition) = condition {
                        self.stats.condition_evaluations += 1;
                        let (lrow, rrow) = (RowRef::new(self.left, l), RowRef::new(self.right, r));
                        if !condition.evaluate(lrow, rrow) {
                            continue;
                        }
                    }
                    matched = true;
                    right_matched[r] = true;
                    self.pairs.push(Some(l), Some(r));
                }
            }
            if matched {
                self.stats.matches += 1;
            } else if kind.left_preserved() {
                self.pairs.push(Some(l), None);
            }
        }
        if kind.right_preserved() {
            for (r, _) in right_matched.iter().enumerate().filter(|(_, m)| !**m) {
                self.pairs.push(None, Some(r));
            }
        }
        self.stats.probe_rows = rows;
        self.phase = JoinPhase::Assemble;
        Ok(())
    }

    fn assemble(&mut self) -> Result<StructArray> {
        self.expect_phase(JoinPhase::Assemble)?;
        let _span =
            tracing::debug_span!("join.assemble", output_rows = self.pairs.len()).entered();
        let table = assemble(
            self.bound,
            self.left,
            self.right,
            &self.left_keys,
            &self.right_keys,
            &self.pairs,
        )?;
        self.stats.output_rows = table.num_rows();
        self.phase = JoinPhase::Done;
        Ok(table)
    }
}

/// Run a bound hash join over inputs of the bound schemas.
pub(crate) fn execute_hash_join(
    ctx: &ExecutorContext,
    bound: &BoundJoin,
    left: &StructArray,
    right: &StructArray,
) -> Result<JoinResult> {
    let descriptor = bound.descriptor();
    let _span = tracing::debug_span!(
        "join",
        kind = bound.kind().as_str(),
        left_rows = left.num_rows(),
        right_rows = right.num_rows(),
    )
    .entered();
    if descriptor.left_parallel || descriptor.right_parallel {
        tracing::info!(
            left_parallel = descriptor.left_parallel,
            right_parallel = descriptor.right_parallel,
            "hash join over distributed inputs runs on the local partition"
        );
    }

    let mut run = HashJoinRun::new(bound, left, right)?;
    run.build(ctx.config().hash_table_capacity)?;
    run.probe()?;
    let table = run.assemble()?;
    let stats = run.stats;
    ctx.metrics().record(&stats);
    tracing::debug!(?stats, "hash join done");
    Ok(JoinResult {
        table,
        stats,
        warnings: Vec::new(),
    })
}

const INDICATOR_VALUES: [&str; 3] = ["left_only", "right_only", "both"];

/// Gather every planned output column for `pairs`.
pub(crate) fn assemble(
    bound: &BoundJoin,
    left: &StructArray,
    right: &StructArray,
    left_keys: &[Array],
    right_keys: &[Array],
    pairs: &RowPairs,
) -> Result<StructArray> {
    let mut columns = Vec::with_capacity(bound.columns().len());
    for column in bound.columns() {
        let array = match column.source {
            OutputSource::Index(side) => {
                let idx = match side {
                    IndexColumn::Left => &pairs.left,
                    IndexColumn::Right => &pairs.right,
                };
                Array::Int64(idx.iter().map(|i| i.map(|i| i as i64)).collect())
            }
            OutputSource::CollapsedKey(k) => coalesce_key(&left_keys[k], &right_keys[k], pairs)?,
            OutputSource::LeftKey(k) => left_keys[k].take(&pairs.left),
            OutputSource::RightKey(k) => right_keys[k].take(&pairs.right),
            OutputSource::Left(i) => left.column(i).take(&pairs.left),
            OutputSource::Right(i) => right.column(i).take(&pairs.right),
            OutputSource::Indicator => {
                let codes: Vec<u32> = pairs
                    .left
                    .iter()
                    .zip(&pairs.right)
                    .map(|(l, r)| match (l, r) {
                        (Some(_), None) => 0,
                        (None, Some(_)) => 1,
                        _ => 2,
                    })
                    .collect();
                let dictionary = INDICATOR_VALUES.iter().map(|s| (*s).to_owned()).collect();
                Array::DictUtf8(DictionaryArray::try_new(
                    NullableArray::from_values(codes),
                    Arc::new(dictionary),
                )?)
            }
        };
        columns.push(array);
    }
    StructArray::try_new(bound.output_schema().clone(), columns, None)
}

/// Left key value where the left row exists, right key value otherwise.
fn coalesce_key(left_key: &Array, right_key: &Array, pairs: &RowPairs) -> Result<Array> {
    let from_left = left_key.take(&pairs.left);
    if pairs.left.iter().all(Option::is_some) {
        return Ok(from_left);
    }
    let from_right = right_key.take(&pairs.right);
    let values: Vec<_> = pairs
        .left
        .iter()
        .enumerate()
        .map(|(row, l)| {
            if l.is_some() {
                from_left.scalar_at(row)
            } else {
                from_right.scalar_at(row)
            }
        })
        .collect();
    Array::from_scalars(left_key.data_type(), &values)
}
