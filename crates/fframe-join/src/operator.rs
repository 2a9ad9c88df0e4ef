//! Join operators with a fixed `(inputs, output, execute)` shape.

use std::fmt;

use fframe_error::{FrameError, Result};
use fframe_types::{Schema, StructArray};

use crate::asof::execute_asof;
use crate::comm::Communicator;
use crate::context::ExecutorContext;
use crate::descriptor::{JoinDescriptor, JoinKind};
use crate::executor::{JoinResult, execute_hash_join};
use crate::plan::BoundJoin;

/// A plan node that owns its inputs and knows its output schema before it
/// runs.
pub trait PhysicalOperator: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Left and right input schemas, after flattening.
    fn input_schemas(&self) -> [&Schema; 2];

    fn output_schema(&self) -> &Schema;

    fn execute(&self, ctx: &ExecutorContext) -> Result<JoinResult>;
}

/// Struct-level nulls are folded into the fields before binding.
fn prepare(
    ctx: &ExecutorContext,
    descriptor: &JoinDescriptor,
    left: &StructArray,
    right: &StructArray,
) -> Result<(BoundJoin, StructArray, StructArray)> {
    let left = left.flatten()?;
    let right = right.flatten()?;
    let bound = ctx.bind(descriptor, left.schema(), right.schema())?;
    Ok((bound, left, right))
}

#[derive(Debug)]
pub struct HashJoinOperator {
    bound: BoundJoin,
    left: StructArray,
    right: StructArray,
}

impl HashJoinOperator {
    /// Validate `descriptor` against the inputs.
    ///
    /// # Errors
    ///
    /// Arity, key-type and configuration errors from binding; as-of
    /// descriptors belong to [`AsofJoinOperator`].
    pub fn try_new(
        ctx: &ExecutorContext,
        descriptor: &JoinDescriptor,
        left: &StructArray,
        right: &StructArray,
    ) -> Result<Self> {
        if descriptor.kind == JoinKind::Asof {
            return Err(FrameError::configuration(
                "kind = asof",
                "as-of joins run through AsofJoinOperator",
            ));
        }
        let (bound, left, right) = prepare(ctx, descriptor, left, right)?;
        Ok(Self { bound, left, right })
    }

    #[must_use]
    pub fn bound(&self) -> &BoundJoin {
        &self.bound
    }
}

impl PhysicalOperator for HashJoinOperator {
    fn name(&self) -> &'static str {
        "hash_join"
    }

    fn input_schemas(&self) -> [&Schema; 2] {
        [self.left.schema(), self.right.schema()]
    }

    fn output_schema(&self) -> &Schema {
        self.bound.output_schema()
    }

    fn execute(&self, ctx: &ExecutorContext) -> Result<JoinResult> {
        execute_hash_join(ctx, &self.bound, &self.left, &self.right)
    }
}

/// As-of merge of this worker's partitions; `comm` reaches the peers.
#[derive(Debug)]
pub struct AsofJoinOperator<C: Communicator> {
    comm: C,
    bound: BoundJoin,
    left: StructArray,
    right: StructArray,
}

impl<C: Communicator> AsofJoinOperator<C> {
    /// # Errors
    ///
    /// Configuration errors for anything but a single numeric ordering key
    /// without a condition, plus the usual binding errors.
    pub fn try_new(
        ctx: &ExecutorContext,
        comm: C,
        descriptor: &JoinDescriptor,
        left: &StructArray,
        right: &StructArray,
    ) -> Result<Self> {
        if descriptor.kind != JoinKind::Asof {
            return Err(FrameError::configuration(
                format!("kind = {}", descriptor.kind.as_str()),
                "AsofJoinOperator needs an as-of descriptor",
            ));
        }
        let (bound, left, right) = prepare(ctx, descriptor, left, right)?;
        Ok(Self {
            comm,
            bound,
            left,
            right,
        })
    }

    #[must_use]
    pub fn communicator(&self) -> &C {
        &self.comm
    }
}

impl<C: Communicator + fmt::Debug> PhysicalOperator for AsofJoinOperator<C> {
    fn name(&self) -> &'static str {
        "asof_join"
    }

    fn input_schemas(&self) -> [&Schema; 2] {
        [self.left.schema(), self.right.schema()]
    }

    fn output_schema(&self) -> &Schema {
        self.bound.output_schema()
    }

    fn execute(&self, ctx: &ExecutorContext) -> Result<JoinResult> {
        execute_asof(ctx, &self.comm, &self.bound, &self.left, &self.right)
    }
}

/// Bind and run a hash join in one call.
///
/// # Errors
///
/// See [`HashJoinOperator::try_new`].
pub fn hash_join(
    ctx: &ExecutorContext,
    descriptor: &JoinDescriptor,
    left: &StructArray,
    right: &StructArray,
) -> Result<JoinResult> {
    HashJoinOperator::try_new(ctx, descriptor, left, right)?.execute(ctx)
}

/// Bind and run an as-of join in one call. Collective; every worker of
/// `comm` must call it.
///
/// # Errors
///
/// See [`AsofJoinOperator::try_new`]; collective failures surface as
/// [`FrameError::DistributedCollectiveFailure`].
pub fn asof_join<C: Communicator + fmt::Debug>(
    ctx: &ExecutorContext,
    comm: C,
    descriptor: &JoinDescriptor,
    left: &StructArray,
    right: &StructArray,
) -> Result<JoinResult> {
    AsofJoinOperator::try_new(ctx, comm, descriptor, left, right)?.execute(ctx)
}

#[cfg(test)]
mod tests {
    use fframe_types::{Array, DataType, Field};

    use super::*;
    use crate::comm::SingleProcess;

    fn table() -> StructArray {
        StructArray::from_fields(vec![(
            Field::new("t", DataType::Int64, false),
            Array::Int64(vec![Some(1), Some(2)].into_iter().collect()),
        )])
        .unwrap()
    }

    #[test]
    fn operators_reject_the_other_kind() {
        let ctx = ExecutorContext::default();
        let t = table();
        let asof = JoinDescriptor::new(JoinKind::Asof).on(["t"]);
        let inner = JoinDescriptor::new(JoinKind::Inner).on(["t"]);
        assert!(HashJoinOperator::try_new(&ctx, &asof, &t, &t).is_err());
        assert!(AsofJoinOperator::try_new(&ctx, SingleProcess, &inner, &t, &t).is_err());
    }

    #[test]
    fn operator_reports_schemas_before_running() {
        let ctx = ExecutorContext::default();
        let t = table();
        let desc = JoinDescriptor::new(JoinKind::Left).on(["t"]);
        let op = HashJoinOperator::try_new(&ctx, &desc, &t, &t).unwrap();
        assert_eq!(op.name(), "hash_join");
        assert_eq!(op.input_schemas()[0], t.schema());
        let result = op.execute(&ctx).unwrap();
        assert_eq!(result.table.schema(), op.output_schema());
        assert_eq!(ctx.metrics().snapshot().fframe_joins_total, 1);
    }

    #[test]
    fn struct_nulls_are_flattened_into_fields() {
        let ctx = ExecutorContext::default();
        let mut left = table();
        left.set_valid(1, false);
        let right = table();
        let desc = JoinDescriptor::new(JoinKind::Inner).on(["t"]);
        let result = hash_join(&ctx, &desc, &left, &right).unwrap();
        // Row 1's key became null and no longer matches under strict NA equality.
        assert_eq!(result.table.num_rows(), 1);
    }
}
