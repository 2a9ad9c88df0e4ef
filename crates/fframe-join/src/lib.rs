//! Join execution over FrankenFrame struct arrays.
//!
//! A [`JoinDescriptor`] is bound against two input schemas by an
//! [`ExecutorContext`]; binding reconciles key types, compiles the optional
//! [`CondExpr`] and fixes the output schema. Equality joins run as a
//! build/probe hash join with the right input as build side. As-of joins
//! run as a sorted merge, optionally preceded by an all-to-all exchange of
//! right rows when the right input is partitioned across workers.
//!
//! ```text
//! hash:  bind -> build(right) -> probe(left) -> assemble
//! as-of: bind -> [all-gather ranges -> alltoallv(right)] -> merge -> assemble
//! ```

pub mod asof;
pub mod comm;
pub mod condition;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod executor;
pub mod hash_table;
pub mod metrics;
pub mod operator;
pub mod plan;
pub mod reconcile;
pub mod shuffle;

pub use asof::asof_match_indices;
pub use comm::{Communicator, LocalCluster, LocalWorker, SingleProcess};
pub use condition::{
    BinaryOp, CachePolicy, CompiledCondition, CondExpr, ConditionCache, RowRef, Side, TableHandle,
};
pub use config::ExecutorConfig;
pub use context::ExecutorContext;
pub use descriptor::{IndexColumn, JoinDescriptor, JoinKind, NaEquality};
pub use executor::{JoinResult, JoinStats};
pub use metrics::{JoinMetrics, JoinMetricsSnapshot};
pub use operator::{AsofJoinOperator, HashJoinOperator, PhysicalOperator, asof_join, hash_join};
pub use plan::{BoundJoin, OutputColumn, OutputSource};
pub use reconcile::{common_data_type, reconcile_key_types};
pub use shuffle::{AlltoallvPlan, calc_displacements, count_overlap};
