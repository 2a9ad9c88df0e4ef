//! Join counters.
//!
//! Counters are owned by an [`ExecutorContext`](crate::ExecutorContext)
//! and updated once per join from its [`JoinStats`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::executor::JoinStats;

/// Snapshot of [`JoinMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinMetricsSnapshot {
    pub fframe_joins_total: u64,
    pub fframe_join_build_rows_total: u64,
    pub fframe_join_probe_rows_total: u64,
    pub fframe_join_candidate_pairs_total: u64,
    pub fframe_join_condition_evaluations_total: u64,
    pub fframe_join_output_rows_total: u64,
    pub fframe_asof_rows_sent_total: u64,
    pub fframe_asof_rows_received_total: u64,
}

#[derive(Debug, Default)]
pub struct JoinMetrics {
    joins: AtomicU64,
    build_rows: AtomicU64,
    probe_rows: AtomicU64,
    candidate_pairs: AtomicU64,
    condition_evaluations: AtomicU64,
    output_rows: AtomicU64,
    rows_sent: AtomicU64,
    rows_received: AtomicU64,
}

fn add(counter: &AtomicU64, value: usize) {
    counter.fetch_add(u64::try_from(value).unwrap_or(u64::MAX), Ordering::Relaxed);
}

impl JoinMetrics {
    pub fn record(&self, stats: &JoinStats) {
        self.joins.fetch_add(1, Ordering::Relaxed);
        add(&self.build_rows, stats.build_rows);
        add(&self.probe_rows, stats.probe_rows);
        add(&self.candidate_pairs, stats.candidate_pairs);
        add(&self.condition_evaluations, stats.condition_evaluations);
        add(&self.output_rows, stats.output_rows);
        add(&self.rows_sent, stats.rows_sent);
        add(&self.rows_received, stats.rows_received);
    }

    #[must_use]
    pub fn snapshot(&self) -> JoinMetricsSnapshot {
        JoinMetricsSnapshot {
            fframe_joins_total: self.joins.load(Ordering::Relaxed),
            fframe_join_build_rows_total: self.build_rows.load(Ordering::Relaxed),
            fframe_join_probe_rows_total: self.probe_rows.load(Ordering::Relaxed),
            fframe_join_candidate_pairs_total: self.candidate_pairs.load(Ordering::Relaxed),
            fframe_join_condition_evaluations_total: self
                .condition_evaluations
                .load(Ordering::Relaxed),
            fframe_join_output_rows_total: self.output_rows.load(Ordering::Relaxed),
            fframe_asof_rows_sent_total: self.rows_sent.load(Ordering::Relaxed),
            fframe_asof_rows_received_total: self.rows_received.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.joins,
            &self.build_rows,
            &self.probe_rows,
            &self.candidate_pairs,
            &self.condition_evaluations,
            &self.output_rows,
            &self.rows_sent,
            &self.rows_received,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
