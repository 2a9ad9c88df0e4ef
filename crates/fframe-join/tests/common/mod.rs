#![allow(dead_code)]

use std::sync::Once;

use fframe_types::{Array, DataType, Field, Scalar, StructArray};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route engine logs to the test writer; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Two-column table: int64 key `key` plus utf8 payload `payload`.
pub fn keyed_strings(
    key: &str,
    keys: &[Option<i64>],
    payload: &str,
    values: &[&str],
) -> StructArray {
    StructArray::from_fields(vec![
        (
            Field::new(key, DataType::Int64, keys.iter().any(Option::is_none)),
            Array::Int64(keys.iter().copied().collect()),
        ),
        (
            Field::new(payload, DataType::Utf8, false),
            Array::Utf8(values.iter().map(|v| Some((*v).to_owned())).collect()),
        ),
    ])
    .expect("well-formed test table")
}

/// Ascending time series: int64 ordering key `t` plus float64 payload.
pub fn series(payload: &str, keys: &[i64]) -> StructArray {
    StructArray::from_fields(vec![
        (
            Field::new("t", DataType::Int64, false),
            Array::Int64(keys.iter().map(|&k| Some(k)).collect()),
        ),
        (
            Field::new(payload, DataType::Float64, false),
            Array::Float64(keys.iter().map(|&k| Some(k as f64 * 10.0)).collect()),
        ),
    ])
    .expect("well-formed test series")
}

/// Ascending series whose int64 payload is the row's position, so rows
/// sharing a key stay distinguishable.
pub fn numbered(payload: &str, keys: &[i64]) -> StructArray {
    StructArray::from_fields(vec![
        (
            Field::new("t", DataType::Int64, false),
            Array::Int64(keys.iter().map(|&k| Some(k)).collect()),
        ),
        (
            Field::new(payload, DataType::Int64, false),
            Array::Int64((0..keys.len()).map(|i| Some(i as i64)).collect()),
        ),
    ])
    .expect("well-formed numbered series")
}

pub fn rows(table: &StructArray) -> Vec<Vec<Scalar>> {
    (0..table.num_rows())
        .map(|i| table.row(i).expect("struct rows are valid"))
        .collect()
}

/// Rows rendered as strings and sorted, for order-insensitive comparison.
pub fn row_multiset(table: &StructArray) -> Vec<String> {
    let mut out: Vec<String> = rows(table).iter().map(|r| format!("{r:?}")).collect();
    out.sort();
    out
}
