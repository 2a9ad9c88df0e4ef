mod common;

use fframe_error::FrameError;
use fframe_join::{
    CachePolicy, CondExpr, ExecutorConfig, ExecutorContext, IndexColumn, JoinDescriptor, JoinKind,
    JoinMetricsSnapshot, SingleProcess, asof_join, hash_join,
};
use fframe_types::{Array, ColumnType, DataType, Field, Scalar, StructArray};

use common::{init_tracing, keyed_strings, row_multiset, rows, series};

const BEAD_ID: &str = "ff-join-scenarios";

#[test]
fn asof_scenario_matches_most_recent_right_row() {
    init_tracing();
    let ctx = ExecutorContext::default();
    let left = series("a", &[1, 3, 5, 7]);
    let right = series("b", &[0, 2, 4, 6, 8]);
    let desc = JoinDescriptor::new(JoinKind::Asof)
        .on(["t"])
        .index_column(IndexColumn::Right);
    let result = asof_join(&ctx, SingleProcess, &desc, &left, &right).unwrap();

    let names: Vec<_> = result.table.schema().names().collect();
    assert_eq!(names, vec!["$index", "t", "a", "b"]);
    let matched: Vec<Scalar> = (0..4).map(|i| result.table.column(0).scalar_at(i)).collect();
    assert_eq!(
        matched,
        vec![Scalar::Int(0), Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)],
        "bead_id={BEAD_ID} case=asof_positions"
    );
    let payload: Vec<Scalar> = (0..4).map(|i| result.table.column(3).scalar_at(i)).collect();
    assert_eq!(
        payload,
        vec![
            Scalar::Float(0.0),
            Scalar::Float(20.0),
            Scalar::Float(40.0),
            Scalar::Float(60.0)
        ],
        "bead_id={BEAD_ID} case=asof_payload"
    );
    assert_eq!(result.stats.matches, 4);
    assert_eq!(result.stats.rows_sent, 0);
}

#[test]
fn inner_scenario_yields_single_row() {
    init_tracing();
    let ctx = ExecutorContext::default();
    let left = keyed_strings("k", &[Some(1), Some(2)], "a", &["x", "y"]);
    let right = keyed_strings("k", &[Some(2), Some(3)], "b", &["p", "q"]);
    let result = hash_join(&ctx, &JoinDescriptor::new(JoinKind::Inner).on(["k"]), &left, &right)
        .unwrap();
    assert_eq!(
        rows(&result.table),
        vec![vec![Scalar::Int(2), Scalar::from("y"), Scalar::from("p")]],
        "bead_id={BEAD_ID} case=inner_scenario"
    );
}

#[test]
fn left_join_promotes_key_to_nullable_int64_even_when_all_rows_match() {
    init_tracing();
    let ctx = ExecutorContext::default();
    let left = StructArray::from_fields(vec![
        (
            Field::new("k", DataType::Int32, false),
            Array::Int32(vec![Some(1), Some(2)].into_iter().collect()),
        ),
        (
            Field::new("a", DataType::Utf8, false),
            Array::Utf8(vec![Some("x".to_owned()), Some("y".to_owned())].into_iter().collect()),
        ),
    ])
    .unwrap();
    let right = StructArray::from_fields(vec![
        (
            Field::new("k", DataType::Int64, true),
            Array::Int64(vec![Some(1), Some(2)].into_iter().collect()),
        ),
        (
            Field::new("b", DataType::Int64, false),
            Array::Int64(vec![Some(10), Some(20)].into_iter().collect()),
        ),
    ])
    .unwrap();
    let result = hash_join(&ctx, &JoinDescriptor::new(JoinKind::Left).on(["k"]), &left, &right)
        .unwrap();

    let schema = result.table.schema();
    assert_eq!(
        schema.field("k").unwrap().column_type,
        ColumnType::nullable(DataType::Int64),
        "bead_id={BEAD_ID} case=key_promotion"
    );
    // Right payload may be missing for a left join, so it is nullable too.
    assert!(schema.field("b").unwrap().is_nullable());
    assert!(!schema.field("a").unwrap().is_nullable());
    assert_eq!(result.table.num_rows(), 2);
    assert_eq!(result.table.column(0).null_count(), 0);
}

#[test]
fn wide_signed_and_unsigned_keys_do_not_meet_in_float() {
    init_tracing();
    let ctx = ExecutorContext::default();
    let left = StructArray::from_fields(vec![(
        Field::new("k", DataType::Int64, false),
        Array::Int64(vec![Some(9_007_199_254_740_993_i64)].into_iter().collect()),
    )])
    .unwrap();
    let right = StructArray::from_fields(vec![(
        Field::new("k", DataType::UInt64, false),
        Array::UInt64(vec![Some(9_007_199_254_740_992_u64)].into_iter().collect()),
    )])
    .unwrap();
    let err = hash_join(&ctx, &JoinDescriptor::new(JoinKind::Inner).on(["k"]), &left, &right)
        .unwrap_err();
    assert!(
        matches!(err, FrameError::KeyTypeMismatch { .. }),
        "bead_id={BEAD_ID} case=i64_u64_keys err={err}"
    );
}

#[test]
fn asof_self_join_matches_every_row_with_itself() {
    init_tracing();
    let ctx = ExecutorContext::default();
    let left = series("v", &[-4, 0, 3, 9, 12, 40]);
    let right = left.copy();
    let desc = JoinDescriptor::new(JoinKind::Asof)
        .on(["t"])
        .index_column(IndexColumn::Right);
    let result = asof_join(&ctx, SingleProcess, &desc, &left, &right).unwrap();
    for (i, row) in rows(&result.table).iter().enumerate() {
        assert_eq!(row[0], Scalar::Int(i as i64), "bead_id={BEAD_ID} case=self_asof row={i}");
        assert_eq!(row[2], row[3], "bead_id={BEAD_ID} case=self_asof_payload row={i}");
    }
}

#[test]
fn repeated_invocations_are_deterministic() {
    init_tracing();
    let ctx = ExecutorContext::default();
    let left = keyed_strings(
        "k",
        &[Some(3), Some(1), None, Some(3), Some(2)],
        "a",
        &["a", "b", "c", "d", "e"],
    );
    let right = keyed_strings("k", &[Some(3), Some(3), Some(2), None], "b", &["p", "q", "r", "s"]);
    let desc = JoinDescriptor::new(JoinKind::Outer).on(["k"]).indicator(true);
    let first = hash_join(&ctx, &desc, &left, &right).unwrap();
    let second = hash_join(&ctx, &desc, &left, &right).unwrap();
    assert_eq!(
        row_multiset(&first.table),
        row_multiset(&second.table),
        "bead_id={BEAD_ID} case=hash_repeat"
    );

    let l = series("a", &[1, 2, 2, 5, 8]);
    let r = series("b", &[0, 2, 3, 3, 9]);
    let asof = JoinDescriptor::new(JoinKind::Asof).on(["t"]);
    let one = asof_join(&ctx, SingleProcess, &asof, &l, &r).unwrap();
    let two = asof_join(&ctx, SingleProcess, &asof, &l, &r).unwrap();
    assert_eq!(one.table, two.table, "bead_id={BEAD_ID} case=asof_repeat");
}

#[test]
fn toml_config_drives_the_context() {
    init_tracing();
    let config = ExecutorConfig::from_toml_str(
        r#"
        default_suffixes = ["_l", "_r"]

        [condition_cache]
        kind = "lru"
        capacity = 2
        "#,
    )
    .unwrap();
    let ctx = ExecutorContext::new(config).unwrap();
    assert_eq!(ctx.conditions().policy(), CachePolicy::Lru { capacity: 2 });

    let left = keyed_strings("k", &[Some(1)], "v", &["x"]);
    let right = keyed_strings("k", &[Some(1)], "v", &["y"]);
    let desc = JoinDescriptor::new(JoinKind::Inner)
        .on(["k"])
        .condition(CondExpr::left("v").not_equals(CondExpr::right("v")));
    let result = hash_join(&ctx, &desc, &left, &right).unwrap();
    let names: Vec<_> = result.table.schema().names().collect();
    assert_eq!(names, vec!["k", "v_l", "v_r"], "bead_id={BEAD_ID} case=config_suffixes");

    // Same condition over the same schemas compiles once.
    hash_join(&ctx, &desc, &left, &right).unwrap();
    assert_eq!(ctx.conditions().misses(), 1);
    assert_eq!(ctx.conditions().hits(), 1);
}

#[test]
fn metrics_snapshot_serializes_to_json() {
    init_tracing();
    let ctx = ExecutorContext::default();
    let left = keyed_strings("k", &[Some(1), Some(2)], "a", &["x", "y"]);
    let right = keyed_strings("k", &[Some(2)], "b", &["p"]);
    hash_join(&ctx, &JoinDescriptor::new(JoinKind::Left).on(["k"]), &left, &right).unwrap();

    let snapshot = ctx.metrics().snapshot();
    let json = serde_json::to_value(snapshot).unwrap();
    assert_eq!(json["fframe_joins_total"], 1, "bead_id={BEAD_ID} case=metrics_json");
    assert_eq!(json["fframe_join_output_rows_total"], 2);
    let back: JoinMetricsSnapshot = serde_json::from_value(json).unwrap();
    assert_eq!(back, snapshot);

    ctx.metrics().reset();
    assert_eq!(ctx.metrics().snapshot().fframe_joins_total, 0);
}
