use fframe_types::{
    Array, ConstructionPath, DataType, Field, NullableArray, Scalar, Schema, StructArray,
    StructArrayBuilder,
};
use proptest::prelude::*;

const BEAD_ID: &str = "ff-struct";

fn schema() -> Schema {
    Schema::try_new(vec![
        Field::new("a", DataType::Int32, false),
        Field::new("b", DataType::UInt16, true),
        Field::new("c", DataType::Float64, true),
        Field::new("d", DataType::Boolean, true),
    ])
    .unwrap()
}

fn row_strategy() -> impl Strategy<Value = Option<Vec<Scalar>>> {
    let row = (
        any::<i32>(),
        proptest::option::of(any::<u16>()),
        proptest::option::of(-1.0e6_f64..1.0e6),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(a, b, c, d)| {
            vec![
                Scalar::Int(i64::from(a)),
                b.map_or(Scalar::Null, |v| Scalar::UInt(u64::from(v))),
                c.map_or(Scalar::Null, Scalar::Float),
                d.map_or(Scalar::Null, Scalar::Boolean),
            ]
        });
    proptest::option::weighted(0.85, row)
}

fn build(rows: &[Option<Vec<Scalar>>], path: ConstructionPath) -> StructArray {
    let mut builder = StructArrayBuilder::new(schema());
    for row in rows {
        match row {
            Some(values) => builder.append_row(values.clone()).unwrap(),
            None => builder.append_null(),
        }
    }
    builder.finish_via(path).unwrap().0
}

proptest! {
    #[test]
    fn prop_bulk_matches_per_row(rows in proptest::collection::vec(row_strategy(), 0..200)) {
        let bulk = build(&rows, ConstructionPath::Bulk);
        let per_row = build(&rows, ConstructionPath::PerRow);
        prop_assert_eq!(&bulk, &per_row, "bead_id={} case=bulk_vs_per_row", BEAD_ID);
        prop_assert_eq!(
            bulk.validity().as_bytes(),
            per_row.validity().as_bytes(),
            "bead_id={} case=struct_bitmap_bytes",
            BEAD_ID
        );
        for (a, b) in bulk.columns().iter().zip(per_row.columns()) {
            prop_assert_eq!(a.validity().as_bytes(), b.validity().as_bytes());
        }
        for (i, row) in rows.iter().enumerate() {
            prop_assert_eq!(&bulk.row(i), row, "bead_id={} case=row_round_trip row={}", BEAD_ID, i);
        }
    }

    #[test]
    fn prop_copy_is_independent(rows in proptest::collection::vec(row_strategy(), 1..50)) {
        let original = build(&rows, ConstructionPath::Auto);
        let mut copied = original.copy();
        copied.set_valid(0, !original.is_valid(0));
        prop_assert_ne!(original.is_valid(0), copied.is_valid(0));
        prop_assert_eq!(original.nbytes(), copied.nbytes());
    }
}

#[test]
fn test_mask_and_index_selection() {
    let array = StructArray::from_fields(vec![
        (
            Field::new("k", DataType::Int64, false),
            Array::from(NullableArray::from_values(vec![10_i64, 20, 30])),
        ),
        (
            Field::new("s", DataType::Utf8, true),
            Array::from(NullableArray::from_iter([
                Some("x".to_owned()),
                None,
                Some("z".to_owned()),
            ])),
        ),
    ])
    .unwrap();

    let masked = array.filter(&[false, true, true]).unwrap();
    assert_eq!(masked.num_rows(), 2, "bead_id={BEAD_ID} case=mask");
    assert!(masked.is_field_value_null(0, "s").unwrap());

    let picked = array.take(&[2]);
    assert_eq!(
        picked.row(0),
        Some(vec![Scalar::Int(30), Scalar::from("z")]),
        "bead_id={BEAD_ID} case=index"
    );

    let projected = array.project(&["s"]).unwrap();
    assert_eq!(projected.num_columns(), 1);
    assert!(array.project(&["missing"]).is_err());
}
