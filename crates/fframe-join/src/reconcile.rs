//! Join key type reconciliation.
//!
//! Two key columns are compared in a single common type. Identical types
//! pass through untouched; mismatched numeric types widen along the usual
//! numeric promotion lattice as long as every value of both inputs stays
//! exact; any two string-like types meet at `Utf8`. Anything else, including
//! `Int64` against `UInt64` or a 64-bit integer against a float, is a
//! [`FrameError::KeyTypeMismatch`].

use fframe_error::{FrameError, Result};
use fframe_types::{Array, ColumnType, DataType};

use crate::descriptor::JoinKind;

/// Smallest type both inputs widen into without loss, if any.
#[must_use]
pub fn common_data_type(left: DataType, right: DataType) -> Option<DataType> {
    use DataType::{Float64, Null, Utf8};

    if left == Null || right == Null {
        return None;
    }
    if left == right {
        return Some(left);
    }
    if left.is_string_like() && right.is_string_like() {
        return Some(Utf8);
    }
    let (lw, rw) = (left.bit_width()?, right.bit_width()?);

    if left.is_integer() && right.is_integer() {
        if left.is_signed_integer() == right.is_signed_integer() {
            return Some(if lw >= rw { left } else { right });
        }
        let (signed, signed_w, unsigned_w) = if left.is_signed_integer() {
            (left, lw, rw)
        } else {
            (right, rw, lw)
        };
        if signed_w > unsigned_w {
            return Some(signed);
        }
        // No float holds every 64-bit integer exactly.
        return DataType::signed_of_width(unsigned_w * 2);
    }
    if left.is_float() && right.is_float() {
        return Some(if lw >= rw { left } else { right });
    }
    if left.is_numeric() && right.is_numeric() {
        let (int_w, float) = if left.is_float() {
            (rw, left)
        } else {
            (lw, right)
        };
        return match int_w {
            0..=16 => Some(float),
            17..=32 => Some(Float64),
            _ => None,
        };
    }
    None
}

/// Reconciled type for one key pair.
///
/// The result is nullable when either input is nullable or when `kind`
/// can emit unmatched rows. Identical inputs are returned unchanged.
///
/// # Errors
///
/// Returns [`FrameError::KeyTypeMismatch`] when no common type exists.
pub fn reconcile_key_types(
    key: &str,
    left: ColumnType,
    right: ColumnType,
    kind: JoinKind,
) -> Result<ColumnType> {
    if left == right && left.data_type != DataType::Null {
        return Ok(left);
    }
    let data_type = common_data_type(left.data_type, right.data_type)
        .ok_or_else(|| FrameError::key_type_mismatch(key, left, right))?;
    let needs_nulls = kind.left_preserved() || kind.right_preserved();
    let nullable = left.nullable || right.nullable || needs_nulls;
    tracing::debug!(
        key,
        %left,
        %right,
        reconciled = %data_type,
        nullable,
        "reconciled join key types"
    );
    Ok(ColumnType::new(data_type, nullable))
}

/// Key column in the reconciled type; a coerced copy when the type differs.
///
/// # Errors
///
/// Returns a configuration error when a value cannot be represented.
pub fn coerce_key_column(column: &Array, target: DataType) -> Result<Array> {
    if column.data_type() == target {
        Ok(column.clone())
    } else {
        column.cast_to(target)
    }
}
