//! Build-side hash table.
//!
//! Rows are chained per 64-bit key hash: `head` maps a hash to the newest
//! entry and `next` links each entry to the previous one with the same
//! hash. Probing walks the chain, compares full keys, and returns build
//! row indices in insertion order.

use hashbrown::HashMap;
use smallvec::SmallVec;
use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

use fframe_types::Array;

use crate::descriptor::NaEquality;

const NULL_KEY_HASH: u64 = 0x9e37_79b9_7f4a_7c15;

/// One component of a composite key, normalized for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// Canonical bit pattern: `-0.0` folds onto `0.0`, every NaN onto one NaN.
    Float(u64),
    Str(String),
}

pub(crate) type KeyTuple = SmallVec<[KeyValue; 2]>;

fn canonical_float_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0_f64.to_bits()
    } else {
        v.to_bits()
    }
}

fn key_value(column: &Array, row: usize) -> KeyValue {
    if column.is_null(row) {
        return KeyValue::Null;
    }
    match column {
        Array::Boolean(a) => KeyValue::Bool(a.values()[row]),
        Array::Int8(a) => KeyValue::Int(i64::from(a.values()[row])),
        Array::Int16(a) => KeyValue::Int(i64::from(a.values()[row])),
        Array::Int32(a) => KeyValue::Int(i64::from(a.values()[row])),
        Array::Int64(a) => KeyValue::Int(a.values()[row]),
        Array::UInt8(a) => KeyValue::UInt(u64::from(a.values()[row])),
        Array::UInt16(a) => KeyValue::UInt(u64::from(a.values()[row])),
        Array::UInt32(a) => KeyValue::UInt(u64::from(a.values()[row])),
        Array::UInt64(a) => KeyValue::UInt(a.values()[row]),
        Array::Float32(a) => KeyValue::Float(canonical_float_bits(f64::from(a.values()[row]))),
        Array::Float64(a) => KeyValue::Float(canonical_float_bits(a.values()[row])),
        Array::Utf8(a) => KeyValue::Str(a.values()[row].clone()),
        Array::DictUtf8(a) => KeyValue::Str(a.get(row).unwrap_or_default().to_owned()),
    }
}

/// Composite key of `row` over the reconciled key columns.
pub(crate) fn extract_key(columns: &[Array], row: usize) -> KeyTuple {
    columns.iter().map(|c| key_value(c, row)).collect()
}

pub(crate) fn key_has_null(key: &KeyTuple) -> bool {
    key.iter().any(|k| matches!(k, KeyValue::Null))
}

/// Per-row hash of one key column.
#[must_use]
pub fn hash_column(column: &Array) -> Vec<u64> {
    (0..column.len())
        .map(|row| match key_value(column, row) {
            KeyValue::Null => NULL_KEY_HASH,
            KeyValue::Bool(v) => xxh3_64(&[u8::from(v)]),
            KeyValue::Int(v) => xxh3_64(&v.to_le_bytes()),
            KeyValue::UInt(v) => xxh3_64(&v.to_le_bytes()),
            KeyValue::Float(bits) => xxh3_64(&bits.to_le_bytes()),
            KeyValue::Str(s) => xxh3_64(s.as_bytes()),
        })
        .collect()
}

/// Fold per-column hashes into one hash per row.
#[must_use]
pub fn combine_hashes(columns: &[&[u64]], rows: usize) -> Vec<u64> {
    match columns {
        [] => vec![0; rows],
        [only] => only.to_vec(),
        [first, rest @ ..] => (0..rows)
            .map(|row| {
                rest.iter().fold(first[row], |acc, col| {
                    xxh3_64_with_seed(&col[row].to_le_bytes(), acc)
                })
            })
            .collect(),
    }
}

#[derive(Debug, Clone)]
struct BuildEntry {
    key: KeyTuple,
    row_index: usize,
}

/// Hash table over the build side of one join.
#[derive(Debug)]
pub struct JoinHashTable {
    entries: Vec<BuildEntry>,
    head: HashMap<u64, usize>,
    next: Vec<Option<usize>>,
    skipped_null_keys: usize,
}

impl JoinHashTable {
    /// Insert every build row. Under [`NaEquality::Strict`] rows with a
    /// null key component are left out; they can never match.
    pub(crate) fn build(
        key_columns: &[Array],
        row_hashes: &[u64],
        policy: NaEquality,
        capacity_hint: usize,
    ) -> Self {
        let rows = row_hashes.len();
        let capacity = if capacity_hint == 0 { rows } else { capacity_hint };
        let mut entries = Vec::with_capacity(rows);
        let mut head: HashMap<u64, usize> = HashMap::with_capacity(capacity);
        let mut next = Vec::with_capacity(rows);
        let mut skipped_null_keys = 0;

        for (row, &hash) in row_hashes.iter().enumerate() {
            let key = extract_key(key_columns, row);
            if policy == NaEquality::Strict && key_has_null(&key) {
                skipped_null_keys += 1;
                continue;
            }
            let current = entries.len();
            entries.push(BuildEntry {
                key,
                row_index: row,
            });
            next.push(head.insert(hash, current));
        }

        Self {
            entries,
            head,
            next,
            skipped_null_keys,
        }
    }

    /// Build rows whose key equals `key`, in build order.
    pub(crate) fn probe(&self, hash: u64, key: &KeyTuple) -> SmallVec<[usize; 4]> {
        let mut matches = SmallVec::new();
        let mut current = self.head.get(&hash).copied();
        while let Some(idx) = current {
            let entry = &self.entries[idx];
            if entry.key == *key {
                matches.push(entry.row_index);
            }
            current = self.next[idx];
        }
        // Chains run newest first.
        matches.reverse();
        matches
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn distinct_hashes(&self) -> usize {
        self.head.len()
    }

    #[must_use]
    pub fn skipped_null_keys(&self) -> usize {
        self.skipped_null_keys
    }
}
