//! Descriptor validation and the output column plan.
//!
//! Binding a [`JoinDescriptor`] against the two input schemas resolves key
//! columns, reconciles key types, compiles the optional condition and lays
//! out the output schema. Every configuration problem surfaces here, before
//! any hash table exists.

use hashbrown::{HashMap, HashSet};

use fframe_error::{FrameError, Result};
use fframe_types::{ColumnType, DataType, Field, Schema};

use crate::condition::{CompiledCondition, ConditionCache};
use crate::descriptor::{
    INDEX_COLUMN_NAME, INDICATOR_COLUMN_NAME, IndexColumn, JoinDescriptor, JoinKind,
};
use crate::reconcile::reconcile_key_types;

/// Where an output column's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    /// Source row position on one side.
    Index(IndexColumn),
    /// Key present once for both sides; left value when the left row exists.
    CollapsedKey(usize),
    /// Reconciled left key column `k`.
    LeftKey(usize),
    /// Reconciled right key column `k`.
    RightKey(usize),
    /// Left column by schema position.
    Left(usize),
    /// Right column by schema position.
    Right(usize),
    /// `left_only` / `right_only` / `both`.
    Indicator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub field: Field,
    pub source: OutputSource,
}

/// A validated join, ready to execute against inputs of the bound schemas.
#[derive(Debug, Clone)]
pub struct BoundJoin {
    descriptor: JoinDescriptor,
    left_schema: Schema,
    right_schema: Schema,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    key_types: Vec<ColumnType>,
    condition: Option<CompiledCondition>,
    columns: Vec<OutputColumn>,
    output_schema: Schema,
}

impl BoundJoin {
    /// Validate `descriptor` against both schemas.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Configuration`] for empty or unequal key lists, an
    ///   unknown key column, an invalid condition, an as-of join that is not
    ///   keyed on exactly one numeric column or carries a condition, or
    ///   colliding output names.
    /// - [`FrameError::KeyTypeMismatch`] for irreconcilable key types.
    pub fn bind(
        descriptor: &JoinDescriptor,
        left: &Schema,
        right: &Schema,
        cache: &ConditionCache,
        default_suffixes: &(String, String),
    ) -> Result<Self> {
        let kind = descriptor.kind;
        if descriptor.left_keys.is_empty()
            || descriptor.left_keys.len() != descriptor.right_keys.len()
        {
            return Err(FrameError::configuration(
                format!("on={:?}/{:?}", descriptor.left_keys, descriptor.right_keys),
                "join needs one or more key columns and equally many on each side",
            ));
        }
        let left_keys = resolve_keys(&descriptor.left_keys, left, "left")?;
        let right_keys = resolve_keys(&descriptor.right_keys, right, "right")?;

        let mut key_types = Vec::with_capacity(left_keys.len());
        for (k, (&l, &r)) in left_keys.iter().zip(&right_keys).enumerate() {
            let name = if descriptor.left_keys[k] == descriptor.right_keys[k] {
                descriptor.left_keys[k].clone()
            } else {
                format!("{}/{}", descriptor.left_keys[k], descriptor.right_keys[k])
            };
            key_types.push(reconcile_key_types(
                &name,
                left.fields()[l].column_type,
                right.fields()[r].column_type,
                kind,
            )?);
        }

        if kind == JoinKind::Asof {
            validate_asof(descriptor, &key_types)?;
        }

        let condition = descriptor
            .condition
            .as_ref()
            .map(|expr| cache.get_or_compile(expr, left, right))
            .transpose()?;

        let suffixes = descriptor.suffixes.as_ref().unwrap_or(default_suffixes);
        let columns = plan_columns(
            descriptor,
            left,
            right,
            &left_keys,
            &right_keys,
            &key_types,
            suffixes,
        )?;
        let output_schema = Schema::try_new(columns.iter().map(|c| c.field.clone()).collect())
            .map_err(|e| FrameError::configuration(descriptor.kind.as_str(), e.to_string()))?;

        tracing::debug!(
            kind = kind.as_str(),
            keys = left_keys.len(),
            condition = condition.as_ref().map(CompiledCondition::source),
            output = %output_schema,
            "bound join"
        );

        Ok(Self {
            descriptor: descriptor.clone(),
            left_schema: left.clone(),
            right_schema: right.clone(),
            left_keys,
            right_keys,
            key_types,
            condition,
            columns,
            output_schema,
        })
    }

    #[must_use]
    pub fn descriptor(&self) -> &JoinDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub const fn kind(&self) -> JoinKind {
        self.descriptor.kind
    }

    #[must_use]
    pub fn left_schema(&self) -> &Schema {
        &self.left_schema
    }

    #[must_use]
    pub fn right_schema(&self) -> &Schema {
        &self.right_schema
    }

    #[must_use]
    pub fn left_key_indices(&self) -> &[usize] {
        &self.left_keys
    }

    #[must_use]
    pub fn right_key_indices(&self) -> &[usize] {
        &self.right_keys
    }

    /// Reconciled type per key pair.
    #[must_use]
    pub fn key_types(&self) -> &[ColumnType] {
        &self.key_types
    }

    #[must_use]
    pub fn condition(&self) -> Option<&CompiledCondition> {
        self.condition.as_ref()
    }

    #[must_use]
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    #[must_use]
    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    /// Inputs must carry exactly the schemas the join was bound against.
    pub(crate) fn check_inputs(&self, left: &Schema, right: &Schema) -> Result<()> {
        let sides = [
            ("left", &self.left_schema, left),
            ("right", &self.right_schema, right),
        ];
        for (side, bound, got) in sides {
            if bound != got {
                return Err(FrameError::arity(format!(
                    "{side} input {got} does not match bound schema {bound}"
                )));
            }
        }
        Ok(())
    }
}

fn resolve_keys(names: &[String], schema: &Schema, side: &str) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            schema.index_of(name).ok_or_else(|| {
                FrameError::configuration(
                    name.clone(),
                    format!("key column is not declared on the {side} side {schema}"),
                )
            })
        })
        .collect()
}

fn validate_asof(descriptor: &JoinDescriptor, key_types: &[ColumnType]) -> Result<()> {
    if key_types.len() != 1 {
        return Err(FrameError::configuration(
            format!("on={:?}", descriptor.left_keys),
            "as-of join is keyed on exactly one ordering column",
        ));
    }
    if !key_types[0].data_type.is_numeric() {
        return Err(FrameError::configuration(
            descriptor.left_keys[0].clone(),
            format!("as-of ordering key must be numeric, found {}", key_types[0].data_type),
        ));
    }
    if let Some(condition) = &descriptor.condition {
        return Err(FrameError::configuration(
            condition.to_string(),
            "as-of joins do not take a general condition",
        ));
    }
    Ok(())
}

struct Pending {
    name: String,
    column_type: ColumnType,
    source: OutputSource,
}

fn plan_columns(
    descriptor: &JoinDescriptor,
    left: &Schema,
    right: &Schema,
    left_keys: &[usize],
    right_keys: &[usize],
    key_types: &[ColumnType],
    suffixes: &(String, String),
) -> Result<Vec<OutputColumn>> {
    let kind = descriptor.kind;
    let collapsed: Vec<bool> = descriptor
        .left_keys
        .iter()
        .zip(&descriptor.right_keys)
        .map(|(l, r)| l == r)
        .collect();
    let left_key_of: HashMap<usize, usize> = left_keys
        .iter()
        .enumerate()
        .rev()
        .map(|(k, &col)| (col, k))
        .collect();
    let right_key_of: HashMap<usize, usize> = right_keys
        .iter()
        .enumerate()
        .rev()
        .map(|(k, &col)| (col, k))
        .collect();
    let promote_left = kind.left_may_be_missing();
    let promote_right = kind.right_may_be_missing();

    let mut left_side: Vec<Pending> = Vec::new();
    let mut collapsed_cols: Vec<Pending> = Vec::new();
    for (k, &col) in left_keys.iter().enumerate() {
        let key_type = key_types[k];
        if collapsed[k] {
            if collapsed_cols.iter().any(|p| p.name == descriptor.left_keys[k]) {
                continue;
            }
            collapsed_cols.push(Pending {
                name: descriptor.left_keys[k].clone(),
                column_type: key_type,
                source: OutputSource::CollapsedKey(k),
            });
        } else if left_key_of.get(&col) == Some(&k) {
            left_side.push(Pending {
                name: left.fields()[col].name.clone(),
                column_type: ColumnType::new(key_type.data_type, key_type.nullable || promote_left),
                source: OutputSource::LeftKey(k),
            });
        }
    }
    for (idx, field) in left.fields().iter().enumerate() {
        if left_key_of.contains_key(&idx) {
            continue;
        }
        left_side.push(Pending {
            name: field.name.clone(),
            column_type: ColumnType::new(field.data_type(), field.is_nullable() || promote_left),
            source: OutputSource::Left(idx),
        });
    }

    let mut right_side: Vec<Pending> = Vec::new();
    let collapsed_names: HashSet<&str> = collapsed_cols.iter().map(|p| p.name.as_str()).collect();
    for (idx, field) in right.fields().iter().enumerate() {
        let (column_type, source) = match right_key_of.get(&idx) {
            Some(&k) if collapsed[k] => continue,
            Some(&k) => (
                ColumnType::new(key_types[k].data_type, key_types[k].nullable || promote_right),
                OutputSource::RightKey(k),
            ),
            None => (
                ColumnType::new(field.data_type(), field.is_nullable() || promote_right),
                OutputSource::Right(idx),
            ),
        };
        if collapsed_names.contains(field.name.as_str())
            && !matches!(source, OutputSource::RightKey(_))
        {
            return Err(FrameError::configuration(
                field.name.clone(),
                "right column shadows a shared key column",
            ));
        }
        right_side.push(Pending {
            name: field.name.clone(),
            column_type,
            source,
        });
    }
    drop(collapsed_names);

    let left_names: HashSet<String> = left_side.iter().map(|p| p.name.clone()).collect();
    let right_names: HashSet<String> = right_side.iter().map(|p| p.name.clone()).collect();
    for pending in &mut left_side {
        if right_names.contains(&pending.name) {
            pending.name.push_str(&suffixes.0);
        }
    }
    for pending in &mut right_side {
        if left_names.contains(&pending.name) {
            pending.name.push_str(&suffixes.1);
        }
    }

    let mut out = Vec::with_capacity(left_side.len() + right_side.len() + collapsed_cols.len() + 2);
    if let Some(side) = descriptor.index {
        let nullable = match side {
            IndexColumn::Left => promote_left,
            IndexColumn::Right => promote_right,
        };
        out.push(OutputColumn {
            field: Field::new(INDEX_COLUMN_NAME, DataType::Int64, nullable),
            source: OutputSource::Index(side),
        });
    }
    // Shared keys, then left key columns ahead of the other left columns.
    // Right key columns keep their place among the right columns.
    let (left_key_cols, left_rest): (Vec<Pending>, Vec<Pending>) = left_side
        .into_iter()
        .partition(|p| matches!(p.source, OutputSource::LeftKey(_)));
    let ordered = collapsed_cols
        .into_iter()
        .chain(left_key_cols)
        .chain(left_rest)
        .chain(right_side);
    for pending in ordered {
        out.push(OutputColumn {
            field: Field {
                name: pending.name,
                column_type: pending.column_type,
            },
            source: pending.source,
        });
    }
    if descriptor.indicator {
        out.push(OutputColumn {
            field: Field::new(INDICATOR_COLUMN_NAME, DataType::DictUtf8, false),
            source: OutputSource::Indicator,
        });
    }

    {
        let mut seen = HashSet::with_capacity(out.len());
        for column in &out {
            if !seen.insert(column.field.name.as_str()) {
                return Err(FrameError::configuration(
                    column.field.name.clone(),
                    "output column name collides after applying suffixes",
                ));
            }
        }
    }
    Ok(out)
}
