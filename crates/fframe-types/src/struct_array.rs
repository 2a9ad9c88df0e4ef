//! Struct arrays: named columns sharing a row count and a struct-level
//! validity bitmap.
//!
//! A struct slot marked invalid means the field contents of that row are
//! not meaningful even when the individual fields are marked valid.
//! [`StructArray::flatten`] folds the struct bitmap into every field so
//! downstream operators only have to look at field validity.

use std::ops::Range;

use fframe_error::{FrameError, FrameWarning, Result};

use crate::array::{NativeType, NullableArray};
use crate::bitmap::NullBitmap;
use crate::column::Array;
use crate::datatype::DataType;
use crate::scalar::Scalar;
use crate::schema::{Field, Schema};

#[derive(Debug, Clone, PartialEq)]
pub struct StructArray {
    schema: Schema,
    columns: Vec<Array>,
    validity: NullBitmap,
}

impl StructArray {
    /// Compose a struct array from equal-length columns.
    ///
    /// `validity` defaults to all-valid.
    ///
    /// # Errors
    ///
    /// Returns an arity error when the column count, a column length, a
    /// column type, or the struct bitmap length disagrees with `schema`, or
    /// when a non-nullable field holds a null.
    pub fn try_new(
        schema: Schema,
        columns: Vec<Array>,
        validity: Option<NullBitmap>,
    ) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(FrameError::arity(format!(
                "schema declares {} fields but {} columns were supplied",
                schema.len(),
                columns.len()
            )));
        }
        let rows = validity
            .as_ref()
            .map(NullBitmap::len)
            .or_else(|| columns.first().map(Array::len))
            .unwrap_or(0);
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.len() != rows {
                return Err(FrameError::arity(format!(
                    "field `{}` has {} rows, expected {rows}",
                    field.name,
                    column.len()
                )));
            }
            if column.data_type() != field.data_type() {
                return Err(FrameError::arity(format!(
                    "field `{}` declared {} but holds {}",
                    field.name,
                    field.data_type(),
                    column.data_type()
                )));
            }
            if !field.is_nullable() && column.null_count() > 0 {
                return Err(FrameError::arity(format!(
                    "non-nullable field `{}` holds {} nulls",
                    field.name,
                    column.null_count()
                )));
            }
        }
        Ok(Self {
            schema,
            columns,
            validity: validity.unwrap_or_else(|| NullBitmap::new_valid(rows)),
        })
    }

    /// Compose from `(field, column)` pairs.
    ///
    /// # Errors
    ///
    /// See [`StructArray::try_new`]; duplicate names are also rejected.
    pub fn from_fields(pairs: Vec<(Field, Array)>) -> Result<Self> {
        let (fields, columns): (Vec<Field>, Vec<Array>) = pairs.into_iter().unzip();
        Self::try_new(Schema::try_new(fields)?, columns, None)
    }

    /// Zero-row struct array.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the schema holds the `Null` type.
    pub fn new_empty(schema: Schema) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|f| Array::new_null(f.data_type(), 0))
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(schema, columns, None)
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn columns(&self) -> &[Array] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, idx: usize) -> &Array {
        &self.columns[idx]
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Array> {
        self.schema.index_of(name).map(|i| &self.columns[i])
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.validity.len()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn validity(&self) -> &NullBitmap {
        &self.validity
    }

    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        self.validity.is_valid(row)
    }

    /// Row values, `None` for an invalid struct slot.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<Vec<Scalar>> {
        if !self.validity.is_valid(row) {
            return None;
        }
        Some(self.columns.iter().map(|c| c.scalar_at(row)).collect())
    }

    /// Whether the named field of `row` is null.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown field.
    pub fn is_field_value_null(&self, row: usize, name: &str) -> Result<bool> {
        let column = self.field(name).ok_or_else(|| {
            FrameError::configuration(name, format!("field does not exist in {}", self.schema))
        })?;
        Ok(column.is_null(row))
    }

    pub fn set_valid(&mut self, row: usize, valid: bool) {
        self.validity.set(row, valid);
    }

    /// Overwrite a row; `None` marks the struct slot invalid and leaves the
    /// field contents untouched.
    ///
    /// # Errors
    ///
    /// Returns an arity error on a width mismatch, or a configuration error
    /// when a value does not fit its field.
    pub fn set_row(&mut self, row: usize, values: Option<&[Scalar]>) -> Result<()> {
        if row >= self.num_rows() {
            return Err(FrameError::OutOfBounds {
                index: row,
                len: self.num_rows(),
            });
        }
        let Some(values) = values else {
            self.validity.set(row, false);
            return Ok(());
        };
        if values.len() != self.columns.len() {
            return Err(FrameError::arity(format!(
                "row has {} values, struct has {} fields",
                values.len(),
                self.columns.len()
            )));
        }
        let fields = self.schema.fields().iter();
        for ((field, column), value) in fields.zip(&mut self.columns).zip(values) {
            if value.is_null() && !field.is_nullable() {
                return Err(FrameError::arity(format!(
                    "non-nullable field `{}` cannot be set to NULL",
                    field.name
                )));
            }
            column.set_scalar(row, value)?;
        }
        self.validity.set(row, true);
        Ok(())
    }

    /// Fresh copy of `range`.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.slice(range.clone())).collect(),
            validity: self.validity.slice(range),
        }
    }

    /// Gather rows by position.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        let opt: Vec<Option<usize>> = indices.iter().copied().map(Some).collect();
        Self {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.take(&opt)).collect(),
            validity: self.validity.take(&opt),
        }
    }

    /// Keep the rows whose mask entry is `true`.
    ///
    /// # Errors
    ///
    /// Returns an arity error when the mask length differs from the row count.
    pub fn filter(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.num_rows() {
            return Err(FrameError::arity(format!(
                "mask of length {} applied to {} rows",
                mask.len(),
                self.num_rows()
            )));
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();
        Ok(self.take(&keep))
    }

    /// Select fields by name, in the given order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown field.
    pub fn project(&self, names: &[&str]) -> Result<Self> {
        let mut fields = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let idx = self.schema.index_of(name).ok_or_else(|| {
                FrameError::configuration(*name, format!("field does not exist in {}", self.schema))
            })?;
            fields.push(self.schema.fields()[idx].clone());
            columns.push(self.columns[idx].clone());
        }
        Self::try_new(Schema::try_new(fields)?, columns, Some(self.validity.clone()))
    }

    /// Re-label the columns with `schema`, e.g. to relax nullability.
    ///
    /// # Errors
    ///
    /// See [`StructArray::try_new`].
    pub fn with_schema(&self, schema: Schema) -> Result<Self> {
        Self::try_new(schema, self.columns.clone(), Some(self.validity.clone()))
    }

    /// Concatenate struct arrays with identical schemas.
    ///
    /// # Errors
    ///
    /// Returns an arity error when the schemas differ or `parts` is empty.
    pub fn concat(parts: &[&Self]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(FrameError::arity("cannot concatenate zero struct arrays"));
        };
        if let Some(bad) = parts.iter().find(|p| p.schema != first.schema) {
            return Err(FrameError::arity(format!(
                "cannot concatenate {} with {}",
                bad.schema, first.schema
            )));
        }
        let mut columns = Vec::with_capacity(first.num_columns());
        for idx in 0..first.num_columns() {
            let parts_at: Vec<&Array> = parts.iter().map(|p| &p.columns[idx]).collect();
            columns.push(Array::concat(&parts_at)?);
        }
        let bitmaps: Vec<&NullBitmap> = parts.iter().map(|p| &p.validity).collect();
        Ok(Self {
            schema: first.schema.clone(),
            columns,
            validity: NullBitmap::concat(&bitmaps),
        })
    }

    /// Deep copy of every buffer and bitmap.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(Array::copy).collect(),
            validity: self.validity.copy(),
        }
    }

    /// Field bytes plus struct bitmap bytes.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.columns.iter().map(Array::nbytes).sum::<usize>() + self.validity.nbytes()
    }

    /// Fold the struct bitmap into every field.
    ///
    /// Fields that gain nulls this way become nullable. The result has an
    /// all-valid struct bitmap.
    ///
    /// # Errors
    ///
    /// Propagates bitmap length errors (never expected for a well-formed
    /// struct array).
    pub fn flatten(&self) -> Result<Self> {
        if self.validity.all_valid() {
            return Ok(self.clone());
        }
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut columns = Vec::with_capacity(self.columns.len());
        for (field, column) in self.schema.fields().iter().zip(&self.columns) {
            let folded = column.validity().and(&self.validity)?;
            columns.push(column.with_validity(folded)?);
            let mut field = field.clone();
            field.column_type = field.column_type.to_nullable();
            fields.push(field);
        }
        Self::try_new(Schema::try_new(fields)?, columns, None)
    }
}

/// How [`StructArrayBuilder::finish_via`] materializes columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionPath {
    /// Bulk for all-fixed-width schemas, per-row otherwise.
    Auto,
    /// One exact-capacity allocation per column; fixed-width schemas only.
    Bulk,
    /// Row-at-a-time through scalar values; any schema.
    PerRow,
}

/// Row-wise struct array construction.
#[derive(Debug, Clone)]
pub struct StructArrayBuilder {
    schema: Schema,
    rows: Vec<Option<Vec<Scalar>>>,
}

impl StructArrayBuilder {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns an arity error when the row width differs from the schema.
    pub fn append_row(&mut self, row: Vec<Scalar>) -> Result<()> {
        if row.len() != self.schema.len() {
            return Err(FrameError::arity(format!(
                "row {} has {} values, schema has {} fields",
                self.rows.len(),
                row.len(),
                self.schema.len()
            )));
        }
        self.rows.push(Some(row));
        Ok(())
    }

    /// Append an invalid struct slot.
    pub fn append_null(&mut self) {
        self.rows.push(None);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// # Errors
    ///
    /// See [`StructArrayBuilder::finish_via`].
    pub fn finish(self) -> Result<StructArray> {
        self.finish_via(ConstructionPath::Auto).map(|(array, _)| array)
    }

    /// Materialize the struct array and return any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value does not fit its field,
    /// an arity error when a non-nullable field receives a null, or a
    /// configuration error when `Bulk` is forced on a variable-width schema.
    pub fn finish_via(self, path: ConstructionPath) -> Result<(StructArray, Vec<FrameWarning>)> {
        let fixed = self.schema.is_fixed_width();
        match path {
            ConstructionPath::Bulk if !fixed => Err(FrameError::configuration(
                self.schema.to_string(),
                "bulk construction requires an all-fixed-width schema",
            )),
            ConstructionPath::Bulk => Ok((self.build_bulk()?, Vec::new())),
            ConstructionPath::Auto if fixed => Ok((self.build_bulk()?, Vec::new())),
            ConstructionPath::Auto | ConstructionPath::PerRow => self.build_per_row(),
        }
    }

    fn struct_validity(&self) -> NullBitmap {
        let valid: Vec<bool> = self.rows.iter().map(Option::is_some).collect();
        NullBitmap::from_bools(&valid)
    }

    fn build_bulk(&self) -> Result<StructArray> {
        let mut columns = Vec::with_capacity(self.schema.len());
        for (idx, field) in self.schema.fields().iter().enumerate() {
            let rows = &self.rows;
            let column = match field.data_type() {
                DataType::Boolean => Array::Boolean(bulk_column(rows, idx, field)?),
                DataType::Int8 => Array::Int8(bulk_column(rows, idx, field)?),
                DataType::Int16 => Array::Int16(bulk_column(rows, idx, field)?),
                DataType::Int32 => Array::Int32(bulk_column(rows, idx, field)?),
                DataType::Int64 => Array::Int64(bulk_column(rows, idx, field)?),
                DataType::UInt8 => Array::UInt8(bulk_column(rows, idx, field)?),
                DataType::UInt16 => Array::UInt16(bulk_column(rows, idx, field)?),
                DataType::UInt32 => Array::UInt32(bulk_column(rows, idx, field)?),
                DataType::UInt64 => Array::UInt64(bulk_column(rows, idx, field)?),
                DataType::Float32 => Array::Float32(bulk_column(rows, idx, field)?),
                DataType::Float64 => Array::Float64(bulk_column(rows, idx, field)?),
                other => {
                    return Err(FrameError::internal(format!(
                        "bulk path reached variable-width type {other}"
                    )));
                }
            };
            columns.push(column);
        }
        StructArray::try_new(self.schema.clone(), columns, Some(self.struct_validity()))
    }

    fn build_per_row(self) -> Result<(StructArray, Vec<FrameWarning>)> {
        let mut warnings = Vec::new();
        let mut fields = Vec::with_capacity(self.schema.len());
        let mut per_field: Vec<Vec<Scalar>> = self
            .schema
            .fields()
            .iter()
            .map(|_| Vec::with_capacity(self.rows.len()))
            .collect();

        for (row_idx, row) in self.rows.iter().enumerate() {
            for (idx, field) in self.schema.fields().iter().enumerate() {
                let value = match row {
                    Some(values) => {
                        let value = &values[idx];
                        if value.is_null() && !field.is_nullable() {
                            return Err(non_nullable_null(field, row_idx));
                        }
                        value.clone()
                    }
                    None if field.is_nullable() => Scalar::Null,
                    None => default_scalar(field.data_type()),
                };
                per_field[idx].push(value);
            }
        }

        let mut columns = Vec::with_capacity(self.schema.len());
        for (field, values) in self.schema.fields().iter().zip(per_field) {
            let mut field = field.clone();
            if field.data_type() == DataType::Null {
                let warning = FrameWarning::NullAmbiguity {
                    column: field.name.clone(),
                    chosen: DataType::Utf8.to_string(),
                };
                tracing::warn!(column = %field.name, %warning, "defaulting unresolved column type");
                warnings.push(warning);
                field.column_type.data_type = DataType::Utf8;
                field.column_type.nullable = true;
            }
            columns.push(Array::from_scalars(field.data_type(), &values)?);
            fields.push(field);
        }
        let validity = self.struct_validity();
        let array = StructArray::try_new(Schema::try_new(fields)?, columns, Some(validity))?;
        Ok((array, warnings))
    }
}

fn bulk_column<T: NativeType>(
    rows: &[Option<Vec<Scalar>>],
    idx: usize,
    field: &Field,
) -> Result<NullableArray<T>> {
    let len = rows.len();
    let mut values: Vec<T> = Vec::with_capacity(len);
    let mut bits = vec![0_u8; len.div_ceil(8)];
    for (row_idx, row) in rows.iter().enumerate() {
        let value = match row {
            Some(row) => match &row[idx] {
                Scalar::Null if field.is_nullable() => None,
                Scalar::Null => return Err(non_nullable_null(field, row_idx)),
                other => Some(T::from_scalar(other).ok_or_else(|| {
                    FrameError::configuration(
                        other.to_string(),
                        format!("value cannot be represented as {}", T::DATA_TYPE),
                    )
                })?),
            },
            None if field.is_nullable() => None,
            None => Some(T::default()),
        };
        if let Some(v) = value {
            values.push(v);
            bits[row_idx / 8] |= 1 << (row_idx % 8);
        } else {
            values.push(T::default());
        }
    }
    NullableArray::try_new(values, NullBitmap::from_bytes(bits, len)?)
}

fn default_scalar(data_type: DataType) -> Scalar {
    match data_type {
        DataType::Boolean => Scalar::Boolean(false),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => Scalar::Int(0),
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            Scalar::UInt(0)
        }
        DataType::Float32 | DataType::Float64 => Scalar::Float(0.0),
        DataType::Utf8 | DataType::DictUtf8 => Scalar::Utf8(String::new()),
        DataType::Null => Scalar::Null,
    }
}

fn non_nullable_null(field: &Field, row: usize) -> FrameError {
    FrameError::arity(format!(
        "non-nullable field `{}` received NULL at row {row}",
        field.name
    ))
}
