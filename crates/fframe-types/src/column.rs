//! Type-erased column.

use std::ops::Range;

use fframe_error::{FrameError, Result};

use crate::array::{NativeType, NullableArray};
use crate::bitmap::NullBitmap;
use crate::datatype::DataType;
use crate::dictionary::DictionaryArray;
use crate::scalar::Scalar;

/// A column of any supported data type.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Boolean(NullableArray<bool>),
    Int8(NullableArray<i8>),
    Int16(NullableArray<i16>),
    Int32(NullableArray<i32>),
    Int64(NullableArray<i64>),
    UInt8(NullableArray<u8>),
    UInt16(NullableArray<u16>),
    UInt32(NullableArray<u32>),
    UInt64(NullableArray<u64>),
    Float32(NullableArray<f32>),
    Float64(NullableArray<f64>),
    Utf8(NullableArray<String>),
    DictUtf8(DictionaryArray),
}

/// Apply `$body` to the inner array of every variant.
macro_rules! with_inner {
    ($array:expr, $inner:ident => $body:expr) => {
        match $array {
            Array::Boolean($inner) => $body,
            Array::Int8($inner) => $body,
            Array::Int16($inner) => $body,
            Array::Int32($inner) => $body,
            Array::Int64($inner) => $body,
            Array::UInt8($inner) => $body,
            Array::UInt16($inner) => $body,
            Array::UInt32($inner) => $body,
            Array::UInt64($inner) => $body,
            Array::Float32($inner) => $body,
            Array::Float64($inner) => $body,
            Array::Utf8($inner) => $body,
            Array::DictUtf8($inner) => $body,
        }
    };
}

/// Apply `$body` to the inner array and rewrap the result in the same variant.
macro_rules! map_inner {
    ($array:expr, $inner:ident => $body:expr) => {
        match $array {
            Array::Boolean($inner) => Array::Boolean($body),
            Array::Int8($inner) => Array::Int8($body),
            Array::Int16($inner) => Array::Int16($body),
            Array::Int32($inner) => Array::Int32($body),
            Array::Int64($inner) => Array::Int64($body),
            Array::UInt8($inner) => Array::UInt8($body),
            Array::UInt16($inner) => Array::UInt16($body),
            Array::UInt32($inner) => Array::UInt32($body),
            Array::UInt64($inner) => Array::UInt64($body),
            Array::Float32($inner) => Array::Float32($body),
            Array::Float64($inner) => Array::Float64($body),
            Array::Utf8($inner) => Array::Utf8($body),
            Array::DictUtf8($inner) => Array::DictUtf8($body),
        }
    };
}

impl Array {
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt8(_) => DataType::UInt8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
            Self::DictUtf8(_) => DataType::DictUtf8,
        }
    }

    /// All-null column of `len` slots.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for the unresolved `Null` type.
    pub fn new_null(data_type: DataType, len: usize) -> Result<Self> {
        Self::from_scalars(data_type, &vec![Scalar::Null; len])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        with_inner!(self, a => a.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_null(&self, idx: usize) -> bool {
        with_inner!(self, a => a.is_null(idx))
    }

    #[must_use]
    pub fn is_valid(&self, idx: usize) -> bool {
        !self.is_null(idx)
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        with_inner!(self, a => a.null_count())
    }

    #[must_use]
    pub fn validity(&self) -> &NullBitmap {
        with_inner!(self, a => a.validity())
    }

    #[must_use]
    pub fn nbytes(&self) -> usize {
        with_inner!(self, a => a.nbytes())
    }

    /// Decode one slot.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    #[must_use]
    pub fn scalar_at(&self, idx: usize) -> Scalar {
        match self {
            Self::DictUtf8(a) => a
                .get(idx)
                .map_or(Scalar::Null, |s| Scalar::Utf8(s.to_owned())),
            Self::Boolean(a) => scalar_of(a, idx),
            Self::Int8(a) => scalar_of(a, idx),
            Self::Int16(a) => scalar_of(a, idx),
            Self::Int32(a) => scalar_of(a, idx),
            Self::Int64(a) => scalar_of(a, idx),
            Self::UInt8(a) => scalar_of(a, idx),
            Self::UInt16(a) => scalar_of(a, idx),
            Self::UInt32(a) => scalar_of(a, idx),
            Self::UInt64(a) => scalar_of(a, idx),
            Self::Float32(a) => scalar_of(a, idx),
            Self::Float64(a) => scalar_of(a, idx),
            Self::Utf8(a) => scalar_of(a, idx),
        }
    }

    /// Overwrite one slot.
    ///
    /// # Errors
    ///
    /// Returns an error when the index is out of bounds or the scalar does
    /// not fit the column type.
    pub fn set_scalar(&mut self, idx: usize, value: &Scalar) -> Result<()> {
        let data_type = self.data_type();
        match self {
            Self::DictUtf8(a) => match value {
                Scalar::Null => a.set(idx, None),
                Scalar::Utf8(s) => a.set(idx, Some(s)),
                other => Err(value_mismatch(data_type, other)),
            },
            Self::Boolean(a) => set_native(a, idx, value),
            Self::Int8(a) => set_native(a, idx, value),
            Self::Int16(a) => set_native(a, idx, value),
            Self::Int32(a) => set_native(a, idx, value),
            Self::Int64(a) => set_native(a, idx, value),
            Self::UInt8(a) => set_native(a, idx, value),
            Self::UInt16(a) => set_native(a, idx, value),
            Self::UInt32(a) => set_native(a, idx, value),
            Self::UInt64(a) => set_native(a, idx, value),
            Self::Float32(a) => set_native(a, idx, value),
            Self::Float64(a) => set_native(a, idx, value),
            Self::Utf8(a) => set_native(a, idx, value),
        }
    }

    /// Fresh, non-aliasing copy of `range`.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        map_inner!(self, a => a.slice(range))
    }

    /// Gather rows; `None` produces a null slot.
    #[must_use]
    pub fn take(&self, indices: &[Option<usize>]) -> Self {
        map_inner!(self, a => a.take(indices))
    }

    /// Deep copy of every buffer.
    #[must_use]
    pub fn copy(&self) -> Self {
        map_inner!(self, a => a.copy())
    }

    /// Same values with a replaced validity bitmap.
    ///
    /// # Errors
    ///
    /// Returns an arity error when the lengths differ.
    pub fn with_validity(&self, validity: NullBitmap) -> Result<Self> {
        Ok(map_inner!(self, a => a.with_validity(validity)?))
    }

    /// Whether both columns alias the same buffers.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.ptr_eq(b),
            (Self::Int8(a), Self::Int8(b)) => a.ptr_eq(b),
            (Self::Int16(a), Self::Int16(b)) => a.ptr_eq(b),
            (Self::Int32(a), Self::Int32(b)) => a.ptr_eq(b),
            (Self::Int64(a), Self::Int64(b)) => a.ptr_eq(b),
            (Self::UInt8(a), Self::UInt8(b)) => a.ptr_eq(b),
            (Self::UInt16(a), Self::UInt16(b)) => a.ptr_eq(b),
            (Self::UInt32(a), Self::UInt32(b)) => a.ptr_eq(b),
            (Self::UInt64(a), Self::UInt64(b)) => a.ptr_eq(b),
            (Self::Float32(a), Self::Float32(b)) => a.ptr_eq(b),
            (Self::Float64(a), Self::Float64(b)) => a.ptr_eq(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.ptr_eq(b),
            (Self::DictUtf8(a), Self::DictUtf8(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Build a column from row values (the per-value construction path).
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value does not fit `data_type`
    /// or the type is the unresolved `Null` type.
    pub fn from_scalars(data_type: DataType, values: &[Scalar]) -> Result<Self> {
        Ok(match data_type {
            DataType::Boolean => Self::Boolean(collect_native(values)?),
            DataType::Int8 => Self::Int8(collect_native(values)?),
            DataType::Int16 => Self::Int16(collect_native(values)?),
            DataType::Int32 => Self::Int32(collect_native(values)?),
            DataType::Int64 => Self::Int64(collect_native(values)?),
            DataType::UInt8 => Self::UInt8(collect_native(values)?),
            DataType::UInt16 => Self::UInt16(collect_native(values)?),
            DataType::UInt32 => Self::UInt32(collect_native(values)?),
            DataType::UInt64 => Self::UInt64(collect_native(values)?),
            DataType::Float32 => Self::Float32(collect_native(values)?),
            DataType::Float64 => Self::Float64(collect_native(values)?),
            DataType::Utf8 => Self::Utf8(collect_native(values)?),
            DataType::DictUtf8 => {
                let mut strings = Vec::with_capacity(values.len());
                for value in values {
                    strings.push(match value {
                        Scalar::Null => None,
                        Scalar::Utf8(s) => Some(s.as_str()),
                        other => return Err(value_mismatch(data_type, other)),
                    });
                }
                Self::DictUtf8(DictionaryArray::encode(strings))
            }
            DataType::Null => {
                return Err(FrameError::configuration(
                    "null",
                    "the unresolved null type has no storage",
                ));
            }
        })
    }

    /// Type-coercing copy into `target`.
    ///
    /// The source column is never modified. Casting to the column's own
    /// type yields a deep copy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value cannot be represented in
    /// `target`.
    pub fn cast_to(&self, target: DataType) -> Result<Self> {
        if self.data_type() == target {
            return Ok(self.copy());
        }
        match (self, target) {
            (Self::DictUtf8(a), DataType::Utf8) => Ok(Self::Utf8(a.decode())),
            (Self::Utf8(a), DataType::DictUtf8) => Ok(Self::DictUtf8(DictionaryArray::encode(
                a.iter().map(|v| v.map(String::as_str)),
            ))),
            _ => {
                let values: Vec<Scalar> = (0..self.len()).map(|i| self.scalar_at(i)).collect();
                Self::from_scalars(target, &values)
            }
        }
    }

    /// Concatenate columns of one data type.
    ///
    /// # Errors
    ///
    /// Returns an arity error when the parts disagree on data type.
    pub fn concat(parts: &[&Self]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(FrameError::arity("cannot concatenate zero columns"));
        };
        let data_type = first.data_type();
        if let Some(bad) = parts.iter().find(|p| p.data_type() != data_type) {
            return Err(FrameError::arity(format!(
                "cannot concatenate {} column with {data_type} column",
                bad.data_type()
            )));
        }
        macro_rules! concat_variant {
            ($variant:ident, $ty:ty) => {{
                let inner: Vec<&$ty> = parts
                    .iter()
                    .map(|p| match p {
                        Self::$variant(a) => a,
                        _ => unreachable!("data types checked above"),
                    })
                    .collect();
                Self::$variant(<$ty>::concat(&inner))
            }};
        }
        Ok(match data_type {
            DataType::Boolean => concat_variant!(Boolean, NullableArray<bool>),
            DataType::Int8 => concat_variant!(Int8, NullableArray<i8>),
            DataType::Int16 => concat_variant!(Int16, NullableArray<i16>),
            DataType::Int32 => concat_variant!(Int32, NullableArray<i32>),
            DataType::Int64 => concat_variant!(Int64, NullableArray<i64>),
            DataType::UInt8 => concat_variant!(UInt8, NullableArray<u8>),
            DataType::UInt16 => concat_variant!(UInt16, NullableArray<u16>),
            DataType::UInt32 => concat_variant!(UInt32, NullableArray<u32>),
            DataType::UInt64 => concat_variant!(UInt64, NullableArray<u64>),
            DataType::Float32 => concat_variant!(Float32, NullableArray<f32>),
            DataType::Float64 => concat_variant!(Float64, NullableArray<f64>),
            DataType::Utf8 => concat_variant!(Utf8, NullableArray<String>),
            DataType::DictUtf8 => concat_variant!(DictUtf8, DictionaryArray),
            DataType::Null => unreachable!("no array carries the null type"),
        })
    }
}

fn scalar_of<T: NativeType>(array: &NullableArray<T>, idx: usize) -> Scalar {
    array.get_ref(idx).map_or(Scalar::Null, NativeType::to_scalar)
}

fn set_native<T: NativeType>(
    array: &mut NullableArray<T>,
    idx: usize,
    value: &Scalar,
) -> Result<()> {
    match value {
        Scalar::Null => array.set(idx, None),
        other => {
            let native = T::from_scalar(other).ok_or_else(|| value_mismatch(T::DATA_TYPE, other))?;
            array.set(idx, Some(native))
        }
    }
}

fn collect_native<T: NativeType>(values: &[Scalar]) -> Result<NullableArray<T>> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(match value {
            Scalar::Null => None,
            other => {
                Some(T::from_scalar(other).ok_or_else(|| value_mismatch(T::DATA_TYPE, other))?)
            }
        });
    }
    Ok(out.into_iter().collect())
}

fn value_mismatch(data_type: DataType, value: &Scalar) -> FrameError {
    FrameError::configuration(
        value.to_string(),
        format!("value cannot be represented as {data_type}"),
    )
}

macro_rules! impl_from_nullable {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<NullableArray<$ty>> for Array {
                fn from(value: NullableArray<$ty>) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_nullable!(
    Boolean => bool,
    Int8 => i8,
    Int16 => i16,
    Int32 => i32,
    Int64 => i64,
    UInt8 => u8,
    UInt16 => u16,
    UInt32 => u32,
    UInt64 => u64,
    Float32 => f32,
    Float64 => f64,
    Utf8 => String,
);

impl From<DictionaryArray> for Array {
    fn from(value: DictionaryArray) -> Self {
        Self::DictUtf8(value)
    }
}
