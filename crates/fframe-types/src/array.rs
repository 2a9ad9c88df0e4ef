//! Typed column with a packed validity bitmap.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use fframe_error::{FrameError, Result};

use crate::bitmap::NullBitmap;
use crate::datatype::DataType;
use crate::scalar::Scalar;

/// Element type storable in a [`NullableArray`].
pub trait NativeType: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn to_scalar(&self) -> Scalar;

    /// Convert a non-null scalar, `None` when the value does not fit.
    fn from_scalar(scalar: &Scalar) -> Option<Self>;

    /// Payload bytes of one value (fixed-width types ignore `self`).
    fn byte_len(&self) -> usize;
}

macro_rules! impl_native_int {
    ($ty:ty, $dt:ident, $variant:ident, $wide:ty) => {
        impl NativeType for $ty {
            const DATA_TYPE: DataType = DataType::$dt;

            fn to_scalar(&self) -> Scalar {
                Scalar::$variant(<$wide>::from(*self))
            }

            fn from_scalar(scalar: &Scalar) -> Option<Self> {
                match scalar {
                    Scalar::Int(v) => <$ty>::try_from(*v).ok(),
                    Scalar::UInt(v) => <$ty>::try_from(*v).ok(),
                    Scalar::Boolean(v) => Some(<$ty>::from(*v)),
                    _ => None,
                }
            }

            fn byte_len(&self) -> usize {
                std::mem::size_of::<$ty>()
            }
        }
    };
}

impl_native_int!(i8, Int8, Int, i64);
impl_native_int!(i16, Int16, Int, i64);
impl_native_int!(i32, Int32, Int, i64);
impl_native_int!(i64, Int64, Int, i64);
impl_native_int!(u8, UInt8, UInt, u64);
impl_native_int!(u16, UInt16, UInt, u64);
impl_native_int!(u32, UInt32, UInt, u64);
impl_native_int!(u64, UInt64, UInt, u64);

/// `converted` when it converts back to exactly `original`.
fn exact_from_int<F: Copy>(original: i128, converted: F, back: impl Fn(F) -> i128) -> Option<F> {
    (back(converted) == original).then_some(converted)
}

impl NativeType for f32 {
    const DATA_TYPE: DataType = DataType::Float32;

    fn to_scalar(&self) -> Scalar {
        Scalar::Float(f64::from(*self))
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Int(v) => exact_from_int(i128::from(*v), *v as Self, |f| f as i128),
            Scalar::UInt(v) => exact_from_int(i128::from(*v), *v as Self, |f| f as i128),
            Scalar::Float(v) => {
                let narrowed = *v as Self;
                (f64::from(narrowed) == *v || v.is_nan()).then_some(narrowed)
            }
            _ => None,
        }
    }

    fn byte_len(&self) -> usize {
        4
    }
}

impl NativeType for f64 {
    const DATA_TYPE: DataType = DataType::Float64;

    fn to_scalar(&self) -> Scalar {
        Scalar::Float(*self)
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Int(v) => exact_from_int(i128::from(*v), *v as Self, |f| f as i128),
            Scalar::UInt(v) => exact_from_int(i128::from(*v), *v as Self, |f| f as i128),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn byte_len(&self) -> usize {
        8
    }
}

impl NativeType for bool {
    const DATA_TYPE: DataType = DataType::Boolean;

    fn to_scalar(&self) -> Scalar {
        Scalar::Boolean(*self)
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    fn byte_len(&self) -> usize {
        1
    }
}

impl NativeType for String {
    const DATA_TYPE: DataType = DataType::Utf8;

    fn to_scalar(&self) -> Scalar {
        Scalar::Utf8(self.clone())
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        scalar.as_str().map(str::to_owned)
    }

    fn byte_len(&self) -> usize {
        self.len()
    }
}

/// Sequence of `T` with one validity bit per slot.
///
/// Buffers are shared copy-on-write: `clone()` is cheap and aliases the
/// immutable buffers, every mutation through [`set`](Self::set) detaches
/// the mutated array first, and [`copy`](Self::copy) always allocates.
#[derive(Debug, Clone, PartialEq)]
pub struct NullableArray<T: NativeType> {
    values: Arc<Vec<T>>,
    validity: NullBitmap,
}

impl<T: NativeType> NullableArray<T> {
    /// # Errors
    ///
    /// Returns an arity error when the bitmap and value lengths differ.
    pub fn try_new(values: Vec<T>, validity: NullBitmap) -> Result<Self> {
        if values.len() != validity.len() {
            return Err(FrameError::arity(format!(
                "{} column has {} values but {} validity bits",
                T::DATA_TYPE,
                values.len(),
                validity.len()
            )));
        }
        Ok(Self {
            values: Arc::new(values),
            validity,
        })
    }

    /// All-valid array.
    #[must_use]
    pub fn from_values(values: Vec<T>) -> Self {
        let validity = NullBitmap::new_valid(values.len());
        Self {
            values: Arc::new(values),
            validity,
        }
    }

    /// All-null array of `len` default values.
    #[must_use]
    pub fn nulls(len: usize) -> Self {
        Self {
            values: Arc::new(vec![T::default(); len]),
            validity: NullBitmap::new_null(len),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<T> {
        self.get_ref(idx).cloned()
    }

    /// Borrowing variant of [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    #[must_use]
    pub fn get_ref(&self, idx: usize) -> Option<&T> {
        if self.validity.is_valid(idx) {
            Some(&self.values[idx])
        } else {
            None
        }
    }

    /// # Errors
    ///
    /// Returns [`FrameError::OutOfBounds`] when `idx >= len`.
    pub fn set(&mut self, idx: usize, value: Option<T>) -> Result<()> {
        if idx >= self.len() {
            return Err(FrameError::OutOfBounds {
                index: idx,
                len: self.len(),
            });
        }
        let values = Arc::make_mut(&mut self.values);
        match value {
            Some(v) => {
                values[idx] = v;
                self.validity.set(idx, true);
            }
            None => {
                values[idx] = T::default();
                self.validity.set(idx, false);
            }
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    #[must_use]
    pub fn is_null(&self, idx: usize) -> bool {
        !self.validity.is_valid(idx)
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.validity.count_nulls()
    }

    /// Raw value storage; null slots hold `T::default()`.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[must_use]
    pub fn validity(&self) -> &NullBitmap {
        &self.validity
    }

    /// Fresh, non-aliasing copy of `range`.
    ///
    /// # Panics
    ///
    /// Panics if `range` exceeds the array.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            values: Arc::new(self.values[range.clone()].to_vec()),
            validity: self.validity.slice(range),
        }
    }

    /// Gather rows; a `None` index produces a null slot.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn take(&self, indices: &[Option<usize>]) -> Self {
        let values = indices
            .iter()
            .map(|idx| idx.map_or_else(T::default, |i| self.values[i].clone()))
            .collect();
        Self {
            values: Arc::new(values),
            validity: self.validity.take(indices),
        }
    }

    /// Deep copy of every buffer.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            values: Arc::new(self.values.as_ref().clone()),
            validity: self.validity.copy(),
        }
    }

    /// Storage footprint: value bytes (plus `u32` offsets for variable
    /// width values) and bitmap bytes.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        let value_bytes = if T::DATA_TYPE.is_fixed_width() {
            self.values.len() * std::mem::size_of::<T>()
        } else {
            self.values.iter().map(T::byte_len).sum::<usize>() + 4 * (self.values.len() + 1)
        };
        value_bytes + self.validity.nbytes()
    }

    #[must_use]
    pub fn concat(parts: &[&Self]) -> Self {
        let values = parts
            .iter()
            .flat_map(|p| p.values.iter().cloned())
            .collect();
        let bitmaps: Vec<&NullBitmap> = parts.iter().map(|p| &p.validity).collect();
        Self {
            values: Arc::new(values),
            validity: NullBitmap::concat(&bitmaps),
        }
    }

    /// Replace the validity bitmap (e.g. to fold in a struct-level bitmap).
    ///
    /// # Errors
    ///
    /// Returns an arity error when the lengths differ.
    pub fn with_validity(&self, validity: NullBitmap) -> Result<Self> {
        if validity.len() != self.len() {
            return Err(FrameError::arity(format!(
                "validity of length {} applied to column of length {}",
                validity.len(),
                self.len()
            )));
        }
        Ok(Self {
            values: Arc::clone(&self.values),
            validity,
        })
    }

    /// Whether both arrays alias the same value and validity buffers.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values) && self.validity.ptr_eq(&other.validity)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&T>> + '_ {
        (0..self.len()).map(|i| self.get_ref(i))
    }
}

impl<T: NativeType> FromIterator<Option<T>> for NullableArray<T> {
    fn from_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        let mut values = Vec::new();
        let mut valid = Vec::new();
        for item in iter {
            valid.push(item.is_some());
            values.push(item.unwrap_or_default());
        }
        Self {
            values: Arc::new(values),
            validity: NullBitmap::from_bools(&valid),
        }
    }
}
