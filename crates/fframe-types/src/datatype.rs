//! Logical column types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical/logical type of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Variable-length UTF-8 strings.
    Utf8,
    /// Dictionary-encoded UTF-8 strings (`u32` codes into a shared dictionary).
    DictUtf8,
    /// Unresolved type of a column that has no representative element.
    Null,
}

impl DataType {
    #[must_use]
    pub const fn is_signed_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    #[must_use]
    pub const fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    #[must_use]
    pub const fn is_string_like(self) -> bool {
        matches!(self, Self::Utf8 | Self::DictUtf8)
    }

    /// Width in bits of one value, `None` for variable-length types.
    #[must_use]
    pub const fn bit_width(self) -> Option<u32> {
        match self {
            Self::Boolean | Self::Int8 | Self::UInt8 => Some(8),
            Self::Int16 | Self::UInt16 => Some(16),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(32),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(64),
            Self::Utf8 | Self::DictUtf8 | Self::Null => None,
        }
    }

    /// Fixed-width primitive types qualify for bulk struct construction.
    #[must_use]
    pub const fn is_fixed_width(self) -> bool {
        self.bit_width().is_some()
    }

    /// Signed integer type of the given width.
    #[must_use]
    pub const fn signed_of_width(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::Int8),
            16 => Some(Self::Int16),
            32 => Some(Self::Int32),
            64 => Some(Self::Int64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
            Self::DictUtf8 => "dict<utf8>",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A data type together with its declared nullability.
///
/// A non-nullable column never holds a null slot; the nullable variant of
/// the same data type has identical value storage plus meaningful
/// validity bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnType {
    #[must_use]
    pub const fn new(data_type: DataType, nullable: bool) -> Self {
        Self {
            data_type,
            nullable,
        }
    }

    #[must_use]
    pub const fn non_null(data_type: DataType) -> Self {
        Self::new(data_type, false)
    }

    #[must_use]
    pub const fn nullable(data_type: DataType) -> Self {
        Self::new(data_type, true)
    }

    /// Same data type, nullable.
    #[must_use]
    pub const fn to_nullable(self) -> Self {
        Self::new(self.data_type, true)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "nullable {}", self.data_type)
        } else {
            write!(f, "{}", self.data_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_and_classes() {
        assert_eq!(DataType::Int32.bit_width(), Some(32));
        assert_eq!(DataType::Utf8.bit_width(), None);
        assert!(DataType::UInt16.is_unsigned_integer());
        assert!(DataType::DictUtf8.is_string_like());
        assert!(!DataType::Boolean.is_numeric());
        assert_eq!(DataType::signed_of_width(16), Some(DataType::Int16));
        assert_eq!(DataType::signed_of_width(128), None);
    }

    #[test]
    fn column_type_display() {
        assert_eq!(ColumnType::non_null(DataType::Int32).to_string(), "int32");
        assert_eq!(
            ColumnType::nullable(DataType::Int64).to_string(),
            "nullable int64"
        );
    }
}
