//! Columnar memory model: nullable arrays, dictionary strings, and struct
//! arrays with per-slot validity bitmaps.

pub mod array;
pub mod bitmap;
pub mod column;
pub mod datatype;
pub mod dictionary;
pub mod scalar;
pub mod schema;
pub mod struct_array;

pub use array::{NativeType, NullableArray};
pub use bitmap::NullBitmap;
pub use column::Array;
pub use datatype::{ColumnType, DataType};
pub use dictionary::DictionaryArray;
pub use scalar::Scalar;
pub use schema::{Field, Schema};
pub use struct_array::{ConstructionPath, StructArray, StructArrayBuilder};
