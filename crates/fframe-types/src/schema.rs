//! Named, typed field lists.

use std::fmt;

use hashbrown::HashSet;

use fframe_error::{FrameError, Result};

use crate::datatype::{ColumnType, DataType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub column_type: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::new(data_type, nullable),
        }
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.column_type.data_type
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.column_type.nullable
    }
}

/// Ordered set of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// # Errors
    ///
    /// Returns an arity error when two fields share a name.
    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        {
            let mut seen = HashSet::with_capacity(fields.len());
            for field in &fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(FrameError::arity(format!(
                        "duplicate field name `{}`",
                        field.name
                    )));
                }
            }
        }
        Ok(Self { fields })
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Every field has a fixed-width primitive type.
    #[must_use]
    pub fn is_fixed_width(&self) -> bool {
        self.fields.iter().all(|f| f.data_type().is_fixed_width())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.column_type)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_rejected() {
        let err = Schema::try_new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("a", DataType::Utf8, true),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate field name `a`"));
    }

    #[test]
    fn lookup_and_display() {
        let schema = Schema::try_new(vec![
            Field::new("k", DataType::Int32, false),
            Field::new("v", DataType::Utf8, true),
        ])
        .unwrap();
        assert_eq!(schema.index_of("v"), Some(1));
        assert!(!schema.is_fixed_width());
        assert_eq!(schema.to_string(), "{k: int32, v: nullable utf8}");
    }
}
