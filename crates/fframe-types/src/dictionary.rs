//! Dictionary-encoded string column.

use std::ops::Range;
use std::sync::Arc;

use hashbrown::HashMap;

use fframe_error::{FrameError, Result};

use crate::array::NullableArray;
use crate::bitmap::NullBitmap;

/// `u32` codes into a shared dictionary of distinct strings.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryArray {
    codes: NullableArray<u32>,
    dictionary: Arc<Vec<String>>,
}

impl DictionaryArray {
    /// # Errors
    ///
    /// Returns an arity error when a valid code points past the dictionary.
    pub fn try_new(codes: NullableArray<u32>, dictionary: Arc<Vec<String>>) -> Result<Self> {
        for (row, code) in codes.iter().enumerate() {
            if let Some(&code) = code {
                if code as usize >= dictionary.len() {
                    return Err(FrameError::arity(format!(
                        "dictionary code {code} at row {row} exceeds dictionary of {} entries",
                        dictionary.len()
                    )));
                }
            }
        }
        Ok(Self { codes, dictionary })
    }

    /// Dictionary-encode a sequence of optional strings.
    pub fn encode<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut dictionary: Vec<String> = Vec::new();
        let mut lookup: HashMap<&'a str, u32> = HashMap::new();
        let codes = values
            .into_iter()
            .map(|v| {
                v.map(|s| {
                    *lookup.entry(s).or_insert_with(|| {
                        dictionary.push(s.to_owned());
                        (dictionary.len() - 1) as u32
                    })
                })
            })
            .collect();
        Self {
            codes,
            dictionary: Arc::new(dictionary),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.codes
            .get(idx)
            .map(|code| self.dictionary[code as usize].as_str())
    }

    #[must_use]
    pub fn is_null(&self, idx: usize) -> bool {
        self.codes.is_null(idx)
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.codes.null_count()
    }

    #[must_use]
    pub fn codes(&self) -> &NullableArray<u32> {
        &self.codes
    }

    #[must_use]
    pub fn dictionary(&self) -> &[String] {
        &self.dictionary
    }

    #[must_use]
    pub fn validity(&self) -> &NullBitmap {
        self.codes.validity()
    }

    /// Set a slot, appending to the dictionary when the string is new.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::OutOfBounds`] when `idx >= len`.
    pub fn set(&mut self, idx: usize, value: Option<&str>) -> Result<()> {
        let code = match value {
            None => None,
            Some(s) => Some(match self.dictionary.iter().position(|d| d == s) {
                Some(pos) => pos as u32,
                None => {
                    let dict = Arc::make_mut(&mut self.dictionary);
                    dict.push(s.to_owned());
                    (dict.len() - 1) as u32
                }
            }),
        };
        self.codes.set(idx, code)
    }

    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            codes: self.codes.slice(range),
            dictionary: Arc::clone(&self.dictionary),
        }
    }

    #[must_use]
    pub fn take(&self, indices: &[Option<usize>]) -> Self {
        Self {
            codes: self.codes.take(indices),
            dictionary: Arc::clone(&self.dictionary),
        }
    }

    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            codes: self.codes.copy(),
            dictionary: Arc::new(self.dictionary.as_ref().clone()),
        }
    }

    #[must_use]
    pub fn nbytes(&self) -> usize {
        let dict_bytes: usize = self.dictionary.iter().map(String::len).sum::<usize>()
            + 4 * (self.dictionary.len() + 1);
        self.codes.nbytes() + dict_bytes
    }

    /// Materialize as a plain string column.
    #[must_use]
    pub fn decode(&self) -> NullableArray<String> {
        (0..self.len())
            .map(|i| self.get(i).map(str::to_owned))
            .collect()
    }

    /// # Errors
    ///
    /// Returns an arity error when the lengths differ.
    pub fn with_validity(&self, validity: NullBitmap) -> Result<Self> {
        Ok(Self {
            codes: self.codes.with_validity(validity)?,
            dictionary: Arc::clone(&self.dictionary),
        })
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.codes.ptr_eq(&other.codes) && Arc::ptr_eq(&self.dictionary, &other.dictionary)
    }

    /// Concatenate, re-encoding when the parts use different dictionaries.
    #[must_use]
    pub fn concat(parts: &[&Self]) -> Self {
        let shared = parts
            .first()
            .is_some_and(|first| {
                parts
                    .iter()
                    .all(|p| Arc::ptr_eq(&p.dictionary, &first.dictionary))
            });
        if shared {
            let codes: Vec<&NullableArray<u32>> = parts.iter().map(|p| &p.codes).collect();
            return Self {
                codes: NullableArray::concat(&codes),
                dictionary: Arc::clone(&parts[0].dictionary),
            };
        }
        Self::encode(parts.iter().flat_map(|p| (0..p.len()).map(move |i| p.get(i))))
    }
}
