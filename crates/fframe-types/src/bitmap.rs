//! Packed validity bitmap.

use std::ops::Range;
use std::sync::Arc;

use fframe_error::{FrameError, Result};

/// One validity bit per slot, LSB-first within each byte.
///
/// Bits past `len` in the final byte are always zero, so two bitmaps with
/// the same logical content compare equal byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullBitmap {
    bytes: Arc<Vec<u8>>,
    len: usize,
}

impl NullBitmap {
    /// Bitmap with every slot valid.
    #[must_use]
    pub fn new_valid(len: usize) -> Self {
        let mut bytes = vec![0xFF_u8; len.div_ceil(8)];
        clear_tail(&mut bytes, len);
        Self {
            bytes: Arc::new(bytes),
            len,
        }
    }

    /// Bitmap with every slot null.
    #[must_use]
    pub fn new_null(len: usize) -> Self {
        Self {
            bytes: Arc::new(vec![0_u8; len.div_ceil(8)]),
            len,
        }
    }

    /// Wrap packed bytes.
    ///
    /// # Errors
    ///
    /// Returns an arity error when `bytes` is shorter than `len` bits.
    pub fn from_bytes(mut bytes: Vec<u8>, len: usize) -> Result<Self> {
        let needed = len.div_ceil(8);
        if bytes.len() < needed {
            return Err(FrameError::arity(format!(
                "validity bitmap has {} bytes, {len} slots need {needed}",
                bytes.len()
            )));
        }
        bytes.truncate(needed);
        clear_tail(&mut bytes, len);
        Ok(Self {
            bytes: Arc::new(bytes),
            len,
        })
    }

    #[must_use]
    pub fn from_bools(valid: &[bool]) -> Self {
        let mut bytes = vec![0_u8; valid.len().div_ceil(8)];
        for (i, &v) in valid.iter().enumerate() {
            if v {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        Self {
            bytes: Arc::new(bytes),
            len: valid.len(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Panics
    ///
    /// Panics if `idx >= len`.
    #[must_use]
    pub fn is_valid(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bitmap index {idx} out of range {}", self.len);
        self.bytes[idx / 8] & (1 << (idx % 8)) != 0
    }

    /// # Panics
    ///
    /// Panics if `idx >= len`.
    pub fn set(&mut self, idx: usize, valid: bool) {
        assert!(idx < self.len, "bitmap index {idx} out of range {}", self.len);
        let bytes = Arc::make_mut(&mut self.bytes);
        if valid {
            bytes[idx / 8] |= 1 << (idx % 8);
        } else {
            bytes[idx / 8] &= !(1 << (idx % 8));
        }
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn count_nulls(&self) -> usize {
        self.len - self.count_valid()
    }

    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.count_nulls() == 0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Storage footprint in bytes.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.bytes.len()
    }

    /// Copy of the bits in `range`.
    ///
    /// # Panics
    ///
    /// Panics if `range` exceeds the bitmap.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        assert!(range.start <= range.end && range.end <= self.len);
        let valid: Vec<bool> = range.map(|i| self.is_valid(i)).collect();
        Self::from_bools(&valid)
    }

    /// Gather bits; a `None` index produces a null slot.
    #[must_use]
    pub fn take(&self, indices: &[Option<usize>]) -> Self {
        let valid: Vec<bool> = indices
            .iter()
            .map(|idx| idx.is_some_and(|i| self.is_valid(i)))
            .collect();
        Self::from_bools(&valid)
    }

    /// Slot-wise AND of two equal-length bitmaps.
    ///
    /// # Errors
    ///
    /// Returns an arity error when the lengths differ.
    pub fn and(&self, other: &Self) -> Result<Self> {
        if self.len != other.len {
            return Err(FrameError::arity(format!(
                "cannot combine bitmaps of length {} and {}",
                self.len, other.len
            )));
        }
        let bytes = self
            .bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| a & b)
            .collect();
        Ok(Self {
            bytes: Arc::new(bytes),
            len: self.len,
        })
    }

    #[must_use]
    pub fn concat(parts: &[&Self]) -> Self {
        let valid: Vec<bool> = parts
            .iter()
            .flat_map(|p| (0..p.len).map(|i| p.is_valid(i)))
            .collect();
        Self::from_bools(&valid)
    }

    /// Deep copy with a freshly allocated buffer.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            bytes: Arc::new(self.bytes.as_ref().clone()),
            len: self.len,
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.is_valid(i))
    }
}

fn clear_tail(bytes: &mut [u8], len: usize) {
    let rem = len % 8;
    if rem != 0 {
        if let Some(last) = bytes.last_mut() {
            *last &= (1_u8 << rem) - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid_clears_tail_bits() {
        let bm = NullBitmap::new_valid(10);
        assert_eq!(bm.as_bytes(), &[0xFF, 0x03]);
        assert_eq!(bm, NullBitmap::from_bools(&[true; 10]));
    }

    #[test]
    fn set_and_count() {
        let mut bm = NullBitmap::new_valid(9);
        bm.set(3, false);
        bm.set(8, false);
        assert!(!bm.is_valid(3));
        assert!(bm.is_valid(4));
        assert_eq!(bm.count_nulls(), 2);
        bm.set(3, true);
        assert_eq!(bm.count_nulls(), 1);
    }

    #[test]
    fn set_does_not_leak_into_clones() {
        let original = NullBitmap::new_valid(4);
        let mut cloned = original.clone();
        cloned.set(0, false);
        assert!(original.is_valid(0));
        assert!(!cloned.is_valid(0));
    }

    #[test]
    fn take_with_missing_indices() {
        let bm = NullBitmap::from_bools(&[true, false, true]);
        let taken = bm.take(&[Some(2), None, Some(1), Some(0)]);
        assert_eq!(taken.iter().collect::<Vec<_>>(), vec![true, false, false, true]);
    }

    #[test]
    fn from_bytes_rejects_short_buffer() {
        assert!(NullBitmap::from_bytes(vec![0xFF], 9).is_err());
        let bm = NullBitmap::from_bytes(vec![0xFF, 0xFF], 9).unwrap();
        assert_eq!(bm.count_valid(), 9);
    }

    #[test]
    fn slice_and_concat_round_trip() {
        let bm = NullBitmap::from_bools(&[true, false, false, true, true]);
        let joined = NullBitmap::concat(&[&bm.slice(0..2), &bm.slice(2..5)]);
        assert_eq!(joined, bm);
    }
}
