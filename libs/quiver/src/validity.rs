use quiver_abi::layout::{VALIDITY_WORD_BITS, validity_word_count};

/// Read view of a vector's validity bitmap over `len` rows.
///
/// `None` words is the engine's all-valid sentinel: no bitmap was ever
/// materialized for the vector.
#[derive(Debug, Clone, Copy)]
pub struct ValidityMask<'a> {
    words: Option<&'a [u64]>,
    len: usize,
}

impl<'a> ValidityMask<'a> {
    /// # Safety
    ///
    /// A non-null `words` must point to at least `validity_word_count(len)`
    /// words that stay valid and unmodified for `'a`.
    pub(crate) unsafe fn from_raw(words: *const u64, len: usize) -> Self {
        let words = (!words.is_null())
            .then(|| unsafe { std::slice::from_raw_parts(words, validity_word_count(len)) });
        Self { words, len }
    }

    pub fn all_valid(len: usize) -> Self {
        Self { words: None, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when no bitmap exists, so every row is valid without checking.
    pub fn is_all_valid(&self) -> bool {
        self.words.is_none()
    }

    #[inline]
    pub fn is_valid(&self, row: usize) -> bool {
        debug_assert!(row < self.len, "validity row {row} out of range {}", self.len);
        match self.words {
            None => true,
            Some(words) => is_set(words, row),
        }
    }

    pub fn null_count(&self) -> usize {
        match self.words {
            None => 0,
            Some(_) => (0..self.len).filter(|&row| !self.is_valid(row)).count(),
        }
    }

    /// Raw bitmap words, `None` when all rows are valid.
    pub fn words(&self) -> Option<&'a [u64]> {
        self.words
    }
}

/// Materialized validity bitmap of a writable vector.
///
/// Only obtainable through `ensure_validity_writable`, so the bitmap always
/// exists.
#[derive(Debug)]
pub struct WritableValidity<'a> {
    words: &'a mut [u64],
    len: usize,
}

impl<'a> WritableValidity<'a> {
    /// # Safety
    ///
    /// `words` must be non-null and point to `validity_word_count(len)`
    /// writable words exclusively borrowed for `'a`.
    pub(crate) unsafe fn from_raw(words: *mut u64, len: usize) -> Self {
        let words = unsafe { std::slice::from_raw_parts_mut(words, validity_word_count(len)) };
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_valid(&self, row: usize) -> bool {
        debug_assert!(row < self.len, "validity row {row} out of range {}", self.len);
        is_set(self.words, row)
    }

    #[inline]
    pub fn set_valid(&mut self, row: usize, valid: bool) {
        debug_assert!(row < self.len, "validity row {row} out of range {}", self.len);
        let mask = 1u64 << (row % VALIDITY_WORD_BITS);
        let word = &mut self.words[row / VALIDITY_WORD_BITS];
        if valid {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    pub fn set_all_valid(&mut self) {
        self.words.fill(u64::MAX);
    }

    pub fn as_mask(&self) -> ValidityMask<'_> {
        ValidityMask {
            words: Some(self.words),
            len: self.len,
        }
    }
}

#[inline]
fn is_set(words: &[u64], row: usize) -> bool {
    words[row / VALIDITY_WORD_BITS] & (1u64 << (row % VALIDITY_WORD_BITS)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_is_all_valid() {
        let mask = unsafe { ValidityMask::from_raw(std::ptr::null(), 2048) };
        assert!(mask.is_all_valid());
        assert!((0..2048).all(|row| mask.is_valid(row)));
        assert_eq!(mask.null_count(), 0);
    }

    #[test]
    fn bits_follow_engine_layout() {
        // Row 1 and row 64 are null.
        let words = [!0b10u64, !1u64];
        let mask = unsafe { ValidityMask::from_raw(words.as_ptr(), 128) };
        assert!(mask.is_valid(0));
        assert!(!mask.is_valid(1));
        assert!(mask.is_valid(63));
        assert!(!mask.is_valid(64));
        assert!(mask.is_valid(65));
        assert_eq!(mask.null_count(), 2);
    }

    #[test]
    fn writable_set_and_clear() {
        let mut words = [u64::MAX; 2];
        let mut validity = unsafe { WritableValidity::from_raw(words.as_mut_ptr(), 100) };
        validity.set_valid(70, false);
        validity.set_valid(3, false);
        validity.set_valid(3, true);
        assert!(!validity.is_valid(70));
        assert!(validity.is_valid(3));
        assert_eq!(validity.as_mask().null_count(), 1);
        validity.set_all_valid();
        assert!(validity.is_valid(70));
        assert_eq!(words, [u64::MAX; 2]);
    }
}
