//! Element layouts shared with the engine.
//!
//! Every struct here is `#[repr(C)]` and reproduces the engine's in-memory
//! representation exactly. The const assertions at the bottom pin size and
//! alignment so a layout change fails the build instead of corrupting data.

/// Strings up to this many bytes live inside the element itself.
pub const INLINE_STRING_LEN: usize = 12;

/// Rows covered by one validity word.
pub const VALIDITY_WORD_BITS: usize = 64;

/// Number of `u64` validity words needed for `rows` rows.
pub const fn validity_word_count(rows: usize) -> usize {
    rows.div_ceil(VALIDITY_WORD_BITS)
}

/// Per-row metadata of a list vector: `[offset, offset + length)` in the child.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ListEntry {
    pub offset: u64,
    pub length: u64,
}

impl ListEntry {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// One past the last child element of this row.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Interval value: months, days and microseconds are kept apart.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

/// Long-string form: prefix + pointer to externally owned bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StringPointer {
    pub length: u32,
    pub prefix: [u8; 4],
    pub ptr: *const u8,
}

/// Short-string form: bytes stored in place.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StringInlined {
    pub length: u32,
    pub inlined: [u8; INLINE_STRING_LEN],
}

/// One VARCHAR/BLOB element (16 bytes).
///
/// The leading `u32` length is shared by both forms and decides which one is
/// active: `<= 12` inline, otherwise pointer.
#[repr(C)]
#[derive(Clone, Copy)]
pub union StringElement {
    pub pointer: StringPointer,
    pub inlined: StringInlined,
}

impl StringElement {
    /// Build an inline element. `bytes` must be at most 12 bytes long.
    pub fn inlined(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > INLINE_STRING_LEN {
            return None;
        }
        let mut inlined = [0u8; INLINE_STRING_LEN];
        inlined[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            inlined: StringInlined {
                length: bytes.len() as u32,
                inlined,
            },
        })
    }

    /// Build a pointer element. The bytes behind `ptr` must outlive the element.
    pub fn pointing_to(bytes: &[u8]) -> Self {
        let mut prefix = [0u8; 4];
        let n = bytes.len().min(4);
        prefix[..n].copy_from_slice(&bytes[..n]);
        Self {
            pointer: StringPointer {
                length: bytes.len() as u32,
                prefix,
                ptr: bytes.as_ptr(),
            },
        }
    }

    pub fn len(&self) -> usize {
        // Both variants start with the length field.
        unsafe { self.inlined.length as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_inlined(&self) -> bool {
        self.len() <= INLINE_STRING_LEN
    }

    /// View the element's bytes.
    ///
    /// # Safety
    ///
    /// For pointer elements, `ptr` must reference `len()` readable bytes that
    /// stay alive for the returned lifetime.
    pub unsafe fn as_bytes(&self) -> &[u8] {
        let len = self.len();
        unsafe {
            if len <= INLINE_STRING_LEN {
                &self.inlined.inlined[..len]
            } else {
                std::slice::from_raw_parts(self.pointer.ptr, len)
            }
        }
    }
}

impl std::fmt::Debug for StringElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringElement")
            .field("len", &self.len())
            .field("inlined", &self.is_inlined())
            .finish()
    }
}

const _: () = assert!(size_of::<ListEntry>() == 16);
const _: () = assert!(size_of::<Interval>() == 16);
const _: () = assert!(size_of::<StringElement>() == 16);
const _: () = assert!(align_of::<StringElement>() == 8);
const _: () = assert!(std::mem::offset_of!(StringPointer, ptr) == 8);
const _: () = assert!(std::mem::offset_of!(StringInlined, inlined) == 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_boundary() {
        assert!(StringElement::inlined(b"exactly12byt").is_some());
        assert!(StringElement::inlined(b"thirteen byte").is_none());
    }

    #[test]
    fn inline_bytes_round_trip() {
        let el = StringElement::inlined(b"hello").unwrap();
        assert_eq!(el.len(), 5);
        assert!(el.is_inlined());
        assert_eq!(unsafe { el.as_bytes() }, b"hello");
    }

    #[test]
    fn pointer_element_keeps_prefix() {
        let text = b"a string longer than twelve bytes";
        let el = StringElement::pointing_to(text);
        assert!(!el.is_inlined());
        assert_eq!(unsafe { el.pointer.prefix }, *b"a st");
        assert_eq!(unsafe { el.as_bytes() }, text);
    }

    #[test]
    fn word_count() {
        assert_eq!(validity_word_count(0), 0);
        assert_eq!(validity_word_count(1), 1);
        assert_eq!(validity_word_count(64), 1);
        assert_eq!(validity_word_count(65), 2);
        assert_eq!(validity_word_count(2048), 32);
    }
}
