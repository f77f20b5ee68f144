use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::cell::Cell;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Alignment of every engine buffer. Covers `u64`, pointers and 16-byte elements.
const BUFFER_ALIGN: usize = 16;

// ═══════════════════════════════════════════════════════════════
//  Live handle accounting
// ═══════════════════════════════════════════════════════════════

/// Snapshot of engine allocations alive on the calling thread.
///
/// Tests compare snapshots taken before and after a scope to prove that
/// every owned handle was released exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveHandles {
    pub types: usize,
    pub vectors: usize,
    pub chunks: usize,
    pub values: usize,
    pub selections: usize,
    pub results: usize,
    pub buffers: usize,
}

thread_local! {
    static LIVE: Cell<LiveHandles> = const { Cell::new(LiveHandles {
        types: 0,
        vectors: 0,
        chunks: 0,
        values: 0,
        selections: 0,
        results: 0,
        buffers: 0,
    }) };
}

/// Current allocation counters of this thread.
pub fn live_handles() -> LiveHandles {
    LIVE.with(Cell::get)
}

pub(crate) fn track(update: impl FnOnce(&mut LiveHandles)) {
    LIVE.with(|live| {
        let mut counts = live.get();
        update(&mut counts);
        live.set(counts);
    });
}

// ═══════════════════════════════════════════════════════════════
//  Buffer
// ═══════════════════════════════════════════════════════════════

/// Zero-initialized, 16-byte aligned heap block.
///
/// Data pointers handed across the ABI point into these blocks and stay
/// valid until the block is dropped or grown.
pub(crate) struct Buffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl Buffer {
    pub fn zeroed(len: usize) -> Self {
        let layout = Self::layout(len);
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };
        track(|live| live.buffers += 1);
        Self { ptr, len }
    }

    pub fn filled(len: usize, byte: u8) -> Self {
        let buffer = Self::zeroed(len);
        unsafe { std::ptr::write_bytes(buffer.ptr.as_ptr(), byte, len) };
        buffer
    }

    fn layout(len: usize) -> Layout {
        // Zero-sized allocations are not allowed; keep a minimum block.
        match Layout::from_size_align(len.max(BUFFER_ALIGN), BUFFER_ALIGN) {
            Ok(layout) => layout,
            Err(_) => handle_alloc_error(Layout::new::<u8>()),
        }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// New buffer of `len` bytes holding a prefix copy of `self`; the tail is
    /// filled with `fill`.
    pub fn resized(&self, len: usize, fill: u8) -> Self {
        let mut next = Self::filled(len, fill);
        let keep = self.len.min(len);
        next.as_mut_slice()[..keep].copy_from_slice(&self.as_slice()[..keep]);
        next
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.len)) };
        track(|live| live.buffers -= 1);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Engine allocator entry points
// ═══════════════════════════════════════════════════════════════

/// Size header in front of every `qv_malloc` block.
const HEADER: usize = BUFFER_ALIGN;

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_malloc(size: usize) -> *mut c_void {
    let Ok(layout) = Layout::from_size_align(size + HEADER, BUFFER_ALIGN) else {
        return std::ptr::null_mut();
    };
    unsafe {
        let base = alloc_zeroed(layout);
        if base.is_null() {
            return std::ptr::null_mut();
        }
        base.cast::<usize>().write(size);
        base.add(HEADER).cast()
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let base = ptr.cast::<u8>().sub(HEADER);
        let size = base.cast::<usize>().read();
        let layout = Layout::from_size_align_unchecked(size + HEADER, BUFFER_ALIGN);
        dealloc(base, layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_counted_and_zeroed() {
        let before = live_handles().buffers;
        {
            let buffer = Buffer::zeroed(40);
            assert_eq!(live_handles().buffers, before + 1);
            assert!(buffer.as_slice().iter().all(|b| *b == 0));
            assert_eq!(buffer.as_ptr() as usize % BUFFER_ALIGN, 0);
        }
        assert_eq!(live_handles().buffers, before);
    }

    #[test]
    fn resize_keeps_prefix() {
        let mut buffer = Buffer::zeroed(4);
        buffer.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        let grown = buffer.resized(6, 0xFF);
        assert_eq!(grown.as_slice(), &[1, 2, 3, 4, 0xFF, 0xFF]);
    }

    #[test]
    fn malloc_free_round_trip() {
        unsafe {
            let ptr = qv_malloc(24).cast::<u8>();
            assert!(!ptr.is_null());
            ptr.write_bytes(7, 24);
            qv_free(ptr.cast());
            qv_free(std::ptr::null_mut());
        }
    }
}
