// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Shared memory arena: one fixed-size region for all cross-context state.
//!
//! The arena is created once, before any execution context exists, and
//! every message that crosses a context boundary lives inside it. Contexts
//! are OS threads attached to a single anonymous shared mapping, so a
//! buffer allocated by one context is addressable by all of them; the
//! [`ArenaBuf`] handle carries exclusive ownership of its byte range and
//! returns the range to the allocator on drop.
//!
//! # Layout
//!
//! ```text
//! +--------------------------------------------------------------+
//! | anonymous shared mmap, sized at launch (+memsize, default 16M)|
//! |  [buf] [buf]      [free]        [buf]   [free]               |
//! +--------------------------------------------------------------+
//! ```
//!
//! Allocation is first-fit over an offset-sorted free list, guarded by a
//! single [`parking_lot::Mutex`]. Freed blocks coalesce with adjacent
//! neighbours. The region never grows: exhaustion is a fatal
//! [`Error::Allocation`], matching the fail-fast discipline of the layer.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::ptr;
use std::slice;
use std::sync::Arc;

/// Allocation granularity and alignment, in bytes.
const ALIGN: usize = 8;

/// Default arena size when no `+memsize` option is given: 16 MiB.
pub const DEFAULT_ARENA_BYTES: usize = 16 * 1024 * 1024;

fn align_up(len: usize) -> usize {
    let len = len.max(1);
    (len + ALIGN - 1) & !(ALIGN - 1)
}

/// A free block, identified by offset into the mapping.
#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    offset: usize,
    len: usize,
}

/// Free-list state, offset-sorted so adjacent blocks can coalesce.
struct FreeList {
    blocks: Vec<FreeBlock>,
    free_bytes: usize,
}

impl FreeList {
    fn new(size: usize) -> Self {
        Self {
            blocks: vec![FreeBlock {
                offset: 0,
                len: size,
            }],
            free_bytes: size,
        }
    }

    /// First-fit allocation. Returns the offset of the carved block.
    fn allocate(&mut self, len: usize) -> Option<usize> {
        let pos = self.blocks.iter().position(|b| b.len >= len)?;
        let block = &mut self.blocks[pos];
        let offset = block.offset;
        if block.len == len {
            self.blocks.remove(pos);
        } else {
            block.offset += len;
            block.len -= len;
        }
        self.free_bytes -= len;
        Some(offset)
    }

    /// Return a block, merging with adjacent free neighbours.
    fn release(&mut self, offset: usize, len: usize) {
        self.free_bytes += len;
        let pos = self
            .blocks
            .binary_search_by(|b| b.offset.cmp(&offset))
            .unwrap_err();

        let merges_prev = pos > 0 && {
            let prev = self.blocks[pos - 1];
            prev.offset + prev.len == offset
        };
        let merges_next = pos < self.blocks.len() && offset + len == self.blocks[pos].offset;

        match (merges_prev, merges_next) {
            (true, true) => {
                let next_len = self.blocks[pos].len;
                self.blocks[pos - 1].len += len + next_len;
                self.blocks.remove(pos);
            }
            (true, false) => self.blocks[pos - 1].len += len,
            (false, true) => {
                self.blocks[pos].offset = offset;
                self.blocks[pos].len += len;
            }
            (false, false) => self.blocks.insert(pos, FreeBlock { offset, len }),
        }
    }
}

/// Shared state behind every [`Arena`] and [`ArenaBuf`] handle.
struct ArenaInner {
    /// Base of the anonymous shared mapping.
    base: *mut u8,
    /// Mapping size in bytes.
    size: usize,
    /// Allocator state.
    state: Mutex<FreeList>,
}

// SAFETY: `base` points to an anonymous shared mapping that lives as long
// as this struct. All mutation of allocator state goes through the mutex,
// and each allocated byte range is exclusively owned by a single ArenaBuf.
unsafe impl Send for ArenaInner {}
unsafe impl Sync for ArenaInner {}

impl Drop for ArenaInner {
    fn drop(&mut self) {
        // SAFETY: base/size describe the mapping returned by mmap in
        // Arena::with_capacity, and no ArenaBuf can outlive the Arc.
        unsafe {
            libc::munmap(self.base.cast::<libc::c_void>(), self.size);
        }
    }
}

/// Handle to the shared memory arena.
///
/// Cheap to clone; every execution context holds one. The mapping is
/// unmapped when the last handle (including outstanding [`ArenaBuf`]s)
/// is dropped, which by construction happens after the teardown barrier.
#[derive(Clone)]
pub struct Arena {
    inner: Arc<ArenaInner>,
}

impl Arena {
    /// Create an arena backed by an anonymous shared mapping of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the size is zero or the mapping
    /// cannot be established.
    pub fn with_capacity(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Allocation {
                requested: 0,
                available: None,
            });
        }

        // SAFETY:
        // - First argument is null, letting the kernel choose the address
        // - PROT_READ | PROT_WRITE are valid protections for a heap-like region
        // - MAP_SHARED | MAP_ANONYMOUS needs no fd (-1) and zero-fills the pages
        // - mmap returns MAP_FAILED on error (checked below)
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            log::error!(
                "[arena] cannot map {} bytes: {}",
                size,
                std::io::Error::last_os_error()
            );
            return Err(Error::Allocation {
                requested: size,
                available: None,
            });
        }

        log::debug!("[arena] mapped {} bytes", size);

        Ok(Self {
            inner: Arc::new(ArenaInner {
                base: base.cast::<u8>(),
                size,
                state: Mutex::new(FreeList::new(size)),
            }),
        })
    }

    /// Allocate `len` bytes from the arena.
    ///
    /// The returned buffer is zeroed only on first use of the mapping;
    /// callers are expected to overwrite it fully.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] when no free block can satisfy the
    /// request. The arena never grows.
    pub fn alloc(&self, len: usize) -> Result<ArenaBuf> {
        let padded = align_up(len);
        let offset = {
            let mut state = self.inner.state.lock();
            state.allocate(padded).ok_or(Error::Allocation {
                requested: len,
                available: Some(state.free_bytes),
            })?
        };
        Ok(ArenaBuf {
            inner: Arc::clone(&self.inner),
            offset,
            len,
        })
    }

    /// Total size of the mapping in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.size
    }

    /// Bytes currently available to allocate (ignoring fragmentation).
    #[must_use]
    pub fn bytes_free(&self) -> usize {
        self.inner.state.lock().free_bytes
    }
}

/// Exclusively owned byte range inside the arena.
///
/// Dereferences to `[u8]`. Ownership may move between contexts (the
/// mapping is visible to all of them); the range is returned to the
/// allocator when the buffer is dropped.
pub struct ArenaBuf {
    inner: Arc<ArenaInner>,
    offset: usize,
    len: usize,
}

impl ArenaBuf {
    /// Length of the buffer in bytes (as requested, not padded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the buffer holds zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::ops::Deref for ArenaBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: offset+len lie inside the mapping (carved by the
        // allocator) and this ArenaBuf exclusively owns the range.
        unsafe { slice::from_raw_parts(self.inner.base.add(self.offset), self.len) }
    }
}

impl std::ops::DerefMut for ArenaBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self guarantees no other reference to
        // this range exists.
        unsafe { slice::from_raw_parts_mut(self.inner.base.add(self.offset), self.len) }
    }
}

impl Drop for ArenaBuf {
    fn drop(&mut self) {
        self.inner
            .state
            .lock()
            .release(self.offset, align_up(self.len));
    }
}

impl std::fmt::Debug for ArenaBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaBuf")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}
