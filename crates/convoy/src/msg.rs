// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Arena-backed messages.
//!
//! # Wire Layout
//!
//! ```text
//! +----------------+---------------------------+
//! | handler id     | payload                   |
//! | u32, host-     | opaque bytes              |
//! | native, offset0|                           |
//! +----------------+---------------------------+
//! ```
//!
//! The 4-byte handler identifier at offset 0 is read by the external
//! handler dispatch table; its position is load-bearing and must not
//! move. A message has exactly one live owner at any time: sender until
//! enqueue, the destination queue while in flight, receiver after the
//! pop. The backing storage returns to the arena when the message is
//! dropped.

use crate::arena::{Arena, ArenaBuf};
use crate::error::{Error, Result};

/// Size of the handler identifier prefix, in bytes.
pub const HANDLER_ID_BYTES: usize = 4;

/// An opaque, handler-tagged message living in the shared arena.
pub struct Message {
    buf: ArenaBuf,
}

impl Message {
    /// Allocate a new message tagging `payload` with `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Allocation`] if the arena cannot hold
    /// `payload.len() + 4` bytes.
    pub fn new(arena: &Arena, handler: u32, payload: &[u8]) -> Result<Self> {
        let mut buf = arena.alloc(HANDLER_ID_BYTES + payload.len())?;
        buf[..HANDLER_ID_BYTES].copy_from_slice(&handler.to_ne_bytes());
        buf[HANDLER_ID_BYTES..].copy_from_slice(payload);
        Ok(Self { buf })
    }

    /// Rebuild a message from a full tagged buffer (header + payload),
    /// copying it into `arena`.
    ///
    /// # Errors
    ///
    /// [`Error::ProtocolMisuse`] if `bytes` is too short to hold the
    /// handler prefix; [`crate::Error::Allocation`] if the arena cannot
    /// hold the copy.
    pub fn from_bytes(arena: &Arena, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HANDLER_ID_BYTES {
            return Err(Error::ProtocolMisuse(format!(
                "tagged buffer needs at least {HANDLER_ID_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = arena.alloc(bytes.len())?;
        buf.copy_from_slice(bytes);
        Ok(Self { buf })
    }

    /// Handler identifier stored at offset 0.
    #[must_use]
    pub fn handler(&self) -> u32 {
        let mut raw = [0u8; HANDLER_ID_BYTES];
        raw.copy_from_slice(&self.buf[..HANDLER_ID_BYTES]);
        u32::from_ne_bytes(raw)
    }

    /// Overwrite the handler identifier in place.
    pub fn set_handler(&mut self, handler: u32) {
        self.buf[..HANDLER_ID_BYTES].copy_from_slice(&handler.to_ne_bytes());
    }

    /// Payload bytes (everything after the handler prefix).
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buf[HANDLER_ID_BYTES..]
    }

    /// Mutable view of the payload.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[HANDLER_ID_BYTES..]
    }

    /// Full tagged buffer, header included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total size in bytes, header included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True only for a degenerate zero-byte buffer; tagged messages are
    /// never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Copy this message into a fresh arena buffer.
    ///
    /// Used by the copying send path: the sender keeps its original,
    /// the copy crosses the context boundary.
    pub fn try_clone_in(&self, arena: &Arena) -> Result<Self> {
        Self::from_bytes(arena, self.as_bytes())
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("handler", &self.handler())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> Arena {
        Arena::with_capacity(64 * 1024).expect("map")
    }

    #[test]
    fn handler_occupies_first_four_bytes_native_endian() {
        let arena = arena();
        let msg = Message::new(&arena, 0xDEAD_BEEF, b"xyz").expect("alloc");
        assert_eq!(msg.handler(), 0xDEAD_BEEF);
        assert_eq!(&msg.as_bytes()[..4], &0xDEAD_BEEFu32.to_ne_bytes());
        assert_eq!(&msg.as_bytes()[4..], b"xyz");
    }

    #[test]
    fn set_handler_rewrites_prefix_only() {
        let arena = arena();
        let mut msg = Message::new(&arena, 1, b"payload").expect("alloc");
        msg.set_handler(42);
        assert_eq!(msg.handler(), 42);
        assert_eq!(msg.payload(), b"payload");
    }

    #[test]
    fn clone_is_byte_identical_but_distinct_storage() {
        let arena = arena();
        let mut msg = Message::new(&arena, 9, b"original").expect("alloc");
        let copy = msg.try_clone_in(&arena).expect("clone");
        msg.payload_mut()[0] = b'X';
        assert_eq!(copy.payload(), b"original");
        assert_eq!(copy.handler(), 9);
    }

    #[test]
    fn empty_payload_is_header_only() {
        let arena = arena();
        let msg = Message::new(&arena, 3, &[]).expect("alloc");
        assert_eq!(msg.len(), HANDLER_ID_BYTES);
        assert!(msg.payload().is_empty());
    }

    #[test]
    fn undersized_buffer_is_misuse() {
        let arena = arena();
        // Shorter than the handler prefix: never a valid message.
        let err = Message::from_bytes(&arena, &[1, 2]).unwrap_err();
        assert!(matches!(err, Error::ProtocolMisuse(_)));
        let err = Message::from_bytes(&arena, &[]).unwrap_err();
        assert!(matches!(err, Error::ProtocolMisuse(_)));
    }

    #[test]
    fn storage_returns_to_arena_on_drop() {
        let arena = arena();
        let before = arena.bytes_free();
        let msg = Message::new(&arena, 1, &[0u8; 100]).expect("alloc");
        assert!(arena.bytes_free() < before);
        drop(msg);
        assert_eq!(arena.bytes_free(), before);
    }
}
