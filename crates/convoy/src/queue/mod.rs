// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Per-destination growable message queue.
//!
//! One queue exists per execution context and is the *only* mechanism by
//! which another context can hand it data. The queue is a circular buffer
//! of owned [`Message`]s guarded by its own mutex:
//!
//! ```text
//!            head                      head+count
//!             v                            v
//! +-------+-------+-------+-------+-------+-------+
//! |       | msg 3 | msg 4 | msg 5 |       |       |   count <= capacity
//! +-------+-------+-------+-------+-------+-------+
//! ```
//!
//! # Protocol
//!
//! - `push` appends at the back. A full buffer grows by `GROWTH_FACTOR`
//!   into a fresh contiguous allocation, re-packed from the old wrap
//!   point so FIFO order survives; capacity only ever grows.
//! - `pop_front` never blocks: it returns `None` immediately when empty.
//!
//! Both operations hold the lock only for the duration of the buffer
//! mutation, so concurrent pushers and the single polling owner never
//! observe a partially moved element. Cross-sender interleaving is
//! unspecified; per-sender order is FIFO because each push is atomic
//! under the guard.

use crate::msg::Message;
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;

/// Initial ring capacity, in messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Capacity multiplier applied when the ring is full.
const GROWTH_FACTOR: usize = 3;

struct Ring {
    slots: Box<[Option<Message>]>,
    head: usize,
    count: usize,
    high_water: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: empty_slots(capacity),
            head: 0,
            count: 0,
            high_water: 0,
        }
    }

    /// Re-pack into a larger contiguous buffer starting at offset 0.
    fn grow(&mut self) {
        let old_cap = self.slots.len();
        let new_cap = old_cap * GROWTH_FACTOR;
        let mut slots = empty_slots(new_cap);
        for i in 0..self.count {
            slots[i] = self.slots[(self.head + i) % old_cap].take();
        }
        log::debug!("[queue] grew ring {} -> {} slots", old_cap, new_cap);
        self.slots = slots;
        self.head = 0;
    }
}

fn empty_slots(capacity: usize) -> Box<[Option<Message>]> {
    let mut v = Vec::with_capacity(capacity);
    v.resize_with(capacity, || None);
    v.into_boxed_slice()
}

/// Thread-safe growable FIFO of messages for one destination context.
///
/// Padded to a cache line so the per-destination queue array does not
/// false-share between contexts hammering different destinations.
pub struct MessageQueue {
    ring: CachePadded<Mutex<Ring>>,
}

impl MessageQueue {
    /// Create a queue with [`DEFAULT_QUEUE_CAPACITY`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a queue with a specific initial capacity (at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: CachePadded::new(Mutex::new(Ring::with_capacity(capacity.max(1)))),
        }
    }

    /// Append a message at the back, growing the ring if it is full.
    ///
    /// Never blocks on capacity and never drops an element; the only
    /// wait is brief lock contention with other pushers or the popper.
    pub fn push(&self, msg: Message) {
        let mut ring = self.ring.lock();
        if ring.count == ring.slots.len() {
            ring.grow();
        }
        let cap = ring.slots.len();
        let back = (ring.head + ring.count) % cap;
        ring.slots[back] = Some(msg);
        ring.count += 1;
        if ring.count > ring.high_water {
            ring.high_water = ring.count;
        }
    }

    /// Remove and return the oldest message, or `None` when empty.
    pub fn pop_front(&self) -> Option<Message> {
        let mut ring = self.ring.lock();
        if ring.count == 0 {
            return None;
        }
        let head = ring.head;
        let msg = ring.slots[head].take();
        debug_assert!(msg.is_some(), "occupied slot at head");
        ring.head = (head + 1) % ring.slots.len();
        ring.count -= 1;
        msg
    }

    /// Number of messages currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    /// True when no messages are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current ring capacity in slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }

    /// Maximum occupancy ever observed, for capacity planning.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.ring.lock().high_water
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use std::sync::Arc;
    use std::thread;

    fn arena() -> Arena {
        Arena::with_capacity(4 << 20).expect("map")
    }

    fn msg(arena: &Arena, tag: u32, seq: u32) -> Message {
        Message::new(arena, tag, &seq.to_ne_bytes()).expect("alloc")
    }

    fn seq_of(m: &Message) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(m.payload());
        u32::from_ne_bytes(raw)
    }

    #[test]
    fn fifo_order_single_sender() {
        let arena = arena();
        let q = MessageQueue::new();
        q.push(msg(&arena, 1, 0));
        q.push(msg(&arena, 1, 1));
        assert_eq!(seq_of(&q.pop_front().unwrap()), 0);
        assert_eq!(seq_of(&q.pop_front().unwrap()), 1);
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn pop_on_empty_returns_immediately() {
        let q = MessageQueue::with_capacity(4);
        assert!(q.pop_front().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn growth_preserves_order_across_wrap() {
        let arena = arena();
        let q = MessageQueue::with_capacity(4);

        // Advance head so the live region wraps before growth triggers.
        for i in 0..4 {
            q.push(msg(&arena, 1, i));
        }
        assert_eq!(seq_of(&q.pop_front().unwrap()), 0);
        assert_eq!(seq_of(&q.pop_front().unwrap()), 1);
        for i in 4..9 {
            q.push(msg(&arena, 1, i)); // forces wrap, then growth at i == 6
        }

        assert!(q.capacity() > 4);
        for expect in 2..9 {
            assert_eq!(seq_of(&q.pop_front().unwrap()), expect);
        }
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn capacity_plus_one_round_trip() {
        let arena = arena();
        let cap = 8;
        let q = MessageQueue::with_capacity(cap);
        for i in 0..=cap as u32 {
            q.push(msg(&arena, 1, i));
        }
        for expect in 0..=cap as u32 {
            assert_eq!(seq_of(&q.pop_front().unwrap()), expect);
        }
    }

    #[test]
    fn high_water_tracks_peak_not_current() {
        let arena = arena();
        let q = MessageQueue::with_capacity(8);
        for i in 0..5 {
            q.push(msg(&arena, 1, i));
        }
        while q.pop_front().is_some() {}
        assert_eq!(q.len(), 0);
        assert_eq!(q.high_water_mark(), 5);
    }

    #[test]
    fn concurrent_senders_no_loss_no_duplication() {
        const SENDERS: u32 = 8;
        const PER_SENDER: u32 = 500;

        let arena = arena();
        let q = Arc::new(MessageQueue::with_capacity(4)); // small: force growth under contention

        let mut handles = Vec::new();
        for tag in 0..SENDERS {
            let arena = arena.clone();
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for seq in 0..PER_SENDER {
                    q.push(msg(&arena, tag, seq));
                    if fastrand::u8(..) < 16 {
                        thread::yield_now();
                    }
                }
            }));
        }
        for h in handles {
            h.join().expect("sender");
        }

        let mut counts = vec![0u32; SENDERS as usize];
        let mut next_seq = vec![0u32; SENDERS as usize];
        while let Some(m) = q.pop_front() {
            let tag = m.handler() as usize;
            counts[tag] += 1;
            // Per-sender FIFO: sequence numbers from one tag arrive in order.
            assert_eq!(seq_of(&m), next_seq[tag]);
            next_seq[tag] += 1;
        }
        assert!(counts.iter().all(|&c| c == PER_SENDER));
        assert!(q.high_water_mark() <= q.capacity());
    }
}
