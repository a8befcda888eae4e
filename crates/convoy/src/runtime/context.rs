// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Execution contexts and the messaging primitives.
//!
//! A [`Context`] is one logical participant in the run, pinned to one OS
//! thread. All identity travels in the context value itself; there is
//! no ambient "current PE" global. The context owns two inbound paths:
//!
//! - its slot in the shared per-destination [`MessageQueue`] array,
//!   polled with [`Context::get_non_local`]
//! - a private, unlocked local FIFO, polled with [`Context::get_local`]
//!
//! Self-sends always take the local FIFO and never touch the shared
//! queue or its lock. A correct receive cycle polls both paths;
//! [`Context::poll_loop`] alternates them every iteration so neither
//! starves.
//!
//! All sends are synchronous enqueues: they are complete the moment the
//! message sits in the destination queue (or local FIFO). There is no
//! completion handle to wait on.

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::msg::Message;
use crate::queue::MessageQueue;
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};

/// State shared by every context of one run.
pub(crate) struct Shared {
    pub(crate) arena: Arena,
    pub(crate) queues: Box<[MessageQueue]>,
    pub(crate) count: usize,
    pub(crate) start_barrier: Barrier,
    pub(crate) done_barrier: Barrier,
}

impl Shared {
    pub(crate) fn new(arena: Arena, count: usize) -> Self {
        Self {
            arena,
            queues: (0..count).map(|_| MessageQueue::new()).collect(),
            count,
            start_barrier: Barrier::new(count),
            done_barrier: Barrier::new(count),
        }
    }
}

/// One execution context: identity plus the communication surface.
///
/// Immutable identity (`id`, `rank`, `count`) established at bootstrap;
/// the private local FIFO is exclusively owned and never locked.
pub struct Context {
    id: usize,
    rank: usize,
    shared: Arc<Shared>,
    local: VecDeque<Message>,
    stop: bool,
}

impl Context {
    pub(crate) fn new(id: usize, shared: Arc<Shared>) -> Self {
        Self {
            id,
            // All contexts share one physical shared-memory node in this
            // bootstrap, so the node-local rank is always 0.
            rank: 0,
            shared,
            local: VecDeque::new(),
            stop: false,
        }
    }

    /// This context's id, in `[0, count)`.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Node-local rank of this context.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of contexts in the run.
    #[must_use]
    pub fn count(&self) -> usize {
        self.shared.count
    }

    /// The shared arena all cross-context buffers come from.
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.shared.arena
    }

    /// Allocate a tagged message in the shared arena.
    ///
    /// # Errors
    ///
    /// [`Error::Allocation`] if the arena is exhausted.
    pub fn message(&self, handler: u32, payload: &[u8]) -> Result<Message> {
        Message::new(&self.shared.arena, handler, payload)
    }

    fn check_dest(&self, dest: usize) -> Result<()> {
        if dest >= self.shared.count {
            return Err(Error::ProtocolMisuse(format!(
                "destination {} out of range (count {})",
                dest, self.shared.count
            )));
        }
        Ok(())
    }

    /// Send a copy of `msg` to context `dest`.
    ///
    /// The copy is enqueued on the destination's shared queue; the
    /// sender keeps `msg`. A self-send bypasses the locked shared path
    /// and lands in the caller's private local FIFO instead.
    ///
    /// Fire-and-forget: complete once enqueued. Sending to a context
    /// that has already passed the teardown barrier is undefined at
    /// this layer.
    ///
    /// # Errors
    ///
    /// [`Error::ProtocolMisuse`] for an out-of-range destination;
    /// [`Error::Allocation`] if the copy cannot be allocated.
    pub fn send_to(&mut self, dest: usize, msg: &Message) -> Result<()> {
        self.check_dest(dest)?;
        let copy = msg.try_clone_in(&self.shared.arena)?;
        #[cfg(feature = "trace")]
        log::trace!(
            "[comm] {} -> {} handler={} len={}",
            self.id,
            dest,
            msg.handler(),
            msg.len()
        );
        if dest == self.id {
            self.local.push_back(copy);
        } else {
            self.shared.queues[dest].push(copy);
        }
        Ok(())
    }

    /// Send `msg` to context `dest`, transferring ownership.
    ///
    /// Arena buffers are addressable from every context, so the remote
    /// path enqueues the original without copying. A self-send moves the
    /// message straight into the local FIFO, the cheapest path there is.
    ///
    /// # Errors
    ///
    /// [`Error::ProtocolMisuse`] for an out-of-range destination.
    pub fn send(&mut self, dest: usize, msg: Message) -> Result<()> {
        self.check_dest(dest)?;
        if dest == self.id {
            self.local.push_back(msg);
        } else {
            self.shared.queues[dest].push(msg);
        }
        Ok(())
    }

    /// Send a copy of `msg` to every other context; with `include_self`,
    /// additionally deliver one copy to the caller's own local FIFO.
    ///
    /// # Errors
    ///
    /// [`Error::Allocation`] if any copy cannot be allocated. Copies
    /// already enqueued stay enqueued; the error is fatal by contract
    /// anyway.
    pub fn broadcast(&mut self, msg: &Message, include_self: bool) -> Result<()> {
        for dest in 0..self.shared.count {
            if dest != self.id {
                self.send_to(dest, msg)?;
            }
        }
        if include_self {
            let copy = msg.try_clone_in(&self.shared.arena)?;
            self.local.push_back(copy);
        }
        Ok(())
    }

    /// Include-self broadcast that consumes the message: copies go to
    /// every other context, the original moves into the caller's local
    /// FIFO without another allocation.
    ///
    /// # Errors
    ///
    /// [`Error::Allocation`] if a copy cannot be allocated.
    pub fn broadcast_owned(&mut self, msg: Message) -> Result<()> {
        for dest in 0..self.shared.count {
            if dest != self.id {
                self.send_to(dest, &msg)?;
            }
        }
        self.local.push_back(msg);
        Ok(())
    }

    /// Poll this context's shared queue. Never blocks.
    pub fn get_non_local(&mut self) -> Option<Message> {
        self.shared.queues[self.id].pop_front()
    }

    /// Poll the private local FIFO. Never blocks, never locks.
    pub fn get_local(&mut self) -> Option<Message> {
        self.local.pop_front()
    }

    /// High-water mark of this context's shared queue, for diagnostics.
    #[must_use]
    pub fn queue_high_water_mark(&self) -> usize {
        self.shared.queues[self.id].high_water_mark()
    }

    /// Ask this context's poll loop to wind down.
    ///
    /// Each context stops only itself; a run-wide shutdown is a
    /// broadcast whose handler calls this on every context. Messages
    /// still queued when the loop exits stay undelivered.
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    /// Whether this context has been asked to stop.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop
    }

    /// Deliver messages to `dispatch` until a stop is requested.
    ///
    /// Each iteration polls the local FIFO first, then the shared
    /// queue, so neither path can starve the other. Yields the thread
    /// when both are empty.
    pub fn poll_loop<F>(&mut self, dispatch: &mut F)
    where
        F: FnMut(&mut Context, Message),
    {
        while !self.stop_requested() {
            let mut idle = true;
            if let Some(msg) = self.get_local() {
                idle = false;
                dispatch(self, msg);
            }
            if self.stop_requested() {
                break;
            }
            if let Some(msg) = self.get_non_local() {
                idle = false;
                dispatch(self, msg);
            }
            if idle {
                std::thread::yield_now();
            }
        }
    }

    /// Rendezvous before user code runs.
    pub(crate) fn wait_start(&self) {
        self.shared.start_barrier.wait();
    }

    /// Rendezvous before teardown; no context exits until all arrive.
    pub(crate) fn wait_done(&self) {
        self.shared.done_barrier.wait();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("rank", &self.rank)
            .field("count", &self.shared.count)
            .field("local_pending", &self.local.len())
            .finish()
    }
}
