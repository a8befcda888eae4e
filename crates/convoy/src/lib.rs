// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! # convoy: shared-memory execution-context multiplexing substrate
//!
//! The lowest layer of a parallel runtime: it multiplexes N logical
//! execution contexts ("PEs") across OS threads attached to one shared
//! memory arena, and provides the only channel through which contexts
//! exchange messages: point-to-point sends, broadcasts, and a
//! topology-aware spanning-tree builder that shapes collective fan-out.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |              task / object scheduling (out of scope)          |
//! +--------------------------------------------------------------+
//! |  Messaging primitives: send_to / broadcast / get_* polls      |
//! |  Spanning trees: build_generation (collective fan-out shape)  |
//! +--------------------------------------------------------------+
//! |  MessageQueue: one growable locked ring per destination       |
//! +--------------------------------------------------------------+
//! |  Arena + bootstrap: one shared mapping, N contexts, barriers  |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convoy::{Context, Runtime, Result};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let mut args: Vec<String> = std::env::args().collect();
//!     let entry: Arc<convoy::EntryFn> = Arc::new(|ctx: &mut Context, _args: &[String]| {
//!         if ctx.id() == 0 {
//!             let hello = ctx.message(0, b"hello").expect("alloc");
//!             ctx.broadcast(&hello, false).expect("broadcast");
//!         } else {
//!             loop {
//!                 if let Some(msg) = ctx.get_non_local() {
//!                     println!("ctx {} got {:?}", ctx.id(), msg.payload());
//!                     break;
//!                 }
//!                 std::thread::yield_now();
//!             }
//!         }
//!     });
//!     Runtime::init(&mut args, entry, None, false, false)
//! }
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Runtime`] | Bootstrap: spawns N contexts sharing one arena |
//! | [`Context`] | One execution context and its messaging surface |
//! | [`Message`] | Handler-tagged arena buffer, single live owner |
//! | [`MessageQueue`] | Per-destination growable locked ring |
//! | [`Arena`] | Fixed-size shared mapping, fail-fast allocator |
//! | [`SpanningTreeVertex`] | One generation of a collective fan-out tree |
//!
//! ## Invariants
//!
//! - Per-sender, per-destination FIFO; cross-sender order unspecified.
//! - Pops never block; pushes never block on capacity (rings grow).
//! - Self-sends are visible only through [`Context::get_local`].
//! - Every error in this crate is fatal by contract; there is no retry
//!   or degraded mode below the scheduling layer.

pub mod arena;
pub mod error;
pub mod msg;
pub mod queue;
pub mod runtime;
pub mod topo;

pub use arena::{Arena, ArenaBuf, DEFAULT_ARENA_BYTES};
pub use error::{Error, Result};
pub use msg::{Message, HANDLER_ID_BYTES};
pub use queue::{MessageQueue, DEFAULT_QUEUE_CAPACITY};
pub use runtime::{Context, Dispatch, EntryFn, LaunchOptions, Runtime};
pub use topo::{
    build_generation, build_generation_unaware, NodeLocality, NodeMap, SpanningTreeVertex,
    VertexId,
};
