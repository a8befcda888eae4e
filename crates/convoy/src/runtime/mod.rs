// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Multi-context bootstrap and teardown.
//!
//! # Lifecycle
//!
//! ```text
//! Runtime::init / Runtime::launch            (calling thread = context 0)
//!   |-- parse +p / +memsize          -> Error::Config on bad values
//!   |-- map shared arena             -> Error::Allocation on failure
//!   |-- allocate N message queues
//!   |-- spawn contexts 1..N          (threads attached to the arena)
//!   |
//!   |  per context:
//!   |    startup barrier
//!   |    entry(ctx, args)
//!   |    poll_loop(dispatch)         (until Context::request_stop)
//!   |    teardown barrier
//!   |
//!   '-- context 0 joins every thread, then returns
//! ```
//!
//! Failures after the spawn point are fatal: a half-bootstrapped run has
//! no safe state to fall back to, so the process logs and aborts rather
//! than attempting partial recovery. Pre-spawn failures come back as
//! `Err` so embedders (and tests) can observe the taxonomy.
//!
//! A context whose entry or dispatch panics still releases the teardown
//! barrier; the panic is re-raised on the launching thread once every
//! context has been joined, so a dying context takes the run down
//! instead of leaving the others parked at the barrier forever.

mod args;
mod context;

pub use args::LaunchOptions;
pub use context::Context;

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::msg::Message;
use context::Shared;
use std::sync::Arc;
use std::thread;

/// Entry function run by every context after the startup barrier.
///
/// Receives the context and the argument list with the bootstrap
/// options already stripped.
pub type EntryFn = dyn Fn(&mut Context, &[String]) + Send + Sync;

/// Handler dispatch table, owned by the layer above.
///
/// The poll loop hands every delivered message here; implementations
/// typically read [`Message::handler`] and index a registration table.
pub trait Dispatch: Send + Sync {
    /// Consume one delivered message.
    fn dispatch(&self, ctx: &mut Context, msg: Message);
}

/// The multi-context runtime bootstrap.
pub struct Runtime;

impl Runtime {
    /// Bootstrap from a raw argument list.
    ///
    /// Strips the two recognized options out of `args` (everything else
    /// passes through to `entry` unchanged), then launches. `scheduler`
    /// and `return_early` control context 0 only, mirroring the classic
    /// machine-layer entry point: contexts 1..N always run `entry` and,
    /// given a dispatch table, the poll loop.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for bad option values, [`Error::Allocation`]
    /// if the arena cannot be mapped.
    pub fn init(
        args: &mut Vec<String>,
        entry: Arc<EntryFn>,
        dispatch: Option<Arc<dyn Dispatch>>,
        scheduler: bool,
        return_early: bool,
    ) -> Result<()> {
        let mut opts = LaunchOptions::parse(args)?;
        opts.root_scheduler = scheduler;
        opts.root_skips_entry = return_early;
        Self::launch(&opts, args.clone(), entry, dispatch)
    }

    /// Launch `opts.count` contexts and run them to completion.
    ///
    /// The calling thread becomes context 0 and does not return until
    /// every other context has terminated at the OS level.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the context count is zero,
    /// [`Error::Allocation`] if the arena cannot be mapped. A thread
    /// that cannot be spawned aborts the process.
    ///
    /// # Panics
    ///
    /// Re-raises the panic of any context whose entry or dispatch
    /// panicked, after the teardown barrier has released the rest.
    pub fn launch(
        opts: &LaunchOptions,
        args: Vec<String>,
        entry: Arc<EntryFn>,
        dispatch: Option<Arc<dyn Dispatch>>,
    ) -> Result<()> {
        if opts.count == 0 {
            return Err(Error::Config(
                "requested context count must be positive (got 0)".into(),
            ));
        }

        let arena = Arena::with_capacity(opts.arena_bytes)?;
        let shared = Arc::new(Shared::new(arena, opts.count));
        log::debug!(
            "[boot] launching {} contexts, arena {} bytes",
            opts.count,
            opts.arena_bytes
        );

        let args = Arc::new(args);
        let mut handles = Vec::with_capacity(opts.count.saturating_sub(1));
        for id in 1..opts.count {
            let shared = Arc::clone(&shared);
            let args = Arc::clone(&args);
            let entry = Arc::clone(&entry);
            let dispatch = dispatch.clone();
            let builder = thread::Builder::new().name(format!("convoy-ctx-{id}"));
            match builder.spawn(move || {
                context_main(id, shared, &args, &entry, dispatch.as_deref(), true, true);
            }) {
                Ok(handle) => handles.push(handle),
                Err(e) => fatal(&format!("cannot spawn context {id}: {e}")),
            }
        }

        context_main(
            0,
            shared,
            &args,
            &entry,
            dispatch.as_deref(),
            !opts.root_skips_entry,
            opts.root_scheduler,
        );

        // Context 0 waits for every other context's OS-level exit. A
        // panicked context has already passed the teardown barrier
        // (context_main catches the unwind first); its payload is
        // re-raised here so the run terminates loudly.
        for handle in handles {
            if let Err(payload) = handle.join() {
                log::error!("[boot] a context terminated abnormally");
                std::panic::resume_unwind(payload);
            }
        }
        log::debug!("[boot] run complete");
        Ok(())
    }
}

/// Body of every execution context, context 0 included.
fn context_main(
    id: usize,
    shared: Arc<Shared>,
    args: &[String],
    entry: &Arc<EntryFn>,
    dispatch: Option<&dyn Dispatch>,
    run_entry: bool,
    run_scheduler: bool,
) {
    let mut ctx = Context::new(id, shared);
    log::debug!("[boot] context {}/{} up", id, ctx.count());
    ctx.wait_start();

    // The teardown barrier must be reached even if user code panics;
    // unwinding past it would park every other context forever.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        if run_entry {
            (entry.as_ref())(&mut ctx, args);
            if run_scheduler {
                if let Some(table) = dispatch {
                    ctx.poll_loop(&mut |c, m| table.dispatch(c, m));
                }
            }
        }
    }));
    if outcome.is_err() {
        log::error!("[boot] context {} panicked", id);
    }

    ctx.wait_done();
    log::debug!("[boot] context {} down", id);

    if let Err(payload) = outcome {
        std::panic::resume_unwind(payload);
    }
}

/// Bootstrap failures past the spawn point have no safe recovery path.
fn fatal(msg: &str) -> ! {
    log::error!("[boot] fatal: {msg}");
    eprintln!("convoy fatal: {msg}");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn entry_noop() -> Arc<EntryFn> {
        Arc::new(|_ctx: &mut Context, _args: &[String]| {})
    }

    #[test]
    fn zero_count_is_config_error() {
        let opts = LaunchOptions {
            count: 0,
            ..LaunchOptions::default()
        };
        let err = Runtime::launch(&opts, Vec::new(), entry_noop(), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn single_context_runs_entry_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let entry: Arc<EntryFn> = Arc::new(move |ctx, _| {
            assert_eq!(ctx.id(), 0);
            assert_eq!(ctx.count(), 1);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let opts = LaunchOptions {
            arena_bytes: 1 << 20,
            ..LaunchOptions::default()
        };
        Runtime::launch(&opts, Vec::new(), entry, None).expect("launch");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_context_gets_distinct_identity() {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let sink = ids.clone();
        let entry: Arc<EntryFn> = Arc::new(move |ctx, _| {
            assert_eq!(ctx.rank(), 0);
            sink.lock().unwrap().push(ctx.id());
        });
        let opts = LaunchOptions {
            count: 4,
            arena_bytes: 1 << 20,
            ..LaunchOptions::default()
        };
        Runtime::launch(&opts, Vec::new(), entry, None).expect("launch");

        let mut ids = ids.lock().unwrap().clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn init_strips_options_and_passes_rest_through() {
        let seen_args = Arc::new(Mutex::new(Vec::new()));
        let sink = seen_args.clone();
        let entry: Arc<EntryFn> = Arc::new(move |ctx, args| {
            if ctx.id() == 0 {
                *sink.lock().unwrap() = args.to_vec();
            }
        });
        let mut args = vec![
            "prog".to_string(),
            "+p2".to_string(),
            "--flag".to_string(),
            "+memsize".to_string(),
            "1".to_string(),
        ];
        Runtime::init(&mut args, entry, None, true, false).expect("init");
        assert_eq!(args, vec!["prog".to_string(), "--flag".to_string()]);
        assert_eq!(*seen_args.lock().unwrap(), args);
    }

    #[test]
    fn panicking_context_releases_the_run() {
        let survivors = Arc::new(AtomicUsize::new(0));
        let seen = survivors.clone();
        let entry: Arc<EntryFn> = Arc::new(move |ctx, _| {
            if ctx.id() == 1 {
                panic!("entry failure on context 1");
            }
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let opts = LaunchOptions {
            count: 3,
            arena_bytes: 1 << 20,
            ..LaunchOptions::default()
        };
        // The run must terminate (not park at the teardown barrier) and
        // the panic must re-raise on the launching thread.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = Runtime::launch(&opts, Vec::new(), entry, None);
        }));
        assert!(outcome.is_err(), "panic must surface on the launcher");
        assert_eq!(survivors.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn root_skips_entry_when_asked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let entry: Arc<EntryFn> = Arc::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let opts = LaunchOptions {
            count: 3,
            arena_bytes: 1 << 20,
            root_skips_entry: true,
            ..LaunchOptions::default()
        };
        Runtime::launch(&opts, Vec::new(), entry, None).expect("launch");
        // Contexts 1 and 2 ran the entry; context 0 went straight to teardown.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
