// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Launch options and argument-list stripping.
//!
//! The bootstrap recognizes exactly two options and removes them from
//! the argument list before it reaches user code:
//!
//! - `+p<N>` / `+p N`: requested number of execution contexts
//!   (default 1, must be positive)
//! - `+memsize<M>` / `+memsize M`: shared arena size in megabytes
//!   (default 16, must be positive)
//!
//! Everything else passes through unchanged. An argument that merely
//! starts with `+p` but carries a non-numeric tail (e.g. `+ping`) is
//! not an option and is left alone.

use crate::arena::DEFAULT_ARENA_BYTES;
use crate::error::{Error, Result};

/// Configuration for [`Runtime::launch`](crate::Runtime::launch).
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Number of execution contexts to run.
    pub count: usize,
    /// Shared arena size in bytes.
    pub arena_bytes: usize,
    /// Whether context 0 enters the poll loop after its entry function
    /// returns. Contexts 1..N always do (given a dispatch table); this
    /// flag lets the embedder drive context 0 manually.
    pub root_scheduler: bool,
    /// Whether context 0 skips the entry function (and the loop)
    /// entirely, proceeding straight to the teardown barrier.
    pub root_skips_entry: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            count: 1,
            arena_bytes: DEFAULT_ARENA_BYTES,
            root_scheduler: true,
            root_skips_entry: false,
        }
    }
}

impl LaunchOptions {
    /// Parse and strip the recognized options out of `args`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if a recognized option carries a missing,
    /// malformed, or zero value.
    pub fn parse(args: &mut Vec<String>) -> Result<Self> {
        let mut opts = Self::default();
        let mut i = 0;
        while i < args.len() {
            if let Some(value) = Self::strip_option(args, &mut i, "+p")? {
                opts.count = parse_positive(&value, "+p", "context count")?;
            } else if let Some(value) = Self::strip_option(args, &mut i, "+memsize")? {
                let megs = parse_positive(&value, "+memsize", "arena megabytes")?;
                opts.arena_bytes = megs
                    .checked_mul(1024 * 1024)
                    .ok_or_else(|| Error::Config(format!("arena size overflows: {megs} MiB")))?;
            } else {
                i += 1;
            }
        }
        Ok(opts)
    }

    /// If `args[i]` is `flag` (inline or space-separated value), remove
    /// it and return the raw value. Leaves `i` untouched on a match so
    /// the caller re-examines the shifted position.
    fn strip_option(args: &mut Vec<String>, i: &mut usize, flag: &str) -> Result<Option<String>> {
        let Some(rest) = args[*i].strip_prefix(flag) else {
            return Ok(None);
        };
        if rest.is_empty() {
            // Space-separated form: the value is the next argument.
            args.remove(*i);
            if *i >= args.len() {
                return Err(Error::Config(format!("missing value after {flag}")));
            }
            return Ok(Some(args.remove(*i)));
        }
        if rest.bytes().all(|b| b.is_ascii_digit()) {
            let rest = rest.to_string();
            args.remove(*i);
            return Ok(Some(rest));
        }
        // Starts with the flag but is not one of ours (+ping, +memsizeX).
        Ok(None)
    }
}

fn parse_positive(raw: &str, flag: &str, what: &str) -> Result<usize> {
    let value: usize = raw
        .parse()
        .map_err(|_| Error::Config(format!("{flag} expects a number, got '{raw}'")))?;
    if value == 0 {
        return Err(Error::Config(format!("{what} must be positive (got 0)")));
    }
    Ok(value)
}
