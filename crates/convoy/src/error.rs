// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Error taxonomy for the communication substrate.
//!
//! Every error in this crate is fatal by contract: the layer below a
//! parallel runtime cannot safely continue after a configuration or
//! memory failure, so callers are expected to report and terminate
//! rather than retry. The enum exists so that tests and embedders can
//! observe *which* contract was violated before tearing down.

use std::fmt;

/// Errors returned by convoy operations.
///
/// # Example
///
/// ```rust
/// use convoy::{Error, LaunchOptions};
///
/// let mut args = vec!["+p0".to_string()];
/// match LaunchOptions::parse(&mut args) {
///     Err(Error::Config(msg)) => println!("bad launch config: {}", msg),
///     Err(e) => println!("other error: {}", e),
///     Ok(_) => unreachable!("zero contexts is rejected"),
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    /// Launch configuration is invalid (bad parallelism count or
    /// arena size argument).
    Config(String),

    /// The shared arena or a buffer inside it could not be allocated.
    Allocation {
        /// Bytes that were requested.
        requested: usize,
        /// Bytes the arena could still satisfy, if known.
        available: Option<usize>,
    },

    /// A caller violated an API contract (e.g. building a spanning
    /// tree generation over zero vertices).
    ProtocolMisuse(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Invalid launch configuration: {}", msg),
            Error::Allocation {
                requested,
                available: Some(avail),
            } => write!(
                f,
                "Allocation failed: requested {} bytes, {} available",
                requested, avail
            ),
            Error::Allocation {
                requested,
                available: None,
            } => write!(f, "Allocation failed: requested {} bytes", requested),
            Error::ProtocolMisuse(msg) => write!(f, "Protocol misuse: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for API results using the crate `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = Error::Config("requested context count is 0".into());
        assert!(e.to_string().contains("requested context count"));

        let e = Error::Allocation {
            requested: 4096,
            available: Some(128),
        };
        let msg = e.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("128"));

        let e = Error::ProtocolMisuse("empty vertex range".into());
        assert!(e.to_string().contains("empty vertex range"));
    }
}
