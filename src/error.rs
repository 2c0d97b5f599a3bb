// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for AmberDB.
//!
//! One crate-wide error enum; the data path returns error kinds through
//! `AmberResult`. Network errors close the session, file errors surface to
//! the caller, and corruption during recovery aborts startup.

use std::fmt;

/// AmberDB result type.
pub type AmberResult<T> = Result<T, AmberError>;

/// AmberDB error type.
///
/// Every client-visible failure maps to a text-protocol `-<message>` reply
/// or a binary `ERROR` frame; the server never aborts on a client error.
#[derive(Debug)]
pub enum AmberError {
    /// Key (or file) not found.
    NotFound,

    /// Malformed on-disk or on-wire data: bad magic, bad tag byte,
    /// overlong varint, truncated record, checksum mismatch.
    Corruption { reason: String },

    /// Client-supplied argument is invalid: bad arg count, bad type,
    /// unknown command, bad database id, failed authentication.
    InvalidArgument { reason: String },

    /// Operating system or file system failure.
    IoError { operation: String, reason: String },

    /// Allocation refused; reserved for oversized frames and values.
    OutOfMemory,
}

impl AmberError {
    /// Builds a `Corruption` error from anything displayable.
    pub fn corruption(reason: impl fmt::Display) -> AmberError {
        AmberError::Corruption {
            reason: reason.to_string(),
        }
    }

    /// Builds an `InvalidArgument` error from anything displayable.
    pub fn invalid(reason: impl fmt::Display) -> AmberError {
        AmberError::InvalidArgument {
            reason: reason.to_string(),
        }
    }

    /// Wraps an `std::io::Error`, naming the failing operation.
    pub fn io(operation: impl Into<String>, err: std::io::Error) -> AmberError {
        AmberError::IoError {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// True when this error denotes damaged persistent state.
    pub fn is_corruption(&self) -> bool {
        matches!(self, AmberError::Corruption { .. })
    }
}

impl fmt::Display for AmberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmberError::NotFound => write!(f, "not found"),
            AmberError::Corruption { reason } => write!(f, "corruption: {}", reason),
            AmberError::InvalidArgument { reason } => write!(f, "invalid argument: {}", reason),
            AmberError::IoError { operation, reason } => {
                write!(f, "io error ({}): {}", operation, reason)
            }
            AmberError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for AmberError {}
