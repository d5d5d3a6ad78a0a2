// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for ixbase operations.
//!
//! Provides structured error handling with detailed context for debugging,
//! following the taxonomy: backend errors propagate and leave the active
//! transaction in memory for retry or rollback, structural problems fail
//! fast, and duplicate-insert / delete-miss are never represented as errors.

use std::fmt;

/// Standard Result type for all ixbase operations.
pub type IxResult<T> = Result<T, IxError>;

/// Error types for ixbase operations.
#[derive(Debug)]
pub enum IxError {
    /// The underlying storage backend returned an error. The transaction
    /// buffers are left untouched so the caller may retry or roll back.
    Backend(Box<dyn std::error::Error + Send + Sync>),

    /// `head_data`/`set_head_data` called before `Tree::init`.
    MissingHead,

    /// `Tree::init` was called with `order < 3`.
    InvalidOrder { order: u32 },

    /// A node referenced a child, parent, or sibling that could not be
    /// resolved, or claimed a parent that does not list it as a child.
    /// Indicates a programming bug or a corrupted backend.
    StructuralInconsistency { detail: String },

    /// An internal scan routine observed a direction value outside `{-1, 1}`.
    InvalidDirection { direction: i8 },

    /// A `like`/pattern-match argument could not be compiled into a regular
    /// expression.
    InvalidPattern { pattern: String, reason: String },
}

impl fmt::Display for IxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(err) => write!(f, "storage backend error: {}", err),
            Self::MissingHead => {
                write!(f, "head record accessed before Tree::init")
            }
            Self::InvalidOrder { order } => {
                write!(f, "invalid tree order {}: order must be >= 3", order)
            }
            Self::StructuralInconsistency { detail } => {
                write!(f, "structural inconsistency: {}", detail)
            }
            Self::InvalidDirection { direction } => {
                write!(f, "invalid scan direction: {}", direction)
            }
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid pattern '{}': {}", pattern, reason)
            }
        }
    }
}

impl std::error::Error for IxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl IxError {
    /// Wraps an arbitrary backend error as a [`IxError::Backend`].
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// True for errors that leave the transaction buffers intact and are
    /// safe to retry (currently only backend errors).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }
    impl std::error::Error for Boom {}

    #[test]
    fn backend_error_is_retryable() {
        let err = IxError::backend(Boom);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "storage backend error: boom");
    }

    #[test]
    fn structural_error_is_not_retryable() {
        let err = IxError::StructuralInconsistency {
            detail: "child not found in parent".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_order_message() {
        let err = IxError::InvalidOrder { order: 2 };
        assert_eq!(err.to_string(), "invalid tree order 2: order must be >= 3");
    }
}
