//! Error types for the confab bridge
//!
//! One enum covers the whole crate: configuration and key-expression
//! validation, session lifecycle, channel construction, and the reply
//! contract. Channel operations that must hand the rejected element back to
//! the caller use the value-carrying error types in [`crate::channel`]
//! instead.

use crate::channel::SendError;

// ----------------------------------------------------------------------------
// Core Error Type
// ----------------------------------------------------------------------------

/// Errors surfaced by sessions, queryables, channels, and the reply path
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed configuration value
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Malformed key expression
    #[error("Invalid key expression `{expr}`: {reason}")]
    InvalidKeyExpr { expr: String, reason: String },

    /// The session layer refused to open
    #[error("Failed to open session: {reason}")]
    SessionOpen { reason: String },

    /// Operation against a session that has been closed
    #[error("Session is closed")]
    SessionClosed,

    /// Another queryable is already bound to the key expression
    #[error("A queryable is already declared on `{key_expr}`")]
    AlreadyDeclared { key_expr: String },

    /// Channel constructed with a capacity of zero
    #[error("Channel capacity must be at least 1")]
    InvalidCapacity,

    /// Enqueue attempted on a closed channel
    #[error("Channel is closed")]
    ChannelClosed,

    /// A second reply was attempted for the same query
    #[error("Query was already replied to")]
    AlreadyReplied,
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl Error {
    /// Create a configuration error with a reason
    pub fn config<T: Into<String>>(reason: T) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// Create a key-expression error carrying the offending input
    pub fn invalid_key_expr<E: Into<String>, R: Into<String>>(expr: E, reason: R) -> Self {
        Error::InvalidKeyExpr {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    /// Create a session-open error with a reason
    pub fn session_open<T: Into<String>>(reason: T) -> Self {
        Error::SessionOpen {
            reason: reason.into(),
        }
    }
}

impl<T> From<SendError<T>> for Error {
    fn from(_: SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
