//! Core value types for the confab bridge
//!
//! Newtypes with semantic validation: key expressions are checked once at
//! construction and stay valid for their lifetime, payloads keep zero-length
//! and absent as distinct states (callers carry `Option<Payload>`).

use core::fmt;
use core::str::FromStr;
use std::borrow::Cow;

use uuid::Uuid;

use crate::{Error, Result};

// ----------------------------------------------------------------------------
// Key Expression
// ----------------------------------------------------------------------------

/// Addressing pattern for queries, in `chunk/chunk/...` form
///
/// Validation is purely syntactic; how one pattern matches another is the
/// transport's concern. `?` is rejected because it separates a selector's
/// parameter section, `#` is kept reserved.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyExpr(String);

impl KeyExpr {
    /// Create a key expression, rejecting malformed input
    pub fn new<S: Into<String>>(s: S) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::invalid_key_expr(s, "must not be empty"));
        }
        if s.starts_with('/') || s.ends_with('/') {
            return Err(Error::invalid_key_expr(
                s,
                "must not have a leading or trailing `/`",
            ));
        }
        if s.split('/').any(str::is_empty) {
            return Err(Error::invalid_key_expr(s, "must not contain empty chunks"));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(Error::invalid_key_expr(s, "must not contain whitespace"));
        }
        if let Some(c) = s.chars().find(|c| matches!(c, '?' | '#')) {
            let reason = format!("`{}` is a reserved character", c);
            return Err(Error::invalid_key_expr(s, reason));
        }
        Ok(Self(s))
    }

    /// Get the pattern as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for KeyExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for KeyExpr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Parameters
// ----------------------------------------------------------------------------

/// Opaque query parameters, conventionally `key=value;key=value`
///
/// The bridge never interprets the contents; it only carries them from the
/// requester to the consumer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters(String);

impl Parameters {
    /// The empty parameter set
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Get the raw encoded form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Parameters {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Parameters {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// Owned payload bytes
///
/// An absent payload and a zero-length payload are different states; APIs
/// that allow absence take `Option<Payload>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Create a payload from anything byte-like
    pub fn new<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode as UTF-8 for display, replacing invalid sequences
    pub fn utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "Payload({:?})", text),
            Err(_) => write!(f, "Payload(0x{})", hex::encode(&self.0)),
        }
    }
}

// ----------------------------------------------------------------------------
// Request Identifier
// ----------------------------------------------------------------------------

/// Transport-level identity of the originating request
///
/// Assigned when the request enters the bridge and echoed back inside the
/// reply so the transport can correlate the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
