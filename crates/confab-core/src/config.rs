//! Session configuration
//!
//! Explicit configuration passed into [`Session::open`](crate::Session::open);
//! the core keeps no process-wide state. The fields mirror what a transport
//! bootstrap needs: the participation mode and the endpoints to connect to.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ----------------------------------------------------------------------------
// Session Mode
// ----------------------------------------------------------------------------

/// How the session participates in the network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Mesh participant; works with or without configured endpoints
    #[default]
    Peer,
    /// Leaf node; requires at least one endpoint to connect through
    Client,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Peer => f.write_str("peer"),
            Mode::Client => f.write_str("client"),
        }
    }
}

// ----------------------------------------------------------------------------
// Endpoint
// ----------------------------------------------------------------------------

/// Locator in `proto/address` form, e.g. `tcp/127.0.0.1:7447`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    proto: String,
    address: String,
}

impl Endpoint {
    /// Protocol part of the locator
    pub fn proto(&self) -> &str {
        &self.proto
    }

    /// Address part of the locator
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (proto, address) = s.split_once('/').ok_or_else(|| {
            Error::config(format!("endpoint `{}` must be in `proto/address` form", s))
        })?;
        if proto.is_empty() || address.is_empty() {
            return Err(Error::config(format!(
                "endpoint `{}` has an empty protocol or address",
                s
            )));
        }
        Ok(Self {
            proto: proto.to_string(),
            address: address.to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.proto, self.address)
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Configuration for a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Participation mode
    pub mode: Mode,
    /// Endpoints the session connects to on open
    pub connect: Vec<Endpoint>,
}

impl Config {
    /// Client-mode preset pointing at a single endpoint
    pub fn client(endpoint: Endpoint) -> Self {
        Self {
            mode: Mode::Client,
            connect: vec![endpoint],
        }
    }

    /// Append an endpoint to the connect list
    pub fn add_connect(&mut self, endpoint: Endpoint) {
        self.connect.push(endpoint);
    }

    /// Check the configuration for internally inconsistent values
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::Client && self.connect.is_empty() {
            return Err(Error::config(
                "client mode requires at least one connect endpoint",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
