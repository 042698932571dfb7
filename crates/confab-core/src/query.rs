//! Query values and the one-shot reply path
//!
//! A [`Query`] owns everything the consumer needs: the addressing fields,
//! the optional payload, and the reply capability. The fields never change
//! after construction; only the reply slot carries state, and it can be
//! consumed exactly once.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::types::{KeyExpr, Parameters, Payload, RequestId};
use crate::{Error, Result};

// ----------------------------------------------------------------------------
// Query
// ----------------------------------------------------------------------------

/// One inbound request, exclusively owned by whoever holds it
///
/// Constructed by the session when a matched request arrives, then handed
/// through the channel to the consumer. Dropping a query without replying
/// resolves the requester's receiver with no reply; that is a valid outcome,
/// a queryable may choose not to answer.
pub struct Query {
    key_expr: KeyExpr,
    parameters: Parameters,
    payload: Option<Payload>,
    request_id: RequestId,
    reply_slot: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl Query {
    pub(crate) fn new(
        key_expr: KeyExpr,
        parameters: Parameters,
        payload: Option<Payload>,
        request_id: RequestId,
        reply_tx: oneshot::Sender<Reply>,
    ) -> Self {
        Self {
            key_expr,
            parameters,
            payload,
            request_id,
            reply_slot: Mutex::new(Some(reply_tx)),
        }
    }

    /// Key expression the requester addressed
    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    /// Opaque request parameters
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Request payload; `None` is distinct from an empty payload
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Transport-level identity of the originating request
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Selector form `key_expr?parameters`, as it appears in logs
    pub fn selector(&self) -> String {
        if self.parameters.is_empty() {
            self.key_expr.to_string()
        } else {
            format!("{}?{}", self.key_expr, self.parameters)
        }
    }

    /// Send the response for this query
    ///
    /// Succeeds at most once; a second call fails with
    /// [`Error::AlreadyReplied`]. Fire-and-forget: when the requester is
    /// already gone the reply is dropped with a debug log, delivery
    /// assurance belongs to the transport.
    pub fn reply<P: Into<Payload>>(&self, key_expr: KeyExpr, payload: P) -> Result<()> {
        let reply_tx = self
            .reply_slot
            .lock()
            .take()
            .ok_or(Error::AlreadyReplied)?;
        let reply = Reply {
            key_expr,
            payload: payload.into(),
            request_id: self.request_id,
        };
        if reply_tx.send(reply).is_err() {
            debug!(
                "Requester for query {} went away before the reply",
                self.request_id
            );
        }
        Ok(())
    }

    /// Whether the one-shot reply capability has been used
    pub fn is_replied(&self) -> bool {
        self.reply_slot.lock().is_none()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key_expr", &self.key_expr)
            .field("parameters", &self.parameters)
            .field("payload", &self.payload)
            .field("request_id", &self.request_id)
            .field("replied", &self.is_replied())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Reply
// ----------------------------------------------------------------------------

/// Response carried back to the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    key_expr: KeyExpr,
    payload: Payload,
    request_id: RequestId,
}

impl Reply {
    /// Key expression echoed by the responder
    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    /// Response payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Identity of the request this answers
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

// ----------------------------------------------------------------------------
// Reply Receiver
// ----------------------------------------------------------------------------

/// Receiving half handed to the requester; resolves with zero or one reply
#[derive(Debug)]
pub struct ReplyReceiver {
    rx: oneshot::Receiver<Reply>,
}

impl ReplyReceiver {
    pub(crate) fn new(rx: oneshot::Receiver<Reply>) -> Self {
        Self { rx }
    }

    /// Block until the reply arrives; `None` when the query was discarded
    /// without an answer
    ///
    /// Must not be called on an async executor thread; async callers use
    /// [`recv_async`](Self::recv_async).
    pub fn recv(self) -> Option<Reply> {
        self.rx.blocking_recv().ok()
    }

    /// Await the reply; `None` when the query was discarded without an
    /// answer
    pub async fn recv_async(self) -> Option<Reply> {
        self.rx.await.ok()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
