//! Queryable registrations and handler adaptation
//!
//! A handler is whatever consumes queries on the producer side. The channel
//! sender is the canonical one: declaring with a [`Sender<Query>`] adapts
//! every callback invocation into an enqueue, and the application drains the
//! receiver at its own pace.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::channel::Sender;
use crate::query::Query;
use crate::session::SessionInner;
use crate::types::KeyExpr;
use crate::Result;

// ----------------------------------------------------------------------------
// Query Handlers
// ----------------------------------------------------------------------------

/// Callback a registration runs once per matched inbound query
///
/// The handler owns each query it is given; the query outlives the
/// invocation if the handler moves it somewhere (a channel, usually).
#[derive(Clone)]
pub struct QueryHandler(Arc<dyn Fn(Query) + Send + Sync>);

impl QueryHandler {
    /// Wrap a closure
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Query) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn invoke(&self, query: Query) {
        (self.0)(query);
    }
}

impl fmt::Debug for QueryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueryHandler(..)")
    }
}

/// Conversion into the callback a registration runs
pub trait IntoQueryHandler {
    fn into_handler(self) -> QueryHandler;
}

impl IntoQueryHandler for QueryHandler {
    fn into_handler(self) -> QueryHandler {
        self
    }
}

/// The channel bridge: every matched query is enqueued for the consumer
///
/// A full channel parks the producer until the consumer drains. Once the
/// channel is closed the query is dropped with a debug log; the requester's
/// receiver resolves with no reply.
impl IntoQueryHandler for Sender<Query> {
    fn into_handler(self) -> QueryHandler {
        QueryHandler::from_fn(move |query| {
            if let Err(err) = self.send(query) {
                let query = err.into_inner();
                debug!(
                    "Dropping query '{}' addressed to a closed channel",
                    query.selector()
                );
            }
        })
    }
}

// ----------------------------------------------------------------------------
// Queryable Handle
// ----------------------------------------------------------------------------

/// Live registration binding a key expression to a handler
///
/// Undeclaring stops future handler invocations; queries already enqueued
/// stay available to the consumer. Dropping the handle unregisters on a
/// best-effort basis.
pub struct Queryable {
    session: Arc<SessionInner>,
    key_expr: KeyExpr,
    id: u64,
    undeclared: bool,
}

impl Queryable {
    pub(crate) fn new(session: Arc<SessionInner>, key_expr: KeyExpr, id: u64) -> Self {
        Self {
            session,
            key_expr,
            id,
            undeclared: false,
        }
    }

    /// Key expression this registration is bound to
    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    /// Stop receiving queries
    pub fn undeclare(mut self) -> Result<()> {
        self.undeclared = true;
        self.session.unregister(&self.key_expr, self.id);
        Ok(())
    }
}

impl Drop for Queryable {
    fn drop(&mut self) {
        if !self.undeclared {
            self.session.unregister(&self.key_expr, self.id);
        }
    }
}

impl fmt::Debug for Queryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("key_expr", &self.key_expr)
            .field("id", &self.id)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
