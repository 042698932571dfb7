//! In-process session: the registry, routing, and the requester upcall
//!
//! This is the embedding of the network layer the bridge is written against.
//! Registrations are keyed by exact key expression; a transport with real
//! pattern matching would replace this seam without touching the channel or
//! reply contracts. Handlers are cloned out of the registry lock before they
//! run, so a handler parked on a full channel never holds session state.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

use crate::query::{Query, ReplyReceiver};
use crate::queryable::{IntoQueryHandler, QueryHandler, Queryable};
use crate::types::{KeyExpr, Parameters, Payload, RequestId};
use crate::{Config, Error, Result};

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Handle to an open session; cheap to clone, all clones share state
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    id: Uuid,
    config: Config,
    registry: RwLock<HashMap<String, Registration>>,
    next_queryable_id: AtomicU64,
    closed: AtomicBool,
}

struct Registration {
    id: u64,
    handler: QueryHandler,
}

impl Session {
    /// Open a session with the given configuration
    pub fn open(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::session_open(e.to_string()))?;
        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            config,
            registry: RwLock::new(HashMap::new()),
            next_queryable_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        info!("Session {} opened in {} mode", inner.id, inner.config.mode);
        Ok(Self { inner })
    }

    /// Unique identity of this session
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Configuration the session was opened with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the session; idempotent
    ///
    /// Clears the registry so no further queries route; declare and query
    /// fail afterwards. Channels owned by the application stay open: the
    /// teardown order (undeclare, then close the channel) is the caller's.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.registry.write().clear();
        info!("Session {} closed", self.inner.id);
    }

    /// Bind a key expression to a handler
    ///
    /// One registration per key expression; the handler runs once per
    /// matched inbound query and owns each query it is given.
    pub fn declare_queryable<H>(&self, key_expr: &KeyExpr, handler: H) -> Result<Queryable>
    where
        H: IntoQueryHandler,
    {
        let id = self.inner.next_queryable_id.fetch_add(1, Ordering::SeqCst);
        let mut registry = self.inner.registry.write();
        // Checked under the write lock: close() swaps the flag before it
        // clears the registry, so a racing declare either sees the flag or
        // has its registration swept by the clear.
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        if registry.contains_key(key_expr.as_str()) {
            return Err(Error::AlreadyDeclared {
                key_expr: key_expr.to_string(),
            });
        }
        registry.insert(
            key_expr.as_str().to_string(),
            Registration {
                id,
                handler: handler.into_handler(),
            },
        );
        drop(registry);
        debug!("Queryable {} declared on '{}'", id, key_expr);
        Ok(Queryable::new(Arc::clone(&self.inner), key_expr.clone(), id))
    }

    /// Submit a query and receive the zero-or-one reply
    ///
    /// The matching handler runs inline on the calling thread, so a full
    /// bounded channel backpressures the caller right here. When no
    /// registration matches, the query is dropped and the receiver resolves
    /// with `None`.
    pub fn query<P>(
        &self,
        key_expr: &KeyExpr,
        parameters: P,
        payload: Option<Payload>,
    ) -> Result<ReplyReceiver>
    where
        P: Into<Parameters>,
    {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let request_id = RequestId::generate();
        let query = Query::new(
            key_expr.clone(),
            parameters.into(),
            payload,
            request_id,
            reply_tx,
        );
        let handler = self
            .inner
            .registry
            .read()
            .get(key_expr.as_str())
            .map(|registration| registration.handler.clone());
        match handler {
            Some(handler) => {
                debug!("Routing query {} to '{}'", request_id, query.selector());
                handler.invoke(query);
            }
            None => {
                debug!(
                    "No queryable declared on '{}', dropping query {}",
                    key_expr, request_id
                );
            }
        }
        Ok(ReplyReceiver::new(reply_rx))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionInner {
    /// Remove a registration if it still belongs to the given handle
    ///
    /// The id guard keeps a stale handle (dropped after its key was
    /// re-declared) from removing the successor registration.
    pub(crate) fn unregister(&self, key_expr: &KeyExpr, id: u64) {
        let mut registry = self.registry.write();
        if let Some(registration) = registry.get(key_expr.as_str()) {
            if registration.id == id {
                registry.remove(key_expr.as_str());
                debug!("Queryable {} undeclared from '{}'", id, key_expr);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    use crate::channel;

    fn demo_key() -> KeyExpr {
        KeyExpr::new("demo/test").unwrap()
    }

    #[test]
    fn test_open_validates_config() {
        let bad = Config {
            mode: crate::Mode::Client,
            connect: Vec::new(),
        };
        assert!(matches!(
            Session::open(bad),
            Err(Error::SessionOpen { .. })
        ));
        assert!(Session::open(Config::default()).is_ok());
    }

    #[test]
    fn test_declare_routes_queries_to_handler() {
        let session = Session::open(Config::default()).unwrap();
        let key = demo_key();
        let _queryable = session
            .declare_queryable(
                &key,
                QueryHandler::from_fn(|query| {
                    let echo = query.key_expr().clone();
                    query.reply(echo, "pong").unwrap();
                }),
            )
            .unwrap();

        let receiver = session
            .query(&key, Parameters::empty(), Some(Payload::from("ping")))
            .unwrap();
        let reply = receiver.recv().expect("handler replied");
        assert_eq!(reply.payload().as_bytes(), b"pong");
        assert_eq!(reply.key_expr(), &key);
    }

    #[test]
    fn test_duplicate_declare_fails() {
        let session = Session::open(Config::default()).unwrap();
        let key = demo_key();
        let (tx, _rx) = channel::bounded(1).unwrap();
        let _queryable = session.declare_queryable(&key, tx).unwrap();

        let (tx2, _rx2) = channel::bounded(1).unwrap();
        assert!(matches!(
            session.declare_queryable(&key, tx2),
            Err(Error::AlreadyDeclared { .. })
        ));
    }

    #[test]
    fn test_undeclare_allows_redeclare() {
        let session = Session::open(Config::default()).unwrap();
        let key = demo_key();
        let (tx, _rx) = channel::bounded(1).unwrap();
        let queryable = session.declare_queryable(&key, tx).unwrap();
        queryable.undeclare().unwrap();

        let (tx2, _rx2) = channel::bounded(1).unwrap();
        assert!(session.declare_queryable(&key, tx2).is_ok());
    }

    #[test]
    fn test_drop_unregisters_best_effort() {
        let session = Session::open(Config::default()).unwrap();
        let key = demo_key();
        let (tx, _rx) = channel::bounded(1).unwrap();
        drop(session.declare_queryable(&key, tx).unwrap());

        let (tx2, _rx2) = channel::bounded(1).unwrap();
        assert!(session.declare_queryable(&key, tx2).is_ok());
    }

    #[test]
    fn test_unmatched_query_resolves_none() {
        let session = Session::open(Config::default()).unwrap();
        let receiver = session
            .query(&demo_key(), Parameters::empty(), None)
            .unwrap();
        assert!(receiver.recv().is_none());
    }

    #[test]
    fn test_closed_session_rejects_operations() {
        let session = Session::open(Config::default()).unwrap();
        session.close();
        session.close();
        assert!(session.is_closed());

        let (tx, _rx) = channel::bounded(1).unwrap();
        assert!(matches!(
            session.declare_queryable(&demo_key(), tx),
            Err(Error::SessionClosed)
        ));
        assert!(matches!(
            session.query(&demo_key(), Parameters::empty(), None),
            Err(Error::SessionClosed)
        ));
    }

    #[test]
    fn test_close_racing_declare_never_strands_a_handler() {
        for _ in 0..100 {
            let session = Session::open(Config::default()).unwrap();
            let key = demo_key();
            let (tx, rx) = channel::bounded(1).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let closer = {
                let session = session.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    session.close();
                })
            };
            let declarer = {
                let session = session.clone();
                let key = key.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // Success and SessionClosed are both valid outcomes.
                    let _ = session.declare_queryable(&key, tx);
                })
            };
            closer.join().unwrap();
            declarer.join().unwrap();

            // No interleaving may leave the registration (and its sender)
            // alive in a closed session.
            assert!(matches!(
                rx.try_recv(),
                Err(channel::TryRecvError::Disconnected)
            ));
        }
    }

    #[test]
    fn test_close_is_shared_across_clones() {
        let session = Session::open(Config::default()).unwrap();
        let key = demo_key();
        let (tx, rx) = channel::bounded(4).unwrap();
        let _queryable = session.declare_queryable(&key, tx).unwrap();

        let clone = session.clone();
        clone.close();
        assert!(session.is_closed());

        // Nothing routes through any handle once one of them closed.
        assert!(matches!(
            session.query(&key, Parameters::empty(), None),
            Err(Error::SessionClosed)
        ));
        assert!(rx.is_empty());
    }
}
