//! Bounded query-channel bridge
//!
//! A queryable receives inbound queries on whatever execution context the
//! transport uses, while the application consumes them from a single
//! blocking loop. The pieces, in data-flow order:
//!
//! - [`Session::declare_queryable`] binds a [`KeyExpr`] to a handler; the
//!   usual handler is the producer half of a bounded [`channel`].
//! - The channel hands each [`Query`] to the consumer in FIFO order and
//!   parks producers while it is full.
//! - Every query carries a one-shot reply capability; [`Query::reply`]
//!   answers the requester at most once.
//!
//! Teardown is explicit and safe at any moment: undeclare the queryable and
//! close the channel, and a consumer blocked in `recv` unblocks with
//! end-of-stream.
//!
//! ```no_run
//! use confab_core::{channel, Config, KeyExpr, Payload, Session};
//!
//! # fn main() -> confab_core::Result<()> {
//! let session = Session::open(Config::default())?;
//! let key_expr = KeyExpr::new("demo/example/answers")?;
//!
//! let (tx, rx) = channel::bounded(16)?;
//! let queryable = session.declare_queryable(&key_expr, tx)?;
//!
//! let consumer = std::thread::spawn(move || {
//!     while let Some(query) = rx.recv() {
//!         let _ = query.reply(query.key_expr().clone(), Payload::from("hello"));
//!     }
//! });
//!
//! queryable.undeclare()?;
//! consumer.join().ok();
//! session.close();
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod error;
pub mod query;
pub mod queryable;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{Config, Endpoint, Mode};
pub use error::{Error, Result};
pub use query::{Query, Reply, ReplyReceiver};
pub use queryable::{IntoQueryHandler, QueryHandler, Queryable};
pub use session::Session;
pub use types::{KeyExpr, Parameters, Payload, RequestId};
