//! Bounded FIFO channel bridging producer callbacks to a blocking consumer
//!
//! The queue is the only synchronization point between the transport's
//! execution contexts and the application loop; ownership of each element
//! transfers wholly at enqueue and dequeue. Two policies share one
//! implementation: [`bounded`] parks producers while the queue is full,
//! [`ring`] admits the newest element by discarding the oldest.
//!
//! There are no timeouts here. A blocked [`Sender::send`] or
//! [`Receiver::recv`] returns only when the operation can complete or the
//! channel closes; [`close`](Sender::close) is the sole cancellation
//! mechanism and may be called from either handle while the other side is
//! blocked.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::{Error, Result};

// ----------------------------------------------------------------------------
// Construction
// ----------------------------------------------------------------------------

/// Create a bounded FIFO channel with a blocking-producer policy
///
/// `send` parks its caller while the queue holds `capacity` elements;
/// silently dropping an element would break the request/response contract
/// the remote side expects. A capacity of zero is rejected: the queue
/// models a pull-based consumer, not a rendezvous.
pub fn bounded<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>)> {
    channel(capacity, FullPolicy::Block)
}

/// Create a bounded channel that discards the oldest element when full
///
/// `send` never blocks: at capacity the element at the front of the queue
/// is dropped to admit the newest. Everything else (close, drain,
/// end-of-stream) matches [`bounded`].
pub fn ring<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>)> {
    channel(capacity, FullPolicy::DropOldest)
}

fn channel<T>(capacity: usize, policy: FullPolicy) -> Result<(Sender<T>, Receiver<T>)> {
    if capacity == 0 {
        return Err(Error::InvalidCapacity);
    }
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            closed: false,
            senders: 1,
        }),
        space_available: Condvar::new(),
        item_available: Condvar::new(),
        capacity,
        policy,
    });
    let sender = Sender {
        shared: Arc::clone(&shared),
    };
    let receiver = Receiver { shared };
    Ok((sender, receiver))
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FullPolicy {
    Block,
    DropOldest,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    senders: usize,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signalled when a dequeue frees a slot or the channel closes
    space_available: Condvar,
    /// Signalled when an enqueue adds an element or the channel closes
    item_available: Condvar,
    capacity: usize,
    policy: FullPolicy,
}

impl<T> Shared<T> {
    fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.space_available.notify_all();
        self.item_available.notify_all();
    }
}

// ----------------------------------------------------------------------------
// Sender
// ----------------------------------------------------------------------------

/// Producer half; clone one per producer context
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Enqueue an element, parking while the queue is full
    ///
    /// Hands the element back if the channel is closed, whether on entry or
    /// while waiting for space.
    pub fn send(&self, value: T) -> core::result::Result<(), SendError<T>> {
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(SendError(value));
            }
            if state.queue.len() < self.shared.capacity {
                state.queue.push_back(value);
                drop(state);
                self.shared.item_available.notify_one();
                return Ok(());
            }
            match self.shared.policy {
                FullPolicy::DropOldest => {
                    // Evicted element drops after the lock is released.
                    let evicted = state.queue.pop_front();
                    state.queue.push_back(value);
                    drop(state);
                    self.shared.item_available.notify_one();
                    drop(evicted);
                    return Ok(());
                }
                FullPolicy::Block => self.shared.space_available.wait(&mut state),
            }
        }
    }

    /// Enqueue without blocking
    pub fn try_send(&self, value: T) -> core::result::Result<(), TrySendError<T>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TrySendError::Closed(value));
        }
        let mut evicted = None;
        if state.queue.len() == self.shared.capacity {
            match self.shared.policy {
                FullPolicy::DropOldest => evicted = state.queue.pop_front(),
                FullPolicy::Block => return Err(TrySendError::Full(value)),
            }
        }
        state.queue.push_back(value);
        drop(state);
        self.shared.item_available.notify_one();
        drop(evicted);
        Ok(())
    }

    /// Close the channel; idempotent
    ///
    /// Wakes every parked producer and consumer. Elements already queued
    /// stay available to the consumer.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of elements currently queued
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity the channel was constructed with
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.senders -= 1;
        // Last sender gone: the stream can never grow again, so end it.
        if state.senders == 0 && !state.closed {
            state.closed = true;
            drop(state);
            self.shared.space_available.notify_all();
            self.shared.item_available.notify_all();
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Receiver
// ----------------------------------------------------------------------------

/// Consumer half; exactly one per channel
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Dequeue the next element, parking while the queue is empty
    ///
    /// `None` is end-of-stream: the channel is closed (or every sender is
    /// gone) and the queue has been drained. Elements queued before the
    /// close are still delivered first, in order.
    pub fn recv(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                drop(state);
                self.shared.space_available.notify_one();
                return Some(value);
            }
            if state.closed {
                return None;
            }
            self.shared.item_available.wait(&mut state);
        }
    }

    /// Dequeue without blocking
    ///
    /// Distinguishes an open-but-empty queue from one that is closed and
    /// fully drained.
    pub fn try_recv(&self) -> core::result::Result<T, TryRecvError> {
        let mut state = self.shared.state.lock();
        match state.queue.pop_front() {
            Some(value) => {
                drop(state);
                self.shared.space_available.notify_one();
                Ok(value)
            }
            None if state.closed => Err(TryRecvError::Disconnected),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Close the channel; idempotent
    ///
    /// Wakes every parked producer and consumer. Elements already queued
    /// stay available to drain.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of elements currently queued
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity the channel was constructed with
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        // Without a consumer the queue can only rot; fail producers fast.
        self.shared.close();
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Channel Errors
// ----------------------------------------------------------------------------

/// The channel is closed; the unsent element is handed back
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    /// Recover the element that could not be enqueued
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sending on a closed channel")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Non-blocking enqueue failure; the element is handed back
pub enum TrySendError<T> {
    /// The queue is at capacity
    Full(T),
    /// The channel is closed
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Recover the element that could not be enqueued
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(value) | TrySendError::Closed(value) => value,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("sending on a full channel"),
            TrySendError::Closed(_) => f.write_str("sending on a closed channel"),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

/// Non-blocking dequeue failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// The channel is open but the queue is empty
    Empty,
    /// The channel is closed and fully drained
    Disconnected,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => f.write_str("receiving on an empty channel"),
            TryRecvError::Disconnected => f.write_str("receiving on a closed channel"),
        }
    }
}

impl std::error::Error for TryRecvError {}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
