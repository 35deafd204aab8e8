//! Correlation of asynchronous responses with the requests that caused them.
//!
//! The session's event dispatcher hands every response-like transport event
//! to [`Correlator::resolve`]. A pending entry for the event's key is removed
//! and fired exactly once; events without a pending entry are dropped.

use bytes::Bytes;
use dashmap::DashMap;
use roslink_protocol::{ConnectionGraphUpdate, Parameter};
use tokio::sync::oneshot;
use tracing::trace;

/// Identifies the response a pending request is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    ServiceCall { service_id: u32, call_id: u32 },
    /// Parameter get/set, by request id.
    Parameters(String),
    /// The next connection graph update.
    ConnectionGraph,
}

/// A response delivered to a pending request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    ServiceCall { encoding: String, data: Bytes },
    ServiceCallFailure(String),
    Parameters(Vec<Parameter>),
    ConnectionGraph(ConnectionGraphUpdate),
}

/// Table of pending requests.
///
/// Most keys have a single waiter. [`CorrelationKey::ConnectionGraph`] may
/// have several; one update resolves all of them.
#[derive(Default)]
pub struct Correlator {
    pending: DashMap<CorrelationKey, Vec<oneshot::Sender<Response>>>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`.
    ///
    /// The flag is `true` if no other waiter was pending for the key.
    pub fn register(&self, key: CorrelationKey) -> (oneshot::Receiver<Response>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.pending.entry(key).or_default();
        waiters.retain(|w| !w.is_closed());
        let first = waiters.is_empty();
        waiters.push(tx);
        (rx, first)
    }

    /// Deliver a response. Returns whether an entry was registered for it.
    pub fn resolve(&self, key: &CorrelationKey, response: Response) -> bool {
        let Some((_, waiters)) = self.pending.remove(key) else {
            trace!(?key, "Unmatched response");
            return false;
        };
        for tx in waiters {
            let _ = tx.send(response.clone());
        }
        true
    }

    /// Drop waiters for `key` whose receivers are gone.
    pub fn prune(&self, key: &CorrelationKey) {
        if let Some(mut waiters) = self.pending.get_mut(key) {
            waiters.retain(|w| !w.is_closed());
        }
        self.pending.remove_if(key, |_, waiters| waiters.is_empty());
    }

    /// Cancel every pending request; their receivers observe an error.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.pending.iter().map(|entry| entry.len()).sum();
        self.pending.clear();
        cancelled
    }

    /// Whether anything is pending for `key`.
    #[must_use]
    pub fn is_pending(&self, key: &CorrelationKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of keys with pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
