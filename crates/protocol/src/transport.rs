//! Port traits for the native message-passing transport, and the reply sink
//! that native endpoints deliver into.
//!
//! A [`Transport`] knows how to find the service, exchange synchronous
//! messages with it, and open per-query [`ReplyEndpoint`]s. Each endpoint is
//! handed a [`ReplySink`] when it is opened; when the native layer receives a
//! payload delivery it calls [`ReplySink::accept`], which performs the id
//! correlation and stores the payload in the shared [`PendingReplies`] map.
//!
//! Keeping the correlation rule in this crate means it is the same for every
//! transport, and testable without one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{EndpointId, NativeError, QueryId, SendFailure, ServiceRequest};

// ---------------------------------------------------------------------------
// Pending replies
// ---------------------------------------------------------------------------

/// Reply buffers received but not yet collected, keyed by query id.
///
/// Each slot has exactly one writer (the sink of the endpoint opened for that
/// id) and one reader (the query waiting on it). A slot, once filled, is
/// never overwritten.
#[derive(Debug, Default)]
pub struct PendingReplies {
    slots: Mutex<HashMap<QueryId, Vec<u8>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `payload` for `id`. Returns `false`, leaving the stored buffer
    /// untouched, if a reply for `id` was already stored.
    pub fn fill(&self, id: QueryId, payload: &[u8]) -> bool {
        let mut slots = self.slots.lock();
        if slots.contains_key(&id) {
            return false;
        }
        slots.insert(id, payload.to_vec());
        true
    }

    /// Removes and returns the reply stored for `id`.
    pub fn take(&self, id: QueryId) -> Option<Vec<u8>> {
        self.slots.lock().remove(&id)
    }

    /// Whether a reply for `id` is stored and not yet taken.
    pub fn contains(&self, id: QueryId) -> bool {
        self.slots.lock().contains_key(&id)
    }

    /// Number of replies stored and not yet taken.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Delivery target handed to a reply endpoint when it is opened.
#[derive(Debug, Clone)]
pub struct ReplySink {
    query_id: QueryId,
    pending: Arc<PendingReplies>,
}

impl ReplySink {
    pub fn new(query_id: QueryId, pending: Arc<PendingReplies>) -> Self {
        Self { query_id, pending }
    }

    /// The query this sink accepts replies for.
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Whether this query's reply has been stored and not yet collected.
    pub fn has_reply(&self) -> bool {
        self.pending.contains(self.query_id)
    }

    /// Offers a native payload delivery tagged with `tag`.
    ///
    /// Returns `true` if the delivery was this query's reply and was stored;
    /// the endpoint should then signal the waiting query to stop. Returns
    /// `false` for deliveries addressed to any other id, which the endpoint
    /// must leave to default message handling, and for a duplicate reply.
    pub fn accept(&self, tag: u64, payload: &[u8]) -> bool {
        if !self.query_id.matches_tag(tag) {
            tracing::trace!(query_id = %self.query_id, tag, "Ignoring delivery for another query");
            return false;
        }
        if !self.pending.fill(self.query_id, payload) {
            tracing::warn!(query_id = %self.query_id, "Duplicate reply ignored");
            return false;
        }
        tracing::debug!(query_id = %self.query_id, bytes = payload.len(), "Reply received");
        true
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Result of draining the messages already queued for the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// The queue is empty and no reply has been accepted yet.
    Drained,
    /// An endpoint accepted its reply and signalled the wait to stop.
    ReplyReceived,
}

/// Result of blocking until new messages arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Messages are waiting to be pumped.
    MessagesPending,
    /// The timeout elapsed with nothing to pump.
    TimedOut,
}

/// A single-use native handle that receives exactly one query reply.
///
/// Dropping the endpoint destroys the native handle; implementations must
/// make that unconditional so every exit path of a query cleans up.
pub trait ReplyEndpoint {
    /// Identifier written into the query header so the service can address
    /// the reply.
    fn id(&self) -> EndpointId;

    /// Dispatches every message already queued for the calling thread,
    /// without blocking.
    fn pump(&mut self) -> PumpStatus;

    /// Blocks for at most `timeout` until messages are queued for the calling
    /// thread.
    fn wait(&mut self, timeout: Duration) -> WaitStatus;
}

/// Native message-passing IPC with the search service.
pub trait Transport {
    /// Handle to the service's receiving endpoint.
    type Service: Copy + std::fmt::Debug;

    /// Per-query reply endpoint.
    type Endpoint: ReplyEndpoint;

    /// Locates the service's receiving endpoint registered under `class`,
    /// or `None` if the service is not running.
    fn locate_service(&self, class: &str) -> Option<Self::Service>;

    /// Sends a synchronous request and returns the service's answer.
    fn send_request(
        &self,
        service: Self::Service,
        request: ServiceRequest,
    ) -> Result<u32, NativeError>;

    /// Opens a reply endpoint that delivers into `sink`.
    fn open_endpoint(&self, sink: ReplySink) -> Result<Self::Endpoint, NativeError>;

    /// Delivers an encoded query payload to the service on behalf of
    /// `endpoint`.
    fn send_query(
        &self,
        service: Self::Service,
        endpoint: &Self::Endpoint,
        payload: &[u8],
    ) -> Result<(), SendFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_accepts_only_its_own_tag() {
        let pending = Arc::new(PendingReplies::new());
        let sink = ReplySink::new(QueryId::new(4), Arc::clone(&pending));

        assert!(!sink.accept(5, b"other"));
        assert!(pending.is_empty());

        assert!(sink.accept(4, b"mine"));
        assert_eq!(pending.take(QueryId::new(4)).as_deref(), Some(&b"mine"[..]));
    }

    #[test]
    fn a_filled_slot_is_never_overwritten() {
        let pending = Arc::new(PendingReplies::new());
        let sink = ReplySink::new(QueryId::new(1), Arc::clone(&pending));

        assert!(sink.accept(1, b"first"));
        assert!(!sink.accept(1, b"second"));
        assert_eq!(pending.take(QueryId::new(1)).as_deref(), Some(&b"first"[..]));
        assert_eq!(pending.take(QueryId::new(1)), None);
    }

    #[test]
    fn sink_reports_its_reply_until_collected() {
        let pending = Arc::new(PendingReplies::new());
        let sink = ReplySink::new(QueryId::new(9), Arc::clone(&pending));
        assert!(!sink.has_reply());

        assert!(!sink.accept(8, b"other"));
        assert!(!sink.has_reply());

        assert!(sink.accept(9, b"mine"));
        assert!(sink.has_reply());
        pending.take(QueryId::new(9));
        assert!(!sink.has_reply());
    }

    #[test]
    fn replies_delivered_in_reverse_order_stay_correlated() {
        let pending = Arc::new(PendingReplies::new());
        let first = ReplySink::new(QueryId::new(10), Arc::clone(&pending));
        let second = ReplySink::new(QueryId::new(11), Arc::clone(&pending));

        // The later query's reply arrives first, and is also offered to the
        // earlier query's endpoint, which must ignore it.
        assert!(!first.accept(11, b"reply-11"));
        assert!(second.accept(11, b"reply-11"));
        assert!(!second.accept(10, b"reply-10"));
        assert!(first.accept(10, b"reply-10"));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.take(QueryId::new(10)).as_deref(), Some(&b"reply-10"[..]));
        assert_eq!(pending.take(QueryId::new(11)).as_deref(), Some(&b"reply-11"[..]));
    }
}
