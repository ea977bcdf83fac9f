//! An in-process stand-in for the search service.
//!
//! [`FakeService`] plays the service side of every exchange: it answers
//! status requests, records and answers queries, and lets a test push
//! deliveries at the reply endpoints the client opens. [`FakeTransport`] is
//! the [`Transport`] a [`crate::Client`] talks to it through.
//!
//! Only compiled for this crate's tests or with the `test-util` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use protocol::wire::{read_wide_str, ByteReader, QueryHeader};
use protocol::{
    EndpointId, NativeError, PumpStatus, QueryId, ReplyEndpoint, ReplySink, SearchFlags,
    SendFailure, ServiceRequest, ServiceVersion, Transport, WaitStatus,
};

use crate::clock::Clock;

/// How the fake service answers each query it receives.
#[derive(Debug, Clone)]
pub enum Responder {
    /// Deliver this buffer, correctly tagged, to the query's reply endpoint.
    Reply(Vec<u8>),
    /// Deliver this buffer to the query's endpoint under a tag belonging to
    /// some other query.
    Misaddressed(Vec<u8>),
    /// Accept the query and never answer it unless the test calls
    /// [`FakeService::deliver`].
    Silent,
    /// Refuse the send, with or without a native error code.
    Reject(Option<u32>),
}

/// A query payload as the service saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedQuery {
    pub endpoint: EndpointId,
    pub query_id: QueryId,
    pub flags: SearchFlags,
    pub offset: u32,
    pub max_results: u32,
    pub terms: String,
}

impl ReceivedQuery {
    fn parse(payload: &[u8]) -> Option<Self> {
        let mut reader = ByteReader::new(payload);
        let endpoint = EndpointId::new(reader.read_u32()?);
        let query_id = QueryId::new(reader.read_u32()?);
        let flags = SearchFlags::from_bits_retain(reader.read_u32()?);
        let offset = reader.read_u32()?;
        let max_results = reader.read_u32()?;
        let terms = read_wide_str(payload, QueryHeader::SIZE as u32)?;
        Some(Self {
            endpoint,
            query_id,
            flags,
            offset,
            max_results,
            terms,
        })
    }
}

#[derive(Debug)]
struct EndpointSlot {
    sink: ReplySink,
    inbox: VecDeque<(u64, Vec<u8>)>,
}

#[derive(Debug)]
struct State {
    running: bool,
    version: ServiceVersion,
    request_error: Option<u32>,
    endpoint_error: Option<u32>,
    responder: Responder,
    queries: Vec<ReceivedQuery>,
    requests: Vec<ServiceRequest>,
    endpoints: HashMap<EndpointId, EndpointSlot>,
    next_endpoint: u32,
    endpoints_opened: usize,
    lookups: Vec<String>,
    chatter: Option<Duration>,
    waits: Vec<Duration>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

/// Simulated search service. Clones share the same service.
#[derive(Debug, Clone)]
pub struct FakeService {
    shared: Arc<Shared>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeService {
    /// A running service that answers every query with an empty list.
    pub fn new() -> Self {
        let empty = protocol::testing::ReplyBuilder::new().build();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    running: true,
                    version: ServiceVersion::new(1, 4, 1, 1024),
                    request_error: None,
                    endpoint_error: None,
                    responder: Responder::Reply(empty),
                    queries: Vec::new(),
                    requests: Vec::new(),
                    endpoints: HashMap::new(),
                    next_endpoint: 1,
                    endpoints_opened: 0,
                    lookups: Vec::new(),
                    chatter: None,
                    waits: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// A service that cannot be located.
    pub fn stopped() -> Self {
        let service = Self::new();
        service.set_running(false);
        service
    }

    pub fn set_running(&self, running: bool) {
        self.shared.state.lock().running = running;
    }

    pub fn set_version(&self, version: ServiceVersion) {
        self.shared.state.lock().version = version;
    }

    /// Makes every following status or command request fail with `code`.
    pub fn fail_requests(&self, code: u32) {
        self.shared.state.lock().request_error = Some(code);
    }

    /// Makes every following reply endpoint creation fail with `code`.
    pub fn fail_endpoints(&self, code: u32) {
        self.shared.state.lock().endpoint_error = Some(code);
    }

    pub fn respond_with(&self, responder: Responder) {
        self.shared.state.lock().responder = responder;
    }

    /// Keeps unrelated messages arriving at the client's thread, one every
    /// `every`. Only affects endpoints on a [`ManualClock`]: their waits then
    /// report pending messages that carry no reply.
    pub fn chatter(&self, every: Duration) {
        self.shared.state.lock().chatter = Some(every);
    }

    /// A transport whose endpoints block in real time.
    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            shared: Arc::clone(&self.shared),
            clock: None,
        }
    }

    /// A transport whose endpoints never block: an idle wait advances `clock`
    /// by the full timeout and returns at once.
    pub fn transport_with_clock(&self, clock: ManualClock) -> FakeTransport {
        FakeTransport {
            shared: Arc::clone(&self.shared),
            clock: Some(clock),
        }
    }

    /// Reply endpoints currently open.
    pub fn live_endpoints(&self) -> usize {
        self.shared.state.lock().endpoints.len()
    }

    pub fn endpoints_opened(&self) -> usize {
        self.shared.state.lock().endpoints_opened
    }

    pub fn received_queries(&self) -> Vec<ReceivedQuery> {
        self.shared.state.lock().queries.clone()
    }

    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.shared.state.lock().requests.clone()
    }

    /// Window classes the client looked the service up by, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.shared.state.lock().lookups.clone()
    }

    /// Timeouts passed to endpoint waits, in order.
    pub fn wait_timeouts(&self) -> Vec<Duration> {
        self.shared.state.lock().waits.clone()
    }

    /// Blocks until at least `count` queries have arrived or `timeout`
    /// elapses. Returns whether they arrived.
    pub fn wait_for_queries(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.queries.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.shared.changed.wait_for(&mut state, deadline - now);
        }
        true
    }

    /// Queues a payload delivery tagged `tag` for `endpoint`. Returns `false`
    /// if that endpoint is already gone.
    pub fn deliver(&self, endpoint: EndpointId, tag: u64, payload: Vec<u8>) -> bool {
        let mut state = self.shared.state.lock();
        match state.endpoints.get_mut(&endpoint) {
            Some(slot) => {
                slot.inbox.push_back((tag, payload));
                self.shared.changed.notify_all();
                true
            }
            None => false,
        }
    }
}

/// Opaque handle to the located fake service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeHandle;

/// [`Transport`] connected to a [`FakeService`].
#[derive(Debug, Clone)]
pub struct FakeTransport {
    shared: Arc<Shared>,
    clock: Option<ManualClock>,
}

impl Transport for FakeTransport {
    type Service = FakeHandle;
    type Endpoint = FakeEndpoint;

    fn locate_service(&self, class: &str) -> Option<FakeHandle> {
        let mut state = self.shared.state.lock();
        state.lookups.push(class.to_owned());
        state.running.then_some(FakeHandle)
    }

    fn send_request(&self, _service: FakeHandle, request: ServiceRequest) -> Result<u32, NativeError> {
        let mut state = self.shared.state.lock();
        state.requests.push(request);
        if let Some(code) = state.request_error {
            return Err(NativeError::new(code));
        }
        let (major, minor, revision, build) = state.version.as_tuple();
        Ok(match request {
            ServiceRequest::MajorVersion => major,
            ServiceRequest::MinorVersion => minor,
            ServiceRequest::Revision => revision,
            ServiceRequest::BuildNumber => build,
            ServiceRequest::ShowWindow | ServiceRequest::RebuildDatabase => 1,
        })
    }

    fn open_endpoint(&self, sink: ReplySink) -> Result<FakeEndpoint, NativeError> {
        let mut state = self.shared.state.lock();
        if let Some(code) = state.endpoint_error {
            return Err(NativeError::new(code));
        }
        let id = EndpointId::new(state.next_endpoint);
        state.next_endpoint += 1;
        state.endpoints_opened += 1;
        state.endpoints.insert(
            id,
            EndpointSlot {
                sink,
                inbox: VecDeque::new(),
            },
        );
        Ok(FakeEndpoint {
            id,
            shared: Arc::clone(&self.shared),
            clock: self.clock.clone(),
        })
    }

    fn send_query(
        &self,
        _service: FakeHandle,
        endpoint: &FakeEndpoint,
        payload: &[u8],
    ) -> Result<(), SendFailure> {
        let query = ReceivedQuery::parse(payload).expect("malformed query payload");
        let mut state = self.shared.state.lock();
        let tag = u64::from(query.query_id.as_u32());
        let target = query.endpoint;
        state.queries.push(query);
        self.shared.changed.notify_all();

        let delivery = match state.responder.clone() {
            Responder::Reply(buf) => Some((tag, buf)),
            Responder::Misaddressed(buf) => Some((tag + 1, buf)),
            Responder::Silent => None,
            Responder::Reject(code) => return Err(SendFailure { code }),
        };
        assert_eq!(target, endpoint.id, "query addressed to a foreign endpoint");
        if let (Some(delivery), Some(slot)) = (delivery, state.endpoints.get_mut(&target)) {
            slot.inbox.push_back(delivery);
        }
        Ok(())
    }
}

/// A reply endpoint of the fake service. Dropping it closes it.
#[derive(Debug)]
pub struct FakeEndpoint {
    id: EndpointId,
    shared: Arc<Shared>,
    clock: Option<ManualClock>,
}

impl FakeEndpoint {
    fn next_delivery(&self) -> Option<(ReplySink, u64, Vec<u8>)> {
        let mut state = self.shared.state.lock();
        let slot = state.endpoints.get_mut(&self.id)?;
        let (tag, payload) = slot.inbox.pop_front()?;
        Some((slot.sink.clone(), tag, payload))
    }

    fn has_deliveries(&self, state: &State) -> bool {
        state
            .endpoints
            .get(&self.id)
            .is_some_and(|slot| !slot.inbox.is_empty())
    }
}

impl ReplyEndpoint for FakeEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn pump(&mut self) -> PumpStatus {
        while let Some((sink, tag, payload)) = self.next_delivery() {
            if sink.accept(tag, &payload) {
                return PumpStatus::ReplyReceived;
            }
        }
        PumpStatus::Drained
    }

    fn wait(&mut self, timeout: Duration) -> WaitStatus {
        let mut state = self.shared.state.lock();
        state.waits.push(timeout);
        if let Some(clock) = &self.clock {
            if self.has_deliveries(&state) {
                return WaitStatus::MessagesPending;
            }
            return match state.chatter {
                Some(every) if every < timeout => {
                    clock.advance(every);
                    WaitStatus::MessagesPending
                }
                _ => {
                    clock.advance(timeout);
                    WaitStatus::TimedOut
                }
            };
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.has_deliveries(&state) {
                return WaitStatus::MessagesPending;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitStatus::TimedOut;
            }
            self.shared.changed.wait_for(&mut state, deadline - now);
        }
    }
}

impl Drop for FakeEndpoint {
    fn drop(&mut self) {
        self.shared.state.lock().endpoints.remove(&self.id);
        self.shared.changed.notify_all();
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    /// Total time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}
