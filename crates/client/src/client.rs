//! The query client.
//!
//! A query moves through these steps:
//!
//! 1. **Locate** the service endpoint; fail with [`ClientError::NotFound`].
//! 2. **Create** a reply endpoint registered under a fresh query id.
//! 3. **Build** the query payload addressed to that endpoint.
//! 4. **Send** it; a failure destroys the endpoint and yields
//!    [`ClientError::Ipc`].
//! 5. **Wait** for the reply, pumping the thread's messages, polling the
//!    termination source and enforcing the hard timeout.
//! 6. **Cleanup**: the endpoint is destroyed whatever happened.
//! 7. **Resolve**: a received reply is decoded; after cancellation or timeout
//!    any late buffer is discarded and an empty list returned.

use std::sync::Arc;
use std::time::Duration;

use protocol::{
    ClientError, IpcError, PendingReplies, PumpStatus, QueryOptions, QueryRequest, ReplyEndpoint,
    ReplySink, ResultList, ServiceRequest, ServiceVersion, Transport, WaitStatus,
};
use tracing::{debug, warn};

use crate::cancel::ShouldTerminate;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::ids::QueryIdAllocator;

/// How the wait step of a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The reply endpoint accepted the correlated reply.
    Replied,
    /// The termination source asked to stop.
    Cancelled,
    /// The hard timeout elapsed (or, without a termination source, the single
    /// full-length wait did).
    TimedOut,
}

/// Client for the desktop search service.
///
/// Generic over the [`Transport`] that moves the bytes and the [`Clock`] that
/// measures the query timeout.
#[derive(Debug)]
pub struct Client<T, C = SystemClock> {
    transport: T,
    clock: C,
    config: ClientConfig,
    ids: QueryIdAllocator,
    pending: Arc<PendingReplies>,
}

impl<T: Transport> Client<T> {
    /// Creates a client with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self::with_clock(transport, config, SystemClock)
    }
}

impl<T: Transport, C: Clock> Client<T, C> {
    pub fn with_clock(transport: T, config: ClientConfig, clock: C) -> Self {
        Self {
            transport,
            clock,
            config,
            ids: QueryIdAllocator::new(),
            pending: Arc::new(PendingReplies::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replies stored but not yet collected. Zero whenever no query is in
    /// flight.
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    // -----------------------------------------------------------------------
    // Status and commands
    // -----------------------------------------------------------------------

    /// Asks the service for its version with four status requests.
    pub fn get_version(&self) -> Result<ServiceVersion, ClientError> {
        let service = self.locate()?;
        let major = self.request(service, ServiceRequest::MajorVersion)?;
        let minor = self.request(service, ServiceRequest::MinorVersion)?;
        let revision = self.request(service, ServiceRequest::Revision)?;
        let build = self.request(service, ServiceRequest::BuildNumber)?;
        Ok(ServiceVersion::new(major, minor, revision, build))
    }

    /// The service version in dotted form, e.g. `1.4.1.1024`.
    pub fn get_version_str(&self) -> Result<String, ClientError> {
        self.get_version().map(|v| v.to_string())
    }

    /// Brings the service's search window to the foreground.
    ///
    /// Fails with [`ClientError::PermissionDenied`] when the service runs with
    /// higher privileges than the caller.
    pub fn show(&self) -> Result<(), ClientError> {
        let service = self.locate()?;
        match self.transport.send_request(service, ServiceRequest::ShowWindow) {
            Ok(_) => Ok(()),
            Err(e) if e.is_access_denied() => Err(ClientError::PermissionDenied),
            Err(e) => Err(e.into()),
        }
    }

    /// Asks the service to rebuild its index.
    ///
    /// Services older than 1.4 ignore this; see
    /// [`ServiceVersion::supports_rebuild_db`].
    pub fn rebuild_db(&self) -> Result<(), ClientError> {
        let service = self.locate()?;
        self.request(service, ServiceRequest::RebuildDatabase)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Runs a query, waiting up to the hard timeout for the reply.
    ///
    /// A timeout is not an error: it yields an empty list.
    pub fn query(&self, terms: &str, options: &QueryOptions) -> Result<ResultList, ClientError> {
        self.run_query(terms, options, None)
    }

    /// Runs a query that polls `should_terminate` every poll interval while
    /// waiting and gives up, returning an empty list, as soon as it answers
    /// `true`.
    pub fn query_cancellable(
        &self,
        terms: &str,
        options: &QueryOptions,
        should_terminate: &mut dyn ShouldTerminate,
    ) -> Result<ResultList, ClientError> {
        self.run_query(terms, options, Some(should_terminate))
    }

    fn run_query(
        &self,
        terms: &str,
        options: &QueryOptions,
        should_terminate: Option<&mut dyn ShouldTerminate>,
    ) -> Result<ResultList, ClientError> {
        let service = self.locate()?;

        let query_id = self.ids.allocate();
        let span = tracing::debug_span!("query", query_id = %query_id);
        let _guard = span.enter();

        let sink = ReplySink::new(query_id, Arc::clone(&self.pending));
        let mut endpoint = self
            .transport
            .open_endpoint(sink)
            .map_err(ClientError::Endpoint)?;

        let request = QueryRequest::new(terms, options, endpoint.id(), query_id);
        debug!(
            endpoint = %endpoint.id(),
            flags = request.header().flags.bits(),
            offset = request.header().offset,
            max_results = request.header().max_results,
            "Sending query"
        );

        if let Err(failure) = self
            .transport
            .send_query(service, &endpoint, &request.encode())
        {
            drop(endpoint);
            self.pending.take(query_id);
            let error = IpcError::from(failure);
            warn!(error = %error, "Query could not be delivered");
            return Err(error.into());
        }

        let outcome = self.wait_for_reply(&mut endpoint, should_terminate);
        drop(endpoint);

        let buffer = self.pending.take(query_id);
        match (outcome, buffer) {
            (WaitOutcome::Replied, Some(buffer)) => {
                let list = ResultList::from_buffer(buffer);
                debug!(items = list.len(), "Query complete");
                Ok(list)
            }
            (WaitOutcome::Replied, None) => {
                warn!("Reply signalled but no buffer was stored");
                Ok(ResultList::empty())
            }
            (outcome, late) => {
                debug!(?outcome, discarded = late.is_some(), "Query ended without a result");
                Ok(ResultList::empty())
            }
        }
    }

    fn wait_for_reply(
        &self,
        endpoint: &mut T::Endpoint,
        mut should_terminate: Option<&mut dyn ShouldTerminate>,
    ) -> WaitOutcome {
        if endpoint.pump() == PumpStatus::ReplyReceived {
            return WaitOutcome::Replied;
        }

        let timeout = self.config.query_timeout();
        let poll_interval = self.config.poll_interval();
        let started = self.clock.now();
        let mut last_poll = started;

        loop {
            let remaining = timeout.saturating_sub(self.elapsed_since(started));
            if remaining.is_zero() {
                return WaitOutcome::TimedOut;
            }
            // Never block past the next poll or the hard timeout, however
            // often unrelated messages wake the thread.
            let slice = if should_terminate.is_some() {
                poll_interval
                    .saturating_sub(self.elapsed_since(last_poll))
                    .min(remaining)
            } else {
                remaining
            };

            match endpoint.wait(slice) {
                WaitStatus::MessagesPending => {
                    if endpoint.pump() == PumpStatus::ReplyReceived {
                        return WaitOutcome::Replied;
                    }
                }
                WaitStatus::TimedOut if should_terminate.is_none() => {
                    return WaitOutcome::TimedOut;
                }
                WaitStatus::TimedOut => {}
            }

            if let Some(source) = should_terminate.as_mut() {
                if self.elapsed_since(last_poll) >= poll_interval {
                    last_poll = self.clock.now();
                    if source.should_terminate() {
                        return WaitOutcome::Cancelled;
                    }
                }
            }
        }
    }

    fn elapsed_since(&self, started: std::time::Instant) -> Duration {
        self.clock.now().saturating_duration_since(started)
    }

    // -----------------------------------------------------------------------

    fn locate(&self) -> Result<T::Service, ClientError> {
        let class = &self.config.service_class;
        self.transport.locate_service(class).ok_or_else(|| {
            debug!(%class, "Search service not found");
            ClientError::NotFound
        })
    }

    fn request(&self, service: T::Service, request: ServiceRequest) -> Result<u32, ClientError> {
        let value = self.transport.send_request(service, request).map_err(|e| {
            warn!(request = request.name(), code = e.code, "Service request failed");
            ClientError::from(e)
        })?;
        debug!(request = request.name(), value, "Service request answered");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use protocol::testing::ReplyBuilder;
    use protocol::{EndpointId, QueryId, SearchFlags, ALL_RESULTS};

    use super::*;
    use crate::cancel::CancelFlag;
    use crate::testing::{FakeService, FakeTransport, ManualClock, Responder};

    fn client_for(service: &FakeService) -> (Client<FakeTransport, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let client = Client::with_clock(
            service.transport_with_clock(clock.clone()),
            ClientConfig::default(),
            clock.clone(),
        );
        (client, clock)
    }

    fn paths(list: &ResultList) -> Vec<String> {
        list.iter().map(|e| e.full_path).collect()
    }

    // -- status and commands ------------------------------------------------

    #[test]
    fn get_version_reports_not_found_when_service_is_absent() {
        let service = FakeService::stopped();
        let (client, _) = client_for(&service);

        assert!(matches!(client.get_version(), Err(ClientError::NotFound)));
        assert!(client.get_version_str().unwrap_err().is_not_found());
        assert!(service.requests().is_empty());
    }

    #[test]
    fn service_is_looked_up_by_the_configured_class() {
        let service = FakeService::new();
        let config = ClientConfig {
            service_class: "EVERYTHING_TASKBAR_NOTIFICATION_(1.5a)".to_owned(),
            ..ClientConfig::default()
        };
        let client = Client::with_config(service.transport(), config);

        client.show().unwrap();
        assert_eq!(service.lookups(), vec!["EVERYTHING_TASKBAR_NOTIFICATION_(1.5a)"]);
    }

    #[test]
    fn get_version_issues_four_status_requests() {
        let service = FakeService::new();
        service.set_version(ServiceVersion::new(1, 4, 1, 1024));
        let (client, _) = client_for(&service);

        assert_eq!(client.get_version().unwrap().as_tuple(), (1, 4, 1, 1024));
        assert_eq!(client.get_version_str().unwrap(), "1.4.1.1024");
        assert_eq!(
            &service.requests()[..4],
            &[
                ServiceRequest::MajorVersion,
                ServiceRequest::MinorVersion,
                ServiceRequest::Revision,
                ServiceRequest::BuildNumber,
            ]
        );
    }

    #[test]
    fn native_failures_surface_as_errors() {
        let service = FakeService::new();
        service.fail_requests(1400);
        let (client, _) = client_for(&service);

        match client.get_version() {
            Err(ClientError::Native(e)) => assert_eq!(e.code, 1400),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(client.rebuild_db(), Err(ClientError::Native(_))));
    }

    #[test]
    fn show_maps_access_denied_to_permission_denied() {
        let service = FakeService::new();
        let (client, _) = client_for(&service);
        client.show().unwrap();
        assert_eq!(service.requests(), vec![ServiceRequest::ShowWindow]);

        service.fail_requests(5);
        assert!(matches!(client.show(), Err(ClientError::PermissionDenied)));
    }

    #[test]
    fn rebuild_db_sends_the_rebuild_command() {
        let service = FakeService::new();
        let (client, _) = client_for(&service);
        client.rebuild_db().unwrap();
        assert_eq!(service.requests(), vec![ServiceRequest::RebuildDatabase]);
    }

    // -- queries ------------------------------------------------------------

    #[test]
    fn query_returns_the_decoded_reply() {
        let service = FakeService::new();
        service.respond_with(Responder::Reply(
            ReplyBuilder::new()
                .file("D:", "notes.txt")
                .folder(r"D:\", "work")
                .build(),
        ));
        let (client, _) = client_for(&service);

        let options = QueryOptions::new().max_results(100).match_path(true);
        let list = client.query("notes", &options).unwrap();

        assert_eq!(list.len(), 2);
        let entries: Vec<(String, bool)> = list.iter().map(Into::into).collect();
        assert_eq!(
            entries,
            vec![(r"D:\notes.txt".to_owned(), true), (r"D:\work".to_owned(), false)]
        );

        let received = service.received_queries();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].terms, "notes");
        assert_eq!(received[0].query_id, QueryId::new(1));
        assert_eq!(received[0].endpoint, EndpointId::new(1));
        assert_eq!(received[0].flags, SearchFlags::MATCH_PATH);
        assert_eq!(received[0].max_results, 100);
        assert_eq!(service.live_endpoints(), 0);
        assert_eq!(client.pending_replies(), 0);
    }

    #[test]
    fn query_ids_increase_per_query() {
        let service = FakeService::new();
        service.respond_with(Responder::Reply(ReplyBuilder::new().build()));
        let (client, _) = client_for(&service);

        for _ in 0..3 {
            client.query("x", &QueryOptions::new()).unwrap();
        }
        let ids: Vec<QueryId> = service.received_queries().iter().map(|q| q.query_id).collect();
        assert_eq!(ids, vec![QueryId::new(1), QueryId::new(2), QueryId::new(3)]);
        assert_eq!(service.endpoints_opened(), 3);
        assert_eq!(service.live_endpoints(), 0);
    }

    #[test]
    fn query_reports_not_found_without_opening_an_endpoint() {
        let service = FakeService::stopped();
        let (client, _) = client_for(&service);

        let err = client.query("x", &QueryOptions::new()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(service.endpoints_opened(), 0);
    }

    #[test]
    fn send_failure_without_code_is_unsupported_and_cleans_up() {
        let service = FakeService::new();
        service.respond_with(Responder::Reject(None));
        let (client, _) = client_for(&service);

        let err = client.query("x", &QueryOptions::new()).unwrap_err();
        assert!(matches!(err, ClientError::Ipc(IpcError::Unsupported)));
        assert_eq!(service.endpoints_opened(), 1);
        assert_eq!(service.live_endpoints(), 0);
    }

    #[test]
    fn send_failure_with_code_is_failed_and_cleans_up() {
        let service = FakeService::new();
        service.respond_with(Responder::Reject(Some(1400)));
        let (client, _) = client_for(&service);

        let err = client.query("x", &QueryOptions::new()).unwrap_err();
        assert!(matches!(err, ClientError::Ipc(IpcError::Failed { code: 1400 })));
        assert_eq!(service.live_endpoints(), 0);
    }

    #[test]
    fn endpoint_creation_failure_is_reported() {
        let service = FakeService::new();
        service.fail_endpoints(8);
        let (client, _) = client_for(&service);

        match client.query("x", &QueryOptions::new()) {
            Err(ClientError::Endpoint(e)) => assert_eq!(e.code, 8),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancelling_on_first_poll_returns_empty_and_leaves_no_endpoint() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        let (client, clock) = client_for(&service);
        let before = service.live_endpoints();

        let mut polls = 0;
        let mut cancel = || {
            polls += 1;
            true
        };
        let list = client
            .query_cancellable("x", &QueryOptions::new(), &mut cancel)
            .unwrap();

        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);
        assert_eq!(polls, 1);
        assert_eq!(service.live_endpoints(), before);
        assert_eq!(clock.elapsed(), Duration::from_millis(75));
    }

    #[test]
    fn reply_arriving_at_cancellation_is_discarded() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        let (client, _) = client_for(&service);

        let feeder = service.clone();
        let mut cancel = move || {
            // The reply lands in the queue at the moment the caller gives up.
            let query = feeder.received_queries()[0].clone();
            feeder.deliver(
                query.endpoint,
                u64::from(query.query_id.as_u32()),
                ReplyBuilder::new().file(r"C:\", "late").build(),
            );
            true
        };
        let list = client
            .query_cancellable("x", &QueryOptions::new(), &mut cancel)
            .unwrap();

        assert!(list.is_empty());
        assert_eq!(client.pending_replies(), 0);
        assert_eq!(service.live_endpoints(), 0);
    }

    #[test]
    fn cancel_flag_stops_the_wait() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        let (client, clock) = client_for(&service);

        let flag = CancelFlag::new();
        flag.cancel();
        let mut source = flag.clone();
        let list = client
            .query_cancellable("x", &QueryOptions::new(), &mut source)
            .unwrap();
        assert!(list.is_empty());
        assert_eq!(clock.elapsed(), Duration::from_millis(75));
    }

    #[test]
    fn silent_service_times_out_without_a_termination_source() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        let (client, clock) = client_for(&service);

        let list = client.query("x", &QueryOptions::new()).unwrap();
        assert!(list.is_empty());
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
        assert_eq!(service.live_endpoints(), 0);
    }

    #[test]
    fn hard_timeout_applies_even_when_never_cancelled() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        let (client, clock) = client_for(&service);

        let mut polls = 0u32;
        let mut never = || {
            polls += 1;
            false
        };
        let list = client
            .query_cancellable("x", &QueryOptions::new(), &mut never)
            .unwrap();

        assert!(list.is_empty());
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
        assert_eq!(polls, 400);
    }

    #[test]
    fn unrelated_messages_do_not_delay_cancellation() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        service.chatter(Duration::from_millis(10));
        let (client, clock) = client_for(&service);

        let mut polls = 0;
        let mut cancel = || {
            polls += 1;
            true
        };
        let list = client
            .query_cancellable("x", &QueryOptions::new(), &mut cancel)
            .unwrap();

        assert!(list.is_empty());
        assert_eq!(polls, 1);
        assert_eq!(clock.elapsed(), Duration::from_millis(75));
        assert_eq!(service.live_endpoints(), 0);
    }

    #[test]
    fn busy_thread_is_still_polled_every_interval() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        service.chatter(Duration::from_millis(10));
        let (client, clock) = client_for(&service);

        let mut polls = 0u32;
        let mut never = || {
            polls += 1;
            false
        };
        client
            .query_cancellable("x", &QueryOptions::new(), &mut never)
            .unwrap();

        assert_eq!(clock.elapsed(), Duration::from_secs(30));
        assert_eq!(polls, 400);
    }

    #[test]
    fn waits_never_run_past_the_hard_timeout() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        service.chatter(Duration::from_secs(29));
        let (client, clock) = client_for(&service);

        let list = client.query("x", &QueryOptions::new()).unwrap();

        assert!(list.is_empty());
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
        assert_eq!(
            service.wait_timeouts(),
            vec![Duration::from_secs(30), Duration::from_secs(1)]
        );
    }

    #[test]
    fn mismatched_replies_are_ignored() {
        let service = FakeService::new();
        service.respond_with(Responder::Misaddressed(
            ReplyBuilder::new().file(r"C:\", "not-mine").build(),
        ));
        let (client, _) = client_for(&service);

        let list = client.query("x", &QueryOptions::new()).unwrap();
        assert!(list.is_empty());
        assert_eq!(client.pending_replies(), 0);
    }

    #[test]
    fn reply_arriving_during_the_wait_is_picked_up() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        let (client, _) = client_for(&service);

        let feeder = service.clone();
        let mut polls = 0;
        let mut source = move || {
            polls += 1;
            if polls == 3 {
                let query = feeder.received_queries()[0].clone();
                feeder.deliver(
                    query.endpoint,
                    u64::from(query.query_id.as_u32()),
                    ReplyBuilder::new().drive("C:").build(),
                );
            }
            false
        };
        let list = client
            .query_cancellable("x", &QueryOptions::new(), &mut source)
            .unwrap();
        assert_eq!(paths(&list), vec![r"C:\"]);
    }

    #[test]
    fn concurrent_queries_receive_their_own_replies() {
        let service = FakeService::new();
        service.respond_with(Responder::Silent);
        let client = Client::new(service.transport());

        let (first, second) = std::thread::scope(|s| {
            let a = s.spawn(|| client.query("alpha", &QueryOptions::new()));
            let b = s.spawn(|| client.query("beta", &QueryOptions::new()));

            assert!(service.wait_for_queries(2, Duration::from_secs(5)));
            let mut received = service.received_queries();
            received.sort_by_key(|q| q.query_id);
            // Answer the newer query first, and offer each reply to the other
            // endpoint as well; it must be ignored there.
            for query in received.iter().rev() {
                let reply = ReplyBuilder::new().file(r"C:\", &query.terms).build();
                let tag = u64::from(query.query_id.as_u32());
                for other in received.iter().filter(|o| o.endpoint != query.endpoint) {
                    service.deliver(other.endpoint, tag, reply.clone());
                }
                service.deliver(query.endpoint, tag, reply);
            }

            (
                a.join().expect("alpha thread").expect("alpha query"),
                b.join().expect("beta thread").expect("beta query"),
            )
        });

        assert_eq!(paths(&first), vec![r"C:\alpha"]);
        assert_eq!(paths(&second), vec![r"C:\beta"]);
        assert_eq!(service.live_endpoints(), 0);
        assert_eq!(client.pending_replies(), 0);
    }

    #[test]
    fn default_options_ask_for_all_results() {
        let service = FakeService::new();
        service.respond_with(Responder::Reply(ReplyBuilder::new().build()));
        let (client, _) = client_for(&service);

        client.query("", &QueryOptions::new()).unwrap();
        let received = service.received_queries();
        assert_eq!(received[0].max_results, ALL_RESULTS);
        assert_eq!(received[0].offset, 0);
        assert!(received[0].flags.is_empty());
    }
}
