//! Event source abstraction.
//!
//! The event source is the authoritative side: it answers paginated queries
//! and executes lifecycle mutations. Implementations wrap whatever transport
//! reaches the backend; `MockEventSource` is a scripted one for tests.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use visitrack_protocol::lifecycle::{self, Action, TransitionContext};
use visitrack_protocol::{
    CancelOutcome, CancelRequest, GrantAccessRequest, MarkAccessRequest, QueryRequest,
    QueryResponse, VisitRecord,
};

/// Authoritative query and mutation endpoints.
pub trait EventSource: Send + Sync {
    /// Runs a paginated query.
    fn query(&self, request: &QueryRequest) -> EngineResult<QueryResponse>;

    /// Admits a pending record with its completed payload.
    fn grant_access(&self, record_id: &str, request: &GrantAccessRequest)
        -> EngineResult<VisitRecord>;

    /// Toggles entry/exit at an access point.
    fn mark_access(&self, record_id: &str, request: &MarkAccessRequest)
        -> EngineResult<VisitRecord>;

    /// Cancels a pending record.
    fn cancel(&self, record_id: &str, request: &CancelRequest) -> EngineResult<CancelOutcome>;

    /// Closes a visit that has exited.
    fn finalize(&self, record_id: &str) -> EngineResult<VisitRecord>;
}

/// A scripted event source for testing.
///
/// Query results are served from a queue, falling back to a fixed response.
/// Mutations run the lifecycle table against an in-memory record map.
pub struct MockEventSource {
    connected: AtomicBool,
    queued: Mutex<VecDeque<EngineResult<QueryResponse>>>,
    fallback: Mutex<Option<QueryResponse>>,
    records: Mutex<HashMap<String, VisitRecord>>,
    queries: Mutex<Vec<QueryRequest>>,
    calls: Mutex<Vec<String>>,
}

impl MockEventSource {
    /// Creates an empty mock source.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            records: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the response served when the queue is empty.
    pub fn set_query_response(&self, response: QueryResponse) {
        *self.fallback.lock() = Some(response);
    }

    /// Queues a one-shot query result.
    pub fn push_query_result(&self, result: EngineResult<QueryResponse>) {
        self.queued.lock().push_back(result);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Stores a record mutations can act on.
    pub fn insert_record(&self, record: VisitRecord) {
        self.records.lock().insert(record.id.clone(), record);
    }

    /// Returns the stored record.
    pub fn record(&self, record_id: &str) -> Option<VisitRecord> {
        self.records.lock().get(record_id).cloned()
    }

    /// Query requests received so far.
    pub fn queries(&self) -> Vec<QueryRequest> {
        self.queries.lock().clone()
    }

    /// Mutation calls received so far, as `action:record_id`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn ensure_connected(&self) -> EngineResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::transport_retryable("event source unreachable"))
        }
    }

    fn mutate(
        &self,
        record_id: &str,
        action: Action,
        payload: Option<&VisitRecord>,
    ) -> EngineResult<VisitRecord> {
        self.ensure_connected()?;
        self.calls.lock().push(format!("{}:{record_id}", action.name()));

        let mut records = self.records.lock();
        let stored = records
            .get_mut(record_id)
            .ok_or_else(|| EngineError::NotFound(record_id.to_string()))?;

        let mut next = match payload {
            Some(payload) => VisitRecord {
                id: stored.id.clone(),
                status: stored.status,
                ..payload.clone()
            },
            None => stored.clone(),
        };
        lifecycle::apply(
            &mut next,
            &action,
            &TransitionContext::finalizing(),
            OffsetDateTime::now_utc(),
        )?;
        *stored = next.clone();
        Ok(next)
    }
}

impl Default for MockEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for MockEventSource {
    fn query(&self, request: &QueryRequest) -> EngineResult<QueryResponse> {
        self.ensure_connected()?;
        self.queries.lock().push(request.clone());
        if let Some(result) = self.queued.lock().pop_front() {
            return result;
        }
        self.fallback
            .lock()
            .clone()
            .ok_or_else(|| EngineError::transport_fatal("no mock query response set"))
    }

    fn grant_access(
        &self,
        record_id: &str,
        request: &GrantAccessRequest,
    ) -> EngineResult<VisitRecord> {
        self.mutate(record_id, Action::GrantAccess, Some(&request.record))
    }

    fn mark_access(
        &self,
        record_id: &str,
        request: &MarkAccessRequest,
    ) -> EngineResult<VisitRecord> {
        self.mutate(
            record_id,
            Action::MarkAccess {
                access_id: request.access_id.clone(),
            },
            None,
        )
    }

    fn cancel(&self, record_id: &str, request: &CancelRequest) -> EngineResult<CancelOutcome> {
        let record = self.mutate(
            record_id,
            Action::Cancel {
                reason: request.reason.clone(),
                notify: request.notify,
            },
            None,
        )?;
        Ok(CancelOutcome {
            host_notified: request.notify && record.host_id.is_some(),
            subject_notified: request.notify,
        })
    }

    fn finalize(&self, record_id: &str) -> EngineResult<VisitRecord> {
        self.mutate(record_id, Action::Finalize, None)
    }
}
