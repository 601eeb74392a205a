//! The reference event source.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::RecordStore;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use visitrack_engine::{PushChannel, PushHandler, SubscriberId, Subscription};
use visitrack_protocol::{
    decode_push, AccessActivity, AccessEvent, CancelOutcome, CancelRequest, DeviceKind, EventKind,
    GrantAccessRequest, MarkAccessRequest, PushEvent, QueryRequest, QueryResponse, Topic,
    ValidEvent, ValidateCodeRequest, ValidateCodeResponse, VisitRecord, VisitStatus,
};

/// Actor recorded for mutations made through the reception endpoints.
pub const RECEPTION_ACTOR: &str = "reception";

/// In-memory event source.
///
/// Holds the authoritative records, serves queries, runs mutations through
/// the lifecycle and broadcasts every change on the push channel:
///
/// - `new-records` after a registration batch
/// - `access-events` after every successful mutation or admitted scan
/// - `record-updated` when a client publishes `notify-mutation`, once
///   [`VisitServer::attach`] has been called
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use visitrack_engine::PushHub;
/// use visitrack_server::{ServerConfig, VisitServer};
///
/// let hub = PushHub::new();
/// let server = VisitServer::new(ServerConfig::default(), Arc::new(hub));
/// server.attach().unwrap();
/// assert!(server.is_attached());
/// ```
pub struct VisitServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    channel: Arc<dyn PushChannel>,
    id: SubscriberId,
    relay: Mutex<Option<Subscription>>,
    available: AtomicBool,
}

impl VisitServer {
    /// Creates a server publishing on `channel`.
    pub fn new(config: ServerConfig, channel: Arc<dyn PushChannel>) -> Self {
        Self::with_store(config, Arc::new(RecordStore::new()), channel)
    }

    /// Creates a server over an existing store.
    pub fn with_store(
        config: ServerConfig,
        store: Arc<RecordStore>,
        channel: Arc<dyn PushChannel>,
    ) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            channel,
            id: SubscriberId::new(),
            relay: Mutex::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Starts re-broadcasting `notify-mutation` requests as `record-updated`.
    ///
    /// Calling it again while attached is a no-op.
    pub fn attach(&self) -> ServerResult<()> {
        let mut relay = self.relay.lock();
        if relay.as_ref().map_or(false, Subscription::is_active) {
            return Ok(());
        }

        let store = Arc::clone(&self.context.store);
        let channel = Arc::clone(&self.channel);
        let handler: PushHandler = Arc::new(move |topic: Topic, payload: &Value| {
            match decode_push(topic, payload) {
                PushEvent::Valid(ValidEvent::Notify(notice)) => match store.get(&notice.record_id) {
                    Some(record) => {
                        let delivered = publish_json(channel.as_ref(), Topic::RecordUpdated, &record);
                        debug!(
                            "Re-broadcast {} to {} subscribers",
                            notice.record_id, delivered
                        );
                    }
                    None => warn!("Ignoring notify-mutation for unknown record {}", notice.record_id),
                },
                PushEvent::Valid(other) => {
                    debug!("Ignoring {} payload on the relay", other.topic());
                }
                PushEvent::Malformed(malformed) => {
                    warn!(
                        "Dropping malformed {} payload: {}",
                        malformed.topic, malformed.reason
                    );
                }
            }
        });

        let subscription = self
            .channel
            .subscribe(Topic::NotifyMutation, self.id, handler)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        *relay = Some(subscription);
        info!("Server {} relaying {}", self.id, Topic::NotifyMutation);
        Ok(())
    }

    /// Stops the `notify-mutation` relay.
    pub fn detach(&self) {
        if let Some(mut subscription) = self.relay.lock().take() {
            subscription.unsubscribe();
            info!("Server {} stopped relaying", self.id);
        }
    }

    /// Returns true while the relay is active.
    pub fn is_attached(&self) -> bool {
        self.relay
            .lock()
            .as_ref()
            .map_or(false, Subscription::is_active)
    }

    /// Simulates an outage: while unavailable every request fails with
    /// [`ServerError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if the server accepts requests.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Registers records and broadcasts them on `new-records`.
    pub fn register(&self, records: Vec<VisitRecord>) -> ServerResult<Vec<VisitRecord>> {
        self.ensure_available()?;
        let stored = self.handler.handle_register(records)?;
        if !stored.is_empty() {
            publish_json(self.channel.as_ref(), Topic::NewRecords, &stored);
        }
        Ok(stored)
    }

    /// Issues an access code for a record.
    pub fn issue_code(&self, record_id: &str) -> ServerResult<String> {
        self.ensure_available()?;
        self.handler.handle_issue_code(record_id)
    }

    /// Runs a query.
    pub fn query(&self, request: &QueryRequest) -> ServerResult<QueryResponse> {
        self.ensure_available()?;
        self.handler.handle_query(request)
    }

    /// Admits a pending record with its completed payload.
    pub fn grant_access(
        &self,
        record_id: &str,
        request: &GrantAccessRequest,
    ) -> ServerResult<VisitRecord> {
        self.ensure_available()?;
        let record = self.handler.handle_grant_access(record_id, request)?;
        let label = record.access_points.first().map(|p| p.access_id.clone());
        self.publish_activity(&record, EventKind::EntryGranted, DeviceKind::Reception, label);
        Ok(record)
    }

    /// Toggles entry/exit at an access point.
    pub fn mark_access(
        &self,
        record_id: &str,
        request: &MarkAccessRequest,
    ) -> ServerResult<VisitRecord> {
        self.ensure_available()?;
        let record = self.handler.handle_mark_access(record_id, request)?;
        self.publish_activity(
            &record,
            passage_kind(record.status),
            DeviceKind::Reception,
            Some(request.access_id.clone()),
        );
        Ok(record)
    }

    /// Cancels a pending record.
    pub fn cancel(&self, record_id: &str, request: &CancelRequest) -> ServerResult<CancelOutcome> {
        self.ensure_available()?;
        let (record, outcome) = self.handler.handle_cancel(record_id, request)?;
        self.publish_activity(&record, EventKind::Cancelled, DeviceKind::Reception, None);
        Ok(outcome)
    }

    /// Finalizes a visit that has exited.
    pub fn finalize(&self, record_id: &str) -> ServerResult<VisitRecord> {
        self.ensure_available()?;
        let record = self.handler.handle_finalize(record_id)?;
        self.publish_activity(&record, EventKind::Finalized, DeviceKind::Reception, None);
        Ok(record)
    }

    /// Validates a scanned code, toggling the passage when admitted.
    pub fn validate_code(&self, request: &ValidateCodeRequest) -> ServerResult<ValidateCodeResponse> {
        self.ensure_available()?;
        let validation = self.handler.handle_validate_code(request)?;
        if let Some(record) = &validation.passage {
            let label = record
                .access_points
                .iter()
                .find(|point| point.mode.permits_toggle())
                .map(|point| point.access_id.clone());
            self.publish_activity(
                record,
                passage_kind(record.status),
                request.source_device_kind,
                label,
            );
        }
        Ok(validation.response)
    }

    /// Returns a stored record.
    pub fn record(&self, record_id: &str) -> Option<VisitRecord> {
        self.handler.record(record_id)
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.context.store.len()
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    fn ensure_available(&self) -> ServerResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(ServerError::Unavailable("server is offline".into()))
        }
    }

    fn publish_activity(
        &self,
        record: &VisitRecord,
        event_kind: EventKind,
        device_kind: DeviceKind,
        access_label: Option<String>,
    ) {
        let actor_id = match device_kind {
            DeviceKind::Reception => RECEPTION_ACTOR.to_string(),
            other => format!("{other:?}").to_lowercase(),
        };
        let activity = AccessActivity {
            event: AccessEvent {
                record_id: record.id.clone(),
                subject_kind: record.subject_kind,
                subject_id: record.subject_id.clone(),
                event_kind,
                device_kind,
                actor_id,
                access_label,
                timestamp: record.last_modified,
            },
            record: record.clone(),
        };
        publish_json(self.channel.as_ref(), Topic::AccessEvents, &activity);
    }
}

impl Drop for VisitServer {
    fn drop(&mut self) {
        self.detach();
    }
}

fn passage_kind(status: VisitStatus) -> EventKind {
    match status {
        VisitStatus::ExitGranted => EventKind::ExitGranted,
        _ => EventKind::EntryGranted,
    }
}

fn publish_json<T: Serialize>(channel: &dyn PushChannel, topic: Topic, value: &T) -> usize {
    match serde_json::to_value(value) {
        Ok(payload) => channel.publish(topic, &payload),
        Err(e) => {
            warn!("Failed to encode {} payload: {}", topic, e);
            0
        }
    }
}
