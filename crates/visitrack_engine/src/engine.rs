//! The reconciliation engine.
//!
//! One engine backs one view. It is created with `mount`, which subscribes
//! it to the push topics, and torn down with `dispose` (or by dropping it).
//! Push handlers only enqueue raw payloads; `pump` applies them in arrival
//! order, and `complete_load` applies authoritative query responses.

use crate::channel::{PushChannel, PushHandler, SubscriberId, Subscription};
use crate::config::EngineConfig;
use crate::counters::Counters;
use crate::error::{EngineError, EngineResult};
use crate::pagination::{DateRange, QueryScope};
use crate::registry::Registry;
use crate::source::EventSource;
use crate::validator::{AccessValidator, ScanOutcome};
use crate::window::{DisplayWindow, MergeOutcome};
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use time::Date;
use tracing::{debug, info, warn};
use visitrack_protocol::{
    decode_push, AccessActivity, CancelOutcome, CancelRequest, DeviceKind, NotifyMutation,
    Pagination, PushEvent, QueryRequest, QueryResponse, SortDirection, SortField, Topic,
    ValidEvent, ValidateCodeRequest, VisitRecord,
};

/// Topics every engine listens to.
const SUBSCRIBED_TOPICS: [Topic; 3] = [Topic::NewRecords, Topic::RecordUpdated, Topic::AccessEvents];

/// An issued query, to be completed with its response.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTicket {
    /// Strictly increasing per engine.
    pub sequence: u64,
    /// Request to send to the event source.
    pub request: QueryRequest,
}

/// Result of an applied load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Sequence of the applied ticket.
    pub sequence: u64,
    /// Rows now on display.
    pub rows: usize,
    /// Rows refused by validation.
    pub invalid_rows: usize,
    /// Total rows reported by the source.
    pub total_count: u64,
}

/// Result of draining the push inbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Messages taken from the inbox.
    pub processed: usize,
    /// Messages refused by shape validation.
    pub malformed: usize,
    /// Window merge totals.
    pub merged: MergeOutcome,
    /// Access events that moved the counters.
    pub counted_events: usize,
}

impl PumpReport {
    fn absorb(&mut self, outcome: MergeOutcome) {
        self.merged.inserted += outcome.inserted;
        self.merged.replaced += outcome.replaced;
        self.merged.dropped += outcome.dropped;
        self.merged.evicted += outcome.evicted;
    }
}

/// Keeps one view consistent with the query and push paths.
pub struct ReconciliationEngine<S: EventSource, V: AccessValidator> {
    id: SubscriberId,
    config: EngineConfig,
    source: Arc<S>,
    validator: Arc<V>,
    channel: Arc<dyn PushChannel>,
    registry: Registry,
    window: DisplayWindow,
    counters: Counters,
    scope: QueryScope,
    quick_filter: Vec<String>,
    latest_sequence: u64,
    inbox_tx: Sender<(Topic, Value)>,
    inbox: Receiver<(Topic, Value)>,
    subscriptions: Vec<Subscription>,
    last_error: Option<EngineError>,
    new_records: usize,
    disposed: bool,
}

impl<S: EventSource, V: AccessValidator> ReconciliationEngine<S, V> {
    /// Creates an engine and subscribes it to the push topics.
    pub fn mount(
        config: EngineConfig,
        source: Arc<S>,
        validator: Arc<V>,
        channel: Arc<dyn PushChannel>,
    ) -> EngineResult<Self> {
        let (inbox_tx, inbox) = mpsc::channel();
        let mut engine = Self {
            id: SubscriberId::new(),
            registry: Registry::new(config.can_finalize),
            window: DisplayWindow::new(config.page_size, config.sort),
            counters: Counters::new(config.recent_event_capacity),
            scope: QueryScope::default(),
            quick_filter: Vec::new(),
            latest_sequence: 0,
            inbox_tx,
            inbox,
            subscriptions: Vec::with_capacity(SUBSCRIBED_TOPICS.len()),
            last_error: None,
            new_records: 0,
            disposed: false,
            config,
            source,
            validator,
            channel,
        };
        engine.rebuild_scope();

        for topic in SUBSCRIBED_TOPICS {
            engine.subscribe(topic)?;
        }
        info!("Mounted engine {}", engine.id);
        Ok(engine)
    }

    /// Subscribes to one more topic.
    ///
    /// Fails with `AlreadySubscribed` if this engine already listens to it.
    pub fn subscribe(&mut self, topic: Topic) -> EngineResult<()> {
        self.ensure_mounted()?;
        let tx = self.inbox_tx.clone();
        let handler: PushHandler = Arc::new(move |topic: Topic, payload: &Value| {
            // The receiver only goes away with the engine.
            let _ = tx.send((topic, payload.clone()));
        });
        let subscription = self.channel.subscribe(topic, self.id, handler)?;
        self.subscriptions.push(subscription);
        Ok(())
    }

    /// Unsubscribes from every topic and discards queued messages.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for mut subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        while self.inbox.try_recv().is_ok() {}
        self.disposed = true;
        info!("Disposed engine {}", self.id);
    }

    /// Returns true once `dispose` has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Subscriber identity of this engine.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Window on display.
    pub fn window(&self) -> &DisplayWindow {
        &self.window
    }

    /// Records on display.
    pub fn items(&self) -> &[VisitRecord] {
        self.window.items()
    }

    /// Featured record.
    pub fn featured(&self) -> Option<&VisitRecord> {
        self.window.featured()
    }

    /// Live counters.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Scope applied to push merges.
    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    /// Last transport failure, cleared by the next successful load.
    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    /// In-scope records delivered by `new-records` since the last load.
    pub fn new_records_notice(&self) -> usize {
        self.new_records
    }

    /// Latest issued load sequence.
    pub fn latest_sequence(&self) -> u64 {
        self.latest_sequence
    }

    /// Issues a load for the current query state.
    ///
    /// Any load issued earlier becomes stale.
    pub fn begin_load(&mut self) -> EngineResult<LoadTicket> {
        self.ensure_mounted()?;
        self.latest_sequence += 1;
        Ok(LoadTicket {
            sequence: self.latest_sequence,
            request: self.build_request(),
        })
    }

    /// Applies the response to a ticket.
    ///
    /// Stale responses are discarded. Failures leave the window untouched.
    pub fn complete_load(
        &mut self,
        ticket: &LoadTicket,
        result: EngineResult<QueryResponse>,
    ) -> EngineResult<LoadReport> {
        self.ensure_mounted()?;
        if ticket.sequence != self.latest_sequence {
            debug!(
                "Discarding load {} superseded by {}",
                ticket.sequence, self.latest_sequence
            );
            return Err(EngineError::StaleResponse {
                sequence: ticket.sequence,
                latest: self.latest_sequence,
            });
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!("Load {} failed: {}", ticket.sequence, e);
                if matches!(e, EngineError::Transport { .. }) {
                    self.last_error = Some(e.clone());
                }
                return Err(e);
            }
        };

        let received = response.paginated_results.len();
        let rows: Vec<VisitRecord> = response
            .paginated_results
            .into_iter()
            .filter(|record| match record.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping invalid row {}: {}", record.id, e);
                    false
                }
            })
            .collect();
        let invalid_rows = received - rows.len();

        let featured = if ticket.request.pagination.page == 0 {
            response
                .first_record
                .filter(|record| record.validate().is_ok())
        } else {
            None
        };

        self.window.load(rows, response.total_count, featured);
        self.counters.load(&response.stats);
        self.new_records = 0;
        self.last_error = None;

        debug!(
            "Applied load {}: {} rows of {}",
            ticket.sequence,
            self.window.len(),
            response.total_count
        );
        Ok(LoadReport {
            sequence: ticket.sequence,
            rows: self.window.len(),
            invalid_rows,
            total_count: response.total_count,
        })
    }

    /// Issues a load and completes it against the event source.
    pub fn refresh(&mut self) -> EngineResult<LoadReport> {
        let ticket = self.begin_load()?;
        let result = self.source.query(&ticket.request);
        self.complete_load(&ticket, result)
    }

    /// Like `refresh`, retrying retryable transport errors.
    pub fn refresh_with_retry(&mut self) -> EngineResult<LoadReport> {
        let retry = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                std::thread::sleep(retry.delay_for_attempt(attempt));
                info!("Retrying load (attempt {})", attempt + 1);
            }

            match self.refresh() {
                Ok(report) => return Ok(report),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry.max_attempts {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::transport_fatal("no load attempts made")))
    }

    /// Changes the day of interest and returns to the first page.
    pub fn set_date(&mut self, date: Option<Date>) -> EngineResult<LoadTicket> {
        self.config.date = date;
        self.rebuild_scope();
        self.window.set_page(0);
        self.begin_load()
    }

    /// Changes the access-point scope and returns to the first page.
    pub fn set_access_scope(&mut self, access_id: Option<String>) -> EngineResult<LoadTicket> {
        self.config.access_scope = access_id;
        self.rebuild_scope();
        self.window.set_page(0);
        self.begin_load()
    }

    /// Changes the quick filter and returns to the first page.
    ///
    /// The text is split into whitespace-separated terms.
    pub fn set_quick_filter(&mut self, text: &str) -> EngineResult<LoadTicket> {
        self.quick_filter = text.split_whitespace().map(str::to_string).collect();
        self.window.set_page(0);
        self.begin_load()
    }

    /// Selects a page.
    pub fn set_page(&mut self, page: u32) -> EngineResult<LoadTicket> {
        self.window.set_page(page);
        self.begin_load()
    }

    /// Changes the page size and returns to the first page.
    pub fn set_page_size(&mut self, page_size: u32) -> EngineResult<LoadTicket> {
        self.config.page_size = page_size;
        self.window.set_page_size(page_size);
        self.window.set_page(0);
        self.begin_load()
    }

    /// Inverts the sort direction.
    pub fn toggle_sort(&mut self) -> EngineResult<LoadTicket> {
        self.window.toggle_sort();
        self.begin_load()
    }

    /// Replaces the sort.
    pub fn set_sort(&mut self, field: SortField, direction: SortDirection) -> EngineResult<LoadTicket> {
        self.window.set_sort(field, direction);
        self.begin_load()
    }

    /// Applies every queued push message, in arrival order.
    pub fn pump(&mut self) -> EngineResult<PumpReport> {
        self.ensure_mounted()?;
        let mut report = PumpReport::default();

        while let Ok((topic, payload)) = self.inbox.try_recv() {
            report.processed += 1;
            match decode_push(topic, &payload) {
                PushEvent::Valid(event) => self.apply_event(event, &mut report),
                PushEvent::Malformed(malformed) => {
                    report.malformed += 1;
                    warn!(
                        "Dropping malformed event on {}: {}",
                        malformed.topic, malformed.reason
                    );
                }
            }
        }
        Ok(report)
    }

    /// Admits a pending record with its completed payload.
    pub fn grant_access(&mut self, record: VisitRecord) -> EngineResult<VisitRecord> {
        self.ensure_mounted()?;
        let current = self.current(&record.id);
        let updated = self
            .registry
            .grant_access(self.source.as_ref(), current.as_ref(), record)?;
        self.notify_mutation(&updated.id)?;
        Ok(updated)
    }

    /// Toggles entry/exit at an access point.
    pub fn mark_access(&mut self, record_id: &str, access_id: &str) -> EngineResult<VisitRecord> {
        self.ensure_mounted()?;
        let current = self.current(record_id);
        let updated = self.registry.mark_access(
            self.source.as_ref(),
            record_id,
            current.as_ref(),
            access_id,
        )?;
        self.notify_mutation(record_id)?;
        Ok(updated)
    }

    /// Cancels a pending record.
    pub fn cancel(&mut self, record_id: &str, request: &CancelRequest) -> EngineResult<CancelOutcome> {
        self.ensure_mounted()?;
        let current = self.current(record_id);
        let outcome =
            self.registry
                .cancel(self.source.as_ref(), record_id, current.as_ref(), request)?;
        if request.notify && !(outcome.host_notified && outcome.subject_notified) {
            warn!(
                "Cancellation of {} only partially notified (host: {}, subject: {})",
                record_id, outcome.host_notified, outcome.subject_notified
            );
        }
        self.notify_mutation(record_id)?;
        Ok(outcome)
    }

    /// Closes a visit that has exited.
    pub fn finalize(&mut self, record_id: &str) -> EngineResult<VisitRecord> {
        self.ensure_mounted()?;
        let current = self.current(record_id);
        let updated = self
            .registry
            .finalize(self.source.as_ref(), record_id, current.as_ref())?;
        self.notify_mutation(record_id)?;
        Ok(updated)
    }

    /// Validates a scanned code.
    ///
    /// An admitted scan has already been recorded by the validator, so the
    /// engine only announces the change.
    pub fn scan_code(&mut self, code: &str, device_kind: DeviceKind) -> EngineResult<ScanOutcome> {
        self.ensure_mounted()?;
        let response = self.validator.validate_code(&ValidateCodeRequest {
            code: code.to_string(),
            source_device_kind: device_kind,
        })?;
        let outcome = ScanOutcome::from_response(response);
        match &outcome {
            ScanOutcome::Admitted { record_id } => {
                info!("Code admitted for {}", record_id);
                self.notify_mutation(record_id)?;
            }
            ScanOutcome::CompleteMissingData { record_id } => {
                info!("Record {} must complete missing data", record_id);
            }
        }
        Ok(outcome)
    }

    fn notify_mutation(&self, record_id: &str) -> EngineResult<usize> {
        let payload = serde_json::to_value(NotifyMutation {
            record_id: record_id.to_string(),
        })
        .map_err(|e| EngineError::transport_fatal(e.to_string()))?;
        Ok(self.channel.publish(Topic::NotifyMutation, &payload))
    }

    fn apply_event(&mut self, event: ValidEvent, report: &mut PumpReport) {
        match event {
            ValidEvent::CreateBatch(batch) => {
                let outcome = self.window.apply_create_batch(batch, &self.scope);
                self.new_records += outcome.accepted();
                report.absorb(outcome);
            }
            ValidEvent::Update(record) => {
                self.refresh_featured(&record, false);
                report.absorb(self.window.apply_update(record, &self.scope));
            }
            ValidEvent::Access(AccessActivity { event, record }) => {
                if self.counters.apply_event(&event) {
                    report.counted_events += 1;
                }
                self.refresh_featured(&record, true);
                report.absorb(self.window.apply_update(record, &self.scope));
            }
            ValidEvent::Notify(notify) => {
                debug!("Ignoring notify-mutation for {}", notify.record_id);
            }
        }
    }

    // Fresh activity takes over the featured slot; plain updates only
    // refresh the record already featured.
    fn refresh_featured(&mut self, record: &VisitRecord, promote: bool) {
        if self.window.pagination().page != 0 {
            return;
        }
        let same = self
            .window
            .featured()
            .is_some_and(|featured| featured.identity_key() == record.identity_key());
        if same || (promote && self.scope.includes(record)) {
            self.window.set_featured(Some(record.clone()));
        }
    }

    fn current(&self, record_id: &str) -> Option<VisitRecord> {
        self.window
            .find_by(|record| record.id == record_id)
            .or_else(|| self.window.featured().filter(|record| record.id == record_id))
            .cloned()
    }

    fn rebuild_scope(&mut self) {
        self.scope = QueryScope {
            date_range: self
                .config
                .date
                .map(|date| DateRange::day(date, self.config.utc_offset)),
            access_scope: self.config.access_scope.clone(),
        };
    }

    fn build_request(&self) -> QueryRequest {
        let pagination = Pagination::new(self.window.pagination().page, self.config.page_size);
        let mut request = QueryRequest::new(pagination)
            .with_filter(self.quick_filter.clone())
            .with_sort(self.window.sort());
        if let Some(range) = &self.scope.date_range {
            request = request.with_date(range.start);
        }
        if let Some(access_id) = &self.scope.access_scope {
            request = request.with_access_scope(access_id.clone());
        }
        request
    }

    fn ensure_mounted(&self) -> EngineResult<()> {
        if self.disposed {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }
}
