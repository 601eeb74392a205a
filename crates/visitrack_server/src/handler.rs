//! Request handlers for the query, mutation and validation endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::query::run_query;
use crate::store::RecordStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;
use visitrack_protocol::lifecycle::{self, Action, TransitionContext};
use visitrack_protocol::{
    CancelOutcome, CancelRequest, GrantAccessRequest, MarkAccessRequest, QueryRequest,
    QueryResponse, ValidateCodeRequest, ValidateCodeResponse, VisitRecord, VisitStatus,
};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Record store (shared across all handlers).
    pub store: Arc<RecordStore>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<RecordStore>) -> Self {
        Self { config, store }
    }

    fn transition_context(&self) -> TransitionContext {
        TransitionContext {
            can_finalize: self.config.allow_finalize,
        }
    }

    fn transition(&self, record_id: &str, action: Action) -> ServerResult<VisitRecord> {
        let ctx = self.transition_context();
        let (record, status) = self.store.update(record_id, |record| {
            Ok(lifecycle::apply(record, &action, &ctx, OffsetDateTime::now_utc())?)
        })?;
        info!("Record {} is now {} ({})", record_id, status, action);
        Ok(record)
    }
}

/// Outcome of a code validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeValidation {
    /// Response returned to the device.
    pub response: ValidateCodeResponse,
    /// The record after the passage, when one was recorded.
    pub passage: Option<VisitRecord>,
}

/// Handler for Visitrack requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Registers new records.
    ///
    /// Blank IDs are replaced with fresh UUIDs. The whole batch is refused
    /// if any record is invalid or already registered.
    pub fn handle_register(&self, records: Vec<VisitRecord>) -> ServerResult<Vec<VisitRecord>> {
        if records.len() > self.context.config.max_register_batch {
            return Err(ServerError::InvalidRequest(format!(
                "Too many records: {} > {}",
                records.len(),
                self.context.config.max_register_batch
            )));
        }

        let mut prepared = Vec::with_capacity(records.len());
        for mut record in records {
            if record.id.trim().is_empty() {
                record.id = Uuid::new_v4().to_string();
            }
            record.validate()?;
            if self.context.store.get(&record.id).is_some()
                || prepared.iter().any(|r: &VisitRecord| r.id == record.id)
            {
                return Err(ServerError::Duplicate(record.id));
            }
            prepared.push(record);
        }

        for record in &prepared {
            self.context.store.insert(record.clone())?;
        }
        debug!("Registered {} records", prepared.len());
        Ok(prepared)
    }

    /// Handles a paginated query.
    pub fn handle_query(&self, request: &QueryRequest) -> ServerResult<QueryResponse> {
        let page_size = self
            .context
            .config
            .effective_page_size(request.pagination.page_size);
        let snapshot = self.context.store.snapshot();
        Ok(run_query(&snapshot, request, page_size))
    }

    /// Admits a pending record, replacing its data with the completed payload.
    pub fn handle_grant_access(
        &self,
        record_id: &str,
        request: &GrantAccessRequest,
    ) -> ServerResult<VisitRecord> {
        let payload = &request.record;
        if payload.id != record_id {
            return Err(ServerError::InvalidRequest(format!(
                "payload is for {} but the path names {}",
                payload.id, record_id
            )));
        }
        payload.validate()?;

        let ctx = self.context.transition_context();
        let (record, _) = self.context.store.update(record_id, |stored| {
            let mut next = VisitRecord {
                id: stored.id.clone(),
                subject_kind: stored.subject_kind,
                subject_id: stored.subject_id.clone(),
                status: stored.status,
                entry_timestamp: stored.entry_timestamp,
                exit_timestamp: stored.exit_timestamp,
                created_at: stored.created_at,
                last_modified: stored.last_modified,
                ..payload.clone()
            };
            lifecycle::apply(&mut next, &Action::GrantAccess, &ctx, OffsetDateTime::now_utc())?;
            *stored = next;
            Ok(())
        })?;
        info!("Record {} granted access", record_id);
        Ok(record)
    }

    /// Toggles entry/exit at an access point.
    pub fn handle_mark_access(
        &self,
        record_id: &str,
        request: &MarkAccessRequest,
    ) -> ServerResult<VisitRecord> {
        self.context.transition(
            record_id,
            Action::MarkAccess {
                access_id: request.access_id.clone(),
            },
        )
    }

    /// Cancels a pending record and attempts notification.
    ///
    /// Notification failures are reported, never fatal.
    pub fn handle_cancel(
        &self,
        record_id: &str,
        request: &CancelRequest,
    ) -> ServerResult<(VisitRecord, CancelOutcome)> {
        let record = self.context.transition(
            record_id,
            Action::Cancel {
                reason: request.reason.clone(),
                notify: request.notify,
            },
        )?;

        let config = &self.context.config;
        let outcome = if request.notify {
            CancelOutcome {
                host_notified: record.host_id.is_some() && config.notify_hosts,
                subject_notified: config.notify_subjects,
            }
        } else {
            CancelOutcome::default()
        };
        if request.notify {
            info!(
                "Cancellation notices for {}: host {}, subject {}",
                record_id, outcome.host_notified, outcome.subject_notified
            );
        }
        Ok((record, outcome))
    }

    /// Closes a visit that has exited.
    pub fn handle_finalize(&self, record_id: &str) -> ServerResult<VisitRecord> {
        self.context.transition(record_id, Action::Finalize)
    }

    /// Issues an access code for a record.
    pub fn handle_issue_code(&self, record_id: &str) -> ServerResult<String> {
        let code = format!("QR-{}", Uuid::new_v4().simple());
        self.context.store.bind_code(code.clone(), record_id)?;
        Ok(code)
    }

    /// Validates a scanned code, recording the passage when admitted.
    ///
    /// A record with missing documents is not admitted; the caller routes
    /// the subject to complete them first.
    pub fn handle_validate_code(&self, request: &ValidateCodeRequest) -> ServerResult<CodeValidation> {
        let code = request.code.trim();
        let record_id = self
            .context
            .store
            .resolve_code(code)
            .ok_or_else(|| ServerError::NotFound(format!("code {code}")))?;
        let record = self
            .context
            .store
            .get(&record_id)
            .ok_or_else(|| ServerError::NotFound(record_id.clone()))?;

        if !record.missing_documents.is_empty() {
            debug!(
                "Record {} has {} missing documents",
                record_id,
                record.missing_documents.len()
            );
            return Ok(CodeValidation {
                response: ValidateCodeResponse {
                    record_id,
                    can_enter: false,
                },
                passage: None,
            });
        }

        let action = match record.status {
            VisitStatus::Pending => Action::GrantAccess,
            _ => {
                let point = record
                    .access_points
                    .iter()
                    .find(|point| point.mode.permits_toggle())
                    .ok_or_else(|| {
                        ServerError::InvalidRequest(format!(
                            "record {record_id} has no automatic access point"
                        ))
                    })?;
                Action::MarkAccess {
                    access_id: point.access_id.clone(),
                }
            }
        };
        let updated = self.context.transition(&record_id, action)?;

        Ok(CodeValidation {
            response: ValidateCodeResponse {
                record_id,
                can_enter: true,
            },
            passage: Some(updated),
        })
    }

    /// Returns a stored record.
    pub fn record(&self, record_id: &str) -> Option<VisitRecord> {
        self.context.store.get(record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visitrack_protocol::{DeviceKind, Pagination};
    use visitrack_testkit::RecordBuilder;

    fn create_handler() -> RequestHandler {
        create_handler_with(ServerConfig::default())
    }

    fn create_handler_with(config: ServerConfig) -> RequestHandler {
        let store = Arc::new(RecordStore::new());
        RequestHandler::new(Arc::new(HandlerContext::new(config, store)))
    }

    fn scan(code: &str) -> ValidateCodeRequest {
        ValidateCodeRequest {
            code: code.into(),
            source_device_kind: DeviceKind::Scanner,
        }
    }

    #[test]
    fn register_assigns_ids() {
        let handler = create_handler();
        let mut record = RecordBuilder::visitor("").build();
        record.subject_id = "vis-x".into();

        let stored = handler.handle_register(vec![record]).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(Uuid::parse_str(&stored[0].id).is_ok());
    }

    #[test]
    fn register_refuses_whole_batch() {
        let handler = create_handler();
        let good = RecordBuilder::visitor("r-1").build();
        let mut bad = RecordBuilder::visitor("r-2").build();
        bad.subject_id.clear();

        assert!(handler.handle_register(vec![good, bad]).is_err());
        assert!(handler.record("r-1").is_none());

        let dup = RecordBuilder::visitor("r-3").build();
        assert!(matches!(
            handler.handle_register(vec![dup.clone(), dup]),
            Err(ServerError::Duplicate(_))
        ));
    }

    #[test]
    fn register_respects_batch_limit() {
        let handler = create_handler_with(ServerConfig::default().with_max_register_batch(1));
        let batch = vec![
            RecordBuilder::visitor("r-1").build(),
            RecordBuilder::visitor("r-2").build(),
        ];
        assert!(matches!(
            handler.handle_register(batch),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn query_clamps_page_size() {
        let handler = create_handler_with(ServerConfig::new(2, 3));
        let batch = (0..5)
            .map(|i| RecordBuilder::visitor(&format!("r-{i}")).build())
            .collect();
        handler.handle_register(batch).unwrap();

        let response = handler
            .handle_query(&QueryRequest::new(Pagination::new(0, 50)))
            .unwrap();
        assert_eq!(response.paginated_results.len(), 3);
        assert_eq!(response.total_count, 5);
    }

    #[test]
    fn grant_keeps_identity_and_status_history() {
        let handler = create_handler();
        handler
            .handle_register(vec![RecordBuilder::visitor("r-1").missing("id-card").build()])
            .unwrap();

        let mut payload = RecordBuilder::visitor("r-1")
            .display_name("Completed Name")
            .toggle_point("garage")
            .build();
        payload.subject_id = "someone-else".into();

        let granted = handler
            .handle_grant_access("r-1", &GrantAccessRequest { record: payload })
            .unwrap();
        assert_eq!(granted.status, VisitStatus::EntryGranted);
        assert_eq!(granted.display_name, "Completed Name");
        assert_eq!(granted.subject_id, "vis-r-1");
        assert!(granted.missing_documents.is_empty());
        assert!(granted.has_access_point("garage"));
    }

    #[test]
    fn grant_with_mismatched_id_is_refused() {
        let handler = create_handler();
        handler
            .handle_register(vec![RecordBuilder::visitor("r-1").build()])
            .unwrap();
        let payload = RecordBuilder::visitor("r-2").build();
        assert!(matches!(
            handler.handle_grant_access("r-1", &GrantAccessRequest { record: payload }),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn cancel_reports_notifications() {
        let handler = create_handler_with(ServerConfig::default().with_notifications(true, false));
        handler
            .handle_register(vec![
                RecordBuilder::visitor("r-1").host("emp-1").build(),
                RecordBuilder::visitor("r-2").build(),
            ])
            .unwrap();

        let (record, outcome) = handler
            .handle_cancel("r-1", &CancelRequest::new("host is away", true))
            .unwrap();
        assert_eq!(record.status, VisitStatus::Cancelled);
        assert_eq!(record.cancellation_reason.as_deref(), Some("host is away"));
        assert!(outcome.host_notified);
        assert!(!outcome.subject_notified);

        let (_, quiet) = handler
            .handle_cancel("r-2", &CancelRequest::new("dup", false))
            .unwrap();
        assert_eq!(quiet, CancelOutcome::default());
    }

    #[test]
    fn finalize_can_be_disabled() {
        let handler = create_handler_with(ServerConfig::default().with_allow_finalize(false));
        handler
            .handle_register(vec![RecordBuilder::visitor("r-1")
                .status(VisitStatus::ExitGranted)
                .build()])
            .unwrap();
        assert!(matches!(
            handler.handle_finalize("r-1"),
            Err(ServerError::Lifecycle(_))
        ));
    }

    #[test]
    fn validate_code_toggles_passage() {
        let handler = create_handler();
        handler
            .handle_register(vec![RecordBuilder::visitor("r-1").build()])
            .unwrap();
        let code = handler.handle_issue_code("r-1").unwrap();

        let first = handler.handle_validate_code(&scan(&code)).unwrap();
        assert!(first.response.can_enter);
        assert_eq!(first.passage.unwrap().status, VisitStatus::EntryGranted);

        let second = handler.handle_validate_code(&scan(&code)).unwrap();
        assert_eq!(second.passage.unwrap().status, VisitStatus::ExitGranted);
    }

    #[test]
    fn validate_code_requires_complete_data() {
        let handler = create_handler();
        handler
            .handle_register(vec![RecordBuilder::visitor("r-1").missing("photo").build()])
            .unwrap();
        let code = handler.handle_issue_code("r-1").unwrap();

        let validation = handler.handle_validate_code(&scan(&code)).unwrap();
        assert!(!validation.response.can_enter);
        assert!(validation.passage.is_none());
        assert_eq!(handler.record("r-1").unwrap().status, VisitStatus::Pending);
    }

    #[test]
    fn unknown_code_is_not_found() {
        let handler = create_handler();
        assert!(matches!(
            handler.handle_validate_code(&scan("QR-nope")),
            Err(ServerError::NotFound(_))
        ));
    }
}
