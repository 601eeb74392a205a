//! Lifecycle pre-checks in front of the mutation endpoints.
//!
//! The event source enforces the lifecycle authoritatively. The registry
//! runs the same table locally so an impossible transition never leaves the
//! client. When the current record is unknown only the action's own inputs
//! are checked.

use crate::error::{EngineError, EngineResult};
use crate::source::EventSource;
use tracing::debug;
use visitrack_protocol::lifecycle::{self, Action, TransitionContext};
use visitrack_protocol::{
    CancelOutcome, CancelRequest, GrantAccessRequest, MarkAccessRequest, VisitRecord, VisitStatus,
};

/// Lifecycle gatekeeper for one engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Registry {
    ctx: TransitionContext,
}

impl Registry {
    /// Creates a registry with the given finalize capability.
    pub fn new(can_finalize: bool) -> Self {
        Self {
            ctx: TransitionContext { can_finalize },
        }
    }

    /// Transition context handed to the lifecycle table.
    pub fn context(&self) -> TransitionContext {
        self.ctx
    }

    /// Checks `action` against `current`.
    ///
    /// Returns the status the record would move to, or `None` when the
    /// current record is unknown.
    pub fn check(
        &self,
        current: Option<&VisitRecord>,
        action: &Action,
    ) -> EngineResult<Option<VisitStatus>> {
        match current {
            Some(record) => Ok(Some(lifecycle::next_status(record, action, &self.ctx)?)),
            None => {
                self.check_inputs(action)?;
                Ok(None)
            }
        }
    }

    /// Admits a pending record with its completed payload.
    pub fn grant_access<S>(
        &self,
        source: &S,
        current: Option<&VisitRecord>,
        payload: VisitRecord,
    ) -> EngineResult<VisitRecord>
    where
        S: EventSource + ?Sized,
    {
        payload
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        let candidate = match current {
            Some(record) => VisitRecord {
                status: record.status,
                ..payload.clone()
            },
            None => payload.clone(),
        };
        self.check(Some(&candidate), &Action::GrantAccess)?;

        debug!("Granting access to {}", payload.id);
        let record_id = payload.id.clone();
        source.grant_access(&record_id, &GrantAccessRequest { record: payload })
    }

    /// Toggles entry/exit at an access point.
    pub fn mark_access<S>(
        &self,
        source: &S,
        record_id: &str,
        current: Option<&VisitRecord>,
        access_id: &str,
    ) -> EngineResult<VisitRecord>
    where
        S: EventSource + ?Sized,
    {
        let action = Action::MarkAccess {
            access_id: access_id.to_string(),
        };
        self.check(current, &action)?;

        debug!("Marking access for {} at {}", record_id, access_id);
        source.mark_access(
            record_id,
            &MarkAccessRequest {
                access_id: access_id.to_string(),
            },
        )
    }

    /// Cancels a pending record.
    pub fn cancel<S>(
        &self,
        source: &S,
        record_id: &str,
        current: Option<&VisitRecord>,
        request: &CancelRequest,
    ) -> EngineResult<CancelOutcome>
    where
        S: EventSource + ?Sized,
    {
        let action = Action::Cancel {
            reason: request.reason.clone(),
            notify: request.notify,
        };
        self.check(current, &action)?;

        debug!("Cancelling {} (notify: {})", record_id, request.notify);
        source.cancel(record_id, request)
    }

    /// Closes a visit that has exited.
    pub fn finalize<S>(
        &self,
        source: &S,
        record_id: &str,
        current: Option<&VisitRecord>,
    ) -> EngineResult<VisitRecord>
    where
        S: EventSource + ?Sized,
    {
        self.check(current, &Action::Finalize)?;

        debug!("Finalizing {}", record_id);
        source.finalize(record_id)
    }

    fn check_inputs(&self, action: &Action) -> EngineResult<()> {
        match action {
            Action::Cancel { reason, .. } if reason.trim().is_empty() => Err(
                EngineError::Validation("a cancellation reason is required".into()),
            ),
            Action::MarkAccess { access_id } if access_id.trim().is_empty() => Err(
                EngineError::Validation("an access point is required".into()),
            ),
            Action::Finalize if !self.ctx.can_finalize => Err(EngineError::Validation(
                "finalization is not permitted".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockEventSource;
    use visitrack_testkit::RecordBuilder;

    #[test]
    fn grant_without_access_points_never_reaches_source() {
        let source = MockEventSource::new();
        let record = RecordBuilder::visitor("r-1").no_access_points().build();
        source.insert_record(record.clone());

        let err = Registry::default()
            .grant_access(&source, Some(&record), record.clone())
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert!(source.calls().is_empty());
        assert_eq!(source.record("r-1").unwrap().status, VisitStatus::Pending);
    }

    #[test]
    fn grant_uses_completed_payload() {
        let source = MockEventSource::new();
        let stored = RecordBuilder::visitor("r-1").no_access_points().build();
        source.insert_record(stored.clone());

        let completed = RecordBuilder::visitor("r-1")
            .toggle_point("lobby")
            .missing("id-card")
            .build();
        let granted = Registry::default()
            .grant_access(&source, Some(&stored), completed)
            .unwrap();

        assert_eq!(granted.status, VisitStatus::EntryGranted);
        assert!(granted.missing_documents.is_empty());
        assert_eq!(granted.access_points.len(), 1);
    }

    #[test]
    fn terminal_records_are_refused_locally() {
        let source = MockEventSource::new();
        let record = RecordBuilder::visitor("r-1")
            .status(VisitStatus::Finalized)
            .build();

        let err = Registry::new(true)
            .cancel(&source, "r-1", Some(&record), &CancelRequest::new("late", false))
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert!(source.calls().is_empty());
    }

    #[test]
    fn unknown_record_still_checks_inputs() {
        let source = MockEventSource::new();
        let registry = Registry::default();

        assert!(matches!(
            registry.cancel(&source, "r-1", None, &CancelRequest::new(" ", true)),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            registry.finalize(&source, "r-1", None),
            Err(EngineError::Validation(_))
        ));
        assert!(source.calls().is_empty());
    }

    #[test]
    fn valid_mark_access_reaches_source() {
        let source = MockEventSource::new();
        let record = RecordBuilder::visitor("r-1")
            .status(VisitStatus::EntryGranted)
            .build();
        source.insert_record(record.clone());

        let updated = Registry::default()
            .mark_access(&source, "r-1", Some(&record), "lobby")
            .unwrap();

        assert_eq!(updated.status, VisitStatus::ExitGranted);
        assert_eq!(source.calls(), vec!["mark-access:r-1"]);
    }
}
