//! Visit-record lifecycle.
//!
//! ```text
//! Pending ──GrantAccess──▶ EntryGranted ◀──MarkAccess──▶ ExitGranted ──Finalize──▶ Finalized
//!    │
//!    └──Cancel──▶ Cancelled
//! ```
//!
//! `Cancelled` and `Finalized` are terminal. The table is pure: callers
//! decide where the resulting record is stored.

use crate::record::{VisitRecord, VisitStatus};
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;

/// A requested lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Admit a pending record.
    GrantAccess,
    /// Toggle entry/exit at an access point.
    MarkAccess {
        /// Access point the operator acts at.
        access_id: String,
    },
    /// Cancel a pending record.
    Cancel {
        /// Why.
        reason: String,
        /// Whether host and subject should be notified.
        notify: bool,
    },
    /// Close a visit that has exited.
    Finalize,
}

impl Action {
    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::GrantAccess => "grant-access",
            Action::MarkAccess { .. } => "mark-access",
            Action::Cancel { .. } => "cancel",
            Action::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs the lifecycle needs but does not derive itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionContext {
    /// Capability flag supplied by the caller's environment.
    pub can_finalize: bool,
}

impl TransitionContext {
    /// Context with finalization allowed.
    pub fn finalizing() -> Self {
        Self { can_finalize: true }
    }
}

/// Reasons a transition is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The transition exists but its precondition does not hold.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No such transition from the current status.
    #[error("cannot {action} a record in status {from}")]
    InvalidTransition {
        /// Current status.
        from: VisitStatus,
        /// Requested action.
        action: &'static str,
    },
}

/// Computes the status `action` leads to, without touching the record.
pub fn next_status(
    record: &VisitRecord,
    action: &Action,
    ctx: &TransitionContext,
) -> Result<VisitStatus, LifecycleError> {
    let invalid = || LifecycleError::InvalidTransition {
        from: record.status,
        action: action.name(),
    };

    match (record.status, action) {
        (VisitStatus::Pending, Action::GrantAccess) => {
            if record.access_points.is_empty() {
                return Err(LifecycleError::Validation(
                    "record has no access points".into(),
                ));
            }
            if !record.active {
                return Err(LifecycleError::Validation("record is inactive".into()));
            }
            Ok(VisitStatus::EntryGranted)
        }
        (from @ (VisitStatus::EntryGranted | VisitStatus::ExitGranted), Action::MarkAccess { access_id }) => {
            let point = record.access_point(access_id).ok_or_else(|| {
                LifecycleError::Validation(format!(
                    "access point {access_id} is not assigned to the record"
                ))
            })?;
            if !point.mode.permits_toggle() {
                return Err(LifecycleError::Validation(format!(
                    "access point {access_id} does not toggle automatically"
                )));
            }
            Ok(if from == VisitStatus::EntryGranted {
                VisitStatus::ExitGranted
            } else {
                VisitStatus::EntryGranted
            })
        }
        (VisitStatus::Pending, Action::Cancel { reason, .. }) => {
            if reason.trim().is_empty() {
                return Err(LifecycleError::Validation(
                    "a cancellation reason is required".into(),
                ));
            }
            Ok(VisitStatus::Cancelled)
        }
        (VisitStatus::ExitGranted, Action::Finalize) => {
            if !ctx.can_finalize {
                return Err(LifecycleError::Validation(
                    "finalization is not permitted".into(),
                ));
            }
            Ok(VisitStatus::Finalized)
        }
        _ => Err(invalid()),
    }
}

/// Applies `action` to `record`, stamping `now` as the modification time.
///
/// On error the record is left untouched.
pub fn apply(
    record: &mut VisitRecord,
    action: &Action,
    ctx: &TransitionContext,
    now: OffsetDateTime,
) -> Result<VisitStatus, LifecycleError> {
    let next = next_status(record, action, ctx)?;
    match action {
        Action::GrantAccess => record.missing_documents.clear(),
        Action::Cancel { reason, .. } => record.cancellation_reason = Some(reason.trim().to_string()),
        Action::Finalize => record.exit_timestamp = Some(now.max(record.entry_timestamp)),
        Action::MarkAccess { .. } => {}
    }
    record.status = next;
    record.last_modified = now;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AccessMode, AccessPointRef, SubjectKind};
    use time::macros::datetime;

    fn pending() -> VisitRecord {
        VisitRecord {
            id: "r-1".into(),
            subject_kind: SubjectKind::Visitor,
            subject_id: "v-1".into(),
            host_id: Some("e-1".into()),
            display_name: "Ana".into(),
            access_points: vec![
                AccessPointRef::new("lobby", AccessMode::Toggle),
                AccessPointRef::new("lab", AccessMode::Attended),
            ],
            status: VisitStatus::Pending,
            missing_documents: vec!["id-card".into()],
            cancellation_reason: None,
            entry_timestamp: datetime!(2024-05-01 09:00 UTC),
            exit_timestamp: None,
            created_at: datetime!(2024-05-01 08:00 UTC),
            last_modified: datetime!(2024-05-01 08:00 UTC),
            active: true,
        }
    }

    fn all_actions() -> Vec<Action> {
        vec![
            Action::GrantAccess,
            Action::MarkAccess {
                access_id: "lobby".into(),
            },
            Action::Cancel {
                reason: "no show".into(),
                notify: true,
            },
            Action::Finalize,
        ]
    }

    #[test]
    fn full_happy_path() {
        let mut r = pending();
        let now = datetime!(2024-05-01 09:10 UTC);
        let ctx = TransitionContext::finalizing();
        let mark = Action::MarkAccess {
            access_id: "lobby".into(),
        };

        assert_eq!(apply(&mut r, &Action::GrantAccess, &ctx, now), Ok(VisitStatus::EntryGranted));
        assert!(r.missing_documents.is_empty());
        assert_eq!(apply(&mut r, &mark, &ctx, now), Ok(VisitStatus::ExitGranted));
        assert_eq!(apply(&mut r, &mark, &ctx, now), Ok(VisitStatus::EntryGranted));
        assert_eq!(apply(&mut r, &mark, &ctx, now), Ok(VisitStatus::ExitGranted));
        assert_eq!(apply(&mut r, &Action::Finalize, &ctx, now), Ok(VisitStatus::Finalized));
        assert_eq!(r.exit_timestamp, Some(now));
        assert_eq!(r.last_modified, now);
    }

    #[test]
    fn grant_without_access_points_is_validation_error() {
        let mut r = pending();
        r.access_points.clear();
        let err = apply(
            &mut r,
            &Action::GrantAccess,
            &TransitionContext::default(),
            datetime!(2024-05-01 09:10 UTC),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
        assert_eq!(r.status, VisitStatus::Pending);
    }

    #[test]
    fn grant_requires_active_record() {
        let mut r = pending();
        r.active = false;
        assert!(matches!(
            next_status(&r, &Action::GrantAccess, &TransitionContext::default()),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn mark_access_requires_toggle_mode() {
        let mut r = pending();
        r.status = VisitStatus::EntryGranted;
        let attended = Action::MarkAccess {
            access_id: "lab".into(),
        };
        let missing = Action::MarkAccess {
            access_id: "roof".into(),
        };
        let ctx = TransitionContext::default();
        assert!(matches!(next_status(&r, &attended, &ctx), Err(LifecycleError::Validation(_))));
        assert!(matches!(next_status(&r, &missing, &ctx), Err(LifecycleError::Validation(_))));
    }

    #[test]
    fn cancel_requires_reason() {
        let r = pending();
        let blank = Action::Cancel {
            reason: "   ".into(),
            notify: false,
        };
        assert!(matches!(
            next_status(&r, &blank, &TransitionContext::default()),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn finalize_requires_capability() {
        let mut r = pending();
        r.status = VisitStatus::ExitGranted;
        assert!(matches!(
            next_status(&r, &Action::Finalize, &TransitionContext::default()),
            Err(LifecycleError::Validation(_))
        ));
        assert_eq!(
            next_status(&r, &Action::Finalize, &TransitionContext::finalizing()),
            Ok(VisitStatus::Finalized)
        );
    }

    #[test]
    fn finalize_from_entry_is_invalid() {
        let mut r = pending();
        r.status = VisitStatus::EntryGranted;
        assert_eq!(
            next_status(&r, &Action::Finalize, &TransitionContext::finalizing()),
            Err(LifecycleError::InvalidTransition {
                from: VisitStatus::EntryGranted,
                action: "finalize",
            })
        );
    }

    #[test]
    fn terminal_states_refuse_everything() {
        for status in [VisitStatus::Cancelled, VisitStatus::Finalized] {
            for action in all_actions() {
                let mut r = pending();
                r.status = status;
                let before = r.clone();
                let err = apply(
                    &mut r,
                    &action,
                    &TransitionContext::finalizing(),
                    datetime!(2024-05-02 10:00 UTC),
                )
                .unwrap_err();
                assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
                assert_eq!(r, before);
            }
        }
    }

    #[test]
    fn pending_cannot_mark_or_finalize() {
        let r = pending();
        let ctx = TransitionContext::finalizing();
        for action in [
            Action::MarkAccess {
                access_id: "lobby".into(),
            },
            Action::Finalize,
        ] {
            assert!(matches!(
                next_status(&r, &action, &ctx),
                Err(LifecycleError::InvalidTransition { .. })
            ));
        }
    }

    fn status_strategy() -> impl proptest::strategy::Strategy<Value = VisitStatus> {
        use proptest::prelude::*;
        prop_oneof![
            Just(VisitStatus::Pending),
            Just(VisitStatus::EntryGranted),
            Just(VisitStatus::ExitGranted),
            Just(VisitStatus::Cancelled),
            Just(VisitStatus::Finalized),
        ]
    }

    proptest::proptest! {
        #[test]
        fn apply_agrees_with_next_status(
            status in status_strategy(),
            action_index in 0usize..4,
            can_finalize in proptest::bool::ANY,
        ) {
            let mut r = pending();
            r.status = status;
            let action = all_actions().swap_remove(action_index);
            let ctx = TransitionContext { can_finalize };
            let now = datetime!(2024-05-01 11:00 UTC);

            let expected = next_status(&r, &action, &ctx);
            let before = r.clone();
            let applied = apply(&mut r, &action, &ctx, now);
            proptest::prop_assert_eq!(&applied, &expected);
            match applied {
                Ok(next) => {
                    proptest::prop_assert_eq!(r.status, next);
                    proptest::prop_assert_eq!(r.last_modified, now);
                }
                Err(_) => proptest::prop_assert_eq!(r, before),
            }
        }
    }
}
