//! # Visitrack Protocol
//!
//! Data model and wire messages shared by the Visitrack engine and the
//! reference event source.
//!
//! This crate provides:
//! - `VisitRecord` and the centralized identity key
//! - `AccessEvent` and the event-kind catalog
//! - Query, mutation and code-validation messages
//! - Push topics and the shape-validation boundary for push payloads
//! - The visit-record lifecycle transition table
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
pub mod lifecycle;
mod messages;
mod payload;
mod record;

pub use error::{ProtocolError, ProtocolResult};
pub use event::{AccessEvent, DeviceKind, EventKind};
pub use lifecycle::{Action, LifecycleError, TransitionContext};
pub use messages::{
    CancelOutcome, CancelRequest, GrantAccessRequest, MarkAccessRequest, NotifyMutation,
    Pagination, QueryRequest, QueryResponse, QueryStats, SortDirection, SortField, SortSpec,
    Topic, ValidateCodeRequest, ValidateCodeResponse,
};
pub use payload::{decode_push, AccessActivity, MalformedEvent, PushEvent, ValidEvent};
pub use record::{
    identity_key, AccessMode, AccessPointRef, IdentityKey, SubjectKind, VisitRecord, VisitStatus,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
