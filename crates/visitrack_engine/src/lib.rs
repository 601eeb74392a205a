//! # Visitrack Engine
//!
//! Keeps a paginated, sorted view of building-access activity consistent
//! while it is fed by authoritative paginated queries and by a best-effort
//! push channel.
//!
//! This crate provides:
//! - `DisplayWindow`: the bounded, ordered, deduplicated slice on display
//! - `Counters`: live entry/exit tallies per subject kind
//! - `Registry`: lifecycle pre-checks in front of the mutation endpoints
//! - `EventSource` / `AccessValidator`: seams to the external collaborators
//! - `PushHub`: in-process push channel with a one-subscription guard
//! - `ReconciliationEngine`: the composition, with mount/dispose lifecycle
//!
//! ## Architecture
//!
//! A query response performs a full `load` into the window and counters.
//! Push messages are queued by the channel handlers and applied by
//! `ReconciliationEngine::pump`, one message at a time, in arrival order.
//! Local mutations never patch the window directly: they re-broadcast the
//! record so every engine, the originator included, reconciles through the
//! same incremental path.
//!
//! ## Key Invariants
//!
//! - `items.len() <= page_size`
//! - Items are ordered by the active sort, ties in insertion order
//! - No two items share an identity key
//! - Responses older than the latest issued load are discarded

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod counters;
mod engine;
mod error;
mod pagination;
mod registry;
mod source;
mod validator;
mod window;

pub use channel::{PushChannel, PushHandler, PushHub, SubscriberId, Subscription};
pub use config::{EngineConfig, RetryConfig};
pub use counters::{Counters, Tally};
pub use engine::{LoadReport, LoadTicket, PumpReport, ReconciliationEngine};
pub use error::{EngineError, EngineResult};
pub use pagination::{sort_truncate, DateRange, QueryScope};
pub use registry::Registry;
pub use source::{EventSource, MockEventSource};
pub use validator::{AccessValidator, ScanOutcome, StaticValidator};
pub use window::{DisplayWindow, MergeOutcome, WindowItem};
