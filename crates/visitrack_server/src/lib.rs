//! # Visitrack Reference Server
//!
//! In-memory event source for Visitrack.
//!
//! This crate provides:
//! - A record store with access-code binding
//! - The query endpoint (filter, sort, paginate, stats)
//! - Mutation endpoints driven by the lifecycle table
//! - Code validation for scanners, panels and kiosks
//! - A relay turning `notify-mutation` requests into `record-updated`
//!   broadcasts
//!
//! # Architecture
//!
//! The server is the single writer. Engines never patch their window from a
//! mutation response; every change comes back to every mounted engine,
//! the originator included, through the push channel:
//!
//! ```text
//! engine --mutation--> VisitServer --access-events--> PushChannel --> engines
//! engine --notify-mutation--> PushChannel --> relay --record-updated--> engines
//! ```
//!
//! [`LocalEventSource`] adapts a server to the engine's `EventSource` and
//! `AccessValidator` traits so both can run in one process.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod local;
mod query;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{CodeValidation, HandlerContext, RequestHandler};
pub use local::LocalEventSource;
pub use query::{compare, compute_stats, matches_filter, run_query, scope_of};
pub use server::{VisitServer, RECEPTION_ACTOR};
pub use store::RecordStore;
