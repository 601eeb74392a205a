//! In-process adapter exposing a [`VisitServer`] to the engine.

use crate::error::ServerError;
use crate::server::VisitServer;
use std::sync::Arc;
use visitrack_engine::{AccessValidator, EngineError, EngineResult, EventSource};
use visitrack_protocol::{
    CancelOutcome, CancelRequest, GrantAccessRequest, LifecycleError, MarkAccessRequest,
    QueryRequest, QueryResponse, ValidateCodeRequest, ValidateCodeResponse, VisitRecord,
};

/// Event source and access validator backed by an in-process server.
#[derive(Clone)]
pub struct LocalEventSource {
    server: Arc<VisitServer>,
}

impl LocalEventSource {
    /// Wraps a server.
    pub fn new(server: Arc<VisitServer>) -> Self {
        Self { server }
    }

    /// The wrapped server.
    pub fn server(&self) -> &Arc<VisitServer> {
        &self.server
    }
}

impl From<ServerError> for EngineError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Lifecycle(LifecycleError::Validation(message)) => {
                EngineError::Validation(message)
            }
            ServerError::Lifecycle(LifecycleError::InvalidTransition { from, action }) => {
                EngineError::InvalidTransition { from, action }
            }
            ServerError::NotFound(what) => EngineError::NotFound(what),
            ServerError::InvalidRequest(message) | ServerError::Duplicate(message) => {
                EngineError::Validation(message)
            }
            ServerError::Protocol(err) => EngineError::Validation(err.to_string()),
            ServerError::Unavailable(message) => EngineError::transport_retryable(message),
            ServerError::Internal(message) => EngineError::transport_fatal(message),
        }
    }
}

impl EventSource for LocalEventSource {
    fn query(&self, request: &QueryRequest) -> EngineResult<QueryResponse> {
        Ok(self.server.query(request)?)
    }

    fn grant_access(
        &self,
        record_id: &str,
        request: &GrantAccessRequest,
    ) -> EngineResult<VisitRecord> {
        Ok(self.server.grant_access(record_id, request)?)
    }

    fn mark_access(
        &self,
        record_id: &str,
        request: &MarkAccessRequest,
    ) -> EngineResult<VisitRecord> {
        Ok(self.server.mark_access(record_id, request)?)
    }

    fn cancel(&self, record_id: &str, request: &CancelRequest) -> EngineResult<CancelOutcome> {
        Ok(self.server.cancel(record_id, request)?)
    }

    fn finalize(&self, record_id: &str) -> EngineResult<VisitRecord> {
        Ok(self.server.finalize(record_id)?)
    }
}

impl AccessValidator for LocalEventSource {
    fn validate_code(&self, request: &ValidateCodeRequest) -> EngineResult<ValidateCodeResponse> {
        Ok(self.server.validate_code(request)?)
    }
}
