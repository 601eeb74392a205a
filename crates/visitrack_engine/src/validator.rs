//! Access code validation.

use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use visitrack_protocol::{ValidateCodeRequest, ValidateCodeResponse};

/// Resolves scanned codes to records.
pub trait AccessValidator: Send + Sync {
    /// Validates a scanned code.
    fn validate_code(&self, request: &ValidateCodeRequest) -> EngineResult<ValidateCodeResponse>;
}

/// What the caller should do after a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The passage was recorded.
    Admitted {
        /// Scanned record.
        record_id: String,
    },
    /// The subject must complete missing data, then be granted access.
    CompleteMissingData {
        /// Scanned record.
        record_id: String,
    },
}

impl ScanOutcome {
    /// Builds the outcome for a validation response.
    pub fn from_response(response: ValidateCodeResponse) -> Self {
        if response.can_enter {
            ScanOutcome::Admitted {
                record_id: response.record_id,
            }
        } else {
            ScanOutcome::CompleteMissingData {
                record_id: response.record_id,
            }
        }
    }

    /// Scanned record.
    pub fn record_id(&self) -> &str {
        match self {
            ScanOutcome::Admitted { record_id } | ScanOutcome::CompleteMissingData { record_id } => {
                record_id
            }
        }
    }
}

/// Validator backed by a fixed code table.
#[derive(Debug, Default)]
pub struct StaticValidator {
    codes: RwLock<HashMap<String, ValidateCodeResponse>>,
}

impl StaticValidator {
    /// Creates an empty validator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a code.
    pub fn insert(&self, code: impl Into<String>, record_id: impl Into<String>, can_enter: bool) {
        self.codes.write().insert(
            code.into(),
            ValidateCodeResponse {
                record_id: record_id.into(),
                can_enter,
            },
        );
    }
}

impl AccessValidator for StaticValidator {
    fn validate_code(&self, request: &ValidateCodeRequest) -> EngineResult<ValidateCodeResponse> {
        self.codes
            .read()
            .get(request.code.trim())
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("code {}", request.code)))
    }
}
