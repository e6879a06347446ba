//! Unified error type for the security profile resource
//!
//! Component modules keep their own error types (`DecodeError`,
//! `ValidationError`, `StoreError`) for precise handling; [`SpError`] wraps them
//! for the public API. At the resource boundary every failure is converted into
//! an entity-handler result and an empty response body, so none of these are
//! fatal to the host.

use crate::cbor::DecodeError;
use crate::resource::UpdateStage;
use crate::store::StoreError;
use crate::validate::ValidationError;
use thiserror::Error;

/// Unified error type for all security profile operations
///
/// # Error Categories
///
/// - **InvalidArgument**: rejected before any work began (e.g. empty payload)
/// - **EncodeOverflow**: buffer too small; consumed by the grow-and-retry loop
/// - **EncodeFailure**: terminal encode error, no payload produced
/// - **DecodeFailure**: malformed CBOR envelope
/// - **ValidationFailure**: well-formed but semantically inconsistent profile
/// - **PersistenceFailure**: the store refused the write
/// - **UpdateRejected**: any of the above, tagged with the update stage
#[derive(Debug, Error)]
pub enum SpError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Encode buffer overflow: {needed} more byte(s) required")]
    EncodeOverflow { needed: usize },

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(#[from] DecodeError),

    #[error("Validation failure: {0}")]
    ValidationFailure(#[from] ValidationError),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Update rejected while {stage}: {source}")]
    UpdateRejected {
        stage: UpdateStage,
        #[source]
        source: Box<SpError>,
    },
}

impl SpError {
    /// Wraps `self` as a rejection at `stage`
    pub fn rejected_at(self, stage: UpdateStage) -> Self {
        match self {
            already @ SpError::UpdateRejected { .. } => already,
            other => SpError::UpdateRejected {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage an update was rejected at, if this is a rejection
    pub fn stage(&self) -> Option<UpdateStage> {
        match self {
            SpError::UpdateRejected { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error, looking through `UpdateRejected`
    pub fn root(&self) -> &SpError {
        match self {
            SpError::UpdateRejected { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the error is potentially retryable
    ///
    /// Overflow is retried internally with a larger buffer; a failed store
    /// write may succeed later. Everything else is a property of the input.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            SpError::EncodeOverflow { .. } => true,
            SpError::PersistenceFailure(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self.root(), SpError::ValidationFailure(_))
    }

    /// Returns true if this is a decode error
    pub fn is_decode_error(&self) -> bool {
        matches!(self.root(), SpError::DecodeFailure(_))
    }

    /// Returns a stable error code
    pub fn error_code(&self) -> &'static str {
        match self.root() {
            SpError::InvalidArgument(_) => "OIC_SP_E_INVALID_ARGUMENT",
            SpError::EncodeOverflow { .. } => "OIC_SP_E_ENCODE_OVERFLOW",
            SpError::EncodeFailure(_) => "OIC_SP_E_ENCODE",
            SpError::DecodeFailure(_) => "OIC_SP_E_DECODE",
            SpError::ValidationFailure(e) => e.error_code(),
            SpError::PersistenceFailure(_) => "OIC_SP_E_PERSISTENCE",
            SpError::Config(_) => "OIC_SP_E_CONFIG",
            SpError::UpdateRejected { .. } => "OIC_SP_E_UPDATE_REJECTED",
        }
    }
}
