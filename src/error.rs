/// Unified error types for the identity client
use serde::Serialize;
use thiserror::Error;

/// Main error type for document, network and ledger operations
#[derive(Error, Debug)]
pub enum DidError {
    /// Key type is not one of the supported signature schemes
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Network name failed length or charset validation
    #[error("Invalid network name: {0}")]
    InvalidNetworkName(String),

    /// Network name is not a known alias (strict mode only)
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// Malformed DID string
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    /// Malformed node URL
    #[error("Invalid node URL: {0}")]
    InvalidNodeUrl(String),

    /// Generic input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed key material or signing failure
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Document already carries a signature for this version
    #[error("Document {0} is already signed; create a new version to change it")]
    AlreadySigned(String),

    /// Transient node error (timeouts, connection failures, 5xx)
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// Confirmation was not observed within the attempt budget
    #[error("Message {message_id} not confirmed after {attempts} attempts")]
    PublishTimeout { message_id: String, attempts: u32 },

    /// Transport failures persisted past the retry budget
    #[error("Node unreachable during {operation} for {subject} after {attempts} attempts: {message}")]
    NodeUnreachable {
        subject: String,
        operation: String,
        attempts: u32,
        message: String,
    },

    /// Local proof-of-work search ran out of time
    #[error("Proof-of-work for index {index} not found within {timeout_ms}ms (target {target} bits)")]
    ProofOfWorkTimeout {
        index: String,
        timeout_ms: u64,
        target: u32,
    },

    /// Node rejected the payload. `subject` is the DID or message id once known.
    #[error("Message rejected by node{}: {reason}", subject_suffix(.subject))]
    RejectedMessage {
        subject: Option<String>,
        reason: String,
    },

    /// Signature or key binding does not verify
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// No valid document exists for the DID
    #[error("Not found: {0}")]
    NotFound(String),

    /// Multiple equally-ranked updates and no policy to pick one
    #[error("Ambiguous resolution for {did}: {candidates} competing updates")]
    ResolutionAmbiguous { did: String, candidates: usize },

    /// DID belongs to a different network than the client profile
    #[error("Network mismatch for {did}: client is on '{expected}', DID is on '{found}'")]
    NetworkMismatch {
        did: String,
        expected: String,
        found: String,
    },

    /// Operation stopped by an external cancel signal
    #[error("Operation cancelled{}", pending_suffix(.message_id))]
    Cancelled { message_id: Option<String> },

    /// JSON encoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invariant violations (programmer error)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad classes used to decide retry and reporting behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidInput,
    TransientNetwork,
    ProtocolViolation,
    Resolution,
    Cancelled,
    Internal,
}

impl DidError {
    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            DidError::UnsupportedKeyType(_)
            | DidError::InvalidNetworkName(_)
            | DidError::UnknownNetwork(_)
            | DidError::InvalidDid(_)
            | DidError::InvalidNodeUrl(_)
            | DidError::Validation(_)
            | DidError::SigningError(_)
            | DidError::AlreadySigned(_) => ErrorCategory::InvalidInput,
            DidError::Transport { .. }
            | DidError::PublishTimeout { .. }
            | DidError::NodeUnreachable { .. }
            | DidError::ProofOfWorkTimeout { .. } => ErrorCategory::TransientNetwork,
            DidError::RejectedMessage { .. } | DidError::VerificationFailed(_) => {
                ErrorCategory::ProtocolViolation
            }
            DidError::NotFound(_)
            | DidError::ResolutionAmbiguous { .. }
            | DidError::NetworkMismatch { .. } => ErrorCategory::Resolution,
            DidError::Cancelled { .. } => ErrorCategory::Cancelled,
            DidError::Serialization(_) | DidError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Only raw transport errors are retried; exhausted budgets are final
    pub fn is_retryable(&self) -> bool {
        matches!(self, DidError::Transport { .. })
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DidError::UnsupportedKeyType(_) => "unsupported_key_type",
            DidError::InvalidNetworkName(_) => "invalid_network_name",
            DidError::UnknownNetwork(_) => "unknown_network",
            DidError::InvalidDid(_) => "invalid_did",
            DidError::InvalidNodeUrl(_) => "invalid_node_url",
            DidError::Validation(_) => "validation",
            DidError::SigningError(_) => "signing",
            DidError::AlreadySigned(_) => "already_signed",
            DidError::Transport { .. } => "transport",
            DidError::PublishTimeout { .. } => "publish_timeout",
            DidError::NodeUnreachable { .. } => "node_unreachable",
            DidError::ProofOfWorkTimeout { .. } => "pow_timeout",
            DidError::RejectedMessage { .. } => "rejected_message",
            DidError::VerificationFailed(_) => "verification_failed",
            DidError::NotFound(_) => "not_found",
            DidError::ResolutionAmbiguous { .. } => "resolution_ambiguous",
            DidError::NetworkMismatch { .. } => "network_mismatch",
            DidError::Cancelled { .. } => "cancelled",
            DidError::Serialization(_) => "serialization",
            DidError::Internal(_) => "internal",
        }
    }

    pub(crate) fn transport(operation: &str, message: impl ToString) -> Self {
        DidError::Transport {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Node rejection not yet tied to a DID or message
    pub fn rejected(reason: impl ToString) -> Self {
        DidError::RejectedMessage {
            subject: None,
            reason: reason.to_string(),
        }
    }

    /// Attach the DID or message id to a rejection that lacks one
    pub(crate) fn with_subject(self, subject: &str) -> Self {
        match self {
            DidError::RejectedMessage {
                subject: None,
                reason,
            } => DidError::RejectedMessage {
                subject: Some(subject.to_string()),
                reason,
            },
            other => other,
        }
    }
}

fn subject_suffix(subject: &Option<String>) -> String {
    match subject {
        Some(subject) => format!(" for {}", subject),
        None => String::new(),
    }
}

fn pending_suffix(message_id: &Option<String>) -> String {
    match message_id {
        Some(id) => format!(" (message {} may still confirm)", id),
        None => String::new(),
    }
}

/// Result type alias for identity operations
pub type DidResult<T> = Result<T, DidError>;
