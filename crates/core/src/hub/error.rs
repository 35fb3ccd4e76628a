//! Hub error types and failure classification

use hubrelay_common::resilience::ResilienceError;
use hubrelay_domain::constants::INTERNAL_ERROR_STATUS;
use hubrelay_domain::HubRelayError;
use thiserror::Error;

/// Errors raised while talking to the hub
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    /// Non-2xx response; `message` is the body or the canonical reason.
    #[error("hub returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {message}")]
    Network { message: String, timeout: bool },

    /// A circuit breaker rejected the call before it was made.
    #[error("circuit breaker '{breaker}' is open, rejecting calls")]
    CircuitOpen { breaker: String },

    #[error("hub issued an empty token")]
    EmptyToken,

    #[error("no hub credentials configured for partition '{0}'")]
    UnknownPartition(String),

    #[error("failed to decode hub response: {0}")]
    Decode(String),

    #[error("token cache error: {0}")]
    Cache(String),

    #[error("{0}")]
    Internal(String),
}

impl HubError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into(), timeout: false }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Network { message: message.into(), timeout: true }
    }

    pub fn kind(&self) -> FailureKind {
        classify(self)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == FailureKind::Unauthorized
    }
}

impl From<ResilienceError<Self>> for HubError {
    fn from(err: ResilienceError<Self>) -> Self {
        match err {
            ResilienceError::CircuitOpen { breaker } => Self::CircuitOpen { breaker },
            ResilienceError::OperationFailed { source } => source,
        }
    }
}

impl From<HubRelayError> for HubError {
    fn from(err: HubRelayError) -> Self {
        match err {
            HubRelayError::Network(message) => Self::network(message),
            HubRelayError::Serialization(message) => Self::Decode(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<HubError> for HubRelayError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Status { status: 401, message } => Self::Auth(message),
            HubError::EmptyToken => Self::Auth(err.to_string()),
            HubError::Status { .. } | HubError::Network { .. } | HubError::CircuitOpen { .. } => {
                Self::Network(err.to_string())
            }
            HubError::UnknownPartition(_) => Self::Config(err.to_string()),
            HubError::Decode(message) => Self::Serialization(message),
            HubError::Cache(_) | HubError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Classification of a failed hub call.
///
/// Drives both retry eligibility and the status written into a terminal
/// dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// HTTP 401, or an empty token issued by the hub.
    Unauthorized,
    /// Any other 4xx.
    ClientError(u16),
    /// 5xx.
    ServerError(u16),
    /// An error carried by a status below 400.
    UnexpectedStatus(u16),
    NetworkError,
    /// Circuit breaker short-circuit.
    Rejected,
    Unclassified,
}

impl FailureKind {
    /// Whether the retry loop should try again.
    ///
    /// Client errors are terminal unless their status is listed in
    /// `additional_statuses`.
    pub fn is_retryable(self, additional_statuses: &[u16]) -> bool {
        match self {
            Self::Unauthorized
            | Self::UnexpectedStatus(_)
            | Self::ServerError(_)
            | Self::NetworkError
            | Self::Rejected => true,
            Self::ClientError(status) => additional_statuses.contains(&status),
            Self::Unclassified => false,
        }
    }

    /// Status recorded on a terminal dispatch result.
    pub const fn status_code(self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::ClientError(status)
            | Self::ServerError(status)
            | Self::UnexpectedStatus(status) => {
                status
            }
            Self::NetworkError | Self::Rejected | Self::Unclassified => INTERNAL_ERROR_STATUS,
        }
    }
}

/// Classify a hub error.
pub fn classify(error: &HubError) -> FailureKind {
    match error {
        HubError::Status { status, .. } => match *status {
            401 => FailureKind::Unauthorized,
            status if status >= 500 => FailureKind::ServerError(status),
            status if status >= 400 => FailureKind::ClientError(status),
            status => FailureKind::UnexpectedStatus(status),
        },
        HubError::EmptyToken => FailureKind::Unauthorized,
        HubError::Network { .. } => FailureKind::NetworkError,
        HubError::CircuitOpen { .. } => FailureKind::Rejected,
        HubError::UnknownPartition(_)
        | HubError::Decode(_)
        | HubError::Cache(_)
        | HubError::Internal(_) => FailureKind::Unclassified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify(&HubError::status(401, "")), FailureKind::Unauthorized);
        assert_eq!(classify(&HubError::status(400, "bad")), FailureKind::ClientError(400));
        assert_eq!(classify(&HubError::status(404, "")), FailureKind::ClientError(404));
        assert_eq!(classify(&HubError::status(503, "")), FailureKind::ServerError(503));
        assert_eq!(classify(&HubError::status(302, "")), FailureKind::UnexpectedStatus(302));
    }

    #[test]
    fn classifies_non_status_errors() {
        assert_eq!(classify(&HubError::EmptyToken), FailureKind::Unauthorized);
        assert_eq!(classify(&HubError::timeout("deadline")), FailureKind::NetworkError);
        assert_eq!(
            classify(&HubError::CircuitOpen { breaker: "primary".into() }),
            FailureKind::Rejected
        );
        assert_eq!(classify(&HubError::Decode("eof".into())), FailureKind::Unclassified);
        assert_eq!(
            classify(&HubError::UnknownPartition("123".into())),
            FailureKind::Unclassified
        );
    }

    #[test]
    fn retry_eligibility() {
        assert!(FailureKind::Unauthorized.is_retryable(&[]));
        assert!(FailureKind::ServerError(503).is_retryable(&[]));
        assert!(FailureKind::NetworkError.is_retryable(&[]));
        assert!(FailureKind::Rejected.is_retryable(&[]));
        assert!(FailureKind::UnexpectedStatus(302).is_retryable(&[]));
        assert!(!FailureKind::ClientError(400).is_retryable(&[]));
        assert!(!FailureKind::Unclassified.is_retryable(&[]));
        assert!(FailureKind::ClientError(429).is_retryable(&[429]));
    }

    #[test]
    fn terminal_status_codes() {
        assert_eq!(FailureKind::ClientError(422).status_code(), 422);
        assert_eq!(FailureKind::ServerError(502).status_code(), 502);
        assert_eq!(FailureKind::NetworkError.status_code(), 500);
        assert_eq!(FailureKind::Rejected.status_code(), 500);
        assert_eq!(FailureKind::Unclassified.status_code(), 500);
    }

    #[test]
    fn flattens_resilience_errors() {
        let open: HubError =
            ResilienceError::<HubError>::CircuitOpen { breaker: "stability".into() }.into();
        assert_eq!(open, HubError::CircuitOpen { breaker: "stability".into() });

        let failed: HubError =
            ResilienceError::OperationFailed { source: HubError::status(500, "oops") }.into();
        assert_eq!(failed, HubError::status(500, "oops"));
    }

    #[test]
    fn maps_into_domain_errors() {
        assert!(matches!(HubRelayError::from(HubError::status(401, "no")), HubRelayError::Auth(_)));
        assert!(matches!(
            HubRelayError::from(HubError::UnknownPartition("1".into())),
            HubRelayError::Config(_)
        ));
    }
}
