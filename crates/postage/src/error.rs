//! Errors of a postmark purchase.

use stampdesk_core::LabelSlot;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::cache::CacheError;
use crate::internetmarke::InternetmarkeError;
use crate::postmark::SlotPostmarks;

/// Broad failure class of a [`ResolveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request list itself is unusable.
    InvalidRequest,
    /// The operator declined the purchase.
    Cancelled,
    /// Login or token refresh failed.
    Auth,
    /// Transport, upstream status or archive problem.
    Network,
    /// Payment-level rejection by the API.
    Payment,
    /// Local filesystem problem.
    Cache,
}

/// Errors that can occur when resolving postmarks.
///
/// Everything except `CacheWrite` means nothing was written to the cache.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// More than four requests, or two requests for one slot or key.
    #[error("invalid purchase request: {0}")]
    InvalidRequest(String),

    /// The operator declined the purchase.
    #[error("purchase cancelled")]
    Cancelled,

    /// Authentication failed, also after one refresh.
    #[error("authentication failed: {0}")]
    Auth(#[source] InternetmarkeError),

    /// Network or upstream failure.
    #[error("network error: {0}")]
    Network(#[source] InternetmarkeError),

    /// The wallet cannot cover the order.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The API rejected the payment.
    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    /// The downloaded archive is unusable.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The archive holds a different number of images than positions were paid.
    #[error("archive holds {received} postmarks, expected {expected}")]
    PositionMismatch {
        expected: usize,
        received: usize,
    },

    /// Reading the cache failed.
    #[error("cache error: {0}")]
    Cache(#[source] CacheError),

    /// Some purchased postmarks could not be stored.
    ///
    /// The purchase itself succeeded; `postmarks` still carries every image.
    #[error("failed to cache {} purchased postmark(s)", failures.len())]
    CacheWrite {
        failures: Vec<(LabelSlot, CacheError)>,
        postmarks: Box<SlotPostmarks>,
    },
}

impl ResolveError {
    /// Failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Network(_) | Self::Archive(_) | Self::PositionMismatch { .. } => {
                ErrorKind::Network
            }
            Self::InsufficientFunds(_) | Self::PaymentDeclined(_) => ErrorKind::Payment,
            Self::Cache(_) | Self::CacheWrite { .. } => ErrorKind::Cache,
        }
    }

    /// Whether running the same requests again may succeed without changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Auth)
    }
}

impl From<InternetmarkeError> for ResolveError {
    fn from(err: InternetmarkeError) -> Self {
        match err {
            InternetmarkeError::AuthenticationFailed(_) | InternetmarkeError::Unauthorized => {
                Self::Auth(err)
            }
            InternetmarkeError::InsufficientFunds(message) => Self::InsufficientFunds(message),
            InternetmarkeError::PaymentDeclined(message) => Self::PaymentDeclined(message),
            InternetmarkeError::Http(_)
            | InternetmarkeError::Parse(_)
            | InternetmarkeError::RateLimited(_)
            | InternetmarkeError::UnexpectedStatus { .. }
            | InternetmarkeError::InvalidUrl(_) => Self::Network(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let auth = ResolveError::from(InternetmarkeError::Unauthorized);
        assert_eq!(auth.kind(), ErrorKind::Auth);
        assert!(auth.is_retryable());

        let network = ResolveError::from(InternetmarkeError::RateLimited(5));
        assert_eq!(network.kind(), ErrorKind::Network);
        assert!(network.is_retryable());

        let funds = ResolveError::from(InternetmarkeError::InsufficientFunds("Wallet empty".into()));
        assert_eq!(funds.to_string(), "insufficient funds: Wallet empty");
        assert!(!funds.is_retryable());

        let declined = ResolveError::from(InternetmarkeError::PaymentDeclined("nope".into()));
        assert_eq!(declined.kind(), ErrorKind::Payment);
    }

    #[test]
    fn test_mismatch_is_network_class() {
        let err = ResolveError::PositionMismatch {
            expected: 2,
            received: 1,
        };
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.to_string(), "archive holds 1 postmarks, expected 2");
    }

    #[test]
    fn test_cancel_is_final() {
        assert!(!ResolveError::Cancelled.is_retryable());
        assert!(!ResolveError::InvalidRequest("x".into()).is_retryable());
    }
}
