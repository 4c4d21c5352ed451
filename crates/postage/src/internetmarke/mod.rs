//! Deutsche Post Internetmarke API client.
//!
//! Buys franking postmarks as PNG images through the Internetmarke REST API.
//!
//! # Architecture
//!
//! - Client-credentials login (`/user`) → bearer token + wallet balance
//! - One shopping cart per batch (`/app/shoppingcart`)
//! - PNG checkout (`/app/shoppingcart/png`) → link to a zip archive holding
//!   one PNG per position, in position order
//!
//! The orchestrator only sees the [`CheckoutApi`] trait, so tests can swap the
//! HTTP client for an in-memory double.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::CheckoutSession;
pub use client::InternetmarkeClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use stampdesk_core::{Price, ProductCode};
use thiserror::Error;

/// Errors that can occur when interacting with the Internetmarke API.
#[derive(Debug, Error)]
pub enum InternetmarkeError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Login rejected (invalid credentials or client).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Bearer token rejected by a cart or checkout call.
    #[error("Access token rejected")]
    Unauthorized,

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The Portokasse wallet cannot cover the order.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Checkout rejected for another payment-level reason.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Any other non-success response.
    #[error("Unexpected HTTP {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body (or API error description).
        body: String,
    },

    /// The API returned an archive link that is not a valid URL.
    #[error("Invalid archive link: {0}")]
    InvalidUrl(String),
}

/// Map a rejected API response onto an error.
///
/// `message` is the API's error description (or raw body). `payment` is set
/// for checkout calls, where a client error with a message is a
/// payment-level rejection.
#[must_use]
pub fn classify_rejection(status: StatusCode, message: &str, payment: bool) -> InternetmarkeError {
    let lower = message.to_lowercase();
    let mentions_funds = ["wallet", "balance", "funds", "guthaben"]
        .iter()
        .any(|needle| lower.contains(needle));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InternetmarkeError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => InternetmarkeError::RateLimited(60),
        StatusCode::PAYMENT_REQUIRED => InternetmarkeError::InsufficientFunds(message.to_owned()),
        s if payment && s.is_client_error() && mentions_funds => {
            InternetmarkeError::InsufficientFunds(message.to_owned())
        }
        s if payment && s.is_client_error() && !message.trim().is_empty() => {
            InternetmarkeError::PaymentDeclined(message.to_owned())
        }
        s => InternetmarkeError::UnexpectedStatus {
            status: s.as_u16(),
            body: message.to_owned(),
        },
    }
}

/// One paid position in a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutItem {
    /// Receiver block as printed on the label.
    pub receiver_text: String,
    pub product_code: ProductCode,
    pub price: Price,
}

/// A batch of positions paid in a single checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOrder {
    /// Cart ID from [`CheckoutApi::create_order`].
    pub shop_order_id: String,
    /// Positions in the order the archive images must come back.
    pub items: Vec<CheckoutItem>,
}

impl CheckoutOrder {
    /// Sum of all position prices.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(|item| item.price).sum()
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    /// Download link of the zip archive.
    pub link: String,
    /// Wallet balance after the purchase, if reported.
    pub wallet_balance: Option<Price>,
}

/// The paid-postmark boundary used by the orchestrator.
#[async_trait]
pub trait CheckoutApi: Send + Sync {
    /// Log in and obtain a fresh session.
    async fn authenticate(&self) -> Result<CheckoutSession, InternetmarkeError>;

    /// Open a shopping cart, returning its `shopOrderId`.
    async fn create_order(&self, session: &CheckoutSession) -> Result<String, InternetmarkeError>;

    /// Pay for all positions of an order and return the archive link.
    async fn checkout(
        &self,
        session: &CheckoutSession,
        order: &CheckoutOrder,
    ) -> Result<CheckoutReceipt, InternetmarkeError>;

    /// Download the archive behind a checkout link.
    async fn fetch_archive(&self, link: &str) -> Result<Vec<u8>, InternetmarkeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_error() {
        let err = InternetmarkeError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_authentication_failed_error() {
        let err = InternetmarkeError::AuthenticationFailed("invalid_client".to_string());
        assert_eq!(err.to_string(), "Authentication failed: invalid_client");
    }

    #[test]
    fn test_classify_auth_statuses() {
        assert!(matches!(
            classify_rejection(StatusCode::UNAUTHORIZED, "", true),
            InternetmarkeError::Unauthorized
        ));
        assert!(matches!(
            classify_rejection(StatusCode::FORBIDDEN, "expired", false),
            InternetmarkeError::Unauthorized
        ));
    }

    #[test]
    fn test_classify_funds() {
        assert!(matches!(
            classify_rejection(StatusCode::PAYMENT_REQUIRED, "", true),
            InternetmarkeError::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_rejection(StatusCode::BAD_REQUEST, "Wallet balance too low", true),
            InternetmarkeError::InsufficientFunds(_)
        ));
    }

    #[test]
    fn test_classify_declined_only_for_checkout() {
        let declined = classify_rejection(StatusCode::BAD_REQUEST, "Invalid product code", true);
        assert_eq!(declined.to_string(), "Payment declined: Invalid product code");

        assert!(matches!(
            classify_rejection(StatusCode::BAD_REQUEST, "Invalid product code", false),
            InternetmarkeError::UnexpectedStatus { status: 400, .. }
        ));
        assert!(matches!(
            classify_rejection(StatusCode::BAD_REQUEST, "  ", true),
            InternetmarkeError::UnexpectedStatus { status: 400, .. }
        ));
    }

    #[test]
    fn test_classify_server_errors() {
        assert!(matches!(
            classify_rejection(StatusCode::TOO_MANY_REQUESTS, "", true),
            InternetmarkeError::RateLimited(_)
        ));
        assert!(matches!(
            classify_rejection(StatusCode::BAD_GATEWAY, "balance", true),
            InternetmarkeError::UnexpectedStatus { status: 502, .. }
        ));
    }

    #[test]
    fn test_order_total() {
        let item = |cents| CheckoutItem {
            receiver_text: String::new(),
            product_code: ProductCode::new(290),
            price: Price::from_cents(cents),
        };
        let order = CheckoutOrder {
            shop_order_id: "1".to_string(),
            items: vec![item(270), item(355)],
        };
        assert_eq!(order.total(), Price::from_cents(625));
    }
}
