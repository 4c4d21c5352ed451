//! Internetmarke authentication.
//!
//! Handles the client-credentials login that yields a bearer token for the
//! cart and checkout endpoints.

use secrecy::{ExposeSecret, SecretString};
use stampdesk_core::Price;
use tracing::instrument;

use super::InternetmarkeError;
use super::types::{ApiErrorPayload, AuthResponse};
use crate::config::InternetmarkeConfig;

/// An authenticated Internetmarke session.
///
/// Passed explicitly into every purchase and handed back afterwards so the
/// next purchase can reuse it.
#[derive(Clone)]
pub struct CheckoutSession {
    /// Bearer token for API requests.
    pub bearer_token: SecretString,
    /// Unix timestamp when the token expires.
    pub expires_at: i64,
    /// Shopping cart opened with this session, if any.
    pub order_id: Option<String>,
    /// Portokasse balance as of login (or the last checkout).
    pub wallet_balance: Price,
    /// Account the token was issued for.
    pub authenticated_user: Option<String>,
}

impl std::fmt::Debug for CheckoutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("bearer_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("order_id", &self.order_id)
            .field("wallet_balance", &self.wallet_balance)
            .field("authenticated_user", &self.authenticated_user)
            .finish()
    }
}

impl CheckoutSession {
    /// Create a session from a token and its lifetime in seconds.
    #[must_use]
    pub fn new(bearer_token: SecretString, expires_in: i64, wallet_balance: Price) -> Self {
        Self {
            bearer_token,
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            order_id: None,
            wallet_balance,
            authenticated_user: None,
        }
    }

    /// Check if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        // Consider expired if less than 60 seconds remaining
        now >= self.expires_at - 60
    }

    /// Check if the token will expire within the given number of seconds.
    #[must_use]
    pub fn expires_within(&self, seconds: i64) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - seconds
    }

    /// `Authorization` header value.
    pub(crate) fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer_token.expose_secret())
    }
}

/// Log in with the configured account and API client.
///
/// # Errors
///
/// Returns `InternetmarkeError::AuthenticationFailed` if the credentials are
/// rejected, `InternetmarkeError::Http` on network failures.
#[instrument(skip(client, config), fields(username = %config.username))]
pub async fn authenticate(
    client: &reqwest::Client,
    config: &InternetmarkeConfig,
) -> Result<CheckoutSession, InternetmarkeError> {
    let response = client
        .post(format!("{}/user", config.base_url()))
        .form(&[
            ("grant_type", "client_credentials"),
            ("username", config.username.as_str()),
            ("password", config.password.expose_secret()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret()),
        ])
        .send()
        .await?;

    let status = response.status();

    if status.is_success() {
        let auth_response: AuthResponse = response.json().await?;

        let mut session = CheckoutSession::new(
            SecretString::from(auth_response.access_token),
            auth_response.expires_in,
            Price::from_cents(auth_response.wallet_balance),
        );
        session.authenticated_user = auth_response.authenticated_user;
        Ok(session)
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = ApiErrorPayload::message_from(&body);

        Err(InternetmarkeError::AuthenticationFailed(format!(
            "HTTP {status}: {message}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: i64) -> CheckoutSession {
        CheckoutSession {
            bearer_token: SecretString::from("test"),
            expires_at,
            order_id: None,
            wallet_balance: Price::ZERO,
            authenticated_user: None,
        }
    }

    #[test]
    fn test_session_is_expired() {
        let now = chrono::Utc::now().timestamp();

        // Token that expired an hour ago
        assert!(session_expiring_at(now - 3600).is_expired());

        // Token that expires in an hour
        assert!(!session_expiring_at(now + 3600).is_expired());

        // Token that expires in 30 seconds (should be considered expired due to 60s buffer)
        assert!(session_expiring_at(now + 30).is_expired());
    }

    #[test]
    fn test_expires_within() {
        let now = chrono::Utc::now().timestamp();
        let session = session_expiring_at(now + 200);
        assert!(session.expires_within(300));
        assert!(!session.expires_within(100));
    }

    #[test]
    fn test_new_sets_expiry() {
        let session = CheckoutSession::new(SecretString::from("t"), 3600, Price::from_cents(1000));
        assert!(!session.is_expired());
        assert!(session.order_id.is_none());
        assert_eq!(session.authorization(), "Bearer t");
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = CheckoutSession::new(SecretString::from("very_secret_token"), 60, Price::ZERO);
        let debug_output = format!("{session:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("very_secret_token"));
    }
}
