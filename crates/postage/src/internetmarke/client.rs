//! Internetmarke REST API client.
//!
//! Provides login, cart creation, PNG checkout and archive download over
//! HTTPS. Holds no session state: sessions are passed in by the caller.

use std::sync::Arc;

use async_trait::async_trait;
use stampdesk_core::{Address, Price, parse_address_detailed};
use tracing::{instrument, warn};
use url::Url;

use super::auth::{CheckoutSession, authenticate};
use super::types::{
    AddressPair, ApiErrorPayload, CartResponse, CheckoutPngRequest, CheckoutResponse, Position,
    WireAddress,
};
use super::{
    CheckoutApi, CheckoutOrder, CheckoutReceipt, InternetmarkeError, classify_rejection,
};
use crate::config::InternetmarkeConfig;

/// Internetmarke API client.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct InternetmarkeClient {
    inner: Arc<InternetmarkeClientInner>,
}

struct InternetmarkeClientInner {
    client: reqwest::Client,
    config: InternetmarkeConfig,
    /// Sender block printed on every postmark
    sender: WireAddress,
}

impl InternetmarkeClient {
    /// Create a new client for the configured account.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new(config: InternetmarkeConfig, sender: &Address) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            inner: Arc::new(InternetmarkeClientInner {
                client,
                config,
                sender: WireAddress::sender(sender),
            }),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.inner.config.base_url())
    }

    /// Check whether the API answers at all.
    ///
    /// Any HTTP response counts as reachable; only transport failures do not.
    #[instrument(skip(self))]
    pub async fn check_api(&self) -> bool {
        match self.inner.client.get(self.endpoint("/")).send().await {
            Ok(response) => {
                tracing::debug!(status = %response.status(), "Internetmarke API reachable");
                true
            }
            Err(e) => {
                warn!(error = %e, "Internetmarke API unreachable");
                false
            }
        }
    }

    /// Build the checkout position for one receiver block.
    fn position(&self, receiver_text: &str, product_code: u32) -> Position {
        let parsed = parse_address_detailed(receiver_text);
        if !parsed.ignored_lines.is_empty() {
            warn!(
                ignored = ?parsed.ignored_lines,
                "Receiver has lines after the country; they are not printed"
            );
        }

        Position::franking(
            product_code,
            AddressPair {
                sender: self.inner.sender.clone(),
                receiver: WireAddress::receiver(&parsed.address),
            },
        )
    }
}

/// Turn a non-success response into an error.
async fn rejection(response: reqwest::Response, payment: bool) -> InternetmarkeError {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return InternetmarkeError::RateLimited(retry_after);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    classify_rejection(status, &ApiErrorPayload::message_from(&body), payment)
}

#[async_trait]
impl CheckoutApi for InternetmarkeClient {
    async fn authenticate(&self) -> Result<CheckoutSession, InternetmarkeError> {
        authenticate(&self.inner.client, &self.inner.config).await
    }

    #[instrument(skip(self, session))]
    async fn create_order(&self, session: &CheckoutSession) -> Result<String, InternetmarkeError> {
        let response = self
            .inner
            .client
            .post(self.endpoint("/app/shoppingcart"))
            .header("Authorization", session.authorization())
            .header("Content-Length", "0")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }

        let cart: CartResponse = response.json().await?;
        tracing::debug!(order_id = %cart.shop_order_id, "Shopping cart created");
        Ok(cart.shop_order_id)
    }

    #[instrument(
        skip(self, session, order),
        fields(order_id = %order.shop_order_id, count = order.items.len())
    )]
    async fn checkout(
        &self,
        session: &CheckoutSession,
        order: &CheckoutOrder,
    ) -> Result<CheckoutReceipt, InternetmarkeError> {
        let positions = order
            .items
            .iter()
            .map(|item| self.position(&item.receiver_text, item.product_code.as_u32()))
            .collect();
        let request = CheckoutPngRequest::new(
            order.shop_order_id.clone(),
            order.total().cents(),
            positions,
        );

        let response = self
            .inner
            .client
            .post(self.endpoint("/app/shoppingcart/png"))
            .header("Authorization", session.authorization())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, true).await);
        }

        let receipt: CheckoutResponse = response.json().await?;
        Ok(CheckoutReceipt {
            link: receipt.link,
            wallet_balance: receipt.wallet_balance.map(Price::from_cents),
        })
    }

    #[instrument(skip(self))]
    async fn fetch_archive(&self, link: &str) -> Result<Vec<u8>, InternetmarkeError> {
        let url = Url::parse(link).map_err(|e| InternetmarkeError::InvalidUrl(format!("{link}: {e}")))?;

        let response = self.inner.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use stampdesk_core::parse_address;

    use super::*;

    fn client() -> InternetmarkeClient {
        let config = InternetmarkeConfig {
            api_url: Url::parse("http://127.0.0.1:9/im/v1/").unwrap(),
            username: "labels@frapp.de".to_string(),
            password: SecretString::from("pw"),
            client_id: "client".to_string(),
            client_secret: SecretString::from("secret"),
            timeout: Duration::from_secs(5),
        };
        InternetmarkeClient::new(config, &parse_address("frapp GmbH\nBachstraße 24-26\n96188 Stettfeld"))
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(
            client().endpoint("/app/shoppingcart"),
            "http://127.0.0.1:9/im/v1/app/shoppingcart"
        );
    }

    #[test]
    fn test_position_uses_sender_and_receiver() {
        let position = client().position("Max Mustermann\nHauptstr. 1\n10115 Berlin\nDeutschland\nextra", 331);
        assert_eq!(position.product_code, 331);
        assert_eq!(position.address.sender.name, "frapp GmbH");
        assert_eq!(position.address.sender.country, "DEU");
        assert_eq!(position.address.receiver.city, "Berlin");
        assert_eq!(position.address.receiver.country, "DEU");
    }

    #[tokio::test]
    async fn test_fetch_archive_rejects_bad_link() {
        let result = client().fetch_archive("not a link").await;
        assert!(matches!(result, Err(InternetmarkeError::InvalidUrl(_))));
    }
}
