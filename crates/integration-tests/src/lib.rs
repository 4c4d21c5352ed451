//! Integration tests for stampdesk.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p stampdesk-integration-tests
//! ```
//!
//! No credentials or network access are needed: the checkout boundary is
//! replaced by [`RecordingApi`] (in-memory) or [`MockInternetmarke`] (an
//! in-process HTTP server speaking the Internetmarke wire format).
//!
//! # Test Categories
//!
//! - `address_parsing` - Address blocks, round trips, purchase keys
//! - `postmark_resolution` - Cache/purchase orchestration against the in-memory double
//! - `internetmarke_http` - The real HTTP client against the mock server
//! - `postmark_jobs` - Background jobs and their update channel

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::NaiveDate;
use secrecy::SecretString;
use serde_json::{Value, json};
use stampdesk_core::{LabelSlot, Price, Product, ProductCode, PurchaseRequest};
use stampdesk_postage::internetmarke::{CheckoutItem, CheckoutOrder, CheckoutReceipt};
use stampdesk_postage::{CheckoutApi, CheckoutSession, InternetmarkeConfig, InternetmarkeError};
use zip::write::SimpleFileOptions;

/// Sender block used by every test.
pub const SENDER: &str = "frapp GmbH\nBachstraße 24-26\n96188 Stettfeld\nDeutschland\n";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

// =============================================================================
// Fixtures
// =============================================================================

/// A minimal "PNG": the signature followed by a marker.
#[must_use]
pub fn png(marker: &str) -> Vec<u8> {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.extend_from_slice(marker.as_bytes());
    bytes
}

/// Zip archive with the given entries, in order.
#[must_use]
pub fn zip_archive(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Archive as the API would deliver it for these receivers: one PNG per
/// position plus a manifest.
#[must_use]
pub fn archive_for(receivers: &[String]) -> Vec<u8> {
    let mut entries: Vec<(String, Vec<u8>)> = receivers
        .iter()
        .enumerate()
        .map(|(i, receiver)| (format!("{i}.png"), png(receiver)))
        .collect();
    entries.push(("manifest.pdf".to_string(), b"%PDF-1.4".to_vec()));
    zip_archive(&entries)
}

/// The purchase date used throughout the tests.
#[must_use]
pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 5).unwrap()
}

/// A "Warensendung" request for a slot.
#[must_use]
pub fn request(slot: LabelSlot, receiver: &str) -> PurchaseRequest {
    PurchaseRequest::for_product(
        slot,
        receiver,
        &Product::find(ProductCode::new(290)).unwrap(),
        test_date(),
    )
}

// =============================================================================
// In-memory checkout double
// =============================================================================

/// How [`RecordingApi`] misbehaves.
#[derive(Debug, Clone, Default)]
pub enum Failure {
    /// Everything succeeds.
    #[default]
    None,
    /// Cart creation rejects the first N tokens.
    RejectTokens(usize),
    /// Login fails.
    Login,
    /// Checkout rejects the payment.
    Declined(String),
    /// Checkout fails with insufficient funds.
    InsufficientFunds,
    /// The archive download fails.
    ArchiveUnavailable,
    /// The archive lacks the last image.
    ShortArchive,
}

/// What [`RecordingApi`] has been asked to do.
#[derive(Debug, Default)]
pub struct Calls {
    pub logins: usize,
    pub carts: usize,
    pub checkouts: Vec<CheckoutOrder>,
    pub archive_fetches: usize,
}

/// Checkout double that records calls and sells one PNG per position.
#[derive(Debug, Default)]
pub struct RecordingApi {
    failure: Failure,
    calls: Mutex<Calls>,
}

impl RecordingApi {
    #[must_use]
    pub fn new(failure: Failure) -> Arc<Self> {
        Arc::new(Self {
            failure,
            calls: Mutex::default(),
        })
    }

    /// Run `f` on the recorded calls.
    pub fn calls<T>(&self, f: impl FnOnce(&Calls) -> T) -> T {
        f(&self.calls.lock().unwrap())
    }

    /// Total number of API calls of any kind.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls(|c| c.logins + c.carts + c.checkouts.len() + c.archive_fetches)
    }
}

#[async_trait]
impl CheckoutApi for RecordingApi {
    async fn authenticate(&self) -> Result<CheckoutSession, InternetmarkeError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.logins += 1;
            calls.logins
        };
        if matches!(self.failure, Failure::Login) {
            return Err(InternetmarkeError::AuthenticationFailed("invalid_client".to_string()));
        }
        let mut session =
            CheckoutSession::new(SecretString::from(format!("token-{n}")), 3600, Price::from_cents(5_000));
        session.authenticated_user = Some("labels@frapp.de".to_string());
        Ok(session)
    }

    async fn create_order(&self, session: &CheckoutSession) -> Result<String, InternetmarkeError> {
        use secrecy::ExposeSecret;

        let carts = {
            let mut calls = self.calls.lock().unwrap();
            calls.carts += 1;
            calls.carts
        };
        if let Failure::RejectTokens(n) = self.failure {
            let token_number: usize = session
                .bearer_token
                .expose_secret()
                .trim_start_matches("token-")
                .parse()
                .unwrap_or(0);
            if token_number <= n {
                return Err(InternetmarkeError::Unauthorized);
            }
        }
        Ok(format!("order-{carts}"))
    }

    async fn checkout(
        &self,
        _session: &CheckoutSession,
        order: &CheckoutOrder,
    ) -> Result<CheckoutReceipt, InternetmarkeError> {
        self.calls.lock().unwrap().checkouts.push(order.clone());
        match &self.failure {
            Failure::Declined(message) => Err(InternetmarkeError::PaymentDeclined(message.clone())),
            Failure::InsufficientFunds => Err(InternetmarkeError::InsufficientFunds(
                "Wallet balance too low".to_string(),
            )),
            _ => Ok(CheckoutReceipt {
                link: format!("https://internetmarke.invalid/{}.zip", order.shop_order_id),
                wallet_balance: Some(Price::from_cents(5_000 - order.total().cents())),
            }),
        }
    }

    async fn fetch_archive(&self, _link: &str) -> Result<Vec<u8>, InternetmarkeError> {
        let mut receivers: Vec<String> = {
            let mut calls = self.calls.lock().unwrap();
            calls.archive_fetches += 1;
            calls
                .checkouts
                .last()
                .map(|order| order.items.iter().map(|i| i.receiver_text.clone()).collect())
                .unwrap_or_default()
        };
        match self.failure {
            Failure::ArchiveUnavailable => Err(InternetmarkeError::UnexpectedStatus {
                status: 404,
                body: "Not Found".to_string(),
            }),
            Failure::ShortArchive => {
                receivers.pop();
                Ok(archive_for(&receivers))
            }
            _ => Ok(archive_for(&receivers)),
        }
    }
}

/// Receiver texts of a checkout, in position order.
#[must_use]
pub fn receivers(order: &CheckoutOrder) -> Vec<&str> {
    order.items.iter().map(|item: &CheckoutItem| item.receiver_text.as_str()).collect()
}

// =============================================================================
// HTTP mock of the Internetmarke API
// =============================================================================

/// Requests received by [`MockInternetmarke`].
#[derive(Debug, Default)]
pub struct Received {
    pub logins: Vec<HashMap<String, String>>,
    pub carts: Vec<Option<String>>,
    pub checkouts: Vec<Value>,
    pub archive_fetches: usize,
}

/// Scripted responses of [`MockInternetmarke`].
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Status and body returned by `/user` instead of a token.
    pub login_error: Option<(u16, Value)>,
    /// Status and body returned by the PNG checkout instead of a link.
    pub checkout_error: Option<(u16, Value)>,
}

#[derive(Clone)]
struct MockState {
    base: String,
    script: Script,
    received: Arc<Mutex<Received>>,
}

/// In-process HTTP server speaking the Internetmarke wire format.
pub struct MockInternetmarke {
    addr: SocketAddr,
    received: Arc<Mutex<Received>>,
}

impl MockInternetmarke {
    /// Start the server on an ephemeral port.
    pub async fn start(script: Script) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Received::default()));

        let state = MockState {
            base: format!("http://{addr}/im/v1"),
            script,
            received: received.clone(),
        };
        let app = Router::new()
            .route("/im/v1/", get(|| async { Json(json!({"version": "1.0"})) }))
            .route("/im/v1/user", post(user))
            .route("/im/v1/app/shoppingcart", post(shopping_cart))
            .route("/im/v1/app/shoppingcart/png", post(checkout_png))
            .route("/im/v1/download/marks.zip", get(download))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, received }
    }

    /// Client configuration pointing at this server.
    #[must_use]
    pub fn config(&self) -> InternetmarkeConfig {
        InternetmarkeConfig {
            api_url: format!("http://{}/im/v1", self.addr).parse().unwrap(),
            username: "labels@frapp.de".to_string(),
            password: SecretString::from("portokasse-password"),
            client_id: "client-id".to_string(),
            client_secret: SecretString::from("client-secret"),
            timeout: Duration::from_secs(5),
        }
    }

    /// Run `f` on the received requests.
    pub fn received<T>(&self, f: impl FnOnce(&Received) -> T) -> T {
        f(&self.received.lock().unwrap())
    }
}

fn error_response(status: u16, body: Value) -> Response {
    (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
}

async fn user(State(state): State<MockState>, Form(form): Form<HashMap<String, String>>) -> Response {
    state.received.lock().unwrap().logins.push(form);
    if let Some((status, body)) = state.script.login_error {
        return error_response(status, body);
    }
    Json(json!({
        "access_token": "mock-token",
        "walletBalance": 12_345,
        "token_type": "BearerToken",
        "expires_in": 14_399,
        "issued_at": "Fri, 05 Sep 2025 10:00:00 GMT",
        "external_customer_id": "4711",
        "authenticated_user": "labels@frapp.de"
    }))
    .into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn shopping_cart(State(state): State<MockState>, headers: HeaderMap) -> Response {
    let token = bearer(&headers);
    state.received.lock().unwrap().carts.push(token.clone());
    if token.as_deref() != Some("Bearer mock-token") {
        return error_response(401, json!({"title": "Unauthorized"}));
    }
    Json(json!({"shopOrderId": "987654"})).into_response()
}

async fn checkout_png(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let total = body["total"].as_i64().unwrap_or_default();
    state.received.lock().unwrap().checkouts.push(body);

    if bearer(&headers).as_deref() != Some("Bearer mock-token") {
        return error_response(401, json!({"title": "Unauthorized"}));
    }
    if let Some((status, body)) = state.script.checkout_error {
        return error_response(status, body);
    }
    Json(json!({
        "link": format!("{}/download/marks.zip", state.base),
        "walletBallance": 12_345 - total
    }))
    .into_response()
}

async fn download(State(state): State<MockState>) -> Response {
    let receivers: Vec<String> = {
        let mut received = state.received.lock().unwrap();
        received.archive_fetches += 1;
        received
            .checkouts
            .last()
            .and_then(|body| body["positions"].as_array())
            .map(|positions| {
                positions
                    .iter()
                    .map(|p| p["address"]["receiver"]["name"].as_str().unwrap_or_default().to_owned())
                    .collect()
            })
            .unwrap_or_default()
    };
    archive_for(&receivers).into_response()
}
