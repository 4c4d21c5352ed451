//! Wire types for the Internetmarke REST API.

use serde::{Deserialize, Serialize};
use stampdesk_core::{Address, country::DOMESTIC_CODE, resolve_country};

/// Placeholder the API expects for optional address fields.
const BLANK: &str = " ";

/// Response from `POST /user`.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    /// Portokasse balance in euro cents.
    #[serde(rename = "walletBalance", default)]
    pub wallet_balance: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub external_customer_id: Option<String>,
    #[serde(default)]
    pub authenticated_user: Option<String>,
}

/// Response from `POST /app/shoppingcart`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub shop_order_id: String,
}

/// Request body of `POST /app/shoppingcart/png`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPngRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub shop_order_id: String,
    /// Sum of all position prices in cents.
    pub total: i64,
    pub create_manifest: bool,
    pub create_shipping_list: u8,
    pub dpi: &'static str,
    #[serde(rename = "optimizePNG")]
    pub optimize_png: bool,
    pub positions: Vec<Position>,
}

impl CheckoutPngRequest {
    /// Checkout of the given positions at 300 dpi with a manifest.
    #[must_use]
    pub fn new(shop_order_id: String, total: i64, positions: Vec<Position>) -> Self {
        Self {
            kind: "AppShoppingCartPNGRequest",
            shop_order_id,
            total,
            create_manifest: true,
            create_shipping_list: 0,
            dpi: "DPI300",
            optimize_png: true,
            positions,
        }
    }
}

/// One franking position in a checkout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub product_code: u32,
    #[serde(rename = "imageID")]
    pub image_id: u32,
    pub address: AddressPair,
    pub voucher_layout: &'static str,
    pub position_type: &'static str,
}

impl Position {
    /// Franking-zone position for a product.
    #[must_use]
    pub const fn franking(product_code: u32, address: AddressPair) -> Self {
        Self {
            product_code,
            image_id: 0,
            address,
            voucher_layout: "FRANKING_ZONE",
            position_type: "AppShoppingCartPosition",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddressPair {
    pub sender: WireAddress,
    pub receiver: WireAddress,
}

/// Address block as the API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAddress {
    pub name: String,
    pub additional_name: String,
    pub address_line1: String,
    pub address_line2: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
}

impl WireAddress {
    /// Receiver block: optional fields are blanked, country is resolved.
    #[must_use]
    pub fn receiver(address: &Address) -> Self {
        let country = resolve_country(&address.country);
        Self {
            name: address.name.clone(),
            additional_name: or_blank(&address.additional_name),
            address_line1: address.street.clone(),
            address_line2: or_blank(&address.street2),
            postal_code: address.postal_code.clone(),
            city: address.city.clone(),
            country: or_blank(country.as_str()),
        }
    }

    /// Sender block: like a receiver, but a missing country means domestic.
    #[must_use]
    pub fn sender(address: &Address) -> Self {
        let mut wire = Self::receiver(address);
        if address.country.trim().is_empty() {
            DOMESTIC_CODE.clone_into(&mut wire.country);
        }
        wire
    }
}

fn or_blank(value: &str) -> String {
    if value.is_empty() {
        BLANK.to_owned()
    } else {
        value.to_owned()
    }
}

/// Response from `POST /app/shoppingcart/png`.
#[derive(Debug, Deserialize)]
pub struct CheckoutResponse {
    /// Download link of the zip archive.
    pub link: String,
    /// Remaining balance in cents (spelled `walletBallance` by the API).
    #[serde(rename = "walletBallance", alias = "walletBalance", default)]
    pub wallet_balance: Option<i64>,
}

/// Error body returned by every endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiErrorPayload {
    /// Best human-readable message from an error body, falling back to the raw text.
    #[must_use]
    pub fn message_from(body: &str) -> String {
        let payload: Self = serde_json::from_str(body).unwrap_or_default();
        payload
            .description
            .or(payload.detail)
            .or(payload.title)
            .unwrap_or_else(|| body.trim().to_owned())
    }
}
