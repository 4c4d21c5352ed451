//! Postmark purchase requests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::address::{Address, parse_address};
use super::price::Price;
use super::product::{Product, ProductCode};
use super::purchase_key::{PurchaseKey, compute_purchase_key};
use super::slot::LabelSlot;

/// A label slot the operator marked for a paid stamp.
///
/// Lives for one print action only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// Where the label sits on the sheet.
    pub slot: LabelSlot,
    /// Receiver block exactly as printed on the label.
    pub receiver_text: String,
    pub product_code: ProductCode,
    pub price: Price,
    pub purchase_date: NaiveDate,
}

impl PurchaseRequest {
    /// Build a request for a catalog product, taking the price from the catalog.
    #[must_use]
    pub fn for_product(
        slot: LabelSlot,
        receiver_text: impl Into<String>,
        product: &Product,
        purchase_date: NaiveDate,
    ) -> Self {
        Self {
            slot,
            receiver_text: receiver_text.into(),
            product_code: product.code,
            price: product.price,
            purchase_date,
        }
    }

    /// Cache key of the postmark this request asks for.
    #[must_use]
    pub fn key(&self) -> PurchaseKey {
        compute_purchase_key(&self.receiver_text, self.product_code, self.purchase_date)
    }

    /// Structured receiver address.
    #[must_use]
    pub fn receiver(&self) -> Address {
        parse_address(&self.receiver_text)
    }
}
