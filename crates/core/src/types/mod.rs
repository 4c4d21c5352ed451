//! Core types for stampdesk.
//!
//! This module provides type-safe wrappers for the label and postage domain.

pub mod address;
pub mod country;
pub mod price;
pub mod product;
pub mod purchase;
pub mod purchase_key;
pub mod slot;

pub use address::{Address, AddressRecord, ParsedAddress, parse_address, parse_address_detailed};
pub use country::{CountryCode, resolve_country};
pub use price::Price;
pub use product::{Product, ProductCode, ProductError};
pub use purchase::PurchaseRequest;
pub use purchase_key::{PurchaseKey, PurchaseKeyError, compute_purchase_key};
pub use slot::{LabelSlot, SlotError};
