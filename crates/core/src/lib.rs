//! stampdesk core - Shared types library.
//!
//! This crate provides the types used across all stampdesk components:
//! - `postage` - Internetmarke checkout client, postmark cache and purchase orchestration
//! - `cli` - Operator command-line tool for address checks and postmark purchases
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no file system
//! access, no HTTP clients. This keeps it lightweight and allows it to be used anywhere,
//! including from the label layout code that only needs parsed addresses.
//!
//! # Modules
//!
//! - [`types`] - Addresses, countries, label slots, prices, products and purchase keys

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
