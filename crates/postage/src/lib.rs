//! stampdesk postage library.
//!
//! Resolves franking postmarks for a sheet of up to four labels:
//! - [`cache`] - content-addressed `<key>.png` store with atomic writes
//! - [`internetmarke`] - Deutsche Post Internetmarke API client
//! - [`orchestrator`] - cache lookup, confirmed single-batch purchase, cache fill
//! - [`jobs`] - background execution reporting over a channel
//!
//! # Security
//!
//! This crate spends real money: every checkout is charged to the configured
//! Portokasse wallet. Purchases only happen after a [`PurchaseConfirmation`]
//! approves the quoted total.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod internetmarke;
pub mod jobs;
pub mod orchestrator;
pub mod postmark;

pub use cache::{CacheError, PostmarkCache, WriteOutcome};
pub use config::{ConfigError, InternetmarkeConfig, PostageConfig};
pub use error::{ErrorKind, ResolveError};
pub use internetmarke::{CheckoutApi, CheckoutSession, InternetmarkeClient, InternetmarkeError};
pub use jobs::{JobId, JobStatus, JobUpdate, PostmarkJobs};
pub use orchestrator::{AutoConfirm, PurchaseConfirmation, PurchaseOrchestrator, PurchaseQuote, Resolved};
pub use postmark::{SlotPostmark, SlotPostmarks};
pub use stampdesk_core::{compute_purchase_key, parse_address};

use std::path::Path;

use stampdesk_core::PurchaseKey;

/// Whether a postmark for `key` is cached under `root`.
#[must_use]
pub fn cache_has_postmark(root: &Path, key: &PurchaseKey) -> bool {
    PostmarkCache::new(root).exists(key)
}
