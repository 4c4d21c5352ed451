//! Postmark resolution for a sheet of labels.
//!
//! Serves cached postmarks straight from disk and buys the missing ones in a
//! single confirmed checkout:
//!
//! 1. Partition the requests into cache hits and misses
//! 2. No misses: done, without network access or confirmation
//! 3. Ask for confirmation of the total cost, refusal ends the call untouched
//! 4. Log in (or reuse the session), open a cart, pay for all misses at once
//! 5. Download and unpack the archive, image *i* belongs to miss *i*
//! 6. Store each image under its key, then assemble the per-slot result
//!
//! Only one checkout runs at a time in the whole process, whichever
//! orchestrator starts it.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use stampdesk_core::{
    Address, LabelSlot, Price, Product, ProductCode, PurchaseKey, PurchaseRequest,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::archive::unpack_postmarks;
use crate::cache::{CacheError, PostmarkCache};
use crate::error::ResolveError;
use crate::internetmarke::{
    CheckoutApi, CheckoutItem, CheckoutOrder, CheckoutReceipt, CheckoutSession,
    InternetmarkeError,
};
use crate::postmark::{SlotPostmark, SlotPostmarks};

/// One line of a [`PurchaseQuote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteItem {
    pub slot: LabelSlot,
    pub receiver: Address,
    pub product_code: ProductCode,
    pub price: Price,
}

/// What a purchase is about to cost, shown to the operator before paying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseQuote {
    pub items: Vec<QuoteItem>,
    pub total: Price,
}

impl PurchaseQuote {
    fn for_requests(requests: &[&PurchaseRequest]) -> Self {
        let items: Vec<QuoteItem> = requests
            .iter()
            .map(|request| QuoteItem {
                slot: request.slot,
                receiver: request.receiver(),
                product_code: request.product_code,
                price: request.price,
            })
            .collect();
        let total = items.iter().map(|item| item.price).sum();
        Self { items, total }
    }

    /// Multi-line, human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            let product = Product::find(item.product_code)
                .map_or_else(|_| item.product_code.to_string(), |p| p.name.to_owned());
            let receiver = item.receiver.to_text().replace('\n', ", ");
            let _ = writeln!(
                out,
                "{}: {receiver} | {product} | {}",
                item.slot, item.price
            );
        }
        let _ = write!(out, "Total: {} for {} postmark(s)", self.total, self.items.len());
        out
    }
}

/// Operator approval of a paid purchase.
#[async_trait]
pub trait PurchaseConfirmation: Send + Sync {
    /// Return `true` to pay for the quoted postmarks.
    async fn confirm(&self, quote: &PurchaseQuote) -> bool;
}

/// Approves every purchase. For unattended use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl PurchaseConfirmation for AutoConfirm {
    async fn confirm(&self, _quote: &PurchaseQuote) -> bool {
        true
    }
}

/// Successful resolution.
#[derive(Debug)]
pub struct Resolved {
    /// Postmarks by slot.
    pub postmarks: SlotPostmarks,
    /// Session to pass into the next call.
    pub session: Option<CheckoutSession>,
}

/// Held for the whole paid part of a call, across all orchestrators.
static CHECKOUT_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Resolves postmarks from the cache and the checkout API.
pub struct PurchaseOrchestrator {
    api: Arc<dyn CheckoutApi>,
    cache: PostmarkCache,
}

impl PurchaseOrchestrator {
    #[must_use]
    pub fn new(api: Arc<dyn CheckoutApi>, cache: PostmarkCache) -> Self {
        Self { api, cache }
    }

    /// The cache this orchestrator reads and fills.
    #[must_use]
    pub const fn cache(&self) -> &PostmarkCache {
        &self.cache
    }

    /// Resolve a postmark for every requested slot.
    ///
    /// Cached postmarks are returned without network access or confirmation.
    /// All misses are bought in one checkout after `confirmation` approves
    /// the quote. Slots without a request come back as
    /// [`SlotPostmark::NotRequested`].
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for more than four requests or a slot requested twice
    /// - `Cancelled` if the operator declines
    /// - `Auth`, `Network`, `InsufficientFunds`, `PaymentDeclined`,
    ///   `Archive`, `PositionMismatch` if the purchase fails; nothing is cached
    /// - `Cache` if an existing entry cannot be read
    /// - `CacheWrite` if purchased postmarks could not be stored
    pub async fn resolve_postmarks(
        &self,
        requests: &[PurchaseRequest],
        session: Option<CheckoutSession>,
        confirmation: &dyn PurchaseConfirmation,
    ) -> Result<Resolved, ResolveError> {
        let mut session = session;
        let postmarks = self
            .resolve_with_session(requests, &mut session, confirmation)
            .await?;
        Ok(Resolved { postmarks, session })
    }

    /// Like [`Self::resolve_postmarks`], but keeps the session in `session`.
    ///
    /// A session that was used for a checkout is left in place even when the
    /// call fails afterwards (declined payment, broken archive), so the next
    /// call does not have to log in again. A session the API rejected is
    /// removed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::resolve_postmarks`].
    #[instrument(skip_all, fields(count = requests.len()))]
    pub async fn resolve_with_session(
        &self,
        requests: &[PurchaseRequest],
        session: &mut Option<CheckoutSession>,
        confirmation: &dyn PurchaseConfirmation,
    ) -> Result<SlotPostmarks, ResolveError> {
        let keyed = validate(requests)?;
        let mut postmarks = SlotPostmarks::default();

        let missing = self.fill_from_cache(&keyed, &mut postmarks)?;
        if missing.is_empty() {
            info!("All postmarks cached");
            return Ok(postmarks);
        }

        let quote = PurchaseQuote::for_requests(
            &missing.iter().map(|(request, _)| *request).collect::<Vec<_>>(),
        );
        if !confirmation.confirm(&quote).await {
            info!(missing = missing.len(), "Purchase declined");
            return Err(ResolveError::Cancelled);
        }

        let _guard = CHECKOUT_LOCK.lock().await;

        // A checkout that finished while we waited may have bought some of these
        let missing = self.fill_from_cache(&missing, &mut postmarks)?;
        if missing.is_empty() {
            info!("Postmarks cached by a concurrent purchase");
            return Ok(postmarks);
        }

        let mut current = match session.take() {
            Some(session) if !session.is_expired() => session,
            _ => self.api.authenticate().await?,
        };

        let items: Vec<CheckoutItem> = missing
            .iter()
            .map(|(request, _)| CheckoutItem {
                receiver_text: request.receiver_text.clone(),
                product_code: request.product_code,
                price: request.price,
            })
            .collect();
        let receipt = self.checkout_with_reauth(&mut current, items).await;
        let order_id = current.order_id.clone();
        if !matches!(receipt, Err(ResolveError::Auth(_))) {
            *session = Some(current);
        }
        let receipt = receipt?;

        let archive = self
            .api
            .fetch_archive(&receipt.link)
            .await
            .map_err(ResolveError::Network)?;
        let images = unpack_postmarks(&archive)?;
        if images.len() != missing.len() {
            return Err(ResolveError::PositionMismatch {
                expected: missing.len(),
                received: images.len(),
            });
        }

        let mut failures: Vec<(LabelSlot, CacheError)> = Vec::new();
        for ((request, key), image) in missing.iter().zip(images) {
            if let Err(e) = self.cache.write(key, &image) {
                warn!(slot = %request.slot, key = %key, error = %e, "Failed to cache postmark");
                failures.push((request.slot, e));
            }
            postmarks.set(request.slot, SlotPostmark::Purchased(image));
        }

        info!(
            order_id = order_id.as_deref().unwrap_or_default(),
            count = missing.len(),
            "Postmarks purchased"
        );

        if failures.is_empty() {
            Ok(postmarks)
        } else {
            Err(ResolveError::CacheWrite {
                failures,
                postmarks: Box::new(postmarks),
            })
        }
    }

    /// Put cache hits into `postmarks` and return the misses.
    fn fill_from_cache<'a>(
        &self,
        keyed: &[(&'a PurchaseRequest, PurchaseKey)],
        postmarks: &mut SlotPostmarks,
    ) -> Result<Vec<(&'a PurchaseRequest, PurchaseKey)>, ResolveError> {
        let mut missing = Vec::new();
        for (request, key) in keyed {
            match self.cache.read(key) {
                Ok(bytes) => {
                    tracing::debug!(slot = %request.slot, key = %key, "Postmark cache hit");
                    postmarks.set(request.slot, SlotPostmark::Cached(bytes));
                }
                Err(CacheError::NotFound(_)) => missing.push((*request, key.clone())),
                Err(e) => return Err(ResolveError::Cache(e)),
            }
        }
        Ok(missing)
    }

    /// Open a cart and pay, logging in again once if the token is rejected.
    async fn checkout_with_reauth(
        &self,
        session: &mut CheckoutSession,
        items: Vec<CheckoutItem>,
    ) -> Result<CheckoutReceipt, ResolveError> {
        match self.checkout(session, items.clone()).await {
            Err(InternetmarkeError::Unauthorized) => {
                warn!("Session rejected, logging in again");
                *session = self.api.authenticate().await?;
                Ok(self.checkout(session, items).await?)
            }
            result => Ok(result?),
        }
    }

    async fn checkout(
        &self,
        session: &mut CheckoutSession,
        items: Vec<CheckoutItem>,
    ) -> Result<CheckoutReceipt, InternetmarkeError> {
        let shop_order_id = self.api.create_order(session).await?;
        session.order_id = Some(shop_order_id.clone());

        let order = CheckoutOrder {
            shop_order_id,
            items,
        };
        let receipt = self.api.checkout(session, &order).await?;
        if let Some(balance) = receipt.wallet_balance {
            session.wallet_balance = balance;
        }
        Ok(receipt)
    }
}

/// Reject unusable request lists and compute each request's key.
fn validate(
    requests: &[PurchaseRequest],
) -> Result<Vec<(&PurchaseRequest, PurchaseKey)>, ResolveError> {
    if requests.len() > LabelSlot::COUNT {
        return Err(ResolveError::InvalidRequest(format!(
            "at most {} postmarks per sheet, got {}",
            LabelSlot::COUNT,
            requests.len()
        )));
    }

    let mut slots = HashSet::new();
    let mut keyed = Vec::with_capacity(requests.len());
    for request in requests {
        if !slots.insert(request.slot) {
            return Err(ResolveError::InvalidRequest(format!(
                "slot {} requested twice",
                request.slot
            )));
        }
        keyed.push((request, request.key()));
    }
    Ok(keyed)
}
