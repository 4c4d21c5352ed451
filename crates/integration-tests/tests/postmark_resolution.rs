//! Postmark resolution against the in-memory checkout double.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stampdesk_core::LabelSlot;
use stampdesk_integration_tests::{Failure, RecordingApi, png, receivers, request};
use stampdesk_postage::internetmarke::{CheckoutOrder, CheckoutReceipt};
use stampdesk_postage::{
    AutoConfirm, CheckoutApi, CheckoutSession, ErrorKind, InternetmarkeError, PostmarkCache,
    PurchaseConfirmation, PurchaseOrchestrator, PurchaseQuote, ResolveError, SlotPostmark,
};

const BERLIN: &str = "Max Mustermann\nHauptstr. 1\n10115 Berlin\nDeutschland\n";
const STETTFELD: &str = "frapp GmbH\nBachstraße 24-26\n96188 Stettfeld\nDeutschland\n";
const HAMBURG: &str = "Erika Musterfrau\nElbchaussee 7\n22763 Hamburg\n";
const WIEN: &str = "Anna Huber\nRingstraße 3\n1010 Wien\nÖsterreich\n";

struct Refuse;

#[async_trait]
impl PurchaseConfirmation for Refuse {
    async fn confirm(&self, _quote: &PurchaseQuote) -> bool {
        false
    }
}

fn orchestrator(api: &Arc<RecordingApi>, root: &Path) -> PurchaseOrchestrator {
    PurchaseOrchestrator::new(api.clone(), PostmarkCache::new(root))
}

fn file_count(root: &Path) -> usize {
    std::fs::read_dir(root).map_or(0, Iterator::count)
}

#[tokio::test]
async fn test_one_cached_one_missing_buys_only_the_missing_one() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());

    let requests = vec![
        request(LabelSlot::TopLeft, STETTFELD),
        request(LabelSlot::TopRight, BERLIN),
    ];
    let cached = b"previously bought".to_vec();
    orchestrator.cache().write(&requests[0].key(), &cached).unwrap();

    let resolved = orchestrator
        .resolve_postmarks(&requests, None, &AutoConfirm)
        .await
        .unwrap();

    api.calls(|calls| {
        assert_eq!(calls.checkouts.len(), 1);
        assert_eq!(receivers(&calls.checkouts[0]), vec![BERLIN]);
    });
    assert_eq!(
        resolved.postmarks.get(LabelSlot::TopLeft),
        &SlotPostmark::Cached(cached)
    );
    assert_eq!(
        resolved.postmarks.get(LabelSlot::TopRight),
        &SlotPostmark::Purchased(png(BERLIN))
    );
    assert_eq!(resolved.postmarks.get(LabelSlot::BottomLeft), &SlotPostmark::NotRequested);
}

#[tokio::test]
async fn test_cached_slots_never_touch_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());

    let requests = vec![
        request(LabelSlot::TopLeft, STETTFELD),
        request(LabelSlot::BottomRight, BERLIN),
    ];
    for req in &requests {
        orchestrator.cache().write(&req.key(), b"cached").unwrap();
    }

    // Refusing would fail the call if a confirmation were requested
    let resolved = orchestrator
        .resolve_postmarks(&requests, None, &Refuse)
        .await
        .unwrap();

    assert_eq!(api.total_calls(), 0);
    assert!(resolved.session.is_none());
    assert_eq!(resolved.postmarks.purchased_count(), 0);
}

#[tokio::test]
async fn test_misses_become_cache_files_in_position_order() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());

    let requests = vec![
        request(LabelSlot::TopLeft, STETTFELD),
        request(LabelSlot::TopRight, BERLIN),
        request(LabelSlot::BottomLeft, HAMBURG),
        request(LabelSlot::BottomRight, WIEN),
    ];

    let resolved = orchestrator
        .resolve_postmarks(&requests, None, &AutoConfirm)
        .await
        .unwrap();

    assert_eq!(file_count(dir.path()), 4);
    for req in &requests {
        assert_eq!(orchestrator.cache().read(&req.key()).unwrap(), png(&req.receiver_text));
        assert_eq!(
            resolved.postmarks.get(req.slot),
            &SlotPostmark::Purchased(png(&req.receiver_text))
        );
    }
    api.calls(|calls| {
        assert_eq!(calls.logins, 1);
        assert_eq!(calls.checkouts.len(), 1);
        assert_eq!(receivers(&calls.checkouts[0]), vec![STETTFELD, BERLIN, HAMBURG, WIEN]);
    });
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());
    let requests = vec![request(LabelSlot::TopLeft, BERLIN)];

    let first = orchestrator
        .resolve_postmarks(&requests, None, &AutoConfirm)
        .await
        .unwrap();
    let calls_after_first = api.total_calls();

    let second = orchestrator
        .resolve_postmarks(&requests, first.session, &Refuse)
        .await
        .unwrap();

    assert_eq!(api.total_calls(), calls_after_first);
    assert_eq!(
        second.postmarks.get(LabelSlot::TopLeft),
        &SlotPostmark::Cached(png(BERLIN))
    );
}

#[tokio::test]
async fn test_session_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());

    let first = orchestrator
        .resolve_postmarks(&[request(LabelSlot::TopLeft, BERLIN)], None, &AutoConfirm)
        .await
        .unwrap();
    let session = first.session.unwrap();
    assert_eq!(session.wallet_balance.cents(), 5_000 - 270);

    orchestrator
        .resolve_postmarks(&[request(LabelSlot::TopLeft, HAMBURG)], Some(session), &AutoConfirm)
        .await
        .unwrap();

    api.calls(|calls| {
        assert_eq!(calls.logins, 1);
        assert_eq!(calls.checkouts.len(), 2);
    });
}

#[tokio::test]
async fn test_refusal_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());

    let result = orchestrator
        .resolve_postmarks(&[request(LabelSlot::TopLeft, BERLIN)], None, &Refuse)
        .await;

    assert!(matches!(result, Err(ResolveError::Cancelled)));
    assert_eq!(api.total_calls(), 0);
    assert_eq!(file_count(dir.path()), 0);
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_once() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::RejectTokens(1));
    let orchestrator = orchestrator(&api, dir.path());

    let resolved = orchestrator
        .resolve_postmarks(&[request(LabelSlot::TopLeft, BERLIN)], None, &AutoConfirm)
        .await
        .unwrap();

    assert_eq!(resolved.postmarks.purchased_count(), 1);
    api.calls(|calls| {
        assert_eq!(calls.logins, 2);
        assert_eq!(calls.carts, 2);
        assert_eq!(calls.checkouts.len(), 1);
    });
}

#[tokio::test]
async fn test_persistent_rejection_is_an_auth_failure() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::RejectTokens(usize::MAX));
    let orchestrator = orchestrator(&api, dir.path());

    let err = orchestrator
        .resolve_postmarks(&[request(LabelSlot::TopLeft, BERLIN)], None, &AutoConfirm)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(err.is_retryable());
    api.calls(|calls| {
        assert_eq!(calls.logins, 2);
        assert!(calls.checkouts.is_empty());
    });
    assert_eq!(file_count(dir.path()), 0);
}

#[tokio::test]
async fn test_checkout_failures_leave_no_files() {
    let cases = [
        (Failure::Login, ErrorKind::Auth),
        (Failure::Declined("Produkt nicht verfügbar".to_string()), ErrorKind::Payment),
        (Failure::InsufficientFunds, ErrorKind::Payment),
        (Failure::ArchiveUnavailable, ErrorKind::Network),
        (Failure::ShortArchive, ErrorKind::Network),
    ];

    for (failure, kind) in cases {
        let dir = tempfile::tempdir().unwrap();
        let api = RecordingApi::new(failure.clone());
        let orchestrator = orchestrator(&api, dir.path());
        let requests = vec![
            request(LabelSlot::TopLeft, BERLIN),
            request(LabelSlot::TopRight, HAMBURG),
        ];

        let err = orchestrator
            .resolve_postmarks(&requests, None, &AutoConfirm)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind, "{failure:?}");
        assert_eq!(file_count(dir.path()), 0, "{failure:?}");
    }
}

#[tokio::test]
async fn test_insufficient_funds_message_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::InsufficientFunds);
    let orchestrator = orchestrator(&api, dir.path());

    let err = orchestrator
        .resolve_postmarks(&[request(LabelSlot::TopLeft, BERLIN)], None, &AutoConfirm)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::InsufficientFunds(ref m) if m == "Wallet balance too low"));
}

#[tokio::test]
async fn test_short_archive_is_a_position_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::ShortArchive);
    let orchestrator = orchestrator(&api, dir.path());
    let requests = vec![
        request(LabelSlot::TopLeft, BERLIN),
        request(LabelSlot::TopRight, HAMBURG),
        request(LabelSlot::BottomLeft, WIEN),
    ];

    let err = orchestrator
        .resolve_postmarks(&requests, None, &AutoConfirm)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::PositionMismatch {
            expected: 3,
            received: 2
        }
    ));
}

#[tokio::test]
async fn test_unwritable_cache_still_returns_purchases() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("marks");
    std::fs::write(&root, b"a file where the cache directory should be").unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = PurchaseOrchestrator::new(api.clone(), PostmarkCache::new(&root));

    let err = orchestrator
        .resolve_postmarks(&[request(LabelSlot::BottomLeft, BERLIN)], None, &AutoConfirm)
        .await
        .unwrap_err();

    match err {
        ResolveError::CacheWrite { failures, postmarks } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, LabelSlot::BottomLeft);
            assert_eq!(
                postmarks.get(LabelSlot::BottomLeft),
                &SlotPostmark::Purchased(png(BERLIN))
            );
        }
        other => panic!("expected a cache write failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_request_lists_are_rejected_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());

    let same_slot = [request(LabelSlot::TopLeft, BERLIN), request(LabelSlot::TopLeft, HAMBURG)];
    let five: Vec<_> = [BERLIN, HAMBURG, WIEN, STETTFELD, BERLIN]
        .iter()
        .map(|receiver| request(LabelSlot::TopLeft, receiver))
        .collect();

    for requests in [&same_slot[..], &five[..]] {
        let err = orchestrator
            .resolve_postmarks(requests, None, &AutoConfirm)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn test_two_parcels_for_one_receiver() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = orchestrator(&api, dir.path());
    let requests = vec![
        request(LabelSlot::TopLeft, BERLIN),
        request(LabelSlot::TopRight, BERLIN),
    ];

    let resolved = orchestrator
        .resolve_postmarks(&requests, None, &AutoConfirm)
        .await
        .unwrap();

    api.calls(|calls| {
        assert_eq!(calls.checkouts.len(), 1);
        assert_eq!(receivers(&calls.checkouts[0]), vec![BERLIN, BERLIN]);
    });
    for slot in [LabelSlot::TopLeft, LabelSlot::TopRight] {
        assert_eq!(resolved.postmarks.get(slot), &SlotPostmark::Purchased(png(BERLIN)));
    }
    assert_eq!(file_count(dir.path()), 1);
}

#[tokio::test]
async fn test_concurrent_runs_buy_once() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let orchestrator = Arc::new(orchestrator(&api, dir.path()));
    let requests = vec![request(LabelSlot::TopLeft, BERLIN)];

    let a = tokio::spawn({
        let orchestrator = orchestrator.clone();
        let requests = requests.clone();
        async move { orchestrator.resolve_postmarks(&requests, None, &AutoConfirm).await }
    });
    let b = tokio::spawn({
        let orchestrator = orchestrator.clone();
        let requests = requests.clone();
        async move { orchestrator.resolve_postmarks(&requests, None, &AutoConfirm).await }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    api.calls(|calls| assert_eq!(calls.checkouts.len(), 1));
    assert_eq!(
        a.postmarks.get(LabelSlot::TopLeft).bytes(),
        b.postmarks.get(LabelSlot::TopLeft).bytes()
    );
    assert_eq!(a.postmarks.purchased_count() + b.postmarks.purchased_count(), 1);
}

/// Checkout API that takes its time, so concurrent purchases overlap.
struct SlowApi(Arc<RecordingApi>);

#[async_trait]
impl CheckoutApi for SlowApi {
    async fn authenticate(&self) -> Result<CheckoutSession, InternetmarkeError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.authenticate().await
    }

    async fn create_order(&self, session: &CheckoutSession) -> Result<String, InternetmarkeError> {
        self.0.create_order(session).await
    }

    async fn checkout(
        &self,
        session: &CheckoutSession,
        order: &CheckoutOrder,
    ) -> Result<CheckoutReceipt, InternetmarkeError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.0.checkout(session, order).await
    }

    async fn fetch_archive(&self, link: &str) -> Result<Vec<u8>, InternetmarkeError> {
        self.0.fetch_archive(link).await
    }
}

#[tokio::test]
async fn test_separate_orchestrators_share_one_checkout() {
    let dir = tempfile::tempdir().unwrap();
    let api = RecordingApi::new(Failure::None);
    let requests = vec![request(LabelSlot::TopLeft, BERLIN)];

    let runs: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = PurchaseOrchestrator::new(
                Arc::new(SlowApi(api.clone())),
                PostmarkCache::new(dir.path()),
            );
            let requests = requests.clone();
            tokio::spawn(async move {
                orchestrator.resolve_postmarks(&requests, None, &AutoConfirm).await
            })
        })
        .collect();

    let mut purchased = 0;
    for run in runs {
        let resolved = run.await.unwrap().unwrap();
        assert_eq!(
            resolved.postmarks.get(LabelSlot::TopLeft).bytes(),
            Some(png(BERLIN).as_slice())
        );
        purchased += resolved.postmarks.purchased_count();
    }

    assert_eq!(purchased, 1);
    api.calls(|calls| assert_eq!(calls.checkouts.len(), 1));
}
