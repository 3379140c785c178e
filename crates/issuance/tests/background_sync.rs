use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use einvoice_fiscal::{AccessKey, ReceiptStatus};
use einvoice_infra::repo::ReceiptRepository;
use einvoice_issuance::testing::{self, Harness, connection_refused};
use einvoice_issuance::{Reconciler, ReconcilerConfig};

const PASSWORD: &str = "clave-firma";

async fn status(h: &Harness, key: &AccessKey) -> ReceiptStatus {
    h.store.get_by_access_key(key).await.unwrap().unwrap().status
}

#[tokio::test]
async fn sweep_drives_every_pending_receipt_and_survives_failures() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let service = h.service();

    h.authority.push_reception(Err(connection_refused()));
    let offline = h.seed_income(None);
    let offline_key = service
        .issue_invoice(offline.id, PASSWORD)
        .await
        .unwrap_err()
        .access_key()
        .cloned()
        .unwrap();

    h.authority.push_authorization(Ok(testing::no_decision()));
    let slow = h.seed_income(None);
    let slow_key = service.issue_invoice(slow.id, PASSWORD).await.unwrap().access_key;

    h.authority
        .push_reception(Ok(testing::returned("35", "ARCHIVO NO CUMPLE ESTRUCTURA XML")));
    let returned = h.seed_income(None);
    let returned_key = service
        .issue_invoice(returned.id, PASSWORD)
        .await
        .unwrap_err()
        .access_key()
        .cloned()
        .unwrap();

    // the offline receipt fails again; the sweep must still reach the next one
    h.authority.push_reception(Err(connection_refused()));
    let calls_before = h.authority.calls().len();

    let authorized = service.process_background_sync(None).await.unwrap();

    assert_eq!(authorized, 1);
    // returned receipts are terminal and never re-sent
    assert_eq!(h.authority.calls().len(), calls_before + 2);

    assert_eq!(status(&h, &offline_key).await, ReceiptStatus::ErrorRed);
    assert_eq!(status(&h, &slow_key).await, ReceiptStatus::Autorizado);
    assert_eq!(status(&h, &returned_key).await, ReceiptStatus::Devuelta);
}

#[tokio::test]
async fn sweep_respects_the_creation_window() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let service = h.service();
    h.authority.push_reception(Err(connection_refused()));
    let tx = h.seed_income(None);
    service.issue_invoice(tx.id, PASSWORD).await.unwrap_err();
    let calls_before = h.authority.calls().len();

    let future = Utc::now() + chrono::Duration::hours(1);
    assert_eq!(service.process_background_sync(Some(future)).await.unwrap(), 0);
    assert_eq!(h.authority.calls().len(), calls_before);

    let past = Utc::now() - chrono::Duration::hours(1);
    assert_eq!(service.process_background_sync(Some(past)).await.unwrap(), 1);
}

#[tokio::test]
async fn empty_sweep_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    assert_eq!(h.service().process_background_sync(None).await.unwrap(), 0);
    assert!(h.authority.calls().is_empty());
}

#[tokio::test]
async fn reconciler_authorizes_pending_receipts_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let service = Arc::new(h.service());
    h.authority.push_reception(Err(connection_refused()));
    let tx = h.seed_income(None);
    let key = service
        .issue_invoice(tx.id, PASSWORD)
        .await
        .unwrap_err()
        .access_key()
        .cloned()
        .unwrap();

    let handle = Reconciler::spawn(
        Arc::clone(&service),
        ReconcilerConfig::default().with_interval(Duration::from_millis(20)),
    );

    let mut current = ReceiptStatus::ErrorRed;
    for _ in 0..100 {
        current = status(&h, &key).await;
        if current == ReceiptStatus::Autorizado {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    assert_eq!(current, ReceiptStatus::Autorizado);
}
