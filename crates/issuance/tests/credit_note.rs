use einvoice_fiscal::{DocumentType, ReceiptStatus};
use einvoice_infra::repo::{EmissionPointRepository, ReceiptRepository};
use einvoice_issuance::testing::{self, AuthorityCall, Harness};
use einvoice_issuance::{CreditNoteRequest, IssuanceError};

const PASSWORD: &str = "clave-firma";

fn request(
    void: &einvoice_fiscal::Transaction,
    original: &einvoice_fiscal::Transaction,
    reason: &str,
) -> CreditNoteRequest {
    CreditNoteRequest {
        void_transaction_id: void.id,
        original_transaction_id: original.id,
        reason: reason.to_string(),
        signature_password: PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn credit_note_references_the_authorized_invoice() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let buyer = testing::sample_buyer(Some("maria@example.com"));
    let original = h.seed_income(Some(&buyer));
    let service = h.service();
    let invoice = service.issue_invoice(original.id, PASSWORD).await.unwrap();
    let void = h.seed_void(&original);

    let outcome = service
        .issue_credit_note(request(&void, &original, "Devolución de mercadería"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ReceiptStatus::Autorizado);
    assert_eq!(
        outcome.access_key.document_type().unwrap(),
        DocumentType::CreditNote
    );
    assert_eq!(outcome.access_key.date().unwrap(), void.date);
    // credit notes run on their own counter
    assert_eq!(outcome.access_key.sequential(), "000000001");
    assert_eq!(h.signer.credit_note_calls(), 1);

    let stored = h
        .store
        .get_by_access_key(&outcome.access_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.transaction_id, void.id);
    assert_eq!(stored.taxpayer_id, buyer.id);
    assert_eq!(stored.document_type, DocumentType::CreditNote);

    let xml = &stored.xml_content;
    assert!(xml.contains("<notaCredito"));
    assert!(xml.contains("<codDoc>04</codDoc>"));
    assert!(xml.contains("<codDocModificado>01</codDocModificado>"));
    assert!(xml.contains(&format!(
        "<numDocModificado>{}</numDocModificado>",
        invoice.access_key.document_number()
    )));
    assert!(xml.contains("claveAccesoDocSustento"));
    assert!(xml.contains(invoice.access_key.as_str()));
    assert!(xml.contains("<motivo>Devolución de mercadería</motivo>"));

    let points = h.store.list_by_issuer(h.issuer.id).await.unwrap();
    assert_eq!(points.len(), 2);
}

#[tokio::test]
async fn unauthorized_original_is_refused_before_any_side_effect() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.authority.push_authorization(Ok(testing::no_decision()));
    let original = h.seed_income(None);
    let service = h.service();
    let invoice = service.issue_invoice(original.id, PASSWORD).await.unwrap();
    assert_eq!(invoice.status, ReceiptStatus::EnProceso);
    let void = h.seed_void(&original);
    let calls_before = h.authority.calls().len();

    let err = service
        .issue_credit_note(request(&void, &original, "Error en precio"))
        .await
        .unwrap_err();

    assert!(matches!(err, IssuanceError::OriginalNotAuthorized(_)));
    assert_eq!(h.signer.credit_note_calls(), 0);
    assert_eq!(h.authority.calls().len(), calls_before);
    let points = h.store.list_by_issuer(h.issuer.id).await.unwrap();
    assert!(points
        .iter()
        .all(|p| p.document_type != DocumentType::CreditNote));
}

#[tokio::test]
async fn original_without_any_receipt_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let original = h.seed_income(None);
    let void = h.seed_void(&original);

    let err = h
        .service()
        .issue_credit_note(request(&void, &original, "Anulación"))
        .await
        .unwrap_err();
    assert!(matches!(err, IssuanceError::OriginalNotAuthorized(_)));
}

#[tokio::test]
async fn blank_reason_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let original = h.seed_income(None);
    let void = h.seed_void(&original);

    let err = h
        .service()
        .issue_credit_note(request(&void, &original, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, IssuanceError::Validation(_)));
}

#[tokio::test]
async fn void_must_point_at_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let service = h.service();
    let original = h.seed_income(None);
    let other = h.seed_income(None);
    service.issue_invoice(original.id, PASSWORD).await.unwrap();
    let void_of_other = h.seed_void(&other);

    let err = service
        .issue_credit_note(request(&void_of_other, &original, "Anulación"))
        .await
        .unwrap_err();
    assert!(matches!(err, IssuanceError::Validation(_)));
    assert_eq!(h.signer.credit_note_calls(), 0);
}

#[tokio::test]
async fn rejected_credit_note_can_be_reissued() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(dir.path());
    let service = h.service();
    let original = h.seed_income(None);
    service.issue_invoice(original.id, PASSWORD).await.unwrap();
    let void = h.seed_void(&original);

    h.authority
        .push_authorization(Ok(testing::not_authorized("65", "FECHA EMISION EXTEMPORANEA")));
    let err = service
        .issue_credit_note(request(&void, &original, "Anulación"))
        .await
        .unwrap_err();
    assert!(matches!(err, IssuanceError::Rejected { .. }));

    let retry = service
        .issue_credit_note(request(&void, &original, "Anulación"))
        .await
        .unwrap();
    assert_eq!(retry.status, ReceiptStatus::Autorizado);
    assert_eq!(retry.access_key.sequential(), "000000002");
    assert!(matches!(
        h.authority.calls().last(),
        Some(AuthorityCall::Authorize { access_key }) if *access_key == retry.access_key
    ));
}
