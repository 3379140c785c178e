//! Human-readable receipt (RIDE) rendering.

use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use einvoice_fiscal::document::InfoTributaria;
use einvoice_fiscal::{FiscalDocument, ReceiptStatus};

/// Data the signed document itself does not carry.
#[derive(Debug, Clone)]
pub struct RideMetadata {
    pub status: ReceiptStatus,
    pub authorization_number: Option<String>,
    pub authorization_date: Option<DateTime<Utc>>,
    pub buyer_email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ReceiptRenderer: Send + Sync {
    async fn render(
        &self,
        document: &FiscalDocument,
        metadata: &RideMetadata,
    ) -> Result<PathBuf, RenderError>;
}

/// Plain-text RIDE written as `ride-<access key>.txt` under `output_dir`.
#[derive(Debug, Clone)]
pub struct TextRideRenderer {
    output_dir: PathBuf,
}

impl TextRideRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ReceiptRenderer for TextRideRenderer {
    async fn render(
        &self,
        document: &FiscalDocument,
        metadata: &RideMetadata,
    ) -> Result<PathBuf, RenderError> {
        let body = render_text(document, metadata).map_err(|e| RenderError::Failed(e.to_string()))?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(format!("ride-{}.txt", document.info_tributaria().clave_acceso));
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

fn render_text(document: &FiscalDocument, metadata: &RideMetadata) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    let info = document.info_tributaria();
    header(&mut out, info, document)?;

    writeln!(out, "ESTADO: {}", metadata.status)?;
    if let Some(number) = &metadata.authorization_number {
        writeln!(out, "NÚMERO DE AUTORIZACIÓN: {number}")?;
    }
    if let Some(date) = metadata.authorization_date {
        writeln!(out, "FECHA DE AUTORIZACIÓN: {}", date.format("%d/%m/%Y %H:%M:%S"))?;
    }
    writeln!(out)?;

    match document {
        FiscalDocument::Invoice(f) => {
            let inv = &f.info_factura;
            writeln!(out, "FECHA EMISIÓN: {}", inv.fecha_emision)?;
            writeln!(out, "CLIENTE: {} ({})", inv.razon_social_comprador, inv.identificacion_comprador)?;
            if let Some(email) = &metadata.buyer_email {
                writeln!(out, "EMAIL: {email}")?;
            }
            writeln!(out)?;
            for d in &f.detalles.detalle {
                writeln!(
                    out,
                    "{:>12} x {:<40} {:>12} {:>12}",
                    d.cantidad, d.descripcion, d.precio_unitario, d.precio_total_sin_impuesto
                )?;
            }
            writeln!(out)?;
            for t in &inv.total_con_impuestos.total_impuesto {
                writeln!(out, "BASE IVA código {}: {} IVA: {}", t.codigo_porcentaje, t.base_imponible, t.valor)?;
            }
            writeln!(out, "SUBTOTAL: {}", inv.total_sin_impuestos)?;
            writeln!(out, "TOTAL: {}", inv.importe_total)?;
        }
        FiscalDocument::CreditNote(n) => {
            let nc = &n.info_nota_credito;
            writeln!(out, "FECHA EMISIÓN: {}", nc.fecha_emision)?;
            writeln!(out, "CLIENTE: {} ({})", nc.razon_social_comprador, nc.identificacion_comprador)?;
            writeln!(
                out,
                "DOCUMENTO MODIFICADO: {} del {}",
                nc.num_doc_modificado, nc.fecha_emision_doc_sustento
            )?;
            writeln!(out, "MOTIVO: {}", nc.motivo)?;
            writeln!(out)?;
            for d in &n.detalles.detalle {
                writeln!(
                    out,
                    "{:>12} x {:<40} {:>12} {:>12}",
                    d.cantidad, d.descripcion, d.precio_unitario, d.precio_total_sin_impuesto
                )?;
            }
            writeln!(out)?;
            writeln!(out, "SUBTOTAL: {}", nc.total_sin_impuestos)?;
            writeln!(out, "VALOR MODIFICACIÓN: {}", nc.valor_modificacion)?;
        }
    }
    Ok(out)
}

fn header(out: &mut String, info: &InfoTributaria, document: &FiscalDocument) -> std::fmt::Result {
    let title = match document {
        FiscalDocument::Invoice(_) => "FACTURA",
        FiscalDocument::CreditNote(_) => "NOTA DE CRÉDITO",
    };
    writeln!(out, "{}", info.razon_social)?;
    if let Some(trade) = &info.nombre_comercial {
        writeln!(out, "{trade}")?;
    }
    writeln!(out, "RUC: {}", info.ruc)?;
    writeln!(out, "DIRECCIÓN MATRIZ: {}", info.dir_matriz)?;
    writeln!(out, "{title} No. {}-{}-{}", info.estab, info.pto_emi, info.secuencial)?;
    writeln!(
        out,
        "AMBIENTE: {}",
        if info.ambiente == "2" { "PRODUCCIÓN" } else { "PRUEBAS" }
    )?;
    writeln!(out, "CLAVE DE ACCESO: {}", info.clave_acceso)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use einvoice_core::{IssuerId, TaxPayerId, TransactionId};
    use einvoice_fiscal::{
        AccessKey, AccessKeyInput, DocumentType, EmissionType, Environment, Issuer, NumericCode,
        Sequential, TaxPayer, Transaction, TransactionKind, map_invoice,
    };
    use rust_decimal::Decimal;

    fn invoice() -> FiscalDocument {
        let issuer = Issuer {
            id: IssuerId::new(),
            ruc: "1790012345001".into(),
            business_name: "ACME S.A.".into(),
            trade_name: Some("Acme".into()),
            main_address: "Av. Amazonas 123".into(),
            establishment_address: "Quito".into(),
            establishment_code: "001".into(),
            emission_point_code: "001".into(),
            environment: Environment::Test,
            keep_accounting: false,
            signature_path: "/certs/acme.p12".into(),
            is_active: true,
        };
        let key = AccessKey::generate(&AccessKeyInput {
            date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            document_type: DocumentType::Invoice,
            ruc: issuer.ruc.clone(),
            environment: Environment::Test,
            establishment: "001".into(),
            point: "001".into(),
            sequential: Sequential::new(7).unwrap(),
            numeric_code: NumericCode::new(12_345_678).unwrap(),
            emission_type: EmissionType::Normal,
        })
        .unwrap();
        let tx = Transaction {
            id: TransactionId::new(),
            kind: TransactionKind::Income,
            description: "Servicio".into(),
            date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            amount: Decimal::new(11500, 2),
            subtotal_15: Decimal::new(10000, 2),
            subtotal_0: Decimal::ZERO,
            tax_amount: Decimal::new(1500, 2),
            taxpayer_id: Some(TaxPayerId::new()),
            voids_transaction_id: None,
        };
        FiscalDocument::Invoice(map_invoice(&tx, &[], &issuer, &TaxPayer::final_consumer(), &key))
    }

    #[tokio::test]
    async fn writes_named_file_with_totals() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = TextRideRenderer::new(dir.path().join("rides"));
        let doc = invoice();
        let metadata = RideMetadata {
            status: ReceiptStatus::Autorizado,
            authorization_number: Some(doc.info_tributaria().clave_acceso.clone()),
            authorization_date: None,
            buyer_email: None,
        };

        let path = renderer.render(&doc, &metadata).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("ride-{}.txt", doc.info_tributaria().clave_acceso)
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("FACTURA No. 001-001-000000007"));
        assert!(text.contains("ESTADO: AUTORIZADO"));
        assert!(text.contains("TOTAL: 115.00"));
        assert!(text.contains("CONSUMIDOR FINAL"));
    }
}
