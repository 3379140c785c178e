//! Ledger transaction -> authority document.
//!
//! Formatting rules:
//! - money: 2 decimals; quantity and unit price: 6 decimals
//! - rounding: half away from zero
//! - dates: `dd/mm/yyyy`
//! - free text: newlines and tabs become spaces, carriage returns vanish, trimmed

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::access_key::AccessKey;
use crate::codes::{DocumentType, TaxRate};
use crate::document::{
    CampoAdicional, DOCUMENT_ID, DOCUMENT_VERSION, Detalle, DetalleNotaCredito, Detalles, Factura,
    Impuesto, Impuestos, InfoAdicional, InfoFactura, InfoNotaCredito, InfoTributaria, NotaCredito,
    Pago, Pagos, TotalConImpuestos, TotalImpuesto,
};
use crate::model::{Issuer, TaxPayer, Transaction, TransactionItem};

pub const CURRENCY: &str = "DOLAR";
/// "Sin utilización del sistema financiero".
pub const DEFAULT_PAYMENT_METHOD: &str = "01";
pub const SUPPORT_KEY_FIELD: &str = "claveAccesoDocSustento";

const ZERO_MONEY: &str = "0.00";

/// What a credit note modifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditNoteReference {
    pub original_access_key: AccessKey,
    pub original_date: NaiveDate,
    pub reason: String,
}

/// Builds the invoice for `tx`. `key` must have been generated for this
/// issuer, date and sequence.
pub fn map_invoice(
    tx: &Transaction,
    items: &[TransactionItem],
    issuer: &Issuer,
    buyer: &TaxPayer,
    key: &AccessKey,
) -> Factura {
    let total = money(tx.amount);

    let info_factura = InfoFactura {
        fecha_emision: date(tx.date),
        dir_establecimiento: non_empty(clean_text(&issuer.establishment_address)),
        obligado_contabilidad: yes_no(issuer.keep_accounting),
        tipo_identificacion_comprador: buyer.identification_type.clone(),
        razon_social_comprador: clean_text(&buyer.name),
        identificacion_comprador: buyer.identification.clone(),
        direccion_comprador: buyer.address.as_deref().map(clean_text).and_then(non_empty),
        total_sin_impuestos: money(tx.subtotal()),
        total_descuento: ZERO_MONEY.to_string(),
        total_con_impuestos: tax_totals(tx),
        propina: ZERO_MONEY.to_string(),
        importe_total: total.clone(),
        moneda: CURRENCY.to_string(),
        pagos: Pagos {
            pago: vec![Pago {
                forma_pago: DEFAULT_PAYMENT_METHOD.to_string(),
                total,
            }],
        },
    };

    let detalle = if items.is_empty() {
        vec![fallback_line(tx).into_invoice_detail()]
    } else {
        items.iter().map(|i| item_line(i).into_invoice_detail()).collect()
    };

    Factura {
        id: DOCUMENT_ID.to_string(),
        version: DOCUMENT_VERSION.to_string(),
        info_tributaria: info_tributaria(issuer, key, DocumentType::Invoice),
        info_factura,
        detalles: Detalles { detalle },
    }
}

/// Builds the credit note voiding `original`. Amounts and lines come from the
/// original transaction; the emission date is the void transaction's.
pub fn map_credit_note(
    void_tx: &Transaction,
    original: &Transaction,
    original_items: &[TransactionItem],
    issuer: &Issuer,
    buyer: &TaxPayer,
    key: &AccessKey,
    reference: &CreditNoteReference,
) -> NotaCredito {
    let info_nota_credito = InfoNotaCredito {
        fecha_emision: date(void_tx.date),
        dir_establecimiento: clean_text(&issuer.establishment_address),
        tipo_identificacion_comprador: buyer.identification_type.clone(),
        razon_social_comprador: clean_text(&buyer.name),
        identificacion_comprador: buyer.identification.clone(),
        obligado_contabilidad: yes_no(issuer.keep_accounting),
        cod_doc_modificado: DocumentType::Invoice.code().to_string(),
        num_doc_modificado: reference.original_access_key.document_number(),
        fecha_emision_doc_sustento: date(reference.original_date),
        total_sin_impuestos: money(original.subtotal()),
        valor_modificacion: money(original.amount),
        moneda: CURRENCY.to_string(),
        total_con_impuestos: tax_totals(original),
        motivo: clean_text(&reference.reason),
    };

    let detalle = if original_items.is_empty() {
        vec![fallback_line(original).into_credit_note_detail()]
    } else {
        original_items
            .iter()
            .map(|i| item_line(i).into_credit_note_detail())
            .collect()
    };

    NotaCredito {
        id: DOCUMENT_ID.to_string(),
        version: DOCUMENT_VERSION.to_string(),
        info_tributaria: info_tributaria(issuer, key, DocumentType::CreditNote),
        info_nota_credito,
        detalles: Detalles { detalle },
        info_adicional: Some(InfoAdicional {
            campo_adicional: vec![CampoAdicional {
                nombre: SUPPORT_KEY_FIELD.to_string(),
                valor: reference.original_access_key.to_string(),
            }],
        }),
    }
}

fn info_tributaria(issuer: &Issuer, key: &AccessKey, document_type: DocumentType) -> InfoTributaria {
    InfoTributaria {
        ambiente: issuer.environment.to_string(),
        tipo_emision: "1".to_string(),
        razon_social: clean_text(&issuer.business_name),
        nombre_comercial: issuer.trade_name.as_deref().map(clean_text).and_then(non_empty),
        ruc: issuer.ruc.clone(),
        clave_acceso: key.to_string(),
        cod_doc: document_type.code().to_string(),
        estab: key.establishment().to_string(),
        pto_emi: key.point().to_string(),
        secuencial: key.sequential().to_string(),
        dir_matriz: clean_text(&issuer.main_address),
    }
}

/// One entry per non-zero bucket, 15% first.
fn tax_totals(tx: &Transaction) -> TotalConImpuestos {
    let mut total_impuesto = Vec::with_capacity(2);
    if tx.subtotal_15 > Decimal::ZERO {
        total_impuesto.push(TotalImpuesto {
            codigo: TaxRate::VAT_TAX_CODE.to_string(),
            codigo_porcentaje: TaxRate::Fifteen.percentage_code().to_string(),
            base_imponible: money(tx.subtotal_15),
            valor: money(tx.tax_amount),
        });
    }
    if tx.subtotal_0 > Decimal::ZERO {
        total_impuesto.push(TotalImpuesto {
            codigo: TaxRate::VAT_TAX_CODE.to_string(),
            codigo_porcentaje: TaxRate::Zero.percentage_code().to_string(),
            base_imponible: money(tx.subtotal_0),
            valor: ZERO_MONEY.to_string(),
        });
    }
    TotalConImpuestos { total_impuesto }
}

/// A detail line before it is shaped for a specific document type.
struct Line {
    code: Option<String>,
    descripcion: String,
    cantidad: String,
    precio_unitario: String,
    precio_total_sin_impuesto: String,
    impuestos: Impuestos,
}

impl Line {
    fn into_invoice_detail(self) -> Detalle {
        Detalle {
            codigo_principal: self.code,
            descripcion: self.descripcion,
            cantidad: self.cantidad,
            precio_unitario: self.precio_unitario,
            descuento: ZERO_MONEY.to_string(),
            precio_total_sin_impuesto: self.precio_total_sin_impuesto,
            impuestos: self.impuestos,
        }
    }

    fn into_credit_note_detail(self) -> DetalleNotaCredito {
        DetalleNotaCredito {
            codigo_interno: self.code,
            descripcion: self.descripcion,
            cantidad: self.cantidad,
            precio_unitario: self.precio_unitario,
            descuento: ZERO_MONEY.to_string(),
            precio_total_sin_impuesto: self.precio_total_sin_impuesto,
            impuestos: self.impuestos,
        }
    }
}

fn item_line(item: &TransactionItem) -> Line {
    let tax = item.subtotal * Decimal::from(item.tax_rate.percent()) / Decimal::ONE_HUNDRED;
    Line {
        code: item.code.as_deref().map(clean_text).and_then(non_empty),
        descripcion: clean_text(&item.description),
        cantidad: fixed(item.quantity, 6),
        precio_unitario: fixed(item.unit_price, 6),
        precio_total_sin_impuesto: money(item.subtotal),
        impuestos: Impuestos {
            impuesto: vec![vat(item.tax_rate, item.subtotal, tax)],
        },
    }
}

/// Single line carrying the transaction aggregates, for unitemized transactions.
fn fallback_line(tx: &Transaction) -> Line {
    let rate = if tx.tax_amount > Decimal::ZERO {
        TaxRate::Fifteen
    } else {
        TaxRate::Zero
    };
    let subtotal = tx.subtotal();
    Line {
        code: None,
        descripcion: clean_text(&tx.description),
        cantidad: fixed(Decimal::ONE, 6),
        precio_unitario: fixed(subtotal, 6),
        precio_total_sin_impuesto: money(subtotal),
        impuestos: Impuestos {
            impuesto: vec![vat(rate, subtotal, tx.tax_amount)],
        },
    }
}

fn vat(rate: TaxRate, base: Decimal, value: Decimal) -> Impuesto {
    Impuesto {
        codigo: TaxRate::VAT_TAX_CODE.to_string(),
        codigo_porcentaje: rate.percentage_code().to_string(),
        tarifa: rate.percent().to_string(),
        base_imponible: money(base),
        valor: money(value),
    }
}

/// Replaces characters the authority rejects inside text nodes.
pub fn clean_text(raw: &str) -> String {
    raw.replace('\r', "")
        .replace(['\n', '\t'], " ")
        .trim()
        .to_string()
}

/// `value` rounded half away from zero and printed with exactly `dp` decimals.
pub fn fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

pub fn money(value: Decimal) -> String {
    fixed(value, 2)
}

fn date(d: NaiveDate) -> String {
    d.format("%d/%m/%Y").to_string()
}

fn yes_no(flag: bool) -> String {
    if flag { "SI" } else { "NO" }.to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}
