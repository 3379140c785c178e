//! The authority's XML document model.
//!
//! Field order is significant: the authority validates against an XSD
//! sequence, so struct fields below are declared in schema order. Every value
//! is pre-formatted text; the mapper owns number formatting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes::DocumentType;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const DOCUMENT_ID: &str = "comprobante";
pub const DOCUMENT_VERSION: &str = "1.1.0";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("failed to serialize {root}: {message}")]
    Serialize { root: &'static str, message: String },
    #[error("failed to parse {root}: {message}")]
    Parse { root: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoTributaria {
    pub ambiente: String,
    pub tipo_emision: String,
    pub razon_social: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre_comercial: Option<String>,
    pub ruc: String,
    pub clave_acceso: String,
    pub cod_doc: String,
    pub estab: String,
    pub pto_emi: String,
    pub secuencial: String,
    pub dir_matriz: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalImpuesto {
    pub codigo: String,
    pub codigo_porcentaje: String,
    pub base_imponible: String,
    pub valor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalConImpuestos {
    #[serde(rename = "totalImpuesto", default)]
    pub total_impuesto: Vec<TotalImpuesto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pago {
    pub forma_pago: String,
    pub total: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagos {
    #[serde(rename = "pago", default)]
    pub pago: Vec<Pago>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoFactura {
    pub fecha_emision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir_establecimiento: Option<String>,
    pub obligado_contabilidad: String,
    pub tipo_identificacion_comprador: String,
    pub razon_social_comprador: String,
    pub identificacion_comprador: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direccion_comprador: Option<String>,
    pub total_sin_impuestos: String,
    pub total_descuento: String,
    pub total_con_impuestos: TotalConImpuestos,
    pub propina: String,
    pub importe_total: String,
    pub moneda: String,
    pub pagos: Pagos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impuesto {
    pub codigo: String,
    pub codigo_porcentaje: String,
    pub tarifa: String,
    pub base_imponible: String,
    pub valor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impuestos {
    #[serde(rename = "impuesto", default)]
    pub impuesto: Vec<Impuesto>,
}

/// Invoice line. Credit notes use `codigoInterno` instead of `codigoPrincipal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detalle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigo_principal: Option<String>,
    pub descripcion: String,
    pub cantidad: String,
    pub precio_unitario: String,
    pub descuento: String,
    pub precio_total_sin_impuesto: String,
    pub impuestos: Impuestos,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detalles<D> {
    #[serde(rename = "detalle", default = "Vec::new")]
    pub detalle: Vec<D>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factura {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "infoTributaria")]
    pub info_tributaria: InfoTributaria,
    #[serde(rename = "infoFactura")]
    pub info_factura: InfoFactura,
    #[serde(rename = "detalles")]
    pub detalles: Detalles<Detalle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoNotaCredito {
    pub fecha_emision: String,
    pub dir_establecimiento: String,
    pub tipo_identificacion_comprador: String,
    pub razon_social_comprador: String,
    pub identificacion_comprador: String,
    pub obligado_contabilidad: String,
    pub cod_doc_modificado: String,
    pub num_doc_modificado: String,
    pub fecha_emision_doc_sustento: String,
    pub total_sin_impuestos: String,
    pub valor_modificacion: String,
    pub moneda: String,
    pub total_con_impuestos: TotalConImpuestos,
    pub motivo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetalleNotaCredito {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigo_interno: Option<String>,
    pub descripcion: String,
    pub cantidad: String,
    pub precio_unitario: String,
    pub descuento: String,
    pub precio_total_sin_impuesto: String,
    pub impuestos: Impuestos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampoAdicional {
    #[serde(rename = "@nombre")]
    pub nombre: String,
    #[serde(rename = "$text")]
    pub valor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoAdicional {
    #[serde(rename = "campoAdicional", default)]
    pub campo_adicional: Vec<CampoAdicional>,
}

impl InfoAdicional {
    pub fn get(&self, nombre: &str) -> Option<&str> {
        self.campo_adicional
            .iter()
            .find(|c| c.nombre == nombre)
            .map(|c| c.valor.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaCredito {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "infoTributaria")]
    pub info_tributaria: InfoTributaria,
    #[serde(rename = "infoNotaCredito")]
    pub info_nota_credito: InfoNotaCredito,
    #[serde(rename = "detalles")]
    pub detalles: Detalles<DetalleNotaCredito>,
    #[serde(
        rename = "infoAdicional",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub info_adicional: Option<InfoAdicional>,
}

impl Factura {
    pub const ROOT: &'static str = "factura";

    /// Serialized document with the mandatory XML declaration.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        to_xml(Self::ROOT, self)
    }

    pub fn from_xml(xml: &str) -> Result<Self, XmlError> {
        from_xml(Self::ROOT, xml)
    }
}

impl NotaCredito {
    pub const ROOT: &'static str = "notaCredito";

    pub fn to_xml(&self) -> Result<String, XmlError> {
        to_xml(Self::ROOT, self)
    }

    pub fn from_xml(xml: &str) -> Result<Self, XmlError> {
        from_xml(Self::ROOT, xml)
    }
}

/// A stored document decoded back for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiscalDocument {
    Invoice(Factura),
    CreditNote(NotaCredito),
}

impl FiscalDocument {
    /// Decodes a stored (possibly signed) document. Signature elements are ignored.
    pub fn parse(document_type: DocumentType, xml: &str) -> Result<Self, XmlError> {
        match document_type {
            DocumentType::Invoice => Factura::from_xml(xml).map(FiscalDocument::Invoice),
            DocumentType::CreditNote => NotaCredito::from_xml(xml).map(FiscalDocument::CreditNote),
        }
    }

    pub fn info_tributaria(&self) -> &InfoTributaria {
        match self {
            FiscalDocument::Invoice(f) => &f.info_tributaria,
            FiscalDocument::CreditNote(nc) => &nc.info_tributaria,
        }
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            FiscalDocument::Invoice(_) => DocumentType::Invoice,
            FiscalDocument::CreditNote(_) => DocumentType::CreditNote,
        }
    }
}

fn to_xml<T: Serialize>(root: &'static str, value: &T) -> Result<String, XmlError> {
    let body = quick_xml::se::to_string_with_root(root, value).map_err(|e| {
        XmlError::Serialize {
            root,
            message: e.to_string(),
        }
    })?;
    Ok(format!("{XML_DECLARATION}{body}"))
}

fn from_xml<T: for<'de> Deserialize<'de>>(root: &'static str, xml: &str) -> Result<T, XmlError> {
    quick_xml::de::from_str(xml).map_err(|e| XmlError::Parse {
        root,
        message: e.to_string(),
    })
}
