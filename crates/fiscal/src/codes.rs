//! Legal codes from the authority's catalogue.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use einvoice_core::DomainError;

/// Fiscal document type (`codDoc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// `01` factura.
    #[serde(rename = "01")]
    Invoice,
    /// `04` nota de crédito.
    #[serde(rename = "04")]
    CreditNote,
}

impl DocumentType {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "01",
            DocumentType::CreditNote => "04",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "01" => Ok(DocumentType::Invoice),
            "04" => Ok(DocumentType::CreditNote),
            other => Err(DomainError::validation(format!(
                "unsupported document type code: {other}"
            ))),
        }
    }
}

/// Authority environment (`ambiente`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// `1` pruebas.
    Test,
    /// `2` producción.
    Production,
}

impl Environment {
    pub fn code(&self) -> u8 {
        match self {
            Environment::Test => 1,
            Environment::Production => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, DomainError> {
        match code {
            1 => Ok(Environment::Test),
            2 => Ok(Environment::Production),
            other => Err(DomainError::validation(format!(
                "environment must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Emission type digit. Only normal emission exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmissionType {
    #[default]
    Normal,
}

impl EmissionType {
    pub fn code(&self) -> u8 {
        match self {
            EmissionType::Normal => 1,
        }
    }
}

/// VAT bucket (`codigoPorcentaje`) applied to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxRate {
    /// Code `0`, 0%.
    Zero,
    /// Code `4`, 15%.
    Fifteen,
}

impl TaxRate {
    /// `codigo` of the VAT tax itself.
    pub const VAT_TAX_CODE: &'static str = "2";

    /// `codigoPorcentaje`.
    pub fn percentage_code(&self) -> &'static str {
        match self {
            TaxRate::Zero => "0",
            TaxRate::Fifteen => "4",
        }
    }

    /// `tarifa`, as a whole percentage.
    pub fn percent(&self) -> u32 {
        match self {
            TaxRate::Zero => 0,
            TaxRate::Fifteen => 15,
        }
    }

    /// Maps the stored rate code. Anything other than the 15% code is taxed at 0%.
    pub fn from_code(code: i32) -> Self {
        if code == 4 { TaxRate::Fifteen } else { TaxRate::Zero }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_codes_round_trip() {
        for t in [DocumentType::Invoice, DocumentType::CreditNote] {
            assert_eq!(t.code().parse::<DocumentType>().unwrap(), t);
        }
        assert!("07".parse::<DocumentType>().is_err());
    }

    #[test]
    fn environment_rejects_unknown_codes() {
        assert_eq!(Environment::from_code(2).unwrap(), Environment::Production);
        assert!(Environment::from_code(3).is_err());
    }

    #[test]
    fn unknown_rate_codes_fall_back_to_zero() {
        assert_eq!(TaxRate::from_code(4), TaxRate::Fifteen);
        assert_eq!(TaxRate::from_code(6), TaxRate::Zero);
        assert_eq!(TaxRate::Fifteen.percentage_code(), "4");
    }
}
