//! The 49-digit access key (clave de acceso).
//!
//! Layout, 0-indexed half-open ranges:
//!
//! | range    | field                        |
//! |----------|------------------------------|
//! | `0..8`   | emission date, `ddmmyyyy`    |
//! | `8..10`  | document type code           |
//! | `10..23` | issuer RUC                   |
//! | `23`     | environment                  |
//! | `24..27` | establishment                |
//! | `27..30` | emission point               |
//! | `30..39` | sequential, zero padded      |
//! | `39..47` | numeric code                 |
//! | `47`     | emission type                |
//! | `48`     | mod-11 check digit           |
//!
//! The check digit is always recomputed from the first 48 digits; it is never
//! accepted from outside without verification.

use core::fmt;
use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use einvoice_core::{DomainError, DomainResult};

use crate::codes::{DocumentType, EmissionType, Environment};

pub const ACCESS_KEY_LEN: usize = 49;
const WEIGHTS: [u32; 6] = [2, 3, 4, 5, 6, 7];

/// Nine-digit document sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequential(u64);

impl Sequential {
    pub const MAX: u64 = 999_999_999;

    pub fn new(value: u64) -> DomainResult<Self> {
        if value == 0 || value > Self::MAX {
            return Err(DomainError::validation(format!(
                "sequential must be within 1..={}, got {value}",
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sequential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:09}", self.0)
    }
}

/// Eight-digit numeric code mixed into every key. Generated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumericCode(u32);

impl NumericCode {
    pub const MAX: u32 = 99_999_999;

    pub fn new(value: u32) -> DomainResult<Self> {
        if value > Self::MAX {
            return Err(DomainError::validation(format!(
                "numeric code must have at most 8 digits, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NumericCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

/// Everything an access key is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyInput {
    pub date: NaiveDate,
    pub document_type: DocumentType,
    pub ruc: String,
    pub environment: Environment,
    pub establishment: String,
    pub point: String,
    pub sequential: Sequential,
    pub numeric_code: NumericCode,
    pub emission_type: EmissionType,
}

/// A verified 49-digit access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    /// Builds the key for `input`. Pure: identical inputs give identical keys.
    pub fn generate(input: &AccessKeyInput) -> DomainResult<Self> {
        require_digits("ruc", &input.ruc, 13)?;
        require_digits("establishment", &input.establishment, 3)?;
        require_digits("emission point", &input.point, 3)?;

        let mut key = String::with_capacity(ACCESS_KEY_LEN);
        key.push_str(&input.date.format("%d%m%Y").to_string());
        key.push_str(input.document_type.code());
        key.push_str(&input.ruc);
        key.push_str(&input.environment.code().to_string());
        key.push_str(&input.establishment);
        key.push_str(&input.point);
        key.push_str(&input.sequential.to_string());
        key.push_str(&input.numeric_code.to_string());
        key.push_str(&input.emission_type.code().to_string());

        if key.len() != ACCESS_KEY_LEN - 1 {
            return Err(DomainError::invariant(format!(
                "access key body must have 48 digits, got {}",
                key.len()
            )));
        }

        let digit = check_digit(&key)?;
        key.push(char::from(b'0' + digit));
        Ok(Self(key))
    }

    /// Parses and verifies an externally supplied key.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        require_digits("access key", raw, ACCESS_KEY_LEN)?;
        let expected = check_digit(&raw[..ACCESS_KEY_LEN - 1])?;
        let actual = raw.as_bytes()[ACCESS_KEY_LEN - 1] - b'0';
        if expected != actual {
            return Err(DomainError::validation(format!(
                "access key check digit mismatch: expected {expected}, found {actual}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Emission date encoded in the key.
    pub fn date(&self) -> DomainResult<NaiveDate> {
        NaiveDate::parse_from_str(&self.0[0..8], "%d%m%Y")
            .map_err(|e| DomainError::validation(format!("access key date is invalid: {e}")))
    }

    pub fn document_type(&self) -> DomainResult<DocumentType> {
        self.0[8..10].parse()
    }

    pub fn ruc(&self) -> &str {
        &self.0[10..23]
    }

    pub fn environment(&self) -> DomainResult<Environment> {
        Environment::from_code(self.0.as_bytes()[23] - b'0')
    }

    pub fn establishment(&self) -> &str {
        &self.0[24..27]
    }

    pub fn point(&self) -> &str {
        &self.0[27..30]
    }

    pub fn sequential(&self) -> &str {
        &self.0[30..39]
    }

    pub fn numeric_code(&self) -> &str {
        &self.0[39..47]
    }

    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[ACCESS_KEY_LEN - 1] - b'0'
    }

    /// `estab-ptoEmi-secuencial`, the printed document number.
    pub fn document_number(&self) -> String {
        format!(
            "{}-{}-{}",
            self.establishment(),
            self.point(),
            self.sequential()
        )
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccessKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccessKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccessKey> for String {
    fn from(value: AccessKey) -> Self {
        value.0
    }
}

impl AsRef<str> for AccessKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Modulo-11 check digit over `digits`, weights 2..=7 cycling from the right.
///
/// `11 - (sum % 11)`, with 11 mapped to 0 and 10 mapped to 1.
pub fn check_digit(digits: &str) -> DomainResult<u8> {
    let mut sum: u32 = 0;
    for (c, weight) in digits.chars().rev().zip(WEIGHTS.iter().cycle()) {
        let d = c
            .to_digit(10)
            .ok_or_else(|| DomainError::validation(format!("non-digit character {c:?}")))?;
        sum += d * weight;
    }
    let digit = match 11 - (sum % 11) {
        11 => 0,
        10 => 1,
        n => n as u8,
    };
    Ok(digit)
}

fn require_digits(field: &str, value: &str, len: usize) -> DomainResult<()> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::validation(format!(
            "{field} must be exactly {len} digits, got {value:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(seq: u64, code: u32) -> AccessKeyInput {
        AccessKeyInput {
            date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            document_type: DocumentType::Invoice,
            ruc: "1790012345001".into(),
            environment: Environment::Test,
            establishment: "001".into(),
            point: "001".into(),
            sequential: Sequential::new(seq).unwrap(),
            numeric_code: NumericCode::new(code).unwrap(),
            emission_type: EmissionType::Normal,
        }
    }

    #[test]
    fn builds_the_documented_example() {
        let key = AccessKey::generate(&input(1, 12_345_678)).unwrap();
        assert_eq!(key.as_str().len(), 49);
        assert!(key.as_str().starts_with("100120260117900123450011"));
        assert_eq!(
            key.as_str(),
            "1001202601179001234500110010010000000011234567817"
        );
        assert_eq!(key.check_digit(), 7);
    }

    #[test]
    fn exposes_fields_by_position() {
        let key = AccessKey::generate(&input(1501, 12_345_678)).unwrap();
        assert_eq!(key.sequential(), "000001501");
        assert_eq!(key.establishment(), "001");
        assert_eq!(key.point(), "001");
        assert_eq!(key.ruc(), "1790012345001");
        assert_eq!(key.numeric_code(), "12345678");
        assert_eq!(key.document_type().unwrap(), DocumentType::Invoice);
        assert_eq!(key.environment().unwrap(), Environment::Test);
        assert_eq!(
            key.date().unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
        );
        assert_eq!(key.document_number(), "001-001-000001501");
    }

    #[test]
    fn check_digit_special_cases() {
        // remainder 0 gives 11, which maps to 0
        assert_eq!(check_digit("150320260417900123450012002003000000042876543211").unwrap(), 0);
        assert_eq!(check_digit("0").unwrap(), 0);
        // 1 * 2 = 2, 11 - 2 = 9
        assert_eq!(check_digit("1").unwrap(), 9);
        // 5 * 2 = 10, 11 - 10 = 1
        assert_eq!(check_digit("5").unwrap(), 1);
    }

    #[test]
    fn parse_rejects_tampered_keys() {
        let key = AccessKey::generate(&input(1, 12_345_678)).unwrap();
        let mut tampered = key.as_str().to_string();
        tampered.replace_range(48..49, "8");
        let err = AccessKey::parse(&tampered).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("check digit") => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(AccessKey::parse("123").is_err());
        assert_eq!(AccessKey::parse(key.as_str()).unwrap(), key);
    }

    #[test]
    fn generate_validates_inputs() {
        let mut bad = input(1, 1);
        bad.ruc = "179001234500".into();
        assert!(AccessKey::generate(&bad).is_err());

        let mut bad = input(1, 1);
        bad.point = "1".into();
        assert!(AccessKey::generate(&bad).is_err());

        assert!(Sequential::new(0).is_err());
        assert!(Sequential::new(1_000_000_000).is_err());
        assert!(NumericCode::new(100_000_000).is_err());
    }

    #[test]
    fn try_from_string_verifies() {
        let key = AccessKey::generate(&input(7, 42)).unwrap();
        let back = AccessKey::try_from(key.to_string()).unwrap();
        assert_eq!(back, key);
        // 48 ones carry check digit 4, not 1
        assert!(AccessKey::try_from("1".repeat(49)).is_err());
    }

    proptest! {
        #[test]
        fn generated_keys_are_49_digits_and_self_verifying(
            seq in 1u64..=Sequential::MAX,
            code in 0u32..=NumericCode::MAX,
            day in 1u32..=28,
            month in 1u32..=12,
            year in 2000i32..=2099,
            production in any::<bool>(),
            credit_note in any::<bool>(),
        ) {
            let mut i = input(seq, code);
            i.date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
            i.environment = if production { Environment::Production } else { Environment::Test };
            i.document_type = if credit_note { DocumentType::CreditNote } else { DocumentType::Invoice };

            let key = AccessKey::generate(&i).unwrap();
            prop_assert_eq!(key.as_str().len(), 49);
            prop_assert!(key.as_str().bytes().all(|b| b.is_ascii_digit()));
            prop_assert_eq!(check_digit(&key.as_str()[..48]).unwrap(), key.check_digit());
            prop_assert_eq!(key.sequential(), format!("{seq:09}"));
            prop_assert_eq!(AccessKey::generate(&i).unwrap(), key);
        }
    }
}
