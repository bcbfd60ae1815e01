//! # CUIT
//!
//! Argentine tax identifier: 2-digit type prefix, 8-digit body and a
//! modulo-11 check digit.
//!
//! ```text
//!   20 - 12345678 - 6
//!   ──   ────────   ─
//!   │    │          └── check digit
//!   │    └── DNI / company sequence
//!   └── type (20/23/24/25/26/27 persons, 30/33/34 companies)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Check-digit weights applied to the first ten digits.
const WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// Type prefixes AFIP assigns.
const VALID_PREFIXES: [&str; 9] = ["20", "23", "24", "25", "26", "27", "30", "33", "34"];

/// A validated CUIT/CUIL, stored as its 11 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cuit(String);

impl Cuit {
    /// Parses a CUIT, accepting `20-12345678-6`, `20 12345678 6` or
    /// `20123456786`.
    ///
    /// ```rust
    /// use mostrador_core::cuit::Cuit;
    ///
    /// let cuit = Cuit::parse("20-12345678-6").unwrap();
    /// assert_eq!(cuit.as_str(), "20123456786");
    /// assert!(Cuit::parse("20-12345678-0").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidCuit {
            value: input.to_string(),
            reason: reason.to_string(),
        };

        let digits: String = input
            .chars()
            .filter(|c| !matches!(c, '-' | ' ' | '.'))
            .collect();

        if digits.is_empty() {
            return Err(ValidationError::Required {
                field: "cuit".to_string(),
            });
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("must contain only digits"));
        }
        if digits.len() != 11 {
            return Err(invalid("must have 11 digits"));
        }
        if !VALID_PREFIXES.contains(&&digits[..2]) {
            return Err(invalid("unknown type prefix"));
        }

        let expected = check_digit(&digits[..10]).ok_or_else(|| invalid("body has no valid check digit"))?;
        let actual = digits[10..].parse::<u32>().unwrap_or(u32::MAX);
        if expected != actual {
            return Err(invalid("check digit does not match"));
        }

        Ok(Cuit(digits))
    }

    /// The 11 digits with no separators.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form used for `DocNro` and `Cuit` fields in WSFEv1.
    pub fn as_u64(&self) -> u64 {
        self.0.parse().unwrap_or_default()
    }

    /// Whether the prefix identifies a company (30/33/34).
    pub fn is_company(&self) -> bool {
        matches!(&self.0[..2], "30" | "33" | "34")
    }
}

/// Computes the modulo-11 check digit for the first ten digits.
///
/// Returns `None` when the remainder yields 10, which AFIP never issues.
pub fn check_digit(first_ten: &str) -> Option<u32> {
    if first_ten.len() != 10 {
        return None;
    }

    let mut sum = 0u32;
    for (ch, weight) in first_ten.chars().zip(WEIGHTS.iter()) {
        sum += ch.to_digit(10)? * weight;
    }

    match 11 - (sum % 11) {
        11 => Some(0),
        10 => None,
        dv => Some(dv),
    }
}

impl fmt::Display for Cuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", &self.0[..2], &self.0[2..10], &self.0[10..])
    }
}

impl FromStr for Cuit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cuit::parse(s)
    }
}

impl TryFrom<String> for Cuit {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cuit::parse(&value)
    }
}

impl From<Cuit> for String {
    fn from(cuit: Cuit) -> Self {
        cuit.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_valid_cuits() {
        // AFIP's own CUIT and common test identities
        assert!(Cuit::parse("33-69345023-9").is_ok());
        assert!(Cuit::parse("20-12345678-6").is_ok());
        assert!(Cuit::parse("30-71234567-1").is_ok());
        assert!(Cuit::parse("20111111112").is_ok());
    }

    #[test]
    fn test_rejects_bad_check_digit() {
        assert!(Cuit::parse("20-12345678-0").is_err());
        assert!(Cuit::parse("33-69345023-1").is_err());
    }

    #[test]
    fn test_rejects_bad_shape() {
        assert!(Cuit::parse("").is_err());
        assert!(Cuit::parse("2012345678").is_err());
        assert!(Cuit::parse("201234567861").is_err());
        assert!(Cuit::parse("20-1234567A-6").is_err());
        // Valid checksum structure but unknown prefix
        assert!(Cuit::parse("11-12345678-9").is_err());
    }

    #[test]
    fn test_display_and_numeric_forms() {
        let cuit = Cuit::parse("20123456786").unwrap();
        assert_eq!(cuit.to_string(), "20-12345678-6");
        assert_eq!(cuit.as_u64(), 20_123_456_786);
        assert!(!cuit.is_company());
        assert!(Cuit::parse("30-71234567-1").unwrap().is_company());
    }

    #[test]
    fn test_serde_validates() {
        let ok: Result<Cuit, _> = serde_json::from_str("\"20-12345678-6\"");
        assert!(ok.is_ok());
        let bad: Result<Cuit, _> = serde_json::from_str("\"20-12345678-0\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn computed_check_digit_always_validates(prefix_idx in 0usize..9, body in 0u32..100_000_000) {
            let first_ten = format!("{}{:08}", VALID_PREFIXES[prefix_idx], body);
            if let Some(dv) = check_digit(&first_ten) {
                let full = format!("{}{}", first_ten, dv);
                prop_assert!(Cuit::parse(&full).is_ok());

                let wrong = format!("{}{}", first_ten, (dv + 1) % 10);
                prop_assert!(Cuit::parse(&wrong).is_err());
            }
        }
    }
}
