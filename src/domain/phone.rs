//! Phone number validation and normalization.

use serde::{Serialize, Serializer};

use super::error::{AppError, ValidationError};

/// Country calling codes accepted when no explicit allow-list is configured
pub const DEFAULT_ALLOWED_COUNTRY_CODES: &[&str] = &[
    "1", "7", "33", "44", "49", "61", "81", "86", "90", "91", "98", "971",
];

/// Maximum total digits in an E.164 number
const MAX_E164_DIGITS: usize = 15;
const MIN_NATIONAL_DIGITS: usize = 4;
const MAX_NATIONAL_DIGITS: usize = 14;

/// A validated (country code, national number) pair.
///
/// Equality and hashing use the normalized `+{cc}{national}` form, so two
/// numbers that differ only in input formatting are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber {
    country_code: String,
    national_number: String,
    normalized: String,
}

impl PhoneNumber {
    /// Validate and normalize user input.
    ///
    /// Accepts an optional leading `+` on the country code and drops one
    /// trunk-prefix `0` from the national number. Anything else that is not
    /// an ASCII digit is rejected.
    pub fn parse<S: AsRef<str>>(
        country_code: &str,
        national_number: &str,
        allowed_country_codes: &[S],
    ) -> Result<Self, AppError> {
        let cc = country_code.trim();
        let cc = cc.strip_prefix('+').unwrap_or(cc);

        if cc.is_empty() {
            return Err(invalid("countryCode", "Country code is required"));
        }
        if cc.len() > 3 || !is_ascii_digits(cc) || cc.starts_with('0') {
            return Err(invalid(
                "countryCode",
                "Country code must be 1-3 digits and cannot start with 0",
            ));
        }
        if !allowed_country_codes.iter().any(|allowed| allowed.as_ref() == cc) {
            return Err(invalid("countryCode", "Country code is not supported"));
        }

        let national = national_number.trim();
        if national.is_empty() {
            return Err(invalid("mobileNumber", "Mobile number is required"));
        }
        if !is_ascii_digits(national) {
            return Err(invalid("mobileNumber", "Mobile number must contain digits only"));
        }
        let national = national.strip_prefix('0').unwrap_or(national);

        if national.len() < MIN_NATIONAL_DIGITS
            || national.len() > MAX_NATIONAL_DIGITS
            || cc.len() + national.len() > MAX_E164_DIGITS
        {
            return Err(invalid(
                "mobileNumber",
                "Mobile number has an invalid length",
            ));
        }

        Ok(Self {
            normalized: format!("+{}{}", cc, national),
            country_code: cc.to_string(),
            national_number: national.to_string(),
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn national_number(&self) -> &str {
        &self.national_number
    }

    /// Canonical `+{cc}{national}` form used as the storage key
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Number with all but the last four digits hidden, for logs
    pub fn masked(&self) -> String {
        let visible = self.national_number.len().min(4);
        let hidden = self.national_number.len() - visible;
        format!(
            "+{}{}{}",
            self.country_code,
            "*".repeat(hidden),
            &self.national_number[hidden..]
        )
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl Serialize for PhoneNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized)
    }
}

fn is_ascii_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn invalid(field: &str, message: &str) -> AppError {
    AppError::Validation(ValidationError::InvalidField {
        field: field.to_string(),
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(cc: &str, national: &str) -> Result<PhoneNumber, AppError> {
        PhoneNumber::parse(cc, national, DEFAULT_ALLOWED_COUNTRY_CODES)
    }

    #[test]
    fn test_valid_numbers_normalize() {
        let cases = vec![
            ("+1", "5550100", "+15550100"),
            ("1", "2025550143", "+12025550143"),
            ("+98", "09121234567", "+989121234567"),
            (" 44 ", " 7700900123 ", "+447700900123"),
            ("971", "501234567", "+971501234567"),
        ];

        for (cc, national, expected) in cases {
            let phone = parse(cc, national).unwrap();
            assert_eq!(phone.as_str(), expected);
            assert_eq!(phone.to_string(), expected);
        }
    }

    #[test]
    fn test_formatting_variants_are_equal() {
        assert_eq!(parse("+98", "09121234567").unwrap(), parse("98", "9121234567").unwrap());
    }

    #[test]
    fn test_non_digit_characters_rejected() {
        for national in ["555-0100", "555 0100", "55501OO", "+5550100", "５５５０１００", "5550100;"] {
            let err = parse("+1", national).unwrap_err();
            assert!(
                matches!(err, AppError::Validation(_)),
                "expected validation error for {national:?}"
            );
        }
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(parse("+1", "123"), Err(AppError::Validation(_))));
        assert!(matches!(parse("+1", "123456789012345"), Err(AppError::Validation(_))));
        // 3-digit country code plus 13 digits exceeds E.164
        assert!(matches!(parse("+971", "1234567890123"), Err(AppError::Validation(_))));
        assert!(matches!(parse("+1", ""), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_country_code_rules() {
        assert!(matches!(parse("", "5550100"), Err(AppError::Validation(_))));
        assert!(matches!(parse("+0", "5550100"), Err(AppError::Validation(_))));
        assert!(matches!(parse("+1234", "5550100"), Err(AppError::Validation(_))));
        assert!(matches!(parse("+1a", "5550100"), Err(AppError::Validation(_))));
        // Well formed but not on the allow-list
        assert!(matches!(parse("+999", "5550100"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_masked_hides_leading_digits() {
        let phone = parse("+1", "5550100").unwrap();
        assert_eq!(phone.masked(), "+1***0100");
    }

    #[test]
    fn test_serializes_as_normalized_string() {
        let phone = parse("+1", "5550100").unwrap();
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"+15550100\"");
    }
}
