//! Field-level validation shared by model constructors and services.
//!
//! # Invariants
//! - Normalizers return the canonical stored form (trimmed, digits-only CPF,
//!   lowercase email) or a `ValidationError`.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

const CPF_LEN: usize = 11;

/// Stored dates are `YYYY-MM-DD` text compared lexically in SQL.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Rejected input value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text field is empty after trim.
    Blank { field: &'static str },
    /// CPF has wrong length, repeated digits or bad check digits.
    InvalidCpf,
    InvalidEmail(String),
    /// `field` is earlier than `reference`.
    DateOrder {
        field: &'static str,
        reference: &'static str,
    },
    /// Date year has no four-digit text form.
    DateOutOfRange { field: &'static str },
    /// Reference points at a catalog entry of another kind.
    WrongCatalogKind {
        field: &'static str,
        expected: &'static str,
    },
    /// Catalog kind has no parent, but one was given.
    UnexpectedParent { kind: &'static str },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank { field } => write!(f, "{field} must not be blank"),
            Self::InvalidCpf => write!(f, "cpf is invalid"),
            Self::InvalidEmail(value) => write!(f, "email is invalid: `{value}`"),
            Self::DateOrder { field, reference } => {
                write!(f, "{field} must not be earlier than {reference}")
            }
            Self::DateOutOfRange { field } => {
                write!(f, "{field} must fall between years 0000 and 9999")
            }
            Self::WrongCatalogKind { field, expected } => {
                write!(f, "{field} must reference a {expected} entry")
            }
            Self::UnexpectedParent { kind } => write!(f, "{kind} entries take no parent"),
        }
    }
}

impl Error for ValidationError {}

/// Trims `value` and rejects empty input.
pub fn require_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank { field });
    }
    Ok(trimmed.to_string())
}

/// Trims optional text, mapping blank input to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

/// Rejects dates whose text form would not sort chronologically.
pub fn storable_date(field: &'static str, date: NaiveDate) -> Result<NaiveDate, ValidationError> {
    if STORABLE_YEARS.contains(&date.year()) {
        Ok(date)
    } else {
        Err(ValidationError::DateOutOfRange { field })
    }
}

/// Normalizes a CPF to its 11 digits and verifies both check digits.
///
/// Punctuation (`.` `-` and spaces) is accepted on input.
pub fn normalize_cpf(value: &str) -> Result<String, ValidationError> {
    let mut digits = Vec::with_capacity(CPF_LEN);
    for ch in value.trim().chars() {
        match ch {
            '0'..='9' => digits.push(ch as u32 - '0' as u32),
            '.' | '-' | ' ' => {}
            _ => return Err(ValidationError::InvalidCpf),
        }
    }

    if digits.len() != CPF_LEN || digits.iter().all(|digit| *digit == digits[0]) {
        return Err(ValidationError::InvalidCpf);
    }
    if cpf_check_digit(&digits[..9]) != digits[9] || cpf_check_digit(&digits[..10]) != digits[10] {
        return Err(ValidationError::InvalidCpf);
    }

    Ok(digits
        .iter()
        .filter_map(|digit| char::from_digit(*digit, 10))
        .collect())
}

fn cpf_check_digit(prefix: &[u32]) -> u32 {
    let top_weight = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(index, digit)| digit * (top_weight - index as u32))
        .sum();
    let remainder = (sum * 10) % 11;
    if remainder == 10 {
        0
    } else {
        remainder
    }
}

/// Trims and lowercases an email address after a shape check.
pub fn normalize_email(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank { field: "email" });
    }
    if !EMAIL_RE.is_match(trimmed) {
        return Err(ValidationError::InvalidEmail(trimmed.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{
        normalize_cpf, normalize_email, optional_text, require_text, storable_date,
        ValidationError,
    };
    use chrono::NaiveDate;

    #[test]
    fn cpf_accepts_punctuated_and_bare_forms() {
        assert_eq!(normalize_cpf("529.982.247-25").unwrap(), "52998224725");
        assert_eq!(normalize_cpf("11144477735").unwrap(), "11144477735");
    }

    #[test]
    fn cpf_rejects_bad_check_digits_and_repeated_digits() {
        assert_eq!(normalize_cpf("529.982.247-26"), Err(ValidationError::InvalidCpf));
        assert_eq!(normalize_cpf("111.111.111-11"), Err(ValidationError::InvalidCpf));
        assert_eq!(normalize_cpf("1234"), Err(ValidationError::InvalidCpf));
        assert_eq!(normalize_cpf("529a98224725"), Err(ValidationError::InvalidCpf));
    }

    #[test]
    fn email_is_lowercased_and_shape_checked() {
        assert_eq!(
            normalize_email("  Ana.Souza@Escola.EDU.br ").unwrap(),
            "ana.souza@escola.edu.br"
        );
        assert!(matches!(
            normalize_email("ana@escola"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert_eq!(
            normalize_email("   "),
            Err(ValidationError::Blank { field: "email" })
        );
    }

    #[test]
    fn text_helpers_trim_input() {
        assert_eq!(require_text("name", "  Ana ").unwrap(), "Ana");
        assert_eq!(
            require_text("name", " \t"),
            Err(ValidationError::Blank { field: "name" })
        );
        assert_eq!(optional_text(Some("  ")), None);
        assert_eq!(optional_text(Some(" x ")).as_deref(), Some("x"));
        assert_eq!(optional_text(None), None);
    }

    #[test]
    fn dates_outside_four_digit_years_are_rejected() {
        let last = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();
        assert_eq!(storable_date("loan_date", last), Ok(last));
        assert_eq!(
            storable_date("loan_date", NaiveDate::from_ymd_opt(10000, 1, 1).unwrap()),
            Err(ValidationError::DateOutOfRange { field: "loan_date" })
        );
        assert_eq!(
            storable_date("loan_date", NaiveDate::from_ymd_opt(-1, 6, 1).unwrap()),
            Err(ValidationError::DateOutOfRange { field: "loan_date" })
        );
    }
}
