//! Field validation engine
//!
//! Constructors and mutators declare a rule list per field and run every field
//! through a [`Validator`]. Nothing short-circuits across fields: a payload with
//! five bad fields yields five entries, in the order the fields were declared.
//! Within a single field the first failing rule is the one reported.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use super::result::{ErrorAggregate, ErrorCode, FieldError};

/// A single predicate applied to a field value
#[derive(Debug, Clone, Copy)]
pub enum Rule<'a> {
    /// Value present and, for text, not blank
    Required,
    /// Text length in characters, inclusive bounds
    Length { min: usize, max: usize },
    /// Text must match the (anchored) pattern
    Regex(&'a Regex),
    NumericSign { allow_zero: bool, allow_negative: bool },
    /// At most `max_places` significant decimals; trailing zeros do not count
    DecimalPrecision { max_places: u32 },
}

impl<'a> Rule<'a> {
    pub fn length(min: usize, max: usize) -> Self {
        Rule::Length { min, max }
    }

    /// Strictly positive amounts
    pub fn positive() -> Self {
        Rule::NumericSign {
            allow_zero: false,
            allow_negative: false,
        }
    }

    pub fn non_negative() -> Self {
        Rule::NumericSign {
            allow_zero: true,
            allow_negative: false,
        }
    }

    pub fn decimals(max_places: u32) -> Self {
        Rule::DecimalPrecision { max_places }
    }

    fn evaluate(&self, value: &FieldValue<'_>) -> Option<ErrorCode> {
        if let Rule::Required = self {
            return (!value.is_present()).then_some(ErrorCode::Required);
        }
        match (self, value) {
            (Rule::Length { min, max }, FieldValue::Text(text)) => {
                let len = text.chars().count();
                (len < *min || len > *max).then_some(ErrorCode::LengthInvalid)
            }
            (Rule::Regex(pattern), FieldValue::Text(text)) => {
                (!pattern.is_match(text)).then_some(ErrorCode::RegexInvalid)
            }
            (
                Rule::NumericSign {
                    allow_zero,
                    allow_negative,
                },
                FieldValue::Number(n),
            ) => {
                if n.is_zero() && !allow_zero {
                    Some(ErrorCode::ZeroInvalid)
                } else if n.is_sign_negative() && !n.is_zero() && !allow_negative {
                    Some(ErrorCode::NegativeInvalid)
                } else {
                    None
                }
            }
            (Rule::DecimalPrecision { max_places }, FieldValue::Number(n)) => {
                (n.normalize().scale() > *max_places).then_some(ErrorCode::DecimalsInvalid)
            }
            // Absent values and rules that do not apply to the value's kind
            _ => None,
        }
    }
}

/// Value handed to the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Absent,
    Text(&'a str),
    Number(Decimal),
    Date(NaiveDate),
    /// Present but opaque (binary payloads, enums)
    Present,
}

impl FieldValue<'_> {
    fn is_present(&self) -> bool {
        match self {
            FieldValue::Absent => false,
            FieldValue::Text(text) => !text.trim().is_empty(),
            _ => true,
        }
    }
}

impl<'a> From<&'a str> for FieldValue<'a> {
    fn from(value: &'a str) -> Self {
        FieldValue::Text(value)
    }
}

impl<'a> From<&'a String> for FieldValue<'a> {
    fn from(value: &'a String) -> Self {
        FieldValue::Text(value.as_str())
    }
}

impl<'a> From<Option<&'a str>> for FieldValue<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Text)
    }
}

impl<'a> From<&'a Option<String>> for FieldValue<'a> {
    fn from(value: &'a Option<String>) -> Self {
        value.as_deref().into()
    }
}

impl From<Decimal> for FieldValue<'_> {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

impl From<Option<Decimal>> for FieldValue<'_> {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Number)
    }
}

impl From<NaiveDate> for FieldValue<'_> {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<Option<NaiveDate>> for FieldValue<'_> {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Date)
    }
}

/// Run `rules` against one field
///
/// Returns at most one entry: the first rule that fails.
pub fn validate(field: &str, value: FieldValue<'_>, rules: &[Rule<'_>]) -> Vec<FieldError> {
    rules
        .iter()
        .find_map(|rule| rule.evaluate(&value))
        .map(|code| vec![FieldError::new(field, code)])
        .unwrap_or_default()
}

/// Collects field errors across a whole payload
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<'v>(
        &mut self,
        name: &str,
        value: impl Into<FieldValue<'v>>,
        rules: &[Rule<'_>],
    ) -> &mut Self {
        self.errors.extend(validate(name, value.into(), rules));
        self
    }

    /// Record `code` against `name` when `ok` is false
    pub fn check(&mut self, name: &str, ok: bool, code: ErrorCode) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(name, code));
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&mut self) -> Result<(), ErrorAggregate> {
        ErrorAggregate::new(std::mem::take(&mut self.errors)).into_result()
    }
}

/// Truncate a currency amount to two decimals, toward zero
pub fn truncar_moneda(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Patterns shared by entity validators
pub mod patterns {
    use super::*;

    /// Ten-digit national number
    pub static TELEFONO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{10}$").unwrap());

    /// International dialing prefix without the plus sign
    pub static CODIGO_PAIS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\d{1,3}$").unwrap());

    pub static CORREO: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap()
    });

    pub static CURP: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Z]{4}\d{6}[HM][A-Z]{5}[A-Z0-9]\d$").unwrap());

    /// Persona fisica (13) or moral (12)
    pub static RFC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-ZÑ&]{3,4}\d{6}[A-Z0-9]{3}$").unwrap());

    pub static CODIGO_POSTAL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\d{5}$").unwrap());

    pub static ULTIMOS_DIGITOS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());

    pub static CODIGO_2FA: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[1-9]{4}$").unwrap());

    /// At least one letter and one digit
    pub fn password_fuerte(password: &str) -> bool {
        password.chars().any(|c| c.is_alphabetic()) && password.chars().any(|c| c.is_ascii_digit())
    }
}
