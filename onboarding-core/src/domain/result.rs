//! Result and error types for the core library
//!
//! Every expected failure (field validation, business rule, concurrency,
//! lifecycle) travels as an [`ErrorAggregate`]: an ordered list of
//! `(field, code)` entries. Boundary failures (storage, config, IO) have their
//! own variants on [`Error`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad family an [`ErrorCode`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Field-local, always collected, fixed by resubmitting input
    Validation,
    /// Entity/process rule, raised one at a time after validation passes
    Business,
    /// Stale concurrency token; re-read and retry
    Concurrency,
    /// Mutation attempted on a deactivated entity
    Lifecycle,
}

/// Error codes reported inside an [`ErrorAggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ErrorCode {
    // === Field validation ===
    Required,
    LengthInvalid,
    RegexInvalid,
    ZeroInvalid,
    NegativeInvalid,
    DecimalsInvalid,

    // === Business rules ===
    PasswordMismatch,
    PasswordIncorrect,
    CardAlreadyLinked,
    DocumentAlreadyExists,
    ClienteYaRegistrado,
    TransactionTypeUnavailable,
    InsufficientFunds,
    AmountOutOfRange,
    StatusInvalid,
    ConsentRequired,
    VerificationNotFound,
    VerificationAlreadyVerified,
    VerificationExpired,
    VerificationCodeMismatch,

    // === Concurrency ===
    ConcurrencyError,

    // === Lifecycle ===
    EntityInactive,
}

impl ErrorCode {
    /// Wire representation of the code (e.g. `"LENGTH-INVALID"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Required => "REQUIRED",
            ErrorCode::LengthInvalid => "LENGTH-INVALID",
            ErrorCode::RegexInvalid => "REGEX-INVALID",
            ErrorCode::ZeroInvalid => "ZERO-INVALID",
            ErrorCode::NegativeInvalid => "NEGATIVE-INVALID",
            ErrorCode::DecimalsInvalid => "DECIMALS-INVALID",
            ErrorCode::PasswordMismatch => "PASSWORD-MISMATCH",
            ErrorCode::PasswordIncorrect => "PASSWORD-INCORRECT",
            ErrorCode::CardAlreadyLinked => "CARD-ALREADY-LINKED",
            ErrorCode::DocumentAlreadyExists => "DOCUMENT-ALREADY-EXISTS",
            ErrorCode::ClienteYaRegistrado => "CLIENTE-YA-REGISTRADO",
            ErrorCode::TransactionTypeUnavailable => "TRANSACTION-TYPE-UNAVAILABLE",
            ErrorCode::InsufficientFunds => "INSUFFICIENT-FUNDS",
            ErrorCode::AmountOutOfRange => "AMOUNT-OUT-OF-RANGE",
            ErrorCode::StatusInvalid => "STATUS-INVALID",
            ErrorCode::ConsentRequired => "CONSENT-REQUIRED",
            ErrorCode::VerificationNotFound => "VERIFICATION-NOT-FOUND",
            ErrorCode::VerificationAlreadyVerified => "VERIFICATION-ALREADY-VERIFIED",
            ErrorCode::VerificationExpired => "VERIFICATION-EXPIRED",
            ErrorCode::VerificationCodeMismatch => "VERIFICATION-CODE-MISMATCH",
            ErrorCode::ConcurrencyError => "CONCURRENCY-ERROR",
            ErrorCode::EntityInactive => "ENTITY-INACTIVE",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::Required
            | ErrorCode::LengthInvalid
            | ErrorCode::RegexInvalid
            | ErrorCode::ZeroInvalid
            | ErrorCode::NegativeInvalid
            | ErrorCode::DecimalsInvalid => ErrorCategory::Validation,
            ErrorCode::ConcurrencyError => ErrorCategory::Concurrency,
            ErrorCode::EntityInactive => ErrorCategory::Lifecycle,
            _ => ErrorCategory::Business,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(field, code)` entry
///
/// For business, concurrency and lifecycle errors `field` names the entity or
/// rule the error belongs to rather than an input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: ErrorCode,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            field: field.into(),
            code,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.code, self.field)
    }
}

/// Ordered set of errors raised by a constructor, mutator or service step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAggregate {
    errors: Vec<FieldError>,
}

impl ErrorAggregate {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Aggregate holding exactly one entry
    pub fn single(field: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            errors: vec![FieldError::new(field, code)],
        }
    }

    /// Stale or undecodable concurrency token for `entity`
    pub fn concurrency(entity: &str) -> Self {
        Self::single(entity, ErrorCode::ConcurrencyError)
    }

    /// Mutation attempted on a deactivated `entity`
    pub fn inactive(entity: &str) -> Self {
        Self::single(entity, ErrorCode::EntityInactive)
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// True when `field` carries `code`
    pub fn has(&self, field: &str, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.field == field && e.code == code)
    }

    /// `Ok(())` when nothing was collected, the aggregate otherwise
    pub fn into_result(self) -> std::result::Result<(), ErrorAggregate> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        f.write_str(&rendered.join(", "))
    }
}

impl std::error::Error for ErrorAggregate {}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Domain error: {0}")]
    Domain(#[from] ErrorAggregate),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The carried aggregate, if this is a domain error
    pub fn aggregate(&self) -> Option<&ErrorAggregate> {
        match self {
            Error::Domain(agg) => Some(agg),
            _ => None,
        }
    }

    /// Codes of the carried aggregate (empty for boundary errors)
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.aggregate().map(|a| a.codes()).unwrap_or_default()
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.aggregate().is_some_and(|a| a.contains(code))
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        self.has_code(ErrorCode::ConcurrencyError)
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            errors: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            errors: None,
        }
    }

    /// Create a failed result carrying the aggregate's entries
    pub fn fail_with_errors(error: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            errors: Some(errors),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(Error::Domain(agg)) => {
                let message = agg.to_string();
                Self::fail_with_errors(message, agg.into_errors())
            }
            Err(e) => Self::fail(e.to_string()),
        }
    }
}
