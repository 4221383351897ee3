//! Failure taxonomy for dataset fetches.

use reqwest::StatusCode;
use thiserror::Error;

use crate::cache::CacheError;

use super::api_types::ApiErrorBody;

/// Error body `status` sent when the caller failed to authenticate.
pub const AUTHENTICATION_ERROR: &str = "AUTH_ERROR";
/// Error body `status` sent when the server failed internally.
pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";

/// Category of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
  AuthenticationError,
  InternalServerError,
  /// Could not connect, or offline with nothing cached
  ConnectionError,
  /// Error body carried a status we don't recognize
  UnexpectedError,
  /// Well-formed response with `success: false`
  DatastoreUnsuccessful,
  /// Non-2xx response whose body isn't a `{status, message}` record
  ErrorBodyParseFailure,
  /// Anything else: timeouts, undecodable success bodies
  GeneralError,
}

impl ErrorCategory {
  /// Human-readable message shown to users.
  pub fn message(&self) -> &'static str {
    match self {
      ErrorCategory::AuthenticationError => "Error occurred while authenticating",
      ErrorCategory::InternalServerError => "Internal server error",
      ErrorCategory::ConnectionError => "Connection error",
      ErrorCategory::UnexpectedError | ErrorCategory::ErrorBodyParseFailure => {
        "Unexpected error occurred"
      }
      ErrorCategory::DatastoreUnsuccessful => "Datastore response not successful",
      ErrorCategory::GeneralError => "Error occurred",
    }
  }

  fn from_error_status(status: &str) -> Self {
    match status {
      AUTHENTICATION_ERROR => ErrorCategory::AuthenticationError,
      INTERNAL_SERVER_ERROR => ErrorCategory::InternalServerError,
      _ => ErrorCategory::UnexpectedError,
    }
  }
}

/// A classified fetch failure.
///
/// `Display` yields the category's fixed message; the server message and
/// underlying error stay available for programmatic callers and logs.
#[derive(Debug, Error)]
#[error("{}", .category.message())]
pub struct FetchError {
  pub category: ErrorCategory,
  /// HTTP status, if a response was received
  pub status: Option<StatusCode>,
  /// Message from the server or transport
  pub detail: Option<String>,
  #[source]
  source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FetchError {
  pub fn new(category: ErrorCategory) -> Self {
    Self {
      category,
      status: None,
      detail: None,
      source: None,
    }
  }

  pub fn with_status(mut self, status: StatusCode) -> Self {
    self.status = Some(status);
    self
  }

  pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
    self.detail = Some(detail.into());
    self
  }

  pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
    self.detail.get_or_insert_with(|| source.to_string());
    self.source = Some(Box::new(source));
    self
  }

  pub fn message(&self) -> &'static str {
    self.category.message()
  }

  /// Classify a non-2xx response from its `{status, message}` body.
  ///
  /// An unparseable body is its own category rather than a crash.
  pub fn from_error_response(status: StatusCode, body: &[u8]) -> Self {
    match serde_json::from_slice::<ApiErrorBody>(body) {
      Ok(error_body) => {
        let category = ErrorCategory::from_error_status(&error_body.status);
        FetchError::new(category)
          .with_status(status)
          .with_detail(format!("{} {}", error_body.status, error_body.message))
      }
      Err(e) => FetchError::new(ErrorCategory::ErrorBodyParseFailure)
        .with_status(status)
        .with_source(e),
    }
  }
}

impl From<CacheError> for FetchError {
  fn from(err: CacheError) -> Self {
    match err {
      CacheError::Unsatisfiable { url } => FetchError::new(ErrorCategory::ConnectionError)
        .with_detail(format!("offline and no cached response for {}", url)),
      CacheError::NotModifiedWithoutEntry { url } => FetchError::new(ErrorCategory::GeneralError)
        .with_status(StatusCode::NOT_MODIFIED)
        .with_detail(format!("304 Not Modified with nothing cached for {}", url)),
      CacheError::Network(e) if e.is_connect() => {
        FetchError::new(ErrorCategory::ConnectionError).with_source(e)
      }
      CacheError::Network(e) => FetchError::new(ErrorCategory::GeneralError).with_source(e),
    }
  }
}
