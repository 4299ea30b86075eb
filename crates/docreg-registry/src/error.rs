//! Error type returned by every service operation.

use docreg_core::{
  Conflict,
  resolver::ResolveError,
  validation::{ValidationCode, ValidationErrors},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Invalid(ValidationErrors),

  #[error("{kind} not found: {id}")]
  NotFound { kind: &'static str, id: String },

  /// The caller lacks the scope, or the entity is outside its grants.
  #[error("forbidden")]
  Forbidden,

  #[error("conflict: {0}")]
  Conflict(#[from] Conflict),

  #[error("{field} must be unique")]
  Unique { field: &'static str },

  /// The selected revision has no body (an abandoned upload).
  #[error("the revision has no content")]
  NoContent,

  #[error("upstream error: {0}")]
  Upstream(ResolveError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("blob error: {0}")]
  Blob(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
    Self::NotFound { kind, id: id.to_string() }
  }

  pub fn invalid(name: &str, code: ValidationCode, reason: impl Into<String>) -> Self {
    Self::Invalid(ValidationErrors::single(name, code, reason))
  }

  /// Convert a repository error through the domain error.
  pub fn store<E: Into<docreg_core::Error>>(e: E) -> Self {
    Self::from(Into::<docreg_core::Error>::into(e))
  }

  pub fn blob<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Blob(Box::new(e))
  }

  /// Map a resolver failure for the field `name`. A resource of the wrong
  /// shape is the client's fault; anything else is upstream.
  pub fn resolve(name: &str, e: ResolveError) -> Self {
    match e {
      ResolveError::InvalidResource { url, reason } => Self::invalid(
        name,
        ValidationCode::InvalidResource,
        format!("{url} is not a valid resource: {reason}"),
      ),
      other => Self::Upstream(other),
    }
  }
}

impl From<ValidationErrors> for Error {
  fn from(e: ValidationErrors) -> Self { Self::Invalid(e) }
}

impl From<docreg_core::Error> for Error {
  fn from(e: docreg_core::Error) -> Self {
    use docreg_core::Error as Core;
    match e {
      Core::NotFound { kind, id } => Self::NotFound { kind, id },
      Core::Conflict(c) => Self::Conflict(c),
      Core::Unique { field } => Self::Unique { field },
      Core::Invalid(errors) => Self::Invalid(errors),
      Core::Serialization(e) => Self::Store(Box::new(e)),
      Core::Backend(e) => Self::Store(e),
    }
  }
}
