//! Lookups against external services: document types and linked objects.
//!
//! Both are blocking calls from the registry's point of view; implementations
//! own timeouts. [`ResolveError::Timeout`] is the only retryable failure.

use std::future::Future;

use thiserror::Error;

use crate::{document::Confidentiality, relation::ObjectKind};

/// The parts of an external document type the registry depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTypeInfo {
  pub url:                     String,
  /// Only published types may be used for new documents.
  pub published:               bool,
  /// Applied when a new document omits `confidentiality`.
  pub default_confidentiality: Confidentiality,
}

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
  /// The URL answered, but not with a resource of the expected shape.
  #[error("{url} is not a valid resource: {reason}")]
  InvalidResource { url: String, reason: String },

  #[error("request to {0} timed out")]
  Timeout(String),

  #[error("{url} is unreachable: {reason}")]
  Unreachable { url: String, reason: String },
}

impl ResolveError {
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Timeout(_)) }
}

pub trait DocumentTypeResolver: Send + Sync {
  fn document_type<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<DocumentTypeInfo, ResolveError>> + Send + 'a;
}

pub trait ObjectResolver: Send + Sync {
  /// Confirm that `url` names an existing object of `kind`.
  fn object<'a>(
    &'a self,
    url: &'a str,
    kind: ObjectKind,
  ) -> impl Future<Output = Result<(), ResolveError>> + Send + 'a;
}
