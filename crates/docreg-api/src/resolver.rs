//! HTTP lookups for document types and linked objects.

use std::time::Duration;

use docreg_core::{
  document::Confidentiality,
  relation::ObjectKind,
  resolver::{DocumentTypeInfo, DocumentTypeResolver, ObjectResolver, ResolveError},
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Resolves external URLs with a shared [`reqwest::Client`].
///
/// Cheap to clone; the inner client is `Arc`-based.
#[derive(Clone)]
pub struct HttpResolver {
  client: Client,
}

/// The fields of a document-type resource the registry reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentTypeBody {
  published:               bool,
  default_confidentiality: Confidentiality,
}

impl HttpResolver {
  /// Every request, connect included, is bounded by `timeout`.
  pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client })
  }

  async fn fetch(&self, url: &str) -> Result<serde_json::Value, ResolveError> {
    debug!(url, "resolving");
    let resp = self.client.get(url).send().await.map_err(|e| transport(url, e))?;
    check_status(url, resp.status())?;
    resp.json().await.map_err(|e| {
      if e.is_timeout() {
        ResolveError::Timeout(url.to_owned())
      } else {
        invalid(url, format!("response is not JSON: {e}"))
      }
    })
  }
}

impl DocumentTypeResolver for HttpResolver {
  async fn document_type<'a>(&'a self, url: &'a str) -> Result<DocumentTypeInfo, ResolveError> {
    let body = self.fetch(url).await?;
    parse_document_type(url, body)
  }
}

impl ObjectResolver for HttpResolver {
  async fn object<'a>(&'a self, url: &'a str, kind: ObjectKind) -> Result<(), ResolveError> {
    let body = self.fetch(url).await?;
    if body.is_object() {
      Ok(())
    } else {
      Err(invalid(url, format!("expected a {} resource", kind.as_ref())))
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn invalid(url: &str, reason: impl Into<String>) -> ResolveError {
  ResolveError::InvalidResource { url: url.to_owned(), reason: reason.into() }
}

fn transport(url: &str, e: reqwest::Error) -> ResolveError {
  if e.is_timeout() {
    ResolveError::Timeout(url.to_owned())
  } else if e.is_builder() {
    invalid(url, "not a valid URL")
  } else {
    ResolveError::Unreachable { url: url.to_owned(), reason: e.to_string() }
  }
}

fn check_status(url: &str, status: StatusCode) -> Result<(), ResolveError> {
  match status {
    s if s.is_success() => Ok(()),
    StatusCode::NOT_FOUND | StatusCode::GONE => Err(invalid(url, format!("{status}"))),
    StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
      Err(ResolveError::Timeout(url.to_owned()))
    }
    _ => Err(ResolveError::Unreachable { url: url.to_owned(), reason: status.to_string() }),
  }
}

fn parse_document_type(
  url: &str,
  body: serde_json::Value,
) -> Result<DocumentTypeInfo, ResolveError> {
  let body: DocumentTypeBody = serde_json::from_value(body)
    .map_err(|e| invalid(url, format!("not a document type: {e}")))?;
  Ok(DocumentTypeInfo {
    url:                     url.to_owned(),
    published:               body.published,
    default_confidentiality: body.default_confidentiality,
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  const URL: &str = "https://catalogue.example/documenttypes/1";

  #[test]
  fn document_type_fields_are_read() {
    let info = parse_document_type(
      URL,
      json!({ "published": true, "defaultConfidentiality": "CONFIDENTIAL", "name": "letter" }),
    )
    .unwrap();
    assert!(info.published);
    assert_eq!(info.default_confidentiality, Confidentiality::Confidential);
    assert_eq!(info.url, URL);
  }

  #[test]
  fn wrong_shape_is_an_invalid_resource() {
    let err = parse_document_type(URL, json!({ "published": "yes" })).unwrap_err();
    assert!(matches!(err, ResolveError::InvalidResource { .. }));
  }

  #[test]
  fn statuses_map_to_resolve_errors() {
    assert!(check_status(URL, StatusCode::OK).is_ok());
    assert!(matches!(
      check_status(URL, StatusCode::NOT_FOUND),
      Err(ResolveError::InvalidResource { .. })
    ));
    assert!(matches!(
      check_status(URL, StatusCode::GATEWAY_TIMEOUT),
      Err(ResolveError::Timeout(_))
    ));
    assert!(matches!(
      check_status(URL, StatusCode::INTERNAL_SERVER_ERROR),
      Err(ResolveError::Unreachable { .. })
    ));
  }
}
