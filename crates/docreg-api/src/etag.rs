//! Entity tags for JSON representations.
//!
//! The tag is the SHA-256 of the serialised body, so any visible change to an
//! entity changes its tag.

use axum::{
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a strong ETag over `body`.
pub fn compute_etag(body: &[u8]) -> String {
  let hash = Sha256::digest(body);
  format!("\"{}\"", hex::encode(hash))
}

/// Whether an `If-None-Match` header value matches `etag`. Weak and
/// unquoted tags compare by their opaque part.
pub fn none_match(header_value: &str, etag: &str) -> bool {
  let bare = |tag: &str| {
    let tag = tag.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.trim_matches('"').to_string()
  };
  let wanted = bare(etag);
  header_value
    .split(',')
    .any(|candidate| candidate.trim() == "*" || bare(candidate) == wanted)
}

/// `200` with the JSON body and its ETag, or `304` when the client's copy is
/// current.
pub fn respond<T: Serialize>(headers: &HeaderMap, value: &T) -> Response {
  let body = match serde_json::to_vec(value) {
    Ok(body) => body,
    Err(e) => {
      tracing::error!(error = %e, "failed to serialise response");
      return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
  };
  let etag = compute_etag(&body);
  let not_modified = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| none_match(v, &etag));

  let mut res = if not_modified {
    StatusCode::NOT_MODIFIED.into_response()
  } else {
    let mut res = (StatusCode::OK, body).into_response();
    res.headers_mut().insert(
      header::CONTENT_TYPE,
      HeaderValue::from_static("application/json"),
    );
    res
  };
  if let Ok(value) = HeaderValue::from_str(&etag) {
    res.headers_mut().insert(header::ETAG, value);
  }
  res
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tag_is_quoted_sha256() {
    let tag = compute_etag(b"{}");
    assert_eq!(tag.len(), 66);
    assert!(tag.starts_with('"') && tag.ends_with('"'));
    assert_eq!(tag, compute_etag(b"{}"));
    assert_ne!(tag, compute_etag(b"{\"a\":1}"));
  }

  #[test]
  fn if_none_match_forms() {
    let tag = compute_etag(b"x");
    let bare = tag.trim_matches('"').to_string();
    assert!(none_match(&tag, &tag));
    assert!(none_match(&bare, &tag));
    assert!(none_match(&format!("W/{tag}"), &tag));
    assert!(none_match(&format!("\"other\", {tag}"), &tag));
    assert!(none_match("*", &tag));
    assert!(!none_match("\"other\"", &tag));
  }

  #[test]
  fn matching_tag_is_not_modified() {
    let value = serde_json::json!({ "title": "s" });
    let first = respond(&HeaderMap::new(), &value);
    assert_eq!(first.status(), StatusCode::OK);
    let tag = first.headers().get(header::ETAG).unwrap().clone();

    let mut headers = HeaderMap::new();
    headers.insert(header::IF_NONE_MATCH, tag.clone());
    let second = respond(&headers, &value);
    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(second.headers().get(header::ETAG), Some(&tag));
  }
}
