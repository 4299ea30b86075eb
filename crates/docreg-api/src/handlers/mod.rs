//! Route handlers, one module per resource.

pub mod documents;
pub mod object_links;
pub mod parts;
pub mod sendings;
pub mod usage_rights;

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use docreg_registry::Backend;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{AppState, views::Urls};

pub(crate) fn urls<K: Backend>(state: &AppState<K>) -> Urls<'_> { Urls(state.config.base()) }

/// `201 Created` with a `Location` header.
pub(crate) fn created<T: Serialize>(location: &str, value: T) -> Response {
  let mut res = (StatusCode::CREATED, Json(value)).into_response();
  if let Ok(location) = HeaderValue::from_str(location) {
    res.headers_mut().insert(header::LOCATION, location);
  }
  res
}

/// Tells an explicit `null` (`Some(None)`) apart from an absent field
/// (`None`). Use with `#[serde(default)]`.
pub(crate) fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(d).map(Some)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Deserialize)]
  struct Body {
    #[serde(default, deserialize_with = "nullable")]
    field: Option<Option<String>>,
  }

  #[test]
  fn absent_null_and_value_are_distinct() {
    let parse = |s: &str| serde_json::from_str::<Body>(s).unwrap().field;
    assert_eq!(parse("{}"), None);
    assert_eq!(parse(r#"{"field":null}"#), Some(None));
    assert_eq!(parse(r#"{"field":"x"}"#), Some(Some("x".to_string())));
  }
}
