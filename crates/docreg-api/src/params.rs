//! Query-string and path parsing with field-level errors.

use std::{collections::BTreeMap, str::FromStr};

use axum::{
  extract::{FromRequestParts, Path, Query},
  http::request::Parts,
};
use chrono::{DateTime, NaiveDate, Utc};
use docreg_core::validation::{ValidationCode, ValidationErrors};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Path id ─────────────────────────────────────────────────────────────────

/// The `{id}` path segment. Anything that is not a UUID names nothing.
pub struct Id(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for Id {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let Path(raw) = Path::<String>::from_request_parts(parts, state)
      .await
      .map_err(|e| ApiError::Malformed(e.body_text()))?;
    Uuid::parse_str(&raw)
      .map(Id)
      .map_err(|_| ApiError::Registry(docreg_registry::Error::not_found("resource", raw)))
  }
}

// ─── Query parameters ────────────────────────────────────────────────────────

/// Raw query parameters. The last value wins for repeated keys.
#[derive(Debug, Default)]
pub struct Params(BTreeMap<String, String>);

impl<S: Send + Sync> FromRequestParts<S> for Params {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
      .map_err(|e| ApiError::Malformed(e.body_text()))?;
    Ok(Self(pairs.into_iter().collect()))
  }
}

impl Params {
  /// Fail with `unknown-parameters` if any key is not in `allowed`.
  pub fn allow(&self, allowed: &[&str]) -> Result<(), ApiError> {
    let unknown: Vec<&str> = self
      .0
      .keys()
      .map(String::as_str)
      .filter(|k| !allowed.contains(k))
      .collect();
    if unknown.is_empty() {
      Ok(())
    } else {
      Err(ApiError::invalid(
        "nonFieldErrors",
        ValidationCode::UnknownParameters,
        format!("unexpected query parameters: {}", unknown.join(", ")),
      ))
    }
  }

  pub fn get(&self, name: &str) -> Option<&str> { self.0.get(name).map(String::as_str) }

  pub fn string(&self, name: &str) -> Option<String> { self.get(name).map(str::to_owned) }

  /// Query string for a link to another page of the same listing.
  pub fn with_page(&self, page: usize) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = self
      .0
      .iter()
      .filter(|(k, _)| k.as_str() != "page")
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    pairs.push(("page".to_string(), page.to_string()));
    pairs
  }
}

// ─── Value parsers ───────────────────────────────────────────────────────────

/// Collects every field error of one request before failing.
#[derive(Default)]
pub struct Parser {
  pub errors: ValidationErrors,
}

impl Parser {
  pub fn new() -> Self { Self::default() }

  /// Parse a string enum; unknown values are `invalid_choice`.
  pub fn choice<T: FromStr>(&mut self, name: &str, value: &str) -> Option<T> {
    match value.parse() {
      Ok(v) => Some(v),
      Err(_) => {
        self.errors.push(
          name,
          ValidationCode::InvalidChoice,
          format!("\"{value}\" is not a valid choice"),
        );
        None
      }
    }
  }

  pub fn date(&mut self, name: &str, value: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
      Ok(d) => Some(d),
      Err(_) => {
        self.errors.push(name, ValidationCode::Invalid, "expected a date as YYYY-MM-DD");
        None
      }
    }
  }

  pub fn datetime(&mut self, name: &str, value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
      Ok(d) => Some(d.with_timezone(&Utc)),
      Err(_) => {
        self.errors.push(name, ValidationCode::Invalid, "expected an ISO-8601 timestamp");
        None
      }
    }
  }

  pub fn number<T: FromStr>(&mut self, name: &str, value: &str) -> Option<T> {
    match value.parse() {
      Ok(v) => Some(v),
      Err(_) => {
        self.errors.push(name, ValidationCode::Invalid, "expected a number");
        None
      }
    }
  }

  /// A document reference: its URL or its bare id.
  pub fn identity(&mut self, name: &str, value: &str) -> Option<Uuid> {
    match identity_id(value) {
      Some(id) => Some(id),
      None => {
        self.errors.push(
          name,
          ValidationCode::InvalidResource,
          format!("{value} is not a document URL"),
        );
        None
      }
    }
  }

  pub fn require<T>(&mut self, name: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
      self.errors.push(name, ValidationCode::Required, "this field is required");
    }
    value
  }

  /// [`Self::require`] when `required`, otherwise pass `value` through.
  pub fn field<T>(&mut self, name: &str, value: Option<T>, required: bool) -> Option<T> {
    if required { self.require(name, value) } else { value }
  }

  pub fn finish(self) -> Result<(), ApiError> { self.errors.into_result().map_err(ApiError::from) }
}

/// The trailing path segment of a URL (or the string itself), as a UUID.
pub fn identity_id(value: &str) -> Option<Uuid> {
  let path = value.split(['?', '#']).next().unwrap_or_default();
  let last = path.trim_end_matches('/').rsplit('/').next()?;
  Uuid::parse_str(last).ok()
}
