//! API error type and its `application/problem+json` rendering.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use docreg_core::validation::{FieldError, ValidationCode, ValidationErrors};
use docreg_registry::Error as RegistryError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error("authentication required")]
  Unauthenticated,

  #[error("request body too large")]
  PayloadTooLarge,

  /// The request could not be parsed at all.
  #[error("malformed request: {0}")]
  Malformed(String),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

impl From<ValidationErrors> for ApiError {
  fn from(e: ValidationErrors) -> Self { Self::Registry(RegistryError::Invalid(e)) }
}

impl From<JsonRejection> for ApiError {
  fn from(e: JsonRejection) -> Self {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
      Self::PayloadTooLarge
    } else {
      Self::Malformed(e.body_text())
    }
  }
}

impl ApiError {
  pub fn invalid(name: &str, code: ValidationCode, reason: impl Into<String>) -> Self {
    Self::Registry(RegistryError::invalid(name, code, reason))
  }
}

/// The error envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
  pub code:           String,
  pub title:          String,
  pub detail:         String,
  pub status:         u16,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub invalid_params: Vec<FieldError>,
}

impl ApiError {
  /// Status, stable code and title.
  fn classify(&self) -> (StatusCode, &'static str, &'static str) {
    match self {
      Self::Registry(e) => match e {
        RegistryError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid", "Invalid input"),
        RegistryError::NotFound { .. } => (StatusCode::NOT_FOUND, "not-found", "Not found"),
        RegistryError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "Forbidden"),
        RegistryError::Conflict(c) => (StatusCode::BAD_REQUEST, c.code(), "Invalid state"),
        RegistryError::Unique { .. } => (StatusCode::CONFLICT, "unique", "Already exists"),
        RegistryError::NoContent => (StatusCode::GONE, "no-content", "No content"),
        RegistryError::Upstream(_) => {
          (StatusCode::INTERNAL_SERVER_ERROR, "upstream", "Upstream service failed")
        }
        RegistryError::Store(_) | RegistryError::Blob(_) => {
          (StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal error")
        }
      },
      Self::Unauthenticated => {
        (StatusCode::UNAUTHORIZED, "unauthenticated", "Authentication required")
      }
      Self::PayloadTooLarge => {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload-too-large", "Request body too large")
      }
      Self::Malformed(_) => (StatusCode::BAD_REQUEST, "invalid", "Malformed request"),
    }
  }

  pub fn problem(&self) -> Problem {
    let (status, code, title) = self.classify();
    let invalid_params = match self {
      Self::Registry(RegistryError::Invalid(errors)) => errors.iter().cloned().collect(),
      Self::Registry(RegistryError::Unique { field }) => vec![FieldError {
        name:   (*field).to_owned(),
        code:   ValidationCode::Invalid,
        reason: format!("{field} must be unique"),
      }],
      _ => Vec::new(),
    };
    let detail = match self {
      // Backend details stay in the log.
      Self::Registry(RegistryError::Store(_) | RegistryError::Blob(_)) => title.to_owned(),
      other => other.to_string(),
    };
    Problem {
      code: code.to_owned(),
      title: title.to_owned(),
      detail,
      status: status.as_u16(),
      invalid_params,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let problem = self.problem();
    let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let mut res = (status, Json(problem)).into_response();
    res.headers_mut().insert(
      header::CONTENT_TYPE,
      HeaderValue::from_static("application/problem+json"),
    );
    if matches!(self, Self::Unauthenticated) {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    res
  }
}

#[cfg(test)]
mod tests {
  use docreg_core::Conflict;

  use super::*;

  #[test]
  fn fixed_status_table() {
    let cases: Vec<(ApiError, u16, &str)> = vec![
      (ValidationErrors::single("title", ValidationCode::Blank, "x").into(), 400, "invalid"),
      (RegistryError::Conflict(Conflict::PendingRelations).into(), 400, "pending-relations"),
      (RegistryError::Conflict(Conflict::FinalStatus).into(), 400, "modify-status-definitief"),
      (RegistryError::Unique { field: "businessId" }.into(), 409, "unique"),
      (ApiError::Unauthenticated, 401, "unauthenticated"),
      (RegistryError::Forbidden.into(), 403, "forbidden"),
      (RegistryError::not_found("document", "x").into(), 404, "not-found"),
      (RegistryError::NoContent.into(), 410, "no-content"),
      (ApiError::PayloadTooLarge, 413, "payload-too-large"),
      (RegistryError::Store("boom".into()).into(), 500, "internal"),
    ];
    for (error, status, code) in cases {
      let problem = error.problem();
      assert_eq!(problem.status, status, "{code}");
      assert_eq!(problem.code, code);
    }
  }

  #[test]
  fn field_errors_become_invalid_params() {
    let mut errors = ValidationErrors::new();
    errors.push("title", ValidationCode::Blank, "blank");
    errors.push("language", ValidationCode::Invalid, "bad");
    let problem = ApiError::from(errors).problem();
    let json = serde_json::to_value(&problem).unwrap();
    assert_eq!(json["invalidParams"][0]["name"], "title");
    assert_eq!(json["invalidParams"][1]["code"], "invalid");
  }

  #[test]
  fn internal_details_are_hidden() {
    let problem = ApiError::from(RegistryError::Store("secret path".into())).problem();
    assert!(!problem.detail.contains("secret path"));
  }
}
