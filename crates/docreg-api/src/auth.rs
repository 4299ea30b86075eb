//! Bearer-token extractor and standalone verifier.
//!
//! Clients authenticate with `Authorization: Bearer <client_id>.<secret>`;
//! the secret is checked against the client's configured argon2 hash.

use std::collections::HashMap;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use docreg_core::authz::Caller;
use docreg_registry::Backend;

use crate::{AppState, ClientConfig, error::ApiError};

/// Configured clients, keyed by id.
#[derive(Debug, Default)]
pub struct Clients(HashMap<String, ClientConfig>);

impl Clients {
  pub fn new(clients: impl IntoIterator<Item = ClientConfig>) -> Self {
    Self(clients.into_iter().map(|c| (c.client_id.clone(), c)).collect())
  }

  /// The caller for `client_id` if `secret` matches its hash.
  pub fn authenticate(&self, client_id: &str, secret: &str) -> Option<Caller> {
    let client = self.0.get(client_id)?;
    let parsed_hash = PasswordHash::new(&client.secret_hash).ok()?;
    Argon2::default()
      .verify_password(secret.as_bytes(), &parsed_hash)
      .ok()?;
    Some(Caller {
      client_id: client.client_id.clone(),
      superuser: client.superuser,
      grants:    client.grants.clone(),
    })
  }
}

/// Present in a handler means the request was authenticated.
pub struct Authenticated(pub Caller);

/// Verify credentials directly from headers.
pub fn verify_bearer(headers: &HeaderMap, clients: &Clients) -> Result<Caller, ApiError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthenticated)?;

  let token = header_val
    .strip_prefix("Bearer ")
    .ok_or(ApiError::Unauthenticated)?;

  let (client_id, secret) = token.split_once('.').ok_or(ApiError::Unauthenticated)?;

  let caller = clients
    .authenticate(client_id, secret)
    .ok_or(ApiError::Unauthenticated)?;
  tracing::debug!(client = %caller.client_id, "authenticated");
  Ok(caller)
}

impl<K: Backend> FromRequestParts<AppState<K>> for Authenticated {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<K>,
  ) -> Result<Self, Self::Rejection> {
    verify_bearer(&parts.headers, &state.clients).map(Authenticated)
  }
}

#[cfg(test)]
mod tests {
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::HeaderValue;
  use rand_core::OsRng;

  use super::*;

  fn clients(secret: &str) -> Clients {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(secret.as_bytes(), &salt)
      .unwrap()
      .to_string();
    Clients::new([ClientConfig {
      client_id:   "app".to_string(),
      secret_hash: hash,
      superuser:   true,
      grants:      vec![],
    }])
  }

  fn bearer(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
  }

  #[test]
  fn correct_credentials() {
    let clients = clients("s3cret");
    let caller = verify_bearer(&bearer("Bearer app.s3cret"), &clients).unwrap();
    assert_eq!(caller.client_id, "app");
    assert!(caller.superuser);
  }

  #[test]
  fn secret_may_contain_dots() {
    let clients = clients("a.b.c");
    assert!(verify_bearer(&bearer("Bearer app.a.b.c"), &clients).is_ok());
  }

  #[test]
  fn wrong_secret() {
    let clients = clients("s3cret");
    assert!(matches!(
      verify_bearer(&bearer("Bearer app.wrong"), &clients),
      Err(ApiError::Unauthenticated)
    ));
  }

  #[test]
  fn unknown_client() {
    let clients = clients("s3cret");
    assert!(matches!(
      verify_bearer(&bearer("Bearer other.s3cret"), &clients),
      Err(ApiError::Unauthenticated)
    ));
  }

  #[test]
  fn missing_or_malformed_header() {
    let clients = clients("s3cret");
    assert!(verify_bearer(&HeaderMap::new(), &clients).is_err());
    assert!(verify_bearer(&bearer("Basic YXBwOnMzY3JldA=="), &clients).is_err());
    assert!(verify_bearer(&bearer("Bearer nodot"), &clients).is_err());
  }
}
