//! Handlers for `/documents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/documents` | Filters: `businessId`, `sourceOrganization`, `documentType`, |
//! |          |              | `confidentiality`, `page` |
//! | `POST`   | `/documents` | `content` (base64) inline, or `size` alone for a chunked upload |
//! | `POST`   | `/documents/_search` | Body: `{"ids": [<url or id>, …]}` |
//! | `GET`    | `/documents/{id}` | `?version=N` or `?registeredAtOrBefore=T` |
//! | `PUT`    | `/documents/{id}` | Full replacement; needs `lockToken` |
//! | `PATCH`  | `/documents/{id}` | Partial update; needs `lockToken` |
//! | `DELETE` | `/documents/{id}` | Fails while object links exist |
//! | `GET`    | `/documents/{id}/download` | Same selectors as `GET` |
//! | `GET`    | `/documents/{id}/versions` | Every revision, oldest first |
//! | `POST`   | `/documents/{id}/lock` | Returns `{"lockToken": …}` |
//! | `POST`   | `/documents/{id}/unlock` | Body: `{"lockToken"?: …, "force"?: bool}` |

use axum::{
  Json,
  body::{Body, Bytes},
  extract::{State, rejection::JsonRejection},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use docreg_core::{
  document::{
    DocumentPatch, Integrity, IntegrityAlgorithm, LockToken, Signing, SigningKind, Status,
  },
  validation::ValidationCode,
};
use docreg_registry::{Backend, DocumentInput, ListQuery, Selector, UpdateMode};
use serde::Deserialize;
use uuid::Uuid;

use super::{created, nullable, urls};
use crate::{
  AppState,
  auth::Authenticated,
  error::{ApiError, Result},
  etag,
  params::{Id, Params, Parser},
  views::{DocumentView, LockView, PageView},
};

// ─── Request bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IntegrityBody {
  pub algorithm: String,
  pub value:     String,
  pub date:      String,
}

#[derive(Debug, Deserialize)]
pub struct SigningBody {
  pub kind: String,
  pub date: String,
}

/// Document fields as sent by clients. Enumerations and dates arrive as
/// strings so that bad values are reported per field.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBody {
  pub source_organization:    Option<String>,
  pub business_id:            Option<String>,
  pub creation_date:          Option<String>,
  pub title:                  Option<String>,
  pub confidentiality:        Option<String>,
  pub author:                 Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub status:                 Option<Option<String>>,
  pub description:            Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub received_on:            Option<Option<String>>,
  #[serde(default, deserialize_with = "nullable")]
  pub sent_on:                Option<Option<String>>,
  pub usage_rights_indicator: Option<String>,
  pub format:                 Option<String>,
  pub language:               Option<String>,
  pub filename:               Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub external_link:          Option<Option<String>>,
  pub document_type:          Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub integrity:              Option<Option<IntegrityBody>>,
  #[serde(default, deserialize_with = "nullable")]
  pub signing:                Option<Option<SigningBody>>,
  /// Base64-encoded body.
  pub content:                Option<String>,
  pub size:                   Option<u64>,
  pub lock_token:             Option<String>,
}

impl DocumentBody {
  /// Parse into service input, reporting every bad field at once.
  pub fn into_input(self) -> Result<(DocumentInput, Option<LockToken>)> {
    let mut p = Parser::new();

    let status = self.status.map(|status| match status.as_deref() {
      None | Some("") => None,
      Some(s) => p.choice::<Status>("status", s),
    });
    let received_on = self
      .received_on
      .map(|d| d.and_then(|d| p.date("receivedOn", &d)));
    let sent_on = self.sent_on.map(|d| d.and_then(|d| p.date("sentOn", &d)));
    let integrity = self.integrity.map(|i| {
      i.and_then(|i| {
        let algorithm = p.choice::<IntegrityAlgorithm>("integrity.algorithm", &i.algorithm);
        let date = p.date("integrity.date", &i.date);
        Some(Integrity { algorithm: algorithm?, value: i.value, date: date? })
      })
    });
    let signing = self.signing.map(|s| {
      s.and_then(|s| {
        let kind = p.choice::<SigningKind>("signing.kind", &s.kind);
        let date = p.date("signing.date", &s.date);
        Some(Signing { kind: kind?, date: date? })
      })
    });

    let fields = DocumentPatch {
      source_organization: self.source_organization,
      business_id: self.business_id,
      creation_date: self.creation_date.and_then(|d| p.date("creationDate", &d)),
      title: self.title,
      confidentiality: self
        .confidentiality
        .and_then(|c| p.choice("confidentiality", &c)),
      author: self.author,
      status,
      description: self.description,
      received_on,
      sent_on,
      usage_rights_indicator: self
        .usage_rights_indicator
        .and_then(|u| p.choice("usageRightsIndicator", &u)),
      format: self.format,
      language: self.language,
      filename: self.filename,
      external_link: self.external_link,
      document_type: self.document_type,
      integrity,
      signing,
    };

    let content = match self.content {
      Some(encoded) => match B64.decode(encoded.as_bytes()) {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(_) => {
          p.errors.push(
            "content",
            ValidationCode::IncorrectBase64Padding,
            "content is not valid base64",
          );
          None
        }
      },
      None => None,
    };

    p.finish()?;
    Ok((
      DocumentInput { fields, content, size: self.size },
      self.lock_token.map(LockToken::new),
    ))
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockBody {
  pub lock_token: Option<String>,
  #[serde(default)]
  pub force:      bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
  pub ids: Vec<String>,
}

/// `version` and `registeredAtOrBefore`.
fn selector(params: &Params) -> Result<Selector> {
  params.allow(&["version", "registeredAtOrBefore"])?;
  let mut p = Parser::new();
  let selector = Selector {
    version:                 params.get("version").and_then(|v| p.number("version", v)),
    registered_at_or_before: params
      .get("registeredAtOrBefore")
      .and_then(|v| p.datetime("registeredAtOrBefore", v)),
  };
  p.finish()?;
  Ok(selector)
}

// ─── List & search ───────────────────────────────────────────────────────────

/// `GET /documents`
pub async fn list<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  headers: HeaderMap,
  params: Params,
) -> Result<Response> {
  params.allow(&[
    "businessId",
    "sourceOrganization",
    "documentType",
    "confidentiality",
    "page",
  ])?;
  let mut p = Parser::new();
  let query = ListQuery {
    business_id:         params.string("businessId"),
    source_organization: params.string("sourceOrganization"),
    document_type:       params.string("documentType"),
    confidentiality:     params
      .get("confidentiality")
      .and_then(|c| p.choice("confidentiality", c)),
    page:                params.get("page").and_then(|n| p.number("page", n)),
  };
  p.finish()?;

  let page = query.page.unwrap_or(1);
  let documents = &state.registry.documents;
  let result = documents.list(&caller, query).await?;

  let link = |n: usize| {
    let base = format!("{}/documents", state.config.base());
    reqwest::Url::parse_with_params(&base, params.with_page(n))
      .ok()
      .map(String::from)
  };
  let more = page.saturating_mul(documents.page_size()) < result.total;
  let urls = urls(&state);
  let view = PageView {
    count:    result.total,
    next:     if more { link(page + 1) } else { None },
    previous: if page > 1 { link(page - 1) } else { None },
    results:  result
      .items
      .into_iter()
      .map(|d| DocumentView::new(urls, &d.identity, d.revision, &d.parts))
      .collect(),
  };
  Ok(etag::respond(&headers, &view))
}

/// `POST /documents/_search`
pub async fn search<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  body: std::result::Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<Vec<DocumentView>>> {
  let Json(body) = body?;
  let mut p = Parser::new();
  let ids: Vec<Uuid> = body.ids.iter().filter_map(|v| p.identity("ids", v)).collect();
  p.finish()?;

  let urls = urls(&state);
  let found = state.registry.documents.search_by_ids(&caller, ids).await?;
  Ok(Json(
    found
      .into_iter()
      .map(|d| DocumentView::new(urls, &d.identity, d.revision, &d.parts))
      .collect(),
  ))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /documents`
pub async fn create<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  body: std::result::Result<Json<DocumentBody>, JsonRejection>,
) -> Result<Response> {
  let Json(body) = body?;
  let (input, _) = body.into_input()?;
  let doc = state.registry.documents.create(&caller, input).await?;
  let view = DocumentView::new(urls(&state), &doc.identity, doc.revision, &doc.parts)
    .with_lock_token(&doc.identity);
  Ok(created(&view.url.clone(), view))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /documents/{id}`
pub async fn get_one<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  headers: HeaderMap,
  params: Params,
) -> Result<Response> {
  let selector = selector(&params)?;
  let doc = state.registry.documents.read(&caller, id, selector).await?;
  let view = DocumentView::new(urls(&state), &doc.identity, doc.revision, &doc.parts);
  Ok(etag::respond(&headers, &view))
}

/// `GET /documents/{id}/versions`
pub async fn versions<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  headers: HeaderMap,
) -> Result<Response> {
  let documents = &state.registry.documents;
  let current = documents.read(&caller, id, Selector::default()).await?;
  let urls = urls(&state);
  let views: Vec<DocumentView> = documents
    .versions(&caller, id)
    .await?
    .into_iter()
    .map(|revision| {
      let parts = if revision.version == current.revision.version {
        current.parts.as_slice()
      } else {
        &[]
      };
      DocumentView::new(urls, &current.identity, revision, parts)
    })
    .collect();
  Ok(etag::respond(&headers, &views))
}

/// `GET /documents/{id}/download`
pub async fn download<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  params: Params,
) -> Result<Response> {
  let selector = selector(&params)?;
  let (revision, stream) = state.registry.documents.download(&caller, id, selector).await?;

  let mut res = Body::from_stream(stream).into_response();
  let headers = res.headers_mut();
  headers.insert(
    header::CONTENT_TYPE,
    HeaderValue::from_static("application/octet-stream"),
  );
  if let Some(size) = revision.size {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
  }
  let filename = revision.metadata.filename.replace(['"', '\\'], "");
  if !filename.is_empty()
    && let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
  {
    headers.insert(header::CONTENT_DISPOSITION, value);
  }
  Ok(res)
}

// ─── Update ──────────────────────────────────────────────────────────────────

async fn update<K: Backend>(
  state: AppState<K>,
  caller: docreg_core::authz::Caller,
  id: Uuid,
  body: DocumentBody,
  mode: UpdateMode,
) -> Result<Json<DocumentView>> {
  let (input, token) = body.into_input()?;
  let token = token.ok_or_else(|| {
    ApiError::invalid("lockToken", ValidationCode::Required, "this field is required")
  })?;
  let doc = state
    .registry
    .documents
    .update(&caller, id, token, input, mode)
    .await?;
  Ok(Json(DocumentView::new(urls(&state), &doc.identity, doc.revision, &doc.parts)))
}

/// `PUT /documents/{id}`
pub async fn replace<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  body: std::result::Result<Json<DocumentBody>, JsonRejection>,
) -> Result<Json<DocumentView>> {
  let Json(body) = body?;
  update(state, caller, id, body, UpdateMode::Replace).await
}

/// `PATCH /documents/{id}`
pub async fn patch<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  body: std::result::Result<Json<DocumentBody>, JsonRejection>,
) -> Result<Json<DocumentView>> {
  let Json(body) = body?;
  update(state, caller, id, body, UpdateMode::Patch).await
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /documents/{id}`
pub async fn destroy<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
) -> Result<StatusCode> {
  state.registry.documents.delete(&caller, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Locking ─────────────────────────────────────────────────────────────────

/// `POST /documents/{id}/lock`
pub async fn lock<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
) -> Result<Json<LockView>> {
  let doc = state.registry.documents.lock(&caller, id).await?;
  Ok(Json(LockView { lock_token: doc.identity.lock_token }))
}

/// `POST /documents/{id}/unlock`. An empty body is a forced unlock for
/// callers that may force.
pub async fn unlock<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  body: Bytes,
) -> Result<StatusCode> {
  let body: UnlockBody = if body.is_empty() {
    UnlockBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::Malformed(e.to_string()))?
  };
  state
    .registry
    .documents
    .unlock(&caller, id, body.lock_token.map(LockToken::new), body.force)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use docreg_core::document::Confidentiality;

  use super::*;

  fn parse(json: &str) -> Result<(DocumentInput, Option<LockToken>)> {
    serde_json::from_str::<DocumentBody>(json).unwrap().into_input()
  }

  #[test]
  fn parses_typed_fields() {
    let (input, token) = parse(
      r#"{"title":"s","confidentiality":"TOP_SECRET","status":"","creationDate":"2018-06-27",
          "integrity":{"algorithm":"SHA_256","value":"abc","date":"2018-06-27"},
          "content":"c29tZQ==","lockToken":"t"}"#,
    )
    .unwrap();
    assert_eq!(input.fields.title.as_deref(), Some("s"));
    assert_eq!(input.fields.confidentiality, Some(Confidentiality::TopSecret));
    assert_eq!(input.fields.status, Some(None));
    assert_eq!(
      input.fields.integrity.unwrap().unwrap().algorithm,
      IntegrityAlgorithm::Sha256
    );
    assert_eq!(input.content.as_deref(), Some(&b"some"[..]));
    assert_eq!(token, Some(LockToken::new("t")));
  }

  #[test]
  fn reports_every_bad_field() {
    let err = parse(
      r#"{"confidentiality":"VERY","status":"DONE","creationDate":"yesterday","content":"c29tZQ"}"#,
    )
    .unwrap_err();
    let problem = err.problem();
    let codes: Vec<_> = problem.invalid_params.iter().map(|e| (e.name.as_str(), e.code)).collect();
    assert_eq!(codes, [
      ("status", ValidationCode::InvalidChoice),
      ("creationDate", ValidationCode::Invalid),
      ("confidentiality", ValidationCode::InvalidChoice),
      ("content", ValidationCode::IncorrectBase64Padding),
    ]);
  }

  #[test]
  fn null_clears_and_absent_keeps() {
    let (input, _) = parse(r#"{"receivedOn":null,"externalLink":"https://x"}"#).unwrap();
    assert_eq!(input.fields.received_on, Some(None));
    assert_eq!(input.fields.sent_on, None);
    assert_eq!(input.fields.external_link, Some(Some("https://x".to_string())));
  }
}
