//! Router tests: full requests through [`router`] over an in-memory SQLite
//! store, the in-memory blob store and a stub resolver.

use std::{path::PathBuf, sync::Arc};

use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString};
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use docreg_blob::MemoryBlobStore;
use docreg_core::{
  authz::Grant,
  document::Confidentiality,
  relation::ObjectKind,
  resolver::{DocumentTypeInfo, DocumentTypeResolver, ObjectResolver, ResolveError},
};
use docreg_registry::{Backend, Registry};
use docreg_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{AppState, ClientConfig, ServerConfig, router};

const BASE: &str = "http://localhost:8000";
const ADMIN: &str = "Bearer admin.s3cret";
const READER: &str = "Bearer reader.s3cret";

// ─── Harness ─────────────────────────────────────────────────────────────────

/// Every document type is published; `missing` URLs are not resources.
struct StubResolver;

impl DocumentTypeResolver for StubResolver {
  async fn document_type<'a>(&'a self, url: &'a str) -> Result<DocumentTypeInfo, ResolveError> {
    if url.contains("missing") {
      return Err(ResolveError::InvalidResource { url: url.into(), reason: "gone".into() });
    }
    Ok(DocumentTypeInfo {
      url:                     url.into(),
      published:               true,
      default_confidentiality: Confidentiality::Internal,
    })
  }
}

impl ObjectResolver for StubResolver {
  async fn object<'a>(&'a self, url: &'a str, _kind: ObjectKind) -> Result<(), ResolveError> {
    if url.contains("missing") {
      Err(ResolveError::InvalidResource { url: url.into(), reason: "gone".into() })
    } else {
      Ok(())
    }
  }
}

struct TestBackend;

impl Backend for TestBackend {
  type Repo = SqliteStore;
  type Blobs = MemoryBlobStore;
  type Resolver = StubResolver;
}

/// Cheap argon2 parameters; verification reads them back from the hash.
fn hash(secret: &str) -> String {
  let params = Params::new(8, 1, 1, None).unwrap();
  let salt = SaltString::generate(&mut OsRng);
  Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    .hash_password(secret.as_bytes(), &salt)
    .unwrap()
    .to_string()
}

async fn make_state() -> AppState<TestBackend> {
  let config = ServerConfig {
    host:                  "127.0.0.1".to_string(),
    port:                  8000,
    base_url:              BASE.to_string(),
    store_path:            PathBuf::from(":memory:"),
    blob_dir:              PathBuf::from("blobs"),
    chunk_size:            10,
    max_parts:             100,
    max_body_bytes:        1024 * 1024,
    upstream_timeout_ms:   1000,
    janitor_interval_secs: 3600,
    janitor_grace_secs:    86_400,
    clients:               vec![
      ClientConfig {
        client_id:   "admin".to_string(),
        secret_hash: hash("s3cret"),
        superuser:   true,
        grants:      Vec::new(),
      },
      ClientConfig {
        client_id:   "reader".to_string(),
        secret_hash: hash("s3cret"),
        superuser:   false,
        grants:      vec![Grant {
          document_type:       "https://ext/dt/ok".to_string(),
          max_confidentiality: Confidentiality::Public,
          scopes:              ["docs.read".to_string()].into(),
        }],
      },
    ],
  };
  let store = SqliteStore::open_in_memory().await.unwrap();
  let registry = Registry::<TestBackend>::new(
    Arc::new(store),
    Arc::new(MemoryBlobStore::new()),
    Arc::new(StubResolver),
    config.settings().unwrap(),
  );
  AppState::new(registry, config)
}

async fn oneshot_raw(
  state:   AppState<TestBackend>,
  method:  &str,
  uri:     &str,
  headers: Vec<(header::HeaderName, &str)>,
  body:    &str,
) -> Response {
  let mut builder = Request::builder().method(method).uri(uri);
  for (k, v) in headers {
    builder = builder.header(k, v);
  }
  let req = builder.body(Body::from(body.to_string())).unwrap();
  router(state).oneshot(req).await.unwrap()
}

/// Authenticated JSON request as the superuser.
async fn send(state: &AppState<TestBackend>, method: &str, uri: &str, body: Value) -> Response {
  let body = if body.is_null() { String::new() } else { body.to_string() };
  oneshot_raw(
    state.clone(),
    method,
    uri,
    vec![(header::AUTHORIZATION, ADMIN), (header::CONTENT_TYPE, "application/json")],
    &body,
  )
  .await
}

async fn bytes(resp: Response) -> Vec<u8> {
  axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn json_body(resp: Response) -> Value { serde_json::from_slice(&bytes(resp).await).unwrap() }

/// The path of one of our own URLs.
fn path(url: &Value) -> String { url.as_str().unwrap().trim_start_matches(BASE).to_string() }

fn document(document_type: &str, confidentiality: &str) -> Value {
  json!({
    "sourceOrganization": "159351741",
    "creationDate": "2018-06-27",
    "title": "s",
    "author": "a",
    "format": "txt",
    "language": "eng",
    "filename": "d.txt",
    "documentType": document_type,
    "confidentiality": confidentiality,
  })
}

fn inline_document() -> Value {
  let mut body = document("https://ext/dt/1", "PUBLIC");
  body["content"] = json!(B64.encode("some file content"));
  body["size"] = json!(17);
  body
}

async fn create(state: &AppState<TestBackend>, body: Value) -> Value {
  let resp = send(state, "POST", "/documents", body).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  json_body(resp).await
}

fn multipart(token: &str, content: &str) -> String {
  format!(
    "--XBOUNDARY\r\n\
     Content-Disposition: form-data; name=\"lockToken\"\r\n\r\n\
     {token}\r\n\
     --XBOUNDARY\r\n\
     Content-Disposition: form-data; name=\"content\"; filename=\"part\"\r\n\
     Content-Type: application/octet-stream\r\n\r\n\
     {content}\r\n\
     --XBOUNDARY--\r\n"
  )
}

async fn upload(
  state: &AppState<TestBackend>,
  part_url: &Value,
  token: &str,
  content: &str,
) -> Response {
  oneshot_raw(
    state.clone(),
    "PUT",
    &path(part_url),
    vec![
      (header::AUTHORIZATION, ADMIN),
      (header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY"),
    ],
    &multipart(token, content),
  )
  .await
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn inline_create_then_download() {
  let state = make_state().await;
  let doc = create(&state, inline_document()).await;

  assert_eq!(doc["version"], 1);
  assert_eq!(doc["locked"], false);
  assert_eq!(doc["parts"], json!([]));
  assert_eq!(doc["size"], 17);
  assert!(doc.get("lockToken").is_none());
  let download = doc["content"].as_str().unwrap();
  assert!(download.ends_with("?version=1"), "{download}");

  let resp = send(&state, "GET", &path(&doc["content"]), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(
    resp.headers().get(header::CONTENT_DISPOSITION).unwrap(),
    "attachment; filename=\"d.txt\""
  );
  assert_eq!(bytes(resp).await, b"some file content");
}

#[tokio::test]
async fn chunked_create_upload_and_unlock() {
  let state = make_state().await;
  let mut body = document("https://ext/dt/1", "PUBLIC");
  body["size"] = json!(17);
  let doc = create(&state, body).await;

  assert_eq!(doc["locked"], true);
  let token = doc["lockToken"].as_str().unwrap().to_string();
  let parts = doc["parts"].as_array().unwrap();
  let sizes: Vec<_> = parts.iter().map(|p| p["expectedSize"].clone()).collect();
  assert_eq!(sizes, [json!(10), json!(7)]);

  let resp = upload(&state, &parts[0]["url"], &token, "0123456789").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["completed"], true);
  let resp = upload(&state, &parts[1]["url"], &token, "abcdefg").await;
  assert_eq!(resp.status(), StatusCode::OK);

  let url = path(&doc["url"]);
  let resp = send(&state, "POST", &format!("{url}/unlock"), json!({ "lockToken": token })).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);

  let resp = send(&state, "GET", &format!("{url}/download"), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(bytes(resp).await, b"0123456789abcdefg");
}

#[tokio::test]
async fn lock_and_patch_keep_version_history() {
  let state = make_state().await;
  let doc = create(&state, inline_document()).await;
  let url = path(&doc["url"]);

  let resp = send(&state, "POST", &format!("{url}/lock"), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let token = json_body(resp).await["lockToken"].as_str().unwrap().to_string();

  let resp = send(&state, "PATCH", &url, json!({ "title": "s2", "lockToken": token })).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["version"], 2);

  let v1 = json_body(send(&state, "GET", &format!("{url}?version=1"), Value::Null).await).await;
  assert_eq!(v1["title"], "s");
  let current = json_body(send(&state, "GET", &url, Value::Null).await).await;
  assert_eq!(current["title"], "s2");

  let versions = send(&state, "GET", &format!("{url}/versions"), Value::Null).await;
  let versions = json_body(versions).await;
  let titles: Vec<_> = versions.as_array().unwrap().iter().map(|v| v["title"].clone()).collect();
  assert_eq!(titles, [json!("s"), json!("s2")]);
}

#[tokio::test]
async fn patch_without_lock_token_is_rejected() {
  let state = make_state().await;
  let doc = create(&state, inline_document()).await;
  let resp = send(&state, "PATCH", &path(&doc["url"]), json!({ "title": "s2" })).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let problem = json_body(resp).await;
  assert_eq!(problem["invalidParams"][0]["name"], "lockToken");
  assert_eq!(problem["invalidParams"][0]["code"], "required");
}

#[tokio::test]
async fn destroy_with_object_link_is_refused() {
  let state = make_state().await;
  let doc = create(&state, inline_document()).await;

  let resp = send(
    &state,
    "POST",
    "/objectLinks",
    json!({
      "identity": doc["url"],
      "externalObjectUrl": "https://ext/cases/1",
      "objectKind": "CASE",
    }),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  assert!(resp.headers().get(header::LOCATION).is_some());
  let link = json_body(resp).await;
  assert_eq!(link["relationKind"], "BELONGS_TO");

  let resp = send(&state, "DELETE", &path(&doc["url"]), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert_eq!(
    resp.headers().get(header::CONTENT_TYPE).unwrap(),
    "application/problem+json"
  );
  assert_eq!(json_body(resp).await["code"], "pending-relations");

  let resp = send(&state, "DELETE", &path(&link["url"]), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  let resp = send(&state, "DELETE", &path(&doc["url"]), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn list_applies_the_authorization_filter() {
  let state = make_state().await;
  for dt in ["https://ext/dt/ok", "https://ext/dt/not_ok"] {
    for confidentiality in ["PUBLIC", "TOP_SECRET"] {
      create(&state, document(dt, confidentiality)).await;
    }
  }

  let resp =
    oneshot_raw(state.clone(), "GET", "/documents", vec![(header::AUTHORIZATION, READER)], "")
      .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let page = json_body(resp).await;
  assert_eq!(page["count"], 1);
  assert_eq!(page["next"], Value::Null);
  assert_eq!(page["results"][0]["documentType"], "https://ext/dt/ok");
  assert_eq!(page["results"][0]["confidentiality"], "PUBLIC");

  let all = json_body(send(&state, "GET", "/documents", Value::Null).await).await;
  assert_eq!(all["count"], 4);
}

#[tokio::test]
async fn forced_unlock_discards_a_partial_upload() {
  let state = make_state().await;
  let mut body = document("https://ext/dt/1", "PUBLIC");
  body["size"] = json!(17);
  let doc = create(&state, body).await;
  let token = doc["lockToken"].as_str().unwrap().to_string();
  let resp = upload(&state, &doc["parts"][0]["url"], &token, "0123456789").await;
  assert_eq!(resp.status(), StatusCode::OK);

  let url = path(&doc["url"]);
  let resp = send(&state, "POST", &format!("{url}/unlock"), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);

  let current = json_body(send(&state, "GET", &url, Value::Null).await).await;
  assert_eq!(current["size"], Value::Null);
  assert_eq!(current["parts"], json!([]));
  assert_eq!(current["locked"], false);
}

// ─── Protocol details ────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_or_bad_credentials_are_401() {
  let state = make_state().await;
  let resp = oneshot_raw(state.clone(), "GET", "/documents", vec![], "").await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert_eq!(resp.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");

  let resp = oneshot_raw(
    state,
    "GET",
    "/documents",
    vec![(header::AUTHORIZATION, "Bearer admin.wrong")],
    "",
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_query_parameters_are_rejected() {
  let state = make_state().await;
  let resp = send(&state, "GET", "/documents?colour=red", Value::Null).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let problem = json_body(resp).await;
  assert_eq!(problem["invalidParams"][0]["name"], "nonFieldErrors");
  assert_eq!(problem["invalidParams"][0]["code"], "unknown-parameters");
}

#[tokio::test]
async fn out_of_range_sizes_and_pages_are_rejected() {
  let state = make_state().await;
  let mut body = document("https://ext/dt/1", "PUBLIC");
  body["size"] = json!(u64::MAX);
  let resp = send(&state, "POST", "/documents", body).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let problem = json_body(resp).await;
  assert_eq!(problem["invalidParams"][0]["name"], "size");
  assert_eq!(problem["invalidParams"][0]["code"], "file-size");

  let far = format!("/documents?page={}", usize::MAX / 10);
  let resp = send(&state, "GET", &far, Value::Null).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let problem = json_body(resp).await;
  assert_eq!(problem["invalidParams"][0]["name"], "page");
}

#[tokio::test]
async fn non_uuid_ids_are_not_found() {
  let state = make_state().await;
  let resp = send(&state, "GET", "/documents/not-a-uuid", Value::Null).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  let resp = send(&state, "GET", &format!("/documents/{}", Uuid::new_v4()), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn matching_etag_is_not_modified() {
  let state = make_state().await;
  let doc = create(&state, inline_document()).await;
  let url = path(&doc["url"]);

  let resp = send(&state, "GET", &url, Value::Null).await;
  let etag = resp.headers().get(header::ETAG).unwrap().to_str().unwrap().to_string();

  let resp = oneshot_raw(
    state,
    "GET",
    &url,
    vec![(header::AUTHORIZATION, ADMIN), (header::IF_NONE_MATCH, etag.as_str())],
    "",
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn sendings_round_trip() {
  let state = make_state().await;
  let doc = create(&state, inline_document()).await;

  let resp = send(
    &state,
    "POST",
    "/sendings",
    json!({
      "identity": doc["url"],
      "addressee": "https://ext/subjects/1",
      "role": "RECIPIENT",
      "postalAddress": {
        "boxKind": "POST_BOX", "boxNumber": 12, "postalCode": "1000AA", "city": "Amsterdam",
      },
    }),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let sending = json_body(resp).await;
  assert_eq!(sending["postalAddress"]["boxKind"], "POST_BOX");
  assert_eq!(sending["domesticAddress"], Value::Null);

  let resp = send(&state, "PATCH", &path(&sending["url"]), json!({ "note": "twice" })).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let patched = json_body(resp).await;
  assert_eq!(patched["note"], "twice");
  assert_eq!(patched["postalAddress"], sending["postalAddress"]);

  let listed = json_body(send(&state, "GET", "/sendings?role=SENDER", Value::Null).await).await;
  assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn usage_rights_drive_the_indicator() {
  let state = make_state().await;
  let doc = create(&state, inline_document()).await;
  let url = path(&doc["url"]);

  let resp = send(
    &state,
    "POST",
    "/usageRights",
    json!({
      "identity": doc["url"],
      "description": "internal use",
      "startAt": "2020-01-01T00:00:00Z",
    }),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let right = json_body(resp).await;
  let current = json_body(send(&state, "GET", &url, Value::Null).await).await;
  assert_eq!(current["usageRightsIndicator"], "TRUE");

  let resp = send(&state, "DELETE", &path(&right["url"]), Value::Null).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  let current = json_body(send(&state, "GET", &url, Value::Null).await).await;
  assert_eq!(current["usageRightsIndicator"], "UNKNOWN");
}
