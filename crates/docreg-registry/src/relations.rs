//! Usage rights, object links and sendings.
//!
//! Each relation is authorized through the current revision of the document
//! it points at.

use std::sync::Arc;

use docreg_core::{
  authz::{Caller, Scope},
  relation::{ObjectLink, Sending, SendingRole, UsageRight},
  resolver::ObjectResolver,
  store::{RelationFilter, Repository},
  validation::ValidationCode,
};
use uuid::Uuid;

use crate::{Backend, Error, Result, admitted, require_scope, retry};

pub struct RelationService<K: Backend> {
  repo:     Arc<K::Repo>,
  resolver: Arc<K::Resolver>,
}

impl<K: Backend> RelationService<K> {
  pub fn new(repo: Arc<K::Repo>, resolver: Arc<K::Resolver>) -> Self { Self { repo, resolver } }

  /// Authorize against the target document of a new relation. An unknown
  /// document is a bad reference, not a missing resource.
  async fn target(&self, caller: &Caller, scope: Scope, identity_id: Uuid) -> Result<()> {
    match admitted(self.repo.as_ref(), caller, scope, identity_id).await {
      Err(Error::NotFound { .. }) => Err(Error::invalid(
        "identity",
        ValidationCode::InvalidResource,
        format!("document {identity_id} does not exist"),
      )),
      other => other.map(drop),
    }
  }

  /// Relations whose document is gone are not found.
  async fn owner(&self, caller: &Caller, scope: Scope, identity_id: Uuid) -> Result<()> {
    admitted(self.repo.as_ref(), caller, scope, identity_id).await.map(drop)
  }

  fn filter(caller: &Caller, identity_id: Option<Uuid>) -> RelationFilter {
    let mut filter = RelationFilter::new(caller.access(Scope::Read));
    filter.identity_id = identity_id;
    filter
  }

  fn immutable_identity(before: Uuid, after: Uuid) -> Result<()> {
    if before == after {
      Ok(())
    } else {
      Err(Error::invalid(
        "identity",
        ValidationCode::Immutable,
        "a relation cannot be moved to another document",
      ))
    }
  }

  // ── Usage rights ──────────────────────────────────────────────────────

  pub async fn create_usage_right(&self, caller: &Caller, right: UsageRight) -> Result<UsageRight> {
    right.validate()?;
    self.target(caller, Scope::Create, right.identity_id).await?;
    let right = self.repo.insert_usage_right(right).await.map_err(Error::store)?;
    tracing::info!(id = %right.id, document = %right.identity_id, "usage right created");
    Ok(right)
  }

  pub async fn get_usage_right(&self, caller: &Caller, id: Uuid) -> Result<UsageRight> {
    require_scope(caller, Scope::Read)?;
    let right = self
      .repo
      .get_usage_right(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("usage right", id))?;
    self.owner(caller, Scope::Read, right.identity_id).await?;
    Ok(right)
  }

  pub async fn list_usage_rights(
    &self,
    caller: &Caller,
    identity_id: Option<Uuid>,
  ) -> Result<Vec<UsageRight>> {
    require_scope(caller, Scope::Read)?;
    let filter = Self::filter(caller, identity_id);
    self.repo.list_usage_rights(&filter).await.map_err(Error::store)
  }

  pub async fn update_usage_right(&self, caller: &Caller, right: UsageRight) -> Result<UsageRight> {
    let existing = self.get_usage_right(caller, right.id).await?;
    Self::immutable_identity(existing.identity_id, right.identity_id)?;
    right.validate()?;
    self.owner(caller, Scope::Update, right.identity_id).await?;
    self.repo.update_usage_right(right).await.map_err(Error::store)
  }

  pub async fn delete_usage_right(&self, caller: &Caller, id: Uuid) -> Result<()> {
    let existing = self.get_usage_right(caller, id).await?;
    self.owner(caller, Scope::Delete, existing.identity_id).await?;
    self.repo.delete_usage_right(id).await.map_err(Error::store)?;
    tracing::info!(%id, document = %existing.identity_id, "usage right deleted");
    Ok(())
  }

  // ── Object links ──────────────────────────────────────────────────────

  /// Link a document to an external object, which must exist and be of the
  /// declared kind.
  pub async fn create_object_link(&self, caller: &Caller, link: ObjectLink) -> Result<ObjectLink> {
    link.validate()?;
    self.target(caller, Scope::Create, link.identity_id).await?;

    let resolver = self.resolver.as_ref();
    let url = link.external_object_url.as_str();
    let kind = link.object_kind;
    retry::once(move || resolver.object(url, kind))
      .await
      .map_err(|e| Error::resolve("object", e))?;

    let link = self.repo.insert_object_link(link).await.map_err(Error::store)?;
    tracing::info!(id = %link.id, document = %link.identity_id, "object link created");
    Ok(link)
  }

  pub async fn get_object_link(&self, caller: &Caller, id: Uuid) -> Result<ObjectLink> {
    require_scope(caller, Scope::Read)?;
    let link = self
      .repo
      .get_object_link(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("object link", id))?;
    self.owner(caller, Scope::Read, link.identity_id).await?;
    Ok(link)
  }

  pub async fn list_object_links(
    &self,
    caller: &Caller,
    identity_id: Option<Uuid>,
    object: Option<String>,
  ) -> Result<Vec<ObjectLink>> {
    require_scope(caller, Scope::Read)?;
    let mut filter = Self::filter(caller, identity_id);
    filter.object = object;
    self.repo.list_object_links(&filter).await.map_err(Error::store)
  }

  pub async fn delete_object_link(&self, caller: &Caller, id: Uuid) -> Result<()> {
    let existing = self.get_object_link(caller, id).await?;
    self.owner(caller, Scope::Delete, existing.identity_id).await?;
    self.repo.delete_object_link(id).await.map_err(Error::store)?;
    tracing::info!(%id, document = %existing.identity_id, "object link deleted");
    Ok(())
  }

  // ── Sendings ──────────────────────────────────────────────────────────

  pub async fn create_sending(&self, caller: &Caller, sending: Sending) -> Result<Sending> {
    sending.validate()?;
    self.target(caller, Scope::Create, sending.identity_id).await?;
    let sending = self.repo.insert_sending(sending).await.map_err(Error::store)?;
    tracing::info!(id = %sending.id, document = %sending.identity_id, "sending created");
    Ok(sending)
  }

  pub async fn get_sending(&self, caller: &Caller, id: Uuid) -> Result<Sending> {
    require_scope(caller, Scope::Read)?;
    let sending = self
      .repo
      .get_sending(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("sending", id))?;
    self.owner(caller, Scope::Read, sending.identity_id).await?;
    Ok(sending)
  }

  pub async fn list_sendings(
    &self,
    caller: &Caller,
    identity_id: Option<Uuid>,
    role: Option<SendingRole>,
  ) -> Result<Vec<Sending>> {
    require_scope(caller, Scope::Read)?;
    let mut filter = Self::filter(caller, identity_id);
    filter.role = role;
    self.repo.list_sendings(&filter).await.map_err(Error::store)
  }

  pub async fn update_sending(&self, caller: &Caller, sending: Sending) -> Result<Sending> {
    let existing = self.get_sending(caller, sending.id).await?;
    Self::immutable_identity(existing.identity_id, sending.identity_id)?;
    sending.validate()?;
    self.owner(caller, Scope::Update, sending.identity_id).await?;
    self.repo.update_sending(sending).await.map_err(Error::store)
  }

  pub async fn delete_sending(&self, caller: &Caller, id: Uuid) -> Result<()> {
    let existing = self.get_sending(caller, id).await?;
    self.owner(caller, Scope::Delete, existing.identity_id).await?;
    self.repo.delete_sending(id).await.map_err(Error::store)?;
    tracing::info!(%id, document = %existing.identity_id, "sending deleted");
    Ok(())
  }
}
