//! Authorization filter: per-caller grants keyed on document type and a
//! maximum confidentiality.
//!
//! A [`Caller`] holding grants is turned into an [`Access`] predicate for one
//! operation [`Scope`]. The predicate is applied uniformly to documents and to
//! every entity that points at a document (through the document's current
//! revision).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::document::Confidentiality;

/// Operation scopes checked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
  Read,
  Create,
  Update,
  Delete,
  Lock,
  ForceUnlock,
}

impl Scope {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Read => "docs.read",
      Self::Create => "docs.create",
      Self::Update => "docs.update",
      Self::Delete => "docs.delete",
      Self::Lock => "docs.lock",
      Self::ForceUnlock => "docs.force_unlock",
    }
  }
}

/// One authorization entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
  pub document_type:       String,
  pub max_confidentiality: Confidentiality,
  pub scopes:              BTreeSet<String>,
}

impl Grant {
  pub fn covers(&self, scope: Scope) -> bool { self.scopes.contains(scope.as_str()) }
}

/// The authenticated party on whose behalf an operation runs.
#[derive(Debug, Clone, Default)]
pub struct Caller {
  pub client_id: String,
  /// Superusers bypass the filter and hold every scope.
  pub superuser: bool,
  pub grants:    Vec<Grant>,
}

impl Caller {
  pub fn superuser(client_id: impl Into<String>) -> Self {
    Self { client_id: client_id.into(), superuser: true, grants: Vec::new() }
  }

  /// Whether any grant carries `scope`, regardless of document type.
  pub fn has_scope(&self, scope: Scope) -> bool {
    self.superuser || self.grants.iter().any(|g| g.covers(scope))
  }

  /// The predicate this caller is subject to for `scope`.
  pub fn access(&self, scope: Scope) -> Access {
    if self.superuser {
      return Access::All;
    }
    Access::Restricted(
      self
        .grants
        .iter()
        .filter(|g| g.covers(scope))
        .map(|g| Rule {
          document_type:       g.document_type.clone(),
          max_confidentiality: g.max_confidentiality,
        })
        .collect(),
    )
  }
}

/// One admitted `(document type, confidentiality ceiling)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
  pub document_type:       String,
  pub max_confidentiality: Confidentiality,
}

/// A predicate over `(documentType, confidentiality)`.
///
/// `Restricted(vec![])` admits nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
  All,
  Restricted(Vec<Rule>),
}

impl Access {
  pub fn admits(&self, document_type: &str, confidentiality: Confidentiality) -> bool {
    match self {
      Self::All => true,
      Self::Restricted(rules) => rules.iter().any(|r| {
        r.document_type == document_type && confidentiality <= r.max_confidentiality
      }),
    }
  }
}
