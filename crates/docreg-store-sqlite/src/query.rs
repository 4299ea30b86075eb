//! A small builder for dynamic `WHERE` clauses with positional parameters.
//!
//! Every clause uses anonymous `?` placeholders, so parameters are bound in
//! the order the clauses were pushed. Values are owned
//! [`rusqlite::types::Value`]s so a built query can be moved into a
//! `tokio_rusqlite` closure.

use docreg_core::authz::Access;
use rusqlite::types::Value;

use crate::encode::encode_confidentiality;

#[derive(Debug, Default)]
pub struct Conditions {
  clauses: Vec<String>,
  params:  Vec<Value>,
}

impl Conditions {
  pub fn new() -> Self { Self::default() }

  /// Add a clause containing exactly one `?`.
  pub fn push(&mut self, clause: &str, value: impl Into<Value>) {
    self.clauses.push(clause.to_owned());
    self.params.push(value.into());
  }

  /// `column IN (?, …)`; an empty list matches nothing.
  pub fn push_in(&mut self, column: &str, values: Vec<Value>) {
    if values.is_empty() {
      self.clauses.push("0".to_owned());
      return;
    }
    let marks = vec!["?"; values.len()].join(", ");
    self.clauses.push(format!("{column} IN ({marks})"));
    self.params.extend(values);
  }

  /// The authorization predicate over the current revision aliased `r`.
  pub fn access(&mut self, access: &Access) {
    let Access::Restricted(rules) = access else {
      return;
    };
    if rules.is_empty() {
      self.clauses.push("0".to_owned());
      return;
    }
    let disjuncts =
      vec!["(r.document_type = ? AND r.confidentiality <= ?)"; rules.len()].join(" OR ");
    self.clauses.push(format!("({disjuncts})"));
    for rule in rules {
      self.params.push(Value::Text(rule.document_type.clone()));
      self.params.push(Value::Integer(encode_confidentiality(rule.max_confidentiality)));
    }
  }

  /// `WHERE a AND b …`, or the empty string.
  pub fn where_clause(&self) -> String {
    if self.clauses.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.clauses.join(" AND "))
    }
  }

  pub fn params(&self) -> &[Value] { &self.params }

  /// The parameters followed by `extra` (e.g. `LIMIT`/`OFFSET` values).
  pub fn params_with(&self, extra: impl IntoIterator<Item = Value>) -> Vec<Value> {
    self.params.iter().cloned().chain(extra).collect()
  }
}
