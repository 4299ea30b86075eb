//! Synchronous relation queries and transactions: usage rights, object links,
//! sendings.
//!
//! Listings join each relation to its document's current revision (aliased
//! `r`) so the authorization predicate is evaluated in SQL.

use docreg_core::{
  document::UsageRightsIndicator,
  relation::{ObjectLink, Sending, UsageRight},
  store::RelationFilter,
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  documents::current_revision,
  encode::{
    OBJECT_LINK_COLUMNS, RawObjectLink, RawSending, RawUsageRight, SENDING_COLUMNS,
    USAGE_RIGHT_COLUMNS, encode_address, encode_date, encode_dt, encode_uuid,
  },
  error::unique_on,
  query::Conditions,
};

fn not_found(kind: &'static str, id: Uuid) -> Error {
  docreg_core::Error::not_found(kind, id).into()
}

/// Fail with `NotFound("document")` unless the identity exists.
fn require_document(conn: &Connection, identity_id: Uuid) -> Result<()> {
  current_revision(conn, identity_id)?.ok_or_else(|| not_found("document", identity_id))?;
  Ok(())
}

fn relation_conditions(filter: &RelationFilter, alias: &str) -> Conditions {
  let mut conds = Conditions::new();
  if let Some(id) = filter.identity_id {
    conds.push(&format!("{alias}.identity_id = ?"), encode_uuid(id));
  }
  conds.access(&filter.access);
  conds
}

/// Set the current revision's usage-rights indicator.
fn set_indicator(conn: &Connection, identity_id: Uuid, value: UsageRightsIndicator) -> Result<()> {
  conn.execute(
    "UPDATE revisions
     SET metadata_json = json_set(metadata_json, '$.usageRightsIndicator', ?2)
     WHERE revision_id = (
       SELECT revision_id FROM current_revisions WHERE identity_id = ?1
     )",
    rusqlite::params![encode_uuid(identity_id), value.as_ref()],
  )?;
  Ok(())
}

fn usage_right_count(conn: &Connection, identity_id: Uuid) -> Result<i64> {
  Ok(conn.query_row(
    "SELECT COUNT(*) FROM usage_rights WHERE identity_id = ?1",
    [encode_uuid(identity_id)],
    |row| row.get(0),
  )?)
}

// ─── Usage rights ────────────────────────────────────────────────────────────

pub fn insert_usage_right(conn: &mut Connection, right: UsageRight) -> Result<UsageRight> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  require_document(&tx, right.identity_id)?;

  tx.execute(
    "INSERT INTO usage_rights (usage_right_id, identity_id, description, start_at, end_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      encode_uuid(right.id),
      encode_uuid(right.identity_id),
      right.description,
      encode_dt(right.start_at),
      right.end_at.map(encode_dt),
    ],
  )?;
  if usage_right_count(&tx, right.identity_id)? == 1 {
    set_indicator(&tx, right.identity_id, UsageRightsIndicator::True)?;
  }

  tx.commit()?;
  Ok(right)
}

pub fn get_usage_right(conn: &Connection, id: Uuid) -> Result<Option<UsageRight>> {
  let raw = conn
    .query_row(
      &format!("SELECT {USAGE_RIGHT_COLUMNS} FROM usage_rights u WHERE u.usage_right_id = ?1"),
      [encode_uuid(id)],
      RawUsageRight::from_row,
    )
    .optional()?;
  raw.map(RawUsageRight::into_usage_right).transpose()
}

pub fn list_usage_rights(conn: &Connection, filter: &RelationFilter) -> Result<Vec<UsageRight>> {
  let conds = relation_conditions(filter, "u");
  let mut stmt = conn.prepare(&format!(
    "SELECT {USAGE_RIGHT_COLUMNS} FROM usage_rights u
     JOIN current_revisions r ON r.identity_id = u.identity_id
     {}
     ORDER BY u.start_at, u.usage_right_id",
    conds.where_clause()
  ))?;
  let raws = stmt
    .query_map(rusqlite::params_from_iter(conds.params()), RawUsageRight::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawUsageRight::into_usage_right).collect()
}

pub fn update_usage_right(conn: &Connection, right: UsageRight) -> Result<UsageRight> {
  let changed = conn.execute(
    "UPDATE usage_rights SET description = ?2, start_at = ?3, end_at = ?4
     WHERE usage_right_id = ?1",
    rusqlite::params![
      encode_uuid(right.id),
      right.description,
      encode_dt(right.start_at),
      right.end_at.map(encode_dt),
    ],
  )?;
  if changed == 0 {
    return Err(not_found("usage right", right.id));
  }
  Ok(right)
}

pub fn delete_usage_right(conn: &mut Connection, id: Uuid) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let right = get_usage_right(&tx, id)?.ok_or_else(|| not_found("usage right", id))?;

  tx.execute("DELETE FROM usage_rights WHERE usage_right_id = ?1", [encode_uuid(id)])?;
  if usage_right_count(&tx, right.identity_id)? == 0 {
    set_indicator(&tx, right.identity_id, UsageRightsIndicator::Unknown)?;
  }

  tx.commit()?;
  Ok(())
}

// ─── Object links ────────────────────────────────────────────────────────────

pub fn insert_object_link(conn: &mut Connection, link: ObjectLink) -> Result<ObjectLink> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  require_document(&tx, link.identity_id)?;

  tx.execute(
    "INSERT INTO object_links (object_link_id, identity_id, object_url, object_kind)
     VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![
      encode_uuid(link.id),
      encode_uuid(link.identity_id),
      link.external_object_url,
      link.object_kind.as_ref(),
    ],
  )
  .map_err(unique_on("object"))?;

  tx.commit()?;
  Ok(link)
}

pub fn get_object_link(conn: &Connection, id: Uuid) -> Result<Option<ObjectLink>> {
  let raw = conn
    .query_row(
      &format!("SELECT {OBJECT_LINK_COLUMNS} FROM object_links o WHERE o.object_link_id = ?1"),
      [encode_uuid(id)],
      RawObjectLink::from_row,
    )
    .optional()?;
  raw.map(RawObjectLink::into_object_link).transpose()
}

pub fn list_object_links(conn: &Connection, filter: &RelationFilter) -> Result<Vec<ObjectLink>> {
  let mut conds = relation_conditions(filter, "o");
  if let Some(object) = &filter.object {
    conds.push("o.object_url = ?", object.clone());
  }
  let mut stmt = conn.prepare(&format!(
    "SELECT {OBJECT_LINK_COLUMNS} FROM object_links o
     JOIN current_revisions r ON r.identity_id = o.identity_id
     {}
     ORDER BY o.object_url, o.object_link_id",
    conds.where_clause()
  ))?;
  let raws = stmt
    .query_map(rusqlite::params_from_iter(conds.params()), RawObjectLink::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawObjectLink::into_object_link).collect()
}

pub fn delete_object_link(conn: &Connection, id: Uuid) -> Result<()> {
  let changed =
    conn.execute("DELETE FROM object_links WHERE object_link_id = ?1", [encode_uuid(id)])?;
  if changed == 0 {
    return Err(not_found("object link", id));
  }
  Ok(())
}

// ─── Sendings ────────────────────────────────────────────────────────────────

pub fn insert_sending(conn: &mut Connection, sending: Sending) -> Result<Sending> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  require_document(&tx, sending.identity_id)?;

  tx.execute(
    "INSERT INTO sendings (
       sending_id, identity_id, addressee, role, note, received_on, sent_on,
       contact, contact_name, address_json
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      encode_uuid(sending.id),
      encode_uuid(sending.identity_id),
      sending.addressee,
      sending.role.as_ref(),
      sending.note,
      sending.received_on.map(encode_date),
      sending.sent_on.map(encode_date),
      sending.contact,
      sending.contact_name,
      encode_address(&sending.address)?,
    ],
  )?;

  tx.commit()?;
  Ok(sending)
}

pub fn get_sending(conn: &Connection, id: Uuid) -> Result<Option<Sending>> {
  let raw = conn
    .query_row(
      &format!("SELECT {SENDING_COLUMNS} FROM sendings s WHERE s.sending_id = ?1"),
      [encode_uuid(id)],
      RawSending::from_row,
    )
    .optional()?;
  raw.map(RawSending::into_sending).transpose()
}

pub fn list_sendings(conn: &Connection, filter: &RelationFilter) -> Result<Vec<Sending>> {
  let mut conds = relation_conditions(filter, "s");
  if let Some(role) = filter.role {
    conds.push("s.role = ?", role.as_ref().to_owned());
  }
  let mut stmt = conn.prepare(&format!(
    "SELECT {SENDING_COLUMNS} FROM sendings s
     JOIN current_revisions r ON r.identity_id = s.identity_id
     {}
     ORDER BY s.sending_id",
    conds.where_clause()
  ))?;
  let raws = stmt
    .query_map(rusqlite::params_from_iter(conds.params()), RawSending::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawSending::into_sending).collect()
}

pub fn update_sending(conn: &Connection, sending: Sending) -> Result<Sending> {
  let changed = conn.execute(
    "UPDATE sendings SET
       addressee = ?2, role = ?3, note = ?4, received_on = ?5, sent_on = ?6,
       contact = ?7, contact_name = ?8, address_json = ?9
     WHERE sending_id = ?1",
    rusqlite::params![
      encode_uuid(sending.id),
      sending.addressee,
      sending.role.as_ref(),
      sending.note,
      sending.received_on.map(encode_date),
      sending.sent_on.map(encode_date),
      sending.contact,
      sending.contact_name,
      encode_address(&sending.address)?,
    ],
  )?;
  if changed == 0 {
    return Err(not_found("sending", sending.id));
  }
  Ok(sending)
}

pub fn delete_sending(conn: &Connection, id: Uuid) -> Result<()> {
  let changed = conn.execute("DELETE FROM sendings WHERE sending_id = ?1", [encode_uuid(id)])?;
  if changed == 0 {
    return Err(not_found("sending", id));
  }
  Ok(())
}
