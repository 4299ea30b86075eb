//! Field-level validation vocabulary.
//!
//! Validation failures are values, not panics: every check pushes a
//! [`FieldError`] with a stable [`ValidationCode`] onto a [`ValidationErrors`]
//! accumulator, so a caller sees every violated field at once.

use serde::Serialize;

/// Stable wire codes for per-field violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationCode {
  #[serde(rename = "required")]
  Required,
  #[serde(rename = "blank")]
  Blank,
  #[serde(rename = "invalid")]
  Invalid,
  #[serde(rename = "invalid_choice")]
  InvalidChoice,
  #[serde(rename = "max_length")]
  MaxLength,
  #[serde(rename = "unknown-parameters")]
  UnknownParameters,
  #[serde(rename = "invalid_for_received")]
  InvalidForReceived,
  #[serde(rename = "not-published")]
  NotPublished,
  #[serde(rename = "immutable")]
  Immutable,
  #[serde(rename = "invalid-address")]
  InvalidAddress,
  #[serde(rename = "date-order")]
  DateOrder,
  #[serde(rename = "file-size")]
  FileSize,
  #[serde(rename = "incorrect-base64-padding")]
  IncorrectBase64Padding,
  #[serde(rename = "invalid-resource")]
  InvalidResource,
}

impl ValidationCode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Required => "required",
      Self::Blank => "blank",
      Self::Invalid => "invalid",
      Self::InvalidChoice => "invalid_choice",
      Self::MaxLength => "max_length",
      Self::UnknownParameters => "unknown-parameters",
      Self::InvalidForReceived => "invalid_for_received",
      Self::NotPublished => "not-published",
      Self::Immutable => "immutable",
      Self::InvalidAddress => "invalid-address",
      Self::DateOrder => "date-order",
      Self::FileSize => "file-size",
      Self::IncorrectBase64Padding => "incorrect-base64-padding",
      Self::InvalidResource => "invalid-resource",
    }
  }
}

/// One violated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub name:   String,
  pub code:   ValidationCode,
  pub reason: String,
}

/// An accumulator of [`FieldError`]s. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
  pub fn new() -> Self { Self::default() }

  /// Shorthand for a single-field failure.
  pub fn single(
    name: impl Into<String>,
    code: ValidationCode,
    reason: impl Into<String>,
  ) -> Self {
    let mut errors = Self::new();
    errors.push(name, code, reason);
    errors
  }

  pub fn push(
    &mut self,
    name: impl Into<String>,
    code: ValidationCode,
    reason: impl Into<String>,
  ) {
    self.0.push(FieldError { name: name.into(), code, reason: reason.into() });
  }

  pub fn extend(&mut self, other: ValidationErrors) { self.0.extend(other.0); }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn iter(&self) -> impl Iterator<Item = &FieldError> { self.0.iter() }

  pub fn into_inner(self) -> Vec<FieldError> { self.0 }

  pub fn into_result(self) -> Result<(), Self> {
    if self.is_empty() { Ok(()) } else { Err(self) }
  }

  /// Push `blank` if `value` is empty or whitespace. Returns whether the value
  /// passed.
  pub fn not_blank(&mut self, name: &str, value: &str) -> bool {
    if value.trim().is_empty() {
      self.push(name, ValidationCode::Blank, "this field may not be blank");
      false
    } else {
      true
    }
  }

  /// Push `max_length` if `value` has more than `max` characters.
  pub fn max_length(&mut self, name: &str, value: &str, max: usize) -> bool {
    let len = value.chars().count();
    if len > max {
      self.push(
        name,
        ValidationCode::MaxLength,
        format!("ensure this field has no more than {max} characters ({len} given)"),
      );
      false
    } else {
      true
    }
  }
}

impl std::fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut first = true;
    for e in &self.0 {
      if !first {
        f.write_str("; ")?;
      }
      first = false;
      write!(f, "{} ({}): {}", e.name, e.code.as_str(), e.reason)?;
    }
    Ok(())
  }
}

impl std::error::Error for ValidationErrors {}

impl IntoIterator for ValidationErrors {
  type Item = FieldError;
  type IntoIter = std::vec::IntoIter<FieldError>;

  fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

// ─── Domain checks ───────────────────────────────────────────────────────────

/// Nine digits passing the eleven-test: `Σ dᵢ·(9−i) for i in 0..8, minus d₈,
/// must be divisible by 11`.
pub fn is_valid_rsin(value: &str) -> bool {
  let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
  if value.len() != 9 || digits.len() != 9 {
    return false;
  }
  let weighted: i64 = digits[..8]
    .iter()
    .enumerate()
    .map(|(i, d)| i64::from(*d) * (9 - i as i64))
    .sum();
  (weighted - i64::from(digits[8])) % 11 == 0
}

/// Three lowercase ASCII letters.
pub fn is_valid_language(value: &str) -> bool {
  value.len() == 3 && value.bytes().all(|b| b.is_ascii_lowercase())
}

/// Absolute `http` or `https` URL with a host.
pub fn is_valid_url(value: &str) -> bool {
  let rest = value
    .strip_prefix("https://")
    .or_else(|| value.strip_prefix("http://"));
  match rest {
    Some(rest) => {
      let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
      !host.is_empty() && !value.chars().any(char::is_whitespace)
    }
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rsin_eleven_test() {
    assert!(is_valid_rsin("159351741"));
    assert!(is_valid_rsin("000000000"));
    assert!(!is_valid_rsin("123456789"));
    assert!(!is_valid_rsin("15935174"));
    assert!(!is_valid_rsin("15935174a"));
  }

  #[test]
  fn language_codes() {
    assert!(is_valid_language("eng"));
    assert!(is_valid_language("dut"));
    assert!(!is_valid_language("en"));
    assert!(!is_valid_language("ENG"));
  }

  #[test]
  fn urls() {
    assert!(is_valid_url("https://ext/dt/1"));
    assert!(is_valid_url("http://example.com"));
    assert!(!is_valid_url("ftp://example.com"));
    assert!(!is_valid_url("https://"));
    assert!(!is_valid_url("https://a b"));
  }

  #[test]
  fn accumulator_reports_all() {
    let mut errors = ValidationErrors::new();
    assert!(!errors.not_blank("title", "  "));
    assert!(!errors.max_length("author", "abcdef", 3));
    assert!(errors.max_length("format", "txt", 3));
    assert_eq!(errors.len(), 2);
    assert_eq!(
      errors.to_string(),
      "title (blank): this field may not be blank; \
       author (max_length): ensure this field has no more than 3 characters (6 given)"
    );
    assert!(errors.into_result().is_err());
  }
}
