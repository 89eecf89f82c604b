//! Normalized contact identifiers.
//!
//! Every identifier is normalized once, at the edge, so that suppression
//! lookups and dedupe comparisons are plain string equality everywhere else.

use crate::error::{ModelError, Result};

/// The set of contact identifiers attached to a pool record.
///
/// Each channel is optional; a record with no identifiers at all is legal in
/// the store but can never pass validation for any action type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContactIdentifiers {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub handle: Option<String>,
}

impl ContactIdentifiers {
    /// Build a normalized set from raw collaborator input.
    pub fn normalized(
        email: Option<&str>,
        phone: Option<&str>,
        handle: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            email: email.map(normalize_email).transpose()?,
            phone: phone.map(normalize_phone).transpose()?,
            handle: handle.map(normalize_handle).transpose()?,
        })
    }

    /// All identifiers the suppression index must be consulted for,
    /// including the email's domain.
    pub fn suppression_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(4);
        if let Some(email) = &self.email {
            keys.push(email.clone());
            if let Some(domain) = email.split_once('@').map(|(_, d)| d) {
                keys.push(domain.to_string());
            }
        }
        if let Some(phone) = &self.phone {
            keys.push(phone.clone());
        }
        if let Some(handle) = &self.handle {
            keys.push(handle.clone());
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.handle.is_none()
    }
}

/// Lowercase, trimmed, must contain exactly one `@` with a non-empty domain.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ModelError::InvalidIdentifier(format!(
            "not an email address: {raw:?}"
        ))),
    }
}

/// Digits only, preserving a single leading `+` when present.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 7 {
        return Err(ModelError::InvalidIdentifier(format!(
            "not a phone number: {raw:?}"
        )));
    }
    Ok(if plus { format!("+{digits}") } else { digits })
}

/// Lowercase, trimmed, leading `@` stripped.
pub fn normalize_handle(raw: &str) -> Result<String> {
    let handle = raw
        .trim()
        .trim_start_matches('@')
        .to_ascii_lowercase();
    if handle.is_empty() {
        return Err(ModelError::InvalidIdentifier(format!(
            "empty social handle: {raw:?}"
        )));
    }
    Ok(handle)
}
