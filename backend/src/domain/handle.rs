//! Unique account handles (usernames).
//!
//! Handles are normalised to trimmed lower-case before any comparison, so
//! `" Alice "` and `"alice"` collide on the same reservation key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::appointment::AccountId;

const MIN_HANDLE_LEN: usize = 3;
const MAX_HANDLE_LEN: usize = 30;

/// Handles that may never be claimed by an account.
const RESERVED_HANDLES: [&str; 8] = [
    "admin",
    "administrator",
    "cashier",
    "moderator",
    "root",
    "staff",
    "support",
    "system",
];

/// A validated, normalised handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

/// Validation errors for [`Handle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleValidationError {
    /// The normalised handle does not match `[a-z0-9._-]{3,30}`.
    #[error("username must be 3-30 characters of a-z, 0-9, '.', '_' or '-'")]
    InvalidFormat,
    /// The handle is on the reserved-word denylist.
    #[error("username is reserved")]
    Reserved,
}

impl Handle {
    /// Normalise a raw handle without validating it.
    ///
    /// Release and lookup operate on the normalised form alone: a handle
    /// that could never pass validation simply has no reservation.
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    /// Normalise and validate a raw handle for reservation.
    pub fn new(raw: &str) -> Result<Self, HandleValidationError> {
        let normalized = Self::normalize(raw);
        let well_formed = (MIN_HANDLE_LEN..=MAX_HANDLE_LEN).contains(&normalized.len())
            && normalized
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        if !well_formed {
            return Err(HandleValidationError::InvalidFormat);
        }
        if RESERVED_HANDLES.contains(&normalized.as_str()) {
            return Err(HandleValidationError::Reserved);
        }
        Ok(Self(normalized))
    }

    /// Normalised string form.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored reservation binding a handle to its owning account.
///
/// The owner's email is denormalised into the reservation so that
/// login-by-username can resolve it with a single read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleReservation {
    /// Owning account.
    pub uid: AccountId,
    /// Denormalised owner email, when the identity provider supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Reservation instant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(" Alice ", "alice")]
    #[case("BOB_42", "bob_42")]
    #[case("carol.d", "carol.d")]
    fn handles_normalise_case_and_whitespace(#[case] raw: &str, #[case] expected: &str) {
        let handle = Handle::new(raw).expect("valid handle");
        assert_eq!(handle.as_str(), expected);
    }

    #[rstest]
    #[case("ab")]
    #[case("")]
    #[case("has space")]
    #[case("ümlaut")]
    #[case("semi;colon")]
    #[case("this-handle-is-far-too-long-to-ever-be-accepted")]
    fn malformed_handles_are_rejected(#[case] raw: &str) {
        assert_eq!(Handle::new(raw), Err(HandleValidationError::InvalidFormat));
    }

    #[rstest]
    #[case("admin")]
    #[case(" Admin ")]
    #[case("ROOT")]
    fn reserved_handles_are_rejected(#[case] raw: &str) {
        assert_eq!(Handle::new(raw), Err(HandleValidationError::Reserved));
    }

    #[test]
    fn reservation_omits_absent_email() {
        let reservation = HandleReservation {
            uid: AccountId::new("uid-1").expect("valid account"),
            email: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&reservation).expect("serialise reservation");
        assert!(value.get("email").is_none());
        assert!(value.get("createdAt").is_some());
    }
}
