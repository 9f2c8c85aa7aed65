//! Account roles and the rules assigning them at account creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::appointment::AccountId;

/// Role granted to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular booking account.
    Student,
    /// Staff member confirming payments.
    Cashier,
    /// Staff member with full management access.
    Admin,
    /// Account outside the configured school community.
    Guest,
}

/// Matching rules deriving a role from an account's email.
///
/// Assignment is a pure function of the email: student by domain suffix,
/// cashier and admin by exact address, guest otherwise. Exact matches win
/// over suffix matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRules {
    /// Email domain suffixes granted [`Role::Student`].
    pub student_domains: Vec<String>,
    /// Exact addresses granted [`Role::Cashier`].
    pub cashier_emails: Vec<String>,
    /// Exact addresses granted [`Role::Admin`].
    pub admin_emails: Vec<String>,
}

impl Default for RoleRules {
    fn default() -> Self {
        Self {
            student_domains: vec!["@school.edu".to_owned(), "@yourschool.edu".to_owned()],
            cashier_emails: vec!["cashier@local.test".to_owned()],
            admin_emails: Vec::new(),
        }
    }
}

impl RoleRules {
    /// Derive the role for an email address.
    ///
    /// Comparison is case-insensitive on a trimmed address; re-invocation
    /// with the same input always yields the same role.
    pub fn role_for(&self, email: &str) -> Role {
        let email = email.trim().to_lowercase();
        if self.admin_emails.iter().any(|m| m.eq_ignore_ascii_case(&email)) {
            return Role::Admin;
        }
        if self.cashier_emails.iter().any(|m| m.eq_ignore_ascii_case(&email)) {
            return Role::Cashier;
        }
        if self
            .student_domains
            .iter()
            .any(|suffix| email.ends_with(&suffix.to_lowercase()))
        {
            return Role::Student;
        }
        Role::Guest
    }
}

/// Stored role record for an account, written once at account creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    /// Account the role belongs to.
    pub uid: AccountId,
    /// Email the role was derived from.
    pub email: String,
    /// Granted role.
    pub role: Role,
    /// Assignment instant.
    pub created_at: DateTime<Utc>,
}
