//! Domain types exchanged with the remote security service.
//!
//! The security service is the source of truth for identities and roles;
//! medrec only mirrors its answers. Payload structs therefore keep an
//! `extra` flatten map so fields this crate does not model survive a
//! cache round-trip unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity record as returned by the security service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityUser {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SecurityUser {
    /// Returns `true` if the user carries the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// One page of a paginated user listing from the security service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPage {
    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub page: u32,

    #[serde(default)]
    pub pages: u32,

    #[serde(default)]
    pub data: Vec<SecurityUser>,
}

impl UserPage {
    /// Normalize a freshly fetched page: the remote service reports
    /// `total` and `data` but not always the page/pages bookkeeping.
    pub fn normalized(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        if self.pages == 0 && limit > 0 {
            self.pages = self.total.div_ceil(u64::from(limit)) as u32;
        }
        self
    }
}

/// Decoded bearer-token claims for the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Subject: the user id at the security service.
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    pub exp: u64,

    #[serde(default)]
    pub iat: u64,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl AuthClaims {
    /// Returns `true` if the token was issued for the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// Pagination parameters for listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

/// Optional filters on a patient's diagnostics listing.
///
/// Absent filters are rendered as a literal `null` token in cache keys so
/// that distinct filter combinations never collide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticPageFilter {
    pub state: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Payload for registering a new patient at the security service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub email: String,
    pub fullname: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identificacion: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

/// Partial update for an existing patient identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Account state of a patient at the security service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatientState {
    Active,
    Inactive,
    Suspended,
}

impl PatientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Suspended => "SUSPENDED",
        }
    }
}

/// Response envelope the security service returns for mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<SecurityUser>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}
