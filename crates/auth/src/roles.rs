use std::borrow::{Borrow, Cow};

use serde::{Deserialize, Serialize};

/// Role code used for RBAC (e.g. "EDITOR").
///
/// Codes are unique across the role table and are what tokens carry; the
/// numeric `RoleId` never leaves the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(Cow<'static, str>);

impl RoleCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RoleCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoleCode {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl From<String> for RoleCode {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}
