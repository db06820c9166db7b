use std::borrow::{Borrow, Cow};

use serde::{Deserialize, Serialize};

/// Permission code.
///
/// Permissions are modeled as opaque, stable strings (e.g. "dataset:read").
/// A special wildcard code `"*"` can be granted to a role to mean
/// "allow all" without enumerating the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(Cow<'static, str>);

impl PermissionCode {
    pub const WILDCARD: PermissionCode = PermissionCode(Cow::Borrowed("*"));

    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PermissionCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PermissionCode {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl From<String> for PermissionCode {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}
