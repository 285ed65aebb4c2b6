//! Company profile and user identity models.

use serde::{Deserialize, Serialize};

/// Stable identifier of a remote user, as reported by the channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A service provider's company profile, captured by the onboarding flow.
///
/// Stored in the profile file keyed by [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub agency_name: String,
    /// Free text, comma-delimited by convention. Never parsed.
    pub services: String,
    pub email: String,
    pub phone: String,
}

impl CompanyProfile {
    /// Name of the first blank field, if any.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        [
            ("agency_name", &self.agency_name),
            ("services", &self.services),
            ("email", &self.email),
            ("phone", &self.phone),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}
