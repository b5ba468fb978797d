use std::fmt;

use serde::{Deserialize, Serialize};

/// Which login method produced a credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum ProviderTag {
    Credentials,
    Google,
    Github,
    Other(String),
}

impl ProviderTag {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderTag::Credentials => "credentials",
            ProviderTag::Google => "google",
            ProviderTag::Github => "github",
            ProviderTag::Other(id) => id,
        }
    }
}

impl From<String> for ProviderTag {
    fn from(value: String) -> Self {
        ProviderTag::from(value.as_str())
    }
}

impl From<&str> for ProviderTag {
    fn from(value: &str) -> Self {
        match value {
            "credentials" => ProviderTag::Credentials,
            "google" => ProviderTag::Google,
            "github" => ProviderTag::Github,
            other => ProviderTag::Other(other.to_string()),
        }
    }
}

impl From<ProviderTag> for String {
    fn from(value: ProviderTag) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identity established by a login method, before a credential is minted for it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable subject identifier, echoed back on every validation.
    pub subject: String,
    pub name: String,
    pub email: String,
    pub provider: ProviderTag,
}

/// A validated session credential as surfaced to request handlers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub subject: String,
    pub name: String,
    pub email: String,
    pub provider: ProviderTag,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds.
    pub expires_at: i64,
}

impl Credential {
    /// The subject as the numeric owner id used by the to-do collection, if it is one.
    pub fn owner_id(&self) -> Option<i64> {
        self.subject.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_tag_round_trips_through_strings() {
        assert_eq!(ProviderTag::from("github"), ProviderTag::Github);
        assert_eq!(ProviderTag::from("gitlab"), ProviderTag::Other("gitlab".into()));
        assert_eq!(
            serde_json::to_string(&ProviderTag::Credentials).unwrap(),
            "\"credentials\""
        );
    }
}
