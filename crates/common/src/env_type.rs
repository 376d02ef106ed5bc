//! Environment classification declared by the operator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of environment a collection is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvType {
    Development,
    Qa,
    PreProduction,
    Production,
}

impl EnvType {
    pub const ALL: [EnvType; 4] = [
        EnvType::Development,
        EnvType::Qa,
        EnvType::PreProduction,
        EnvType::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvType::Development => "development",
            EnvType::Qa => "qa",
            EnvType::PreProduction => "pre-production",
            EnvType::Production => "production",
        }
    }
}

impl fmt::Display for EnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase();
        EnvType::ALL
            .into_iter()
            .find(|env_type| env_type.as_str() == normalized)
            .ok_or(crate::Error::InvalidEnvType(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_type() {
        assert_eq!(EnvType::from_str("qa").unwrap(), EnvType::Qa);
        assert_eq!(EnvType::from_str("Production").unwrap(), EnvType::Production);
        assert_eq!(
            EnvType::from_str("PRE-PRODUCTION").unwrap(),
            EnvType::PreProduction
        );
        assert_eq!(
            EnvType::from_str("development").unwrap(),
            EnvType::Development
        );
    }

    #[test]
    fn test_invalid_env_type() {
        let err = EnvType::from_str("Staging").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid env-type staging. See help for the list of valid types."
        );
    }

    #[test]
    fn test_display_round_trips() {
        for env_type in EnvType::ALL {
            assert_eq!(EnvType::from_str(&env_type.to_string()).unwrap(), env_type);
        }
    }
}
