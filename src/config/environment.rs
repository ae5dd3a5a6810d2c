use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Deployment environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Environment::Test)
    }
}

impl FromStr for Environment {
    type Err = AppError;

    /// Strict parse: an unknown name is a configuration error rather than a
    /// silent fallback, since the environment gates destructive operations.
    fn from_str(env: &str) -> Result<Self> {
        match env.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "test" | "testing" => Ok(Environment::Test),
            "stage" | "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(AppError::ConfigError(format!(
                "Unknown environment '{}', expected one of development, test, staging, production",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("Testing".parse::<Environment>().unwrap(), Environment::Test);
        assert_eq!(" stage ".parse::<Environment>().unwrap(), Environment::Staging);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let err = "qa".parse::<Environment>().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_display_round_trips() {
        for env in [
            Environment::Development,
            Environment::Test,
            Environment::Staging,
            Environment::Production,
        ] {
            assert_eq!(env.to_string().parse::<Environment>().unwrap(), env);
        }
    }

    #[test]
    fn test_default_is_development() {
        assert!(Environment::default().is_development());
        assert!(!Environment::default().is_production());
    }
}
