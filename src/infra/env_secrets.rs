use std::env;

use crate::app::ports::SecretSource;
use crate::error::{PipelineError, Result};

/// Resolves secrets from environment variables.
///
/// A secret named `openchargemap_api_key` is looked up as-is first, then as
/// `OPENCHARGEMAP_API_KEY`.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretSource;

impl EnvSecretSource {
    pub fn new() -> Self {
        Self
    }
}

impl SecretSource for EnvSecretSource {
    fn get(&self, name: &str) -> Result<String> {
        let upper = name.to_uppercase();
        [name, upper.as_str()]
            .iter()
            .find_map(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "secret '{}' not found; set the {} environment variable",
                    name, upper
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_uppercased_variable() {
        env::set_var("EVP_TEST_SECRET_UPPER", "abc123");
        assert_eq!(EnvSecretSource::new().get("evp_test_secret_upper").unwrap(), "abc123");
    }

    #[test]
    fn missing_secret_is_config_error() {
        let err = EnvSecretSource::new().get("evp_test_secret_missing").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("EVP_TEST_SECRET_MISSING"));
    }
}
