//! Environment access for configuration and credentials
//!
//! Configuration documents may reference `${VAR_NAME}` so secrets stay out of
//! the file. Alternate backends also pull their credentials straight from the
//! environment. Both go through [`EnvSource`] so tests can supply a fixed map.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

/// Regex pattern for matching environment variable references: ${VAR_NAME}
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Source of environment variables
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;

    /// Like `var`, but treats empty values as unset
    fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name).filter(|v| !v.is_empty())
    }
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Look up several variables at once.
///
/// Returns the values in order, or the names of every variable that was missing.
pub fn require_vars(env: &impl EnvSource, names: &[&str]) -> Result<Vec<String>, Vec<String>> {
    let mut values = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match env.non_empty(name) {
            Some(value) => values.push(value),
            None => missing.push(name.to_string()),
        }
    }
    if missing.is_empty() {
        Ok(values)
    } else {
        Err(missing)
    }
}

/// Substitute `${VAR_NAME}` references from the process environment.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    substitute_with(&ProcessEnv, input)
}

/// Substitute `${VAR_NAME}` references from `env`.
///
/// Fails listing every missing variable (each once, sorted) if any is unset.
pub fn substitute_with(env: &impl EnvSource, input: &str) -> Result<String, ConfigError> {
    let mut missing = BTreeSet::new();

    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        env.var(name).unwrap_or_else(|| {
            missing.insert(name.to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_substitution_needed() {
        let input = "plain text without variables";
        assert_eq!(substitute_with(&env(&[]), input).unwrap(), input);
    }

    #[test]
    fn test_substitutes_repeated_and_multiple_vars() {
        let vars = env(&[("KEY", "AKIA"), ("SECRET", "s3cr3t")]);
        let result = substitute_with(&vars, "${KEY}:${SECRET}:${KEY}").unwrap();
        assert_eq!(result, "AKIA:s3cr3t:AKIA");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let err = substitute_with(&env(&[]), "${MISSING_B} ${MISSING_A} ${MISSING_B}")
            .unwrap_err()
            .to_string();
        assert!(err.contains("MISSING_A, MISSING_B"), "{}", err);
    }

    #[test]
    fn test_partial_match_not_substituted() {
        let result = substitute_with(&env(&[("VAR", "x")]), "$VAR and {VAR}").unwrap();
        assert_eq!(result, "$VAR and {VAR}");
    }

    #[test]
    fn test_process_env_substitution() {
        std::env::set_var("BUCKETFS_TEST_SUBST", "from-env");
        let result = substitute_env_vars("value: ${BUCKETFS_TEST_SUBST}").unwrap();
        assert_eq!(result, "value: from-env");
        std::env::remove_var("BUCKETFS_TEST_SUBST");
    }

    #[test]
    fn test_require_vars_reports_empty_as_missing() {
        let vars = env(&[("A", "1"), ("B", "")]);
        assert_eq!(require_vars(&vars, &["A"]).unwrap(), vec!["1".to_string()]);
        assert_eq!(
            require_vars(&vars, &["A", "B", "C"]).unwrap_err(),
            vec!["B".to_string(), "C".to_string()]
        );
    }
}
