//! `${VAR}` substitution in configuration files
//!
//! `${VAR}` is replaced by the variable's value; `${VAR:-fallback}` uses
//! `fallback` when the variable is unset. Every unset variable without a
//! fallback is reported in a single error.

use std::collections::BTreeSet;
use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern")
});

/// Replace every variable reference in `input`
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing = BTreeSet::new();
    let output = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match (env::var(name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_string(),
            (Err(_), None) => {
                missing.insert(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().collect();
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            names.join(", ")
        )));
    }
    Ok(output.into_owned())
}
