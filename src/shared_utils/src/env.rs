use std::path::PathBuf;

use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// Empty values are treated as missing, so `FOO= visit-map ...` behaves the same
/// as leaving `FOO` unset.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}

/// Resolves a path from an explicit argument, falling back to an environment variable.
pub fn path_or_env(explicit: Option<PathBuf>, name: &str) -> Result<PathBuf, MissingEnvVarError> {
    match explicit {
        Some(p) => Ok(p),
        None => get_env_var(name).map(PathBuf::from),
    }
}
