use std::path::PathBuf;
use thiserror::Error;

use crate::types::ValueKind;

#[derive(Debug, Error)]
pub enum CalcfigError {
    #[error("Unknown option '{option}' for key '{key}' (available: {})", .available.join(", "))]
    UnknownOption {
        key: String,
        option: String,
        available: Vec<String>,
    },

    #[error(
        "Key '{key}' has several candidate rules ({}) and no value selects one",
        .candidates.join(", ")
    )]
    AmbiguousDefault { key: String, candidates: Vec<String> },

    #[error("Key '{0}' has no override, no default value and no rule to compute it")]
    UnresolvableKey(String),

    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    DependencyCycle {
        /// Every key that could not be scheduled, in declaration order.
        keys: Vec<String>,
        /// One concrete cycle, first key repeated at the end.
        path: Vec<String>,
    },

    #[error("Rule for '{key}' was invoked before its dependency '{dependency}' was assigned")]
    MissingDependencyAtInvocation { key: String, dependency: String },

    #[error("Unknown key '{0}'")]
    UnknownKey(String),

    #[error("Rule for '{key}' depends on unknown key '{dependency}'")]
    UnknownDependency { key: String, dependency: String },

    #[error("Rule for '{key}' read '{dependency}' without declaring it as a dependency")]
    UndeclaredDependency { key: String, dependency: String },

    #[error("Type mismatch for '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("'{key}' is a reserved name and cannot be declared on {type_name}")]
    ReservedKey { key: String, type_name: String },

    #[error("Rule for '{key}' must return an array of {expected} values, got {found}")]
    RuleArity {
        key: String,
        expected: usize,
        found: String,
    },

    #[error("Rule for '{key}' failed: {message}")]
    Rule { key: String, message: String },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize configs: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}
