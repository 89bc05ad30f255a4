//! Computation rules: a function of declared input keys producing one or more
//! configuration values.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::configs::Configs;
use crate::error::CalcfigError;
use crate::types::{Value, ValueKind};

static NEXT_RULE_ID: AtomicUsize = AtomicUsize::new(0);

/// Identity of a [`ConfigFunction`]. Clones share it; separately constructed
/// rules never do, even when they are structurally identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(usize);

/// Keys a rule produces, normalized to an ordered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNames(Vec<String>);

impl ConfigNames {
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for ConfigNames {
    fn from(name: &str) -> Self {
        ConfigNames(vec![name.to_string()])
    }
}

impl From<String> for ConfigNames {
    fn from(name: String) -> Self {
        ConfigNames(vec![name])
    }
}

impl<const N: usize> From<[&str; N]> for ConfigNames {
    fn from(names: [&str; N]) -> Self {
        ConfigNames(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<&[&str]> for ConfigNames {
    fn from(names: &[&str]) -> Self {
        ConfigNames(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Vec<String>> for ConfigNames {
    fn from(names: Vec<String>) -> Self {
        ConfigNames(names)
    }
}

type ComputeFn = dyn Fn(&Inputs<'_>) -> Result<Value, CalcfigError> + Send + Sync;

/// A single computation rule.
///
/// A rule targets one or more keys. A rule with several targets returns an
/// array holding one element per target, in target order. It may be tagged
/// with an option name (one named variant among mutually exclusive
/// implementations) or marked as an append contributor (one element of a list
/// key).
///
/// The read-set is declared up front so the dependency graph can be built
/// without running anything.
#[derive(Clone)]
pub struct ConfigFunction {
    id: RuleId,
    compute: Arc<ComputeFn>,
    config_names: Vec<String>,
    dependencies: Vec<String>,
    option_name: Option<String>,
    is_append: bool,
}

impl ConfigFunction {
    pub fn new<F, T>(config_names: impl Into<ConfigNames>, dependencies: &[&str], compute: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> Result<T, CalcfigError> + Send + Sync + 'static,
        T: Serialize,
    {
        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }

        let compute = move |inputs: &Inputs<'_>| {
            let out = compute(inputs)?;
            Value::try_from(out).map_err(|e| CalcfigError::InvalidValue {
                key: inputs.key().to_string(),
                reason: e.to_string(),
            })
        };

        Self {
            id: RuleId(NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed)),
            compute: Arc::new(compute),
            config_names: config_names.into().into_vec(),
            dependencies: deps,
            option_name: None,
            is_append: false,
        }
    }

    /// Tag this rule as the implementation of the named option.
    pub fn option(mut self, name: impl Into<String>) -> Self {
        self.option_name = Some(name.into());
        self
    }

    /// Mark this rule as a list contributor.
    pub fn append(mut self) -> Self {
        self.is_append = true;
        self
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn config_names(&self) -> &[String] {
        &self.config_names
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn option_name(&self) -> Option<&str> {
        self.option_name.as_deref()
    }

    pub fn is_append(&self) -> bool {
        self.is_append
    }

    /// Human-readable name used in diagnostics.
    pub fn label(&self) -> String {
        match &self.option_name {
            Some(name) => name.clone(),
            None => format!("<rule {}>", self.id.0),
        }
    }

    /// Run the rule against `configs` on behalf of `key`.
    ///
    /// Returns the raw output. Multi-target rules are unpacked by the caller.
    pub(crate) fn invoke(&self, key: &str, configs: &Configs) -> Result<Value, CalcfigError> {
        let inputs = Inputs {
            key,
            dependencies: &self.dependencies,
            configs,
        };
        (self.compute)(&inputs)
    }
}

impl PartialEq for ConfigFunction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConfigFunction {}

impl fmt::Debug for ConfigFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigFunction")
            .field("id", &self.id)
            .field("config_names", &self.config_names)
            .field("dependencies", &self.dependencies)
            .field("option_name", &self.option_name)
            .field("is_append", &self.is_append)
            .finish()
    }
}

/// Read access to already-resolved keys during one rule invocation.
///
/// Reads are limited to the rule's declared dependencies.
pub struct Inputs<'a> {
    key: &'a str,
    dependencies: &'a [String],
    configs: &'a Configs,
}

impl<'a> Inputs<'a> {
    /// The key the rule is being evaluated for.
    pub fn key(&self) -> &str {
        self.key
    }

    pub fn get(&self, dependency: &str) -> Result<&'a Value, CalcfigError> {
        if !self.dependencies.iter().any(|d| d == dependency) {
            return Err(CalcfigError::UndeclaredDependency {
                key: self.key.into(),
                dependency: dependency.into(),
            });
        }
        self.configs
            .get(dependency)
            .ok_or_else(|| CalcfigError::MissingDependencyAtInvocation {
                key: self.key.into(),
                dependency: dependency.into(),
            })
    }

    pub fn integer(&self, dependency: &str) -> Result<i64, CalcfigError> {
        match self.get(dependency)? {
            Value::Integer(i) => Ok(*i),
            other => Err(mismatch(dependency, ValueKind::Integer, other)),
        }
    }

    /// Read a float. Integers are widened.
    pub fn float(&self, dependency: &str) -> Result<f64, CalcfigError> {
        match self.get(dependency)? {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(mismatch(dependency, ValueKind::Float, other)),
        }
    }

    pub fn string(&self, dependency: &str) -> Result<&'a str, CalcfigError> {
        match self.get(dependency)? {
            Value::String(s) => Ok(s.as_str()),
            other => Err(mismatch(dependency, ValueKind::String, other)),
        }
    }

    pub fn boolean(&self, dependency: &str) -> Result<bool, CalcfigError> {
        match self.get(dependency)? {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch(dependency, ValueKind::Boolean, other)),
        }
    }

    pub fn array(&self, dependency: &str) -> Result<&'a [Value], CalcfigError> {
        match self.get(dependency)? {
            Value::Array(a) => Ok(a.as_slice()),
            other => Err(mismatch(dependency, ValueKind::Array, other)),
        }
    }

    /// Deserialize a dependency into any `T`.
    pub fn get_as<T: DeserializeOwned>(&self, dependency: &str) -> Result<T, CalcfigError> {
        self.get(dependency)?
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| CalcfigError::InvalidValue {
                key: dependency.into(),
                reason: e.to_string(),
            })
    }

    /// Build a rule failure attributed to the key being computed.
    pub fn fail(&self, message: impl Into<String>) -> CalcfigError {
        CalcfigError::Rule {
            key: self.key.into(),
            message: message.into(),
        }
    }
}

fn mismatch(dependency: &str, expected: ValueKind, found: &Value) -> CalcfigError {
    CalcfigError::TypeMismatch {
        key: dependency.into(),
        expected,
        found: ValueKind::of(found),
    }
}
