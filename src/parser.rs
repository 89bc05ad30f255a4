//! Option and override resolution.
//!
//! Turns a merged [`Schema`] plus a raw override table into a
//! [`ResolvedConfig`]: the kind of every key, the named options available per
//! key, the literal values that were supplied or selected, which keys are list
//! aggregates, and, for every key, the plan the calculator will execute.

use indexmap::{IndexMap, IndexSet};
use toml::Table;
use tracing::{instrument, trace, warn};

use crate::error::CalcfigError;
use crate::function::ConfigFunction;
use crate::schema::{Candidate, Schema, SchemaKey};
use crate::types::{Value, ValueKind};

/// How a key gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An override or class-level default; never computed.
    Literal(Value),
    /// A single rule: the selected option or the default rule.
    Rule(ConfigFunction),
    /// Every append rule, in declaration order.
    Append(Vec<ConfigFunction>),
}

impl Resolution {
    /// The rules that would run for this key.
    pub fn functions(&self) -> &[ConfigFunction] {
        match self {
            Resolution::Literal(_) => &[],
            Resolution::Rule(f) => std::slice::from_ref(f),
            Resolution::Append(fs) => fs,
        }
    }
}

/// Output of [`parse`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    types: IndexMap<String, ValueKind>,
    options: IndexMap<String, IndexMap<String, ConfigFunction>>,
    values: IndexMap<String, Value>,
    list_appends: IndexSet<String>,
    plan: IndexMap<String, Resolution>,
}

impl ResolvedConfig {
    /// Every schema key with its resolved kind, in declaration order.
    pub fn types(&self) -> &IndexMap<String, ValueKind> {
        &self.types
    }

    /// Named options per key. Keys without named variants are absent.
    pub fn options(&self) -> &IndexMap<String, IndexMap<String, ConfigFunction>> {
        &self.options
    }

    /// Explicit overrides and chosen option names.
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn list_appends(&self) -> &IndexSet<String> {
        &self.list_appends
    }

    pub fn plan(&self) -> &IndexMap<String, Resolution> {
        &self.plan
    }

    pub fn kind(&self, key: &str) -> Option<ValueKind> {
        self.types.get(key).copied()
    }

    pub fn resolution(&self, key: &str) -> Option<&Resolution> {
        self.plan.get(key)
    }

    pub fn is_append(&self, key: &str) -> bool {
        self.list_appends.contains(key)
    }

    /// The option name selected for `key`, if its value names one.
    pub fn chosen_option(&self, key: &str) -> Option<&str> {
        let opts = self.options.get(key)?;
        match self.values.get(key)? {
            Value::String(name) if opts.contains_key(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Resolve every schema key against `overrides`.
///
/// In strict mode an override for an undeclared key is an error; otherwise it
/// is skipped with a warning.
#[instrument(skip_all, fields(keys = schema.len(), overrides = overrides.len()))]
pub fn parse(
    schema: &Schema,
    overrides: &Table,
    strict: bool,
) -> Result<ResolvedConfig, CalcfigError> {
    for key in overrides.keys() {
        if !schema.contains_key(key) {
            if strict {
                return Err(CalcfigError::UnknownKey(key.clone()));
            }
            warn!(key = %key, "ignoring override for unknown key");
        }
    }

    let mut resolved = ResolvedConfig::default();

    for (key, entry) in schema.iter() {
        check_dependencies(schema, key, entry)?;

        let mut options: IndexMap<String, ConfigFunction> = IndexMap::new();
        let mut appends: Vec<ConfigFunction> = Vec::new();
        let mut unnamed: Vec<&Candidate> = Vec::new();
        for candidate in &entry.candidates {
            let f = &candidate.function;
            if f.is_append() {
                appends.push(f.clone());
            } else if let Some(name) = f.option_name() {
                options.insert(name.to_string(), f.clone());
            } else {
                unnamed.push(candidate);
            }
        }

        let kind = match entry.kind {
            ValueKind::Any if !appends.is_empty() => ValueKind::Array,
            ValueKind::Any | ValueKind::Array => entry.kind,
            declared if !appends.is_empty() => {
                return Err(CalcfigError::TypeMismatch {
                    key: key.into(),
                    expected: declared,
                    found: ValueKind::Array,
                });
            }
            declared => declared,
        };

        if !appends.is_empty() {
            if !options.is_empty() || !unnamed.is_empty() {
                warn!(key, "list key also has non-append rules; only append rules are used");
            }
            resolved.list_appends.insert(key.to_string());
        }

        let overridden = overrides.get(key);
        let given = overridden.or(entry.default.as_ref());

        let (resolution, value, resolved_kind) = match given {
            Some(value) => select(key, kind, value, &options)?,
            None => default_resolution(key, kind, &options, appends, &unnamed)?,
        };

        // Literal class defaults stay out of `values`; only overrides and chosen
        // option names are recorded there.
        let record = match &resolution {
            Resolution::Literal(_) => overridden.is_some(),
            _ => true,
        };
        if record && let Some(v) = value {
            resolved.values.insert(key.to_string(), v);
        }

        trace!(key, kind = %resolved_kind, resolution = ?resolution, "resolved key");
        resolved.types.insert(key.to_string(), resolved_kind);
        if !options.is_empty() {
            resolved.options.insert(key.to_string(), options);
        }
        resolved.plan.insert(key.to_string(), resolution);
    }

    Ok(resolved)
}

fn check_dependencies(schema: &Schema, key: &str, entry: &SchemaKey) -> Result<(), CalcfigError> {
    for candidate in &entry.candidates {
        for dep in candidate.function.dependencies() {
            if !schema.contains_key(dep) {
                return Err(CalcfigError::UnknownDependency {
                    key: key.into(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// A value was supplied (override or class default): pick the option it names
/// or keep it as a literal.
fn select(
    key: &str,
    kind: ValueKind,
    value: &Value,
    options: &IndexMap<String, ConfigFunction>,
) -> Result<(Resolution, Option<Value>, ValueKind), CalcfigError> {
    if let Value::String(name) = value
        && !options.is_empty()
    {
        if let Some(function) = options.get(name) {
            return Ok((
                Resolution::Rule(function.clone()),
                Some(value.clone()),
                kind,
            ));
        }
        if kind != ValueKind::String {
            return Err(CalcfigError::UnknownOption {
                key: key.into(),
                option: name.clone(),
                available: options.keys().cloned().collect(),
            });
        }
    }

    let literal = kind
        .coerce(value.clone())
        .ok_or_else(|| CalcfigError::TypeMismatch {
            key: key.into(),
            expected: kind,
            found: ValueKind::of(value),
        })?;
    let resolved_kind = kind.resolve(&literal);
    Ok((
        Resolution::Literal(literal.clone()),
        Some(literal),
        resolved_kind,
    ))
}

/// No value was supplied: fall back to rules.
fn default_resolution(
    key: &str,
    kind: ValueKind,
    options: &IndexMap<String, ConfigFunction>,
    appends: Vec<ConfigFunction>,
    unnamed: &[&Candidate],
) -> Result<(Resolution, Option<Value>, ValueKind), CalcfigError> {
    if !appends.is_empty() {
        return Ok((Resolution::Append(appends), None, kind));
    }

    // The most-derived type declaring an unnamed rule shadows its bases.
    if let Some(top) = unnamed.iter().map(|c| c.layer).max() {
        let shadowing: Vec<&&Candidate> = unnamed.iter().filter(|c| c.layer == top).collect();
        if let [only] = shadowing.as_slice() {
            return Ok((Resolution::Rule(only.function.clone()), None, kind));
        }
        return Err(CalcfigError::AmbiguousDefault {
            key: key.into(),
            candidates: shadowing.iter().map(|c| c.function.label()).collect(),
        });
    }

    if options.len() > 1 {
        return Err(CalcfigError::AmbiguousDefault {
            key: key.into(),
            candidates: options.keys().cloned().collect(),
        });
    }
    match options.first() {
        Some((name, function)) => Ok((
            Resolution::Rule(function.clone()),
            Some(Value::String(name.clone())),
            kind,
        )),
        None => Err(CalcfigError::UnresolvableKey(key.into())),
    }
}
