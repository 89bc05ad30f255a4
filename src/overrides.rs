//! Override layers: the key → value map handed to the parser.
//!
//! Overrides come from TOML files, `{PREFIX}__KEY` environment variables,
//! `key=value` pairs and in-process calls. Layers are deep-merged, later
//! layers winning. Dotted keys (`optimizer.momentum`) address the inside of a
//! table-valued key.

use std::path::Path;

use toml::{Table, Value};

use crate::error::CalcfigError;

/// A sparse set of override values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    table: Table,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: Table) -> Self {
        Self { table }
    }

    /// Parse an overrides file body. `path` is only used in errors.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, CalcfigError> {
        let table = content
            .parse::<Table>()
            .map_err(|e| CalcfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self { table })
    }

    pub fn from_file(path: &Path) -> Result<Self, CalcfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| CalcfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Collect `{prefix}__KEY` variables. Takes an iterator so tests can pass
    /// synthetic data instead of `std::env::vars()`.
    pub fn from_env(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            table: crate::env::env_to_table(prefix, vars),
        }
    }

    /// Parse `key=value` pairs, as given on a command line.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, CalcfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair.split_once('=').ok_or_else(|| CalcfigError::InvalidValue {
                key: pair.into(),
                reason: "expected key=value".into(),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CalcfigError::InvalidValue {
                    key: pair.into(),
                    reason: "empty key".into(),
                });
            }
            overrides.insert(key, parse_value(raw.trim()))?;
        }
        Ok(overrides)
    }

    /// Chained form of [`insert`](Self::insert) for literal overrides.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Result<Self, CalcfigError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Set `key` (possibly dotted). The last write to a key wins.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Result<(), CalcfigError> {
        set_nested(&mut self.table, key, value.into())
    }

    /// Merge `overlay` on top of this layer.
    pub fn layer(self, overlay: Overrides) -> Self {
        Self {
            table: deep_merge(self.table, overlay.table),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.table.get(key)
    }

    pub fn as_table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn set_nested(table: &mut Table, dotted_key: &str, value: Value) -> Result<(), CalcfigError> {
    let path: Vec<&str> = dotted_key.split('.').collect();
    insert_path(table, &path, value).map_err(|segment| CalcfigError::InvalidValue {
        key: dotted_key.into(),
        reason: format!("'{segment}' is not a table"),
    })
}

/// Insert `value` at `path`, creating intermediate tables.
///
/// Fails with the offending segment when a parent already holds a non-table.
pub(crate) fn insert_path(table: &mut Table, path: &[&str], value: Value) -> Result<(), String> {
    let Some((leaf, parents)) = path.split_last() else {
        return Ok(());
    };

    let mut current = table;
    for segment in parents {
        current = current
            .entry(*segment)
            .or_insert_with(|| Value::Table(Table::new()))
            .as_table_mut()
            .ok_or_else(|| segment.to_string())?;
    }

    current.insert(leaf.to_string(), value);
    Ok(())
}

/// Deep-merge `overlay` on top of `base`.
/// If both sides have a Table for the same key, recurse.
/// Otherwise, `overlay`'s value wins.
pub fn deep_merge(mut base: Table, overlay: Table) -> Table {
    for (key, overlay_val) in overlay {
        match (base.remove(&key), overlay_val) {
            (Some(Value::Table(base_tbl)), Value::Table(overlay_tbl)) => {
                base.insert(key, Value::Table(deep_merge(base_tbl, overlay_tbl)));
            }
            (_, overlay_val) => {
                base.insert(key, overlay_val);
            }
        }
    }
    base
}

/// Parse a raw string into a typed value.
/// Tries: bool → integer → float → string.
pub fn parse_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Boolean(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Boolean(false);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    // "nan" and "inf" stay strings.
    if s.contains('.')
        && let Ok(f) = s.parse::<f64>()
    {
        return Value::Float(f);
    }
    Value::String(s.to_string())
}
