//! Persistence: the saved-configs artifact and override-file patching.
//!
//! [`write_saved`] records a session as a TOML document. `values` holds the
//! overrides and chosen option names that produced the run, `options` the
//! option names available per key, `order` the topological order, and
//! `computed` every evaluated result. [`persist_override`] patches a single key
//! in an overrides file with `toml_edit`, so comments and layout survive. Both
//! create parent directories as needed.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configs::Configs;
use crate::error::CalcfigError;
use crate::overrides::{Overrides, parse_value};
use crate::parser::ResolvedConfig;
use crate::types::{OrderEntry, Value};

/// Snapshot of an evaluated session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedConfigs {
    /// Accumulated topological order.
    #[serde(default)]
    pub order: Vec<String>,
    /// Overrides and chosen option names, as resolved before evaluation.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    /// Option names available per key.
    #[serde(default)]
    pub options: BTreeMap<String, Vec<String>>,
    /// Result of every evaluated key.
    #[serde(default)]
    pub computed: BTreeMap<String, Value>,
}

impl SavedConfigs {
    pub fn new(resolved: &ResolvedConfig, order: &[String], configs: &Configs) -> Self {
        let values = resolved
            .values()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let options = resolved
            .options()
            .iter()
            .map(|(k, opts)| (k.clone(), opts.keys().cloned().collect()))
            .collect();
        let computed = order
            .iter()
            .filter_map(|k| configs.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        Self {
            order: order.to_vec(),
            values,
            options,
            computed,
        }
    }

    /// The saved `values` as an override layer, to rebuild the same run.
    pub fn overrides(&self) -> Overrides {
        Overrides::from_table(self.values.clone().into_iter().collect())
    }

    /// The saved order as single-key entries, ready to replay.
    pub fn requested_order(&self) -> Vec<OrderEntry> {
        self.order.iter().map(|k| OrderEntry::from(k.as_str())).collect()
    }

    pub fn to_toml_string(&self) -> Result<String, CalcfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, CalcfigError> {
        toml::from_str(content).map_err(|e| CalcfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Write `saved` to `path`, creating parent directories.
pub fn write_saved(path: &Path, saved: &SavedConfigs) -> Result<(), CalcfigError> {
    let content = saved.to_toml_string()?;
    write_file(path, &content)?;
    debug!(path = %path.display(), keys = saved.order.len(), "saved configs");
    Ok(())
}

/// Read an artifact written by [`write_saved`].
pub fn read_saved(path: &Path) -> Result<SavedConfigs, CalcfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| CalcfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    SavedConfigs::from_toml_str(&content, path)
}

/// Patch a TOML document string, setting `key` to `raw_value`.
///
/// The value goes through the same bool/integer/float/string heuristic as
/// command-line overrides. Dotted keys create intermediate tables.
pub fn set_in_document(
    content: Option<&str>,
    key: &str,
    raw_value: &str,
) -> Result<String, CalcfigError> {
    let mut doc: toml_edit::DocumentMut = content.unwrap_or_default().parse().map_err(
        |e: toml_edit::TomlError| CalcfigError::InvalidValue {
            key: key.into(),
            reason: e.to_string(),
        },
    )?;

    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (parents.split('.').collect::<Vec<_>>(), leaf),
        None => (Vec::new(), key),
    };

    let mut current: &mut toml_edit::Item = doc.as_item_mut();
    for segment in parents {
        if current.get(segment).is_none() {
            current[segment] = toml_edit::Item::Table(toml_edit::Table::new());
        }
        current = &mut current[segment];
    }
    current[leaf] = toml_edit::value(to_edit_value(key, parse_value(raw_value))?);

    Ok(doc.to_string())
}

/// Read `path` (if it exists), set `key`, and write it back.
pub fn persist_override(path: &Path, key: &str, raw_value: &str) -> Result<(), CalcfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => Some(c),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(CalcfigError::IoError {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let new_content = set_in_document(content.as_deref(), key, raw_value)?;
    write_file(path, &new_content)?;
    debug!(path = %path.display(), key, "persisted override");
    Ok(())
}

fn to_edit_value(key: &str, value: Value) -> Result<toml_edit::Value, CalcfigError> {
    let edit = match value {
        Value::String(s) => toml_edit::Value::from(s),
        Value::Integer(i) => toml_edit::Value::from(i),
        Value::Float(f) => toml_edit::Value::from(f),
        Value::Boolean(b) => toml_edit::Value::from(b),
        other => {
            return Err(CalcfigError::InvalidValue {
                key: key.into(),
                reason: format!("cannot persist {} values", crate::types::ValueKind::of(&other)),
            });
        }
    };
    Ok(edit)
}

fn write_file(path: &Path, content: &str) -> Result<(), CalcfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CalcfigError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| CalcfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}
