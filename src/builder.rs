use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::CalcfigError;
use crate::overrides::Overrides;
use crate::processor::Processor;
use crate::schema::ConfigsType;
use crate::types::Value;

/// Entry point for building a processor from layered overrides.
pub struct Calcfig;

impl Calcfig {
    pub fn builder(configs_type: &Arc<ConfigsType>) -> CalcfigBuilder {
        CalcfigBuilder::new(Arc::clone(configs_type))
    }
}

/// Collects override sources for one configs type.
///
/// Layers, lowest to highest:
///
/// - **Files**: [`file()`](Self::file), in the order added.
/// - **Environment**: `{PREFIX}__KEY`, once [`env_prefix()`](Self::env_prefix) is set.
/// - **Extra layers**: [`overrides()`](Self::overrides), in the order added.
/// - **Pairs**: [`override_pair()`](Self::override_pair), `key=value` strings.
/// - **Values**: [`override_value()`](Self::override_value).
pub struct CalcfigBuilder {
    configs_type: Arc<ConfigsType>,
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
    env_enabled: bool,
    env_vars: Option<Vec<(String, String)>>,
    layers: Vec<Overrides>,
    pairs: Vec<String>,
    values: Vec<(String, Value)>,
    strict: bool,
}

impl CalcfigBuilder {
    fn new(configs_type: Arc<ConfigsType>) -> Self {
        Self {
            configs_type,
            files: Vec::new(),
            env_prefix: None,
            env_enabled: true,
            env_vars: None,
            layers: Vec::new(),
            pairs: Vec::new(),
            values: Vec::new(),
            strict: true,
        }
    }

    /// Add a TOML overrides file. Later files win. The file must exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.files.push(path.as_ref().to_path_buf());
        self
    }

    /// Read `{prefix}__KEY` environment variables.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Disable environment variable loading entirely.
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    /// Read from these variables instead of the process environment.
    pub fn env_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env_vars = Some(vars.into_iter().collect());
        self
    }

    /// Reject overrides for undeclared keys (default `true`). When `false`
    /// they are logged and skipped.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Add a prebuilt override layer.
    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.layers.push(overrides);
        self
    }

    /// Add a `key=value` override, parsed like a command-line flag.
    pub fn override_pair(mut self, pair: &str) -> Self {
        self.pairs.push(pair.to_string());
        self
    }

    /// Add an override. `None` values are skipped, so optional CLI flags can be
    /// passed straight through.
    pub fn override_value<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.values.push((key.to_string(), v.into()));
        }
        self
    }

    fn effective_env_prefix(&self) -> Option<&str> {
        if !self.env_enabled {
            return None;
        }
        self.env_prefix.as_deref()
    }

    /// Merge every source into one override set.
    pub fn collect_overrides(&self) -> Result<Overrides, CalcfigError> {
        let mut merged = Overrides::new();

        for path in &self.files {
            merged = merged.layer(Overrides::from_file(path)?);
        }

        if let Some(prefix) = self.effective_env_prefix() {
            let env = match &self.env_vars {
                Some(vars) => Overrides::from_env(prefix, vars.iter().cloned()),
                None => Overrides::from_env(prefix, std::env::vars()),
            };
            debug!(prefix, keys = env.len(), "environment overrides");
            merged = merged.layer(env);
        }

        for layer in &self.layers {
            merged = merged.layer(layer.clone());
        }

        merged = merged.layer(Overrides::from_pairs(&self.pairs)?);

        let mut explicit = Overrides::new();
        for (key, value) in &self.values {
            explicit.insert(key, value.clone())?;
        }
        Ok(merged.layer(explicit))
    }

    /// Resolve the configs type against the collected overrides.
    pub fn build(self) -> Result<Processor, CalcfigError> {
        let overrides = self.collect_overrides()?;
        Processor::new(&self.configs_type, &overrides, self.strict)
    }
}
