//! Schema declaration and collection.
//!
//! A [`ConfigsType`] is one node of a configuration type hierarchy. It declares
//! keys (with a kind and an optional literal default), the rules it contributes,
//! and the types it extends. [`collect_schema`] merges a type with all of its
//! ancestors, most-base first, into a single [`Schema`].

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::CalcfigError;
use crate::function::{ConfigFunction, ConfigNames, Inputs};
use crate::types::{Value, ValueKind};

/// Names that cannot be used as configuration keys.
pub const RESERVED: [&str; 2] = ["calc", "list"];

#[derive(Debug, Clone, Default)]
struct KeyDecl {
    kind: Option<ValueKind>,
    default: Option<Value>,
}

/// One configuration type: its own declarations plus the types it extends.
#[derive(Debug)]
pub struct ConfigsType {
    name: String,
    bases: Vec<Arc<ConfigsType>>,
    keys: IndexMap<String, KeyDecl>,
    rules: Vec<ConfigFunction>,
}

impl ConfigsType {
    pub fn builder(name: &str) -> ConfigsTypeBuilder {
        ConfigsTypeBuilder {
            name: name.to_string(),
            bases: Vec::new(),
            keys: IndexMap::new(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[Arc<ConfigsType>] {
        &self.bases
    }

    pub fn rules(&self) -> &[ConfigFunction] {
        &self.rules
    }
}

/// Builder for a [`ConfigsType`]. Every rule is registered through an explicit
/// call; nothing is discovered at runtime.
///
/// ```ignore
/// let base = ConfigsType::builder("TrainerConfigs")
///     .key("batch_size", ValueKind::Integer)
///     .calc("batch_size", &[], |_| Ok(64))
///     .calc("lr", &["batch_size"], |cx| Ok(cx.integer("batch_size")? as f64 / 6400.0))
///     .option("dataset", "mnist", &[], |_| Ok("mnist"))
///     .option("dataset", "cifar", &[], |_| Ok("cifar10"))
///     .build()?;
/// ```
pub struct ConfigsTypeBuilder {
    name: String,
    bases: Vec<Arc<ConfigsType>>,
    keys: IndexMap<String, KeyDecl>,
    rules: Vec<ConfigFunction>,
}

impl ConfigsTypeBuilder {
    /// Inherit every key and rule of `base`. With several bases, the first one
    /// listed is treated as the more derived, so its declarations win.
    pub fn extends(mut self, base: &Arc<ConfigsType>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    /// Declare a key with its kind.
    pub fn key(mut self, name: &str, kind: ValueKind) -> Self {
        self.keys.entry(name.to_string()).or_default().kind = Some(kind);
        self
    }

    /// Give a key a literal default. Declares the key if needed.
    pub fn default_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.keys.entry(name.to_string()).or_default().default = Some(value.into());
        self
    }

    /// Register the default (unnamed) rule for one or more keys.
    pub fn calc<F, T>(self, names: impl Into<ConfigNames>, dependencies: &[&str], compute: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> Result<T, CalcfigError> + Send + Sync + 'static,
        T: Serialize,
    {
        self.rule(ConfigFunction::new(names, dependencies, compute))
    }

    /// Register a named option for one or more keys.
    pub fn option<F, T>(
        self,
        names: impl Into<ConfigNames>,
        option: &str,
        dependencies: &[&str],
        compute: F,
    ) -> Self
    where
        F: Fn(&Inputs<'_>) -> Result<T, CalcfigError> + Send + Sync + 'static,
        T: Serialize,
    {
        self.rule(ConfigFunction::new(names, dependencies, compute).option(option))
    }

    /// Register one contribution to the list key `name`.
    pub fn append<F, T>(self, name: &str, dependencies: &[&str], compute: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> Result<T, CalcfigError> + Send + Sync + 'static,
        T: Serialize,
    {
        self.rule(ConfigFunction::new(name, dependencies, compute).append())
    }

    /// Register a pre-built rule.
    pub fn rule(mut self, function: ConfigFunction) -> Self {
        self.rules.push(function);
        self
    }

    pub fn build(self) -> Result<Arc<ConfigsType>, CalcfigError> {
        let declared = self
            .keys
            .keys()
            .map(String::as_str)
            .chain(self.rules.iter().flat_map(|r| r.config_names().iter().map(String::as_str)));
        for key in declared {
            if RESERVED.contains(&key) {
                return Err(CalcfigError::ReservedKey {
                    key: key.into(),
                    type_name: self.name.clone(),
                });
            }
        }

        for rule in &self.rules {
            if rule.config_names().is_empty() {
                return Err(CalcfigError::InvalidValue {
                    key: rule.label(),
                    reason: format!("rule on {} targets no keys", self.name),
                });
            }
        }

        Ok(Arc::new(ConfigsType {
            name: self.name,
            bases: self.bases,
            keys: self.keys,
            rules: self.rules,
        }))
    }
}

/// A rule together with the lineage position of the type that declared it.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Index into [`Schema::lineage`]; higher is more derived.
    pub layer: usize,
    pub function: ConfigFunction,
}

/// Everything known about one key after merging the hierarchy.
#[derive(Debug, Clone, Default)]
pub struct SchemaKey {
    pub kind: ValueKind,
    pub default: Option<Value>,
    /// Base rules first, derived rules after.
    pub candidates: Vec<Candidate>,
}

/// The merged declarations of a type and its ancestors.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    lineage: Vec<String>,
    keys: IndexMap<String, SchemaKey>,
}

impl Schema {
    /// Type names from most-base to most-derived.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    pub fn get(&self, key: &str) -> Option<&SchemaKey> {
        self.keys.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Keys in first-declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaKey)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Order a type and its ancestors from most-base to most-derived.
///
/// Bases are visited breadth-first starting at `leaf`, then the list is
/// reversed. A type reachable along several paths keeps its most-base position.
pub fn lineage(leaf: &ConfigsType) -> Vec<&ConfigsType> {
    let mut visited: Vec<&ConfigsType> = vec![leaf];
    let mut level: Vec<&ConfigsType> = vec![leaf];

    while !level.is_empty() {
        // Keep the last occurrence of a base within a level; the final pass
        // keeps last occurrences too, so the result is unchanged.
        let mut next: Vec<&ConfigsType> = Vec::new();
        for base in level.iter().flat_map(|t| t.bases.iter().map(Arc::as_ref)) {
            if let Some(pos) = next.iter().position(|seen| std::ptr::eq(*seen, base)) {
                next.remove(pos);
            }
            next.push(base);
        }
        visited.extend(next.iter().copied());
        level = next;
    }

    visited.reverse();

    let mut lineage: Vec<&ConfigsType> = Vec::with_capacity(visited.len());
    for ty in visited {
        if !lineage.iter().any(|seen| std::ptr::eq(*seen, ty)) {
            lineage.push(ty);
        }
    }
    lineage
}

/// Merge `ty` and its ancestors into a [`Schema`].
///
/// Declared kinds and literal defaults from more-derived types replace those of
/// their bases. Rules accumulate: base rules first.
#[instrument(skip_all, fields(configs_type = %ty.name()))]
pub fn collect_schema(ty: &ConfigsType) -> Schema {
    let types = lineage(ty);
    let mut schema = Schema {
        lineage: types.iter().map(|t| t.name.clone()).collect(),
        keys: IndexMap::new(),
    };

    for (layer, t) in types.iter().enumerate() {
        for (name, decl) in &t.keys {
            let entry = schema.keys.entry(name.clone()).or_default();
            if let Some(kind) = decl.kind {
                entry.kind = kind;
            }
            if let Some(default) = &decl.default {
                entry.default = Some(default.clone());
            }
        }
        for function in &t.rules {
            for name in function.config_names() {
                schema
                    .keys
                    .entry(name.clone())
                    .or_default()
                    .candidates
                    .push(Candidate {
                        layer,
                        function: function.clone(),
                    });
            }
        }
    }

    debug!(
        lineage = ?schema.lineage,
        keys = schema.keys.len(),
        "collected schema"
    );
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Arc<ConfigsType> {
        ConfigsType::builder("Base")
            .key("batch_size", ValueKind::Integer)
            .calc("batch_size", &[], |_| Ok(64))
            .default_value("epochs", 10)
            .build()
            .unwrap()
    }

    #[test]
    fn reserved_names_rejected() {
        let err = ConfigsType::builder("Bad")
            .default_value("calc", 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, CalcfigError::ReservedKey { .. }));

        let err = ConfigsType::builder("Bad")
            .append("list", &[], |_| Ok(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, CalcfigError::ReservedKey { .. }));
    }

    #[test]
    fn rule_with_no_targets_rejected() {
        let err = ConfigsType::builder("Bad")
            .calc(Vec::<String>::new(), &[], |_| Ok(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, CalcfigError::InvalidValue { .. }));
    }

    #[test]
    fn single_type_schema() {
        let schema = collect_schema(&base());
        assert_eq!(schema.lineage(), ["Base"]);
        let keys: Vec<&str> = schema.keys().collect();
        assert_eq!(keys, ["batch_size", "epochs"]);
        assert_eq!(schema.get("batch_size").unwrap().kind, ValueKind::Integer);
        assert_eq!(schema.get("epochs").unwrap().default, Some(Value::Integer(10)));
        assert_eq!(schema.get("batch_size").unwrap().candidates.len(), 1);
    }

    #[test]
    fn rule_only_keys_are_declared_as_any() {
        let ty = ConfigsType::builder("T")
            .calc("device", &[], |_| Ok("cpu"))
            .build()
            .unwrap();
        let schema = collect_schema(&ty);
        assert_eq!(schema.get("device").unwrap().kind, ValueKind::Any);
    }

    #[test]
    fn derived_rules_follow_base_rules() {
        let base = base();
        let derived = ConfigsType::builder("Derived")
            .extends(&base)
            .calc("batch_size", &[], |_| Ok(32))
            .build()
            .unwrap();
        let schema = collect_schema(&derived);
        assert_eq!(schema.lineage(), ["Base", "Derived"]);
        let candidates = &schema.get("batch_size").unwrap().candidates;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].layer, 0);
        assert_eq!(candidates[1].layer, 1);
        assert_eq!(&candidates[0].function, &base.rules()[0]);
    }

    #[test]
    fn derived_default_replaces_base_default() {
        let derived = ConfigsType::builder("Derived")
            .extends(&base())
            .default_value("epochs", 3)
            .build()
            .unwrap();
        let schema = collect_schema(&derived);
        assert_eq!(schema.get("epochs").unwrap().default, Some(Value::Integer(3)));
    }

    #[test]
    fn diamond_keeps_most_base_position() {
        let root = ConfigsType::builder("Root")
            .default_value("seed", 1)
            .build()
            .unwrap();
        let left = ConfigsType::builder("Left").extends(&root).build().unwrap();
        let right = ConfigsType::builder("Right").extends(&root).build().unwrap();
        let leaf = ConfigsType::builder("Leaf")
            .extends(&left)
            .extends(&right)
            .build()
            .unwrap();

        let names: Vec<&str> = lineage(&leaf).iter().map(|t| t.name()).collect();
        assert_eq!(names, ["Root", "Right", "Left", "Leaf"]);
    }

    #[test]
    fn stacked_diamonds_stay_linear() {
        let mut top = ConfigsType::builder("Root")
            .default_value("seed", 1)
            .build()
            .unwrap();
        for i in 0..40 {
            let left = ConfigsType::builder(&format!("Left{i}"))
                .extends(&top)
                .build()
                .unwrap();
            let right = ConfigsType::builder(&format!("Right{i}"))
                .extends(&top)
                .build()
                .unwrap();
            top = ConfigsType::builder(&format!("Join{i}"))
                .extends(&left)
                .extends(&right)
                .build()
                .unwrap();
        }

        let chain = lineage(&top);
        assert_eq!(chain.len(), 1 + 3 * 40);
        assert_eq!(chain[0].name(), "Root");
        assert_eq!(chain.last().unwrap().name(), "Join39");
        let names: Vec<&str> = chain[1..4].iter().map(|t| t.name()).collect();
        assert_eq!(names, ["Right0", "Left0", "Join0"]);
    }

    #[test]
    fn diamond_rules_are_not_duplicated() {
        let root = ConfigsType::builder("Root")
            .calc("seed", &[], |_| Ok(1))
            .build()
            .unwrap();
        let left = ConfigsType::builder("Left").extends(&root).build().unwrap();
        let right = ConfigsType::builder("Right").extends(&root).build().unwrap();
        let leaf = ConfigsType::builder("Leaf")
            .extends(&left)
            .extends(&right)
            .build()
            .unwrap();
        let schema = collect_schema(&leaf);
        assert_eq!(schema.get("seed").unwrap().candidates.len(), 1);
    }

    #[test]
    fn multi_name_rule_registered_under_each_key() {
        let ty = ConfigsType::builder("T")
            .calc(["train_loader", "test_loader"], &[], |_| Ok(["train", "test"]))
            .build()
            .unwrap();
        let schema = collect_schema(&ty);
        let a = &schema.get("train_loader").unwrap().candidates[0].function;
        let b = &schema.get("test_loader").unwrap().candidates[0].function;
        assert_eq!(a, b);
    }
}
