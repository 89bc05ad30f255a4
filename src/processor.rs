//! The facade tying schema collection, parsing and evaluation together.

use std::path::Path;

use tracing::{debug, instrument};

use crate::calculator::Calculator;
use crate::configs::Configs;
use crate::error::CalcfigError;
use crate::overrides::Overrides;
use crate::parser::{Resolution, ResolvedConfig, parse};
use crate::persist::{SavedConfigs, read_saved, write_saved};
use crate::render::{ConfigLine, render_lines};
use crate::schema::{ConfigsType, Schema, collect_schema};
use crate::types::OrderEntry;

/// A configs type resolved against one set of overrides.
///
/// Construction collects the schema and resolves options and literals; nothing
/// is computed until [`run`](Self::run). Literal values (overrides and class
/// defaults) are readable from [`configs`](Self::configs) straight away.
#[derive(Debug, Clone)]
pub struct Processor {
    schema: Schema,
    resolved: ResolvedConfig,
    calculator: Calculator,
    configs: Configs,
}

impl Processor {
    #[instrument(skip_all, fields(configs_type = %ty.name(), strict = strict))]
    pub fn new(ty: &ConfigsType, overrides: &Overrides, strict: bool) -> Result<Self, CalcfigError> {
        let schema = collect_schema(ty);
        let resolved = parse(&schema, overrides.as_table(), strict)?;
        let calculator = Calculator::new(&resolved);

        let mut configs = Configs::default();
        for (key, resolution) in resolved.plan() {
            if let Resolution::Literal(value) = resolution {
                configs.assign(key, value.clone());
            }
        }
        debug!(keys = schema.len(), literals = configs.len(), "processor ready");

        Ok(Self {
            schema,
            resolved,
            calculator,
            configs,
        })
    }

    /// Evaluate `order` (every key when `None`).
    ///
    /// May be called repeatedly. Keys in the requested subset are recomputed;
    /// keys outside it keep their values.
    pub fn run(&mut self, order: Option<&[OrderEntry]>) -> Result<&Configs, CalcfigError> {
        self.calculator.evaluate(&mut self.configs, order)?;
        Ok(&self.configs)
    }

    /// Evaluate every key.
    pub fn run_all(&mut self) -> Result<&Configs, CalcfigError> {
        self.run(None)
    }

    /// Snapshot of everything evaluated so far.
    pub fn saved(&self) -> SavedConfigs {
        SavedConfigs::new(
            &self.resolved,
            self.calculator.topological_order(),
            &self.configs,
        )
    }

    /// Write the snapshot to `path` as TOML.
    pub fn save(&self, path: &Path) -> Result<(), CalcfigError> {
        write_saved(path, &self.saved())
    }

    pub fn load_saved(path: &Path) -> Result<SavedConfigs, CalcfigError> {
        read_saved(path)
    }

    /// Re-run the keys of a saved session, in its order.
    ///
    /// Build the processor from [`SavedConfigs::overrides`] to reproduce the
    /// saved values as well.
    pub fn replay(&mut self, saved: &SavedConfigs) -> Result<&Configs, CalcfigError> {
        let order = saved.requested_order();
        self.run(Some(&order))
    }

    /// One line per evaluated key, then the keys never evaluated.
    pub fn render(&self) -> Vec<ConfigLine> {
        render_lines(
            &self.resolved,
            self.calculator.topological_order(),
            &self.configs,
        )
    }

    /// Print [`render`](Self::render) to stdout with colors.
    pub fn print(&self) {
        for line in self.render() {
            println!("{}", line.colored());
        }
    }

    pub fn configs(&self) -> &Configs {
        &self.configs
    }

    pub fn topological_order(&self) -> &[String] {
        self.calculator.topological_order()
    }

    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::fixtures::test::{dataset_configs, trainer_configs};
    use crate::types::Value;

    fn processor(ty: &ConfigsType, pairs: &[&str]) -> Result<Processor, CalcfigError> {
        Processor::new(ty, &Overrides::from_pairs(pairs)?, true)
    }

    #[test]
    fn override_and_partial_order() {
        let mut p = processor(&trainer_configs(), &["batch_size=128"]).unwrap();
        let configs = p.run(Some(&[OrderEntry::from("lr")])).unwrap();
        assert_eq!(configs.get("batch_size"), Some(&Value::Integer(128)));
        assert_eq!(configs.get("lr"), Some(&Value::Float(0.02)));
        assert!(!configs.contains_key("log_interval"));
        assert!(!configs.contains_key("steps"));
        assert_eq!(p.topological_order(), ["batch_size", "lr"]);
    }

    #[test]
    fn unknown_option_at_construction() {
        let err = processor(&dataset_configs(), &["dataset=svhn"]).unwrap_err();
        assert!(matches!(err, CalcfigError::UnknownOption { ref option, .. } if option == "svhn"));
    }

    #[test]
    fn literals_readable_before_run() {
        let p = processor(&trainer_configs(), &["batch_size=8"]).unwrap();
        assert_eq!(p.configs().get("batch_size"), Some(&Value::Integer(8)));
        assert_eq!(p.configs().get("epochs"), Some(&Value::Integer(10)));
        assert!(!p.configs().contains_key("lr"));
        assert!(p.topological_order().is_empty());
    }

    #[test]
    fn same_inputs_same_results() {
        let run = || {
            let mut p = processor(&trainer_configs(), &["epochs=2"]).unwrap();
            p.run_all().unwrap();
            (p.topological_order().to_vec(), p.configs().clone())
        };
        let first = run();
        assert_eq!(run(), first);
    }

    #[test]
    fn rerun_recomputes_requested_keys_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ty = ConfigsType::builder("T")
            .calc("base", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .calc("derived", &["base"], |cx| Ok(cx.integer("base")? + 1))
            .build()
            .unwrap();
        let mut p = Processor::new(&ty, &Overrides::new(), true).unwrap();
        p.run_all().unwrap();
        p.run(Some(&[OrderEntry::from("derived")])).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        p.run(Some(&[OrderEntry::from("base")])).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(p.topological_order(), ["base", "derived"]);
    }

    #[test]
    fn cycle_reported_by_run() {
        let ty = ConfigsType::builder("Cyclic")
            .calc("a", &["b"], |cx| cx.integer("b"))
            .calc("b", &["a"], |cx| cx.integer("a"))
            .build()
            .unwrap();
        let mut p = Processor::new(&ty, &Overrides::new(), true).unwrap();
        assert!(matches!(
            p.run_all().unwrap_err(),
            CalcfigError::DependencyCycle { .. }
        ));
        assert!(p.configs().is_empty());
    }

    #[test]
    fn saved_snapshot_contents() {
        let mut p = processor(&dataset_configs(), &["dataset=mnist"]).unwrap();
        p.run_all().unwrap();
        let saved = p.saved();
        assert_eq!(saved.order, ["dataset", "input_size"]);
        assert_eq!(saved.values.len(), 1);
        assert_eq!(saved.values["dataset"], Value::String("mnist".into()));
        assert_eq!(saved.options["dataset"], ["mnist", "cifar"]);
        assert_eq!(saved.computed["input_size"], Value::Integer(784));
    }

    #[test]
    fn saved_artifact_records_chosen_option() {
        let mut p = processor(&dataset_configs(), &["dataset=cifar"]).unwrap();
        p.run_all().unwrap();
        let out = p.saved().to_toml_string().unwrap();
        let values = &out[out.find("[values]").unwrap()..];
        let values = &values[..values[1..].find("\n[").map_or(values.len(), |i| i + 1)];
        assert!(values.contains("dataset = \"cifar\""));
        assert!(!values.contains("input_size"));
        assert!(out.contains("dataset = \"cifar10\""));
    }

    #[test]
    fn artifact_rebuilds_the_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("configs.toml");

        let mut p = processor(&dataset_configs(), &["dataset=cifar"]).unwrap();
        p.run_all().unwrap();
        p.save(&path).unwrap();

        let saved = Processor::load_saved(&path).unwrap();
        let mut fresh = Processor::new(&dataset_configs(), &saved.overrides(), true).unwrap();
        assert_eq!(fresh.resolved().chosen_option("dataset"), Some("cifar"));
        let configs = fresh.replay(&saved).unwrap();
        assert_eq!(configs.get("input_size"), Some(&Value::Integer(3072)));
        assert_eq!(fresh.saved(), saved);
    }

    #[test]
    fn save_and_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("configs.toml");

        let mut p = processor(&trainer_configs(), &["batch_size=128"]).unwrap();
        p.run(Some(&[OrderEntry::from("lr")])).unwrap();
        p.save(&path).unwrap();

        let saved = Processor::load_saved(&path).unwrap();
        assert_eq!(saved, p.saved());

        let mut fresh = processor(&trainer_configs(), &["batch_size=128"]).unwrap();
        let configs = fresh.replay(&saved).unwrap();
        assert_eq!(configs.get("lr"), Some(&Value::Float(0.02)));
        assert_eq!(fresh.topological_order(), saved.order);
    }

    #[test]
    fn render_lists_ignored_keys_last() {
        let mut p = processor(&trainer_configs(), &[]).unwrap();
        p.run(Some(&[OrderEntry::from("lr"), OrderEntry::from("metrics")]))
            .unwrap();
        let lines = p.render();
        let keys: Vec<&str> = lines.iter().map(ConfigLine::key).collect();
        assert_eq!(
            keys,
            ["batch_size", "lr", "metrics", "epochs", "steps", "log_interval"]
        );
        assert_eq!(lines[0].to_string(), "\tbatch_size = 64\t");
        let metrics = lines[2].to_string();
        assert!(metrics.starts_with("\tmetrics[] = "));
        assert!(metrics.ends_with("...\t"));
        assert!(lines[3..].iter().all(ConfigLine::is_ignored));
    }

    #[test]
    fn render_shows_options() {
        let mut p = processor(&dataset_configs(), &["dataset=cifar"]).unwrap();
        p.run_all().unwrap();
        let lines = p.render();
        assert_eq!(lines[0].to_string(), "\tdataset = cifar10\tcifar\t[mnist]");
    }
}
