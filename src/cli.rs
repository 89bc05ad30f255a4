//! Clap adapter for calcfig.
//!
//! Compiled only when the `clap` Cargo feature is enabled (on by default).
//! [`ConfigsArgs`] is a clap `Args` struct you flatten into your own parser to
//! get `--set key=value`, `--configs-file`, `--persist` and `--order` flags. It
//! feeds a [`CalcfigBuilder`] and produces a requested evaluation order;
//! everything past that goes through the clap-free core.

use std::path::PathBuf;

use clap::Args;

use crate::builder::CalcfigBuilder;
use crate::error::CalcfigError;
use crate::overrides::Overrides;
use crate::persist::persist_override;
use crate::types::OrderEntry;

/// Clap-derived override and ordering flags.
///
/// ```ignore
/// #[derive(Parser)]
/// struct Cli {
///     #[command(flatten)]
///     configs: ConfigsArgs,
/// }
/// ```
#[derive(Debug, Default, Args)]
pub struct ConfigsArgs {
    /// Override a key, e.g. `--set batch_size=128`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// TOML file of overrides, applied below `--set`.
    #[arg(long, value_name = "PATH")]
    pub configs_file: Option<PathBuf>,

    /// Also write the `--set` values into `--configs-file`, so later runs
    /// pick them up.
    #[arg(long, requires = "configs_file")]
    pub persist: bool,

    /// Keys to evaluate, in order. `+` joins keys into one group, e.g.
    /// `--order dataset,lr+momentum`. Evaluates every key when omitted.
    #[arg(long, value_delimiter = ',', value_name = "KEYS")]
    pub order: Vec<String>,
}

impl ConfigsArgs {
    /// The `--order` flag as order entries, or `None` when not given.
    pub fn requested_order(&self) -> Option<Vec<OrderEntry>> {
        if self.order.is_empty() {
            return None;
        }
        let entries = self
            .order
            .iter()
            .map(|raw| {
                let keys: Vec<String> = raw
                    .split('+')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect();
                match <[String; 1]>::try_from(keys) {
                    Ok([key]) => OrderEntry::Key(key),
                    Err(keys) => OrderEntry::Group(keys),
                }
            })
            .filter(|entry| !entry.keys().is_empty())
            .collect();
        Some(entries)
    }

    /// With `--persist`, write every `--set` pair into `--configs-file`.
    ///
    /// Keys are patched in place; comments and other keys survive. Does
    /// nothing without the flag.
    pub fn persist_sets(&self) -> Result<(), CalcfigError> {
        let (true, Some(path)) = (self.persist, &self.configs_file) else {
            return Ok(());
        };
        Overrides::from_pairs(&self.set)?;
        for (key, raw) in self.set.iter().filter_map(|pair| pair.split_once('=')) {
            persist_override(path, key.trim(), raw.trim())?;
        }
        Ok(())
    }

    /// Add the file and `--set` layers to `builder`.
    pub fn apply(&self, builder: CalcfigBuilder) -> CalcfigBuilder {
        let builder = match &self.configs_file {
            Some(path) => builder.file(path),
            None => builder,
        };
        self.set
            .iter()
            .fold(builder, |b, pair| b.override_pair(pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Calcfig;
    use crate::fixtures::test::trainer_configs;
    use crate::types::Value;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    /// Wrapper so we can use `try_parse_from` on the flattened args.
    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        configs: ConfigsArgs,
    }

    fn parse(args: &[&str]) -> ConfigsArgs {
        TestCli::try_parse_from(args).unwrap().configs
    }

    #[test]
    fn parse_nothing() {
        let args = parse(&["test"]);
        assert!(args.set.is_empty());
        assert!(args.configs_file.is_none());
        assert!(!args.persist);
        assert_eq!(args.requested_order(), None);
    }

    #[test]
    fn parse_repeated_set() {
        let args = parse(&["test", "--set", "batch_size=128", "--set", "lr=0.1"]);
        assert_eq!(args.set, ["batch_size=128", "lr=0.1"]);
    }

    #[test]
    fn parse_configs_file() {
        let args = parse(&["test", "--configs-file", "run.toml"]);
        assert_eq!(args.configs_file, Some(PathBuf::from("run.toml")));
    }

    #[test]
    fn parse_order_with_groups() {
        let args = parse(&["test", "--order", "dataset,lr+momentum"]);
        assert_eq!(
            args.requested_order(),
            Some(vec![
                OrderEntry::Key("dataset".into()),
                OrderEntry::Group(vec!["lr".into(), "momentum".into()]),
            ])
        );
    }

    #[test]
    fn empty_order_segments_dropped() {
        let args = parse(&["test", "--order", "lr,+,steps"]);
        assert_eq!(
            args.requested_order(),
            Some(vec![OrderEntry::from("lr"), OrderEntry::from("steps")])
        );
    }

    #[test]
    fn unknown_flag_errors() {
        assert!(TestCli::try_parse_from(["test", "--nope"]).is_err());
    }

    #[test]
    fn apply_layers_file_below_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "batch_size = 16\nepochs = 3\n").unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let args = parse(&["test", "--configs-file", path_arg.as_str(), "--set", "batch_size=128"]);
        let overrides = args
            .apply(Calcfig::builder(&trainer_configs()))
            .collect_overrides()
            .unwrap();
        assert_eq!(overrides.get("batch_size"), Some(&Value::Integer(128)));
        assert_eq!(overrides.get("epochs"), Some(&Value::Integer(3)));
    }

    #[test]
    fn persist_requires_configs_file() {
        assert!(TestCli::try_parse_from(["test", "--persist", "--set", "lr=0.1"]).is_err());
    }

    #[test]
    fn persist_writes_sets_into_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "# tuned by hand\nepochs = 3\nbatch_size = 16\n").unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let args = parse(&[
            "test",
            "--configs-file",
            path_arg.as_str(),
            "--set",
            "batch_size=128",
            "--set",
            "dataset=cifar",
            "--persist",
        ]);
        args.persist_sets().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("# tuned by hand"));
        assert!(content.contains("epochs = 3"));
        assert!(content.contains("batch_size = 128"));
        assert!(content.contains("dataset = \"cifar\""));
        assert!(!content.contains("16"));
    }

    #[test]
    fn sets_not_written_without_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "epochs = 3\n").unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let args = parse(&["test", "--configs-file", path_arg.as_str(), "--set", "epochs=7"]);
        args.persist_sets().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "epochs = 3\n");
    }

    #[test]
    fn persist_rejects_malformed_pair() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        let path_arg = path.to_string_lossy().to_string();

        let args = parse(&[
            "test",
            "--configs-file",
            path_arg.as_str(),
            "--set",
            "epochs",
            "--persist",
        ]);
        assert!(matches!(
            args.persist_sets().unwrap_err(),
            CalcfigError::InvalidValue { .. }
        ));
        assert!(!path.exists());
    }

    #[test]
    fn end_to_end_run() {
        let args = parse(&["test", "--set", "batch_size=128", "--order", "lr"]);
        let mut processor = args
            .apply(Calcfig::builder(&trainer_configs()))
            .build()
            .unwrap();
        let order = args.requested_order();
        let configs = processor.run(order.as_deref()).unwrap();
        assert_eq!(configs.get("lr"), Some(&Value::Float(0.02)));
        assert_eq!(processor.topological_order(), ["batch_size", "lr"]);
    }
}
