//! Declarative, computed configuration. Declare keys and the rules that derive
//! them, supply a few overrides, and let the engine work out the rest.
//!
//! A configs type lists keys, literal defaults and *rules*: functions of other
//! keys that compute a value. Overrides replace rules; named *options* let a
//! single string pick between alternative implementations. Evaluation runs
//! each rule exactly once, after every key it reads.
//!
//! ```ignore
//! let trainer = ConfigsType::builder("Trainer")
//!     .key("batch_size", ValueKind::Integer)
//!     .calc("batch_size", &[], |_| Ok(64))
//!     .calc("lr", &["batch_size"], |cx| Ok(cx.integer("batch_size")? as f64 / 6400.0))
//!     .build()?;
//!
//! let mut processor = Calcfig::builder(&trainer)
//!     .override_pair("batch_size=128")
//!     .build()?;
//! let configs = processor.run(Some(&["lr".into()]))?;
//! assert_eq!(configs.get_as::<f64>("lr")?, 0.02);
//! ```
//!
//! # Pipeline
//!
//! ```text
//! ConfigsType + bases ─ collect_schema ─▶ Schema
//! Schema + Overrides  ─ parse          ─▶ ResolvedConfig (kinds, options, plan)
//! ResolvedConfig      ─ build_graph    ─▶ DependencyGraph
//! DependencyGraph     ─ sort + evaluate ─▶ Configs
//! ```
//!
//! [`Processor`] drives the whole pipeline; [`Calcfig::builder`] assembles its
//! overrides.
//!
//! # Declaring keys
//!
//! [`ConfigsType::builder`] takes explicit calls, nothing is discovered by
//! reflection:
//!
//! - **`key(name, kind)`** declares a key's [`ValueKind`]. Keys that only have
//!   rules are declared implicitly as [`ValueKind::Any`].
//! - **`default_value(name, value)`** sets a literal. Literals are never
//!   computed and take part in ordering only as sources.
//! - **`calc(names, deps, f)`** adds an unnamed rule. With several names the
//!   rule returns one array element per name and runs once.
//! - **`option(names, option, deps, f)`** adds a named variant. A string
//!   override equal to the option name selects it.
//! - **`append(name, deps, f)`** adds one element to a list key. Every append
//!   rule runs, in declaration order.
//!
//! `deps` is the rule's read-set. Reading anything else through [`Inputs`]
//! fails with [`CalcfigError::UndeclaredDependency`], which keeps the graph
//! honest without running any rule to discover it.
//!
//! # Inheritance
//!
//! [`ConfigsTypeBuilder::extends`] adds a base type. Bases are merged from the
//! most-base type up, so a derived type's kinds and defaults win. Rules
//! accumulate. When several types declare an unnamed rule for the same key,
//! the one from the most-derived type is the default; two unnamed rules in that
//! same type are ambiguous.
//!
//! # Choosing how a key gets its value
//!
//! For each key, in priority order:
//!
//! 1. An override (or, failing that, a literal default). A string naming one
//!    of the key's options selects that option. Any other value is kept as a
//!    literal and checked against the declared kind; integers widen to floats.
//!    A string naming no option is [`CalcfigError::UnknownOption`], unless the
//!    key is declared [`ValueKind::String`].
//! 2. Append rules, if the key has any.
//! 3. The default unnamed rule.
//! 4. The only option, when exactly one exists.
//!
//! Several options and nothing to pick between them is
//! [`CalcfigError::AmbiguousDefault`]. No candidate at all is
//! [`CalcfigError::UnresolvableKey`].
//!
//! # Override layers
//!
//! ```text
//! Overrides files       .file(path), later files win
//!        ↑ overridden by
//! Environment vars      PREFIX__KEY, once .env_prefix() is set
//!        ↑ overridden by
//! Extra layers          .overrides(Overrides)
//!        ↑ overridden by
//! key=value pairs       .override_pair()
//!        ↑ overridden by
//! Values                .override_value()
//! ```
//!
//! Every layer is sparse. Table-valued keys are deep-merged across layers and
//! dotted keys (`optimizer.momentum`) reach into them. String values from the
//! environment and from `key=value` pairs are typed by a heuristic: bool, then
//! integer, then float (only with a `.`), then string.
//!
//! # Evaluation order
//!
//! [`Processor::run`] takes an optional list of [`OrderEntry`] values. Each
//! entry, in turn, contributes its keys plus any dependencies not evaluated
//! yet. Within an entry, ordering is topological with ties broken by
//! declaration order, so the same inputs always give the same order. Cycles
//! and unknown keys are reported before any rule runs.
//!
//! `run` may be called again. Requested keys are recomputed; dependencies
//! evaluated by an earlier run are reused. The processor's
//! [`topological_order`](Processor::topological_order) accumulates across runs.
//!
//! # Output
//!
//! - [`Processor::save`] writes a TOML snapshot: `values` holds the overrides
//!   and chosen option names, `options` the available option names, `order`
//!   the topological order and `computed` every evaluated result.
//!   [`Processor::load_saved`] reads it back; a processor built from
//!   [`SavedConfigs::overrides`] and [`Processor::replay`] reproduce the run.
//! - [`Processor::print`] writes one colored line per key; [`Processor::render`]
//!   returns the same lines as [`ConfigLine`] values.
//! - [`persist_override`] patches one key in an overrides file, keeping its
//!   comments.
//!
//! # Clap integration
//!
//! With the `clap` feature (on by default), [`ConfigsArgs`] adds
//! `--set key=value`, `--configs-file` and `--order a,b+c` flags to a clap
//! parser. `--persist` writes the `--set` values back into the configs file
//! through [`persist_override`]:
//!
//! ```ignore
//! #[derive(Parser)]
//! struct Cli {
//!     #[command(flatten)]
//!     configs: ConfigsArgs,
//! }
//!
//! let cli = Cli::parse();
//! cli.configs.persist_sets()?;
//! let mut processor = cli.configs.apply(Calcfig::builder(&trainer)).build()?;
//! processor.run(cli.configs.requested_order().as_deref())?;
//! processor.print();
//! ```
//!
//! # Logging
//!
//! The crate emits `tracing` events (`debug` for pipeline steps, `trace` per
//! rule invocation, `warn` for skipped overrides) and never installs a
//! subscriber.

pub mod error;
pub mod types;

mod builder;
mod calculator;
#[cfg(feature = "clap")]
mod cli;
mod configs;
mod env;
mod function;
mod graph;
mod overrides;
mod parser;
mod persist;
mod processor;
mod render;
mod schema;

#[cfg(test)]
mod fixtures;

pub use builder::{Calcfig, CalcfigBuilder};
pub use calculator::Calculator;
#[cfg(feature = "clap")]
pub use cli::ConfigsArgs;
pub use configs::Configs;
pub use error::CalcfigError;
pub use function::{ConfigFunction, ConfigNames, Inputs, RuleId};
pub use graph::{DependencyGraph, build_graph, topological_sort};
pub use overrides::Overrides;
pub use parser::{Resolution, ResolvedConfig, parse};
pub use persist::{SavedConfigs, persist_override};
pub use processor::Processor;
pub use render::{ConfigLine, format_value};
pub use schema::{Candidate, ConfigsType, ConfigsTypeBuilder, Schema, SchemaKey, collect_schema};
pub use types::{OrderEntry, Value, ValueKind};
