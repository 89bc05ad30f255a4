//! Evaluation of the resolved plan in dependency order.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, instrument, trace};

use crate::configs::Configs;
use crate::error::CalcfigError;
use crate::function::{ConfigFunction, RuleId};
use crate::graph::{DependencyGraph, build_graph, topological_sort};
use crate::parser::{Resolution, ResolvedConfig};
use crate::types::{OrderEntry, Value, ValueKind};

/// Runs rules in topological order and assigns their results.
///
/// A calculator can be evaluated several times against the same [`Configs`].
/// Keys evaluated in an earlier run are not pulled in again as dependencies,
/// and [`topological_order`](Self::topological_order) accumulates across runs.
#[derive(Debug, Clone)]
pub struct Calculator {
    plan: IndexMap<String, Resolution>,
    types: IndexMap<String, ValueKind>,
    graph: DependencyGraph,
    topological_order: Vec<String>,
    computed: IndexSet<String>,
}

impl Calculator {
    pub fn new(resolved: &ResolvedConfig) -> Self {
        Self {
            plan: resolved.plan().clone(),
            types: resolved.types().clone(),
            graph: build_graph(resolved),
            topological_order: Vec::new(),
            computed: IndexSet::new(),
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Every key placed by any run so far, first placement wins.
    pub fn topological_order(&self) -> &[String] {
        &self.topological_order
    }

    /// Keys assigned by any run so far.
    pub fn computed(&self) -> &IndexSet<String> {
        &self.computed
    }

    /// Evaluate `requested` (or every key) and return the order used.
    ///
    /// Ordering errors such as cycles surface before any rule runs. A failing
    /// rule stops the run; keys assigned before it stay assigned.
    #[instrument(skip_all, fields(entries = requested.map_or(0, <[OrderEntry]>::len)))]
    pub fn evaluate(
        &mut self,
        configs: &mut Configs,
        requested: Option<&[OrderEntry]>,
    ) -> Result<Vec<String>, CalcfigError> {
        let order = topological_sort(&self.graph, requested, &self.computed)?;
        debug!(keys = order.len(), "evaluating");

        // Multi-target rule outputs, shared by the keys they produce.
        let mut outputs: HashMap<RuleId, Value> = HashMap::new();
        for key in &order {
            let value = self.compute(key, configs, &mut outputs)?;
            configs.assign(key, value);
            self.computed.insert(key.clone());
            if !self.topological_order.contains(key) {
                self.topological_order.push(key.clone());
            }
        }

        Ok(order)
    }

    fn compute(
        &self,
        key: &str,
        configs: &Configs,
        outputs: &mut HashMap<RuleId, Value>,
    ) -> Result<Value, CalcfigError> {
        let kind = self.types.get(key).copied().unwrap_or_default();
        match self.plan.get(key) {
            Some(Resolution::Literal(value)) => Ok(value.clone()),
            Some(Resolution::Rule(function)) => {
                let raw = run(function, key, configs, outputs)?;
                check_kind(key, kind, raw)
            }
            Some(Resolution::Append(functions)) => {
                let mut items = Vec::with_capacity(functions.len());
                for function in functions {
                    items.push(run(function, key, configs, outputs)?);
                }
                check_kind(key, kind, Value::Array(items))
            }
            None => Err(CalcfigError::UnknownKey(key.into())),
        }
    }
}

fn run(
    function: &ConfigFunction,
    key: &str,
    configs: &Configs,
    outputs: &mut HashMap<RuleId, Value>,
) -> Result<Value, CalcfigError> {
    for dep in function.dependencies() {
        if !configs.contains_key(dep) {
            return Err(CalcfigError::MissingDependencyAtInvocation {
                key: key.into(),
                dependency: dep.clone(),
            });
        }
    }

    let names = function.config_names();
    if names.len() == 1 {
        trace!(key, rule = %function.label(), "invoking rule");
        return function.invoke(key, configs);
    }

    let output = match outputs.get(&function.id()) {
        Some(output) => output.clone(),
        None => {
            trace!(key, rule = %function.label(), targets = ?names, "invoking rule");
            let output = function.invoke(key, configs)?;
            outputs.insert(function.id(), output.clone());
            output
        }
    };
    unpack(key, names, output)
}

/// Pick `key`'s element out of a multi-target rule's output.
fn unpack(key: &str, names: &[String], output: Value) -> Result<Value, CalcfigError> {
    let arity_error = |found: String| CalcfigError::RuleArity {
        key: key.into(),
        expected: names.len(),
        found,
    };
    let Value::Array(items) = output else {
        return Err(arity_error(ValueKind::of(&output).to_string()));
    };
    if items.len() != names.len() {
        return Err(arity_error(format!("{} values", items.len())));
    }
    let index = names
        .iter()
        .position(|n| n == key)
        .ok_or_else(|| CalcfigError::UnknownKey(key.into()))?;
    items
        .into_iter()
        .nth(index)
        .ok_or_else(|| arity_error("too few values".into()))
}

fn check_kind(key: &str, kind: ValueKind, value: Value) -> Result<Value, CalcfigError> {
    let found = ValueKind::of(&value);
    kind.coerce(value).ok_or_else(|| CalcfigError::TypeMismatch {
        key: key.into(),
        expected: kind,
        found,
    })
}
