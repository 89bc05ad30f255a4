use toml::Table;
use tracing::warn;

use crate::overrides::{insert_path, parse_value};

/// Build a `toml::Table` from environment variables matching `{PREFIX}__*`.
///
/// `PREFIX__BATCH_SIZE=128` becomes `batch_size = 128`. A further `__` reaches
/// into a table-valued key: `PREFIX__OPTIMIZER__MOMENTUM` sets `momentum`
/// inside `optimizer`. Segments are lowercased.
///
/// Values are parsed heuristically: bool > integer > float > string.
pub fn env_to_table(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Table {
    let needle = format!("{prefix}__");
    let mut table = Table::new();

    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(&needle) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let segments: Vec<String> = rest.split("__").map(str::to_lowercase).collect();
        let path: Vec<&str> = segments.iter().map(String::as_str).collect();
        if let Err(segment) = insert_path(&mut table, &path, parse_value(&value)) {
            warn!(var = %key, segment = %segment, "skipping env var, parent key is not a table");
        }
    }

    table
}
