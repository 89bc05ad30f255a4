//! Console rendering of evaluated configs.
//!
//! [`render_lines`] produces one [`ConfigLine`] per key. A line's `Display` is
//! plain text. [`ConfigLine::colored`] paints the same layout with `colored`,
//! which honours `NO_COLOR` and `CLICOLOR_FORCE`.

use std::fmt;

use colored::{ColoredString, Colorize};

use crate::configs::Configs;
use crate::parser::ResolvedConfig;
use crate::types::Value;

/// Values with this many characters or more are cut and suffixed with `...`.
const VALUE_WIDTH: usize = 10;

/// One rendered key.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLine {
    /// Declared but never evaluated.
    Ignored { key: String },
    Evaluated {
        key: String,
        is_list: bool,
        /// Already flattened and truncated.
        value: Option<String>,
        /// The selected option name, if the value names one.
        option: Option<String>,
        /// The remaining option names, in declaration order.
        other_options: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Plain,
    Muted,
    Value,
    Chosen,
}

impl ConfigLine {
    pub fn key(&self) -> &str {
        match self {
            ConfigLine::Ignored { key } | ConfigLine::Evaluated { key, .. } => key,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ConfigLine::Ignored { .. })
    }

    /// The line with terminal colors applied.
    pub fn colored(&self) -> String {
        self.segments()
            .into_iter()
            .map(|(text, tone)| paint(text, tone).to_string())
            .collect()
    }

    fn segments(&self) -> Vec<(&str, Tone)> {
        let mut parts = vec![("\t", Tone::Plain)];
        let (key, is_list, value, option, other_options) = match self {
            ConfigLine::Ignored { key } => {
                parts.push((key.as_str(), Tone::Muted));
                return parts;
            }
            ConfigLine::Evaluated {
                key,
                is_list,
                value,
                option,
                other_options,
            } => (key, *is_list, value, option, other_options),
        };

        parts.push((key.as_str(), Tone::Plain));
        if is_list {
            parts.push(("[]", Tone::Muted));
        }
        parts.push((" = ", Tone::Muted));

        if let Some(value) = value {
            parts.push((value.as_str(), Tone::Value));
            parts.push(("\t", Tone::Plain));
        }

        if let Some(option) = option {
            let tone = if other_options.is_empty() {
                Tone::Muted
            } else {
                Tone::Chosen
            };
            parts.push((option.as_str(), tone));
        }

        if !other_options.is_empty() {
            parts.push(("\t[", Tone::Muted));
            for (i, name) in other_options.iter().enumerate() {
                if i > 0 {
                    parts.push((", ", Tone::Muted));
                }
                parts.push((name.as_str(), Tone::Plain));
            }
            parts.push(("]", Tone::Muted));
        }

        parts
    }
}

impl fmt::Display for ConfigLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (text, _) in self.segments() {
            f.write_str(text)?;
        }
        Ok(())
    }
}

fn paint(text: &str, tone: Tone) -> ColoredString {
    match tone {
        Tone::Plain => text.normal(),
        Tone::Muted => text.dimmed(),
        Tone::Value => text.cyan(),
        Tone::Chosen => text.truecolor(255, 165, 0), // orange
    }
}

/// Flatten a value for display: strings unquoted, line breaks removed, long
/// values cut.
pub fn format_value(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let flat: String = raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    if flat.chars().count() < VALUE_WIDTH {
        flat
    } else {
        let head: String = flat.chars().take(VALUE_WIDTH).collect();
        format!("{head}...")
    }
}

/// Lines for every key in `order`, then every declared key missing from it.
///
/// Reads only; nothing is evaluated.
pub fn render_lines(resolved: &ResolvedConfig, order: &[String], configs: &Configs) -> Vec<ConfigLine> {
    let mut lines = Vec::with_capacity(resolved.types().len());

    for key in order {
        let value = configs.get(key).map(format_value);
        let line = if resolved.is_append(key) {
            ConfigLine::Evaluated {
                key: key.clone(),
                is_list: true,
                value,
                option: None,
                other_options: Vec::new(),
            }
        } else if let Some(options) = resolved.options().get(key) {
            let option = resolved.chosen_option(key);
            ConfigLine::Evaluated {
                key: key.clone(),
                is_list: false,
                value,
                option: option.map(str::to_string),
                other_options: options
                    .keys()
                    .filter(|name| Some(name.as_str()) != option)
                    .cloned()
                    .collect(),
            }
        } else {
            ConfigLine::Evaluated {
                key: key.clone(),
                is_list: false,
                value,
                option: None,
                other_options: Vec::new(),
            }
        };
        lines.push(line);
    }

    for key in resolved.types().keys() {
        if !order.contains(key) {
            lines.push(ConfigLine::Ignored { key: key.clone() });
        }
    }

    lines
}
