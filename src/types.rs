use std::fmt;

/// Dynamic value stored for every configuration key.
pub type Value = toml::Value;

/// Declared type of a configuration key.
///
/// `Any` accepts every value; the resolved kind is then taken from whatever
/// literal or rule result ends up assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    #[default]
    Any,
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Array,
    Table,
}

impl ValueKind {
    /// The kind of a concrete value. Never returns `Any`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueKind::String,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Datetime(_) => ValueKind::Datetime,
            Value::Array(_) => ValueKind::Array,
            Value::Table(_) => ValueKind::Table,
        }
    }

    /// Check `value` against this kind, widening integers to floats.
    ///
    /// Returns the (possibly converted) value, or `None` when incompatible.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (ValueKind::Any, v) => Some(v),
            (ValueKind::Float, Value::Integer(i)) => Some(Value::Float(i as f64)),
            (kind, v) if ValueKind::of(&v) == kind => Some(v),
            _ => None,
        }
    }

    /// Narrow `Any` to the kind of `value`; concrete kinds are kept.
    pub fn resolve(self, value: &Value) -> Self {
        match self {
            ValueKind::Any => ValueKind::of(value),
            kind => kind,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Any => "any",
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Datetime => "datetime",
            ValueKind::Array => "array",
            ValueKind::Table => "table",
        };
        f.write_str(name)
    }
}

/// One entry of a requested evaluation order.
///
/// Entries are evaluated in sequence. A `Group` lists keys that may be computed
/// in any relative order, as long as their own dependencies are respected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEntry {
    Key(String),
    Group(Vec<String>),
}

impl OrderEntry {
    pub fn keys(&self) -> &[String] {
        match self {
            OrderEntry::Key(key) => std::slice::from_ref(key),
            OrderEntry::Group(keys) => keys,
        }
    }
}

impl From<&str> for OrderEntry {
    fn from(key: &str) -> Self {
        OrderEntry::Key(key.to_string())
    }
}

impl From<String> for OrderEntry {
    fn from(key: String) -> Self {
        OrderEntry::Key(key)
    }
}

impl<const N: usize> From<[&str; N]> for OrderEntry {
    fn from(keys: [&str; N]) -> Self {
        OrderEntry::Group(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl From<Vec<String>> for OrderEntry {
    fn from(keys: Vec<String>) -> Self {
        OrderEntry::Group(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widens_to_float() {
        let v = ValueKind::Float.coerce(Value::Integer(3)).unwrap();
        assert_eq!(v, Value::Float(3.0));
    }

    #[test]
    fn float_does_not_narrow_to_integer() {
        assert!(ValueKind::Integer.coerce(Value::Float(1.5)).is_none());
    }

    #[test]
    fn any_accepts_everything() {
        let v = Value::String("x".into());
        assert_eq!(ValueKind::Any.coerce(v.clone()), Some(v));
    }

    #[test]
    fn resolve_narrows_any_only() {
        assert_eq!(
            ValueKind::Any.resolve(&Value::Boolean(true)),
            ValueKind::Boolean
        );
        assert_eq!(
            ValueKind::Float.resolve(&Value::Integer(1)),
            ValueKind::Float
        );
    }

    #[test]
    fn order_entry_keys() {
        assert_eq!(OrderEntry::from("lr").keys(), ["lr".to_string()]);
        let group = OrderEntry::from(["a", "b"]);
        assert_eq!(group.keys().len(), 2);
    }
}
