//! Variable substitution for connection settings.
//!
//! Host names, ports, database names and connect SQL may reference variables
//! as `${NAME}` or `%%NAME%%`. Unknown variables are left in place so the
//! driver reports the literal text rather than an empty value.

use std::collections::HashMap;

/// Resolves variable references in configuration strings.
pub trait VariableSpace: Send + Sync {
    /// Look up a single variable.
    fn get(&self, name: &str) -> Option<String>;

    /// Replace every `${NAME}` and `%%NAME%%` reference in `text`.
    fn substitute(&self, text: &str) -> String {
        let pass = replace_delimited(text, "${", "}", |name| self.get(name));
        replace_delimited(&pass, "%%", "%%", |name| self.get(name))
    }
}

/// Variables backed by an explicit map with an optional process-environment fallback.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, String>,
    use_environment: bool,
}

impl Variables {
    /// Empty variable space that does not consult the environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Variable space that falls back to process environment variables.
    pub fn from_environment() -> Self {
        Self {
            values: HashMap::new(),
            use_environment: true,
        }
    }

    /// Set a variable, shadowing any environment value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }
}

impl VariableSpace for Variables {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned().or_else(|| {
            if self.use_environment {
                std::env::var(name).ok()
            } else {
                None
            }
        })
    }
}

fn replace_delimited(
    text: &str,
    open: &str,
    close: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(close) else {
            break;
        };
        let name = &after_open[..end];
        out.push_str(&rest[..start]);
        match lookup(name) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                out.push_str(open);
                out.push_str(name);
                out.push_str(close);
            }
        }
        rest = &after_open[end + close.len()..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_both_syntaxes() {
        let vars = Variables::new().with("DB_HOST", "db1").with("DB_PORT", "5433");
        assert_eq!(vars.substitute("${DB_HOST}:%%DB_PORT%%"), "db1:5433");
    }

    #[test]
    fn test_unknown_variables_stay() {
        let vars = Variables::new();
        assert_eq!(vars.substitute("${MISSING}/x"), "${MISSING}/x");
        assert_eq!(vars.substitute("100%% sure"), "100%% sure");
    }

    #[test]
    fn test_unterminated_reference() {
        let vars = Variables::new().with("A", "1");
        assert_eq!(vars.substitute("${A}${B"), "1${B");
    }
}
