//! Interpreter settings, loadable from a `[vm]`-style TOML table.

use serde::{Deserialize, Serialize};

fn default_max_call_depth() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VmSettings {
    /// Trace every executed operation.
    #[serde(default)]
    pub show_runtime: bool,
    /// Include operand register contents in the trace.
    #[serde(default)]
    pub show_runtime_values: bool,
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Initial state of the language-level logging switch.
    #[serde(default = "default_true")]
    pub logging: bool,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            show_runtime: false,
            show_runtime_values: false,
            max_call_depth: default_max_call_depth(),
            logging: true,
        }
    }
}

impl VmSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_uses_defaults() {
        let s = VmSettings::from_toml_str("").unwrap();
        assert_eq!(s, VmSettings::default());
        assert_eq!(s.max_call_depth, 10_000);
        assert!(s.logging);
    }

    #[test]
    fn test_partial_table() {
        let s = VmSettings::from_toml_str("show_runtime = true\nmax_call_depth = 64\n").unwrap();
        assert!(s.show_runtime);
        assert!(!s.show_runtime_values);
        assert_eq!(s.max_call_depth, 64);
    }

    #[test]
    fn test_bad_value_is_an_error() {
        assert!(VmSettings::from_toml_str("max_call_depth = \"deep\"").is_err());
    }
}
