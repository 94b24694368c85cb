//! Calls forwarded to another running instance of the language.

use crate::describe::literal;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tarn_core::types::{TypeRegistry, ValueType};
use tarn_core::values::Value;

/// Evaluates a rendered call expression and returns its result.
pub trait ExternalService {
    fn name(&self) -> &str;
    fn evaluate(&mut self, call: &str) -> Value;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum OperatorPlacement {
    Prefix = 0,
    Infix = 1,
    Suffix = 2,
}

impl OperatorPlacement {
    pub fn from_operand(k: u32) -> Option<Self> {
        match k {
            0 => Some(OperatorPlacement::Prefix),
            1 => Some(OperatorPlacement::Infix),
            2 => Some(OperatorPlacement::Suffix),
            _ => None,
        }
    }
}

/// Renders a call as source text. Arguments are literals separated by
/// commas; a bling argument is a bare keyword separated by spaces, and a bling
/// equal to the operator name marks where an infix operator goes.
pub fn render_call(
    types: &TypeRegistry,
    namespace: &str,
    name: &str,
    placement: OperatorPlacement,
    args: &[Value],
) -> String {
    let mut out = String::new();
    if placement == OperatorPlacement::Prefix {
        let _ = write!(out, "{namespace}{name}");
    }
    out.push('(');
    let mut at_start = true;
    let mut prev_bling = false;
    for arg in args {
        let text = literal(types, arg);
        let bling = arg.ty == ValueType::BLING;
        if bling && text == name {
            let _ = write!(out, ") {namespace}{name} (");
            at_start = true;
            continue;
        }
        if !at_start {
            out.push_str(if bling || prev_bling { " " } else { ", " });
        }
        out.push_str(&text);
        at_start = false;
        prev_bling = bling;
    }
    out.push(')');
    if placement == OperatorPlacement::Suffix {
        let _ = write!(out, " {namespace}{name}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_call() {
        let reg = TypeRegistry::new();
        let args = [Value::int(1), Value::string("two")];
        assert_eq!(render_call(&reg, "", "add", OperatorPlacement::Prefix, &args), "add(1, \"two\")");
        assert_eq!(render_call(&reg, "lib.", "now", OperatorPlacement::Prefix, &[]), "lib.now()");
    }

    #[test]
    fn test_bling_is_bare_and_space_separated() {
        let reg = TypeRegistry::new();
        let args = [Value::string("x"), Value::bling("to"), Value::int(2)];
        assert_eq!(
            render_call(&reg, "", "move", OperatorPlacement::Prefix, &args),
            "move(\"x\" to 2)"
        );
    }

    #[test]
    fn test_infix_and_suffix() {
        let reg = TypeRegistry::new();
        let args = [Value::int(1), Value::bling("plus"), Value::int(2)];
        assert_eq!(render_call(&reg, "m.", "plus", OperatorPlacement::Infix, &args), "(1) m.plus (2)");
        assert_eq!(
            render_call(&reg, "", "squared", OperatorPlacement::Suffix, &[Value::int(5)]),
            "(5) squared"
        );
    }

    #[test]
    fn test_placement_operand() {
        assert_eq!(OperatorPlacement::from_operand(1), Some(OperatorPlacement::Infix));
        assert_eq!(OperatorPlacement::from_operand(7), None);
    }
}
